//! The plugin bundle manifest, `config.json`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ManifestError, ManifestResult};
use crate::version::Version;

const MANIFEST_FILE_NAME: &str = "config.json";

/// The raw, on-disk shape of `config.json`. Every field but `name` is
/// optional; defaults are filled in when this is converted to a
/// [`PluginManifest`].
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    /// Ignored by the core; kept only so extra manifest fields round-trip
    /// for tooling that inspects the raw document.
    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,
}

/// A parsed plugin manifest: one bundle's declared identity and
/// dependencies.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    /// Unique plugin identifier. Falls back to the bundle's directory name
    /// when `config.json` omits `name`.
    pub name: String,
    /// The bundle's filesystem root.
    pub path: PathBuf,
    /// Declared version, defaulting to `0.0.0`.
    pub version: Version,
    /// Raw requirement strings, in declaration order.
    pub dependencies: Vec<String>,
}

impl PluginManifest {
    /// Reads and parses `<bundle_dir>/config.json`.
    ///
    /// `bundle_dir`'s file name supplies the fallback `name` when the
    /// manifest omits it, per the scanner's contract.
    pub fn load(bundle_dir: &Path) -> ManifestResult<Self> {
        let manifest_path = bundle_dir.join(MANIFEST_FILE_NAME);
        let contents =
            std::fs::read_to_string(&manifest_path).map_err(|e| ManifestError::Unreadable {
                path: manifest_path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::parse(&contents, bundle_dir, &manifest_path)
    }

    fn parse(contents: &str, bundle_dir: &Path, manifest_path: &Path) -> ManifestResult<Self> {
        let raw: RawManifest =
            serde_json::from_str(contents).map_err(|e| ManifestError::Malformed {
                path: manifest_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let name = raw.name.unwrap_or_else(|| {
            bundle_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let version = match raw.version {
            Some(v) => Version::parse(&v).ok_or_else(|| ManifestError::Malformed {
                path: manifest_path.display().to_string(),
                reason: format!("invalid version string '{v}'"),
            })?,
            None => Version::zero(),
        };

        Ok(PluginManifest {
            name,
            path: bundle_dir.to_path_buf(),
            version,
            dependencies: raw.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_full_manifest() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join("widgets");
        fs::create_dir(&bundle).unwrap();
        fs::write(
            bundle.join("config.json"),
            r#"{"name":"widgets","version":"1.2.0","dependencies":["core>=1.0.0"]}"#,
        )
        .unwrap();

        let manifest = PluginManifest::load(&bundle).unwrap();
        assert_eq!(manifest.name, "widgets");
        assert_eq!(manifest.version, Version::parse("1.2.0").unwrap());
        assert_eq!(manifest.dependencies, vec!["core>=1.0.0".to_string()]);
    }

    #[test]
    fn name_falls_back_to_directory_name() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join("fallback-name");
        fs::create_dir(&bundle).unwrap();
        fs::write(bundle.join("config.json"), r#"{}"#).unwrap();

        let manifest = PluginManifest::load(&bundle).unwrap();
        assert_eq!(manifest.name, "fallback-name");
        assert_eq!(manifest.version, Version::zero());
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn malformed_json_is_reported_not_panicked() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join("broken");
        fs::create_dir(&bundle).unwrap();
        fs::write(bundle.join("config.json"), "not json").unwrap();

        let err = PluginManifest::load(&bundle).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn missing_manifest_is_unreadable_error() {
        let dir = tempdir().unwrap();
        let err = PluginManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Unreadable { .. }));
    }
}
