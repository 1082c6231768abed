//! C1: walks the plugin root and parses each bundle's manifest.

use std::path::Path;

use mk_core::PluginManifest;
use tracing::warn;

/// Scans `plugin_root`'s immediate subdirectories for a readable
/// `config.json`, yielding one [`PluginManifest`] per well-formed bundle.
/// Malformed manifests are logged and skipped; they never abort the scan.
pub fn scan(plugin_root: &Path) -> std::io::Result<Vec<PluginManifest>> {
    let mut manifests = Vec::new();

    let entries = std::fs::read_dir(plugin_root)?;
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %plugin_root.display(), "failed to read a directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match PluginManifest::load(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => warn!(bundle = %path.display(), "skipping malformed manifest: {e}"),
        }
    }

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_plugin_root_yields_no_manifests() {
        let dir = tempdir().unwrap();
        let manifests = scan(dir.path()).unwrap();
        assert!(manifests.is_empty());
    }

    #[test]
    fn skips_malformed_and_keeps_well_formed() {
        let dir = tempdir().unwrap();

        let good = dir.path().join("good");
        fs::create_dir(&good).unwrap();
        fs::write(good.join("config.json"), r#"{"name":"good"}"#).unwrap();

        let bad = dir.path().join("bad");
        fs::create_dir(&bad).unwrap();
        fs::write(bad.join("config.json"), "not json").unwrap();

        let no_manifest = dir.path().join("no-manifest");
        fs::create_dir(&no_manifest).unwrap();

        let manifests = scan(dir.path()).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].name, "good");
    }

    #[test]
    fn ignores_plain_files_at_the_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stray.txt"), "not a bundle").unwrap();
        let manifests = scan(dir.path()).unwrap();
        assert!(manifests.is_empty());
    }
}
