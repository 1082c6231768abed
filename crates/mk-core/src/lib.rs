//! Data model and dependency resolution shared by the mk plugin kernel.
//!
//! This crate knows nothing about running plugins, facades, or the event
//! bus — only about manifests, versions, requirements, and the order in
//! which a set of them may load.

pub mod error;
pub mod manifest;
pub mod requirement;
pub mod resolver;
pub mod version;

pub use error::{ManifestError, ManifestResult, ResolverError, ResolverResult};
pub use manifest::PluginManifest;
pub use requirement::{Op, Requirement};
pub use resolver::{ResolveReport, resolve, reverse_dependencies};
pub use version::Version;
