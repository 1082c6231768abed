//! Error types shared by the manifest model and the dependency resolver.

use thiserror::Error;

/// Errors that can occur while parsing a plugin manifest or a requirement
/// string drawn from it.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// `config.json` could not be read.
    #[error("cannot read manifest at {path}: {reason}")]
    Unreadable {
        /// Manifest path.
        path: String,
        /// Underlying I/O reason.
        reason: String,
    },

    /// `config.json` did not parse as the documented schema.
    #[error("malformed manifest at {path}: {reason}")]
    Malformed {
        /// Manifest path.
        path: String,
        /// Reason the JSON did not match the schema.
        reason: String,
    },

    /// A dependency entry was not a valid requirement string.
    #[error("unparseable requirement '{requirement}' declared by '{plugin}'")]
    BadRequirement {
        /// The plugin that declared the requirement.
        plugin: String,
        /// The raw requirement string.
        requirement: String,
    },
}

/// Errors raised by the dependency resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// Depth-first traversal reached a node already on the current path.
    #[error("dependency cycle detected at '{0}'")]
    Cycle(String),

    /// A declared dependency is not present in the registry, or its
    /// declared version does not satisfy the requirement.
    #[error("plugin '{plugin}' requires '{requirement}', which is unsatisfied")]
    MissingDep {
        /// The plugin that declared the requirement.
        plugin: String,
        /// The unsatisfied requirement, rendered as written.
        requirement: String,
    },
}

/// Result alias for manifest parsing.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Result alias for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;
