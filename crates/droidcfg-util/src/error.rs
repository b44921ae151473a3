//! Error types for droidcfg-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// An XML document could not be parsed.
    #[error("invalid XML in {path}: {message}")]
    Xml { path: String, message: String },

    /// Cannot determine the user's home directory.
    #[error("cannot determine home directory; set the HOME environment variable")]
    NoHomeDir,
}
