use thiserror::Error;

/// Failure to read or write the modification time stored on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModTimeError {
    #[error("Object is missing mtime metadata")]
    Missing,

    #[error("Object mtime metadata is invalid")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Listing failed for {path}: {reason}")]
    Listing { path: String, reason: String },

    #[error("Transfer failed for {path}: {reason}")]
    Transfer { path: String, reason: String },

    #[error("Cannot tag {path}: {source}")]
    ModTime {
        path: String,
        #[source]
        source: ModTimeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    pub fn listing(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        MirrorError::Listing { path: path.into(), reason: reason.to_string() }
    }

    pub fn transfer(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        MirrorError::Transfer { path: path.into(), reason: reason.to_string() }
    }
}
