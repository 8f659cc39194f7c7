//! Error types for techwriter-core

use thiserror::Error;

/// Core error type. Every variant is fatal at startup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The prompt template source could not be loaded or is malformed
    #[error("Prompt template error: {0}")]
    Template(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_their_source() {
        let err = Error::Template("duplicate mode name 'grammar'".to_string());
        assert_eq!(
            err.to_string(),
            "Prompt template error: duplicate mode name 'grammar'"
        );
        let err = Error::Config("backend.max_attempts must be at least 1".to_string());
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
