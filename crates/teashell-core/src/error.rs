//! Error types for teashell.

use thiserror::Error;

/// Main error type for teashell operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A program was built without one of its required streams
    #[error("Program has no {0} stream bound; use make_options(session)")]
    MissingStream(&'static str),

    /// The program was stopped with a forced kill
    #[error("Program was killed")]
    ProgramKilled,

    /// `run` was called on a program that already ran
    #[error("Program is already running or has finished")]
    AlreadyRunning,

    /// Session limit reached
    #[error("Session limit reached (max: {0})")]
    SessionLimitReached(usize),

    /// Invalid color profile name
    #[error("Invalid color profile: {0}")]
    InvalidColorProfile(String),

    /// Invalid window dimensions
    #[error("Invalid window size: {width}x{height}")]
    InvalidWindowSize {
        /// Width in columns
        width: u16,
        /// Height in rows
        height: u16,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stream_error() {
        let err = Error::MissingStream("input");
        assert_eq!(
            err.to_string(),
            "Program has no input stream bound; use make_options(session)"
        );
    }

    #[test]
    fn test_program_killed_error() {
        assert_eq!(Error::ProgramKilled.to_string(), "Program was killed");
    }

    #[test]
    fn test_session_limit_reached_error() {
        let err = Error::SessionLimitReached(10);
        assert_eq!(err.to_string(), "Session limit reached (max: 10)");
    }

    #[test]
    fn test_invalid_window_size_error() {
        let err = Error::InvalidWindowSize {
            width: 0,
            height: 24,
        };
        assert_eq!(err.to_string(), "Invalid window size: 0x24");
    }

    #[test]
    fn test_config_error() {
        let err = Error::Config("supervisor.message_buffer must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: supervisor.message_buffer must be > 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("client gone"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
