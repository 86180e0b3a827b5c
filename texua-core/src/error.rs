use thiserror::Error;

#[derive(Error, Debug)]
pub enum TexuaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid header")]
    InvalidHeader,

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Ghostscript (gs) is not installed or not on PATH")]
    GhostscriptNotFound,

    #[error("External tool `{tool}` failed (exit {status}): {stderr}")]
    ExternalToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("Unknown math-speech engine: {0}")]
    UnknownSpeechEngine(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, TexuaError>;

impl From<serde_json::Error> for TexuaError {
    fn from(err: serde_json::Error) -> Self {
        TexuaError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let error = TexuaError::InvalidStructure("missing /Root".to_string());
        assert_eq!(error.to_string(), "Invalid PDF structure: missing /Root");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error = TexuaError::from(io_error);

        match error {
            TexuaError::Io(ref err) => assert_eq!(err.kind(), ErrorKind::NotFound),
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_external_tool_failed_display() {
        let error = TexuaError::ExternalToolFailed {
            tool: "gs".to_string(),
            status: 1,
            stderr: "bad input".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("gs"));
        assert!(text.contains("bad input"));
    }
}
