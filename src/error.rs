use crate::parser::ParseError;
use std::io;

/// Central error type for the tabserv engine.
#[derive(Debug)]
pub enum TabservError {
    /// Underlying I/O error from the OS or network.
    Io(io::Error),
    /// Request head or body could not be parsed into a coherent structure.
    /// Logged; the request proceeds with whatever fields were decoded.
    Malformed(ParseError),
    /// A multipart body never produced its closing boundary. Parts decoded
    /// before the break are kept.
    UnterminatedMultipart,
    /// The request path does not resolve to any folder, table, or stream.
    ResourceNotFound,
    /// The underlying tabular source failed to execute a query.
    QueryFailed(String),
    /// Deflate compression failed; the response is sent uncompressed.
    Compression(String),
    /// The script execution collaborator reported a failure.
    Script(String),
    /// Invalid configuration value.
    Config(String),
}

impl std::fmt::Display for TabservError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TabservError::Io(e) => write!(f, "I/O error: {}", e),
            TabservError::Malformed(e) => write!(f, "Malformed request: {:?}", e),
            TabservError::UnterminatedMultipart => write!(f, "Unterminated multipart body"),
            TabservError::ResourceNotFound => write!(f, "Resource not found"),
            TabservError::QueryFailed(msg) => write!(f, "Query execution failed: {}", msg),
            TabservError::Compression(msg) => write!(f, "Compression failed: {}", msg),
            TabservError::Script(msg) => write!(f, "Script error: {}", msg),
            TabservError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TabservError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TabservError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TabservError {
    fn from(e: io::Error) -> Self {
        TabservError::Io(e)
    }
}

impl From<ParseError> for TabservError {
    fn from(e: ParseError) -> Self {
        TabservError::Malformed(e)
    }
}

pub type TabservResult<T> = Result<T, TabservError>;
