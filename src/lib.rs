// src/lib.rs
pub mod compress;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod multipart;
pub mod parser;
pub mod query_string;
pub mod serializer;
pub mod server;
pub mod session;
pub mod signature;
pub mod source;

// Re-exports for users
pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::{TabservError, TabservResult};
pub use http::{FieldValue, Method, ParsedRequest, Response};
pub use server::Server;
pub use session::{SessionCursor, SessionCursorStore};
pub use signature::{RequestSignature, signature_of};
pub use source::{MemorySource, RowCursor, ScriptHost, TabularSource};
