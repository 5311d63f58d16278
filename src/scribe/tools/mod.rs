//! Tools the model can invoke during a writing session.

pub mod filesystem;
pub mod writer;

pub use filesystem::{DirectoryEntry, FileSystemError, FileSystemTool};
pub use writer::{sanitize_project_name, WriteMode, WriterError, WriterProtocol};
