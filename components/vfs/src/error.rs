//! Error types for the VFS layer.

use alloc::string::String;
use thiserror::Error;

/// Errors from VFS and backend operations
///
/// Backends report failures with these values; the switch forwards the first
/// failure it sees and never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("No such file or directory")]
    NotFound,

    #[error("File already exists")]
    AlreadyExists,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Not a regular file")]
    NotAFile,

    #[error("Directory has no free entry slot")]
    DirectoryFull,

    #[error("No free storage left on the volume")]
    StorageExhausted,

    #[error("Directory not empty")]
    NotEmpty,

    #[error("Invalid file descriptor {0}")]
    InvalidDescriptor(usize),

    #[error("Descriptor not opened for this access")]
    WrongAccessMode,

    #[error("Invalid boot sector: {0}")]
    InvalidBootSector(String),

    #[error("Operation not supported by this filesystem")]
    Unsupported,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Descriptor table is full")]
    TooManyOpenFiles,

    #[error("Nothing is mounted there")]
    NotMounted,

    #[error("Resource busy")]
    Busy,
}

impl VfsError {
    /// Create an I/O error with message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an invalid path error with message.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create an invalid name error with message.
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }
}

pub type Result<T> = core::result::Result<T, VfsError>;
