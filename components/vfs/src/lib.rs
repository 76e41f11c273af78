//! Virtual File System (VFS) - Unified file system interface
//!
//! # Purpose
//! Provides one node/operations contract for every storage backend (RamFS,
//! FAT16, archive images) and a switch that resolves paths across mounts,
//! hands out file descriptors and forwards each call to the backend that
//! owns the node.
//!
//! # Integration Points
//! - Depends on: Block drivers (through device-backed filesystems)
//! - Provides to: POSIX layer, shell, applications
//! - IPC endpoints: File operation requests
//! - Capabilities required: None directly
//!
//! # Architecture
//! - `ops::FileSystem` trait with ten capabilities; unset ones are unsupported
//! - `Vfs` switch: path resolution, mount indirection, descriptor table
//! - `RamFs` in-memory backend
//! - `SharedVfs` spin-locked wrapper for multi-core callers
//!
//! # Testing Strategy
//! - Unit tests: Path helpers, descriptor table, RamFS, resolution
//! - Integration tests: Mount stacks and cross-filesystem traversal

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

pub mod descriptor;
pub mod error;
pub mod mount;
pub mod node;
pub mod ops;
pub mod path;
pub mod ramfs;
pub mod shared;
pub mod vfs;

pub use descriptor::{Descriptor, Fd, OpenFlags, Whence};
pub use error::{Result, VfsError};
pub use mount::MountRecord;
pub use node::{DirEntry, FsId, InodeId, Metadata, Node, NodeRef, NodeType, Permissions};
pub use ops::FileSystem;
pub use ramfs::{RamFs, RAMFS_MAX_FILE_SIZE};
pub use shared::SharedVfs;
pub use vfs::{Vfs, VfsConfig};
