//! Node/operations contract
//!
//! Every backend (RAM, FAT16, archive images) implements [`FileSystem`].
//! Capabilities a backend leaves unimplemented fall back to the default
//! bodies below, which report [`VfsError::Unsupported`] so the caller fails
//! the operation instead of faulting.

use crate::descriptor::OpenFlags;
use crate::error::{Result, VfsError};
use crate::node::{DirEntry, InodeId, Node};

/// Filesystem backend bound into the switch
pub trait FileSystem: Send {
    /// Short type tag recorded in the mount table ("ramfs", "fat16", ...)
    fn fs_type(&self) -> &'static str;

    /// Backing block device number, for device-backed filesystems
    fn device(&self) -> Option<u8> {
        None
    }

    /// Inode of the filesystem's root directory
    fn root(&self) -> InodeId;

    /// Look up a node this backend has handed out
    fn node(&self, ino: InodeId) -> Result<&Node>;

    /// Mutable access to a node this backend has handed out
    fn node_mut(&mut self, ino: InodeId) -> Result<&mut Node>;

    /// Hook run when a descriptor is bound to `ino`
    fn open(&mut self, _ino: InodeId, _flags: OpenFlags) -> Result<()> {
        Ok(())
    }

    /// Hook run when a descriptor bound to `ino` is released
    fn close(&mut self, _ino: InodeId) -> Result<()> {
        Ok(())
    }

    /// Read up to `buf.len()` bytes at `offset`; returns bytes transferred
    fn read(&mut self, _ino: InodeId, _offset: u64, _buf: &mut [u8]) -> Result<usize> {
        Err(VfsError::Unsupported)
    }

    /// Write `buf` at `offset`; returns bytes transferred
    fn write(&mut self, _ino: InodeId, _offset: u64, _buf: &[u8]) -> Result<usize> {
        Err(VfsError::Unsupported)
    }

    /// Entry at zero-based `index` of directory `dir`, or `None` past the end
    fn readdir(&mut self, _dir: InodeId, _index: usize) -> Result<Option<DirEntry>> {
        Err(VfsError::Unsupported)
    }

    /// Child of `dir` called `name`
    ///
    /// # Errors
    /// `NotFound` if no such child exists.
    fn finddir(&mut self, _dir: InodeId, _name: &str) -> Result<InodeId> {
        Err(VfsError::Unsupported)
    }

    /// Create an empty regular file `name` inside `dir`
    ///
    /// # Errors
    /// `AlreadyExists`, `DirectoryFull` or `StorageExhausted`.
    fn create(&mut self, _dir: InodeId, _name: &str) -> Result<InodeId> {
        Err(VfsError::Unsupported)
    }

    /// Remove regular file `name` from `dir`
    fn unlink(&mut self, _dir: InodeId, _name: &str) -> Result<()> {
        Err(VfsError::Unsupported)
    }

    /// Create directory `name` inside `dir`
    fn mkdir(&mut self, _dir: InodeId, _name: &str) -> Result<InodeId> {
        Err(VfsError::Unsupported)
    }

    /// Remove directory `name` from `dir`
    ///
    /// # Errors
    /// `NotEmpty` if the directory still has live children.
    fn rmdir(&mut self, _dir: InodeId, _name: &str) -> Result<()> {
        Err(VfsError::Unsupported)
    }

    /// Cut or extend file `ino` to `size` bytes
    fn truncate(&mut self, _ino: InodeId, _size: u64) -> Result<()> {
        Err(VfsError::Unsupported)
    }

    /// Persist cached state
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
