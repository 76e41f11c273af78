//! Mount registry
//!
//! Records which filesystem root replaces which covered node during path
//! resolution. The covered node itself also carries a forward reference
//! (`Node::mounted`), which is what the resolver actually follows; this table
//! is the bookkeeping used by `unmount` and for listing mounts.

use alloc::string::String;
use alloc::vec::Vec;

use crate::node::{FsId, NodeRef};

/// One active mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    /// Normalized absolute path the filesystem was mounted on
    pub path: String,

    /// Node being covered; `None` for the global root mount
    pub covered: Option<NodeRef>,

    /// Root node of the mounted filesystem
    pub root: NodeRef,

    /// Filesystem type tag
    pub fs_type: &'static str,

    /// Backing device number, if any
    pub device: Option<u8>,
}

impl MountRecord {
    pub fn fs(&self) -> FsId {
        self.root.fs
    }
}

/// Ordered list of active mounts, oldest first
#[derive(Default)]
pub struct MountTable {
    records: Vec<MountRecord>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MountRecord) {
        self.records.push(record);
    }

    /// Most recent mount on `path`
    pub fn find_by_path(&self, path: &str) -> Option<&MountRecord> {
        self.records.iter().rev().find(|r| r.path == path)
    }

    /// Mount whose filesystem is `fs`
    pub fn find_by_fs(&self, fs: FsId) -> Option<&MountRecord> {
        self.records.iter().find(|r| r.fs() == fs)
    }

    /// True if some other mount sits on a node inside `fs`
    pub fn has_children(&self, fs: FsId) -> bool {
        self.records
            .iter()
            .any(|r| r.covered.map(|c| c.fs) == Some(fs))
    }

    /// Remove and return the most recent mount on `path`
    pub fn remove_by_path(&mut self, path: &str) -> Option<MountRecord> {
        let idx = self.records.iter().rposition(|r| r.path == path)?;
        Some(self.records.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountRecord> {
        self.records.iter()
    }
}
