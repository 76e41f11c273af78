//! Node model shared by every backend
//!
//! A [`Node`] is the metadata half of a filesystem object. The backend that
//! allocated it owns it and keeps any payload (file bytes, on-disk record
//! location) next to it; the switch only ever holds a [`NodeRef`] for the
//! duration of one operation.

use alloc::string::String;
use bitflags::bitflags;

/// Per-backend node number
pub type InodeId = u64;

/// Longest name a node may carry
pub const MAX_NAME_LEN: usize = 128;

/// Index of a registered filesystem inside the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FsId(pub usize);

/// Fully qualified node handle: which filesystem, which inode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub fs: FsId,
    pub ino: InodeId,
}

impl NodeRef {
    pub const fn new(fs: FsId, ino: InodeId) -> Self {
        Self { fs, ino }
    }
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Directory,
    CharDevice,
    BlockDevice,
    Pipe,
    /// Carried in the model only; nothing resolves link targets
    Symlink,
    MountPoint,
}

bitflags! {
    /// Unix permission bits (stored, not enforced)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u16 {
        const OWNER_READ  = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC  = 0o100;
        const GROUP_READ  = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC  = 0o010;
        const OTHER_READ  = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC  = 0o001;
    }
}

impl Permissions {
    /// rw-r--r--
    pub const DEFAULT_FILE: Self = Self::from_bits_truncate(0o644);

    /// rwxr-xr-x
    pub const DEFAULT_DIR: Self = Self::from_bits_truncate(0o755);

    /// Defaults for a freshly created node of `kind`
    pub fn default_for(kind: NodeType) -> Self {
        match kind {
            NodeType::Directory | NodeType::MountPoint => Self::DEFAULT_DIR,
            _ => Self::DEFAULT_FILE,
        }
    }
}

/// Universal filesystem object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub inode: InodeId,
    pub size: u64,
    pub mode: Permissions,
    pub uid: u32,
    pub gid: u32,
    pub kind: NodeType,

    /// Number of descriptors currently bound to this node
    pub open_count: u32,

    /// Parent inode within the same backend (lookup key, not ownership)
    pub parent: Option<InodeId>,

    /// Filesystem mounted over this node, if any
    pub mounted: Option<FsId>,
}

impl Node {
    /// Create a node with default ownership and permissions
    pub fn new(name: impl Into<String>, inode: InodeId, kind: NodeType) -> Self {
        Self {
            name: name.into(),
            inode,
            size: 0,
            mode: Permissions::default_for(kind),
            uid: 0,
            gid: 0,
            kind,
            open_count: 0,
            parent: None,
            mounted: None,
        }
    }

    /// Builder: set the parent key
    pub fn with_parent(mut self, parent: InodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Builder: set the byte size
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// True for nodes that can hold children
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeType::Directory | NodeType::MountPoint)
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeType::File
    }

    /// True when traversal must continue at another filesystem's root
    pub fn is_mount_point(&self) -> bool {
        self.mounted.is_some()
    }
}

/// One entry returned by `readdir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode: InodeId,
    pub kind: NodeType,
}

/// Snapshot of a node's metadata returned by `stat`/`fstat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub inode: InodeId,
    pub size: u64,
    pub mode: Permissions,
    pub uid: u32,
    pub gid: u32,
    pub kind: NodeType,
    pub open_count: u32,
    pub fs: FsId,
}

impl Metadata {
    pub fn from_node(fs: FsId, node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            inode: node.inode,
            size: node.size,
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            kind: node.kind,
            open_count: node.open_count,
            fs,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeType::Directory | NodeType::MountPoint)
    }
}
