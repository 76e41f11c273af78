//! VFS switch
//!
//! Owns every mounted backend, the mount registry, the descriptor table and
//! the current working directory. Path-based calls are resolved here to a
//! concrete [`NodeRef`] and then delegated to that node's backend.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::descriptor::{seek_target, Descriptor, DescriptorTable, Fd, OpenFlags, Whence};
use crate::error::{Result, VfsError};
use crate::mount::{MountRecord, MountTable};
use crate::node::{DirEntry, FsId, Metadata, Node, NodeRef};
use crate::ops::FileSystem;
use crate::path;

/// Switch configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfsConfig {
    /// Size of the descriptor table
    pub max_descriptors: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            max_descriptors: 64,
        }
    }
}

/// Virtual File System switch
pub struct Vfs {
    filesystems: Vec<Option<Box<dyn FileSystem>>>,
    mounts: MountTable,
    descriptors: DescriptorTable,
    root: Option<NodeRef>,
    cwd: Option<NodeRef>,
    cwd_path: String,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(VfsConfig::default())
    }
}

impl Vfs {
    /// Create a switch with nothing mounted
    pub fn new(config: VfsConfig) -> Self {
        Self {
            filesystems: Vec::new(),
            mounts: MountTable::new(),
            descriptors: DescriptorTable::new(config.max_descriptors),
            root: None,
            cwd: None,
            cwd_path: String::from("/"),
        }
    }

    // ------------------------------------------------------------------
    // Backend access
    // ------------------------------------------------------------------

    fn fs(&self, id: FsId) -> Result<&dyn FileSystem> {
        match self.filesystems.get(id.0) {
            Some(Some(fs)) => Ok(fs.as_ref()),
            _ => Err(VfsError::NotMounted),
        }
    }

    fn fs_mut(&mut self, id: FsId) -> Result<&mut (dyn FileSystem + 'static)> {
        match self.filesystems.get_mut(id.0) {
            Some(Some(fs)) => Ok(fs.as_mut()),
            _ => Err(VfsError::NotMounted),
        }
    }

    fn node(&self, r: NodeRef) -> Result<&Node> {
        self.fs(r.fs)?.node(r.ino)
    }

    fn node_mut(&mut self, r: NodeRef) -> Result<&mut Node> {
        self.fs_mut(r.fs)?.node_mut(r.ino)
    }

    fn root_ref(&self) -> Result<NodeRef> {
        self.root.ok_or(VfsError::NotMounted)
    }

    // ------------------------------------------------------------------
    // Path resolution
    // ------------------------------------------------------------------

    /// Follow mount forward references until a non-covered node is reached
    fn enter(&self, mut current: NodeRef) -> Result<NodeRef> {
        // Each hop lands in a different mounted filesystem
        for _ in 0..=self.mounts.len() {
            let Some(fs) = self.node(current)?.mounted else {
                return Ok(current);
            };
            current = NodeRef::new(fs, self.fs(fs)?.root());
        }
        Err(VfsError::Busy)
    }

    /// Parent of `current`, crossing back over every mount boundary that
    /// stacks on the same point
    fn parent_of(&self, current: NodeRef) -> Result<NodeRef> {
        let mut at = current;
        for _ in 0..=self.mounts.len() {
            if at.ino != self.fs(at.fs)?.root() {
                break;
            }
            match self.mounts.find_by_fs(at.fs).and_then(|m| m.covered) {
                Some(covered) => at = covered,
                None => return Ok(at),
            }
        }
        Ok(match self.node(at)?.parent {
            Some(parent) => NodeRef::new(at.fs, parent),
            None => at,
        })
    }

    /// Resolve `path` to a node
    ///
    /// Absolute paths start at the global root, relative paths at the
    /// working directory. `.` is a no-op and `..` moves to the parent when
    /// there is one. Mount points are replaced by the mounted root before
    /// every child lookup and once more at the end, so a covered node is
    /// never returned.
    ///
    /// # Errors
    /// - `NotADirectory` if an intermediate node cannot hold children
    /// - `NotFound` if a component does not exist
    pub fn resolve(&mut self, path: &str) -> Result<NodeRef> {
        if path.is_empty() {
            return Err(VfsError::invalid_path(path));
        }
        let mut current = if path::is_absolute(path) {
            self.root_ref()?
        } else {
            self.cwd.ok_or(VfsError::NotMounted)?
        };

        for component in path::components(path) {
            current = self.enter(current)?;
            match component {
                "." => {}
                ".." => current = self.parent_of(current)?,
                name => {
                    if !self.node(current)?.is_dir() {
                        return Err(VfsError::NotADirectory);
                    }
                    let ino = self.fs_mut(current.fs)?.finddir(current.ino, name)?;
                    current = NodeRef::new(current.fs, ino);
                }
            }
        }
        self.enter(current)
    }

    /// Resolve the parent of `path` and return it with the leaf name
    fn resolve_parent<'p>(&mut self, path: &'p str) -> Result<(NodeRef, &'p str)> {
        let (parent, leaf) = path::split_parent(path)?;
        let dir = self.resolve(parent)?;
        if !self.node(dir)?.is_dir() {
            return Err(VfsError::NotADirectory);
        }
        Ok((dir, leaf))
    }

    // ------------------------------------------------------------------
    // Mounts
    // ------------------------------------------------------------------

    /// Mount `fs` on directory `path`
    ///
    /// The first mount must target `/` and becomes the global root.
    ///
    /// # Errors
    /// - `NotMounted` if the first mount does not target `/`
    /// - `NotADirectory` if `path` is not a directory
    pub fn mount(&mut self, path: &str, fs: Box<dyn FileSystem>) -> Result<FsId> {
        let normalized = path::normalize(&path::join(&self.cwd_path, path));
        let id = FsId(self.filesystems.len());
        let root = NodeRef::new(id, fs.root());
        let fs_type = fs.fs_type();
        let device = fs.device();

        let covered = if self.root.is_none() {
            if normalized != "/" {
                return Err(VfsError::NotMounted);
            }
            None
        } else {
            // Mounting over an existing mount stacks on top of its root
            let target = self.resolve(&normalized)?;
            if !self.node(target)?.is_dir() {
                return Err(VfsError::NotADirectory);
            }
            Some(target)
        };

        self.filesystems.push(Some(fs));
        match covered {
            Some(target) => self.node_mut(target)?.mounted = Some(id),
            None => {
                self.root = Some(root);
                self.cwd = Some(root);
                self.cwd_path = String::from("/");
            }
        }

        log::info!(
            "vfs: mounted {} (device {:?}) on {} as {:?}",
            fs_type,
            device,
            normalized,
            id
        );
        self.mounts.push(MountRecord {
            path: normalized,
            covered,
            root,
            fs_type,
            device,
        });
        Ok(id)
    }

    /// Detach the filesystem mounted on `path` and hand it back
    ///
    /// No flush is performed and open descriptors on the volume are not
    /// checked; they fail with `NotMounted` afterwards.
    ///
    /// # Errors
    /// - `NotMounted` if nothing is mounted on `path`
    /// - `Busy` if another filesystem is mounted inside this one
    pub fn unmount(&mut self, path: &str) -> Result<Box<dyn FileSystem>> {
        let normalized = path::normalize(&path::join(&self.cwd_path, path));
        let record = self
            .mounts
            .find_by_path(&normalized)
            .ok_or(VfsError::NotMounted)?;
        let id = record.fs();
        if self.mounts.has_children(id) {
            return Err(VfsError::Busy);
        }
        let record = self
            .mounts
            .remove_by_path(&normalized)
            .ok_or(VfsError::NotMounted)?;

        match record.covered {
            Some(covered) => {
                if let Ok(node) = self.node_mut(covered) {
                    node.mounted = None;
                }
            }
            None => self.root = None,
        }
        if self.cwd.map(|c| c.fs) == Some(id) {
            self.cwd = self.root;
            self.cwd_path = String::from("/");
        }

        let fs = self
            .filesystems
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(VfsError::NotMounted)?;
        log::info!("vfs: unmounted {} from {}", record.fs_type, normalized);
        Ok(fs)
    }

    /// Active mounts, oldest first
    pub fn mounts(&self) -> impl Iterator<Item = &MountRecord> {
        self.mounts.iter()
    }

    // ------------------------------------------------------------------
    // Working directory
    // ------------------------------------------------------------------

    /// Change the working directory
    pub fn chdir(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if !self.node(target)?.is_dir() {
            return Err(VfsError::NotADirectory);
        }
        self.cwd = Some(target);
        self.cwd_path = path::normalize(&path::join(&self.cwd_path, path));
        Ok(())
    }

    /// Working directory as an absolute path
    pub fn cwd(&self) -> &str {
        &self.cwd_path
    }

    // ------------------------------------------------------------------
    // File lifecycle
    // ------------------------------------------------------------------

    /// Open `path`, creating it first when `CREATE` is set and it is absent
    ///
    /// # Errors
    /// - `NotFound` if absent and `CREATE` is not set
    /// - `NotAFile` if a directory is opened for writing
    /// - `TooManyOpenFiles` if the descriptor table is full
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<Fd> {
        let target = match self.resolve(path) {
            Ok(target) => target,
            Err(VfsError::NotFound) if flags.contains(OpenFlags::CREATE) => {
                let (dir, leaf) = self.resolve_parent(path)?;
                let ino = self.fs_mut(dir.fs)?.create(dir.ino, leaf)?;
                NodeRef::new(dir.fs, ino)
            }
            Err(e) => return Err(e),
        };

        let is_dir = self.node(target)?.is_dir();
        if is_dir && flags.intersects(OpenFlags::WRITE | OpenFlags::TRUNCATE) {
            return Err(VfsError::NotAFile);
        }

        let fd = self.descriptors.allocate(Descriptor::new(target, flags))?;
        if let Err(e) = self.bind(fd, target, flags) {
            let _ = self.descriptors.release(fd);
            return Err(e);
        }
        Ok(fd)
    }

    /// Run the backend open hook and apply truncate/append semantics
    fn bind(&mut self, fd: Fd, target: NodeRef, flags: OpenFlags) -> Result<()> {
        let fs = self.fs_mut(target.fs)?;
        fs.open(target.ino, flags)?;

        if flags.contains(OpenFlags::TRUNCATE) {
            match fs.truncate(target.ino, 0) {
                Err(VfsError::Unsupported) => fs.node_mut(target.ino)?.size = 0,
                other => other?,
            }
        }

        let node = fs.node_mut(target.ino)?;
        node.open_count += 1;
        let size = node.size;

        if flags.contains(OpenFlags::APPEND) {
            self.descriptors.get_mut(fd)?.cursor = size;
        }
        Ok(())
    }

    /// Release descriptor `fd`
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let desc = self.descriptors.release(fd)?;
        let Ok(fs) = self.fs_mut(desc.node.fs) else {
            // Volume already unmounted; nothing left to notify
            return Ok(());
        };
        let hook = fs.close(desc.node.ino);
        if let Ok(node) = fs.node_mut(desc.node.ino) {
            node.open_count = node.open_count.saturating_sub(1);
        }
        hook
    }

    /// Read from the cursor of `fd`, advancing it by the bytes transferred
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let desc = *self.descriptors.get(fd)?;
        if !desc.readable() {
            return Err(VfsError::WrongAccessMode);
        }
        if self.node(desc.node)?.is_dir() {
            return Err(VfsError::NotAFile);
        }

        let n = self.fs_mut(desc.node.fs)?.read(desc.node.ino, desc.cursor, buf)?;
        self.descriptors.get_mut(fd)?.cursor += n as u64;
        Ok(n)
    }

    /// Write at the cursor of `fd`, advancing it by the bytes transferred
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let desc = *self.descriptors.get(fd)?;
        if !desc.writable() {
            return Err(VfsError::WrongAccessMode);
        }
        if self.node(desc.node)?.is_dir() {
            return Err(VfsError::NotAFile);
        }

        let fs = self.fs_mut(desc.node.fs)?;
        let n = fs.write(desc.node.ino, desc.cursor, buf)?;
        let cursor = desc.cursor + n as u64;
        let node = fs.node_mut(desc.node.ino)?;
        if cursor > node.size {
            node.size = cursor;
        }
        self.descriptors.get_mut(fd)?.cursor = cursor;
        Ok(n)
    }

    /// Move the cursor of `fd`; the result is clamped at zero
    pub fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64> {
        let desc = *self.descriptors.get(fd)?;
        let size = self.node(desc.node)?.size;
        let cursor = seek_target(desc.cursor, size, offset, whence);
        self.descriptors.get_mut(fd)?.cursor = cursor;
        Ok(cursor)
    }

    /// Entry `index` of the directory open on `fd`
    pub fn readdir(&mut self, fd: Fd, index: usize) -> Result<Option<DirEntry>> {
        let desc = *self.descriptors.get(fd)?;
        if !self.node(desc.node)?.is_dir() {
            return Err(VfsError::NotADirectory);
        }
        self.fs_mut(desc.node.fs)?.readdir(desc.node.ino, index)
    }

    /// Cursor position of `fd`
    pub fn tell(&self, fd: Fd) -> Result<u64> {
        Ok(self.descriptors.get(fd)?.cursor)
    }

    /// Number of descriptors in use
    pub fn open_descriptors(&self) -> usize {
        self.descriptors.in_use()
    }

    // ------------------------------------------------------------------
    // Namespace operations
    // ------------------------------------------------------------------

    /// Create directory `path`
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (dir, leaf) = self.resolve_parent(path)?;
        self.fs_mut(dir.fs)?.mkdir(dir.ino, leaf)?;
        Ok(())
    }

    /// Remove regular file `path`
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (dir, leaf) = self.resolve_parent(path)?;
        self.fs_mut(dir.fs)?.unlink(dir.ino, leaf)
    }

    /// Remove empty directory `path`
    ///
    /// # Errors
    /// - `NotEmpty` if it still has children
    /// - `Busy` if a filesystem is mounted on it
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (dir, leaf) = self.resolve_parent(path)?;
        let fs = self.fs_mut(dir.fs)?;
        let ino = fs.finddir(dir.ino, leaf)?;
        if fs.node(ino)?.is_mount_point() {
            return Err(VfsError::Busy);
        }
        fs.rmdir(dir.ino, leaf)
    }

    /// Metadata of the node at `path`
    pub fn stat(&mut self, path: &str) -> Result<Metadata> {
        let target = self.resolve(path)?;
        Ok(Metadata::from_node(target.fs, self.node(target)?))
    }

    /// Metadata of the node open on `fd`
    pub fn fstat(&self, fd: Fd) -> Result<Metadata> {
        let desc = self.descriptors.get(fd)?;
        Ok(Metadata::from_node(desc.node.fs, self.node(desc.node)?))
    }

    /// Flush every mounted backend, reporting the first failure
    pub fn sync(&mut self) -> Result<()> {
        let mut first_err = None;
        for fs in self.filesystems.iter_mut().flatten() {
            if let Err(e) = fs.sync() {
                log::warn!("vfs: sync of {} failed: {}", fs.fs_type(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
