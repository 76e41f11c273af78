//! RamFS - In-memory filesystem
//!
//! Nodes live in an arena keyed by inode number. Each directory owns an
//! ordered list of `(name, inode)` children and each node refers back to its
//! parent by inode number only, so there are no ownership cycles.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Result, VfsError};
use crate::node::{DirEntry, InodeId, Node, NodeType, MAX_NAME_LEN};
use crate::ops::FileSystem;

/// Inode of the RamFS root directory
pub const RAMFS_ROOT: InodeId = 1;

/// Largest file RamFS will hold, matching the 32-bit size of on-disk records
pub const RAMFS_MAX_FILE_SIZE: u64 = u32::MAX as u64;

struct RamNode {
    node: Node,
    data: Vec<u8>,
    children: Vec<(String, InodeId)>,
}

impl RamNode {
    fn new(node: Node) -> Self {
        Self {
            node,
            data: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Zero-extend the contents to `len` bytes
    fn grow(&mut self, len: usize) -> Result<()> {
        self.data
            .try_reserve(len - self.data.len())
            .map_err(|_| VfsError::StorageExhausted)?;
        self.data.resize(len, 0);
        Ok(())
    }
}

/// In-memory filesystem
pub struct RamFs {
    nodes: BTreeMap<InodeId, RamNode>,
    next_ino: InodeId,
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl RamFs {
    /// Create a filesystem holding only an empty root directory
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            RAMFS_ROOT,
            RamNode::new(Node::new("/", RAMFS_ROOT, NodeType::Directory)),
        );
        Self {
            nodes,
            next_ino: RAMFS_ROOT + 1,
        }
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn entry(&self, ino: InodeId) -> Result<&RamNode> {
        self.nodes.get(&ino).ok_or(VfsError::NotFound)
    }

    fn entry_mut(&mut self, ino: InodeId) -> Result<&mut RamNode> {
        self.nodes.get_mut(&ino).ok_or(VfsError::NotFound)
    }

    fn dir(&self, ino: InodeId) -> Result<&RamNode> {
        let entry = self.entry(ino)?;
        if !entry.node.is_dir() {
            return Err(VfsError::NotADirectory);
        }
        Ok(entry)
    }

    fn file_mut(&mut self, ino: InodeId) -> Result<&mut RamNode> {
        let entry = self.entry_mut(ino)?;
        if entry.node.is_dir() {
            return Err(VfsError::NotAFile);
        }
        Ok(entry)
    }

    fn child(&self, dir: InodeId, name: &str) -> Result<Option<InodeId>> {
        Ok(self
            .dir(dir)?
            .children
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, ino)| ino))
    }

    fn insert_child(&mut self, dir: InodeId, name: &str, kind: NodeType) -> Result<InodeId> {
        validate_name(name)?;
        if self.child(dir, name)?.is_some() {
            return Err(VfsError::AlreadyExists);
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        self.nodes
            .insert(ino, RamNode::new(Node::new(name, ino, kind).with_parent(dir)));
        self.entry_mut(dir)?.children.push((name.to_string(), ino));
        log::debug!("ramfs: created {:?} '{}' as inode {}", kind, name, ino);
        Ok(ino)
    }

    fn remove_child(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let parent = self.entry_mut(dir)?;
        let pos = parent
            .children
            .iter()
            .position(|(n, _)| n == name)
            .ok_or(VfsError::NotFound)?;
        let (_, ino) = parent.children.remove(pos);
        self.nodes.remove(&ino);
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(VfsError::invalid_name(name));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VfsError::invalid_name(name));
    }
    Ok(())
}

impl FileSystem for RamFs {
    fn fs_type(&self) -> &'static str {
        "ramfs"
    }

    fn root(&self) -> InodeId {
        RAMFS_ROOT
    }

    fn node(&self, ino: InodeId) -> Result<&Node> {
        self.entry(ino).map(|e| &e.node)
    }

    fn node_mut(&mut self, ino: InodeId) -> Result<&mut Node> {
        self.entry_mut(ino).map(|e| &mut e.node)
    }

    fn read(&mut self, ino: InodeId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let file = self.file_mut(ino)?;
        let len = file.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(file.data.len() - start);
        buf[..n].copy_from_slice(&file.data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, ino: InodeId, offset: u64, buf: &[u8]) -> Result<usize> {
        let file = self.file_mut(ino)?;
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= RAMFS_MAX_FILE_SIZE)
            .ok_or(VfsError::StorageExhausted)?;
        let (start, end) = (offset as usize, end as usize);
        if end > file.data.len() {
            // Gap between the old end and `offset` reads back as zeros
            file.grow(end)?;
        }
        file.data[start..end].copy_from_slice(buf);
        file.node.size = file.data.len() as u64;
        Ok(buf.len())
    }

    fn readdir(&mut self, dir: InodeId, index: usize) -> Result<Option<DirEntry>> {
        let parent = self.dir(dir)?;
        let Some(&(ref name, ino)) = parent.children.get(index) else {
            return Ok(None);
        };
        let kind = self.entry(ino)?.node.kind;
        Ok(Some(DirEntry {
            name: name.clone(),
            inode: ino,
            kind,
        }))
    }

    fn finddir(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.child(dir, name)?.ok_or(VfsError::NotFound)
    }

    fn create(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.insert_child(dir, name, NodeType::File)
    }

    fn unlink(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let ino = self.child(dir, name)?.ok_or(VfsError::NotFound)?;
        if self.entry(ino)?.node.is_dir() {
            return Err(VfsError::NotAFile);
        }
        self.remove_child(dir, name)?;
        log::debug!("ramfs: unlinked '{}'", name);
        Ok(())
    }

    fn mkdir(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        self.insert_child(dir, name, NodeType::Directory)
    }

    fn rmdir(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let ino = self.child(dir, name)?.ok_or(VfsError::NotFound)?;
        let target = self.dir(ino)?;
        if !target.children.is_empty() {
            return Err(VfsError::NotEmpty);
        }
        self.remove_child(dir, name)?;
        log::debug!("ramfs: removed directory '{}'", name);
        Ok(())
    }

    fn truncate(&mut self, ino: InodeId, size: u64) -> Result<()> {
        if size > RAMFS_MAX_FILE_SIZE {
            return Err(VfsError::StorageExhausted);
        }
        let file = self.file_mut(ino)?;
        if size as usize > file.data.len() {
            file.grow(size as usize)?;
        } else {
            file.data.truncate(size as usize);
        }
        file.node.size = size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let mut fs = RamFs::new();
        let ino = fs.create(RAMFS_ROOT, "a.txt").unwrap();
        assert_eq!(fs.finddir(RAMFS_ROOT, "a.txt").unwrap(), ino);
        assert_eq!(fs.node(ino).unwrap().parent, Some(RAMFS_ROOT));
        assert_eq!(fs.finddir(RAMFS_ROOT, "b.txt"), Err(VfsError::NotFound));
        assert_eq!(fs.create(RAMFS_ROOT, "a.txt"), Err(VfsError::AlreadyExists));
    }

    #[test]
    fn test_invalid_names() {
        let mut fs = RamFs::new();
        assert!(matches!(fs.create(RAMFS_ROOT, ""), Err(VfsError::InvalidName(_))));
        assert!(matches!(fs.mkdir(RAMFS_ROOT, ".."), Err(VfsError::InvalidName(_))));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(fs.create(RAMFS_ROOT, &long), Err(VfsError::InvalidName(_))));
    }

    #[test]
    fn test_read_write_with_gap() {
        let mut fs = RamFs::new();
        let ino = fs.create(RAMFS_ROOT, "f").unwrap();
        assert_eq!(fs.write(ino, 4, b"abc").unwrap(), 3);
        assert_eq!(fs.node(ino).unwrap().size, 7);

        let mut buf = [0xFFu8; 16];
        let n = fs.read(ino, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"\0\0\0\0abc");
        assert_eq!(fs.read(ino, 7, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_readdir_order() {
        let mut fs = RamFs::new();
        fs.create(RAMFS_ROOT, "one").unwrap();
        fs.mkdir(RAMFS_ROOT, "two").unwrap();
        fs.create(RAMFS_ROOT, "three").unwrap();

        let names: Vec<String> = (0..)
            .map_while(|i| fs.readdir(RAMFS_ROOT, i).unwrap())
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["one", "two", "three"]);
        assert_eq!(fs.readdir(RAMFS_ROOT, 1).unwrap().unwrap().kind, NodeType::Directory);
    }

    #[test]
    fn test_rmdir_requires_empty() {
        let mut fs = RamFs::new();
        let dir = fs.mkdir(RAMFS_ROOT, "d").unwrap();
        fs.create(dir, "inner").unwrap();

        assert_eq!(fs.rmdir(RAMFS_ROOT, "d"), Err(VfsError::NotEmpty));
        fs.unlink(dir, "inner").unwrap();
        fs.rmdir(RAMFS_ROOT, "d").unwrap();
        assert_eq!(fs.node_count(), 1);
    }

    #[test]
    fn test_type_mismatches() {
        let mut fs = RamFs::new();
        let file = fs.create(RAMFS_ROOT, "f").unwrap();
        fs.mkdir(RAMFS_ROOT, "d").unwrap();

        assert_eq!(fs.unlink(RAMFS_ROOT, "d"), Err(VfsError::NotAFile));
        assert_eq!(fs.rmdir(RAMFS_ROOT, "f"), Err(VfsError::NotADirectory));
        assert_eq!(fs.create(file, "x"), Err(VfsError::NotADirectory));
        let mut buf = [0u8; 1];
        assert_eq!(fs.read(RAMFS_ROOT, 0, &mut buf), Err(VfsError::NotAFile));
    }

    #[test]
    fn test_write_beyond_max_size() {
        let mut fs = RamFs::new();
        let ino = fs.create(RAMFS_ROOT, "f").unwrap();
        assert_eq!(
            fs.write(ino, u64::MAX, b"x"),
            Err(VfsError::StorageExhausted)
        );
        assert_eq!(
            fs.write(ino, RAMFS_MAX_FILE_SIZE, b"x"),
            Err(VfsError::StorageExhausted)
        );
        assert_eq!(
            fs.truncate(ino, RAMFS_MAX_FILE_SIZE + 1),
            Err(VfsError::StorageExhausted)
        );
        assert_eq!(fs.node(ino).unwrap().size, 0);
    }

    #[test]
    fn test_truncate() {
        let mut fs = RamFs::new();
        let ino = fs.create(RAMFS_ROOT, "f").unwrap();
        fs.write(ino, 0, b"hello world").unwrap();
        fs.truncate(ino, 5).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(ino, 0, &mut buf).unwrap(), 5);
        assert_eq!(fs.node(ino).unwrap().size, 5);
    }
}
