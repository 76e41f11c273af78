//! Open-file table
//!
//! A bounded table of descriptor slots. Each in-use slot binds a node to a
//! byte cursor and the access mode it was opened with.

use alloc::vec::Vec;
use bitflags::bitflags;

use crate::error::{Result, VfsError};
use crate::node::NodeRef;

/// Caller-visible descriptor number
pub type Fd = usize;

bitflags! {
    /// Flags passed to `open`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ     = 1 << 0;
        const WRITE    = 1 << 1;
        /// Create the leaf if it does not exist
        const CREATE   = 1 << 2;
        /// Cut the file to zero length on open
        const TRUNCATE = 1 << 3;
        /// Start the cursor at end of file
        const APPEND   = 1 << 4;

        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Reference point for `seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// One open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub node: NodeRef,
    pub cursor: u64,
    pub flags: OpenFlags,
}

impl Descriptor {
    pub fn new(node: NodeRef, flags: OpenFlags) -> Self {
        Self {
            node,
            cursor: 0,
            flags,
        }
    }

    pub fn readable(&self) -> bool {
        self.flags.contains(OpenFlags::READ)
    }

    pub fn writable(&self) -> bool {
        self.flags.contains(OpenFlags::WRITE)
    }
}

/// Bounded descriptor table
pub struct DescriptorTable {
    slots: Vec<Option<Descriptor>>,
}

impl DescriptorTable {
    /// Create a table holding at most `capacity` open files
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize(capacity, None);
        Self { slots }
    }

    /// Bind `desc` to the lowest free slot
    ///
    /// # Errors
    /// `TooManyOpenFiles` when every slot is in use.
    pub fn allocate(&mut self, desc: Descriptor) -> Result<Fd> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(VfsError::TooManyOpenFiles)?;
        self.slots[fd] = Some(desc);
        Ok(fd)
    }

    pub fn get(&self, fd: Fd) -> Result<&Descriptor> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(VfsError::InvalidDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut Descriptor> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(VfsError::InvalidDescriptor(fd))
    }

    /// Free slot `fd`, returning what was bound there
    pub fn release(&mut self, fd: Fd) -> Result<Descriptor> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(VfsError::InvalidDescriptor(fd))
    }

    /// Number of slots in use
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Compute a new cursor from `whence` + `offset`, clamped at zero
pub fn seek_target(cursor: u64, size: u64, offset: i64, whence: Whence) -> u64 {
    let base = match whence {
        Whence::Start => 0,
        Whence::Current => cursor as i128,
        Whence::End => size as i128,
    };
    let target = base + offset as i128;
    if target <= 0 {
        0
    } else {
        target.min(u64::MAX as i128) as u64
    }
}
