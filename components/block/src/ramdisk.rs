//! RAM Disk - Memory-backed block device
//!
//! Backs a `BlockDevice` with a heap buffer. Used as the boot ramdisk and as
//! the device under test for filesystem drivers, so it can also be told to
//! fail transfers on demand.

use alloc::vec;
use alloc::vec::Vec;

use crate::{BlockDevice, BlockError, DeviceId, Result, Sector, SECTOR_SIZE};

/// Memory-backed block device
pub struct RamDisk {
    id: DeviceId,
    data: Vec<u8>,

    /// Fail every read when set
    fail_reads: bool,

    /// Number of writes that still succeed before every write fails
    writes_remaining: Option<usize>,

    reads: u64,
    writes: u64,
}

impl RamDisk {
    /// Create a zero-filled disk
    ///
    /// # Arguments
    /// * `id` - Device number
    /// * `sectors` - Capacity in sectors
    pub fn new(id: DeviceId, sectors: u64) -> Self {
        Self {
            id,
            data: vec![0; sectors as usize * SECTOR_SIZE],
            fail_reads: false,
            writes_remaining: None,
            reads: 0,
            writes: 0,
        }
    }

    /// Wrap an existing image; trailing bytes short of a sector are dropped
    pub fn from_image(id: DeviceId, mut image: Vec<u8>) -> Self {
        let whole = image.len() - image.len() % SECTOR_SIZE;
        image.truncate(whole);
        Self {
            id,
            data: image,
            fail_reads: false,
            writes_remaining: None,
            reads: 0,
            writes: 0,
        }
    }

    /// Raw image contents
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Consume the disk and return its image
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    /// Make every subsequent read fail (or succeed again)
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Let `count` more writes succeed, then fail every write
    pub fn fail_writes_after(&mut self, count: usize) {
        self.writes_remaining = Some(count);
    }

    /// Stop injecting write failures
    pub fn clear_write_failures(&mut self) {
        self.writes_remaining = None;
    }

    /// Number of successful sector reads
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    /// Number of successful sector writes
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    fn range(&self, lba: u64) -> Result<core::ops::Range<usize>> {
        if lba >= self.sector_count() {
            return Err(BlockError::OutOfRange {
                device: self.id,
                lba,
            });
        }
        let start = lba as usize * SECTOR_SIZE;
        Ok(start..start + SECTOR_SIZE)
    }
}

impl BlockDevice for RamDisk {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn sector_count(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }

    fn read_sector(&mut self, lba: u64, buf: &mut Sector) -> Result<()> {
        if self.fail_reads {
            return Err(BlockError::DeviceFailure {
                device: self.id,
                lba,
            });
        }
        let range = self.range(lba)?;
        buf.copy_from_slice(&self.data[range]);
        self.reads += 1;
        Ok(())
    }

    fn write_sector(&mut self, lba: u64, buf: &Sector) -> Result<()> {
        if let Some(remaining) = self.writes_remaining.as_mut() {
            if *remaining == 0 {
                log::trace!("{}: injected write failure at LBA {}", self.id, lba);
                return Err(BlockError::DeviceFailure {
                    device: self.id,
                    lba,
                });
            }
            *remaining -= 1;
        }
        let range = self.range(lba)?;
        self.data[range].copy_from_slice(buf);
        self.writes += 1;
        Ok(())
    }
}
