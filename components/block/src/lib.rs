//! Block I/O - Sector-granular access to storage devices
//!
//! # Purpose
//! Defines the contract every storage driver exposes to filesystems: fixed
//! 512-byte sectors addressed by logical block address (LBA) on a numbered
//! device. A transfer either completes for the whole sector or fails; there
//! are no partial-sector semantics.
//!
//! # Integration Points
//! - Depends on: Storage drivers (virtio-blk, SD, RAM)
//! - Provides to: Filesystem drivers (FAT16)
//! - IPC endpoints: None (in-process contract)
//! - Capabilities required: Device MMIO/DMA access, held by the driver
//!
//! # Testing Strategy
//! - Unit tests: RamDisk bounds checks and failure injection
//! - Integration tests: Exercised through the FAT16 driver

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

mod ramdisk;

pub use ramdisk::RamDisk;

use core::fmt;
use thiserror::Error;

/// Sector size in bytes
pub const SECTOR_SIZE: usize = 512;

/// One sector worth of data
pub type Sector = [u8; SECTOR_SIZE];

/// Numbered block device identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u8);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk{}", self.0)
    }
}

/// Block device error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("LBA {lba} out of range on {device}")]
    OutOfRange { device: DeviceId, lba: u64 },

    #[error("{device} failed transfer at LBA {lba}")]
    DeviceFailure { device: DeviceId, lba: u64 },

    #[error("buffer of {len} bytes is not a whole number of sectors")]
    Misaligned { len: usize },
}

pub type Result<T> = core::result::Result<T, BlockError>;

/// Sector-addressed storage device
///
/// Transfers are synchronous and blocking at sector granularity. A failing
/// device reports the failure immediately; callers never retry on their own.
pub trait BlockDevice {
    /// Device number
    fn id(&self) -> DeviceId;

    /// Device capacity in sectors
    fn sector_count(&self) -> u64;

    /// Read one sector at `lba` into `buf`
    fn read_sector(&mut self, lba: u64, buf: &mut Sector) -> Result<()>;

    /// Write one sector from `buf` to `lba`
    fn write_sector(&mut self, lba: u64, buf: &Sector) -> Result<()>;

    /// Read consecutive sectors starting at `lba`
    ///
    /// # Errors
    /// Returns `Misaligned` if `buf` is not a multiple of `SECTOR_SIZE`, or
    /// the first failing sector's error.
    fn read_sectors(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() % SECTOR_SIZE != 0 {
            return Err(BlockError::Misaligned { len: buf.len() });
        }
        for (i, chunk) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let len = chunk.len();
            let sector: &mut Sector = chunk
                .try_into()
                .map_err(|_| BlockError::Misaligned { len })?;
            self.read_sector(lba + i as u64, sector)?;
        }
        Ok(())
    }

    /// Write consecutive sectors starting at `lba`
    ///
    /// # Errors
    /// Same as [`BlockDevice::read_sectors`].
    fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        if buf.len() % SECTOR_SIZE != 0 {
            return Err(BlockError::Misaligned { len: buf.len() });
        }
        for (i, chunk) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
            let sector: &Sector = chunk
                .try_into()
                .map_err(|_| BlockError::Misaligned { len: chunk.len() })?;
            self.write_sector(lba + i as u64, sector)?;
        }
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn id(&self) -> DeviceId {
        (**self).id()
    }

    fn sector_count(&self) -> u64 {
        (**self).sector_count()
    }

    fn read_sector(&mut self, lba: u64, buf: &mut Sector) -> Result<()> {
        (**self).read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u64, buf: &Sector) -> Result<()> {
        (**self).write_sector(lba, buf)
    }
}
