//! FAT table manager
//!
//! The whole allocation table is cached in memory at mount time. Every
//! mutation only marks the cache dirty; [`FatTable::sync`] is the one path
//! that persists it, writing the full table to every FAT copy.

use alloc::vec;
use alloc::vec::Vec;
use kaal_block::{BlockDevice, SECTOR_SIZE};

use crate::boot::Layout;
use crate::error::{FatError, Result};

/// Slot value of an unallocated cluster
pub const FAT_FREE: u16 = 0x0000;

/// Slot value of a cluster marked unusable
pub const FAT_BAD: u16 = 0xFFF7;

/// Lowest slot value that terminates a chain
pub const FAT_EOC_MIN: u16 = 0xFFF8;

/// Value written when terminating a chain
pub const FAT_EOC: u16 = 0xFFFF;

/// First cluster index that addresses data
pub const FIRST_DATA_CLUSTER: u16 = 2;

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / 2;

/// True when `value` ends a chain
pub fn is_end_of_chain(value: u16) -> bool {
    value >= FAT_EOC_MIN
}

/// In-memory copy of the allocation table
pub struct FatTable {
    entries: Vec<u16>,
    max_cluster: u16,
    dirty: bool,
}

impl FatTable {
    /// Empty table for a fresh volume: slot 0 carries the media byte, slot 1
    /// an end-of-chain marker, everything else free
    pub fn blank(layout: &Layout, media: u8) -> Self {
        let mut entries = vec![FAT_FREE; layout.sectors_per_fat as usize * ENTRIES_PER_SECTOR];
        entries[0] = 0xFF00 | media as u16;
        entries[1] = FAT_EOC;
        Self {
            entries,
            max_cluster: layout.max_cluster(),
            dirty: true,
        }
    }

    /// Read FAT copy 0 into memory
    pub fn load<D: BlockDevice>(dev: &mut D, layout: &Layout) -> Result<Self> {
        let mut raw = vec![0u8; layout.sectors_per_fat as usize * SECTOR_SIZE];
        dev.read_sectors(layout.fat_start, &mut raw)?;
        let entries = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self {
            entries,
            max_cluster: layout.max_cluster(),
            dirty: false,
        })
    }

    fn in_range(&self, cluster: u16) -> bool {
        (FIRST_DATA_CLUSTER..=self.max_cluster).contains(&cluster)
    }

    /// Highest valid data cluster
    pub fn max_cluster(&self) -> u16 {
        self.max_cluster
    }

    /// Successor of `cluster`; out-of-range indices read as end-of-chain
    pub fn next(&self, cluster: u16) -> u16 {
        if !self.in_range(cluster) {
            return FAT_EOC;
        }
        self.entries[cluster as usize]
    }

    /// Overwrite the slot for `cluster`; out-of-range indices are ignored
    pub fn set(&mut self, cluster: u16, value: u16) {
        if !self.in_range(cluster) {
            return;
        }
        self.entries[cluster as usize] = value;
        self.dirty = true;
    }

    /// Claim the lowest free cluster and mark it end-of-chain
    ///
    /// # Errors
    /// `StorageExhausted` when no free cluster remains.
    pub fn allocate(&mut self) -> Result<u16> {
        let found = (FIRST_DATA_CLUSTER..=self.max_cluster)
            .find(|&c| self.entries[c as usize] == FAT_FREE);
        match found {
            Some(cluster) => {
                self.set(cluster, FAT_EOC);
                Ok(cluster)
            }
            None => {
                log::warn!("fat16: no free cluster left");
                Err(FatError::StorageExhausted)
            }
        }
    }

    /// Allocate a cluster and link it after `tail`
    pub fn extend(&mut self, tail: u16) -> Result<u16> {
        let cluster = self.allocate()?;
        self.set(tail, cluster);
        Ok(cluster)
    }

    /// Free every cluster reachable from `start`; returns how many were freed
    pub fn free_chain(&mut self, start: u16) -> usize {
        let mut cluster = start;
        let mut freed = 0;
        // A chain can never be longer than the volume
        while self.in_range(cluster) && freed <= self.max_cluster as usize {
            let next = self.entries[cluster as usize];
            if next == FAT_FREE {
                break;
            }
            self.set(cluster, FAT_FREE);
            freed += 1;
            if is_end_of_chain(next) {
                break;
            }
            cluster = next;
        }
        freed
    }

    /// Every cluster of the chain starting at `start`, in order
    ///
    /// # Errors
    /// `CorruptChain` if the chain runs into a free, bad or out-of-range
    /// slot, or loops.
    pub fn chain(&self, start: u16) -> Result<Vec<u16>> {
        let mut clusters = Vec::new();
        if start == FAT_FREE {
            return Ok(clusters);
        }
        let mut cluster = start;
        loop {
            if !self.in_range(cluster) || clusters.len() > self.max_cluster as usize {
                return Err(FatError::CorruptChain { cluster });
            }
            clusters.push(cluster);
            let next = self.entries[cluster as usize];
            if is_end_of_chain(next) {
                return Ok(clusters);
            }
            if next == FAT_FREE || next == FAT_BAD {
                return Err(FatError::CorruptChain { cluster });
            }
            cluster = next;
        }
    }

    /// Data clusters currently allocated (including bad ones)
    pub fn used_clusters(&self) -> usize {
        (FIRST_DATA_CLUSTER..=self.max_cluster)
            .filter(|&c| self.entries[c as usize] != FAT_FREE)
            .count()
    }

    pub fn free_clusters(&self) -> usize {
        (self.max_cluster as usize + 1 - FIRST_DATA_CLUSTER as usize) - self.used_clusters()
    }

    /// True when the cache holds changes not yet on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the table to every FAT copy
    ///
    /// The dirty flag is cleared only if every sector of every copy was
    /// written, so a failed sync is retried by the next one.
    pub fn sync<D: BlockDevice>(&mut self, dev: &mut D, layout: &Layout) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let raw: Vec<u8> = self.entries.iter().flat_map(|v| v.to_le_bytes()).collect();
        for copy in 0..layout.fat_count as u64 {
            let base = layout.fat_start + copy * layout.sectors_per_fat as u64;
            if let Err(e) = dev.write_sectors(base, &raw) {
                log::warn!("fat16: table sync failed, keeping dirty state: {}", e);
                return Err(e.into());
            }
        }

        self.dirty = false;
        log::debug!(
            "fat16: table synced to {} copies ({} clusters in use)",
            layout.fat_count,
            self.used_clusters()
        );
        Ok(())
    }
}
