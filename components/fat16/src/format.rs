//! Volume formatter
//!
//! Lays down a fresh FAT16 volume: boot sector, every FAT copy with the
//! media byte and end-of-chain marker in slots 0 and 1, and a zeroed root
//! directory region. Data clusters are left untouched.

use kaal_block::{BlockDevice, Sector, SECTOR_SIZE};

use crate::boot::{BootSector, Layout, BOOT_SIGNATURE, MAX_CLUSTERS};
use crate::error::{FatError, Result};
use crate::record::RECORDS_PER_SECTOR;
use crate::table::FatTable;

/// Geometry and identity of a volume to format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub sectors_per_cluster: u8,
    pub root_entries: u16,
    pub fat_count: u8,
    pub reserved_sectors: u16,
    pub volume_label: [u8; 11],
    pub volume_id: u32,
    pub media: u8,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            sectors_per_cluster: 4,
            root_entries: 512,
            fat_count: 2,
            reserved_sectors: 1,
            volume_label: *b"NO NAME    ",
            volume_id: 0,
            media: 0xF8,
        }
    }
}

impl FormatOptions {
    pub fn with_sectors_per_cluster(mut self, sectors: u8) -> Self {
        self.sectors_per_cluster = sectors;
        self
    }

    pub fn with_root_entries(mut self, entries: u16) -> Self {
        self.root_entries = entries;
        self
    }

    pub fn with_fat_count(mut self, count: u8) -> Self {
        self.fat_count = count;
        self
    }

    pub fn with_reserved_sectors(mut self, sectors: u16) -> Self {
        self.reserved_sectors = sectors;
        self
    }

    /// Upper-cased, space padded, cut at 11 bytes
    pub fn with_label(mut self, label: &str) -> Self {
        self.volume_label = [b' '; 11];
        for (dst, src) in self.volume_label.iter_mut().zip(label.bytes()) {
            *dst = src.to_ascii_uppercase();
        }
        self
    }

    pub fn with_volume_id(mut self, id: u32) -> Self {
        self.volume_id = id;
        self
    }

    pub fn with_media(mut self, media: u8) -> Self {
        self.media = media;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Err(FatError::UnsupportedGeometry("sectors per cluster must be a power of two"));
        }
        if self.root_entries == 0 || self.root_entries as usize % RECORDS_PER_SECTOR != 0 {
            return Err(FatError::UnsupportedGeometry("root entries must fill whole sectors"));
        }
        if self.fat_count == 0 || self.reserved_sectors == 0 {
            return Err(FatError::UnsupportedGeometry("need at least one FAT and one reserved sector"));
        }
        Ok(())
    }
}

/// Smallest FAT size that covers every cluster it leaves room for
fn sectors_per_fat(total: u32, opts: &FormatOptions, root_sectors: u32) -> Result<u32> {
    let too_small = FatError::UnsupportedGeometry("device too small for a FAT16 volume");
    let fixed = opts.reserved_sectors as u32 + root_sectors;
    let mut spf = 1u32;
    loop {
        let metadata = fixed + opts.fat_count as u32 * spf;
        let data = total.checked_sub(metadata).ok_or(too_small.clone())?;
        let clusters = data / opts.sectors_per_cluster as u32;
        if clusters == 0 {
            return Err(too_small);
        }
        let needed = ((clusters + 2) * 2).div_ceil(SECTOR_SIZE as u32);
        if needed <= spf {
            return Ok(spf);
        }
        spf = needed;
    }
}

/// Format the whole device
pub fn format<D: BlockDevice>(dev: &mut D, opts: &FormatOptions) -> Result<Layout> {
    let sectors = dev.sector_count();
    format_partition(dev, 0, sectors, opts)
}

/// Format `sectors` sectors starting at LBA `start`
///
/// # Errors
/// `UnsupportedGeometry` if the options are inconsistent, the range does
/// not fit the device, or the resulting cluster count is outside FAT16.
pub fn format_partition<D: BlockDevice>(
    dev: &mut D,
    start: u64,
    sectors: u64,
    opts: &FormatOptions,
) -> Result<Layout> {
    opts.validate()?;
    if start + sectors > dev.sector_count() {
        return Err(FatError::UnsupportedGeometry("partition extends past end of device"));
    }
    let total = u32::try_from(sectors)
        .map_err(|_| FatError::UnsupportedGeometry("partition too large for FAT16"))?;

    let root_sectors = opts.root_entries as u32 / RECORDS_PER_SECTOR as u32;
    let spf = sectors_per_fat(total, opts, root_sectors)?;
    let spf = u16::try_from(spf)
        .map_err(|_| FatError::UnsupportedGeometry("FAT too large; use larger clusters"))?;

    let metadata = opts.reserved_sectors as u32 + opts.fat_count as u32 * spf as u32 + root_sectors;
    let clusters = (total - metadata) / opts.sectors_per_cluster as u32;
    if clusters > MAX_CLUSTERS {
        return Err(FatError::UnsupportedGeometry("too many clusters; use larger clusters"));
    }

    let (small, large) = match u16::try_from(total) {
        Ok(small) => (small, 0),
        Err(_) => (0, total),
    };
    let boot = BootSector {
        jump: [0xEB, 0x3C, 0x90],
        oem_name: *b"KAAL    ",
        bytes_per_sector: SECTOR_SIZE as u16,
        sectors_per_cluster: opts.sectors_per_cluster,
        reserved_sectors: opts.reserved_sectors,
        fat_count: opts.fat_count,
        root_entries: opts.root_entries,
        total_sectors_small: small,
        media: opts.media,
        sectors_per_fat: spf,
        sectors_per_track: 32,
        heads: 64,
        hidden_sectors: start as u32,
        total_sectors_large: large,
        drive_number: 0x80,
        reserved: 0,
        ext_boot_signature: 0x29,
        volume_id: opts.volume_id,
        volume_label: opts.volume_label,
        fs_type: *b"FAT16   ",
        boot_code: [0; 448],
        signature: BOOT_SIGNATURE,
    };
    let layout = Layout::from_boot(&boot, start)?;

    dev.write_sector(start, &boot.to_bytes())?;
    FatTable::blank(&layout, opts.media).sync(dev, &layout)?;
    let zero: Sector = [0; SECTOR_SIZE];
    for i in 0..layout.root_dir_sectors as u64 {
        dev.write_sector(layout.root_dir_start + i, &zero)?;
    }

    log::info!(
        "fat16: formatted {} sectors at LBA {}: {} clusters of {} bytes, {} root entries",
        total,
        start,
        layout.total_clusters,
        layout.cluster_bytes(),
        opts.root_entries
    );
    Ok(layout)
}
