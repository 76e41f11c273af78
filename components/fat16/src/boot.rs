//! FAT16 boot sector and derived volume layout
//!
//! The boot sector is decoded field by field from its little-endian on-disk
//! form rather than transmuted, so the struct below carries no `repr`
//! requirements.
//!
//! ```text
//! offset  size  field
//!   0      3    jump
//!   3      8    OEM name
//!  11      2    bytes per sector
//!  13      1    sectors per cluster
//!  14      2    reserved sectors
//!  16      1    FAT copies
//!  17      2    root entries
//!  19      2    total sectors (small)
//!  21      1    media descriptor
//!  22      2    sectors per FAT
//!  24      2    sectors per track
//!  26      2    heads
//!  28      4    hidden sectors
//!  32      4    total sectors (large)
//!  36      1    drive number
//!  37      1    reserved
//!  38      1    extended boot signature
//!  39      4    volume id
//!  43     11    volume label
//!  54      8    filesystem type
//!  62    448    boot code
//! 510      2    signature (0xAA55)
//! ```

use kaal_block::{Sector, SECTOR_SIZE};
use static_assertions::const_assert_eq;

use crate::error::{FatError, Result};
use crate::record::RECORD_SIZE;

/// Required value of the last two bytes
pub const BOOT_SIGNATURE: u16 = 0xAA55;

const BOOT_CODE_OFFSET: usize = 62;
const BOOT_CODE_LEN: usize = 448;
const SIGNATURE_OFFSET: usize = 510;

const_assert_eq!(BOOT_CODE_OFFSET + BOOT_CODE_LEN, SIGNATURE_OFFSET);
const_assert_eq!(SIGNATURE_OFFSET + 2, SECTOR_SIZE);

/// Decoded FAT16 boot sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub jump: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub total_sectors_small: u16,
    pub media: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_large: u32,
    pub drive_number: u8,
    pub reserved: u8,
    pub ext_boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
    pub boot_code: [u8; BOOT_CODE_LEN],
    pub signature: u16,
}

fn u16_at(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn array_at<const N: usize>(b: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[at..at + N]);
    out
}

impl BootSector {
    /// Decode a boot sector
    ///
    /// # Errors
    /// `InvalidBootSector` if the trailing signature is not 0xAA55.
    pub fn parse(sector: &Sector) -> Result<Self> {
        let b = &sector[..];
        let signature = u16_at(b, SIGNATURE_OFFSET);
        if signature != BOOT_SIGNATURE {
            return Err(FatError::InvalidBootSector("missing 0xAA55 signature"));
        }

        Ok(Self {
            jump: array_at(b, 0),
            oem_name: array_at(b, 3),
            bytes_per_sector: u16_at(b, 11),
            sectors_per_cluster: b[13],
            reserved_sectors: u16_at(b, 14),
            fat_count: b[16],
            root_entries: u16_at(b, 17),
            total_sectors_small: u16_at(b, 19),
            media: b[21],
            sectors_per_fat: u16_at(b, 22),
            sectors_per_track: u16_at(b, 24),
            heads: u16_at(b, 26),
            hidden_sectors: u32_at(b, 28),
            total_sectors_large: u32_at(b, 32),
            drive_number: b[36],
            reserved: b[37],
            ext_boot_signature: b[38],
            volume_id: u32_at(b, 39),
            volume_label: array_at(b, 43),
            fs_type: array_at(b, 54),
            boot_code: array_at(b, BOOT_CODE_OFFSET),
            signature,
        })
    }

    /// Encode back to the on-disk form
    pub fn to_bytes(&self) -> Sector {
        let mut b = [0u8; SECTOR_SIZE];
        b[0..3].copy_from_slice(&self.jump);
        b[3..11].copy_from_slice(&self.oem_name);
        b[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        b[13] = self.sectors_per_cluster;
        b[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        b[16] = self.fat_count;
        b[17..19].copy_from_slice(&self.root_entries.to_le_bytes());
        b[19..21].copy_from_slice(&self.total_sectors_small.to_le_bytes());
        b[21] = self.media;
        b[22..24].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        b[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        b[26..28].copy_from_slice(&self.heads.to_le_bytes());
        b[28..32].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        b[32..36].copy_from_slice(&self.total_sectors_large.to_le_bytes());
        b[36] = self.drive_number;
        b[37] = self.reserved;
        b[38] = self.ext_boot_signature;
        b[39..43].copy_from_slice(&self.volume_id.to_le_bytes());
        b[43..54].copy_from_slice(&self.volume_label);
        b[54..62].copy_from_slice(&self.fs_type);
        b[BOOT_CODE_OFFSET..SIGNATURE_OFFSET].copy_from_slice(&self.boot_code);
        b[SIGNATURE_OFFSET..].copy_from_slice(&self.signature.to_le_bytes());
        b
    }

    /// Total sectors, whichever of the two fields is in use
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_small != 0 {
            self.total_sectors_small as u32
        } else {
            self.total_sectors_large
        }
    }
}

/// Volume layout derived from the boot sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// LBA of the boot sector
    pub partition_start: u64,
    pub sectors_per_cluster: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub root_entries: u32,
    pub total_sectors: u32,

    /// First sector of FAT copy 0
    pub fat_start: u64,
    /// First sector of the fixed root directory region
    pub root_dir_start: u64,
    /// Length of the root directory region in sectors
    pub root_dir_sectors: u32,
    /// First sector of cluster 2
    pub data_start: u64,
    /// Number of addressable data clusters (indices 2..=total_clusters+1)
    pub total_clusters: u32,
}

/// Highest cluster count FAT16 can address before the reserved values
pub const MAX_CLUSTERS: u32 = 0xFFF4;

impl Layout {
    /// Derive the layout of a volume whose boot sector sits at `partition_start`
    ///
    /// # Errors
    /// `UnsupportedGeometry` for anything other than 512-byte sectors, a
    /// non-power-of-two cluster size, or a volume too small for its own
    /// metadata.
    pub fn from_boot(boot: &BootSector, partition_start: u64) -> Result<Self> {
        if boot.bytes_per_sector as usize != SECTOR_SIZE {
            return Err(FatError::UnsupportedGeometry("only 512-byte sectors are supported"));
        }
        if boot.sectors_per_cluster == 0 || !boot.sectors_per_cluster.is_power_of_two() {
            return Err(FatError::UnsupportedGeometry("sectors per cluster must be a power of two"));
        }
        if boot.fat_count == 0 || boot.sectors_per_fat == 0 || boot.reserved_sectors == 0 {
            return Err(FatError::UnsupportedGeometry("missing FAT or reserved region"));
        }
        if boot.root_entries == 0 {
            return Err(FatError::UnsupportedGeometry("root directory has no entries"));
        }

        let sectors_per_cluster = boot.sectors_per_cluster as u32;
        let fat_count = boot.fat_count as u32;
        let sectors_per_fat = boot.sectors_per_fat as u32;
        let root_entries = boot.root_entries as u32;
        let total_sectors = boot.total_sectors();

        let root_dir_sectors =
            (root_entries * RECORD_SIZE as u32).div_ceil(SECTOR_SIZE as u32);
        let fat_start = partition_start + boot.reserved_sectors as u64;
        let root_dir_start = fat_start + (fat_count * sectors_per_fat) as u64;
        let data_start = root_dir_start + root_dir_sectors as u64;

        let metadata_sectors = (data_start - partition_start) as u32;
        if total_sectors <= metadata_sectors {
            return Err(FatError::UnsupportedGeometry("volume too small for its metadata"));
        }
        let data_clusters = (total_sectors - metadata_sectors) / sectors_per_cluster;

        // The table can only describe as many clusters as it has slots for
        let table_slots = sectors_per_fat * (SECTOR_SIZE as u32 / 2);
        let total_clusters = data_clusters.min(table_slots - 2).min(MAX_CLUSTERS);
        if total_clusters < data_clusters {
            log::warn!(
                "fat16: only {} of {} data clusters are addressable",
                total_clusters,
                data_clusters
            );
        }

        Ok(Self {
            partition_start,
            sectors_per_cluster,
            fat_count,
            sectors_per_fat,
            root_entries,
            total_sectors,
            fat_start,
            root_dir_start,
            root_dir_sectors,
            data_start,
            total_clusters,
        })
    }

    /// Bytes in one cluster
    pub fn cluster_bytes(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    /// First sector of data cluster `cluster` (must be >= 2)
    pub fn cluster_lba(&self, cluster: u16) -> u64 {
        self.data_start + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    /// Highest valid data cluster index
    pub fn max_cluster(&self) -> u16 {
        (self.total_clusters + 1) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_boot() -> BootSector {
        BootSector {
            jump: [0xEB, 0x3C, 0x90],
            oem_name: *b"KAAL    ",
            bytes_per_sector: 512,
            sectors_per_cluster: 4,
            reserved_sectors: 1,
            fat_count: 2,
            root_entries: 512,
            total_sectors_small: 20480,
            media: 0xF8,
            sectors_per_fat: 20,
            sectors_per_track: 32,
            heads: 64,
            hidden_sectors: 0,
            total_sectors_large: 0,
            drive_number: 0x80,
            reserved: 0,
            ext_boot_signature: 0x29,
            volume_id: 0x1234_5678,
            volume_label: *b"KAAL       ",
            fs_type: *b"FAT16   ",
            boot_code: [0; BOOT_CODE_LEN],
            signature: BOOT_SIGNATURE,
        }
    }

    #[test]
    fn test_boot_sector_encoding() {
        let boot = sample_boot();
        let bytes = boot.to_bytes();
        assert_eq!(&bytes[11..13], &[0x00, 0x02]);
        assert_eq!(bytes[13], 4);
        assert_eq!(&bytes[54..62], b"FAT16   ");
        assert_eq!(&bytes[510..], &[0x55, 0xAA]);
        assert_eq!(BootSector::parse(&bytes).unwrap(), boot);
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut bytes = sample_boot().to_bytes();
        bytes[511] = 0;
        assert!(matches!(
            BootSector::parse(&bytes),
            Err(FatError::InvalidBootSector(_))
        ));
    }

    #[test]
    fn test_layout_formulas() {
        let layout = Layout::from_boot(&sample_boot(), 0).unwrap();
        assert_eq!(layout.fat_start, 1);
        assert_eq!(layout.root_dir_start, 1 + 2 * 20);
        assert_eq!(layout.root_dir_sectors, 32);
        assert_eq!(layout.data_start, 41 + 32);
        assert_eq!(layout.total_clusters, (20480 - 73) / 4);
        assert_eq!(layout.cluster_bytes(), 2048);
        assert_eq!(layout.cluster_lba(2), 73);
        assert_eq!(layout.cluster_lba(3), 77);
    }

    #[test]
    fn test_layout_with_partition_offset() {
        let layout = Layout::from_boot(&sample_boot(), 2048).unwrap();
        assert_eq!(layout.fat_start, 2049);
        assert_eq!(layout.data_start, 2048 + 73);
    }

    #[test]
    fn test_large_total_sectors_field() {
        let mut boot = sample_boot();
        boot.total_sectors_small = 0;
        boot.total_sectors_large = 100_000;
        assert_eq!(boot.total_sectors(), 100_000);
    }

    #[test]
    fn test_unsupported_geometry() {
        let mut boot = sample_boot();
        boot.bytes_per_sector = 4096;
        assert!(Layout::from_boot(&boot, 0).is_err());

        let mut boot = sample_boot();
        boot.sectors_per_cluster = 3;
        assert!(Layout::from_boot(&boot, 0).is_err());

        let mut boot = sample_boot();
        boot.total_sectors_small = 50;
        assert!(Layout::from_boot(&boot, 0).is_err());
    }

    #[test]
    fn test_cluster_count_capped_by_table() {
        let mut boot = sample_boot();
        boot.sectors_per_fat = 1;
        boot.reserved_sectors = 1;
        // 1 FAT sector holds 256 slots, two of them reserved
        let layout = Layout::from_boot(&boot, 0).unwrap();
        assert_eq!(layout.total_clusters, 254);
    }
}
