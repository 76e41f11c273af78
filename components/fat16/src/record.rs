//! 32-byte directory records
//!
//! ```text
//! offset  size  field
//!   0     11    8.3 name
//!  11      1    attributes
//!  12      1    reserved
//!  13      1    creation time, tenths of a second
//!  14      2    creation time
//!  16      2    creation date
//!  18      2    last access date
//!  20      2    first cluster, high word (always 0 on FAT16)
//!  22      2    modification time
//!  24      2    modification date
//!  26      2    first cluster, low word
//!  28      4    size in bytes
//! ```

use bitflags::bitflags;
use kaal_block::SECTOR_SIZE;
use static_assertions::const_assert_eq;

use crate::name::{ShortName, NAME_LEN};

/// Size of one directory record
pub const RECORD_SIZE: usize = 32;

/// Records in one sector
pub const RECORDS_PER_SECTOR: usize = SECTOR_SIZE / RECORD_SIZE;

const_assert_eq!(RECORDS_PER_SECTOR * RECORD_SIZE, SECTOR_SIZE);
const_assert_eq!(RECORDS_PER_SECTOR, 16);

/// First name byte of a tombstoned record
pub const DELETED_MARKER: u8 = 0xE5;

/// First name byte of the record that ends a directory
pub const END_MARKER: u8 = 0x00;

/// 1980-01-01, the FAT epoch
pub const DEFAULT_DATE: u16 = (1 << 5) | 1;

bitflags! {
    /// Attribute byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
    }
}

impl Attributes {
    /// Combination marking a long-name fragment rather than a real entry
    pub const LONG_NAME: Self = Self::from_bits_retain(0x0F);

    pub fn is_long_name(self) -> bool {
        self.contains(Self::LONG_NAME)
    }
}

/// Decoded directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirRecord {
    pub name: ShortName,
    pub attributes: Attributes,
    pub reserved: u8,
    pub create_tenths: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub cluster_high: u16,
    pub modify_time: u16,
    pub modify_date: u16,
    pub first_cluster: u16,
    pub size: u32,
}

impl DirRecord {
    fn fresh(name: ShortName, attributes: Attributes, first_cluster: u16) -> Self {
        Self {
            name,
            attributes,
            reserved: 0,
            create_tenths: 0,
            create_time: 0,
            create_date: DEFAULT_DATE,
            access_date: DEFAULT_DATE,
            cluster_high: 0,
            modify_time: 0,
            modify_date: DEFAULT_DATE,
            first_cluster,
            size: 0,
        }
    }

    /// Empty regular file with no clusters
    pub fn new_file(name: ShortName) -> Self {
        Self::fresh(name, Attributes::ARCHIVE, 0)
    }

    /// Directory whose records live in `first_cluster`
    pub fn new_dir(name: ShortName, first_cluster: u16) -> Self {
        Self::fresh(name, Attributes::DIRECTORY, first_cluster)
    }

    /// Decode one record; `raw` must be at least [`RECORD_SIZE`] bytes
    pub fn parse(raw: &[u8]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[..NAME_LEN]);

        Self {
            name: ShortName(name),
            attributes: Attributes::from_bits_retain(raw[11]),
            reserved: raw[12],
            create_tenths: raw[13],
            create_time: u16_at(14),
            create_date: u16_at(16),
            access_date: u16_at(18),
            cluster_high: u16_at(20),
            modify_time: u16_at(22),
            modify_date: u16_at(24),
            first_cluster: u16_at(26),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    /// Encode into the first [`RECORD_SIZE`] bytes of `out`
    pub fn write_to(&self, out: &mut [u8]) {
        out[..NAME_LEN].copy_from_slice(&self.name.0);
        out[11] = self.attributes.bits();
        out[12] = self.reserved;
        out[13] = self.create_tenths;
        out[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        out[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        out[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        out[20..22].copy_from_slice(&self.cluster_high.to_le_bytes());
        out[22..24].copy_from_slice(&self.modify_time.to_le_bytes());
        out[24..26].copy_from_slice(&self.modify_date.to_le_bytes());
        out[26..28].copy_from_slice(&self.first_cluster.to_le_bytes());
        out[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        self.write_to(&mut out);
        out
    }

    /// Record marks the end of the directory
    pub fn is_end(&self) -> bool {
        self.name.0[0] == END_MARKER
    }

    /// Record is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.name.0[0] == DELETED_MARKER
    }

    /// Slot may be reused for a new entry
    pub fn is_free(&self) -> bool {
        self.is_end() || self.is_deleted()
    }

    /// Record describes a real file or directory
    pub fn is_live(&self) -> bool {
        !self.is_free()
            && !self.attributes.is_long_name()
            && !self.attributes.contains(Attributes::VOLUME_ID)
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}
