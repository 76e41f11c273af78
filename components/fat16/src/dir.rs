//! Directory engine
//!
//! FAT keeps the root directory in a fixed run of sectors and every other
//! directory in a cluster chain. [`DirRegion`] describes either address
//! space, and [`DirEngine`] runs the same scan, insert and delete logic
//! over both.

use alloc::vec::Vec;
use kaal_block::{BlockDevice, Sector, SECTOR_SIZE};
use kaal_vfs::InodeId;

use crate::boot::Layout;
use crate::error::{FatError, Result};
use crate::name::ShortName;
use crate::record::{DirRecord, DELETED_MARKER, RECORDS_PER_SECTOR, RECORD_SIZE};
use crate::table::{FatTable, FAT_EOC};

/// Address space holding a directory's records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRegion {
    /// Fixed root directory region
    Root { start: u64, sectors: u32 },
    /// Cluster chain of a subdirectory
    Chain { first_cluster: u16 },
}

/// Exact on-disk position of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordLocation {
    /// Absolute LBA of the sector holding the record
    pub sector: u64,
    /// Byte offset of the record inside that sector
    pub offset: usize,
}

impl RecordLocation {
    /// Node identity derived from the position; records never move, so it
    /// stays stable for the life of the entry
    pub fn inode(&self) -> InodeId {
        self.sector * RECORDS_PER_SECTOR as u64 + (self.offset / RECORD_SIZE) as u64
    }
}

/// Directory operations over a borrowed device, layout and table
pub struct DirEngine<'a, D: BlockDevice> {
    dev: &'a mut D,
    layout: &'a Layout,
    table: &'a mut FatTable,
}

impl<'a, D: BlockDevice> DirEngine<'a, D> {
    pub fn new(dev: &'a mut D, layout: &'a Layout, table: &'a mut FatTable) -> Self {
        Self { dev, layout, table }
    }

    /// Sectors of `region` in address order
    fn sectors(&self, region: DirRegion) -> Result<Vec<u64>> {
        match region {
            DirRegion::Root { start, sectors } => Ok((start..start + sectors as u64).collect()),
            DirRegion::Chain { first_cluster } => {
                let per_cluster = self.layout.sectors_per_cluster as u64;
                let chain = self.table.chain(first_cluster)?;
                Ok(chain
                    .into_iter()
                    .flat_map(|c| {
                        let base = self.layout.cluster_lba(c);
                        base..base + per_cluster
                    })
                    .collect())
            }
        }
    }

    /// Visit records in order until `visit` returns a value or the end
    /// marker is reached
    fn scan<T>(
        &mut self,
        region: DirRegion,
        mut visit: impl FnMut(RecordLocation, &DirRecord) -> Option<T>,
    ) -> Result<Option<T>> {
        let mut sector: Sector = [0; SECTOR_SIZE];
        for lba in self.sectors(region)? {
            self.dev.read_sector(lba, &mut sector)?;
            for (slot, raw) in sector.chunks_exact(RECORD_SIZE).enumerate() {
                let record = DirRecord::parse(raw);
                let location = RecordLocation {
                    sector: lba,
                    offset: slot * RECORD_SIZE,
                };
                if let Some(found) = visit(location, &record) {
                    return Ok(Some(found));
                }
                if record.is_end() {
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Live record called `name`; the record returned is a copy
    pub fn find(
        &mut self,
        region: DirRegion,
        name: &ShortName,
    ) -> Result<Option<(RecordLocation, DirRecord)>> {
        self.scan(region, |loc, rec| {
            (rec.is_live() && rec.name == *name).then_some((loc, *rec))
        })
    }

    /// Live entry number `index`, not counting `.` and `..`
    pub fn entry_at(
        &mut self,
        region: DirRegion,
        index: usize,
    ) -> Result<Option<(RecordLocation, DirRecord)>> {
        let mut seen = 0;
        self.scan(region, |loc, rec| {
            if !rec.is_live() || rec.name.is_dot() {
                return None;
            }
            if seen == index {
                return Some((loc, *rec));
            }
            seen += 1;
            None
        })
    }

    /// True when the directory holds nothing besides `.` and `..`
    pub fn is_empty(&mut self, region: DirRegion) -> Result<bool> {
        let child = self.scan(region, |_, rec| {
            (rec.is_live() && !rec.name.is_dot()).then_some(())
        })?;
        Ok(child.is_none())
    }

    /// First reusable slot (end marker or tombstone)
    ///
    /// A full subdirectory grows by one zeroed cluster.
    ///
    /// # Errors
    /// `DirectoryFull` if the root region has no free slot or a chain cannot
    /// be extended.
    pub fn find_free_slot(&mut self, region: DirRegion) -> Result<RecordLocation> {
        if let Some(slot) = self.scan(region, |loc, rec| rec.is_free().then_some(loc))? {
            return Ok(slot);
        }

        let DirRegion::Chain { first_cluster } = region else {
            log::warn!("fat16: root directory is full");
            return Err(FatError::DirectoryFull);
        };

        let chain = self.table.chain(first_cluster)?;
        let tail = *chain
            .last()
            .ok_or(FatError::CorruptChain { cluster: first_cluster })?;
        let grown = match self.table.extend(tail) {
            Ok(cluster) => cluster,
            Err(FatError::StorageExhausted) => return Err(FatError::DirectoryFull),
            Err(e) => return Err(e),
        };
        if let Err(e) = self.zero_cluster(grown) {
            self.table.set(tail, FAT_EOC);
            self.table.free_chain(grown);
            return Err(e);
        }
        log::debug!(
            "fat16: directory at cluster {} grew by cluster {}",
            first_cluster,
            grown
        );
        Ok(RecordLocation {
            sector: self.layout.cluster_lba(grown),
            offset: 0,
        })
    }

    /// Fill every sector of `cluster` with zeros
    pub fn zero_cluster(&mut self, cluster: u16) -> Result<()> {
        let zero: Sector = [0; SECTOR_SIZE];
        let base = self.layout.cluster_lba(cluster);
        for i in 0..self.layout.sectors_per_cluster as u64 {
            self.dev.write_sector(base + i, &zero)?;
        }
        Ok(())
    }

    pub fn read_record(&mut self, location: RecordLocation) -> Result<DirRecord> {
        let mut sector: Sector = [0; SECTOR_SIZE];
        self.dev.read_sector(location.sector, &mut sector)?;
        Ok(DirRecord::parse(&sector[location.offset..]))
    }

    /// Read-modify-write of the sector owning `location`
    pub fn write_record(&mut self, location: RecordLocation, record: &DirRecord) -> Result<()> {
        let mut sector: Sector = [0; SECTOR_SIZE];
        self.dev.read_sector(location.sector, &mut sector)?;
        record.write_to(&mut sector[location.offset..location.offset + RECORD_SIZE]);
        self.dev.write_sector(location.sector, &sector)?;
        Ok(())
    }

    /// Mark the record deleted; only the first name byte changes
    pub fn tombstone(&mut self, location: RecordLocation) -> Result<()> {
        let mut sector: Sector = [0; SECTOR_SIZE];
        self.dev.read_sector(location.sector, &mut sector)?;
        sector[location.offset] = DELETED_MARKER;
        self.dev.write_sector(location.sector, &sector)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{format, FormatOptions};
    use kaal_block::{DeviceId, RamDisk};

    struct Fixture {
        disk: RamDisk,
        layout: Layout,
        table: FatTable,
    }

    impl Fixture {
        fn new(opts: FormatOptions) -> Self {
            let mut disk = RamDisk::new(DeviceId(0), 8192);
            let layout = format(&mut disk, &opts).unwrap();
            let table = FatTable::load(&mut disk, &layout).unwrap();
            Self {
                disk,
                layout,
                table,
            }
        }

        fn engine(&mut self) -> DirEngine<'_, RamDisk> {
            DirEngine::new(&mut self.disk, &self.layout, &mut self.table)
        }

        fn root(&self) -> DirRegion {
            DirRegion::Root {
                start: self.layout.root_dir_start,
                sectors: self.layout.root_dir_sectors,
            }
        }
    }

    fn name(s: &str) -> ShortName {
        ShortName::encode(s).unwrap()
    }

    #[test]
    fn test_inode_from_position() {
        let loc = RecordLocation {
            sector: 73,
            offset: 5 * RECORD_SIZE,
        };
        assert_eq!(loc.inode(), 73 * 16 + 5);
    }

    #[test]
    fn test_insert_find_delete_in_root() {
        let mut fx = Fixture::new(FormatOptions::default());
        let root = fx.root();
        let mut dir = fx.engine();

        let slot = dir.find_free_slot(root).unwrap();
        assert_eq!(slot.offset, 0);
        dir.write_record(slot, &DirRecord::new_file(name("a.txt"))).unwrap();

        let (loc, rec) = dir.find(root, &name("A.TXT")).unwrap().unwrap();
        assert_eq!(loc, slot);
        assert_eq!(rec.size, 0);
        assert!(dir.find(root, &name("b.txt")).unwrap().is_none());

        dir.tombstone(loc).unwrap();
        assert!(dir.find(root, &name("a.txt")).unwrap().is_none());
        // The tombstoned slot is the first one reused
        assert_eq!(dir.find_free_slot(root).unwrap(), slot);
    }

    #[test]
    fn test_root_fills_up() {
        let mut fx = Fixture::new(FormatOptions::default().with_root_entries(32));
        let root = fx.root();
        let mut dir = fx.engine();
        for i in 0..32 {
            let slot = dir.find_free_slot(root).unwrap();
            let file = DirRecord::new_file(name(&format!("f{}", i)));
            dir.write_record(slot, &file).unwrap();
        }
        assert_eq!(dir.find_free_slot(root), Err(FatError::DirectoryFull));
    }

    #[test]
    fn test_chain_grows_when_full() {
        let mut fx = Fixture::new(FormatOptions::default().with_sectors_per_cluster(1));
        let first = fx.table.allocate().unwrap();
        let region = DirRegion::Chain {
            first_cluster: first,
        };
        let mut dir = fx.engine();
        dir.zero_cluster(first).unwrap();

        for i in 0..RECORDS_PER_SECTOR {
            let slot = dir.find_free_slot(region).unwrap();
            dir.write_record(slot, &DirRecord::new_file(name(&format!("f{}", i))))
                .unwrap();
        }
        let grown = dir.find_free_slot(region).unwrap();
        assert_eq!(grown.offset, 0);
        assert_eq!(fx.table.chain(first).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_growth_unlinks_cluster() {
        let mut fx = Fixture::new(FormatOptions::default().with_sectors_per_cluster(1));
        let first = fx.table.allocate().unwrap();
        let region = DirRegion::Chain {
            first_cluster: first,
        };
        let mut dir = fx.engine();
        dir.zero_cluster(first).unwrap();
        for i in 0..RECORDS_PER_SECTOR {
            let slot = dir.find_free_slot(region).unwrap();
            dir.write_record(slot, &DirRecord::new_file(name(&format!("f{}", i))))
                .unwrap();
        }

        fx.disk.fail_writes_after(0);
        assert!(matches!(
            fx.engine().find_free_slot(region),
            Err(FatError::Block(_))
        ));
        assert_eq!(fx.table.chain(first).unwrap(), [first]);
        assert_eq!(fx.table.used_clusters(), 1);
    }

    #[test]
    fn test_entry_at_skips_dots_and_tombstones() {
        let mut fx = Fixture::new(FormatOptions::default());
        let first = fx.table.allocate().unwrap();
        let region = DirRegion::Chain {
            first_cluster: first,
        };
        let mut dir = fx.engine();
        dir.zero_cluster(first).unwrap();

        for rec in [
            DirRecord::new_dir(ShortName::DOT, first),
            DirRecord::new_dir(ShortName::DOT_DOT, 0),
        ] {
            let slot = dir.find_free_slot(region).unwrap();
            dir.write_record(slot, &rec).unwrap();
        }
        assert!(dir.is_empty(region).unwrap());

        let mut locs = Vec::new();
        for n in ["one", "two", "three"] {
            let slot = dir.find_free_slot(region).unwrap();
            dir.write_record(slot, &DirRecord::new_file(name(n))).unwrap();
            locs.push(slot);
        }
        dir.tombstone(locs[1]).unwrap();

        assert!(!dir.is_empty(region).unwrap());
        assert_eq!(dir.entry_at(region, 0).unwrap().unwrap().1.name, name("one"));
        assert_eq!(dir.entry_at(region, 1).unwrap().unwrap().1.name, name("three"));
        assert!(dir.entry_at(region, 2).unwrap().is_none());
    }
}
