//! FAT16 node adapter
//!
//! [`FatFs`] owns one mounted volume: the block device, the derived layout,
//! the cached allocation table and a cache of the nodes handed out so far.
//! It implements the VFS node contract on top of the directory engine.
//!
//! File size and first cluster live in the directory record, so every
//! operation that changes a file's chain rewrites that record before the
//! table is synced.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kaal_block::{BlockDevice, Sector, SECTOR_SIZE};
use kaal_vfs::{DirEntry, FileSystem, InodeId, Node, NodeType, VfsError};

use crate::boot::{BootSector, Layout};
use crate::dir::{DirEngine, DirRegion, RecordLocation};
use crate::error::{FatError, Result};
use crate::name::ShortName;
use crate::record::DirRecord;
use crate::table::{FatTable, FAT_EOC, FAT_FREE};

/// Inode of the root directory; no record position maps to it
pub const ROOT_INODE: InodeId = 1;

/// Where the volume sits on its device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// LBA of the boot sector
    pub partition_start: u64,
}

impl MountOptions {
    pub fn with_partition_start(mut self, lba: u64) -> Self {
        self.partition_start = lba;
        self
    }
}

/// Allocation summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub cluster_bytes: usize,
    pub total_clusters: usize,
    pub used_clusters: usize,
    pub free_clusters: usize,
}

/// Cached node plus the on-disk facts needed to reach its data
struct FatNode {
    node: Node,
    /// `None` for the root directory
    record: Option<RecordLocation>,
    first_cluster: u16,
}

/// Payload of a data transfer
#[derive(Clone, Copy)]
enum Fill<'a> {
    Bytes(&'a [u8]),
    Zeros(usize),
}

impl Fill<'_> {
    fn len(&self) -> usize {
        match self {
            Fill::Bytes(b) => b.len(),
            Fill::Zeros(n) => *n,
        }
    }
}

/// Mounted FAT16 volume
pub struct FatFs<D: BlockDevice> {
    dev: D,
    boot: BootSector,
    layout: Layout,
    table: FatTable,
    nodes: BTreeMap<InodeId, FatNode>,
}

impl<D: BlockDevice> FatFs<D> {
    /// Mount the volume whose boot sector is LBA 0 of `dev`
    pub fn mount(dev: D) -> Result<Self> {
        Self::mount_with(dev, MountOptions::default())
    }

    /// Mount with explicit options
    ///
    /// # Errors
    /// - `InvalidBootSector` if the 0xAA55 signature is missing
    /// - `UnsupportedGeometry` if the volume is not a 512-byte-sector FAT16
    ///   volume that fits the device
    /// - `Block` if the boot sector or FAT cannot be read
    pub fn mount_with(mut dev: D, opts: MountOptions) -> Result<Self> {
        let mut sector: Sector = [0; SECTOR_SIZE];
        dev.read_sector(opts.partition_start, &mut sector)?;
        let boot = BootSector::parse(&sector)?;
        let layout = Layout::from_boot(&boot, opts.partition_start)?;
        if opts.partition_start + layout.total_sectors as u64 > dev.sector_count() {
            return Err(FatError::UnsupportedGeometry("volume extends past end of device"));
        }
        let table = FatTable::load(&mut dev, &layout)?;

        log::info!(
            "fat16: mounted {} at LBA {}: {} clusters of {} bytes, {} free",
            dev.id(),
            opts.partition_start,
            layout.total_clusters,
            layout.cluster_bytes(),
            table.free_clusters()
        );

        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT_INODE,
            FatNode {
                node: Node::new("/", ROOT_INODE, NodeType::Directory),
                record: None,
                first_cluster: FAT_FREE,
            },
        );
        Ok(Self {
            dev,
            boot,
            layout,
            table,
            nodes,
        })
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Borrow the backing device
    pub fn device_ref(&self) -> &D {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Hand the device back; unsynced table changes are lost
    pub fn into_device(self) -> D {
        self.dev
    }

    pub fn stats(&self) -> FsStats {
        FsStats {
            cluster_bytes: self.layout.cluster_bytes(),
            total_clusters: self.layout.total_clusters as usize,
            used_clusters: self.table.used_clusters(),
            free_clusters: self.table.free_clusters(),
        }
    }

    /// Clusters of the file or directory behind `ino`, in chain order
    pub fn clusters_of(&self, ino: InodeId) -> Result<Vec<u16>> {
        self.table.chain(self.entry(ino)?.first_cluster)
    }

    /// Persist the allocation table if it changed
    pub fn flush(&mut self) -> Result<()> {
        self.table.sync(&mut self.dev, &self.layout)
    }

    /// True when table changes are waiting for a flush
    pub fn is_dirty(&self) -> bool {
        self.table.is_dirty()
    }

    /// Persist whatever table state a failed mutation left behind, then
    /// hand back its error; a failed flush keeps the table dirty for retry
    fn abandon(&mut self, err: FatError) -> FatError {
        if let Err(e) = self.flush() {
            log::warn!("fat16: flush after failed operation: {}", e);
        }
        err
    }

    fn engine(&mut self) -> DirEngine<'_, D> {
        DirEngine::new(&mut self.dev, &self.layout, &mut self.table)
    }

    fn entry(&self, ino: InodeId) -> Result<&FatNode> {
        self.nodes.get(&ino).ok_or(FatError::NotFound)
    }

    fn region_of(&self, dir: InodeId) -> Result<DirRegion> {
        let entry = self.entry(dir)?;
        if !entry.node.is_dir() {
            return Err(FatError::NotADirectory);
        }
        Ok(if dir == ROOT_INODE {
            DirRegion::Root {
                start: self.layout.root_dir_start,
                sectors: self.layout.root_dir_sectors,
            }
        } else {
            DirRegion::Chain {
                first_cluster: entry.first_cluster,
            }
        })
    }

    /// Record location, first cluster and size of regular file `ino`
    fn file_state(&self, ino: InodeId) -> Result<(RecordLocation, u16, u64)> {
        let entry = self.entry(ino)?;
        match (entry.node.kind, entry.record) {
            (NodeType::File, Some(record)) => Ok((record, entry.first_cluster, entry.node.size)),
            _ => Err(FatError::NotAFile),
        }
    }

    /// Cache the node for a record found in `dir`, keeping an existing entry
    /// so open counts and mount references survive repeated lookups
    fn cache(&mut self, dir: InodeId, location: RecordLocation, record: &DirRecord) -> InodeId {
        let ino = location.inode();
        self.nodes.entry(ino).or_insert_with(|| {
            let kind = if record.is_dir() {
                NodeType::Directory
            } else {
                NodeType::File
            };
            FatNode {
                node: Node::new(record.name.decode(), ino, kind)
                    .with_parent(dir)
                    .with_size(if record.is_dir() { 0 } else { record.size as u64 }),
                record: Some(location),
                first_cluster: record.first_cluster,
            }
        });
        ino
    }

    /// Encode a name for lookup; names that cannot exist on disk are simply
    /// not found
    fn lookup_name(name: &str) -> Result<ShortName> {
        match ShortName::encode(name) {
            Ok(short) if !short.is_dot() => Ok(short),
            _ => Err(FatError::NotFound),
        }
    }

    /// Encode a name for a new record
    fn create_name(name: &str) -> Result<ShortName> {
        let short = ShortName::encode(name)?;
        if short.is_dot() {
            return Err(FatError::InvalidName(name.into()));
        }
        Ok(short)
    }

    // ------------------------------------------------------------------
    // Namespace
    // ------------------------------------------------------------------

    /// Child of `dir` called `name`
    pub fn lookup(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        let region = self.region_of(dir)?;
        let short = Self::lookup_name(name)?;
        let (location, record) = self.engine().find(region, &short)?.ok_or(FatError::NotFound)?;
        Ok(self.cache(dir, location, &record))
    }

    /// Entry `index` of `dir`, skipping `.` and `..`
    pub fn list(&mut self, dir: InodeId, index: usize) -> Result<Option<DirEntry>> {
        let region = self.region_of(dir)?;
        let Some((location, record)) = self.engine().entry_at(region, index)? else {
            return Ok(None);
        };
        let ino = self.cache(dir, location, &record);
        let node = &self.entry(ino)?.node;
        Ok(Some(DirEntry {
            name: node.name.clone(),
            inode: ino,
            kind: node.kind,
        }))
    }

    /// Create an empty file
    ///
    /// # Errors
    /// `AlreadyExists`, `DirectoryFull`, or `InvalidName` if `name` has no
    /// 8.3 form.
    pub fn create_file(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        let region = self.region_of(dir)?;
        let short = Self::create_name(name)?;
        let mut engine = self.engine();
        if engine.find(region, &short)?.is_some() {
            return Err(FatError::AlreadyExists);
        }
        let slot = engine.find_free_slot(region)?;
        let record = DirRecord::new_file(short);
        if let Err(e) = engine.write_record(slot, &record) {
            return Err(self.abandon(e));
        }
        self.flush()?;

        log::debug!("fat16: created file {} at {:?}", short, slot);
        Ok(self.cache(dir, slot, &record))
    }

    /// Create a directory with its `.` and `..` records
    pub fn make_dir(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        let region = self.region_of(dir)?;
        let short = Self::create_name(name)?;
        let parent_cluster = match region {
            DirRegion::Root { .. } => FAT_FREE,
            DirRegion::Chain { first_cluster } => first_cluster,
        };

        if self.engine().find(region, &short)?.is_some() {
            return Err(FatError::AlreadyExists);
        }

        // Claim the new directory's cluster before the parent may grow into
        // the last free one
        let cluster = self.table.allocate()?;
        let slot = match self.engine().find_free_slot(region) {
            Ok(slot) => slot,
            Err(e) => {
                self.table.free_chain(cluster);
                return Err(self.abandon(e));
            }
        };
        let record = DirRecord::new_dir(short, cluster);
        let populated = self.populate_dir(cluster, parent_cluster, slot, &record);
        if let Err(e) = populated {
            self.table.free_chain(cluster);
            return Err(self.abandon(e));
        }
        self.flush()?;

        log::debug!("fat16: created directory {} at cluster {}", short, cluster);
        Ok(self.cache(dir, slot, &record))
    }

    fn populate_dir(
        &mut self,
        cluster: u16,
        parent_cluster: u16,
        slot: RecordLocation,
        record: &DirRecord,
    ) -> Result<()> {
        let first_sector = self.layout.cluster_lba(cluster);
        let mut engine = self.engine();
        engine.zero_cluster(cluster)?;
        let dot = RecordLocation {
            sector: first_sector,
            offset: 0,
        };
        let dot_dot = RecordLocation {
            sector: first_sector,
            offset: crate::record::RECORD_SIZE,
        };
        engine.write_record(dot, &DirRecord::new_dir(ShortName::DOT, cluster))?;
        engine.write_record(dot_dot, &DirRecord::new_dir(ShortName::DOT_DOT, parent_cluster))?;
        engine.write_record(slot, record)
    }

    /// Delete regular file `name` and release its clusters
    pub fn remove_file(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let region = self.region_of(dir)?;
        let short = Self::lookup_name(name)?;
        let mut engine = self.engine();
        let (location, record) = engine.find(region, &short)?.ok_or(FatError::NotFound)?;
        if record.is_dir() {
            return Err(FatError::NotAFile);
        }
        engine.tombstone(location)?;
        let freed = self.table.free_chain(record.first_cluster);
        self.nodes.remove(&location.inode());
        self.flush()?;

        log::debug!("fat16: removed file {} ({} clusters freed)", short, freed);
        Ok(())
    }

    /// Delete empty directory `name`
    ///
    /// # Errors
    /// `NotEmpty` if it holds anything besides `.` and `..`.
    pub fn remove_dir(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let region = self.region_of(dir)?;
        let short = Self::lookup_name(name)?;
        let mut engine = self.engine();
        let (location, record) = engine.find(region, &short)?.ok_or(FatError::NotFound)?;
        if !record.is_dir() {
            return Err(FatError::NotADirectory);
        }
        let contents = DirRegion::Chain {
            first_cluster: record.first_cluster,
        };
        if !engine.is_empty(contents)? {
            return Err(FatError::NotEmpty);
        }
        engine.tombstone(location)?;
        self.table.free_chain(record.first_cluster);
        self.nodes.remove(&location.inode());
        self.flush()?;

        log::debug!("fat16: removed directory {}", short);
        Ok(())
    }

    // ------------------------------------------------------------------
    // File data
    // ------------------------------------------------------------------

    /// Read from file `ino` at `offset`; never reads past the recorded size
    pub fn read_file(&mut self, ino: InodeId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (_, first, size) = self.file_state(ino)?;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min((size - offset) as usize);
        let chain = self.table.chain(first)?;
        let cluster_bytes = self.layout.cluster_bytes() as u64;

        let mut sector: Sector = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < len {
            let pos = offset + done as u64;
            let Some(&cluster) = chain.get((pos / cluster_bytes) as usize) else {
                // Chain is shorter than the recorded size
                break;
            };
            let in_cluster = pos % cluster_bytes;
            let lba = self.layout.cluster_lba(cluster) + in_cluster / SECTOR_SIZE as u64;
            let at = (in_cluster % SECTOR_SIZE as u64) as usize;
            let n = (SECTOR_SIZE - at).min(len - done);

            self.dev.read_sector(lba, &mut sector)?;
            buf[done..done + n].copy_from_slice(&sector[at..at + n]);
            done += n;
        }
        log::trace!("fat16: read {} bytes of inode {} at {}", done, ino, offset);
        Ok(done)
    }

    /// Write `buf` to file `ino` at `offset`
    ///
    /// Grows the chain as needed and zero-fills any gap between the old end
    /// of file and `offset`. Clusters allocated by a write that then fails
    /// are released again.
    pub fn write_file(&mut self, ino: InodeId, offset: u64, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            self.file_state(ino)?;
            return Ok(0);
        }
        self.store(ino, offset, Fill::Bytes(buf))?;
        log::trace!("fat16: wrote {} bytes of inode {} at {}", buf.len(), ino, offset);
        Ok(buf.len())
    }

    /// Cut or extend file `ino` to `size` bytes
    pub fn set_len(&mut self, ino: InodeId, size: u64) -> Result<()> {
        let (location, first, old_size) = self.file_state(ino)?;
        if size > u32::MAX as u64 {
            return Err(FatError::FileTooLarge);
        }
        if size > old_size {
            return self.store(ino, old_size, Fill::Zeros((size - old_size) as usize));
        }
        if size == old_size {
            return Ok(());
        }

        let keep = size.div_ceil(self.layout.cluster_bytes() as u64) as usize;
        let chain = self.table.chain(first)?;
        let new_first = if keep == 0 {
            self.table.free_chain(first);
            FAT_FREE
        } else {
            if let Some(&tail) = chain.get(keep - 1) {
                self.table.set(tail, FAT_EOC);
            }
            if let Some(&rest) = chain.get(keep) {
                self.table.free_chain(rest);
            }
            first
        };

        self.update_record(ino, location, new_first, size)?;
        self.flush()
    }

    /// Write `fill` at `offset`, allocating and zero-filling as needed, then
    /// persist the record and table
    fn store(&mut self, ino: InodeId, offset: u64, fill: Fill<'_>) -> Result<()> {
        let (location, first, old_size) = self.file_state(ino)?;
        let end = offset
            .checked_add(fill.len() as u64)
            .filter(|&end| end <= u32::MAX as u64)
            .ok_or(FatError::FileTooLarge)?;

        let old_chain = self.table.chain(first)?;
        let kept = old_chain.len();
        let tail = old_chain.last().copied();
        let chain = self.reserve(old_chain, end)?;

        if let Err(e) = self.commit(ino, location, &chain, old_size, offset, fill) {
            self.release(tail, &chain[kept..]);
            return Err(e);
        }
        self.flush()
    }

    fn commit(
        &mut self,
        ino: InodeId,
        location: RecordLocation,
        chain: &[u16],
        old_size: u64,
        offset: u64,
        fill: Fill<'_>,
    ) -> Result<()> {
        if offset > old_size {
            self.write_span(chain, old_size, Fill::Zeros((offset - old_size) as usize))?;
        }
        self.write_span(chain, offset, fill)?;
        let end = offset + fill.len() as u64;
        let first = chain.first().copied().unwrap_or(FAT_FREE);
        self.update_record(ino, location, first, old_size.max(end))
    }

    /// Extend `chain` until it covers `end` bytes
    fn reserve(&mut self, mut chain: Vec<u16>, end: u64) -> Result<Vec<u16>> {
        let needed = end.div_ceil(self.layout.cluster_bytes() as u64) as usize;
        let tail = chain.last().copied();
        let kept = chain.len();
        while chain.len() < needed {
            let next = match chain.last() {
                None => self.table.allocate(),
                Some(&last) => self.table.extend(last),
            };
            match next {
                Ok(cluster) => chain.push(cluster),
                Err(e) => {
                    self.release(tail, &chain[kept..]);
                    return Err(e);
                }
            }
        }
        Ok(chain)
    }

    /// Undo an allocation: terminate the chain at `tail` again and free
    /// `added`
    fn release(&mut self, tail: Option<u16>, added: &[u16]) {
        let Some(&head) = added.first() else {
            return;
        };
        if let Some(tail) = tail {
            self.table.set(tail, FAT_EOC);
        }
        self.table.free_chain(head);
    }

    /// Copy `fill` into the chain at byte `offset`, reading back any sector
    /// the transfer only partly covers
    fn write_span(&mut self, chain: &[u16], offset: u64, fill: Fill<'_>) -> Result<()> {
        let cluster_bytes = self.layout.cluster_bytes() as u64;
        let len = fill.len();
        let mut sector: Sector = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < len {
            let pos = offset + done as u64;
            let cluster = *chain
                .get((pos / cluster_bytes) as usize)
                .ok_or(FatError::CorruptChain {
                    cluster: chain.last().copied().unwrap_or(FAT_FREE),
                })?;
            let in_cluster = pos % cluster_bytes;
            let lba = self.layout.cluster_lba(cluster) + in_cluster / SECTOR_SIZE as u64;
            let at = (in_cluster % SECTOR_SIZE as u64) as usize;
            let n = (SECTOR_SIZE - at).min(len - done);

            if n < SECTOR_SIZE {
                self.dev.read_sector(lba, &mut sector)?;
            }
            match fill {
                Fill::Bytes(bytes) => sector[at..at + n].copy_from_slice(&bytes[done..done + n]),
                Fill::Zeros(_) => sector[at..at + n].fill(0),
            }
            self.dev.write_sector(lba, &sector)?;
            done += n;
        }
        Ok(())
    }

    /// Rewrite the directory record of `ino` and refresh the cache
    fn update_record(
        &mut self,
        ino: InodeId,
        location: RecordLocation,
        first_cluster: u16,
        size: u64,
    ) -> Result<()> {
        let mut engine = self.engine();
        let mut record = engine.read_record(location)?;
        record.first_cluster = first_cluster;
        record.size = size as u32;
        engine.write_record(location, &record)?;

        if let Some(entry) = self.nodes.get_mut(&ino) {
            entry.first_cluster = first_cluster;
            entry.node.size = size;
        }
        Ok(())
    }
}

impl<D: BlockDevice + Send> FileSystem for FatFs<D> {
    fn fs_type(&self) -> &'static str {
        "fat16"
    }

    fn device(&self) -> Option<u8> {
        Some(self.dev.id().0)
    }

    fn root(&self) -> InodeId {
        ROOT_INODE
    }

    fn node(&self, ino: InodeId) -> kaal_vfs::Result<&Node> {
        self.nodes
            .get(&ino)
            .map(|entry| &entry.node)
            .ok_or(VfsError::NotFound)
    }

    fn node_mut(&mut self, ino: InodeId) -> kaal_vfs::Result<&mut Node> {
        self.nodes
            .get_mut(&ino)
            .map(|entry| &mut entry.node)
            .ok_or(VfsError::NotFound)
    }

    fn read(&mut self, ino: InodeId, offset: u64, buf: &mut [u8]) -> kaal_vfs::Result<usize> {
        Ok(self.read_file(ino, offset, buf)?)
    }

    fn write(&mut self, ino: InodeId, offset: u64, buf: &[u8]) -> kaal_vfs::Result<usize> {
        Ok(self.write_file(ino, offset, buf)?)
    }

    fn readdir(&mut self, dir: InodeId, index: usize) -> kaal_vfs::Result<Option<DirEntry>> {
        Ok(self.list(dir, index)?)
    }

    fn finddir(&mut self, dir: InodeId, name: &str) -> kaal_vfs::Result<InodeId> {
        Ok(self.lookup(dir, name)?)
    }

    fn create(&mut self, dir: InodeId, name: &str) -> kaal_vfs::Result<InodeId> {
        Ok(self.create_file(dir, name)?)
    }

    fn unlink(&mut self, dir: InodeId, name: &str) -> kaal_vfs::Result<()> {
        Ok(self.remove_file(dir, name)?)
    }

    fn mkdir(&mut self, dir: InodeId, name: &str) -> kaal_vfs::Result<InodeId> {
        Ok(self.make_dir(dir, name)?)
    }

    fn rmdir(&mut self, dir: InodeId, name: &str) -> kaal_vfs::Result<()> {
        Ok(self.remove_dir(dir, name)?)
    }

    fn truncate(&mut self, ino: InodeId, size: u64) -> kaal_vfs::Result<()> {
        Ok(self.set_len(ino, size)?)
    }

    fn sync(&mut self) -> kaal_vfs::Result<()> {
        Ok(self.flush()?)
    }
}
