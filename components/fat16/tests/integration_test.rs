//! Integration tests for the FAT16 driver
//!
//! These tests run whole-volume scenarios on a RAM disk:
//! - Formatting and mount-time geometry
//! - Directory capacity and growth
//! - File data and cluster accounting
//! - Persistence across remounts
//! - Device failures during table sync

use kaal_block::{BlockDevice, DeviceId, RamDisk, SECTOR_SIZE};
use kaal_fat16::*;
use kaal_vfs::FileSystem;

fn formatted(sectors: u64, opts: &FormatOptions) -> RamDisk {
    let mut disk = RamDisk::new(DeviceId(0), sectors);
    format(&mut disk, opts).expect("Failed to format");
    disk
}

fn mount_default() -> FatFs<RamDisk> {
    FatFs::mount(formatted(16384, &FormatOptions::default())).expect("Failed to mount")
}

/// Geometry of a 512-byte/4-sector-cluster/512-entry volume follows the
/// region formulas, and the fixed root holds exactly 512 records
#[test]
fn test_root_directory_capacity() {
    let mut fs = mount_default();

    // 1. Derived regions
    let layout = *fs.layout();
    let boot = fs.boot_sector().clone();
    assert_eq!(boot.bytes_per_sector, 512);
    assert_eq!(boot.sectors_per_cluster, 4);
    assert_eq!(boot.root_entries, 512);
    assert_eq!(
        layout.root_dir_start,
        boot.reserved_sectors as u64 + boot.fat_count as u64 * boot.sectors_per_fat as u64
    );
    assert_eq!(layout.root_dir_sectors, 512 * 32 / 512);
    assert_eq!(layout.data_start, layout.root_dir_start + 32);

    // 2. Fill every root slot
    for i in 0..512 {
        fs.create_file(ROOT_INODE, &format!("f{}", i))
            .expect("Failed to create file");
    }

    // 3. The 513th has nowhere to go
    assert_eq!(
        fs.create_file(ROOT_INODE, "f512"),
        Err(FatError::DirectoryFull)
    );
    assert_eq!(fs.stats().used_clusters, 0);
}

/// Deleting a file releases its whole chain and its name
#[test]
fn test_delete_frees_every_cluster() {
    let mut fs = mount_default();
    let ino = fs.create_file(ROOT_INODE, "big.dat").unwrap();
    fs.write_file(ino, 0, &vec![0x5Au8; 20_000]).unwrap();
    assert_eq!(fs.stats().used_clusters, 10);

    fs.remove_file(ROOT_INODE, "big.dat").unwrap();
    assert_eq!(fs.stats().used_clusters, 0);
    assert_eq!(fs.lookup(ROOT_INODE, "big.dat"), Err(FatError::NotFound));
    assert!(fs.list(ROOT_INODE, 0).unwrap().is_none());

    // The freed space is reusable in full
    let again = fs.create_file(ROOT_INODE, "big.dat").unwrap();
    fs.write_file(again, 0, &vec![0xA5u8; 20_000]).unwrap();
    assert_eq!(fs.stats().used_clusters, 10);
}

/// Creating /a/b.txt leaves the rest of /a untouched
#[test]
fn test_create_in_subdirectory() {
    let mut fs = mount_default();
    let a = fs.make_dir(ROOT_INODE, "a").unwrap();
    let other = fs.create_file(a, "keep.txt").unwrap();
    fs.write_file(other, 0, b"untouched").unwrap();

    let b = fs.create_file(a, "b.txt").unwrap();
    assert_eq!(fs.lookup(a, "b.txt").unwrap(), b);
    let node = fs.node(b).unwrap();
    assert!(node.is_file());
    assert_eq!(node.size, 0);
    assert_eq!(node.parent, Some(a));

    assert_eq!(fs.lookup(a, "keep.txt").unwrap(), other);
    assert_eq!(fs.node(other).unwrap().size, 9);
    assert_eq!(fs.lookup(a, "c.txt"), Err(FatError::NotFound));
    assert_eq!(fs.create_file(a, "B.TXT"), Err(FatError::AlreadyExists));
}

/// rmdir refuses directories with live children and ignores `.`/`..`
#[test]
fn test_rmdir_checks_emptiness() {
    let mut fs = mount_default();
    let dir = fs.make_dir(ROOT_INODE, "docs").unwrap();
    fs.create_file(dir, "note").unwrap();

    assert_eq!(fs.remove_dir(ROOT_INODE, "docs"), Err(FatError::NotEmpty));
    assert_eq!(fs.remove_file(ROOT_INODE, "docs"), Err(FatError::NotAFile));

    fs.remove_file(dir, "note").unwrap();
    fs.remove_dir(ROOT_INODE, "docs").expect("Failed to remove empty dir");
    assert_eq!(fs.stats().used_clusters, 0);
    assert_eq!(fs.lookup(ROOT_INODE, "docs"), Err(FatError::NotFound));
}

/// New directories carry `.` and `..` records pointing at the right clusters
#[test]
fn test_dot_records_on_disk() {
    let mut fs = mount_default();
    let outer = fs.make_dir(ROOT_INODE, "outer").unwrap();
    let inner = fs.make_dir(outer, "inner").unwrap();
    let outer_cluster = fs.clusters_of(outer).unwrap()[0];
    let inner_cluster = fs.clusters_of(inner).unwrap()[0];
    let layout = *fs.layout();

    let mut disk = fs.into_device();
    let read_records = |disk: &mut RamDisk, cluster: u16| {
        let mut sector = [0u8; SECTOR_SIZE];
        disk.read_sector(layout.cluster_lba(cluster), &mut sector).unwrap();
        (DirRecord::parse(&sector[..32]), DirRecord::parse(&sector[32..64]))
    };

    let (dot, dot_dot) = read_records(&mut disk, outer_cluster);
    assert_eq!(dot.name, ShortName::DOT);
    assert_eq!(dot.first_cluster, outer_cluster);
    assert_eq!(dot_dot.first_cluster, 0);

    let (dot, dot_dot) = read_records(&mut disk, inner_cluster);
    assert_eq!(dot.first_cluster, inner_cluster);
    assert_eq!(dot_dot.name, ShortName::DOT_DOT);
    assert_eq!(dot_dot.first_cluster, outer_cluster);
}

/// A subdirectory grows past its first cluster instead of filling up
#[test]
fn test_subdirectory_grows() {
    let opts = FormatOptions::default().with_sectors_per_cluster(1);
    let mut fs = FatFs::mount(formatted(4096, &opts)).unwrap();
    let dir = fs.make_dir(ROOT_INODE, "many").unwrap();

    // 16 records per cluster, two of them taken by `.` and `..`
    for i in 0..40 {
        fs.create_file(dir, &format!("n{}", i)).unwrap();
    }
    assert_eq!(fs.clusters_of(dir).unwrap().len(), 3);

    let mut count = 0;
    while fs.list(dir, count).unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 40);
    assert!(fs.lookup(dir, "n39").is_ok());
}

/// Everything written is visible after unmount and remount
#[test]
fn test_remount_persistence() {
    let mut fs = mount_default();
    let dir = fs.make_dir(ROOT_INODE, "etc").unwrap();
    let file = fs.create_file(dir, "motd").unwrap();
    let text = b"Welcome to KaaL\n".repeat(300);
    fs.write_file(file, 0, &text).unwrap();
    let used = fs.stats().used_clusters;

    let mut fs = FatFs::mount(fs.into_device()).expect("Failed to remount");
    assert_eq!(fs.stats().used_clusters, used);
    let dir = fs.lookup(ROOT_INODE, "ETC").unwrap();
    let file = fs.lookup(dir, "MOTD").unwrap();
    assert_eq!(fs.node(file).unwrap().size, text.len() as u64);

    let mut back = vec![0u8; text.len()];
    assert_eq!(fs.read_file(file, 0, &mut back).unwrap(), text.len());
    assert_eq!(back, text);
}

/// Tombstoned slots are reused before the directory grows
#[test]
fn test_tombstone_reuse() {
    let mut fs = mount_default();
    let first = fs.create_file(ROOT_INODE, "one").unwrap();
    fs.create_file(ROOT_INODE, "two").unwrap();
    fs.remove_file(ROOT_INODE, "one").unwrap();

    let three = fs.create_file(ROOT_INODE, "three").unwrap();
    assert_eq!(three, first);
    assert_eq!(fs.list(ROOT_INODE, 0).unwrap().unwrap().name, "THREE");
    assert_eq!(fs.list(ROOT_INODE, 1).unwrap().unwrap().name, "TWO");
}

/// A failed table sync leaves the volume dirty until a later sync succeeds
#[test]
fn test_sync_retry_after_device_failure() {
    let mut fs = mount_default();
    let ino = fs.create_file(ROOT_INODE, "log").unwrap();

    // 1. Data and record writes land, the table write does not
    fs.device_mut().fail_writes_after(2);
    assert!(matches!(fs.write_file(ino, 0, b"x"), Err(FatError::Block(_))));
    assert!(fs.is_dirty());
    assert!(fs.flush().is_err());
    assert!(fs.is_dirty());

    // 2. Once the device recovers the same table is written out
    fs.device_mut().clear_write_failures();
    fs.flush().expect("Failed to retry sync");
    assert!(!fs.is_dirty());

    // 3. The allocation survived the failure
    let mut fs = FatFs::mount(fs.into_device()).unwrap();
    assert_eq!(fs.stats().used_clusters, 1);
    let ino = fs.lookup(ROOT_INODE, "log").unwrap();
    let mut back = [0u8; 1];
    assert_eq!(fs.read_file(ino, 0, &mut back).unwrap(), 1);
    assert_eq!(&back, b"x");
}

/// A volume can live at an offset inside a larger device
#[test]
fn test_partition_offset() {
    let mut disk = RamDisk::new(DeviceId(3), 10_000);
    let layout = format_partition(&mut disk, 1000, 9000, &FormatOptions::default()).unwrap();
    assert_eq!(layout.fat_start, 1001);

    assert!(FatFs::mount(RamDisk::from_image(DeviceId(3), disk.image().to_vec())).is_err());

    let opts = MountOptions::default().with_partition_start(1000);
    let mut fs = FatFs::mount_with(disk, opts).expect("Failed to mount partition");
    assert_eq!(fs.layout().data_start, layout.data_start);
    assert_eq!(FileSystem::device(&fs), Some(3));

    let ino = fs.create_file(ROOT_INODE, "p.txt").unwrap();
    fs.write_file(ino, 0, b"partitioned").unwrap();
    let disk = fs.into_device();
    assert!(disk.image()[..1000 * SECTOR_SIZE].iter().all(|&b| b == 0));
}

/// A foreign volume with long-name fragments and a label lists only real
/// entries
#[test]
fn test_non_entries_are_skipped() {
    let mut disk = RamDisk::new(DeviceId(0), 4096);
    let layout = format(&mut disk, &FormatOptions::default()).unwrap();

    let mut sector = [0u8; SECTOR_SIZE];
    let mut label = DirRecord::new_file(ShortName(*b"MYVOLUME   "));
    label.attributes = Attributes::VOLUME_ID;
    label.write_to(&mut sector[0..32]);
    let mut lfn = DirRecord::new_file(ShortName(*b"AREADME TXT"));
    lfn.attributes = Attributes::LONG_NAME;
    lfn.write_to(&mut sector[32..64]);
    DirRecord::new_file(ShortName(*b"README  TXT")).write_to(&mut sector[64..96]);
    disk.write_sector(layout.root_dir_start, &sector).unwrap();

    let mut fs = FatFs::mount(disk).unwrap();
    let entry = fs.list(ROOT_INODE, 0).unwrap().unwrap();
    assert_eq!(entry.name, "README.TXT");
    assert!(fs.list(ROOT_INODE, 1).unwrap().is_none());
    assert_eq!(fs.lookup(ROOT_INODE, "myvolume"), Err(FatError::NotFound));
}
