//! FAT16 volumes mounted under the VFS switch
//!
//! These tests combine:
//! - A RAM root filesystem with a FAT16 volume mounted on /disk
//! - Descriptor I/O routed to the FAT backend
//! - Error mapping from driver errors to the VFS taxonomy

use kaal_block::{DeviceId, RamDisk};
use kaal_fat16::{format, FatFs, FormatOptions};
use kaal_vfs::*;

fn system() -> Vfs {
    let mut disk = RamDisk::new(DeviceId(2), 16384);
    format(&mut disk, &FormatOptions::default().with_label("data")).expect("Failed to format");
    let fat = FatFs::mount(disk).expect("Failed to mount FAT volume");

    let mut vfs = Vfs::new(VfsConfig::default());
    vfs.mount("/", Box::new(RamFs::new())).unwrap();
    vfs.mkdir("/disk").unwrap();
    vfs.mount("/disk", Box::new(fat)).unwrap();
    vfs
}

/// The mount table records the FAT backend and its device
#[test]
fn test_mount_record() {
    let vfs = system();
    let record = vfs.mounts().find(|m| m.path == "/disk").unwrap();
    assert_eq!(record.fs_type, "fat16");
    assert_eq!(record.device, Some(2));
}

/// Write through a descriptor, then read it back through another
#[test]
fn test_file_io_through_switch() {
    let mut vfs = system();

    // 1. Create and fill a file on the FAT volume
    let fd = vfs
        .open("/disk/hello.txt", OpenFlags::WRITE | OpenFlags::CREATE)
        .expect("Failed to create file");
    let payload = b"FAT16 through the VFS switch".repeat(100);
    assert_eq!(vfs.write(fd, &payload).unwrap(), payload.len());
    vfs.close(fd).unwrap();

    // 2. Metadata comes from the FAT node
    let meta = vfs.stat("/disk/HELLO.TXT").unwrap();
    assert_eq!(meta.size, payload.len() as u64);
    assert_eq!(meta.name, "HELLO.TXT");

    // 3. Read it back in chunks
    let fd = vfs.open("/disk/hello.txt", OpenFlags::READ).unwrap();
    let mut back = Vec::new();
    let mut chunk = [0u8; 333];
    loop {
        let n = vfs.read(fd, &mut chunk).unwrap();
        if n == 0 {
            break;
        }
        back.extend_from_slice(&chunk[..n]);
    }
    vfs.close(fd).unwrap();
    assert_eq!(back, payload);
}

/// Opening with TRUNCATE releases the FAT clusters of the file
#[test]
fn test_truncate_on_open() {
    let mut vfs = system();
    let fd = vfs
        .open("/disk/log", OpenFlags::WRITE | OpenFlags::CREATE)
        .unwrap();
    vfs.write(fd, &[0xABu8; 10_000]).unwrap();
    vfs.close(fd).unwrap();

    let fd = vfs
        .open("/disk/log", OpenFlags::WRITE | OpenFlags::TRUNCATE)
        .unwrap();
    assert_eq!(vfs.fstat(fd).unwrap().size, 0);
    vfs.write(fd, b"fresh").unwrap();
    vfs.close(fd).unwrap();

    let fs = vfs.unmount("/disk").expect("Failed to unmount");
    assert_eq!(fs.fs_type(), "fat16");
    assert_eq!(vfs.stat("/disk").unwrap().fs, FsId(0));
}

/// Seeking past the end and writing leaves a zero-filled gap
#[test]
fn test_seek_and_write_gap() {
    let mut vfs = system();
    let fd = vfs
        .open("/disk/sparse", OpenFlags::READ_WRITE | OpenFlags::CREATE)
        .unwrap();
    vfs.write(fd, b"ab").unwrap();
    vfs.seek(fd, 4096, Whence::Current).unwrap();
    vfs.write(fd, b"yz").unwrap();
    assert_eq!(vfs.fstat(fd).unwrap().size, 4100);

    vfs.seek(fd, -4100, Whence::End).unwrap();
    let mut buf = vec![0xFFu8; 4100];
    assert_eq!(vfs.read(fd, &mut buf).unwrap(), 4100);
    assert_eq!(&buf[..2], b"ab");
    assert!(buf[2..4098].iter().all(|&b| b == 0));
    assert_eq!(&buf[4098..], b"yz");
    vfs.close(fd).unwrap();
}

/// Directories on the FAT volume work through the switch
#[test]
fn test_directories_and_traversal() {
    let mut vfs = system();
    vfs.mkdir("/disk/bin").unwrap();
    vfs.mkdir("/disk/bin/sub").unwrap();
    let fd = vfs
        .open("/disk/bin/sub/tool", OpenFlags::WRITE | OpenFlags::CREATE)
        .unwrap();
    vfs.close(fd).unwrap();

    // ".." climbs through FAT directories and back out of the mount
    assert_eq!(
        vfs.resolve("/disk/bin/sub/../sub/tool").unwrap(),
        vfs.resolve("/disk/bin/sub/tool").unwrap()
    );
    assert_eq!(vfs.stat("/disk/bin/../..").unwrap().fs, FsId(0));

    vfs.chdir("/disk/bin").unwrap();
    let fd = vfs.open(".", OpenFlags::READ).unwrap();
    let entry = vfs.readdir(fd, 0).unwrap().unwrap();
    assert_eq!(entry.name, "SUB");
    assert_eq!(entry.kind, NodeType::Directory);
    assert!(vfs.readdir(fd, 1).unwrap().is_none());
    vfs.close(fd).unwrap();

    assert_eq!(vfs.rmdir("/disk/bin/sub"), Err(VfsError::NotEmpty));
    vfs.unlink("/disk/bin/sub/tool").unwrap();
    vfs.rmdir("/disk/bin/sub").unwrap();
    assert_eq!(vfs.stat("sub"), Err(VfsError::NotFound));
}

/// Driver errors surface with their VFS meaning
#[test]
fn test_error_mapping() {
    let mut vfs = system();
    assert!(matches!(
        vfs.open("/disk/name_too_long.txt", OpenFlags::WRITE | OpenFlags::CREATE),
        Err(VfsError::InvalidName(_))
    ));
    assert_eq!(
        vfs.open("/disk/missing", OpenFlags::READ),
        Err(VfsError::NotFound)
    );

    vfs.mkdir("/disk/d").unwrap();
    assert_eq!(vfs.mkdir("/disk/d"), Err(VfsError::AlreadyExists));
    assert_eq!(vfs.unlink("/disk/d"), Err(VfsError::NotAFile));
    assert_eq!(
        vfs.open("/disk/d", OpenFlags::WRITE),
        Err(VfsError::NotAFile)
    );
    assert!(vfs.sync().is_ok());
}
