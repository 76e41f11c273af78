//! FAT16 - Block-device filesystem driver
//!
//! # Purpose
//! Mounts FAT16 volumes with 512-byte sectors from any `BlockDevice` and
//! exposes them through the VFS node contract, so boot media and SD cards
//! can be read and written like any other mounted filesystem.
//!
//! # Integration Points
//! - Depends on: Block drivers (`kaal-block`), VFS contract (`kaal-vfs`)
//! - Provides to: VFS switch (as a mountable `FileSystem`)
//! - IPC endpoints: None (in-process driver)
//! - Capabilities required: Access to the backing block device
//!
//! # Architecture
//! ```text
//! | boot | FAT 0 | FAT 1 | root directory | cluster 2 | cluster 3 | ...
//!   ^      ^               ^                ^
//!   |      fat_start       root_dir_start   data_start
//!   partition_start
//! ```
//! - `boot`: boot sector codec and derived `Layout`
//! - `table`: in-memory allocation table, synced to every FAT copy
//! - `name` / `record`: 8.3 names and 32-byte directory records
//! - `dir`: one directory engine over the fixed root region and cluster chains
//! - `fs`: `FatFs`, the node adapter
//! - `format`: fresh volume creation
//!
//! # Testing Strategy
//! - Unit tests: Codecs, table bookkeeping, directory engine, data paths
//! - Integration tests: Whole-volume scenarios and mounting under the VFS
//! - Benchmarks: Sequential write/read throughput (`benches/fat_io.rs`)

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

pub mod boot;
pub mod dir;
pub mod error;
pub mod format;
pub mod fs;
pub mod name;
pub mod record;
pub mod table;

pub use boot::{BootSector, Layout};
pub use error::{FatError, Result};
pub use format::{format, format_partition, FormatOptions};
pub use fs::{FatFs, FsStats, MountOptions, ROOT_INODE};
pub use name::ShortName;
pub use record::{Attributes, DirRecord};
