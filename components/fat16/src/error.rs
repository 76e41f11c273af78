//! FAT16 driver errors and their mapping onto the VFS taxonomy.

use alloc::string::String;
use kaal_block::BlockError;
use kaal_vfs::VfsError;
use thiserror::Error;

/// FAT16 driver error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatError {
    #[error("Block device error: {0}")]
    Block(#[from] BlockError),

    #[error("Invalid boot sector: {0}")]
    InvalidBootSector(&'static str),

    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(&'static str),

    #[error("No free cluster left on the volume")]
    StorageExhausted,

    #[error("Directory has no free record slot")]
    DirectoryFull,

    #[error("No such directory record")]
    NotFound,

    #[error("A record with that name already exists")]
    AlreadyExists,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Not a regular file")]
    NotAFile,

    #[error("Directory not empty")]
    NotEmpty,

    #[error("Name is not representable as 8.3: {0}")]
    InvalidName(String),

    #[error("Cluster chain corrupt at cluster {cluster:#06x}")]
    CorruptChain { cluster: u16 },

    #[error("File would exceed the 4 GiB FAT size limit")]
    FileTooLarge,
}

pub type Result<T> = core::result::Result<T, FatError>;

impl From<FatError> for VfsError {
    fn from(e: FatError) -> Self {
        match e {
            FatError::Block(err) => VfsError::io(alloc::format!("{}", err)),
            FatError::InvalidBootSector(msg) => VfsError::InvalidBootSector(String::from(msg)),
            FatError::UnsupportedGeometry(msg) => VfsError::InvalidBootSector(String::from(msg)),
            FatError::StorageExhausted | FatError::FileTooLarge => VfsError::StorageExhausted,
            FatError::DirectoryFull => VfsError::DirectoryFull,
            FatError::NotFound => VfsError::NotFound,
            FatError::AlreadyExists => VfsError::AlreadyExists,
            FatError::NotADirectory => VfsError::NotADirectory,
            FatError::NotAFile => VfsError::NotAFile,
            FatError::NotEmpty => VfsError::NotEmpty,
            FatError::InvalidName(name) => VfsError::InvalidName(name),
            FatError::CorruptChain { cluster } => {
                VfsError::io(alloc::format!("corrupt cluster chain at {:#06x}", cluster))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaal_block::DeviceId;

    #[test]
    fn test_block_error_maps_to_io() {
        let err: FatError = BlockError::DeviceFailure {
            device: DeviceId(0),
            lba: 12,
        }
        .into();
        let vfs: VfsError = err.into();
        assert!(matches!(vfs, VfsError::Io(msg) if msg.contains("LBA 12")));
    }

    #[test]
    fn test_taxonomy_mapping() {
        assert_eq!(VfsError::from(FatError::DirectoryFull), VfsError::DirectoryFull);
        assert_eq!(VfsError::from(FatError::StorageExhausted), VfsError::StorageExhausted);
        assert_eq!(VfsError::from(FatError::NotEmpty), VfsError::NotEmpty);
        assert!(matches!(
            VfsError::from(FatError::InvalidBootSector("signature")),
            VfsError::InvalidBootSector(_)
        ));
    }
}
