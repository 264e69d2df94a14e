use bitflags::bitflags;

use crate::codec::{read_u16, read_u32, write_u16, write_u32};
use crate::error::{Error, Result};

/// Byte offset of the superblock from the start of the device.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// On-disk size of the superblock record.
pub const SUPERBLOCK_SIZE: usize = 1024;
/// `s_magic` of every ext2 volume.
pub const MAGIC: u16 = 0xef53;
/// Inode number of the root directory.
pub const ROOT_INO: u32 = 2;

/// Filesystem state flag (`s_state`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FsState {
    /// Unmounted cleanly.
    Valid,
    /// Errors detected, or still mounted.
    HasErrors,
}

impl FsState {
    fn from_raw(raw: u16) -> Result<FsState> {
        match raw {
            1 => Ok(FsState::Valid),
            2 => Ok(FsState::HasErrors),
            _ => Err(Error::InvalidImage(format!(
                "unknown filesystem state 0x{raw:x}"
            ))),
        }
    }

    fn to_raw(self) -> u16 {
        match self {
            FsState::Valid => 1,
            FsState::HasErrors => 2,
        }
    }
}

/// Revision level (`s_rev_level`). Revision 0 has fixed 128-byte inodes,
/// first usable inode 11, and no feature sets or dirent type codes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RevLevel {
    GoodOld,
    Dynamic,
}

impl RevLevel {
    fn from_raw(raw: u32) -> Result<RevLevel> {
        match raw {
            0 => Ok(RevLevel::GoodOld),
            1 => Ok(RevLevel::Dynamic),
            _ => Err(Error::InvalidImage(format!("unknown revision level {raw}"))),
        }
    }
}

bitflags! {
    /// Compatible feature set (`s_feature_compat`).
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct CompatFeatures: u32 {
        const DIR_PREALLOC = 0x0001;
        const IMAGIC_INODES = 0x0002;
        const HAS_JOURNAL = 0x0004;
        const EXT_ATTR = 0x0008;
        const RESIZE_INO = 0x0010;
        const DIR_INDEX = 0x0020;
    }
}

bitflags! {
    /// Incompatible feature set (`s_feature_incompat`). Any set bit,
    /// known or not, refuses the mount.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct IncompatFeatures: u32 {
        const COMPRESSION = 0x0001;
        const FILE_TYPE = 0x0002;
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
    }
}

bitflags! {
    /// Read-only-compatible feature set (`s_feature_ro_compat`). Any set
    /// bit refuses the mount.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct RoCompatFeatures: u32 {
        const SPARSE_SUPER = 0x0001;
        const LARGE_FILE = 0x0002;
        const BTREE_DIR = 0x0004;
    }
}

/// In-memory copy of the superblock fields this driver consumes. The
/// record is 1024 bytes on disk; unconsumed bytes are preserved verbatim
/// by [`Superblock::patch`] when the record is written back.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    /// Last mount time, UNIX epoch seconds.
    pub mtime: u32,
    pub mnt_count: u16,
    pub state: FsState,
    pub rev_level: RevLevel,
    pub first_ino: u32,
    pub inode_size: u16,
    pub compat: CompatFeatures,
    pub incompat: IncompatFeatures,
    pub ro_compat: RoCompatFeatures,
}

impl Superblock {
    /// Decodes and validates the 1024-byte superblock record.
    ///
    /// Refuses a bad magic, any incompatible or read-only-compatible
    /// feature bit, an errored or unrecognized state, and geometry the
    /// rest of the driver cannot divide by.
    pub fn decode(bytes: &[u8]) -> Result<Superblock> {
        assert!(bytes.len() >= SUPERBLOCK_SIZE);

        let magic = read_u16(bytes, 56);
        if magic != MAGIC {
            return Err(Error::InvalidImage(format!(
                "bad magic 0x{magic:04x}, expected 0x{MAGIC:04x}"
            )));
        }

        let rev_level = RevLevel::from_raw(read_u32(bytes, 76))?;
        let dynamic = rev_level == RevLevel::Dynamic;

        let incompat =
            IncompatFeatures::from_bits_retain(if dynamic { read_u32(bytes, 96) } else { 0 });
        let ro_compat =
            RoCompatFeatures::from_bits_retain(if dynamic { read_u32(bytes, 100) } else { 0 });
        if !incompat.is_empty() || !ro_compat.is_empty() {
            return Err(Error::InvalidImage(format!(
                "unsupported features (incompat 0x{:x}, ro_compat 0x{:x})",
                incompat.bits(),
                ro_compat.bits()
            )));
        }

        let state = FsState::from_raw(read_u16(bytes, 58))?;
        if state == FsState::HasErrors {
            return Err(Error::InvalidImage("filesystem has errors".into()));
        }

        let log_block_size = read_u32(bytes, 24);
        if log_block_size > 6 {
            return Err(Error::InvalidImage(format!(
                "block size 1024 << {log_block_size} is not supported"
            )));
        }

        let blocks_per_group = read_u32(bytes, 32);
        let inodes_per_group = read_u32(bytes, 40);
        if blocks_per_group == 0 || inodes_per_group == 0 {
            return Err(Error::InvalidImage("zero group geometry".into()));
        }

        let inode_size = if dynamic { read_u16(bytes, 88) } else { 128 };
        if inode_size < 128 {
            return Err(Error::InvalidImage(format!(
                "inode size {inode_size} is too small"
            )));
        }

        Ok(Superblock {
            inodes_count: read_u32(bytes, 0),
            blocks_count: read_u32(bytes, 4),
            free_blocks_count: read_u32(bytes, 12),
            free_inodes_count: read_u32(bytes, 16),
            first_data_block: read_u32(bytes, 20),
            log_block_size,
            blocks_per_group,
            inodes_per_group,
            mtime: read_u32(bytes, 44),
            mnt_count: read_u16(bytes, 52),
            state,
            rev_level,
            first_ino: if dynamic { read_u32(bytes, 84) } else { 11 },
            inode_size,
            compat: CompatFeatures::from_bits_retain(if dynamic { read_u32(bytes, 92) } else { 0 }),
            incompat,
            ro_compat,
        })
    }

    /// Patches the fields this driver mutates (state, mount count, mount
    /// time) into the on-disk image of the record. Every other byte keeps
    /// the value it had at mount time.
    pub fn patch(&self, bytes: &mut [u8]) {
        write_u32(bytes, 44, self.mtime);
        write_u16(bytes, 52, self.mnt_count);
        write_u16(bytes, 58, self.state.to_raw());
    }

    pub fn block_size(&self) -> u64 {
        1024 << self.log_block_size
    }

    pub fn block_groups(&self) -> u32 {
        self.blocks_count.div_ceil(self.blocks_per_group)
    }
}
