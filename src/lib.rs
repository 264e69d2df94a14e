//! Read-mostly ext2 driver for raw block devices and image files.
//!
//! [`Drive::try_mount`] validates and mounts a volume over any [`Volume`]
//! backing store. A mounted drive resolves POSIX-style paths, iterates
//! directories, reads file data through the full direct and indirect
//! block pointer tree, and stats inodes. The only writes are the mount
//! bookkeeping in the superblock and the access-time stamp recorded by
//! [`Drive::stat`].

pub use crate::dir::{Dir, DirEntries, DirEntry};
pub use crate::dir_entry::{DirEntryHeader, DirEntryType, DIRENT_HEADER_SIZE, MAX_NAME_LEN};
pub use crate::drive::{Drive, Stat};
pub use crate::error::{Error, Result};
pub use crate::file::File;
pub use crate::group_desc::{GroupDesc, GROUP_DESC_SIZE};
pub use crate::inode::{FileFormat, Inode, FILE_FORMAT_MASK, INODE_RECORD_SIZE};
pub use crate::superblock::{
    CompatFeatures, FsState, IncompatFeatures, RevLevel, RoCompatFeatures, Superblock, MAGIC,
    ROOT_INO, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE,
};
pub use crate::volume::{FileVolume, Volume};

mod codec;
mod data;
mod dir;
mod dir_entry;
mod drive;
mod error;
mod file;
mod group_desc;
mod inode;
mod superblock;
mod volume;

#[cfg(test)]
mod testutil;
