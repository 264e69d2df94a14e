use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::data;
use crate::dir::{Dir, DirEntries, DirEntry};
use crate::dir_entry::DirEntryType;
use crate::error::{Error, Result};
use crate::file::File;
use crate::group_desc::{GroupDesc, GROUP_DESC_SIZE};
use crate::inode::{FileFormat, Inode, INODE_RECORD_SIZE};
use crate::superblock::{FsState, RevLevel, Superblock, ROOT_INO, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
use crate::volume::Volume;

/// A mounted ext2 volume.
///
/// Mounting records the mount on disk (state flag, mount count, mount
/// time); releasing the drive resets the state flag to `Valid`. Handles
/// produced by [`Drive::open_dir`] and [`Drive::open_file`] borrow the
/// drive, so the mount cannot be torn down while one is live.
///
/// The backing volume is seek-addressed, so a `Drive` serializes its own
/// device access and must be used from one thread at a time.
pub struct Drive {
    volume: RefCell<Box<dyn Volume>>,
    superblock: Superblock,
    /// Raw superblock image; only the mutable fields are patched before a
    /// write-back, the rest round-trips untouched.
    sb_bytes: Vec<u8>,
    released: bool,
}

/// Metadata projection returned by [`Drive::stat`].
#[derive(Debug, Clone)]
pub struct Stat {
    pub ino: u32,
    pub mode: u16,
    pub links: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub block_size: u32,
    /// Allocated size in 512-byte units.
    pub blocks: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl Drive {
    /// Mounts the volume.
    ///
    /// Validates the superblock, then persists the mount bookkeeping:
    /// state becomes `HasErrors` until release, the mount count is
    /// bumped, and the mount time is stamped. A refused volume is left
    /// byte-identical.
    pub fn try_mount(mut volume: Box<dyn Volume>) -> Result<Drive> {
        let mut sb_bytes = vec![0u8; SUPERBLOCK_SIZE];
        volume.read(SUPERBLOCK_OFFSET, &mut sb_bytes)?;
        let mut superblock = match Superblock::decode(&sb_bytes) {
            Ok(superblock) => superblock,
            Err(err) => {
                debug!("refusing to mount: {err}");
                return Err(err);
            }
        };

        superblock.state = FsState::HasErrors;
        superblock.mnt_count = superblock.mnt_count.wrapping_add(1);
        superblock.mtime = unix_now();
        superblock.patch(&mut sb_bytes);
        volume.write(SUPERBLOCK_OFFSET, &sb_bytes)?;

        debug!(
            "mounted ext2 volume: {} blocks of {} bytes in {} groups, \
             {} inodes ({} free), rev {:?}, compat 0x{:x}, mount #{}",
            superblock.blocks_count,
            superblock.block_size(),
            superblock.block_groups(),
            superblock.inodes_count,
            superblock.free_inodes_count,
            superblock.rev_level,
            superblock.compat.bits(),
            superblock.mnt_count,
        );

        Ok(Drive {
            volume: RefCell::new(volume),
            superblock,
            sb_bytes,
            released: false,
        })
    }

    /// Cleanly releases the mount, resetting the on-disk state to
    /// `Valid`. Dropping the drive performs the same write-back but
    /// cannot report failure.
    pub fn unmount(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.superblock.state = FsState::Valid;
        self.superblock.patch(&mut self.sb_bytes);
        self.volume.get_mut().write(SUPERBLOCK_OFFSET, &self.sb_bytes)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn block_size(&self) -> u64 {
        self.superblock.block_size()
    }

    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.volume.borrow_mut().read(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.volume.borrow_mut().write(offset, buf)
    }

    /// The descriptor table starts in the block after the one holding the
    /// superblock.
    fn group_desc_offset(&self, group_idx: u32) -> Result<u64> {
        let groups = self.superblock.block_groups();
        if group_idx >= groups {
            return Err(Error::InvalidArgument(format!(
                "block group {group_idx} out of range (volume has {groups})"
            )));
        }
        let table = (u64::from(self.superblock.first_data_block) + 1) * self.block_size();
        Ok(table + u64::from(group_idx) * GROUP_DESC_SIZE as u64)
    }

    pub fn read_group_desc(&self, group_idx: u32) -> Result<GroupDesc> {
        let offset = self.group_desc_offset(group_idx)?;
        let mut buf = [0u8; GROUP_DESC_SIZE];
        self.read_at(offset, &mut buf)?;
        Ok(GroupDesc::decode(&buf))
    }

    pub fn write_group_desc(&self, group_idx: u32, desc: &GroupDesc) -> Result<()> {
        let offset = self.group_desc_offset(group_idx)?;
        let mut buf = [0u8; GROUP_DESC_SIZE];
        desc.encode(&mut buf);
        self.write_at(offset, &buf)
    }

    /// Byte offset of inode `ino` inside its group's inode table.
    /// Numbering starts at 1.
    pub fn inode_offset(&self, ino: u32) -> Result<u64> {
        if ino == 0 || ino > self.superblock.inodes_count {
            return Err(Error::InvalidArgument(format!(
                "inode {ino} out of range (volume has {})",
                self.superblock.inodes_count
            )));
        }
        let per_group = self.superblock.inodes_per_group;
        let group = (ino - 1) / per_group;
        let local = (ino - 1) % per_group;
        let desc = self.read_group_desc(group)?;
        Ok(u64::from(desc.inode_table) * self.block_size()
            + u64::from(local) * u64::from(self.superblock.inode_size))
    }

    /// Reads inode `ino`. Exactly the 128 decoded bytes are fetched even
    /// when `s_inode_size` is larger.
    pub fn read_inode(&self, ino: u32) -> Result<Inode> {
        let offset = self.inode_offset(ino)?;
        let mut buf = [0u8; INODE_RECORD_SIZE];
        self.read_at(offset, &mut buf)?;
        Ok(Inode::decode(&buf))
    }

    pub fn write_inode(&self, ino: u32, inode: &Inode) -> Result<()> {
        let offset = self.inode_offset(ino)?;
        let mut buf = [0u8; INODE_RECORD_SIZE];
        inode.encode(&mut buf);
        self.write_at(offset, &buf)
    }

    /// Reads `buf.len()` bytes at byte `offset` of the file backed by
    /// `inode`, walking the direct and indirect pointer tree.
    pub fn read_inode_data(&self, inode: &Inode, offset: u64, buf: &mut [u8]) -> Result<()> {
        data::read_inode_data(self, inode, offset, buf)
    }

    /// Resolves `path` to an inode number.
    ///
    /// An absolute path walks from the root directory. A relative path
    /// walks from `origin`, which must itself be a non-empty absolute
    /// path. Symbolic links are not followed.
    pub fn resolve_path(&self, path: &str, origin: &str) -> Result<u32> {
        if path.is_empty() {
            return Err(Error::InvalidArgument("cannot resolve empty path".into()));
        }
        if let Some(rest) = path.strip_prefix('/') {
            return self.resolve_from(rest.trim_start_matches('/'), ROOT_INO);
        }
        if origin.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "relative path {path:?} needs an absolute origin"
            )));
        }
        if !origin.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "origin {origin:?} is not absolute"
            )));
        }
        let origin_ino = self.resolve_path(origin, "")?;
        self.resolve_from(path, origin_ino)
    }

    fn resolve_from(&self, mut path: &str, mut origin: u32) -> Result<u32> {
        while !path.is_empty() {
            let (component, rest) = match path.find('/') {
                Some(pos) => (&path[..pos], &path[pos..]),
                None => (path, ""),
            };

            let dir_inode = self.read_inode(origin)?;
            if !dir_inode.is_dir() {
                return Err(Error::NotADirectory(format!(
                    "inode {origin} on the way to {component:?}"
                )));
            }

            let entry = self.find_dir_entry(&dir_inode, component)?;
            origin = entry.ino;
            path = rest;
            if !path.is_empty() {
                // More components follow, so this one must be a directory.
                if self.entry_file_format(&entry)? != FileFormat::Dir {
                    return Err(Error::NotADirectory(component.to_string()));
                }
                path = path.trim_start_matches('/');
            }
        }
        Ok(origin)
    }

    /// First entry of `dir_inode` whose name matches `name` exactly.
    fn find_dir_entry(&self, dir_inode: &Inode, name: &str) -> Result<DirEntry> {
        for entry in DirEntries::new(self, dir_inode) {
            let entry = entry?;
            if entry.name == name.as_bytes() {
                return Ok(entry);
            }
        }
        Err(Error::NotFound(name.to_string()))
    }

    /// File format of a resolved directory entry.
    ///
    /// Dynamic-revision volumes record it in the entry itself; revision
    /// 0, a zero code, or an out-of-range code fall back to the mode
    /// field of the referenced inode.
    fn entry_file_format(&self, entry: &DirEntry) -> Result<FileFormat> {
        if self.superblock.rev_level == RevLevel::Dynamic {
            match DirEntryType::from_raw(entry.file_type) {
                Some(DirEntryType::Unknown) => {}
                Some(kind) => return Ok(kind.file_format()),
                None => warn!(
                    "directory entry for inode {} carries unknown file type {}",
                    entry.ino, entry.file_type
                ),
            }
        }
        Ok(self.read_inode(entry.ino)?.file_format())
    }

    /// Opens the directory at `path` (see [`Drive::resolve_path`] for
    /// origin handling).
    pub fn open_dir(&self, path: &str, origin: &str) -> Result<Dir<'_>> {
        let ino = self.resolve_path(path, origin)?;
        let inode = self.read_inode(ino)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        Ok(Dir::new(self, ino, inode))
    }

    /// Opens the regular file at `path`.
    pub fn open_file(&self, path: &str, origin: &str) -> Result<File<'_>> {
        let ino = self.resolve_path(path, origin)?;
        let inode = self.read_inode(ino)?;
        if !inode.is_regular() {
            return Err(Error::InvalidArgument(format!(
                "{path} is not a regular file"
            )));
        }
        Ok(File::new(self, ino, inode))
    }

    /// Stats the inode at `path`, recording the access time on disk. No
    /// other inode field is altered.
    pub fn stat(&self, path: &str, origin: &str) -> Result<Stat> {
        let ino = self.resolve_path(path, origin)?;
        let mut inode = self.read_inode(ino)?;
        inode.atime = unix_now();
        self.write_inode(ino, &inode)?;
        Ok(Stat {
            ino,
            mode: inode.mode,
            links: inode.links_count,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            block_size: self.block_size() as u32,
            blocks: inode.blocks,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        })
    }
}

impl Drop for Drive {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to write back the superblock on release: {err}");
        }
    }
}

fn unix_now() -> u32 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as u32,
        Err(_) => 0,
    }
}
