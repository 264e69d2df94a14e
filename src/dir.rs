use std::cmp;

use crate::dir_entry::{DirEntryHeader, DIRENT_HEADER_SIZE, MAX_NAME_LEN};
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::inode::Inode;

/// One live directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub ino: u32,
    /// Raw type byte from the on-disk header; meaningful only on
    /// dynamic-revision volumes.
    pub file_type: u8,
    /// Name bytes as stored, without a terminator.
    pub name: Vec<u8>,
}

/// An open directory. Borrows the drive it was opened on.
pub struct Dir<'d> {
    drive: &'d Drive,
    ino: u32,
    inode: Inode,
}

impl<'d> Dir<'d> {
    pub(crate) fn new(drive: &'d Drive, ino: u32, inode: Inode) -> Dir<'d> {
        Dir { drive, ino, inode }
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    /// Iterates the live entries in on-disk order.
    pub fn entries(&self) -> DirEntries<'_> {
        DirEntries::new(self.drive, &self.inode)
    }
}

impl<'a> IntoIterator for &'a Dir<'_> {
    type Item = Result<DirEntry>;
    type IntoIter = DirEntries<'a>;

    fn into_iter(self) -> DirEntries<'a> {
        self.entries()
    }
}

/// Streaming iterator over a directory's packed entry records.
///
/// Tombstoned records (inode 0) are skipped but their `rec_len` is
/// consumed. The stream ends at `i_size`, at a zero `rec_len` (truncated
/// tail), or after the first failure; failures are yielded to the caller
/// instead of being folded into end-of-stream.
pub struct DirEntries<'a> {
    drive: &'a Drive,
    inode: &'a Inode,
    offset: u64,
    done: bool,
}

impl<'a> DirEntries<'a> {
    pub(crate) fn new(drive: &'a Drive, inode: &'a Inode) -> DirEntries<'a> {
        DirEntries {
            drive,
            inode,
            offset: 0,
            done: false,
        }
    }

    fn advance(&mut self) -> Result<Option<DirEntry>> {
        loop {
            // The dirent stream covers exactly i_size bytes.
            if self.offset >= u64::from(self.inode.size) {
                return Ok(None);
            }

            let mut head = [0u8; DIRENT_HEADER_SIZE];
            self.drive
                .read_inode_data(self.inode, self.offset, &mut head)?;
            let header = DirEntryHeader::decode(&head);

            if header.rec_len == 0 {
                // Truncated tail sentinel.
                return Ok(None);
            }
            if header.ino == 0 {
                self.offset += u64::from(header.rec_len);
                continue;
            }

            let name_len = cmp::min(header.name_len as usize, MAX_NAME_LEN);
            if (header.rec_len as usize) < DIRENT_HEADER_SIZE + name_len {
                return Err(Error::Malformed(format!(
                    "directory entry at offset {} has rec_len {} but a {}-byte name",
                    self.offset, header.rec_len, name_len
                )));
            }

            let mut name = vec![0u8; name_len];
            self.drive.read_inode_data(
                self.inode,
                self.offset + DIRENT_HEADER_SIZE as u64,
                &mut name,
            )?;
            self.offset += u64::from(header.rec_len);
            return Ok(Some(DirEntry {
                ino: header.ino,
                file_type: header.file_type,
                name,
            }));
        }
    }
}

impl Iterator for DirEntries<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Result<DirEntry>> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
