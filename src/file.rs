use std::cmp;

use crate::drive::Drive;
use crate::error::Result;
use crate::inode::Inode;

/// An open regular file with a byte cursor. Borrows the drive it was
/// opened on.
pub struct File<'d> {
    drive: &'d Drive,
    ino: u32,
    inode: Inode,
    pos: u64,
}

impl<'d> File<'d> {
    pub(crate) fn new(drive: &'d Drive, ino: u32, inode: Inode) -> File<'d> {
        File {
            drive,
            ino,
            inode,
            pos: 0,
        }
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// File length in bytes.
    pub fn size(&self) -> u64 {
        u64::from(self.inode.size)
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Reads up to `buf.len()` bytes at the cursor, clipped to the end of
    /// the file, and advances the cursor. Returns the number of bytes
    /// read; 0 means end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = self.size();
        if self.pos >= size {
            return Ok(0);
        }
        let len = cmp::min(buf.len() as u64, size - self.pos) as usize;
        self.drive
            .read_inode_data(&self.inode, self.pos, &mut buf[..len])?;
        self.pos += len as u64;
        Ok(len)
    }
}
