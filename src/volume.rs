use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// Byte-addressable backing store for a mounted drive.
///
/// Offsets are absolute device positions and may exceed 2 GiB. Both
/// operations transfer the whole buffer or fail; there is no partial
/// success.
pub trait Volume {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
}

/// A [`Volume`] backed by a regular file or a block device node.
pub struct FileVolume(pub fs::File);

impl Volume for FileVolume {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.0.seek(SeekFrom::Start(offset))?;
        let mut pos = 0;
        while pos < buf.len() {
            match self.0.read(&mut buf[pos..]) {
                // The device ended before the requested length was met.
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected end of device",
                    )
                    .into())
                }
                Ok(n) => pos += n,
                Err(err) if retryable(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.0.seek(SeekFrom::Start(offset))?;
        let mut pos = 0;
        while pos < buf.len() {
            match self.0.write(&buf[pos..]) {
                Ok(0) => {
                    return Err(
                        io::Error::new(io::ErrorKind::WriteZero, "device refused data").into(),
                    )
                }
                Ok(n) => pos += n,
                Err(err) if retryable(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

/// Interrupted and would-block transfers are restarted immediately.
fn retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}
