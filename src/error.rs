use std::{io, result};

use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

/// Failures surfaced by the driver.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing device failed, including a short read before the
    /// requested length was met.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The superblock does not describe a volume this driver can mount.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A path component has no matching directory entry.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// On-disk structures violate the format: a zero block pointer inside
    /// a file, an undersized directory record, a block index beyond the
    /// pointer tree.
    #[error("malformed filesystem: {0}")]
    Malformed(String),
}
