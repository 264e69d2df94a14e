//! Reading file data through the inode's block pointer tree.

use std::cmp;

use crate::codec::read_u32;
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::inode::Inode;

/// Number of direct pointers at the head of `i_block`.
const DIRECT_PTRS: u64 = 12;
const SINGLE_IND_SLOT: usize = 12;
const DOUBLE_IND_SLOT: usize = 13;
const TRIPLE_IND_SLOT: usize = 14;

/// Position of a logical block index within the pointer tree.
#[derive(Debug, Copy, Clone)]
enum BlockPos {
    Direct(u64),
    Single(u64),
    Double(u64, u64),
    Triple(u64, u64, u64),
    OutOfRange,
}

impl BlockPos {
    fn locate(file_block: u64, ptrs_per_block: u64) -> BlockPos {
        let single = ptrs_per_block;
        let double = single * single;
        let triple = double * single;

        if file_block < DIRECT_PTRS {
            return BlockPos::Direct(file_block);
        }
        let mut rest = file_block - DIRECT_PTRS;
        if rest < single {
            return BlockPos::Single(rest);
        }
        rest -= single;
        if rest < double {
            return BlockPos::Double(rest / single, rest % single);
        }
        rest -= double;
        if rest < triple {
            return BlockPos::Triple(rest / double, (rest % double) / single, rest % single);
        }
        BlockPos::OutOfRange
    }
}

/// Per-call resolver mapping logical block indices to physical blocks.
///
/// One buffer is held per indirect level and reloaded only when the block
/// number it must hold changes, so a run of logical blocks served by the
/// same indirect block costs a single read of that block. Crossing an
/// alignment boundary at the double level reloads the leaf buffer;
/// crossing one at the triple level reloads the middle and leaf buffers.
struct BlockMap<'d> {
    drive: &'d Drive,
    ptrs: [u32; 15],
    levels: [IndirectBuf; 3],
}

/// A cached indirect block; `block == 0` marks the buffer cold.
struct IndirectBuf {
    block: u32,
    data: Vec<u8>,
}

impl IndirectBuf {
    fn cold() -> IndirectBuf {
        IndirectBuf {
            block: 0,
            data: Vec::new(),
        }
    }
}

impl<'d> BlockMap<'d> {
    fn new(drive: &'d Drive, inode: &Inode) -> BlockMap<'d> {
        BlockMap {
            drive,
            ptrs: inode.block,
            levels: [IndirectBuf::cold(), IndirectBuf::cold(), IndirectBuf::cold()],
        }
    }

    /// Physical block number backing logical block `file_block`.
    fn resolve(&mut self, file_block: u64) -> Result<u32> {
        let ptrs_per_block = self.drive.block_size() / 4;
        match BlockPos::locate(file_block, ptrs_per_block) {
            BlockPos::Direct(i) => nonzero(self.ptrs[i as usize], file_block),
            BlockPos::Single(i) => {
                let single = nonzero(self.ptrs[SINGLE_IND_SLOT], file_block)?;
                nonzero(self.entry(0, single, i)?, file_block)
            }
            BlockPos::Double(i, j) => {
                let double = nonzero(self.ptrs[DOUBLE_IND_SLOT], file_block)?;
                let single = nonzero(self.entry(1, double, i)?, file_block)?;
                nonzero(self.entry(0, single, j)?, file_block)
            }
            BlockPos::Triple(i, j, k) => {
                let triple = nonzero(self.ptrs[TRIPLE_IND_SLOT], file_block)?;
                let double = nonzero(self.entry(2, triple, i)?, file_block)?;
                let single = nonzero(self.entry(1, double, j)?, file_block)?;
                nonzero(self.entry(0, single, k)?, file_block)
            }
            BlockPos::OutOfRange => Err(Error::Malformed(format!(
                "file block {file_block} is beyond the triple-indirect range"
            ))),
        }
    }

    /// Entry `index` of the indirect block `block`, loading the block into
    /// the level's buffer unless it is already current.
    fn entry(&mut self, level: usize, block: u32, index: u64) -> Result<u32> {
        let drive = self.drive;
        let block_size = drive.block_size();
        debug_assert!(index < block_size / 4);

        let buf = &mut self.levels[level];
        if buf.block != block {
            if buf.data.is_empty() {
                buf.data = vec![0u8; block_size as usize];
            }
            drive.read_at(u64::from(block) * block_size, &mut buf.data)?;
            buf.block = block;
        }
        Ok(read_u32(&buf.data, index as usize * 4))
    }
}

fn nonzero(block: u32, file_block: u64) -> Result<u32> {
    if block == 0 {
        return Err(Error::Malformed(format!(
            "file block {file_block} maps to an unallocated block"
        )));
    }
    Ok(block)
}

/// Reads `buf.len()` bytes at byte `offset` of the file backed by
/// `inode`. The whole range must be covered by allocated blocks; callers
/// clip to `i_size` themselves. A zero-length request succeeds without
/// touching the device.
pub(crate) fn read_inode_data(
    drive: &Drive,
    inode: &Inode,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    let block_size = drive.block_size();
    let mut map = BlockMap::new(drive, inode);
    let len = buf.len() as u64;
    let mut done = 0;
    // The first chunk honors the in-block offset; later chunks start
    // block-aligned.
    while done < len {
        let pos = offset + done;
        let chunk = cmp::min(len - done, block_size - pos % block_size);
        let block = map.resolve(pos / block_size)?;
        drive.read_at(
            u64::from(block) * block_size + pos % block_size,
            &mut buf[done as usize..(done + chunk) as usize],
        )?;
        done += chunk;
    }
    Ok(())
}
