//! Shared test fixtures: an in-memory volume with access accounting and
//! a builder for small synthetic ext2 images.

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use crate::codec::{read_u16, write_u16, write_u32};
use crate::error::Result;
use crate::inode::{Inode, INODE_RECORD_SIZE};
use crate::volume::Volume;

pub(crate) const BLOCK_SIZE: usize = 1024;
pub(crate) const TOTAL_BLOCKS: u32 = 512;
pub(crate) const INODES: u32 = 32;
pub(crate) const INODE_TABLE_BLOCK: u32 = 5;
/// First block not claimed by the fixed layout (superblock, descriptor
/// table, bitmaps, inode table).
const FIRST_FREE_BLOCK: u32 = 9;

/// In-memory backing store. Clones share the same buffer and counters,
/// so a test can keep a handle while the drive owns the volume.
#[derive(Clone)]
pub(crate) struct MemVolume {
    data: Rc<RefCell<Vec<u8>>>,
    pub(crate) reads: Rc<Cell<usize>>,
    pub(crate) writes: Rc<Cell<usize>>,
}

impl MemVolume {
    pub(crate) fn new(data: Vec<u8>) -> MemVolume {
        MemVolume {
            data: Rc::new(RefCell::new(data)),
            reads: Rc::new(Cell::new(0)),
            writes: Rc::new(Cell::new(0)),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub(crate) fn reset_counters(&self) {
        self.reads.set(0);
        self.writes.set(0);
    }
}

impl Volume for MemVolume {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.borrow();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of image").into(),
            );
        }
        buf.copy_from_slice(&data[start..end]);
        self.reads.set(self.reads.get() + 1);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.data.borrow_mut();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(
                io::Error::new(io::ErrorKind::WriteZero, "write past end of image").into(),
            );
        }
        data[start..end].copy_from_slice(buf);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Builds a single-group revision-1 image with 1 KiB blocks: superblock
/// in block 1, descriptor table in block 2, bitmaps in blocks 3 and 4,
/// a 32-entry inode table in blocks 5 through 8, data from block 9.
pub(crate) struct ImageBuilder {
    data: Vec<u8>,
    next_block: u32,
}

impl ImageBuilder {
    pub(crate) fn new() -> ImageBuilder {
        let mut builder = ImageBuilder {
            data: vec![0u8; TOTAL_BLOCKS as usize * BLOCK_SIZE],
            next_block: FIRST_FREE_BLOCK,
        };
        builder.write_superblock();
        builder.write_group_desc();
        builder
    }

    /// Switches the image to revision 0.
    pub(crate) fn rev0(mut self) -> ImageBuilder {
        self.sb_u32(76, 0);
        self
    }

    fn write_superblock(&mut self) {
        let sb = &mut self.data[1024..2048];
        write_u32(sb, 0, INODES); // s_inodes_count
        write_u32(sb, 4, TOTAL_BLOCKS); // s_blocks_count
        write_u32(sb, 12, TOTAL_BLOCKS / 2); // s_free_blocks_count
        write_u32(sb, 16, INODES - 12); // s_free_inodes_count
        write_u32(sb, 20, 1); // s_first_data_block
        write_u32(sb, 24, 0); // s_log_block_size (1 KiB)
        write_u32(sb, 32, TOTAL_BLOCKS); // s_blocks_per_group
        write_u32(sb, 40, INODES); // s_inodes_per_group
        write_u32(sb, 44, 1_600_000_000); // s_mtime
        write_u16(sb, 52, 3); // s_mnt_count
        write_u16(sb, 56, 0xef53); // s_magic
        write_u16(sb, 58, 1); // s_state = Valid
        write_u32(sb, 76, 1); // s_rev_level
        write_u32(sb, 84, 11); // s_first_ino
        write_u16(sb, 88, 128); // s_inode_size
    }

    fn write_group_desc(&mut self) {
        let desc = &mut self.data[2 * BLOCK_SIZE..3 * BLOCK_SIZE];
        write_u32(desc, 0, 3); // bg_block_bitmap
        write_u32(desc, 4, 4); // bg_inode_bitmap
        write_u32(desc, 8, INODE_TABLE_BLOCK); // bg_inode_table
        write_u16(desc, 12, 200); // bg_free_blocks_count
        write_u16(desc, 14, 20); // bg_free_inodes_count
        write_u16(desc, 16, 3); // bg_used_dirs_count
    }

    pub(crate) fn sb_u16(&mut self, offset: usize, value: u16) {
        write_u16(&mut self.data[1024..2048], offset, value);
    }

    pub(crate) fn sb_u32(&mut self, offset: usize, value: u32) {
        write_u32(&mut self.data[1024..2048], offset, value);
    }

    pub(crate) fn alloc_block(&mut self) -> u32 {
        let block = self.next_block;
        self.next_block += 1;
        assert!(block < TOTAL_BLOCKS, "test image ran out of blocks");
        block
    }

    pub(crate) fn write_block(&mut self, block: u32, bytes: &[u8]) {
        let start = block as usize * BLOCK_SIZE;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn fill_block(&mut self, block: u32, byte: u8) {
        self.write_block(block, &[byte; BLOCK_SIZE]);
    }

    /// Stores `value` as entry `index` of the indirect block `block`.
    pub(crate) fn set_indirect(&mut self, block: u32, index: usize, value: u32) {
        let start = block as usize * BLOCK_SIZE;
        write_u32(&mut self.data[start..start + BLOCK_SIZE], index * 4, value);
    }

    pub(crate) fn put_inode(&mut self, ino: u32, inode: &Inode) {
        let start =
            INODE_TABLE_BLOCK as usize * BLOCK_SIZE + (ino as usize - 1) * INODE_RECORD_SIZE;
        inode.encode(&mut self.data[start..start + INODE_RECORD_SIZE]);
    }

    /// Writes `contents` into freshly allocated direct blocks and returns
    /// an inode describing them.
    pub(crate) fn file_inode(&mut self, mode: u16, contents: &[u8]) -> Inode {
        let mut inode = Inode {
            mode,
            size: contents.len() as u32,
            atime: 1_500_000_000,
            ctime: 1_500_000_000,
            mtime: 1_500_000_000,
            links_count: 1,
            ..Inode::default()
        };
        let mut allocated = 0;
        for (i, chunk) in contents.chunks(BLOCK_SIZE).enumerate() {
            assert!(i < 12, "test fixture files fit in the direct range");
            let block = self.alloc_block();
            self.write_block(block, chunk);
            inode.block[i] = block;
            allocated += 1;
        }
        inode.blocks = allocated * (BLOCK_SIZE as u32 / 512);
        inode
    }

    /// Packs dirents into one block; the final record's `rec_len` runs to
    /// the block end. An entry with inode 0 becomes a tombstone that
    /// still consumes its record.
    pub(crate) fn dir_block(entries: &[(u32, u8, &[u8])]) -> Vec<u8> {
        let mut block = vec![0u8; BLOCK_SIZE];
        let mut offset = 0;
        for (i, (ino, file_type, name)) in entries.iter().enumerate() {
            let body = 8 + name.len();
            let rec_len = if i == entries.len() - 1 {
                BLOCK_SIZE - offset
            } else {
                (body + 3) & !3
            };
            write_u32(&mut block[offset..], 0, *ino);
            write_u16(&mut block[offset..], 4, rec_len as u16);
            block[offset + 6] = name.len() as u8;
            block[offset + 7] = *file_type;
            block[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
            offset += rec_len;
        }
        block
    }

    /// A directory inode whose single data block holds `entries`.
    pub(crate) fn dir_inode(&mut self, entries: &[(u32, u8, &[u8])]) -> Inode {
        let block = Self::dir_block(entries);
        self.dir_inode_raw(&block)
    }

    /// A directory inode whose payload is exactly `block`.
    pub(crate) fn dir_inode_raw(&mut self, block: &[u8]) -> Inode {
        assert_eq!(block.len(), BLOCK_SIZE);
        let mut inode = self.file_inode(0x41ed, block);
        inode.links_count = 2;
        inode
    }

    /// Rewrites the type byte of the named entry in the root directory.
    pub(crate) fn retype_root_entry(&mut self, name: &[u8], file_type: u8) {
        let inode_off = INODE_TABLE_BLOCK as usize * BLOCK_SIZE + INODE_RECORD_SIZE;
        let root = Inode::decode(&self.data[inode_off..inode_off + INODE_RECORD_SIZE]);
        let mut offset = root.block[0] as usize * BLOCK_SIZE;
        loop {
            let rec_len = read_u16(&self.data, offset + 4) as usize;
            let name_len = self.data[offset + 6] as usize;
            if &self.data[offset + 8..offset + 8 + name_len] == name {
                self.data[offset + 7] = file_type;
                return;
            }
            assert!(rec_len > 0, "entry {name:?} not found in the root");
            offset += rec_len;
        }
    }

    pub(crate) fn finish(self) -> MemVolume {
        MemVolume::new(self.data)
    }
}

/// A volume with a small directory tree:
///
/// ```text
/// /            inode 2
///   lost+found inode 11
///   hello.txt  inode 12, "Hello, world!"
///   sub/       inode 13
///     inner.txt inode 14
/// ```
pub(crate) fn sample_tree() -> ImageBuilder {
    let mut img = ImageBuilder::new();

    let hello = img.file_inode(0x81a4, b"Hello, world!");
    let inner = img.file_inode(0x81a4, b"inner file\n");
    let lost_found = img.dir_inode(&[(11, 2, b"."), (2, 2, b"..")]);
    let sub = img.dir_inode(&[(13, 2, b"."), (2, 2, b".."), (14, 1, b"inner.txt")]);
    let mut root = img.dir_inode(&[
        (2, 2, b"."),
        (2, 2, b".."),
        (11, 2, b"lost+found"),
        (12, 1, b"hello.txt"),
        (13, 2, b"sub"),
    ]);
    root.links_count = 4;

    img.put_inode(2, &root);
    img.put_inode(11, &lost_found);
    img.put_inode(12, &hello);
    img.put_inode(13, &sub);
    img.put_inode(14, &inner);
    img
}
