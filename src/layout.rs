/*
 * Copyright 2026 The blockfs authors
 *
 * This file is part of blockfs.
 *
 * blockfs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * blockfs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * blockfs. If not, see <https://www.gnu.org/licenses/>.
 */

//! Bit-exact on-disk layout: constants, superblock, inode, block runs.

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

pub const DISK_SIZE: u64 = 1024 * 1024;
pub const BLOCK_SIZE: u64 = 512;
pub const INODE_SIZE: u64 = 128;
pub const DIRECT_BLOCK_NUM: usize = 6;
/// `BLOCK_SIZE / size_of(BlockSequence)` = `512 / 8` packed entries per
/// indirect block (each entry serializes as two little-endian `u32`s).
pub const INDIRECT_NUM_BLOCK_SEQUENCE: usize = (BLOCK_SIZE / 8) as usize;

pub const BLOCK_COUNT: u64 = DISK_SIZE / BLOCK_SIZE;
pub const INODE_COUNT: u64 = BLOCK_COUNT;
pub const ROOT_INODE_NUMBER: u32 = 1;

pub const SUPERBLOCK_MAGIC_1: u32 = 0xA1B2_C3D4;
pub const SUPERBLOCK_MAGIC_2: u32 = 0xAD34_FB5E;
pub const CURRENT_FS_VERSION: u16 = 0x0001;
pub const INODE_MAGIC: u32 = 0x9876_5432;
pub const INODE_FLAG_IS_DIR: u16 = 0x1;

fn ceil_div(a: u64, b: u64) -> u64 {
    a.div_ceil(b)
}

fn block_pad(bytes: u64) -> u64 {
    ceil_div(bytes, BLOCK_SIZE) * BLOCK_SIZE
}

/// Fixed byte offsets and sizes of every region of the disk image, derived
/// once from the constants above.
#[derive(Debug, Clone, Copy)]
pub struct Regions {
    pub inode_bitmap_off: u64,
    pub inode_bitmap_size: u64,
    pub block_bitmap_off: u64,
    pub block_bitmap_size: u64,
    pub inode_table_off: u64,
    pub inode_table_size: u64,
    pub data_region_off: u64,
    pub data_region_size: u64,
}

impl Regions {
    pub fn compute() -> Self {
        let superblock_region = block_pad(BLOCK_SIZE);
        let inode_bitmap_size = block_pad(ceil_div(INODE_COUNT, 8));
        let block_bitmap_size = block_pad(ceil_div(BLOCK_COUNT, 8));
        let inode_table_size = block_pad(INODE_COUNT * INODE_SIZE);

        let inode_bitmap_off = superblock_region;
        let block_bitmap_off = inode_bitmap_off + inode_bitmap_size;
        let inode_table_off = block_bitmap_off + block_bitmap_size;
        let data_region_off = inode_table_off + inode_table_size;
        let data_region_size = DISK_SIZE - data_region_off;

        Self {
            inode_bitmap_off,
            inode_bitmap_size,
            block_bitmap_off,
            block_bitmap_size,
            inode_table_off,
            inode_table_size,
            data_region_off,
            data_region_size,
        }
    }

    /// The number of blocks occupied by metadata (everything before the
    /// data region), used to compute the maximum allocatable block count.
    pub fn data_block_count(&self) -> u64 {
        self.data_region_size / BLOCK_SIZE
    }

    /// The block number (0-based, disk-wide) of the first data block.
    pub fn data_region_start_block(&self) -> u64 {
        self.data_region_off / BLOCK_SIZE
    }
}

/// Fixed-size header describing the filesystem's layout and constants, the
/// first `BLOCK_SIZE` bytes of the disk image.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub magic1: u32,
    pub magic2: u32,
    pub version: u16,
    pub block_size: u32,
    pub inode_size: u32,
    pub inode_count: u64,
    pub block_count: u64,
    pub inode_bitmap_size: u64,
    pub block_bitmap_size: u64,
    pub inode_table_size: u64,
    pub data_region_size: u64,
}

impl Superblock {
    pub fn new(regions: &Regions) -> Self {
        Self {
            magic1: SUPERBLOCK_MAGIC_1,
            magic2: SUPERBLOCK_MAGIC_2,
            version: CURRENT_FS_VERSION,
            block_size: BLOCK_SIZE as u32,
            inode_size: INODE_SIZE as u32,
            inode_count: INODE_COUNT,
            block_count: BLOCK_COUNT,
            inode_bitmap_size: regions.inode_bitmap_size,
            block_bitmap_size: regions.block_bitmap_size,
            inode_table_size: regions.inode_table_size,
            data_region_size: regions.data_region_size,
        }
    }

    pub fn serialize(&self) -> ByteBuffer {
        let mut b = ByteBuffer::alloc(BLOCK_SIZE as usize);
        b.write_uint32(0, self.magic1).unwrap();
        b.write_uint32(4, self.magic2).unwrap();
        b.write_uint16(8, self.version).unwrap();
        b.write_uint32(10, self.block_size).unwrap();
        b.write_uint32(14, self.inode_size).unwrap();
        b.write_uint64(18, self.inode_count).unwrap();
        b.write_uint64(26, self.block_count).unwrap();
        b.write_uint64(34, self.inode_bitmap_size).unwrap();
        b.write_uint64(42, self.block_bitmap_size).unwrap();
        b.write_uint64(50, self.inode_table_size).unwrap();
        b.write_uint64(58, self.data_region_size).unwrap();
        b
    }

    pub fn deserialize(b: &ByteBuffer) -> Result<Self> {
        let sb = Self {
            magic1: b.read_uint32(0)?,
            magic2: b.read_uint32(4)?,
            version: b.read_uint16(8)?,
            block_size: b.read_uint32(10)?,
            inode_size: b.read_uint32(14)?,
            inode_count: b.read_uint64(18)?,
            block_count: b.read_uint64(26)?,
            inode_bitmap_size: b.read_uint64(34)?,
            block_bitmap_size: b.read_uint64(42)?,
            inode_table_size: b.read_uint64(50)?,
            data_region_size: b.read_uint64(58)?,
        };
        if sb.magic1 != SUPERBLOCK_MAGIC_1 || sb.magic2 != SUPERBLOCK_MAGIC_2 {
            return Err(Error::CorruptInode);
        }
        if sb.version != CURRENT_FS_VERSION {
            return Err(Error::CorruptInode);
        }
        Ok(sb)
    }
}

/// A run of contiguous blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSequence {
    pub start_addr: u64,
    pub length: u64,
}

impl BlockSequence {
    pub fn is_empty(&self) -> bool {
        self.start_addr == 0 && self.length == 0
    }
}

/// Fixed-size (`INODE_SIZE` byte) inode record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub inode_number: u32,
    pub uid: u32,
    pub gid: u32,
    pub flags: u16,
    pub size: u64,
    pub time_created: u64,
    pub time_last_modified: u64,
    pub preallocation_size: u16,
    pub direct_blocks: [BlockSequence; DIRECT_BLOCK_NUM],
    pub single_indirect: u64,
    pub double_indirect: u64,
    pub triple_indirect: u64,
}

impl Inode {
    pub fn is_directory(&self) -> bool {
        self.flags & INODE_FLAG_IS_DIR != 0
    }

    pub fn new_empty(inode_number: u32, is_directory: bool, now: u64) -> Self {
        Self {
            inode_number,
            uid: 0,
            gid: 0,
            flags: if is_directory { INODE_FLAG_IS_DIR } else { 0 },
            size: 0,
            time_created: now,
            time_last_modified: now,
            preallocation_size: 0,
            direct_blocks: [BlockSequence::default(); DIRECT_BLOCK_NUM],
            single_indirect: 0,
            double_indirect: 0,
            triple_indirect: 0,
        }
    }

    pub fn serialize(&self) -> ByteBuffer {
        let mut b = ByteBuffer::alloc(INODE_SIZE as usize);
        b.write_uint32(0, INODE_MAGIC).unwrap();
        b.write_uint32(4, self.inode_number).unwrap();
        b.write_uint32(8, self.uid).unwrap();
        b.write_uint32(12, self.gid).unwrap();
        b.write_uint16(16, self.flags).unwrap();
        b.write_uint64(18, self.size).unwrap();
        b.write_uint64(26, self.time_created).unwrap();
        b.write_uint64(34, self.time_last_modified).unwrap();
        b.write_uint16(42, self.preallocation_size).unwrap();

        let mut off = 44;
        for seq in &self.direct_blocks {
            b.write_uint32(off, seq.start_addr as u32).unwrap();
            b.write_uint32(off + 4, seq.length as u32).unwrap();
            off += 8;
        }
        b.write_uint64(off, self.single_indirect).unwrap();
        b.write_uint64(off + 8, self.double_indirect).unwrap();
        b.write_uint64(off + 16, self.triple_indirect).unwrap();
        b
    }

    /// Deserializes an inode from a freshly read `INODE_SIZE`-byte slot.
    /// `slot_empty` tells whether the slot's magic failed to match, in
    /// which case the caller is asking about an unallocated slot rather
    /// than a corrupt one.
    pub fn deserialize(b: &ByteBuffer) -> Result<Option<Self>> {
        let magic = b.read_uint32(0)?;
        if magic != INODE_MAGIC {
            return Ok(None);
        }
        let inode_number = b.read_uint32(4)?;
        let uid = b.read_uint32(8)?;
        let gid = b.read_uint32(12)?;
        let flags = b.read_uint16(16)?;
        let size = b.read_uint64(18)?;
        let time_created = b.read_uint64(26)?;
        let time_last_modified = b.read_uint64(34)?;
        let preallocation_size = b.read_uint16(42)?;

        let mut direct_blocks = [BlockSequence::default(); DIRECT_BLOCK_NUM];
        let mut off = 44;
        for seq in &mut direct_blocks {
            seq.start_addr = b.read_uint32(off)? as u64;
            seq.length = b.read_uint32(off + 4)? as u64;
            off += 8;
        }
        let single_indirect = b.read_uint64(off)?;
        let double_indirect = b.read_uint64(off + 8)?;
        let triple_indirect = b.read_uint64(off + 16)?;

        Ok(Some(Self {
            inode_number,
            uid,
            gid,
            flags,
            size,
            time_created,
            time_last_modified,
            preallocation_size,
            direct_blocks,
            single_indirect,
            double_indirect,
            triple_indirect,
        }))
    }
}

/// The disk-block address of the inode table block holding inode `n`, and
/// the byte offset within that block.
///
/// Each block holds `BLOCK_SIZE / INODE_SIZE` inodes (4, for the default
/// constants).
pub fn inode_addr_to_disk_block_addr(regions: &Regions, n: u32) -> (u64, u64) {
    let inodes_per_block = BLOCK_SIZE / INODE_SIZE;
    let table_start_block = regions.inode_table_off / BLOCK_SIZE;
    let block = table_start_block + (n as u64) / inodes_per_block;
    let byte_off = (n as u64 % inodes_per_block) * INODE_SIZE;
    (block, byte_off)
}

/// Encodes up to [`INDIRECT_NUM_BLOCK_SEQUENCE`] [`BlockSequence`] entries
/// into one block's worth of bytes, zero-padding unused entries.
pub fn encode_indirect_block(seqs: &[BlockSequence]) -> ByteBuffer {
    debug_assert!(seqs.len() <= INDIRECT_NUM_BLOCK_SEQUENCE);
    let mut b = ByteBuffer::alloc(BLOCK_SIZE as usize);
    for (i, seq) in seqs.iter().enumerate() {
        b.write_uint32(i * 8, seq.start_addr as u32).unwrap();
        b.write_uint32(i * 8 + 4, seq.length as u32).unwrap();
    }
    b
}

/// Decodes up to [`INDIRECT_NUM_BLOCK_SEQUENCE`] [`BlockSequence`] entries
/// from one indirect block, stopping at the first empty entry.
pub fn decode_indirect_block(b: &ByteBuffer) -> Result<Vec<BlockSequence>> {
    let mut out = Vec::new();
    for i in 0..INDIRECT_NUM_BLOCK_SEQUENCE {
        let start_addr = b.read_uint32(i * 8)? as u64;
        let length = b.read_uint32(i * 8 + 4)? as u64;
        let seq = BlockSequence {
            start_addr,
            length,
        };
        if seq.is_empty() {
            break;
        }
        out.push(seq);
    }
    Ok(out)
}

/// Entries per pointer block at the double/triple indirect levels: one
/// `u64` block number per entry.
pub const POINTERS_PER_BLOCK: usize = (BLOCK_SIZE / 8) as usize;

pub fn encode_pointer_block(pointers: &[u64]) -> ByteBuffer {
    debug_assert!(pointers.len() <= POINTERS_PER_BLOCK);
    let mut b = ByteBuffer::alloc(BLOCK_SIZE as usize);
    for (i, p) in pointers.iter().enumerate() {
        b.write_uint64(i * 8, *p).unwrap();
    }
    b
}

pub fn decode_pointer_block(b: &ByteBuffer) -> Result<Vec<u64>> {
    let mut out = Vec::new();
    for i in 0..POINTERS_PER_BLOCK {
        let p = b.read_uint64(i * 8)?;
        if p == 0 {
            break;
        }
        out.push(p);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn regions_are_block_aligned() {
        let r = Regions::compute();
        assert_eq!(r.inode_bitmap_off % BLOCK_SIZE, 0);
        assert_eq!(r.block_bitmap_off % BLOCK_SIZE, 0);
        assert_eq!(r.inode_table_off % BLOCK_SIZE, 0);
        assert_eq!(r.data_region_off % BLOCK_SIZE, 0);
        assert_eq!(
            r.data_region_off + r.data_region_size,
            DISK_SIZE
        );
    }

    #[test]
    fn superblock_round_trip() {
        let r = Regions::compute();
        let sb = Superblock::new(&r);
        let bytes = sb.serialize();
        let sb2 = Superblock::deserialize(&bytes).unwrap();
        assert_eq!(sb.magic1, sb2.magic1);
        assert_eq!(sb.block_count, sb2.block_count);
        assert_eq!(sb.data_region_size, sb2.data_region_size);
    }

    #[test]
    fn inode_round_trip() {
        let mut inode = Inode::new_empty(1, true, 42);
        inode.direct_blocks[0] = BlockSequence {
            start_addr: 10,
            length: 3,
        };
        inode.size = 1536;
        let bytes = inode.serialize();
        let back = Inode::deserialize(&bytes).unwrap().unwrap();
        assert_eq!(back.inode_number, 1);
        assert!(back.is_directory());
        assert_eq!(back.direct_blocks[0], inode.direct_blocks[0]);
        assert_eq!(back.size, 1536);
    }

    #[test]
    fn unallocated_slot_is_none() {
        let b = ByteBuffer::alloc(INODE_SIZE as usize);
        assert!(Inode::deserialize(&b).unwrap().is_none());
    }

    #[test]
    fn inode_addr_math() {
        let r = Regions::compute();
        let (blk0, off0) = inode_addr_to_disk_block_addr(&r, 0);
        let (blk1, off1) = inode_addr_to_disk_block_addr(&r, 1);
        let (blk4, off4) = inode_addr_to_disk_block_addr(&r, 4);
        assert_eq!(blk0, r.inode_table_off / BLOCK_SIZE);
        assert_eq!(off0, 0);
        assert_eq!(blk1, blk0);
        assert_eq!(off1, INODE_SIZE);
        assert_eq!(blk4, blk0 + 1);
        assert_eq!(off4, 0);
    }

    #[test]
    fn indirect_block_round_trip() {
        let seqs = vec![
            BlockSequence {
                start_addr: 100,
                length: 2,
            },
            BlockSequence {
                start_addr: 200,
                length: 5,
            },
        ];
        let b = encode_indirect_block(&seqs);
        let back = decode_indirect_block(&b).unwrap();
        assert_eq!(back, seqs);
    }
}
