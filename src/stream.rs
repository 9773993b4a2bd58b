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

//! Materializes the ordered list of [`BlockSequence`] runs backing an
//! inode's payload, by walking direct entries and any indirect blocks.

use crate::error::{Error, Result};
use crate::layout::{self, BlockSequence, Inode, BLOCK_SIZE};

/// A callback the stream uses to fetch one block's raw bytes, so this
/// module stays independent of how the caller talks to the backing file.
pub trait BlockReader {
    fn read_block(&mut self, block_addr: u64) -> Result<Vec<u8>>;
}

/// Walks `inode`'s direct and indirect pointers and returns the ordered,
/// authoritative run list for its payload.
///
/// The total length of the returned runs, in blocks, must equal
/// `⌈inode.size / BLOCK_SIZE⌉`; if it does not, the inode is corrupt.
pub fn read_addresses<R: BlockReader>(reader: &mut R, inode: &Inode) -> Result<Vec<BlockSequence>> {
    let mut runs = Vec::new();

    for seq in &inode.direct_blocks {
        if !seq.is_empty() {
            runs.push(*seq);
        }
    }

    if inode.single_indirect != 0 {
        let block = reader.read_block(inode.single_indirect)?;
        let buf = crate::buffer::ByteBuffer::from_vec(block);
        runs.extend(layout::decode_indirect_block(&buf)?);
    }

    if inode.double_indirect != 0 {
        read_double_indirect(reader, inode.double_indirect, &mut runs)?;
    }

    if inode.triple_indirect != 0 {
        let block = reader.read_block(inode.triple_indirect)?;
        let buf = crate::buffer::ByteBuffer::from_vec(block);
        for ptr in layout::decode_pointer_block(&buf)? {
            read_double_indirect(reader, ptr, &mut runs)?;
        }
    }

    let expected_blocks = inode.size.div_ceil(BLOCK_SIZE);
    let actual_blocks: u64 = runs.iter().map(|r| r.length).sum();
    if actual_blocks != expected_blocks {
        return Err(Error::CorruptInode);
    }

    Ok(runs)
}

/// Returns the block numbers used to hold the *pointers themselves*
/// (the single/double/triple indirect blocks and any intermediate pointer
/// blocks), as opposed to the data blocks they describe. The file engine
/// frees these alongside the data runs when it replaces an inode's
/// contents.
pub fn structural_blocks<R: BlockReader>(reader: &mut R, inode: &Inode) -> Result<Vec<u64>> {
    let mut out = Vec::new();

    if inode.single_indirect != 0 {
        out.push(inode.single_indirect);
    }
    if inode.double_indirect != 0 {
        out.push(inode.double_indirect);
        let block = reader.read_block(inode.double_indirect)?;
        let buf = crate::buffer::ByteBuffer::from_vec(block);
        for ptr in layout::decode_pointer_block(&buf)? {
            out.push(ptr);
        }
    }
    if inode.triple_indirect != 0 {
        out.push(inode.triple_indirect);
        let block = reader.read_block(inode.triple_indirect)?;
        let buf = crate::buffer::ByteBuffer::from_vec(block);
        for ptr in layout::decode_pointer_block(&buf)? {
            out.push(ptr);
            let block = reader.read_block(ptr)?;
            let buf = crate::buffer::ByteBuffer::from_vec(block);
            for inner_ptr in layout::decode_pointer_block(&buf)? {
                out.push(inner_ptr);
            }
        }
    }

    Ok(out)
}

fn read_double_indirect<R: BlockReader>(
    reader: &mut R,
    double_indirect_block: u64,
    runs: &mut Vec<BlockSequence>,
) -> Result<()> {
    let block = reader.read_block(double_indirect_block)?;
    let buf = crate::buffer::ByteBuffer::from_vec(block);
    for ptr in layout::decode_pointer_block(&buf)? {
        let block = reader.read_block(ptr)?;
        let buf = crate::buffer::ByteBuffer::from_vec(block);
        runs.extend(layout::decode_indirect_block(&buf)?);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layout::INODE_FLAG_IS_DIR;
    use std::collections::HashMap;

    struct MemBlocks(HashMap<u64, Vec<u8>>);

    impl BlockReader for MemBlocks {
        fn read_block(&mut self, block_addr: u64) -> Result<Vec<u8>> {
            self.0
                .get(&block_addr)
                .cloned()
                .ok_or(Error::InvalidMemoryAccess)
        }
    }

    #[test]
    fn direct_only() {
        let mut inode = Inode::new_empty(5, false, 0);
        inode.direct_blocks[0] = BlockSequence {
            start_addr: 10,
            length: 2,
        };
        inode.size = 2 * BLOCK_SIZE;
        let mut reader = MemBlocks(HashMap::new());
        let runs = read_addresses(&mut reader, &inode).unwrap();
        assert_eq!(runs, vec![inode.direct_blocks[0]]);
    }

    #[test]
    fn single_indirect_appends_until_empty_entry() {
        let mut inode = Inode::new_empty(6, false, 0);
        inode.direct_blocks[0] = BlockSequence {
            start_addr: 1,
            length: 1,
        };
        inode.single_indirect = 50;
        let extra = vec![
            BlockSequence {
                start_addr: 100,
                length: 2,
            },
            BlockSequence {
                start_addr: 200,
                length: 1,
            },
        ];
        inode.size = (1 + 2 + 1) * BLOCK_SIZE;

        let indirect_bytes = layout::encode_indirect_block(&extra).into_vec();
        let mut blocks = HashMap::new();
        blocks.insert(50, indirect_bytes);
        let mut reader = MemBlocks(blocks);

        let runs = read_addresses(&mut reader, &inode).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1], extra[0]);
        assert_eq!(runs[2], extra[1]);
    }

    #[test]
    fn mismatched_length_is_corrupt() {
        let mut inode = Inode::new_empty(7, true, 0);
        inode.flags |= INODE_FLAG_IS_DIR;
        inode.direct_blocks[0] = BlockSequence {
            start_addr: 1,
            length: 1,
        };
        inode.size = 5 * BLOCK_SIZE; // claims 5 blocks, only 1 present
        let mut reader = MemBlocks(HashMap::new());
        assert!(matches!(
            read_addresses(&mut reader, &inode),
            Err(Error::CorruptInode)
        ));
    }
}
