// Copyright 2024 Vdisk Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Linear-scan block allocator over the block region.

use std::collections::HashSet;

use log::{debug, error};

use crate::geometry::Geometry;
use crate::ptr::{is_zero_slot, read_ptr};
use crate::storage::Storage;
use vdisk_err::{Error, FsError, Result};

/// Sentinel written into a block's last byte to pull it out of the free
/// pool even when it has no other content (a new directory anchor, or an
/// empty file's sole block) — otherwise it reads as all-zero and
/// [`find_free_block`] hands it straight back out.
pub(crate) const OCCUPIED_MARKER: u8 = 0xFF;

/// Finds the first free block at index ≥ 1 (index 0 is the root's anchor
/// and is never handed out), skipping any absolute offset already in
/// `exclude` so a single operation never reuses a block it picked earlier.
pub fn find_free_block(
    storage: &impl Storage,
    geometry: &Geometry,
    exclude: &HashSet<u64>,
) -> Result<u64> {
    let mut raw = vec![0u8; geometry.block_size as usize];
    for index in 1..geometry.block_count as u64 {
        let offset = geometry.block_offset(index);
        if exclude.contains(&offset) {
            continue;
        }
        storage.read(offset, &mut raw)?;
        if is_zero_slot(&raw) {
            if index as i64 + 1 == geometry.block_count {
                debug!("block region down to its last free block");
            }
            return Ok(offset);
        }
    }
    error!("block region exhausted ({} blocks)", geometry.block_count);
    Err(Error::Fs(FsError::OutOfSpace))
}

/// Marks the block at `offset` as occupied without disturbing its other
/// content: writes [`OCCUPIED_MARKER`] into its last byte, which sits past
/// every directory slot and file-chain payload byte for any geometry, so
/// existing readers never see it.
pub fn mark_block_occupied(storage: &mut impl Storage, geometry: &Geometry, offset: u64) -> Result<()> {
    storage.write(offset + geometry.block_size as u64 - 1, &[OCCUPIED_MARKER])
}

/// Walks a chain starting at `head_ptr`, zeroing every visited block.
/// Stops once a block's next-pointer prefix is zero (chain terminator).
pub fn free_chain(storage: &mut impl Storage, geometry: &Geometry, head_ptr: u64) -> Result<()> {
    let mut raw = vec![0u8; geometry.block_size as usize];
    let zeros = vec![0u8; geometry.block_size as usize];
    let mut current = head_ptr;
    debug!("freeing chain starting at {head_ptr}");
    loop {
        storage.read(current, &mut raw)?;
        let next = read_ptr(&raw[..geometry.pointer_size as usize], geometry.pointer_size);
        storage.write(current, &zeros)?;
        if next == 0 {
            break;
        }
        current = next;
    }
    Ok(())
}

/// Total bytes currently free in the block region (excludes the reserved
/// index-0 anchor block, whose occupancy never changes across operations).
pub fn free_space(storage: &impl Storage, geometry: &Geometry) -> Result<u64> {
    let mut raw = vec![0u8; geometry.block_size as usize];
    let mut free_blocks = 0u64;
    for index in 1..geometry.block_count as u64 {
        storage.read(geometry.block_offset(index), &mut raw)?;
        if is_zero_slot(&raw) {
            free_blocks += 1;
        }
    }
    Ok(free_blocks * geometry.block_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn test_geometry() -> Geometry {
        Geometry::new(256, 12, 65536, 16).unwrap()
    }

    #[test]
    fn allocates_lowest_free_index_first() {
        let geometry = test_geometry();
        let storage = MemoryStorage::zeroed(65536);
        let offset = find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        assert_eq!(offset, geometry.block_offset(1));
    }

    #[test]
    fn exclusions_skip_a_block() {
        let geometry = test_geometry();
        let storage = MemoryStorage::zeroed(65536);
        let mut exclude = HashSet::new();
        exclude.insert(geometry.block_offset(1));
        let offset = find_free_block(&storage, &geometry, &exclude).unwrap();
        assert_eq!(offset, geometry.block_offset(2));
    }

    #[test]
    fn free_chain_zeroes_all_blocks() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(65536);
        let b1 = geometry.block_offset(1);
        let b2 = geometry.block_offset(2);
        let mut block1 = vec![0u8; geometry.block_size as usize];
        crate::ptr::write_ptr(&mut block1, geometry.pointer_size, b2);
        block1[geometry.pointer_size as usize] = 0xAB;
        storage.write(b1, &block1).unwrap();
        let mut block2 = vec![0u8; geometry.block_size as usize];
        block2[geometry.pointer_size as usize] = 0xCD;
        storage.write(b2, &block2).unwrap();

        free_chain(&mut storage, &geometry, b1).unwrap();

        let free = find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        assert_eq!(free, b1);
    }

    #[test]
    fn marked_block_is_no_longer_free() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(65536);
        let b1 = geometry.block_offset(1);
        mark_block_occupied(&mut storage, &geometry, b1).unwrap();

        let free = find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        assert_eq!(free, geometry.block_offset(2));
        assert_eq!(
            free_space(&storage, &geometry).unwrap(),
            (geometry.block_count as u64 - 2) * geometry.block_size as u64
        );
    }

    #[test]
    fn free_space_excludes_reserved_block_zero() {
        let geometry = test_geometry();
        let storage = MemoryStorage::zeroed(65536);
        let expected = (geometry.block_count as u64 - 1) * geometry.block_size as u64;
        assert_eq!(free_space(&storage, &geometry).unwrap(), expected);
    }
}
