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

//! File engine: file content as a singly linked list of blocks, each
//! prefixed by a `pointer_size`-byte pointer to the next block.
//!
//! Corrects the two known quirks called out in `spec.md` §4.7/§9: payload
//! is written/read at offset `pointer_size` (not a hard-coded 4), and the
//! per-block copy length is `min(actual_space_per_block, remaining)` with
//! no off-by-one.

use std::collections::HashSet;

use crate::block;
use crate::geometry::Geometry;
use crate::ptr::write_ptr;
use crate::storage::Storage;
use vdisk_err::Result;

/// Writes `data` into the chain anchored at `anchor` (already allocated by
/// the caller). Allocates additional blocks as needed, excluding every
/// block chosen earlier in this call so a single write never revisits a
/// block it just claimed.
pub fn write_chain(storage: &mut impl Storage, geometry: &Geometry, anchor: u64, data: &[u8]) -> Result<()> {
    let per_block = geometry.actual_space_per_block as usize;
    let block_count = if data.is_empty() {
        1
    } else {
        data.len().div_ceil(per_block)
    };

    let mut exclude = HashSet::new();
    exclude.insert(anchor);
    let mut current = anchor;

    for i in 0..block_count {
        let start = i * per_block;
        let len = per_block.min(data.len().saturating_sub(start));
        let payload = &data[start..start + len];

        let next = if i + 1 < block_count {
            let next = block::find_free_block(storage, geometry, &exclude)?;
            exclude.insert(next);
            next
        } else {
            0
        };

        let mut block = vec![0u8; geometry.block_size as usize];
        write_ptr(&mut block, geometry.pointer_size, next);
        let payload_start = geometry.pointer_size as usize;
        block[payload_start..payload_start + payload.len()].copy_from_slice(payload);
        if data.is_empty() {
            // An empty file's sole block would otherwise be all zero, same
            // as a free block. `read_chain` never looks at this byte: a
            // `size` of 0 returns before the first block read.
            block[geometry.block_size as usize - 1] = block::OCCUPIED_MARKER;
        }
        storage.write(current, &block)?;

        current = next;
    }

    Ok(())
}

/// Reads `size` bytes starting from the chain anchored at `anchor`.
pub fn read_chain(storage: &impl Storage, geometry: &Geometry, anchor: u64, size: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size as usize);
    let per_block = geometry.actual_space_per_block as usize;
    let mut remaining = size as usize;
    let mut current = anchor;

    let mut block = vec![0u8; geometry.block_size as usize];
    while remaining > 0 {
        storage.read(current, &mut block)?;
        let take = per_block.min(remaining);
        let payload_start = geometry.pointer_size as usize;
        out.extend_from_slice(&block[payload_start..payload_start + take]);
        remaining -= take;

        let next = crate::ptr::read_ptr(&block[..geometry.pointer_size as usize], geometry.pointer_size);
        if next == 0 {
            break;
        }
        current = next;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::collections::HashSet;

    fn test_geometry() -> Geometry {
        Geometry::new(64, 4, 20_000, 8).unwrap()
    }

    #[test]
    fn round_trips_small_payload() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(20_000);
        let anchor = block::find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        let data = b"hello world";
        write_chain(&mut storage, &geometry, anchor, data).unwrap();
        let back = read_chain(&storage, &geometry, anchor, data.len() as u64).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn round_trips_multi_block_payload() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(20_000);
        let anchor = block::find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        let data: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        write_chain(&mut storage, &geometry, anchor, &data).unwrap();
        let back = read_chain(&storage, &geometry, anchor, data.len() as u64).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn empty_file_allocates_single_block() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(20_000);
        let anchor = block::find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        write_chain(&mut storage, &geometry, anchor, &[]).unwrap();
        let back = read_chain(&storage, &geometry, anchor, 0).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn empty_file_anchor_is_not_reallocated() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(20_000);
        let anchor = block::find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        write_chain(&mut storage, &geometry, anchor, &[]).unwrap();

        let next_free = block::find_free_block(&storage, &geometry, &HashSet::new()).unwrap();
        assert_ne!(next_free, anchor);
    }
}
