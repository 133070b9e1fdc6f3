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

//! Pure geometry derivation and the 12-byte on-image header.

use vdisk_err::{Error, GeometryError, Result};
use zerocopy::little_endian::{I64, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const HEADER_SIZE: u64 = 12;

/// The four user-chosen parameters and every quantity derived from them.
///
/// All derived fields are recomputed, never stored on disk — only
/// `block_size`, `file_info_size`, `storage_size`, and `max_name_length`
/// round-trip through the header (see [`Geometry::to_header_bytes`] /
/// [`Geometry::from_header_bytes`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u16,
    pub file_info_size: u8,
    pub storage_size: i64,
    pub max_name_length: u8,

    pub pointer_size: u8,
    pub block_count: i64,
    pub node_entry_size: i64,
    pub node_table_size: i64,
    pub block_data_index: i64,
    pub actual_space_per_block: i64,
    pub max_items_per_directory: i64,
    pub total_space: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct HeaderBytes {
    block_size: U16,
    file_info_size: u8,
    storage_size: I64,
    max_name_length: u8,
}

const _: () = assert!(size_of::<HeaderBytes>() == HEADER_SIZE as usize);

impl Geometry {
    pub fn new(
        block_size: u16,
        file_info_size: u8,
        storage_size: i64,
        max_name_length: u8,
    ) -> Result<Self> {
        let mut pointer_size: u8 = 1;
        loop {
            let node_entry_size = 1i64
                + max_name_length as i64
                + file_info_size as i64
                + pointer_size as i64;
            let node_table_entries =
                (storage_size as f64 * 0.9 / block_size as f64).floor() as i64;
            let node_table_size = node_entry_size
                .checked_mul(node_table_entries)
                .ok_or(GeometryError::Overflow)?;
            if node_table_size % node_entry_size != 0 {
                return Err(Error::Geometry(GeometryError::MisalignedNodeTable {
                    node_table_size,
                    node_entry_size,
                }));
            }

            let block_count =
                (storage_size - node_table_size - HEADER_SIZE as i64) / block_size as i64;
            if block_count <= 0 {
                return Err(Error::Geometry(GeometryError::NonPositiveBlockCount(
                    block_count,
                )));
            }

            let satisfied = pointer_size >= 8
                || 255u128.pow(pointer_size as u32) >= block_count as u128;
            if satisfied {
                let block_data_index =
                    1 + file_info_size as i64 + pointer_size as i64;
                let actual_space_per_block = block_size as i64 - pointer_size as i64;
                let max_items_per_directory = actual_space_per_block / 8;
                let total_space = storage_size - HEADER_SIZE as i64 - node_table_size;

                return Ok(Geometry {
                    block_size,
                    file_info_size,
                    storage_size,
                    max_name_length,
                    pointer_size,
                    block_count,
                    node_entry_size,
                    node_table_size,
                    block_data_index,
                    actual_space_per_block,
                    max_items_per_directory,
                    total_space,
                });
            }

            pointer_size *= 2;
        }
    }

    /// Absolute offset of the first byte after the node table — the root
    /// directory's fixed anchor block.
    pub fn storage_start(&self) -> u64 {
        HEADER_SIZE + self.node_table_size as u64
    }

    pub fn node_table_start(&self) -> u64 {
        HEADER_SIZE
    }

    pub fn node_offset(&self, id: u64) -> u64 {
        self.node_table_start() + id * self.node_entry_size as u64
    }

    pub fn block_offset(&self, index: u64) -> u64 {
        self.storage_start() + index * self.block_size as u64
    }

    pub fn node_count(&self) -> u64 {
        self.node_table_size as u64 / self.node_entry_size as u64
    }

    pub fn to_header_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let header = HeaderBytes {
            block_size: self.block_size.into(),
            file_info_size: self.file_info_size,
            storage_size: self.storage_size.into(),
            max_name_length: self.max_name_length,
        };
        let mut out = [0u8; HEADER_SIZE as usize];
        out.copy_from_slice(header.as_bytes());
        out
    }

    /// Parses the 12-byte header from the start of `bytes`, ignoring
    /// whatever follows — `bytes` is ordinarily a whole image, not just the
    /// header.
    pub fn from_header_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, _rest) = HeaderBytes::read_from_prefix(bytes)
            .map_err(|_| vdisk_err::FsError::Corrupt("header".into()))?;
        Geometry::new(
            header.block_size.get(),
            header.file_info_size,
            header.storage_size.get(),
            header.max_name_length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_geometry() {
        let g = Geometry::new(4000, 12, 2_000_000_000, 24).unwrap();
        assert_eq!(g.pointer_size, 4);
        assert_eq!(g.max_items_per_directory, 499);
        assert_eq!(g.node_entry_size, 41);
    }

    #[test]
    fn header_round_trips() {
        let g = Geometry::new(4000, 12, 2_000_000_000, 24).unwrap();
        let bytes = g.to_header_bytes();
        let g2 = Geometry::from_header_bytes(&bytes).unwrap();
        assert_eq!(g, g2);
    }

    #[test]
    fn rejects_tiny_storage() {
        assert!(Geometry::new(4000, 12, 100, 24).is_err());
    }

    #[test]
    fn pointer_size_adapts_to_small_volumes() {
        let g = Geometry::new(64, 4, 20_000, 8).unwrap();
        assert_eq!(g.pointer_size, 1);
    }
}
