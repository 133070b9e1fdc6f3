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

//! Directory engine: a directory's anchor block is a fixed-capacity array
//! of 8-byte little-endian node ids.

use log::error;

use crate::geometry::Geometry;
use crate::node::{self, NodeRef};
use crate::ptr::{read_ptr, write_ptr};
use crate::storage::Storage;
use vdisk_err::{Error, FsError, Result};

pub const SLOT_SIZE: u64 = 8;

/// Every live child node id referenced by the directory at `anchor`, in
/// slot order.
pub fn list_entries(storage: &impl Storage, geometry: &Geometry, anchor: u64) -> Result<Vec<u64>> {
    let mut slot = [0u8; SLOT_SIZE as usize];
    let mut ids = Vec::new();
    for i in 0..geometry.max_items_per_directory as u64 {
        storage.read(anchor + i * SLOT_SIZE, &mut slot)?;
        if slot.iter().any(|&b| b != 0) {
            ids.push(read_ptr(&slot, 8));
        }
    }
    Ok(ids)
}

/// Writes `child_id` into the first free slot of the directory at `anchor`.
pub fn insert_entry(
    storage: &mut impl Storage,
    geometry: &Geometry,
    anchor: u64,
    child_id: u64,
) -> Result<()> {
    let mut slot = [0u8; SLOT_SIZE as usize];
    for i in 0..geometry.max_items_per_directory as u64 {
        let offset = anchor + i * SLOT_SIZE;
        storage.read(offset, &mut slot)?;
        if slot.iter().all(|&b| b == 0) {
            let mut out = [0u8; SLOT_SIZE as usize];
            write_ptr(&mut out, 8, child_id);
            storage.write(offset, &out)?;
            return Ok(());
        }
    }
    error!("directory at {anchor} has no free slot ({} max)", geometry.max_items_per_directory);
    Err(Error::Fs(FsError::DirectoryFull))
}

/// Finds a child named `name` directly inside the directory at `anchor`.
pub fn find_child(
    storage: &impl Storage,
    geometry: &Geometry,
    anchor: u64,
    name: &str,
) -> Result<Option<(NodeRef, node::NodeRecord)>> {
    for id in list_entries(storage, geometry, anchor)? {
        let node_ref = NodeRef::Id(id);
        if let Some(record) = node::read_node(storage, geometry, node_ref)? {
            if record.name == name {
                return Ok(Some((node_ref, record)));
            }
        }
    }
    Ok(None)
}
