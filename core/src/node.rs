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

//! The node table: a fixed array of equal-sized file/directory entries.

use log::{debug, error};

use crate::geometry::Geometry;
use crate::ptr::{is_zero_slot, read_ptr, write_ptr};
use crate::storage::Storage;
use vdisk_err::{Error, FsError, Result};

/// Node index 0 is the root's implicit data block anchor; the root itself
/// never consumes a node-table slot and is addressed by this sentinel
/// instead of a raw `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Root,
    Id(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

const TYPE_FILE: u8 = 0;
const TYPE_DIRECTORY: u8 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub name: String,
    pub file_info: Vec<u8>,
    pub pointer: u64,
}

pub const ROOT_NAME: &str = "V:";

/// Looks up node `node_ref`. Returns `Ok(None)` for a zeroed (free) node
/// entry — the idiomatic replacement for the source's `pointer = -1`
/// empty marker.
pub fn read_node(
    storage: &impl Storage,
    geometry: &Geometry,
    node_ref: NodeRef,
) -> Result<Option<NodeRecord>> {
    match node_ref {
        NodeRef::Root => Ok(Some(NodeRecord {
            kind: NodeKind::Directory,
            name: ROOT_NAME.to_string(),
            file_info: Vec::new(),
            pointer: geometry.storage_start(),
        })),
        NodeRef::Id(id) => {
            let mut raw = vec![0u8; geometry.node_entry_size as usize];
            storage.read(geometry.node_offset(id), &mut raw)?;
            if is_zero_slot(&raw) {
                return Ok(None);
            }
            Ok(Some(decode_entry(geometry, &raw)))
        }
    }
}

pub fn write_node(
    storage: &mut impl Storage,
    geometry: &Geometry,
    id: u64,
    kind: NodeKind,
    name: &str,
    file_info: &[u8],
    pointer: u64,
) -> Result<()> {
    let raw = encode_entry(geometry, kind, name, file_info, pointer)?;
    storage.write(geometry.node_offset(id), &raw)?;
    Ok(())
}

pub fn free_node(storage: &mut impl Storage, geometry: &Geometry, id: u64) -> Result<()> {
    let zeros = vec![0u8; geometry.node_entry_size as usize];
    storage.write(geometry.node_offset(id), &zeros)?;
    Ok(())
}

/// Scans from index 1 for the first zeroed entry. Freeness is tested
/// directly on the raw bytes, not by routing through [`read_node`] — the
/// allocator doesn't need the root's synthetic record or a decoded name.
pub fn find_free_node_id(storage: &impl Storage, geometry: &Geometry) -> Result<u64> {
    let mut raw = vec![0u8; geometry.node_entry_size as usize];
    let count = geometry.node_count();
    for id in 1..count {
        storage.read(geometry.node_offset(id), &mut raw)?;
        if is_zero_slot(&raw) {
            if id + 1 == count {
                debug!("node table down to its last free entry");
            }
            return Ok(id);
        }
    }
    error!("node table exhausted ({count} entries)");
    Err(Error::Fs(FsError::OutOfNodes))
}

fn decode_entry(geometry: &Geometry, raw: &[u8]) -> NodeRecord {
    let kind = if raw[0] == TYPE_DIRECTORY {
        NodeKind::Directory
    } else {
        NodeKind::File
    };

    let name_start = 1usize;
    let name_end = name_start + geometry.max_name_length as usize;
    let name_bytes = &raw[name_start..name_end];
    let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name: String = name_bytes[..name_len].iter().map(|&b| b as char).collect();

    let info_start = name_end;
    let info_end = info_start + geometry.file_info_size as usize;
    let file_info = raw[info_start..info_end].to_vec();

    let ptr_start = info_end;
    let ptr_end = ptr_start + geometry.pointer_size as usize;
    let pointer = read_ptr(&raw[ptr_start..ptr_end], geometry.pointer_size);

    NodeRecord {
        kind,
        name,
        file_info,
        pointer,
    }
}

fn encode_entry(
    geometry: &Geometry,
    kind: NodeKind,
    name: &str,
    file_info: &[u8],
    pointer: u64,
) -> Result<Vec<u8>> {
    if name.len() > geometry.max_name_length as usize {
        return Err(Error::Path(vdisk_err::PathError::NameTooLong));
    }
    if name.bytes().any(|b| b == 0) {
        return Err(Error::Path(vdisk_err::PathError::Invalid));
    }

    let mut raw = vec![0u8; geometry.node_entry_size as usize];
    raw[0] = match kind {
        NodeKind::File => TYPE_FILE,
        NodeKind::Directory => TYPE_DIRECTORY,
    };

    let name_start = 1usize;
    for (i, b) in name.bytes().enumerate() {
        raw[name_start + i] = b;
    }

    let info_start = name_start + geometry.max_name_length as usize;
    let info_len = file_info.len().min(geometry.file_info_size as usize);
    raw[info_start..info_start + info_len].copy_from_slice(&file_info[..info_len]);

    let ptr_start = info_start + geometry.file_info_size as usize;
    write_ptr(
        &mut raw[ptr_start..ptr_start + geometry.pointer_size as usize],
        geometry.pointer_size,
        pointer,
    );

    // A directory's type tag (0xFF) or a file's nonzero pointer guarantees
    // a live entry never checksums to zero; guard it explicitly so a
    // degenerate geometry can never produce an entry indistinguishable
    // from a free slot.
    debug_assert!(!is_zero_slot(&raw));

    Ok(raw)
}
