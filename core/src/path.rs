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

//! Path grammar and tree-walking resolution.
//!
//! Paths use `\` as separator and must begin with the literal segment `V:`.

use crate::dir;
use crate::geometry::Geometry;
use crate::node::{NodeKind, NodeRecord, NodeRef};
use crate::storage::Storage;
use vdisk_err::{Error, FsError, PathError, Result};

pub const ROOT_PATH: &str = "V:\\";

/// Splits `V:\seg1\seg2` into `["seg1", "seg2"]`, rejecting anything that
/// doesn't start with the literal `V:` root, empty interior segments, or
/// names exceeding `max_name_length`.
pub fn split_path(path: &str, geometry: &Geometry) -> Result<Vec<String>> {
    let rest = path
        .strip_prefix("V:")
        .ok_or(Error::Path(PathError::Invalid))?;

    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let rest = rest
        .strip_prefix('\\')
        .ok_or(Error::Path(PathError::Invalid))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for segment in rest.split('\\') {
        if segment.is_empty() || segment.bytes().any(|b| b == 0) {
            return Err(Error::Path(PathError::Invalid));
        }
        if segment.len() > geometry.max_name_length as usize {
            return Err(Error::Path(PathError::NameTooLong));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

/// Walks every segment, requiring each to name an existing directory.
/// Fails on a miss or a file anywhere along the way — this is the strict
/// primitive a path's *parent* chain must satisfy.
fn resolve_strict_directory(
    storage: &impl Storage,
    geometry: &Geometry,
    segments: &[String],
) -> Result<NodeRef> {
    let mut current = NodeRef::Root;
    for segment in segments {
        let anchor = anchor_of(storage, geometry, current)?;
        match dir::find_child(storage, geometry, anchor, segment)? {
            Some((node_ref, record)) if record.kind == NodeKind::Directory => {
                current = node_ref;
            }
            _ => return Err(Error::Path(PathError::Invalid)),
        }
    }
    Ok(current)
}

/// The anchor block offset for `node_ref`'s data (its chain head for a
/// file, its single block for a directory).
pub fn anchor_of(storage: &impl Storage, geometry: &Geometry, node_ref: NodeRef) -> Result<u64> {
    match node_ref {
        NodeRef::Root => Ok(geometry.storage_start()),
        NodeRef::Id(_) => {
            let record = crate::node::read_node(storage, geometry, node_ref)?
                .ok_or(Error::Fs(FsError::Corrupt("dangling node reference".into())))?;
            Ok(record.pointer)
        }
    }
}

/// Resolves the parent directory and leaf name of `path`. The parent chain
/// (every segment but the last) must fully exist as directories; the leaf
/// itself is not required to exist.
pub fn resolve_parent_and_leaf(
    storage: &impl Storage,
    geometry: &Geometry,
    path: &str,
) -> Result<(NodeRef, String)> {
    let segments = split_path(path, geometry)?;
    let (parent_segments, leaf) = segments
        .split_last()
        .map(|(leaf, rest)| (rest, leaf.clone()))
        .ok_or(Error::Path(PathError::Invalid))?;
    let parent = resolve_strict_directory(storage, geometry, parent_segments)?;
    Ok((parent, leaf))
}

/// Resolves `path` to an existing directory node, requiring the exact
/// final segment (if any) to itself name a directory — this is the fix
/// for the source's `DirectoryExists` bug (`spec.md` §9): a final-segment
/// miss is *not* treated as success just because the parent walk succeeded.
pub fn resolve_directory(
    storage: &impl Storage,
    geometry: &Geometry,
    path: &str,
) -> Result<NodeRef> {
    let segments = split_path(path, geometry)?;
    if segments.is_empty() {
        return Ok(NodeRef::Root);
    }
    let (parent, leaf) = resolve_parent_and_leaf(storage, geometry, path)?;
    let anchor = anchor_of(storage, geometry, parent)?;
    match dir::find_child(storage, geometry, anchor, &leaf)? {
        Some((node_ref, record)) if record.kind == NodeKind::Directory => Ok(node_ref),
        Some(_) => Err(Error::Fs(FsError::NotADirectory)),
        None => Err(Error::Fs(FsError::NotFound)),
    }
}

/// Resolves `path` to an existing file node and its record.
pub fn resolve_file(
    storage: &impl Storage,
    geometry: &Geometry,
    path: &str,
) -> Result<(NodeRef, NodeRecord)> {
    let (parent, leaf) = resolve_parent_and_leaf(storage, geometry, path)?;
    let anchor = anchor_of(storage, geometry, parent)?;
    match dir::find_child(storage, geometry, anchor, &leaf)? {
        Some((node_ref, record)) if record.kind == NodeKind::File => Ok((node_ref, record)),
        Some(_) => Err(Error::Fs(FsError::NotAFile)),
        None => Err(Error::Fs(FsError::NotFound)),
    }
}

/// The resolver named directly in `spec.md` §4.5: returns the id of the
/// last directory on `path`. Normally that's the parent of the leaf; if
/// the leaf itself names a directory, resolution descends into it and
/// returns that directory instead. An intermediate segment that's missing
/// or names a file is a hard failure (the historical `-2` sentinel,
/// modeled here as [`PathError::Invalid`] rather than a magic integer).
pub fn go_to_last_directory(
    storage: &impl Storage,
    geometry: &Geometry,
    path: &str,
) -> Result<NodeRef> {
    let segments = split_path(path, geometry)?;
    let mut current = NodeRef::Root;
    for (i, segment) in segments.iter().enumerate() {
        let anchor = anchor_of(storage, geometry, current)?;
        match dir::find_child(storage, geometry, anchor, segment)? {
            Some((node_ref, record)) if record.kind == NodeKind::Directory => {
                current = node_ref;
            }
            Some(_) => {
                // Leaf names a file: the "last directory on the path" is
                // wherever we stand right now. A file in the middle of the
                // path is still fatal.
                if i + 1 == segments.len() {
                    return Ok(current);
                }
                return Err(Error::Path(PathError::Invalid));
            }
            None => {
                if i + 1 == segments.len() {
                    return Ok(current);
                }
                return Err(Error::Path(PathError::Invalid));
            }
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{self, NodeKind};
    use crate::storage::MemoryStorage;

    fn test_geometry() -> Geometry {
        Geometry::new(256, 12, 65536, 16).unwrap()
    }

    #[test]
    fn root_splits_to_empty_segments() {
        let geometry = test_geometry();
        assert_eq!(split_path("V:\\", &geometry).unwrap(), Vec::<String>::new());
        assert_eq!(split_path("V:", &geometry).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn rejects_paths_without_v_prefix() {
        let geometry = test_geometry();
        assert!(split_path("C:\\foo", &geometry).is_err());
    }

    #[test]
    fn go_to_last_directory_on_fresh_volume() {
        let geometry = test_geometry();
        let storage = MemoryStorage::zeroed(65536);
        let result = go_to_last_directory(&storage, &geometry, "V:\\configs").unwrap();
        assert_eq!(result, NodeRef::Root);
    }

    #[test]
    fn go_to_last_directory_descends_into_existing_leaf_directory() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(65536);
        let root_anchor = geometry.storage_start();
        let sub_anchor = geometry.block_offset(1);
        node::write_node(
            &mut storage,
            &geometry,
            1,
            NodeKind::Directory,
            "configs",
            &[],
            sub_anchor,
        )
        .unwrap();
        dir::insert_entry(&mut storage, &geometry, root_anchor, 1).unwrap();

        let result = go_to_last_directory(&storage, &geometry, "V:\\configs").unwrap();
        assert_eq!(result, NodeRef::Id(1));
    }

    #[test]
    fn intermediate_file_segment_is_fatal() {
        let geometry = test_geometry();
        let mut storage = MemoryStorage::zeroed(65536);
        let root_anchor = geometry.storage_start();
        node::write_node(&mut storage, &geometry, 1, NodeKind::File, "a.bin", &[], 4096)
            .unwrap();
        dir::insert_entry(&mut storage, &geometry, root_anchor, 1).unwrap();

        assert!(go_to_last_directory(&storage, &geometry, "V:\\a.bin\\b.bin").is_err());
    }
}
