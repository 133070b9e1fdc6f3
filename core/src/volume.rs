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

//! The public façade: a `V:\`-rooted virtual volume over a [`Storage`]
//! backend.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::block;
use crate::dir;
use crate::file;
use crate::geometry::Geometry;
use crate::node::{self, NodeKind, NodeRef};
use crate::path;
use crate::storage::{MemoryStorage, Storage};
use vdisk_err::{Error, FsError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHandle {
    pub name: String,
    pub path: String,
    pub last_modified: DateTime<Utc>,
}

/// A self-contained virtual disk rooted at `V:\`.
pub struct Volume<S: Storage> {
    storage: S,
    geometry: Geometry,
    host_path: Option<PathBuf>,
}

impl Volume<MemoryStorage> {
    /// Allocates a fresh, zeroed image of the given geometry, wholly
    /// in memory.
    pub fn create_in_memory(geometry: Geometry) -> Result<Self> {
        let mut storage = MemoryStorage::zeroed(geometry.storage_size as u64);
        storage.write(0, &geometry.to_header_bytes())?;
        Ok(Volume {
            storage,
            geometry,
            host_path: None,
        })
    }

    /// Adopts an existing image (e.g. the result of [`Volume::save_to_buffer`])
    /// and re-parses its header.
    pub fn load(bytes: Vec<u8>) -> Result<Self> {
        let geometry = Geometry::from_header_bytes(&bytes)?;
        if bytes.len() as i64 != geometry.storage_size {
            return Err(Error::Fs(FsError::Corrupt(format!(
                "image length {} does not match header storage_size {}",
                bytes.len(),
                geometry.storage_size
            ))));
        }
        Ok(Volume {
            storage: MemoryStorage::from_vec(bytes),
            geometry,
            host_path: None,
        })
    }

    /// Creates a fresh volume and remembers `path` so it is flushed back on
    /// [`Drop`] — the "scoped release" host bridge from `spec.md` §4.2/§5.
    pub fn open(path: impl AsRef<Path>, geometry: Geometry) -> Result<Self> {
        let mut volume = Self::create_in_memory(geometry)?;
        volume.host_path = Some(path.as_ref().to_path_buf());
        Ok(volume)
    }

    /// Loads an existing host file and remembers its path for the same
    /// scoped-release behavior as [`Volume::open`].
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let mut volume = Self::load(bytes)?;
        volume.host_path = Some(path.as_ref().to_path_buf());
        Ok(volume)
    }
}

impl<S: Storage> Volume<S> {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn save_to_buffer(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.storage.len() as usize];
        self.storage.read(0, &mut buf)?;
        Ok(buf)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.save_to_buffer()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn free_space(&self) -> Result<u64> {
        block::free_space(&self.storage, &self.geometry)
    }

    pub fn exists_directory(&self, path: &str) -> bool {
        path::resolve_directory(&self.storage, &self.geometry, path).is_ok()
    }

    pub fn exists_file(&self, path: &str) -> bool {
        path::resolve_file(&self.storage, &self.geometry, path).is_ok()
    }

    pub fn create_directory(&mut self, path: &str) -> Result<bool> {
        let (parent, leaf) = path::resolve_parent_and_leaf(&self.storage, &self.geometry, path)?;
        let parent_anchor = path::anchor_of(&self.storage, &self.geometry, parent)?;

        if dir::find_child(&self.storage, &self.geometry, parent_anchor, &leaf)?.is_some() {
            return Ok(false);
        }

        let anchor = block::find_free_block(&self.storage, &self.geometry, &Default::default())?;
        // An empty directory's anchor starts out all zero, same as a free
        // block; mark it occupied so it isn't handed straight back out to
        // the very next allocation.
        block::mark_block_occupied(&mut self.storage, &self.geometry, anchor)?;
        let id = node::find_free_node_id(&self.storage, &self.geometry)?;
        let file_info = pack_directory_info(now_ticks(), self.geometry.file_info_size);

        node::write_node(
            &mut self.storage,
            &self.geometry,
            id,
            NodeKind::Directory,
            &leaf,
            &file_info,
            anchor,
        )?;
        dir::insert_entry(&mut self.storage, &self.geometry, parent_anchor, id)?;
        debug!("created directory {path} as node {id}");
        Ok(true)
    }

    pub fn list_subdirectories(&self, path: &str) -> Result<Vec<String>> {
        self.list_children(path, NodeKind::Directory)
    }

    pub fn list_files(&self, path: &str) -> Result<Vec<String>> {
        self.list_children(path, NodeKind::File)
    }

    fn list_children(&self, path: &str, kind: NodeKind) -> Result<Vec<String>> {
        let dir_ref = path::resolve_directory(&self.storage, &self.geometry, path)?;
        let anchor = path::anchor_of(&self.storage, &self.geometry, dir_ref)?;
        let base = normalize_dir_path(path);

        let mut names = Vec::new();
        for id in dir::list_entries(&self.storage, &self.geometry, anchor)? {
            if let Some(record) = node::read_node(&self.storage, &self.geometry, NodeRef::Id(id))? {
                if record.kind == kind {
                    names.push(format!("{base}{}", record.name));
                }
            }
        }
        Ok(names)
    }

    pub fn get_file(&self, path: &str) -> Result<FileHandle> {
        let (_, record) = path::resolve_file(&self.storage, &self.geometry, path)?;
        Ok(FileHandle {
            name: record.name.clone(),
            size: unpack_file_size(&record.file_info) as u64,
            last_modified: ticks_to_datetime(unpack_file_ticks(&record.file_info)),
            path: path.to_string(),
        })
    }

    pub fn get_directory(&self, path: &str) -> Result<DirectoryHandle> {
        let dir_ref = path::resolve_directory(&self.storage, &self.geometry, path)?;
        let record = node::read_node(&self.storage, &self.geometry, dir_ref)?
            .ok_or(Error::Fs(FsError::NotFound))?;
        Ok(DirectoryHandle {
            name: record.name.clone(),
            path: path.to_string(),
            last_modified: ticks_to_datetime(unpack_dir_ticks(&record.file_info)),
        })
    }

    pub fn read_file_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let (_, record) = path::resolve_file(&self.storage, &self.geometry, path)?;
        let size = unpack_file_size(&record.file_info) as u64;
        file::read_chain(&self.storage, &self.geometry, record.pointer, size)
    }

    pub fn write_file_bytes(&mut self, path: &str, data: &[u8]) -> Result<()> {
        if self.exists_file(path) {
            self.delete_file(path)?;
        }

        let (parent, leaf) = path::resolve_parent_and_leaf(&self.storage, &self.geometry, path)?;
        let parent_anchor = path::anchor_of(&self.storage, &self.geometry, parent)?;
        if dir::find_child(&self.storage, &self.geometry, parent_anchor, &leaf)?.is_some() {
            // The leaf names an existing directory: files and directories
            // share one namespace per directory (spec.md §3 invariant 6).
            return Err(Error::Fs(FsError::NotAFile));
        }

        let anchor = block::find_free_block(&self.storage, &self.geometry, &Default::default())?;
        let id = node::find_free_node_id(&self.storage, &self.geometry)?;
        let file_info = pack_file_info(data.len() as u32, now_ticks(), self.geometry.file_info_size);

        node::write_node(
            &mut self.storage,
            &self.geometry,
            id,
            NodeKind::File,
            &leaf,
            &file_info,
            anchor,
        )?;
        dir::insert_entry(&mut self.storage, &self.geometry, parent_anchor, id)?;
        file::write_chain(&mut self.storage, &self.geometry, anchor, data)?;
        debug!("wrote {} bytes to {path} as node {id}", data.len());
        Ok(())
    }

    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let (node_ref, record) = path::resolve_file(&self.storage, &self.geometry, path)?;
        block::free_chain(&mut self.storage, &self.geometry, record.pointer)?;
        let NodeRef::Id(id) = node_ref else {
            unreachable!("resolve_file never returns the root")
        };
        node::free_node(&mut self.storage, &self.geometry, id)?;
        debug!("deleted {path} (node {id})");
        Ok(())
    }
}

impl<S: Storage> Drop for Volume<S> {
    fn drop(&mut self) {
        if let Some(path) = self.host_path.take() {
            if let Err(error) = self.save_to_file(&path) {
                warn!("failed to flush volume back to {path:?}: {error}");
            }
        }
    }
}

fn normalize_dir_path(path: &str) -> String {
    let owned;
    let base: &str = if path == "V:" {
        "V:\\"
    } else {
        owned = path.to_string();
        &owned
    };
    if base.ends_with('\\') {
        base.to_string()
    } else {
        format!("{base}\\")
    }
}

fn pack_file_info(size: u32, ticks: i64, file_info_size: u8) -> Vec<u8> {
    let mut info = vec![0u8; file_info_size as usize];
    let size_bytes = size.to_le_bytes();
    let n = size_bytes.len().min(info.len());
    info[..n].copy_from_slice(&size_bytes[..n]);
    if info.len() > 4 {
        let ticks_bytes = ticks.to_le_bytes();
        let n = ticks_bytes.len().min(info.len() - 4);
        info[4..4 + n].copy_from_slice(&ticks_bytes[..n]);
    }
    info
}

fn pack_directory_info(ticks: i64, file_info_size: u8) -> Vec<u8> {
    let mut info = vec![0u8; file_info_size as usize];
    let ticks_bytes = ticks.to_le_bytes();
    let n = ticks_bytes.len().min(info.len());
    info[..n].copy_from_slice(&ticks_bytes[..n]);
    info
}

fn unpack_file_size(file_info: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let n = file_info.len().min(4);
    buf[..n].copy_from_slice(&file_info[..n]);
    u32::from_le_bytes(buf)
}

fn unpack_file_ticks(file_info: &[u8]) -> i64 {
    if file_info.len() < 12 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&file_info[4..12]);
    i64::from_le_bytes(buf)
}

fn unpack_dir_ticks(file_info: &[u8]) -> i64 {
    if file_info.len() < 8 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&file_info[..8]);
    i64::from_le_bytes(buf)
}

/// `ticks` are 100-nanosecond intervals since the Unix epoch.
fn ticks_to_datetime(ticks: i64) -> DateTime<Utc> {
    let nanos_total = ticks.saturating_mul(100);
    let secs = nanos_total.div_euclid(1_000_000_000);
    let nanos = nanos_total.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn now_ticks() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) / 100
}
