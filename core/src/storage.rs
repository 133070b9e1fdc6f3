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

//! The image buffer: a bounded, offset-addressed byte store.
//!
//! Grounded in `hyrax_ds::DataStorage` / `hyrax_ds_std::DataStorageServer`:
//! the engine never touches a raw `Vec<u8>` directly, it goes through this
//! trait. Unlike the teacher, there is exactly one production backend
//! (`MemoryStorage`) because the spec mandates a single contiguous in-memory
//! buffer rather than a pluggable block device.

use vdisk_err::{FsError, Result};

pub trait Storage {
    fn len(&self) -> u64;

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `Vec<u8>`-backed image. The entire volume lives here; `save_to_buffer`
/// and `save_to_file` just copy it out.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
}

impl MemoryStorage {
    pub fn zeroed(len: u64) -> Self {
        Self {
            bytes: vec![0u8; len as usize],
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl Storage for MemoryStorage {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| FsError::Corrupt(format!("read out of bounds at {offset}")))?;
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| FsError::Corrupt(format!("write out of bounds at {offset}")))?;
        self.bytes[start..end].copy_from_slice(buf);
        Ok(())
    }
}
