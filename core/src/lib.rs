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

//! `vdisk`: a self-contained, byte-array-backed virtual disk rooted at
//! `V:\`. A [`Volume`] owns the whole image — header, node table, and block
//! region — behind a single [`Storage`] backend, with no host filesystem
//! calls in the hot path.

mod block;
mod dir;
mod file;
mod geometry;
mod node;
mod path;
mod ptr;
mod storage;
mod volume;

pub use geometry::Geometry;
pub use node::{NodeKind, NodeRef};
pub use storage::{MemoryStorage, Storage};
pub use volume::{DirectoryHandle, FileHandle, Volume};

pub use vdisk_err::{Error, FsError, GeometryError, PathError, Result};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Renders a byte count using the binary (1024-based) ladder, e.g.
/// `display_size(1536)` is `"1.50 KB"`.
pub fn display_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < SIZE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", SIZE_UNITS[0])
    } else {
        format!("{value:.2} {}", SIZE_UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_size_ladder() {
        assert_eq!(display_size(0), "0 B");
        assert_eq!(display_size(512), "512 B");
        assert_eq!(display_size(1536), "1.50 KB");
        assert_eq!(display_size(2 * 1024 * 1024), "2.00 MB");
    }
}
