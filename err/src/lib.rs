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

//! Error types for the `vdisk` virtual disk engine.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("path: {0}")]
    Path(#[from] PathError),
    #[error("fs: {0}")]
    Fs(#[from] FsError),
    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PathError {
    #[error("path does not start with V:\\, or traverses through a file")]
    Invalid,
    #[error("name exceeds the volume's max_name_length")]
    NameTooLong,
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("no file or directory at this path")]
    NotFound,
    #[error("path resolves to a directory, not a file")]
    NotAFile,
    #[error("path resolves to a file, not a directory")]
    NotADirectory,
    #[error("node table has no free entry")]
    OutOfNodes,
    #[error("block region has no free block")]
    OutOfSpace,
    #[error("directory has no free slot")]
    DirectoryFull,
    #[error("image is corrupt: {0}")]
    Corrupt(String),
}

#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("block_count must be positive (got {0})")]
    NonPositiveBlockCount(i64),
    #[error("node_table_size ({node_table_size}) is not a multiple of node_entry_size ({node_entry_size})")]
    MisalignedNodeTable {
        node_table_size: i64,
        node_entry_size: i64,
    },
    #[error("geometry arithmetic overflowed")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, Error>;
