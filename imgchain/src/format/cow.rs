// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use macros::Layout;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::format::{BackingStore, Extracted, Result, StorageFormat};
use crate::utils::c_str_bytes;
use crate::utils::endian::{Bu32, Bu64};

pub const COW_FILENAME_MAXLEN: usize = 1024;

/// User-mode Linux COW v2 header
#[repr(C, packed)]
#[derive(Debug, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
pub struct CowHdr {
    pub magic: [u8; 4],
    pub version: Bu32,
    pub backing_file: [u8; COW_FILENAME_MAXLEN],
    pub mtime: Bu32,
    pub size: Bu64,
    pub sectorsize: Bu32,
}

pub fn backing_store(buf: &[u8]) -> Result<Extracted> {
    let Some(name) = buf.get(CowHdr::OFFSET_BACKING_FILE..CowHdr::END_BACKING_FILE) else {
        return Ok(Extracted::Invalid);
    };
    let name = c_str_bytes(name);
    if name.is_empty() {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    Ok(Extracted::Store(BackingStore::new(name, StorageFormat::Auto)))
}

#[cfg(test)]
#[path = "cow_test.rs"]
mod tests;
