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

use crate::format::{BackingStore, Extracted, MAX_HEADER, Result, StorageFormat};
use crate::utils::endian::{Lu32, Lu64};
use crate::utils::{c_str_bytes, find_bytes};

/// Sparse extent header of VMDK version 4 images, "KDMV" on disk.
#[repr(C, packed)]
#[derive(Debug, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
pub struct Vmdk4Hdr {
    pub magic: [u8; 4],
    pub version: Lu32,
    pub flags: Lu32,
    pub capacity: Lu64,
    pub grain_size: Lu64,
    pub desc_offset: Lu64,
    pub desc_size: Lu64,
    pub num_gtes_per_gt: Lu32,
    pub rgd_offset: Lu64,
    pub gd_offset: Lu64,
    pub grain_offset: Lu64,
    pub filler: u8,
    pub check_bytes: [u8; 4],
}

/// The embedded text descriptor starts in the second sector.
pub const VMDK4_DESC_OFFSET: usize = 0x200;

const PARENT_HINT: &[u8] = b"parentFileNameHint=\"";

pub fn backing_store(buf: &[u8]) -> Result<Extracted> {
    if buf.len() <= VMDK4_DESC_OFFSET {
        return Ok(Extracted::Invalid);
    }
    let end = buf.len().min(VMDK4_DESC_OFFSET + MAX_HEADER);
    let desc = c_str_bytes(&buf[VMDK4_DESC_OFFSET..end]);
    let Some(pos) = find_bytes(desc, PARENT_HINT) else {
        return Ok(Extracted::Store(BackingStore::none()));
    };
    let value = &desc[pos + PARENT_HINT.len()..];
    let Some(len) = value.iter().position(|b| *b == b'"') else {
        return Ok(Extracted::Invalid);
    };
    if len == 0 {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    Ok(Extracted::Store(BackingStore::new(
        &value[..len],
        StorageFormat::Auto,
    )))
}

#[cfg(test)]
#[path = "vmdk_test.rs"]
mod tests;
