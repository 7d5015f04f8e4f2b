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

use bitflags::bitflags;
use macros::Layout;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::format::{BackingStore, Extracted, Result, StorageFormat, backing_slice};
use crate::utils::c_str_bytes;
use crate::utils::endian::{Endian, Lu32, Lu64};

pub const QED_MAGIC: [u8; 4] = *b"QED\0";

#[repr(C)]
#[derive(Debug, Clone, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
/// QEMU enhanced disk header
pub struct QedHdr {
    pub magic: [u8; 4],
    pub cluster_size: Lu32,
    pub table_size: Lu32,
    pub header_size: Lu32,
    pub features: Lu64,
    pub compat_features: Lu64,
    pub autoclear_features: Lu64,
    pub l1_table_offset: Lu64,
    pub image_size: Lu64,
    pub backing_filename_offset: Lu32,
    pub backing_filename_size: Lu32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct QedFeatures: u64 {
        const BACKING_FILE = 1 << 0;
        const NEED_CHECK = 1 << 1;
        const BACKING_FORMAT_NO_PROBE = 1 << 2;
    }
}

pub fn backing_store(buf: &[u8]) -> Result<Extracted> {
    let le = Endian::Little;
    let Some(features) = le.read_u64(buf, QedHdr::OFFSET_FEATURES) else {
        return Ok(Extracted::Invalid);
    };
    let features = QedFeatures::from_bits_retain(features);
    if !features.contains(QedFeatures::BACKING_FILE) {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    let Some(offset) = le.read_u32(buf, QedHdr::OFFSET_BACKING_FILENAME_OFFSET) else {
        return Ok(Extracted::Invalid);
    };
    let Some(size) = le.read_u32(buf, QedHdr::OFFSET_BACKING_FILENAME_SIZE) else {
        return Ok(Extracted::Invalid);
    };
    if offset as usize > buf.len() {
        return Ok(Extracted::Invalid);
    }
    if size == 0 {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    let Some(name) = backing_slice(buf, offset as u64, size as u64) else {
        return Ok(Extracted::Invalid);
    };
    let name = c_str_bytes(name);
    if name.is_empty() {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    let format = if features.contains(QedFeatures::BACKING_FORMAT_NO_PROBE) {
        StorageFormat::Raw
    } else {
        StorageFormat::AutoSafe
    };
    Ok(Extracted::Store(BackingStore::new(name, format)))
}

#[cfg(test)]
#[path = "qed_test.rs"]
mod tests;
