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

use crate::format::{
    BackingStore, Extracted, FileFeatures, Result, StorageFormat, backing_slice, error,
};
use crate::utils::c_str_bytes;
use crate::utils::endian::{Bu32, Bu64, Endian};

/// Magic shared by qcow and qcow2 images, "QFI\xfb"
pub const QCOW_MAGIC: [u8; 4] = *b"QFI\xfb";

#[repr(C)]
#[derive(Debug, Clone, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
/// Qcow (version 1) Header
pub struct Qcow1Hdr {
    pub magic: [u8; 4],
    pub version: Bu32,
    pub backing_file_offset: Bu64,
    pub backing_file_size: Bu32,
    pub mtime: Bu32,
    pub size: Bu64,
    pub cluster_bits: u8,
    pub l2_bits: u8,
    pub padding: [u8; 2],
    pub crypt_method: Bu32,
    pub l1_table_offset: Bu64,
}

#[repr(C)]
#[derive(Debug, Clone, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
/// Qcow2 Header
///
/// [Specification](https://qemu-project.gitlab.io/qemu/interop/qcow2.html#header)
pub struct Qcow2Hdr {
    pub magic: [u8; 4],
    pub version: Bu32,
    pub backing_file_offset: Bu64,
    pub backing_file_size: Bu32,
    pub cluster_bits: Bu32,
    pub size: Bu64,
    pub crypt_method: Bu32,
    pub l1_size: Bu32,
    pub l1_table_offset: Bu64,
    pub refcount_table_offset: Bu64,
    pub refcount_table_clusters: Bu32,
    pub nb_snapshots: Bu32,
    pub snapshots_offset: Bu64,
    pub incompatible_features: Bu64,
    pub compatible_features: Bu64,
    pub autoclear_features: Bu64,
    pub refcount_order: Bu32,
    pub header_length: Bu32,
    pub compression_type: u8,
    pub padding: [u8; 7],
}

/// Size of a version 2 header; version 3 stores its size in `header_length`.
pub const QCOW2_V2_HDR_SIZE: usize = Qcow2Hdr::OFFSET_INCOMPATIBLE_FEATURES;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Qcow2IncompatibleFeatures: u64 {
        const DIRTY = 1 << 0;
        const CORRUPT = 1 << 1;
        const EXTERNAL_DATA = 1 << 2;
        const COMPRESSION = 1 << 3;
        const EXTERNAL_L2 = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Qcow2CompatibleFeatures: u64 {
        const LAZY_REFCOUNTS = 1 << 0;
    }
}

/// Compatible feature bits in on-disk order.
const QCOW2_COMPATIBLE_FEATURES: [(Qcow2CompatibleFeatures, FileFeatures); 1] = [(
    Qcow2CompatibleFeatures::LAZY_REFCOUNTS,
    FileFeatures::LAZY_REFCOUNTS,
)];

#[repr(C)]
#[derive(Debug, Clone, KnownLayout, Immutable, FromBytes, IntoBytes)]
/// Header of a qcow2 header extension, followed by `len` bytes of payload
/// padded to a multiple of 8.
pub struct Qcow2ExtHdr {
    pub magic: Bu32,
    pub len: Bu32,
}

pub const QCOW2_EXT_END: u32 = 0;
pub const QCOW2_EXT_BACKING_FORMAT: u32 = 0xe279_2aca;

const QCOW2_EXT_ALIGN: u64 = 8;

/// Scans the header extensions in `buf[start..end]` for a backing format
/// name.
fn qcow2_backing_format(buf: &[u8], start: u64, end: u64) -> Result<Option<StorageFormat>> {
    let len = buf.len() as u64;
    let mut format = None;
    let mut offset = start;
    while offset.saturating_add(8) < len && offset.saturating_add(8) < end {
        let Ok((ext, _)) = Qcow2ExtHdr::read_from_prefix(&buf[offset as usize..]) else {
            break;
        };
        offset += size_of::<Qcow2ExtHdr>() as u64;
        let Some(payload_end) = offset.checked_add(ext.len.to_ne() as u64) else {
            break;
        };
        if payload_end > len {
            break;
        }
        match ext.magic.to_ne() {
            QCOW2_EXT_END => break,
            QCOW2_EXT_BACKING_FORMAT => {
                // The name must be NUL terminated within the buffer.
                if buf.get(payload_end as usize) == Some(&0) {
                    let name = c_str_bytes(&buf[offset as usize..]);
                    let name = String::from_utf8_lossy(name);
                    match StorageFormat::from_name(&name) {
                        Some(f) if f.is_valid() => format = Some(f),
                        _ => return error::UnknownFormatName { name }.fail(),
                    }
                }
            }
            magic => log::trace!("skipping qcow2 header extension {magic:#x}"),
        }
        // qcow2 pads every extension payload to 8 bytes on disk.
        let Some(next) = payload_end.checked_next_multiple_of(QCOW2_EXT_ALIGN) else {
            break;
        };
        offset = next;
    }
    Ok(format)
}

fn qcowx_backing_store(buf: &[u8], qcow2: bool) -> Result<Extracted> {
    let be = Endian::Big;
    let Some(offset) = be.read_u64(buf, Qcow2Hdr::OFFSET_BACKING_FILE_OFFSET) else {
        return Ok(Extracted::Invalid);
    };
    let Some(size) = be.read_u32(buf, Qcow2Hdr::OFFSET_BACKING_FILE_SIZE) else {
        return Ok(Extracted::Invalid);
    };
    if offset > buf.len() as u64 {
        return Ok(Extracted::Invalid);
    }
    if size == 0 {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    let Some(name) = backing_slice(buf, offset, size as u64) else {
        return Ok(Extracted::Invalid);
    };
    let name = c_str_bytes(name);
    if name.is_empty() {
        return Ok(Extracted::Store(BackingStore::none()));
    }
    let mut format = StorageFormat::Auto;
    // Header extensions live between the end of the header and the
    // backing file name.
    if qcow2 {
        let start = match be.read_u32(buf, Qcow2Hdr::OFFSET_VERSION) {
            Some(2) => Some(QCOW2_V2_HDR_SIZE as u32),
            _ => be.read_u32(buf, Qcow2Hdr::OFFSET_HEADER_LENGTH),
        };
        if let Some(start) = start {
            if let Some(f) = qcow2_backing_format(buf, start as u64, offset)? {
                format = f;
            }
        }
    }
    Ok(Extracted::Store(BackingStore::new(name, format)))
}

pub fn qcow1_backing_store(buf: &[u8]) -> Result<Extracted> {
    qcowx_backing_store(buf, false)
}

pub fn qcow2_backing_store(buf: &[u8]) -> Result<Extracted> {
    qcowx_backing_store(buf, true)
}

/// Reads the compatible feature bits of a version 3 image.
pub fn qcow2_features(buf: &[u8]) -> Option<FileFeatures> {
    let be = Endian::Big;
    if be.read_u32(buf, Qcow2Hdr::OFFSET_VERSION)? == 2 {
        return None;
    }
    let incompatible = be.read_u64(buf, Qcow2Hdr::OFFSET_INCOMPATIBLE_FEATURES)?;
    if incompatible != 0 {
        let incompatible = Qcow2IncompatibleFeatures::from_bits_retain(incompatible);
        log::debug!("qcow2 incompatible features: {incompatible:?}");
    }
    let bits = be.read_u64(buf, Qcow2Hdr::OFFSET_COMPATIBLE_FEATURES)?;
    let compatible = Qcow2CompatibleFeatures::from_bits_retain(bits);
    let mut features = FileFeatures::empty();
    for (bit, feature) in QCOW2_COMPATIBLE_FEATURES {
        if compatible.contains(bit) {
            features |= feature;
        }
    }
    Some(features)
}

#[cfg(test)]
#[path = "qcow_test.rs"]
mod tests;
