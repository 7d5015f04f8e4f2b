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

//! Headers of formats that are recognized but never carry a backing store.

use macros::Layout;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::utils::endian::{Bu32, Bu64, Lu32, Lu64};

/// Offset of the "CD001" identifier of the first ISO 9660 volume descriptor.
pub const ISO_MAGIC_OFFSET: usize = 0x8001;

/// Virtual PC hard disk footer, also stored as a copy at offset 0 of
/// dynamic disks.
#[repr(C)]
#[derive(Debug, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
pub struct VpcFooter {
    pub cookie: [u8; 8],
    pub features: Bu32,
    pub version: Bu32,
    pub data_offset: Bu64,
    pub timestamp: Bu32,
    pub creator_app: [u8; 4],
    pub creator_version: Bu32,
    pub creator_os: Bu32,
    pub original_size: Bu64,
    pub current_size: Bu64,
}

/// VirtualBox disk image header, pre-header included.
#[repr(C)]
#[derive(Debug, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
pub struct VdiHdr {
    pub text: [u8; 64],
    pub signature: Lu32,
    pub version: Lu32,
    pub header_size: Lu32,
    pub image_type: Lu32,
    pub image_flags: Lu32,
    pub description: [u8; 256],
    pub block_offsets_offset: Lu32,
    pub data_offset: Lu32,
    pub cylinders: Lu32,
    pub heads: Lu32,
    pub sectors: Lu32,
    pub sector_size: Lu32,
    pub unused: Lu32,
    pub disk_size: Lu64,
}

/// Bochs growing image header
#[repr(C, packed)]
#[derive(Debug, Layout, KnownLayout, Immutable, FromBytes, IntoBytes)]
pub struct BochsHdr {
    pub magic: [u8; 32],
    pub type_: [u8; 16],
    pub subtype: [u8; 16],
    pub version: Lu32,
    pub header: Lu32,
    pub catalog: Lu32,
    pub bitmap: Lu32,
    pub extent: Lu32,
    pub size: Lu64,
}

#[cfg(test)]
#[path = "plain_test.rs"]
mod tests;
