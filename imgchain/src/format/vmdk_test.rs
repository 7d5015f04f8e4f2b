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

use std::path::Path;

use assert_matches::assert_matches;
use rstest::rstest;
use zerocopy::{FromZeros, IntoBytes};

use crate::format::vmdk::{VMDK4_DESC_OFFSET, Vmdk4Hdr, backing_store};
use crate::format::{BackingStore, Extracted, StorageFormat};
use crate::utils::endian::{Lu32, Lu64};

pub fn vmdk_image(desc: &str) -> Vec<u8> {
    let mut hdr = Vmdk4Hdr::new_zeroed();
    hdr.magic = *b"KDMV";
    hdr.version = Lu32::from(1u32);
    hdr.capacity = Lu64::from(2048u64);
    hdr.desc_offset = Lu64::from(1u64);
    hdr.desc_size = Lu64::from(20u64);
    let mut buf = hdr.as_bytes().to_vec();
    buf.resize(VMDK4_DESC_OFFSET, 0);
    buf.extend_from_slice(desc.as_bytes());
    buf.resize(VMDK4_DESC_OFFSET + 20 * 512, 0);
    buf
}

const DESC_HEAD: &str = "# Disk DescriptorFile\nversion=1\nCID=fffffffe\n";

#[test]
fn test_layout() {
    assert_eq!(Vmdk4Hdr::OFFSET_VERSION, 4);
    assert_eq!(Vmdk4Hdr::OFFSET_CAPACITY, 12);
    assert_eq!(Vmdk4Hdr::OFFSET_DESC_OFFSET, 28);
    assert_eq!(Vmdk4Hdr::OFFSET_CHECK_BYTES, 73);
}

#[test]
fn test_vmdk_backing_store() {
    let desc = format!("{DESC_HEAD}parentCID=12345678\nparentFileNameHint=\"base.vmdk\"\n");
    let buf = vmdk_image(&desc);
    let store = assert_matches!(backing_store(&buf), Ok(Extracted::Store(s)) => s);
    assert_eq!(store.path.as_deref(), Some(Path::new("base.vmdk")));
    assert_eq!(store.format, StorageFormat::Auto);
}

#[rstest]
#[case("parentCID=ffffffff\n")]
#[case("parentFileNameHint=\"\"\n")]
#[case("\0parentFileNameHint=\"base.vmdk\"\n")]
fn test_vmdk_no_backing_store(#[case] tail: &str) {
    let buf = vmdk_image(&format!("{DESC_HEAD}{tail}"));
    assert_matches!(backing_store(&buf), Ok(Extracted::Store(s)) if s == BackingStore::none());
}

#[test]
fn test_vmdk_unterminated_hint() {
    let buf = vmdk_image(&format!("{DESC_HEAD}parentFileNameHint=\"base.vmdk\n"));
    assert_matches!(backing_store(&buf), Ok(Extracted::Invalid));
}

#[test]
fn test_vmdk_hint_cut_by_buffer_end() {
    let desc = format!("{DESC_HEAD}parentFileNameHint=\"base.vmdk\"\n");
    let buf = vmdk_image(&desc);
    let cut = VMDK4_DESC_OFFSET + desc.len() - 3;
    assert_matches!(backing_store(&buf[..cut]), Ok(Extracted::Invalid));
}

#[rstest]
#[case(0)]
#[case(VMDK4_DESC_OFFSET)]
fn test_vmdk_truncated(#[case] len: usize) {
    let buf = vmdk_image("parentFileNameHint=\"base.vmdk\"\n");
    assert_matches!(backing_store(&buf[..len]), Ok(Extracted::Invalid));
}
