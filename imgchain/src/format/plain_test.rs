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

use std::mem::size_of;

use crate::format::plain::{BochsHdr, VdiHdr, VpcFooter};

#[test]
fn test_vpc_layout() {
    assert_eq!(VpcFooter::OFFSET_VERSION, 12);
    assert_eq!(VpcFooter::OFFSET_ORIGINAL_SIZE, 40);
    assert_eq!(size_of::<VpcFooter>(), 56);
}

#[test]
fn test_vdi_layout() {
    assert_eq!(VdiHdr::OFFSET_SIGNATURE, 64);
    assert_eq!(VdiHdr::OFFSET_VERSION, 68);
    assert_eq!(VdiHdr::OFFSET_DISK_SIZE, 368);
}

#[test]
fn test_bochs_layout() {
    assert_eq!(BochsHdr::OFFSET_VERSION, 64);
    assert_eq!(BochsHdr::OFFSET_SIZE, 84);
}
