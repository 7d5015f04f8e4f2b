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

use rstest::rstest;
use zerocopy::IntoBytes;

use crate::utils::endian::{Bu32, Bu64, Endian, Lu32, Lu64};

#[test]
fn test_wrappers_store_declared_order() {
    let be = Bu32::from(0x0001_0001u32 << 4);
    assert_eq!(be.as_bytes(), [0x00, 0x10, 0x00, 0x10]);
    let le = Lu64::from(0x1122u64);
    assert_eq!(le.as_bytes(), [0x22, 0x11, 0, 0, 0, 0, 0, 0]);
    assert_eq!(format!("{:?}", Bu64::from(7u64)), "Bu64(7)");
    assert_eq!(format!("{}", Lu32::from(42u32)), "42");
}

#[rstest]
#[case(Endian::Big, 0, Some(0x51464902))]
#[case(Endian::Little, 0, Some(0x02494651))]
#[case(Endian::Big, 4, Some(0x0000_0003))]
#[case(Endian::Big, 5, None)]
#[case(Endian::Little, usize::MAX, None)]
fn test_read_u32(#[case] endian: Endian, #[case] offset: usize, #[case] val: Option<u32>) {
    let buf = [b'Q', b'F', b'I', 0x02, 0, 0, 0, 3];
    assert_eq!(endian.read_u32(&buf, offset), val)
}

#[rstest]
#[case(Endian::Big, 0, Some(0x0102_0304_0506_0708))]
#[case(Endian::Little, 0, Some(0x0807_0605_0403_0201))]
#[case(Endian::Big, 1, None)]
fn test_read_u64(#[case] endian: Endian, #[case] offset: usize, #[case] val: Option<u64>) {
    let buf = [1, 2, 3, 4, 5, 6, 7, 8];
    assert_eq!(endian.read_u64(&buf, offset), val)
}
