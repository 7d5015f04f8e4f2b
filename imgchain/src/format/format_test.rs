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

use assert_matches::assert_matches;
use proptest::prelude::*;
use rstest::rstest;

use crate::format::{
    Capacity, Error, Extracted, FORMATS, FileFeatures, StorageFormat, Version, backing_slice,
};

#[test]
fn test_descriptor_table_is_dense() {
    for (index, (desc, format)) in FORMATS.iter().zip(StorageFormat::ALL).enumerate() {
        assert_eq!(desc.format, format);
        assert_eq!(format as usize, index);
        assert_eq!(format.desc(), Some(desc));
    }
    assert_eq!(StorageFormat::Auto.desc(), None);
    assert_eq!(StorageFormat::AutoSafe.desc(), None);
}

#[rstest]
#[case(StorageFormat::None, false)]
#[case(StorageFormat::Raw, true)]
#[case(StorageFormat::Iso, true)]
#[case(StorageFormat::Vmdk, true)]
#[case(StorageFormat::Auto, false)]
#[case(StorageFormat::AutoSafe, false)]
fn test_is_valid(#[case] format: StorageFormat, #[case] valid: bool) {
    assert_eq!(format.is_valid(), valid);
}

#[test]
fn test_name_round_trip() {
    for format in StorageFormat::ALL {
        assert_eq!(StorageFormat::from_name(format.name()), Some(format));
        assert_eq!(format.to_string().parse::<StorageFormat>().ok(), Some(format));
    }
}

#[rstest]
#[case("auto", StorageFormat::Auto)]
#[case("auto_safe", StorageFormat::AutoSafe)]
#[case("qcow2", StorageFormat::Qcow2)]
fn test_from_str(#[case] s: &str, #[case] format: StorageFormat) {
    assert_matches!(s.parse::<StorageFormat>(), Ok(f) if f == format);
}

#[rstest]
#[case("QCOW2")]
#[case("qcow3")]
#[case("")]
fn test_from_str_unknown(#[case] s: &str) {
    assert_matches!(s.parse::<StorageFormat>(), Err(Error::UnknownFormatName { name, .. }) if name == s);
    assert_eq!(StorageFormat::from_name(s), None);
}

#[test]
fn test_probe_requests_have_no_name_lookup() {
    assert_eq!(StorageFormat::from_name("auto"), None);
    assert_eq!(StorageFormat::from_name("auto_safe"), None);
}

#[rstest]
#[case(StorageFormat::Cow, 1036, 8)]
#[case(StorageFormat::Qcow, 24, 8)]
#[case(StorageFormat::Qcow2, 24, 8)]
#[case(StorageFormat::Qed, 48, 8)]
#[case(StorageFormat::Vmdk, 12, 8)]
#[case(StorageFormat::Vpc, 40, 8)]
#[case(StorageFormat::Vdi, 368, 8)]
#[case(StorageFormat::Bochs, 84, 8)]
fn test_capacity_fields(#[case] format: StorageFormat, #[case] offset: usize, #[case] width: usize) {
    let desc = format.desc().unwrap();
    assert_matches!(desc.capacity, Capacity::Field { offset: o, width: w, .. } if o == offset && w == width);
}

#[rstest]
#[case(StorageFormat::Raw)]
#[case(StorageFormat::Iso)]
#[case(StorageFormat::Dmg)]
fn test_capacity_file_size(#[case] format: StorageFormat) {
    assert_eq!(format.desc().unwrap().capacity, Capacity::FileSize);
}

#[test]
fn test_version_fields() {
    assert_eq!(StorageFormat::Raw.desc().unwrap().version, Version::Never);
    assert_eq!(StorageFormat::Qed.desc().unwrap().version, Version::Any);
    assert_matches!(
        StorageFormat::Qcow2.desc().unwrap().version,
        Version::OneOf { offset: 4, values: &[2, 3] }
    );
    assert_eq!(StorageFormat::Bochs.desc().unwrap().magic, None);
}

#[rstest]
#[case(StorageFormat::Qcow, Some(36))]
#[case(StorageFormat::Qcow2, Some(32))]
#[case(StorageFormat::Qed, None)]
#[case(StorageFormat::Raw, None)]
fn test_crypt_offset(#[case] format: StorageFormat, #[case] offset: Option<usize>) {
    assert_eq!(format.desc().unwrap().crypt_offset, offset);
}

#[test]
fn test_capabilities() {
    let with_backing: Vec<_> = StorageFormat::ALL
        .into_iter()
        .filter(|f| f.backing_store(&[]).is_some())
        .collect();
    assert_eq!(
        with_backing,
        [
            StorageFormat::Cow,
            StorageFormat::Qcow,
            StorageFormat::Qcow2,
            StorageFormat::Qed,
            StorageFormat::Vmdk,
        ]
    );
    assert_eq!(StorageFormat::Qcow.features(&[0; 512]), None);
    assert_eq!(StorageFormat::Raw.features(&[0; 512]), None);
}

#[rstest]
#[case(StorageFormat::Cow)]
#[case(StorageFormat::Qcow)]
#[case(StorageFormat::Qcow2)]
#[case(StorageFormat::Qed)]
#[case(StorageFormat::Vmdk)]
fn test_backing_store_empty_buffer(#[case] format: StorageFormat) {
    assert_matches!(format.backing_store(&[]), Some(Ok(Extracted::Invalid)));
}

#[test]
fn test_feature_names() {
    assert_eq!(
        FileFeatures::LAZY_REFCOUNTS.names().collect::<Vec<_>>(),
        ["lazy_refcounts"]
    );
    assert_eq!(FileFeatures::empty().names().count(), 0);
}

#[rstest]
#[case(0, 4, Some(&b"abcd"[..]))]
#[case(2, 2, Some(&b"cd"[..]))]
#[case(4, 0, Some(&b""[..]))]
#[case(3, 2, None)]
#[case(5, 0, None)]
#[case(u64::MAX, 2, None)]
#[case(1, u64::MAX, None)]
fn test_backing_slice(#[case] offset: u64, #[case] size: u64, #[case] expected: Option<&[u8]>) {
    assert_eq!(backing_slice(b"abcd", offset, size), expected);
}

proptest! {
    #[test]
    fn prop_extractors_never_panic(buf in proptest::collection::vec(any::<u8>(), 0..2048)) {
        for format in StorageFormat::ALL {
            let _ = format.backing_store(&buf);
            let _ = format.features(&buf);
        }
    }

    #[test]
    fn prop_qcow_backing_range_is_checked(
        offset in any::<u64>(),
        size in any::<u32>(),
        len in 0usize..1024,
    ) {
        let mut buf = vec![0u8; 1024];
        buf[..4].copy_from_slice(b"QFI\xfb");
        buf[4..8].copy_from_slice(&2u32.to_be_bytes());
        buf[8..16].copy_from_slice(&offset.to_be_bytes());
        buf[16..20].copy_from_slice(&size.to_be_bytes());
        buf.truncate(len);
        let in_range = len >= 20
            && offset.checked_add(size as u64).is_some_and(|end| end <= len as u64);
        match StorageFormat::Qcow2.backing_store(&buf) {
            Some(Ok(Extracted::Invalid)) => prop_assert!(!in_range || len < 20),
            Some(Ok(Extracted::Store(_))) => prop_assert!(size == 0 || in_range),
            other => prop_assert!(false, "unexpected {other:?}"),
        }
    }
}
