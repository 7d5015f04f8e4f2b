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

pub mod cow;
pub mod plain;
pub mod probe;
pub mod qcow;
pub mod qed;
pub mod vmdk;

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::str::FromStr;

use bitflags::bitflags;
use serde::Deserialize;
use snafu::Snafu;

use crate::errors::{DebugTrace, trace_error};
use crate::utils::endian::Endian;

use self::cow::CowHdr;
use self::plain::{BochsHdr, ISO_MAGIC_OFFSET, VdiHdr, VpcFooter};
use self::qcow::{Qcow1Hdr, Qcow2Hdr};
use self::qed::QedHdr;
use self::vmdk::Vmdk4Hdr;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, context(suffix(false)))]
pub enum Error {
    #[snafu(display("Backing format {name:?} is not a known image format"))]
    UnknownFormatName { name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Upper bound of the header bytes read from an image.
pub const MAX_HEADER: usize = 0x8200;

/// Image container formats.
///
/// The concrete formats are ordered as in [`FORMATS`]; formats that can
/// carry a backing store start at [`StorageFormat::Cow`]. [`Auto`] and
/// [`AutoSafe`] are requests rather than formats: probe the image, and
/// probe it although the referencing image did not name the format.
///
/// [`Auto`]: StorageFormat::Auto
/// [`AutoSafe`]: StorageFormat::AutoSafe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StorageFormat {
    None = 0,
    Raw,
    Dir,
    Bochs,
    Cloop,
    Dmg,
    Iso,
    Vpc,
    Vdi,
    Fat,
    Vhd,
    Cow,
    Qcow,
    Qcow2,
    Qed,
    Vmdk,
    Auto,
    #[serde(rename = "auto_safe")]
    AutoSafe,
}

impl StorageFormat {
    pub const COUNT: usize = 16;

    pub const ALL: [StorageFormat; Self::COUNT] = [
        StorageFormat::None,
        StorageFormat::Raw,
        StorageFormat::Dir,
        StorageFormat::Bochs,
        StorageFormat::Cloop,
        StorageFormat::Dmg,
        StorageFormat::Iso,
        StorageFormat::Vpc,
        StorageFormat::Vdi,
        StorageFormat::Fat,
        StorageFormat::Vhd,
        StorageFormat::Cow,
        StorageFormat::Qcow,
        StorageFormat::Qcow2,
        StorageFormat::Qed,
        StorageFormat::Vmdk,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            StorageFormat::None => "none",
            StorageFormat::Raw => "raw",
            StorageFormat::Dir => "dir",
            StorageFormat::Bochs => "bochs",
            StorageFormat::Cloop => "cloop",
            StorageFormat::Dmg => "dmg",
            StorageFormat::Iso => "iso",
            StorageFormat::Vpc => "vpc",
            StorageFormat::Vdi => "vdi",
            StorageFormat::Fat => "fat",
            StorageFormat::Vhd => "vhd",
            StorageFormat::Cow => "cow",
            StorageFormat::Qcow => "qcow",
            StorageFormat::Qcow2 => "qcow2",
            StorageFormat::Qed => "qed",
            StorageFormat::Vmdk => "vmdk",
            StorageFormat::Auto => "auto",
            StorageFormat::AutoSafe => "auto_safe",
        }
    }

    /// Looks up a concrete format by the name used on disk, e.g. in the
    /// qcow2 backing format extension.
    pub fn from_name(name: &str) -> Option<StorageFormat> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// True for every format other than `none` and the probe requests.
    pub fn is_valid(self) -> bool {
        self > StorageFormat::None && self.desc().is_some()
    }

    pub fn desc(self) -> Option<&'static FormatDesc> {
        FORMATS.get(self as usize)
    }

    /// Runs the backing store extractor of this format, if it has one.
    pub fn backing_store(self, buf: &[u8]) -> Option<Result<Extracted>> {
        let r = match self {
            StorageFormat::Cow => cow::backing_store(buf),
            StorageFormat::Qcow => qcow::qcow1_backing_store(buf),
            StorageFormat::Qcow2 => qcow::qcow2_backing_store(buf),
            StorageFormat::Qed => qed::backing_store(buf),
            StorageFormat::Vmdk => vmdk::backing_store(buf),
            _ => return None,
        };
        Some(r)
    }

    /// Runs the feature extractor of this format. `None` means the image
    /// has no feature bitmap.
    pub fn features(self, buf: &[u8]) -> Option<FileFeatures> {
        match self {
            StorageFormat::Qcow2 => qcow::qcow2_features(buf),
            _ => None,
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StorageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(StorageFormat::Auto),
            "auto_safe" => Ok(StorageFormat::AutoSafe),
            _ => match Self::from_name(s) {
                Some(format) => Ok(format),
                None => error::UnknownFormatName { name: s }.fail(),
            },
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct FileFeatures: u64 {
        const LAZY_REFCOUNTS = 1 << 0;
    }
}

const FEATURE_NAMES: [(FileFeatures, &str); 1] = [(FileFeatures::LAZY_REFCOUNTS, "lazy_refcounts")];

impl FileFeatures {
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        FEATURE_NAMES
            .into_iter()
            .filter(move |(f, _)| self.contains(*f))
            .map(|(_, name)| name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magic {
    pub offset: usize,
    pub bytes: &'static [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// The format cannot be recognized by its magic alone.
    Never,
    /// The format has no version field.
    Any,
    OneOf {
        offset: usize,
        values: &'static [u32],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Capacity is the size of the file itself.
    FileSize,
    Field {
        offset: usize,
        width: usize,
        multiplier: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDesc {
    pub format: StorageFormat,
    pub magic: Option<Magic>,
    pub extension: Option<&'static str>,
    pub endian: Endian,
    pub version: Version,
    pub capacity: Capacity,
    /// Offset of the 32-bit big-endian encryption method.
    pub crypt_offset: Option<usize>,
}

impl FormatDesc {
    const fn opaque(format: StorageFormat) -> Self {
        FormatDesc {
            format,
            magic: None,
            extension: None,
            endian: Endian::Little,
            version: Version::Never,
            capacity: Capacity::FileSize,
            crypt_offset: None,
        }
    }
}

/// Format descriptors, indexed by [`StorageFormat`].
pub static FORMATS: [FormatDesc; StorageFormat::COUNT] = [
    FormatDesc::opaque(StorageFormat::None),
    FormatDesc::opaque(StorageFormat::Raw),
    FormatDesc::opaque(StorageFormat::Dir),
    FormatDesc {
        version: Version::OneOf {
            offset: BochsHdr::OFFSET_VERSION,
            values: &[0x20000],
        },
        capacity: Capacity::Field {
            offset: BochsHdr::OFFSET_SIZE,
            width: BochsHdr::SIZE_SIZE,
            multiplier: 1,
        },
        ..FormatDesc::opaque(StorageFormat::Bochs)
    },
    FormatDesc::opaque(StorageFormat::Cloop),
    // dmg has no reliable magic.
    FormatDesc {
        extension: Some(".dmg"),
        ..FormatDesc::opaque(StorageFormat::Dmg)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: ISO_MAGIC_OFFSET,
            bytes: b"CD001",
        }),
        extension: Some(".iso"),
        version: Version::Any,
        ..FormatDesc::opaque(StorageFormat::Iso)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: VpcFooter::OFFSET_COOKIE,
            bytes: b"conectix",
        }),
        endian: Endian::Big,
        version: Version::OneOf {
            offset: VpcFooter::OFFSET_VERSION,
            values: &[0x10000],
        },
        capacity: Capacity::Field {
            offset: VpcFooter::OFFSET_ORIGINAL_SIZE,
            width: VpcFooter::SIZE_ORIGINAL_SIZE,
            multiplier: 1,
        },
        ..FormatDesc::opaque(StorageFormat::Vpc)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: VdiHdr::OFFSET_SIGNATURE,
            bytes: b"\x7f\x10\xda\xbe",
        }),
        extension: Some(".vdi"),
        version: Version::OneOf {
            offset: VdiHdr::OFFSET_VERSION,
            values: &[0x00010001],
        },
        capacity: Capacity::Field {
            offset: VdiHdr::OFFSET_DISK_SIZE,
            width: VdiHdr::SIZE_DISK_SIZE,
            multiplier: 1,
        },
        ..FormatDesc::opaque(StorageFormat::Vdi)
    },
    FormatDesc::opaque(StorageFormat::Fat),
    FormatDesc::opaque(StorageFormat::Vhd),
    FormatDesc {
        magic: Some(Magic {
            offset: CowHdr::OFFSET_MAGIC,
            bytes: b"OOOM",
        }),
        endian: Endian::Big,
        version: Version::OneOf {
            offset: CowHdr::OFFSET_VERSION,
            values: &[2],
        },
        capacity: Capacity::Field {
            offset: CowHdr::OFFSET_SIZE,
            width: CowHdr::SIZE_SIZE,
            multiplier: 1,
        },
        ..FormatDesc::opaque(StorageFormat::Cow)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: Qcow1Hdr::OFFSET_MAGIC,
            bytes: b"QFI",
        }),
        endian: Endian::Big,
        version: Version::OneOf {
            offset: Qcow1Hdr::OFFSET_VERSION,
            values: &[1],
        },
        capacity: Capacity::Field {
            offset: Qcow1Hdr::OFFSET_SIZE,
            width: Qcow1Hdr::SIZE_SIZE,
            multiplier: 1,
        },
        crypt_offset: Some(Qcow1Hdr::OFFSET_CRYPT_METHOD),
        ..FormatDesc::opaque(StorageFormat::Qcow)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: Qcow2Hdr::OFFSET_MAGIC,
            bytes: b"QFI",
        }),
        endian: Endian::Big,
        version: Version::OneOf {
            offset: Qcow2Hdr::OFFSET_VERSION,
            values: &[2, 3],
        },
        capacity: Capacity::Field {
            offset: Qcow2Hdr::OFFSET_SIZE,
            width: Qcow2Hdr::SIZE_SIZE,
            multiplier: 1,
        },
        crypt_offset: Some(Qcow2Hdr::OFFSET_CRYPT_METHOD),
        ..FormatDesc::opaque(StorageFormat::Qcow2)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: QedHdr::OFFSET_MAGIC,
            bytes: b"QED",
        }),
        version: Version::Any,
        capacity: Capacity::Field {
            offset: QedHdr::OFFSET_IMAGE_SIZE,
            width: QedHdr::SIZE_IMAGE_SIZE,
            multiplier: 1,
        },
        ..FormatDesc::opaque(StorageFormat::Qed)
    },
    FormatDesc {
        magic: Some(Magic {
            offset: Vmdk4Hdr::OFFSET_MAGIC,
            bytes: b"KDMV",
        }),
        version: Version::OneOf {
            offset: Vmdk4Hdr::OFFSET_VERSION,
            values: &[1, 2],
        },
        capacity: Capacity::Field {
            offset: Vmdk4Hdr::OFFSET_CAPACITY,
            width: Vmdk4Hdr::SIZE_CAPACITY,
            multiplier: 512,
        },
        ..FormatDesc::opaque(StorageFormat::Vmdk)
    },
];

/// Backing store reference found in an image header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingStore {
    /// The reference as stored in the header. `None` if the image has no
    /// backing store.
    pub path: Option<PathBuf>,
    /// Format the image declares for its backing store.
    pub format: StorageFormat,
}

impl BackingStore {
    pub fn none() -> Self {
        BackingStore {
            path: None,
            format: StorageFormat::None,
        }
    }

    fn new(path: &[u8], format: StorageFormat) -> Self {
        BackingStore {
            path: Some(PathBuf::from(OsStr::from_bytes(path))),
            format,
        }
    }
}

/// Outcome of a backing store extractor that did not hit a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Store(BackingStore),
    /// The header is truncated or inconsistent; the image can only be
    /// treated as opaque data.
    Invalid,
}

/// Returns `buf[offset..offset + size]`, or `None` if the range wraps or
/// exceeds `buf`.
fn backing_slice(buf: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    buf.get(start..end)
}

#[cfg(test)]
#[path = "format_test.rs"]
mod tests;
