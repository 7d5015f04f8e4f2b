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

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::format::{FORMATS, FormatDesc, StorageFormat, Version};
use crate::utils::has_suffix_ignore_case;

impl FormatDesc {
    pub fn matches_magic(&self, buf: &[u8]) -> bool {
        let Some(magic) = &self.magic else {
            return false;
        };
        let end = magic.offset + magic.bytes.len();
        buf.get(magic.offset..end) == Some(magic.bytes)
    }

    pub fn matches_version(&self, buf: &[u8]) -> bool {
        match self.version {
            Version::Never => false,
            Version::Any => true,
            Version::OneOf { offset, values } => match self.endian.read_u32(buf, offset) {
                Some(version) => values.contains(&version),
                None => false,
            },
        }
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        match self.extension {
            Some(ext) => has_suffix_ignore_case(path.as_os_str().as_bytes(), ext.as_bytes()),
            None => false,
        }
    }
}

/// Guesses the format of an image from its header and its file name.
///
/// Magic plus version wins over the extension; anything else is raw. The
/// result is a guess from untrusted data: a guest can write any magic into
/// a raw image, so only a format other than raw that was declared by the
/// owner of the image is safe to act upon.
pub fn probe_format_from_buf(path: &Path, buf: &[u8]) -> StorageFormat {
    let mut possible = None;
    for desc in &FORMATS {
        if !desc.matches_magic(buf) {
            continue;
        }
        if desc.matches_version(buf) {
            log::debug!("{}: probed format {}", path.display(), desc.format);
            return desc.format;
        }
        possible = Some(desc.format);
    }
    if let Some(format) = possible {
        log::warn!(
            "{}: matches {format} magic, but version is wrong",
            path.display()
        );
    }
    match FORMATS.iter().find(|desc| desc.matches_extension(path)) {
        Some(desc) => {
            log::debug!("{}: format {} by extension", path.display(), desc.format);
            desc.format
        }
        None => StorageFormat::Raw,
    }
}

#[cfg(test)]
#[path = "probe_test.rs"]
mod tests;
