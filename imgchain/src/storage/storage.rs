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

pub mod chain;
pub mod path;

use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

use crate::errors::{DebugTrace, trace_error};
use crate::format::probe::probe_format_from_buf;
use crate::format::{
    BackingStore, Capacity, Extracted, FileFeatures, FormatDesc, MAX_HEADER, StorageFormat,
};
use crate::utils::endian::Endian;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, context(suffix(false)))]
pub enum Error {
    #[snafu(display("Unknown storage file format {format}"))]
    UnknownFormat { format: StorageFormat },
    #[snafu(display("Failed to parse image header"), context(false))]
    Format { source: Box<crate::format::Error> },
    #[snafu(display("Cannot access backing file {path:?}"))]
    AccessFile { path: PathBuf, error: std::io::Error },
    #[snafu(display("Cannot canonicalize path {path:?}"))]
    Canonicalize { path: PathBuf, error: std::io::Error },
    #[snafu(display("Failed to open file {path:?}"))]
    OpenFile { path: PathBuf, error: std::io::Error },
    #[snafu(display("Cannot stat file {path:?}"))]
    StatFile { path: PathBuf, error: std::io::Error },
    #[snafu(display("Cannot read header of {path:?}"))]
    ReadHeader { path: PathBuf, error: std::io::Error },
    #[snafu(display("Backing store for {path:?} is self-referential"))]
    Cycle { path: PathBuf },
    #[snafu(display("Could not find image {name:?} in chain for {start:?}"))]
    NotFound { name: PathBuf, start: PathBuf },
    #[snafu(display("Could not find base image in chain for {start:?}"))]
    BaseNotFound { start: PathBuf },
    #[snafu(display("Failed to parse {arg:?}"))]
    ParseOptions { arg: String, error: serde_aco::Error },
}

impl Error {
    /// True if the file could not be reached at all. A backing file failing
    /// this way breaks the chain instead of failing the resolution.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Error::AccessFile { .. } | Error::Canonicalize { .. } | Error::OpenFile { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageType {
    #[default]
    None,
    File,
    Block,
    Dir,
    Network,
    Volume,
}

impl StorageType {
    pub const fn name(self) -> &'static str {
        match self {
            StorageType::None => "none",
            StorageType::File => "file",
            StorageType::Block => "block",
            StorageType::Dir => "dir",
            StorageType::Network => "network",
            StorageType::Volume => "volume",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetProtocol {
    Nbd,
    Rbd,
    Sheepdog,
    Gluster,
    Iscsi,
    Http,
    Https,
    Ftp,
    Ftps,
    Tftp,
}

impl NetProtocol {
    pub const ALL: [NetProtocol; 10] = [
        NetProtocol::Nbd,
        NetProtocol::Rbd,
        NetProtocol::Sheepdog,
        NetProtocol::Gluster,
        NetProtocol::Iscsi,
        NetProtocol::Http,
        NetProtocol::Https,
        NetProtocol::Ftp,
        NetProtocol::Ftps,
        NetProtocol::Tftp,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            NetProtocol::Nbd => "nbd",
            NetProtocol::Rbd => "rbd",
            NetProtocol::Sheepdog => "sheepdog",
            NetProtocol::Gluster => "gluster",
            NetProtocol::Iscsi => "iscsi",
            NetProtocol::Http => "http",
            NetProtocol::Https => "https",
            NetProtocol::Ftp => "ftp",
            NetProtocol::Ftps => "ftps",
            NetProtocol::Tftp => "tftp",
        }
    }

    /// Recognizes the scheme of a network path such as `nbd:host:10809`
    /// or `gluster+tcp://host/volume/image`.
    pub fn from_path(path: &Path) -> Option<NetProtocol> {
        let bytes = path.as_os_str().as_bytes();
        let colon = bytes.iter().position(|b| *b == b':')?;
        let scheme = &bytes[..colon];
        let scheme = match scheme.iter().position(|b| *b == b'+') {
            Some(plus) => &scheme[..plus],
            None => scheme,
        };
        Self::ALL
            .into_iter()
            .find(|p| scheme.eq_ignore_ascii_case(p.name().as_bytes()))
    }
}

impl fmt::Display for NetProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The user and group files are opened as. `None` stands for the
/// effective id of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Identity {
    pub fn uid(&self) -> u32 {
        self.uid.unwrap_or_else(|| unsafe { libc::geteuid() })
    }

    pub fn gid(&self) -> u32 {
        self.gid.unwrap_or_else(|| unsafe { libc::getegid() })
    }

    /// True if files are accessed with the credentials of the process.
    pub fn is_current(&self) -> bool {
        self.uid() == unsafe { libc::geteuid() } && self.gid() == unsafe { libc::getegid() }
    }
}

/// Present when an image declares an encryption method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encryption {
    pub method: u32,
}

/// Metadata of one image, owning the metadata of its backing image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFileMetadata {
    /// Path as referenced by the user or by the image above.
    pub path: PathBuf,
    pub canon_path: PathBuf,
    /// Directory relative backing references of this image start from.
    pub rel_dir: PathBuf,
    pub type_: StorageType,
    pub format: StorageFormat,
    /// Virtual size in bytes, 0 if unknown.
    pub capacity: u64,
    pub encryption: Option<Encryption>,
    pub features: Option<FileFeatures>,
    /// qcow2 compatibility level
    pub compat: Option<&'static str>,
    /// Backing reference as stored in the header.
    pub backing_store_raw: Option<PathBuf>,
    /// Canonical path of the backing image; `None` with
    /// `backing_store_raw` set means the chain is broken here.
    pub backing_store: Option<PathBuf>,
    /// Backing format declared by the header, `Auto` if undeclared.
    pub backing_store_format: StorageFormat,
    pub backing_meta: Option<Box<StorageFileMetadata>>,
    pub protocol: Option<NetProtocol>,
}

impl StorageFileMetadata {
    fn new(path: &Path, canon_path: &Path, rel_dir: &Path) -> Self {
        StorageFileMetadata {
            path: path.to_path_buf(),
            canon_path: canon_path.to_path_buf(),
            rel_dir: rel_dir.to_path_buf(),
            type_: StorageType::None,
            format: StorageFormat::None,
            capacity: 0,
            encryption: None,
            features: None,
            compat: None,
            backing_store_raw: None,
            backing_store: None,
            backing_store_format: StorageFormat::None,
            backing_meta: None,
            protocol: None,
        }
    }

    /// Network volumes are not introspected and are assumed to be raw.
    fn network(path: &Path) -> Self {
        StorageFileMetadata {
            type_: StorageType::Network,
            format: StorageFormat::Raw,
            protocol: NetProtocol::from_path(path),
            ..Self::new(path, path, Path::new("."))
        }
    }

    /// Walks the chain starting from this image.
    pub fn iter(&self) -> impl Iterator<Item = &StorageFileMetadata> {
        std::iter::successors(Some(self), |m| m.backing_meta.as_deref())
    }
}

fn read_capacity(desc: &FormatDesc, buf: &[u8], file_size: u64) -> Option<u64> {
    match desc.capacity {
        Capacity::FileSize => Some(file_size),
        Capacity::Field {
            offset,
            width,
            multiplier,
        } => {
            let size = match width {
                4 => desc.endian.read_u32(buf, offset).map(u64::from),
                _ => desc.endian.read_u64(buf, offset),
            }?;
            size.checked_mul(multiplier)
        }
    }
}

/// Extracts the metadata of one image from its header without following
/// its backing store.
///
/// Returns the metadata and, if the backing store was found on the local
/// file system, the directory its own relative references start from.
fn extract_metadata(
    path: &Path,
    canon_path: &Path,
    dir: &Path,
    buf: &[u8],
    format: StorageFormat,
    file_size: u64,
    identity: &Identity,
) -> Result<(StorageFileMetadata, Option<PathBuf>)> {
    log::debug!(
        "extracting {path:?}, canon {canon_path:?}, dir {dir:?}, {} bytes, format {format}",
        buf.len()
    );
    let mut meta = StorageFileMetadata::new(path, canon_path, dir);
    let format = match format {
        StorageFormat::Auto => probe_format_from_buf(path, buf),
        format => format,
    };
    let Some(desc) = format.desc().filter(|_| format.is_valid()) else {
        return error::UnknownFormat { format }.fail();
    };
    meta.format = format;
    if desc.magic.is_none() {
        return Ok((meta, None));
    }

    let Some(capacity) = read_capacity(desc, buf, file_size) else {
        log::debug!("{path:?}: capacity is out of the header");
        return Ok((meta, None));
    };
    meta.capacity = capacity;

    if let Some(offset) = desc.crypt_offset {
        match Endian::Big.read_u32(buf, offset) {
            Some(0) | None => {}
            Some(method) => meta.encryption = Some(Encryption { method }),
        }
    }

    let mut backing_dir = None;
    match format.backing_store(buf).transpose()? {
        None => {}
        Some(Extracted::Invalid) => {
            log::debug!("{path:?}: invalid backing store reference");
            return Ok((meta, None));
        }
        Some(Extracted::Store(BackingStore { path: None, .. })) => {}
        Some(Extracted::Store(BackingStore {
            path: Some(raw),
            format: backing_format,
        })) => {
            if path::is_local(&raw) {
                match path::find_backing_file(dir, &raw, identity) {
                    Ok((dir, canon)) => {
                        meta.backing_store = Some(canon);
                        meta.backing_store_format = backing_format;
                        backing_dir = Some(dir);
                    }
                    Err(e) => log::warn!("Backing file {raw:?} of image {path:?} is missing: {e}"),
                }
            } else {
                meta.backing_store = Some(raw.clone());
                meta.backing_store_format = StorageFormat::Raw;
            }
            meta.backing_store_raw = Some(raw);
        }
    }

    meta.features = format.features(buf);
    if format == StorageFormat::Qcow2 && meta.features.is_some() {
        meta.compat = Some("1.1");
    }
    Ok((meta, backing_dir))
}

/// Reads the header of an open file and extracts its metadata.
fn read_metadata(
    path: &Path,
    canon_path: &Path,
    dir: &Path,
    file: &File,
    format: StorageFormat,
    identity: &Identity,
) -> Result<(StorageFileMetadata, Option<PathBuf>)> {
    let stat = file.metadata().context(error::StatFile { path })?;
    let file_type = stat.file_type();
    if file_type.is_dir() {
        // Directories have neither a header nor a backing store.
        let mut meta = StorageFileMetadata::new(path, canon_path, dir);
        meta.type_ = StorageType::Dir;
        meta.format = StorageFormat::Dir;
        return Ok((meta, None));
    }

    let mut reader = file;
    reader
        .seek(SeekFrom::Start(0))
        .context(error::ReadHeader { path })?;
    let mut buf = Vec::with_capacity(MAX_HEADER);
    reader
        .take(MAX_HEADER as u64)
        .read_to_end(&mut buf)
        .context(error::ReadHeader { path })?;

    let (mut meta, backing_dir) =
        extract_metadata(path, canon_path, dir, &buf, format, stat.len(), identity)?;
    if file_type.is_file() {
        meta.type_ = StorageType::File;
    } else if file_type.is_block_device() {
        meta.type_ = StorageType::Block;
    }
    Ok((meta, backing_dir))
}

/// Probes the format of the image at `path`.
///
/// A guest can turn a raw image into anything else at will, so the result
/// must not be trusted unless it is [`StorageFormat::Raw`].
pub fn probe_format(path: &Path, identity: &Identity) -> Result<StorageFormat> {
    let file = path::open_as(path, identity).context(error::OpenFile { path })?;
    let stat = file.metadata().context(error::StatFile { path })?;
    if stat.is_dir() {
        return Ok(StorageFormat::Dir);
    }
    let mut buf = Vec::with_capacity(MAX_HEADER);
    file.take(MAX_HEADER as u64)
        .read_to_end(&mut buf)
        .context(error::ReadHeader { path })?;
    Ok(probe_format_from_buf(path, &buf))
}

/// Extracts the metadata of `path` from its header `buf`, without
/// following the backing store.
///
/// [`StorageFormat::Auto`] probes the format, which must not be done on
/// images a guest can write to. A `backing_store_format` of `Auto` means the
/// image did not declare the format of its backing store.
pub fn get_metadata_from_buf(
    path: &Path,
    buf: &[u8],
    format: StorageFormat,
) -> Result<StorageFileMetadata> {
    let canon_path = fs::canonicalize(path).context(error::Canonicalize { path })?;
    let (meta, _) = extract_metadata(
        path,
        &canon_path,
        Path::new("."),
        buf,
        format,
        buf.len() as u64,
        &Identity::default(),
    )?;
    Ok(meta)
}

/// Same as [`get_metadata_from_buf`], with the header read from `file`.
pub fn get_metadata_from_file(
    path: &Path,
    file: &File,
    format: StorageFormat,
) -> Result<StorageFileMetadata> {
    let canon_path = fs::canonicalize(path).context(error::Canonicalize { path })?;
    let (meta, _) = read_metadata(
        path,
        &canon_path,
        Path::new("."),
        file,
        format,
        &Identity::default(),
    )?;
    Ok(meta)
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
