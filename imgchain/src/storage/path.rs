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

use std::ffi::CString;
use std::fs::{self, File};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use libc::c_int;
use snafu::ResultExt;

use crate::ffi;
use crate::storage::{Identity, Result, error};

/// True unless `path` starts with a protocol prefix, i.e. has a ':' before
/// its first '/'.
pub fn is_local(path: &Path) -> bool {
    let bytes = path.as_os_str().as_bytes();
    match bytes.iter().position(|b| *b == b':') {
        Some(colon) => bytes[..colon].contains(&b'/'),
        None => true,
    }
}

/// Directory part of `path`, "." if it has none.
pub fn dir_name(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None if path.has_root() => PathBuf::from("/"),
        None => PathBuf::from("."),
    }
}

/// Checks `path` against `mode` (`F_OK` or a combination of `R_OK`, `W_OK`
/// and `X_OK`) with the credentials of `identity`.
///
/// Foreign credentials are checked against the permission bits of the
/// file; supplementary groups are not considered.
pub fn access_as(path: &Path, mode: c_int, identity: &Identity) -> io::Result<()> {
    if identity.is_current() {
        let c_path = CString::new(path.as_os_str().as_bytes())?;
        ffi!(unsafe { libc::faccessat(libc::AT_FDCWD, c_path.as_ptr(), mode, libc::AT_EACCESS) })?;
        return Ok(());
    }
    let meta = fs::metadata(path)?;
    if mode == libc::F_OK {
        return Ok(());
    }
    let perm = meta.mode();
    let (uid, gid) = (identity.uid(), identity.gid());
    let granted = if uid == 0 {
        let exec = if perm & 0o111 != 0 { libc::X_OK } else { 0 };
        libc::R_OK | libc::W_OK | exec
    } else if uid == meta.uid() {
        ((perm >> 6) & 0o7) as c_int
    } else if gid == meta.gid() {
        ((perm >> 3) & 0o7) as c_int
    } else {
        (perm & 0o7) as c_int
    };
    if mode & !granted == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(libc::EACCES))
    }
}

/// Opens `path` for reading on behalf of `identity`.
pub fn open_as(path: &Path, identity: &Identity) -> io::Result<File> {
    if !identity.is_current() {
        access_as(path, libc::R_OK, identity)?;
    }
    File::open(path)
}

/// Locates the backing file `raw` referenced from directory `start`.
///
/// Returns the directory the backing file's own relative references start
/// from, and its canonical path.
pub fn find_backing_file(
    start: &Path,
    raw: &Path,
    identity: &Identity,
) -> Result<(PathBuf, PathBuf)> {
    let combined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        start.join(raw)
    };
    let dir = dir_name(&combined);
    access_as(&combined, libc::F_OK, identity).context(error::AccessFile { path: &combined })?;
    let canon = fs::canonicalize(&combined).context(error::Canonicalize { path: &combined })?;
    Ok((dir, canon))
}

/// True if `link` resolves to the same file as `dest`.
pub fn points_to(link: &Path, dest: &Path) -> bool {
    match (fs::metadata(link), fs::metadata(dest)) {
        (Ok(l), Ok(d)) => l.dev() == d.dev() && l.ino() == d.ino(),
        _ => false,
    }
}

/// Same as [`points_to`], with a relative `link` taken from `dir`.
pub fn rel_points_to(dir: &Path, link: &Path, dest: &Path) -> bool {
    if link.is_absolute() {
        points_to(link, dest)
    } else {
        points_to(&dir.join(link), dest)
    }
}

#[cfg(test)]
#[path = "path_test.rs"]
mod tests;
