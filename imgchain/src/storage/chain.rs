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

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::ResultExt;

use crate::format::StorageFormat;
use crate::storage::path::{dir_name, is_local, open_as, rel_points_to};
use crate::storage::{Identity, Result, StorageFileMetadata, StorageType, error, read_metadata};

/// Options of a chain resolution, parsed from e.g.
/// `format=qcow2,allow_probe=on,uid=107,gid=107`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    /// Format of the top image. Probed if absent and `allow_probe` is set,
    /// raw otherwise.
    pub format: Option<StorageFormat>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Probe backing images whose format is not declared by the image
    /// above instead of assuming raw.
    pub allow_probe: bool,
}

impl ChainOptions {
    pub fn from_arg(arg: &str) -> Result<Self> {
        serde_aco::from_arg(arg).context(error::ParseOptions { arg })
    }

    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.uid,
            gid: self.gid,
        }
    }

    pub fn resolve(&self, path: &Path) -> Result<StorageFileMetadata> {
        let format = self.format.unwrap_or(StorageFormat::None);
        resolve_chain(path, format, &self.identity(), self.allow_probe)
    }
}

struct Resolver<'a> {
    identity: &'a Identity,
    allow_probe: bool,
    visited: HashSet<PathBuf>,
}

impl Resolver<'_> {
    fn resolve(
        &mut self,
        path: &Path,
        canon_path: &Path,
        dir: &Path,
        format: StorageFormat,
    ) -> Result<StorageFileMetadata> {
        log::debug!(
            "resolving {path:?}, canon {canon_path:?}, dir {dir:?}, format {format}, identity {:?}, probe {}",
            self.identity,
            self.allow_probe
        );
        if !self.visited.insert(canon_path.to_path_buf()) {
            return error::Cycle { path }.fail();
        }

        let (mut meta, backing_dir) = if is_local(path) {
            let file = open_as(canon_path, self.identity).context(error::OpenFile { path })?;
            read_metadata(path, canon_path, dir, &file, format, self.identity)?
        } else {
            (StorageFileMetadata::network(path), None)
        };

        let (Some(raw), Some(backing)) = (meta.backing_store_raw.clone(), meta.backing_store.clone())
        else {
            return Ok(meta);
        };
        let backing_format = match meta.backing_store_format {
            StorageFormat::Auto if !self.allow_probe => StorageFormat::Raw,
            StorageFormat::AutoSafe => StorageFormat::Auto,
            format => format,
        };
        let backing_dir = backing_dir.unwrap_or_else(|| PathBuf::from("."));
        match self.resolve(&raw, &backing, &backing_dir, backing_format) {
            Ok(backing_meta) => meta.backing_meta = Some(Box::new(backing_meta)),
            Err(e) if e.is_unreachable() => {
                log::warn!("{path:?}: chain is broken at {raw:?}: {e}");
                meta.backing_store = None;
            }
            Err(e) => return Err(e),
        }
        Ok(meta)
    }
}

/// Resolves the metadata of `path` and, recursively, of its backing
/// images.
///
/// `format` is the format of `path`; [`StorageFormat::None`] means
/// [`StorageFormat::Auto`] if `allow_probe`, raw otherwise. Backing images
/// whose format is not declared are taken as raw unless `allow_probe`.
/// A backing image that cannot be found or opened ends the chain, with
/// [`StorageFileMetadata::backing_store`] cleared on the last link.
pub fn resolve_chain(
    path: &Path,
    format: StorageFormat,
    identity: &Identity,
    allow_probe: bool,
) -> Result<StorageFileMetadata> {
    let (canon_path, dir) = if is_local(path) {
        let canon_path = fs::canonicalize(path).context(error::Canonicalize { path })?;
        (canon_path, dir_name(path))
    } else {
        (path.to_path_buf(), PathBuf::from("."))
    };
    let format = match format {
        StorageFormat::None if allow_probe => StorageFormat::Auto,
        StorageFormat::None => StorageFormat::Raw,
        format => format,
    };
    let mut resolver = Resolver {
        identity,
        allow_probe,
        visited: HashSet::new(),
    };
    resolver.resolve(path, &canon_path, &dir, format)
}

impl StorageFileMetadata {
    /// Finds `name` in the chain, or the base image if `name` is `None`.
    ///
    /// Returns the canonical path of the match, its metadata, and the
    /// canonical path of the image above it.
    pub fn lookup(
        &self,
        name: Option<&Path>,
    ) -> Result<(&Path, &StorageFileMetadata, Option<&Path>)> {
        let name_is_file = name.is_some_and(is_local);
        let mut parent = None;
        let mut parent_dir = Path::new(".");
        for link in self.iter() {
            let found = match name {
                None => link.backing_meta.is_none(),
                Some(name) => {
                    name == link.path
                        || (name_is_file
                            && matches!(link.type_, StorageType::File | StorageType::Block)
                            && rel_points_to(parent_dir, name, &link.canon_path))
                }
            };
            if found {
                return Ok((link.canon_path.as_path(), link, parent));
            }
            parent = Some(link.canon_path.as_path());
            parent_dir = link.rel_dir.as_path();
        }
        match name {
            Some(name) => error::NotFound {
                name,
                start: &self.canon_path,
            }
            .fail(),
            None => error::BaseNotFound {
                start: &self.canon_path,
            }
            .fail(),
        }
    }

    /// The raw reference of the first backing image that could not be
    /// resolved, if any.
    pub fn broken_file(&self) -> Option<&Path> {
        for link in self.iter() {
            let raw = link.backing_store_raw.as_deref()?;
            if link.backing_store.is_none() {
                return Some(raw);
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "chain_test.rs"]
mod tests;
