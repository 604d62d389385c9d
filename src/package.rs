// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source package identity.
//!
//! A __source package__ is a directory whose contents are installed into the
//! target as one unit. Packages usually live side by side under a common
//! ancestor called the __package root__, e.g., `~/dotfiles/bash` and
//! `~/dotfiles/vim` both live under `~/dotfiles`.
//!
//! The installation record store identifies a package by its package root and
//! its name, see [`PackageId`]. The name is the package's path relative to the
//! package root, so `~/dotfiles/editors/helix` under `~/dotfiles` is named
//! `editors/helix`.

use crate::path::{absolutize, to_slash};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{canonicalize, metadata},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Identity of a package in the record store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct PackageId {
    /// Directory grouping packages together.
    pub package_root: PathBuf,

    /// Path of the package relative to its package root.
    pub package_name: String,
}

impl PackageId {
    pub fn new(package_root: impl Into<PathBuf>, package_name: impl Into<String>) -> Self {
        Self {
            package_root: package_root.into(),
            package_name: package_name.into(),
        }
    }

    /// Compute package identity without requiring the package to exist.
    ///
    /// Paths that exist are canonicalized, all others are made absolute
    /// lexically. Useful to uninstall a package whose source directory was
    /// already deleted.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Resolve`] if the current working directory
    ///   cannot be determined for a relative path.
    pub fn resolve(source: impl AsRef<Path>, package_root: Option<&Path>) -> Result<Self> {
        let source = resolve_path(source.as_ref())?;
        let package_root = match package_root {
            Some(root) => resolve_path(root)?,
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.clone()),
        };

        Ok(Self::from_parts(&source, package_root))
    }

    fn from_parts(source: &Path, package_root: PathBuf) -> Self {
        let package_name = match source.strip_prefix(&package_root) {
            Ok(relative) if !relative.as_os_str().is_empty() => to_slash(relative),
            _ => source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.to_string_lossy().into_owned()),
        };

        Self {
            package_root,
            package_name,
        }
    }

    /// Where the package would live under its package root.
    pub fn source_path(&self) -> PathBuf {
        self.package_root.join(&self.package_name)
    }
}

impl Display for PackageId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.package_name)
    }
}

/// Source package to install from.
///
/// # Invariant
///
/// - Source path is canonical and names an existing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    source: PathBuf,
    id: PackageId,
}

impl Package {
    /// Open a source package.
    ///
    /// Package root defaults to the parent directory of the source.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Resolve`] if the source cannot be
    ///   canonicalized, e.g., it does not exist.
    /// - Return [`PackageError::NotADirectory`] if the source is not a
    ///   directory.
    pub fn new(source: impl AsRef<Path>, package_root: Option<&Path>) -> Result<Self> {
        let source = source.as_ref();
        let source = canonicalize(source).map_err(|err| PackageError::Resolve {
            source: err,
            path: source.to_path_buf(),
        })?;

        let is_dir = metadata(&source)
            .map_err(|err| PackageError::Resolve {
                source: err,
                path: source.clone(),
            })?
            .is_dir();
        if !is_dir {
            return Err(PackageError::NotADirectory { path: source });
        }

        let package_root = match package_root {
            Some(root) => resolve_path(root)?,
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.clone()),
        };

        let id = PackageId::from_parts(&source, package_root);
        debug!("opened package {id} at {:?}", source.display());

        Ok(Self { source, id })
    }

    /// Canonical path to package source directory.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.package_name
    }

    pub fn package_root(&self) -> &Path {
        &self.id.package_root
    }
}

impl Display for Package {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    canonicalize(path)
        .or_else(|_| absolutize(path))
        .map_err(|err| PackageError::Resolve {
            source: err,
            path: path.to_path_buf(),
        })
}

/// Package error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// Path of package cannot be resolved.
    #[error("failed to resolve package path {:?}", path.display())]
    Resolve {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Package source is not a directory.
    #[error("package source {:?} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

/// Friendly result alias :3
type Result<T, E = PackageError> = std::result::Result<T, E>;
