// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use anyhow::Result;
use std::{
    env::current_dir,
    fs::{canonicalize, create_dir_all, write},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

/// Scratch file system rooted at the current directory of a sealed test.
pub(crate) struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub(crate) fn new() -> Result<Self> {
        // INVARIANT: Temporary directory may live behind a symlink.
        let root = canonicalize(current_dir()?)?;
        Ok(Self { root })
    }

    pub(crate) fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub(crate) fn file(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(&path, contents)?;
        Ok(path)
    }

    pub(crate) fn dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.path(relative);
        create_dir_all(&path)?;
        Ok(path)
    }

    pub(crate) fn link(&self, relative: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        symlink(dest, &path)?;
        Ok(path)
    }
}
