// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way. Also houses the dot-rename
//! transform that maps source package names onto target names.
//!
//! # Dot-Rename Convention
//!
//! Files inside a source package are usually kept visible, so a package
//! can name a file `dot-bashrc` instead of `.bashrc`. When installed, any
//! name that begins with the reserved prefix `dot-` is rewritten to begin
//! with `.` instead. The transform applies to every path component, files and
//! directories alike, so `dot-config/dot-app` lands at `.config/.app`.

use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    path::{Component, Path, PathBuf},
};

/// Reserved prefix that marks a name as a dotfile in a source package.
pub const DOT_PREFIX: &str = "dot-";

/// Name of the directory that holds dotx configuration and data files.
const APP_DIR: &str = "dotx";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to dotx configuration directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/dotx`. Holds the global
/// `dotxignore` and `always-create` pattern files, and `config.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join(APP_DIR))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to dotx data directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/dotx` for the installation
/// record store. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join(APP_DIR))
        .ok_or(NoWayHome)
}

/// Rewrite a single source name into its target name.
///
/// A name starting with [`DOT_PREFIX`] followed by at least one more
/// character becomes a dotfile name, e.g., `dot-bashrc` becomes `.bashrc`.
/// Every other name passes through untouched, including a bare `dot-`.
pub fn dot_rename(name: &OsStr) -> Cow<'_, OsStr> {
    match name.to_str().and_then(|name| name.strip_prefix(DOT_PREFIX)) {
        Some(rest) if !rest.is_empty() => {
            let mut renamed = OsString::from(".");
            renamed.push(rest);
            Cow::Owned(renamed)
        }
        _ => Cow::Borrowed(name),
    }
}

/// Apply [`dot_rename`] to every normal component of a relative path.
pub fn dot_rename_path(path: &Path) -> PathBuf {
    path.components()
        .map(|component| match component {
            Component::Normal(name) => dot_rename(name).into_owned(),
            other => other.as_os_str().to_os_string(),
        })
        .collect()
}

/// Lexically normalize a path by resolving `.` and `..` components.
///
/// Never touches the file system, so symlinks along the way are not
/// resolved. A `..` at the root stays at the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.file_name().is_some() {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }

    normalized
}

/// Make path absolute against the current working directory, then normalize.
///
/// Unlike [`std::fs::canonicalize`], the path does not need to exist.
///
/// # Errors
///
/// - Return [`std::io::Error`] if the current working directory is unknown.
pub fn absolutize(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }

    Ok(normalize_path(&std::env::current_dir()?.join(path)))
}

/// Resolve where a symbolic link points to without following further links.
///
/// Relative link contents are resolved against the directory holding the
/// link itself.
pub fn resolve_link_target(link: &Path, contents: &Path) -> PathBuf {
    if contents.is_absolute() {
        return normalize_path(contents);
    }

    let parent = link.parent().unwrap_or_else(|| Path::new("/"));
    normalize_path(&parent.join(contents))
}

/// Join path components with forward slashes for glob matching.
///
/// Only normal components survive, so `./a/b` and `a/b` give `a/b`.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
