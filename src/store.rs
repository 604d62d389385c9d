// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation record store.
//!
//! Dotx remembers every link and directory it places into a target. These
//! __installation records__ make uninstalls precise, let dotx detect when two
//! packages fight over the same target path, and back the `list`, `verify`,
//! `show`, `path`, and `which` commands.
//!
//! # Store Layout
//!
//! The store is a single TOML file, by default at
//! `$XDG_DATA_HOME/dotx/installed.toml`. Each record is its own
//! `[[installation]]` table:
//!
//! ```toml
//! [[installation]]
//! package_root = "/home/user/dotfiles"
//! package_name = "bash"
//! source_package_root = "/home/user/dotfiles/bash"
//! target_path = "/home/user/.bashrc"
//! link_type = "file"
//! installed_at = "2025-01-01T00:00:00Z"
//! ```
//!
//! A target path has at most one record. Recording a target again replaces
//! the old record.
//!
//! # Shared Directories
//!
//! A directory created for several packages, e.g., `.config`, is recorded
//! once, under whichever package applied it last. Earlier packages stop
//! listing it in `show`, and uninstalling the last one keeps the directory as
//! long as other links still live below it.

use crate::{
    package::PackageId,
    path::{default_data_dir, NoWayHome},
    plan::OwnershipLookup,
};

use chrono::{DateTime, Utc};
use mkdirp::mkdirp;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, symlink_metadata, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Name of the record store file in the dotx data directory.
pub const STORE_FILE_NAME: &str = "installed.toml";

/// What kind of object a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Symlink to a source file.
    File,

    /// Symlink to a source directory.
    Directory,

    /// Real directory created by dotx.
    CreatedDir,
}

impl LinkType {
    /// Record tracks a symlink.
    pub fn is_link(&self) -> bool {
        matches!(self, Self::File | Self::Directory)
    }
}

impl Display for LinkType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File => fmt.write_str("file"),
            Self::Directory => fmt.write_str("directory"),
            Self::CreatedDir => fmt.write_str("created_dir"),
        }
    }
}

/// One installed link or created directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    pub package_root: PathBuf,
    pub package_name: String,

    /// Package source directory the link points into.
    pub source_package_root: PathBuf,

    pub target_path: PathBuf,
    pub link_type: LinkType,
    pub installed_at: DateTime<Utc>,
}

impl Record {
    /// Construct new record stamped with the current time.
    pub fn new(
        package: &PackageId,
        source_package_root: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
        link_type: LinkType,
    ) -> Self {
        Self {
            package_root: package.package_root.clone(),
            package_name: package.package_name.clone(),
            source_package_root: source_package_root.into(),
            target_path: target_path.into(),
            link_type,
            installed_at: Utc::now(),
        }
    }

    /// Identity of the package the record belongs to.
    pub fn package(&self) -> PackageId {
        PackageId::new(&self.package_root, &self.package_name)
    }

    pub fn belongs_to(&self, package: &PackageId) -> bool {
        self.package_root == package.package_root && self.package_name == package.package_name
    }
}

/// Store file layout.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
struct Database {
    #[serde(rename = "installation", default)]
    installations: Vec<Record>,
}

/// Summary of an installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub package: PackageId,
    pub file_count: usize,
    pub latest_install: DateTime<Utc>,
}

/// Mismatch between a record and the file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub target_path: PathBuf,
    pub link_type: LinkType,
    pub problem: Problem,
}

/// Kind of record mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Missing,
    NotASymlink,
    NotADirectory,
}

impl Display for Problem {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Missing => fmt.write_str("missing from file system"),
            Self::NotASymlink => fmt.write_str("not a symlink"),
            Self::NotADirectory => fmt.write_str("not a real directory"),
        }
    }
}

/// Installation records loaded from a store file.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    records: BTreeMap<PathBuf, Record>,
}

impl Store {
    /// Open store file at given path.
    ///
    /// A missing store file opens as an empty store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if the store file cannot be read.
    /// - Return [`StoreError::Deserialize`] if the store file is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let database = match read_to_string(&path) {
            Ok(content) => {
                toml::de::from_str::<Database>(&content).map_err(|err| StoreError::Deserialize {
                    source: err,
                    path: path.clone(),
                })?
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Database::default(),
            Err(err) => return Err(StoreError::Read { source: err, path }),
        };

        let records = database
            .installations
            .into_iter()
            .map(|record| (record.target_path.clone(), record))
            .collect::<BTreeMap<_, _>>();
        debug!("opened store {:?} with {} record(s)", path.display(), records.len());

        Ok(Self { path, records })
    }

    /// Open store file at its default location.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NoWayHome`] if the data directory is unknown.
    /// - Return errors of [`Store::open`].
    pub fn open_default() -> Result<Self> {
        Self::open(default_data_dir()?.join(STORE_FILE_NAME))
    }

    /// Path to store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write store back to its file.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::CreateDir`] if the parent directory cannot be
    ///   created.
    /// - Return [`StoreError::Serialize`] if records cannot be serialized.
    /// - Return [`StoreError::Write`] if the store file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            mkdirp(parent).map_err(|err| StoreError::CreateDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        let database = Database {
            installations: self.records.values().cloned().collect(),
        };
        let content = toml::ser::to_string_pretty(&database)?;
        write(&self.path, content).map_err(|err| StoreError::Write {
            source: err,
            path: self.path.clone(),
        })?;
        debug!("saved {} record(s) to {:?}", self.records.len(), self.path.display());

        Ok(())
    }

    /// Record an installation, replacing any record for the same target.
    pub fn record_installation(&mut self, record: Record) {
        debug!(
            "record {:?} from {} ({})",
            record.target_path.display(),
            record.package_name,
            record.link_type
        );
        self.records.insert(record.target_path.clone(), record);
    }

    /// Drop record of a target path.
    pub fn remove_installation(&mut self, target: impl AsRef<Path>) -> Option<Record> {
        let target = target.as_ref();
        debug!("forget {:?}", target.display());
        self.records.remove(target)
    }

    /// Record for a target path.
    pub fn find(&self, target: impl AsRef<Path>) -> Option<&Record> {
        self.records.get(target.as_ref())
    }

    /// All records sorted by target path.
    pub fn all(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Records of a package sorted by target path.
    pub fn installations(&self, package: &PackageId) -> Vec<&Record> {
        self.all()
            .filter(|record| record.belongs_to(package))
            .collect()
    }

    /// Every installed package sorted by name.
    pub fn packages(&self) -> Vec<PackageSummary> {
        let mut summaries: BTreeMap<(String, PathBuf), PackageSummary> = BTreeMap::new();
        for record in self.all() {
            let key = (record.package_name.clone(), record.package_root.clone());
            summaries
                .entry(key)
                .and_modify(|summary| {
                    summary.file_count += 1;
                    summary.latest_install = summary.latest_install.max(record.installed_at);
                })
                .or_insert_with(|| PackageSummary {
                    package: record.package(),
                    file_count: 1,
                    latest_install: record.installed_at,
                });
        }

        summaries.into_values().collect()
    }

    /// Package has at least one record.
    pub fn package_exists(&self, package: &PackageId) -> bool {
        self.all().any(|record| record.belongs_to(package))
    }

    /// Compare records of a package with the file system.
    ///
    /// A dangling symlink counts as missing.
    pub fn verify(&self, package: &PackageId) -> Vec<Issue> {
        let mut issues = Vec::new();
        for record in self.installations(package) {
            let target = &record.target_path;
            let problem = if !target.exists() {
                Some(Problem::Missing)
            } else {
                let is_symlink = symlink_metadata(target)
                    .map(|metadata| metadata.file_type().is_symlink())
                    .unwrap_or(false);
                match record.link_type {
                    LinkType::File | LinkType::Directory if !is_symlink => {
                        Some(Problem::NotASymlink)
                    }
                    LinkType::CreatedDir if is_symlink || !target.is_dir() => {
                        Some(Problem::NotADirectory)
                    }
                    _ => None,
                }
            };

            if let Some(problem) = problem {
                issues.push(Issue {
                    target_path: target.clone(),
                    link_type: record.link_type,
                    problem,
                });
            }
        }

        issues
    }

    /// Records of a package whose target no longer exists.
    pub fn orphaned(&self, package: &PackageId) -> Vec<&Record> {
        self.installations(package)
            .into_iter()
            .filter(|record| !record.target_path.exists())
            .collect()
    }

    /// Drop records of a package whose target no longer exists.
    ///
    /// Returns the dropped records.
    pub fn clean_orphaned(&mut self, package: &PackageId) -> Vec<Record> {
        let targets = self
            .orphaned(package)
            .into_iter()
            .map(|record| record.target_path.clone())
            .collect::<Vec<_>>();

        let removed = targets
            .iter()
            .filter_map(|target| self.records.remove(target))
            .collect::<Vec<_>>();
        for record in &removed {
            info!("removed orphaned record {:?}", record.target_path.display());
        }

        removed
    }
}

impl OwnershipLookup for Store {
    fn owner_of(&self, target: &Path) -> Option<PackageId> {
        self.find(target)
            .filter(|record| record.link_type.is_link())
            .map(Record::package)
    }
}

/// Record store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store file cannot be read.
    #[error("failed to read record store at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store file cannot be written.
    #[error("failed to write record store at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory for store file cannot be created.
    #[error("failed to create directory {:?} for record store", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store file is malformed.
    #[error("malformed record store at {:?}", path.display())]
    Deserialize {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    /// Records cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;
