// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation planning.
//!
//! A __plan__ is the full list of decisions needed to install one package:
//! for every object of the package that is not ignored, which absolute target
//! path it maps to, and what should happen there. Plans are computed without
//! touching the file system, and are either complete or not produced at all.
//! Nothing is ever half installed because of a bad plan.
//!
//! # Actions
//!
//! - [`Action::Create`] makes a real directory at the target.
//! - [`Action::Link`] places a symlink at the target pointing to the source.
//!   Anything below a linked directory comes along for free, so a plan never
//!   holds entries below a link.
//! - [`Action::Exists`] means the target is already a real directory that
//!   the package's children can be placed into.
//! - [`Action::Skip`] marks source objects that cannot be installed, like
//!   sockets or named pipes.
//!
//! # Batches
//!
//! Installing several packages at once shares one [`PlanIndex`] between them.
//! Each successfully built plan is absorbed into the index, so later packages
//! see the directories and links that earlier packages are about to create.
//!
//! # See Also
//!
//! - [`install::PlanBuilder`]
//! - [`uninstall::UninstallPlan`]

pub mod install;
pub mod uninstall;

pub use install::PlanBuilder;
pub use uninstall::{KeepReason, UninstallAction, UninstallPlan, UninstallStep};

use crate::{
    matcher::PatternError,
    package::{PackageError, PackageId},
    path::resolve_link_target,
};

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{canonicalize, read_link, symlink_metadata, FileType},
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Type of file system object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    File,
    Directory,
    Symlink,

    /// Sockets, named pipes, and device files.
    Other,
}

impl From<FileType> for ObjectKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File => fmt.write_str("file"),
            Self::Directory => fmt.write_str("directory"),
            Self::Symlink => fmt.write_str("symlink"),
            Self::Other => fmt.write_str("special file"),
        }
    }
}

/// What to do at a target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Create,
    Link,
    Skip,
    Exists,
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Create => fmt.write_str("create"),
            Self::Link => fmt.write_str("link"),
            Self::Skip => fmt.write_str("skip"),
            Self::Exists => fmt.write_str("exists"),
        }
    }
}

/// Condition that produced an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Target does not exist yet.
    Absent,

    /// Target already links to the source.
    AlreadyLinked,

    /// Directory matched an always-create pattern.
    AlwaysCreate { pattern: String },

    /// Target is already a real directory.
    ExistingDirectory,

    /// Directory holds entries whose names change under dot-rename, so it
    /// cannot be linked as a whole.
    RenamedContents,

    /// Directory is shared with an earlier package of the same batch.
    SharedWith { package: String },

    /// Source object cannot be linked.
    Unsupported,
}

impl Display for Reason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Absent => fmt.write_str("target is absent"),
            Self::AlreadyLinked => fmt.write_str("already linked to source"),
            Self::AlwaysCreate { pattern } => write!(fmt, "always-create pattern {pattern:?}"),
            Self::ExistingDirectory => fmt.write_str("target is an existing directory"),
            Self::RenamedContents => fmt.write_str("holds renamed entries"),
            Self::SharedWith { package } => write!(fmt, "directory shared with package {package}"),
            Self::Unsupported => fmt.write_str("unsupported file type"),
        }
    }
}

/// Decision for one target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Absolute target path.
    pub target: PathBuf,

    pub action: Action,

    /// Absolute source path inside the package.
    pub source: Option<PathBuf>,

    /// Type of the source object.
    pub kind: ObjectKind,

    pub reason: Reason,
}

impl Display for PlanEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} {:?} ({})",
            self.action,
            self.target.display(),
            self.reason
        )
    }
}

/// Installation plan of one package.
///
/// # Invariant
///
/// - A target path appears at most once.
/// - Entries iterate in path order, so parents come before children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    package: PackageId,
    source_root: PathBuf,
    target_root: PathBuf,
    entries: BTreeMap<PathBuf, PlanEntry>,
}

impl Plan {
    pub(crate) fn new(
        package: PackageId,
        source_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package,
            source_root: source_root.into(),
            target_root: target_root.into(),
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, entry: PlanEntry) {
        self.entries.insert(entry.target.clone(), entry);
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    /// Canonical package source directory the plan was built from.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn get(&self, target: impl AsRef<Path>) -> Option<&PlanEntry> {
        self.entries.get(target.as_ref())
    }

    /// Iterate entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.values()
    }

    /// Iterate entries with a given action in path order.
    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &PlanEntry> {
        self.entries().filter(move |entry| entry.action == action)
    }

    pub fn count(&self, action: Action) -> usize {
        self.with_action(action).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Earlier decision about a target path within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub action: Action,
    pub package: PackageId,
}

/// Decisions of all plans built so far in a batch.
#[derive(Debug, Clone, Default)]
pub struct PlanIndex {
    entries: BTreeMap<PathBuf, IndexEntry>,
}

impl PlanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the decisions of a successfully built plan.
    ///
    /// The first package to claim a target path keeps it. Skipped entries
    /// claim nothing.
    pub fn absorb(&mut self, plan: &Plan) {
        for entry in plan.entries().filter(|entry| entry.action != Action::Skip) {
            self.entries
                .entry(entry.target.clone())
                .or_insert_with(|| IndexEntry {
                    action: entry.action,
                    package: plan.package().clone(),
                });
        }
    }

    pub fn get(&self, target: impl AsRef<Path>) -> Option<&IndexEntry> {
        self.entries.get(target.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Look up which package already owns an installed link.
pub trait OwnershipLookup {
    /// Package owning a link at the target path, if any.
    fn owner_of(&self, target: &Path) -> Option<PackageId>;
}

impl<T> OwnershipLookup for &T
where
    T: OwnershipLookup + ?Sized,
{
    fn owner_of(&self, target: &Path) -> Option<PackageId> {
        (**self).owner_of(target)
    }
}

/// Ownership lookup that knows about no installations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecords;

impl OwnershipLookup for NoRecords {
    fn owner_of(&self, _: &Path) -> Option<PackageId> {
        None
    }
}

/// What occupies a target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    File,
    Directory,

    /// Symlink with its resolved destination.
    Symlink(PathBuf),

    /// Link planned by an earlier package of the batch.
    PlannedLink(String),

    /// Directory planned by an earlier package of the batch.
    PlannedDirectory(String),

    /// Special file.
    Other,
}

impl Found {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::File => ObjectKind::File,
            Self::Directory | Self::PlannedDirectory(_) => ObjectKind::Directory,
            Self::Symlink(_) | Self::PlannedLink(_) => ObjectKind::Symlink,
            Self::Other => ObjectKind::Other,
        }
    }
}

impl Display for Found {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File => fmt.write_str("file"),
            Self::Directory => fmt.write_str("directory"),
            Self::Symlink(dest) => write!(fmt, "symlink to {:?}", dest.display()),
            Self::PlannedLink(package) => write!(fmt, "link planned by package {package}"),
            Self::PlannedDirectory(package) => {
                write!(fmt, "directory planned by package {package}")
            }
            Self::Other => fmt.write_str("special file"),
        }
    }
}

/// Inspect what occupies a path without following a final symlink.
///
/// Returns `Ok(None)` if nothing is there.
///
/// # Errors
///
/// - Return [`std::io::Error`] if the path cannot be inspected.
pub(crate) fn probe(path: &Path) -> std::io::Result<Option<Found>> {
    let metadata = match symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    let found = match ObjectKind::from(metadata.file_type()) {
        ObjectKind::File => Found::File,
        ObjectKind::Directory => Found::Directory,
        ObjectKind::Symlink => Found::Symlink(resolve_link_target(path, &read_link(path)?)),
        ObjectKind::Other => Found::Other,
    };

    Ok(Some(found))
}

/// Symlink at target, pointing at dest, already resolves to the source.
///
/// Compares canonical paths as well, so a link made through a symlinked
/// package directory still counts.
pub(crate) fn links_to(target: &Path, dest: &Path, source: &Path) -> bool {
    if dest == source {
        return true;
    }

    match (canonicalize(target), canonicalize(source)) {
        (Ok(target), Ok(source)) => target == source,
        _ => false,
    }
}

/// Target path that blocks a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obstruction {
    pub target: PathBuf,

    /// Type of the source object that wanted the path.
    pub expected: ObjectKind,

    pub found: Found,
}

impl Display for Obstruction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{:?}: expected {}, found {}",
            self.target.display(),
            self.expected,
            self.found
        )
    }
}

/// Planning error types.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Package cannot be opened.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Pattern files cannot be gathered.
    #[error(transparent)]
    Rules(#[from] PatternError),

    /// Part of the package or target cannot be inspected.
    #[error("failed to traverse {:?}", path.display())]
    Traversal {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink inside the package points nowhere.
    #[error("broken symlink in package at {:?}", path.display())]
    BrokenSymlink {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target is already installed by another package.
    #[error("{:?} is already installed by package {owner}, not {package}", target.display())]
    AmbiguousOwnership {
        target: PathBuf,
        owner: PackageId,
        package: PackageId,
    },

    /// Target paths are occupied by things the plan may not replace.
    #[error("cannot install package {package}, {} target path(s) obstructed", obstructions.len())]
    Blocked {
        package: String,
        obstructions: Vec<Obstruction>,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PlanError> = std::result::Result<T, E>;
