// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Uninstall planning.
//!
//! Uninstalling is driven by installation records, not by walking the
//! package. That way a package can be removed even after its source directory
//! changed or vanished, and dotx only ever touches what it placed itself.

use crate::{
    package::PackageId,
    plan::{probe, Found, PlanError, Result},
    store::{LinkType, Record},
};

use std::{
    cmp::Reverse,
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{canonicalize, read_dir},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Why a record is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    /// Target is occupied by something dotx did not place.
    Foreign(Found),

    /// Created directory still holds objects that are not being removed.
    InUse,
}

impl Display for KeepReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Foreign(found) => write!(fmt, "target is a {found} not placed by dotx"),
            Self::InUse => fmt.write_str("directory is still in use"),
        }
    }
}

/// What to do with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallAction {
    /// Remove symlink and its record.
    Unlink,

    /// Remove empty created directory and its record.
    RemoveDir,

    /// Drop stale record of a target that no longer exists.
    Forget,

    /// Leave target and record untouched.
    Keep(KeepReason),
}

impl Display for UninstallAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Unlink => fmt.write_str("unlink"),
            Self::RemoveDir => fmt.write_str("remove directory"),
            Self::Forget => fmt.write_str("forget"),
            Self::Keep(reason) => write!(fmt, "keep, {reason}"),
        }
    }
}

/// Decision for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallStep {
    pub target: PathBuf,
    pub link_type: LinkType,
    pub action: UninstallAction,
}

/// Uninstallation plan of one package.
///
/// # Invariant
///
/// - Unlinks come first, then directory removals deepest first, then
///   forgotten records. Kept records trail at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallPlan {
    package: PackageId,
    steps: Vec<UninstallStep>,
}

impl UninstallPlan {
    /// Plan removal of every recorded installation of a package.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::Traversal`] if a target cannot be inspected.
    #[instrument(skip(package, records), fields(package = %package), level = "debug")]
    pub fn build<'r>(
        package: &PackageId,
        records: impl IntoIterator<Item = &'r Record>,
    ) -> Result<Self> {
        let mut unlinks = Vec::new();
        let mut removals = Vec::new();
        let mut forgets = Vec::new();
        let mut keeps = Vec::new();
        let mut created_dirs = Vec::new();
        let mut removed = BTreeSet::new();

        for record in records.into_iter().filter(|record| record.belongs_to(package)) {
            if record.link_type == LinkType::CreatedDir {
                created_dirs.push(record);
                continue;
            }

            let target = record.target_path.clone();
            match inspect(&target)? {
                None => forgets.push(step(record, UninstallAction::Forget)),
                Some(Found::Symlink(dest)) if points_into(&target, &dest, &record.source_package_root) => {
                    removed.insert(target);
                    unlinks.push(step(record, UninstallAction::Unlink));
                }
                Some(found) => keeps.push(step(record, keep(found))),
            }
        }

        // INVARIANT: Children must be decided before their parents.
        created_dirs.sort_by_key(|record| {
            Reverse((
                record.target_path.components().count(),
                record.target_path.clone(),
            ))
        });

        for record in created_dirs {
            let target = record.target_path.clone();
            match inspect(&target)? {
                None => forgets.push(step(record, UninstallAction::Forget)),
                Some(Found::Directory) => {
                    if only_holds(&target, &removed)? {
                        removed.insert(target);
                        removals.push(step(record, UninstallAction::RemoveDir));
                    } else {
                        keeps.push(step(record, UninstallAction::Keep(KeepReason::InUse)));
                    }
                }
                Some(found) => keeps.push(step(record, keep(found))),
            }
        }

        let mut steps = unlinks;
        steps.extend(removals);
        steps.extend(forgets);
        steps.extend(keeps);
        debug!("planned {} uninstall step(s)", steps.len());

        Ok(Self {
            package: package.clone(),
            steps,
        })
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[UninstallStep] {
        &self.steps
    }

    pub fn count(&self, action: &UninstallAction) -> usize {
        self.steps.iter().filter(|step| &step.action == action).count()
    }

    /// Steps that leave a record behind.
    pub fn kept(&self) -> impl Iterator<Item = &UninstallStep> {
        self.steps
            .iter()
            .filter(|step| matches!(step.action, UninstallAction::Keep(_)))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn step(record: &Record, action: UninstallAction) -> UninstallStep {
    UninstallStep {
        target: record.target_path.clone(),
        link_type: record.link_type,
        action,
    }
}

fn keep(found: Found) -> UninstallAction {
    UninstallAction::Keep(KeepReason::Foreign(found))
}

fn inspect(target: &Path) -> Result<Option<Found>> {
    probe(target).map_err(|err| PlanError::Traversal {
        source: err,
        path: target.to_path_buf(),
    })
}

/// Symlink destination lies inside the package source directory.
fn points_into(target: &Path, dest: &Path, source_root: &Path) -> bool {
    if dest.starts_with(source_root) {
        return true;
    }

    match (canonicalize(target), canonicalize(source_root)) {
        (Ok(target), Ok(source_root)) => target.starts_with(source_root),
        _ => false,
    }
}

/// Every child of a directory is about to be removed.
fn only_holds(dir: &Path, removed: &BTreeSet<PathBuf>) -> Result<bool> {
    let traversal = |err: std::io::Error| PlanError::Traversal {
        source: err,
        path: dir.to_path_buf(),
    };

    for entry in read_dir(dir).map_err(traversal)? {
        if !removed.contains(&entry.map_err(traversal)?.path()) {
            return Ok(false);
        }
    }

    Ok(true)
}
