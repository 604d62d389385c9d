// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plan execution.
//!
//! The executor is the only part of dotx that changes the file system. It
//! applies install and uninstall plans one step at a time in plan order, and
//! keeps the record store in sync with every change it makes.
//!
//! # Dry Runs
//!
//! In dry-run mode nothing is touched. Instead, the executor writes the shell
//! commands that would have the same effect, e.g., `ln -s` and `mkdir`, so the
//! user can inspect or replay them.

use crate::{
    package::PackageId,
    plan::{links_to, probe, uninstall::UninstallAction, Action, Found, Plan, UninstallPlan},
    store::{LinkType, Record, Store},
};

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir, remove_dir, remove_file},
    io::{stdout, Stdout, Write},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Counts of what an execution did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub linked: usize,
    pub created: usize,
    pub unlinked: usize,
    pub removed_dirs: usize,
    pub forgotten: usize,
    pub kept: usize,
}

impl Summary {
    /// Add counts of another summary.
    pub fn merge(&mut self, other: Summary) {
        self.linked += other.linked;
        self.created += other.created;
        self.unlinked += other.unlinked;
        self.removed_dirs += other.removed_dirs;
        self.forgotten += other.forgotten;
        self.kept += other.kept;
    }
}

impl Display for Summary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let parts = [
            (self.linked, "linked"),
            (self.created, "created"),
            (self.unlinked, "unlinked"),
            (self.removed_dirs, "removed"),
            (self.forgotten, "forgotten"),
            (self.kept, "kept"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect::<Vec<_>>();

        if parts.is_empty() {
            fmt.write_str("nothing to do")
        } else {
            fmt.write_str(&parts.join(", "))
        }
    }
}

/// Apply plans to the file system.
///
/// Dry-run commands and verbose listings are written to the output, which is
/// standard output unless told otherwise.
#[derive(Debug)]
pub struct Executor<'s, W = Stdout>
where
    W: Write,
{
    store: &'s mut Store,
    out: W,
    dry_run: bool,
    verbose: bool,
}

impl<'s> Executor<'s, Stdout> {
    pub fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            out: stdout(),
            dry_run: false,
            verbose: false,
        }
    }
}

impl<'s, W> Executor<'s, W>
where
    W: Write,
{
    /// Write dry-run commands and verbose listings somewhere else.
    pub fn with_output<O>(self, out: O) -> Executor<'s, O>
    where
        O: Write,
    {
        Executor {
            store: self.store,
            out,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }

    /// Print shell commands instead of touching anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// List every target instead of showing a progress bar.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Apply install plan.
    ///
    /// Already satisfied steps are left alone, so applying the same plan
    /// twice is harmless.
    ///
    /// # Errors
    ///
    /// - Return [`ExecuteError::CreateDir`] if a directory cannot be created.
    /// - Return [`ExecuteError::Link`] if a symlink cannot be created.
    /// - Return [`ExecuteError::Output`] if output cannot be written.
    /// - Return [`ExecuteError::Progress`] if the progress bar is malformed.
    #[instrument(skip(self, plan), fields(package = %plan.package()), level = "debug")]
    pub fn apply(&mut self, plan: &Plan) -> Result<Summary> {
        let work = plan.count(Action::Create) + plan.count(Action::Link);
        let bar = self.progress_bar(work, plan.package().to_string())?;
        let mut summary = Summary::default();

        for entry in plan.entries() {
            let Some(source) = entry.source.as_deref() else {
                continue;
            };

            match entry.action {
                Action::Create => {
                    self.create(&entry.target)?;
                    self.remember(plan, &entry.target, LinkType::CreatedDir);
                    summary.created += 1;
                }
                Action::Link => {
                    self.link(source, &entry.target)?;
                    let link_type = if source.is_dir() {
                        LinkType::Directory
                    } else {
                        LinkType::File
                    };
                    self.remember(plan, &entry.target, link_type);
                    summary.linked += 1;
                }
                Action::Exists | Action::Skip => continue,
            }

            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        info!("installed {}: {summary}", plan.package());

        Ok(summary)
    }

    /// Apply every install plan of a batch.
    ///
    /// A plan that fails does not stop the rest. Whatever was applied before
    /// a failure, including the finished steps of the failing plan itself,
    /// stays recorded in the store.
    pub fn apply_all<'p>(
        &mut self,
        plans: impl IntoIterator<Item = &'p Plan>,
    ) -> (Summary, Vec<(PackageId, ExecuteError)>) {
        let mut summary = Summary::default();
        let mut failures = Vec::new();
        for plan in plans {
            match self.apply(plan) {
                Ok(done) => summary.merge(done),
                Err(err) => failures.push((plan.package().clone(), err)),
            }
        }

        (summary, failures)
    }

    /// Apply uninstall plan.
    ///
    /// # Errors
    ///
    /// - Return [`ExecuteError::Remove`] if a symlink or directory cannot be
    ///   removed.
    /// - Return [`ExecuteError::Output`] if output cannot be written.
    /// - Return [`ExecuteError::Progress`] if the progress bar is malformed.
    #[instrument(skip(self, plan), fields(package = %plan.package()), level = "debug")]
    pub fn unapply(&mut self, plan: &UninstallPlan) -> Result<Summary> {
        let work = plan.count(&UninstallAction::Unlink) + plan.count(&UninstallAction::RemoveDir);
        let bar = self.progress_bar(work, plan.package().to_string())?;
        let mut summary = Summary::default();

        for step in plan.steps() {
            match &step.action {
                UninstallAction::Unlink => {
                    self.remove("rm", &step.target, |path| remove_file(path))?;
                    summary.unlinked += 1;
                }
                UninstallAction::RemoveDir => {
                    self.remove("rmdir", &step.target, |path| remove_dir(path))?;
                    summary.removed_dirs += 1;
                }
                UninstallAction::Forget => {
                    if !self.dry_run {
                        self.store.remove_installation(&step.target);
                    }
                    summary.forgotten += 1;
                    continue;
                }
                UninstallAction::Keep(reason) => {
                    warn!("keep {:?}: {reason}", step.target.display());
                    summary.kept += 1;
                    continue;
                }
            }

            if !self.dry_run {
                self.store.remove_installation(&step.target);
            }

            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        info!("uninstalled {}: {summary}", plan.package());

        Ok(summary)
    }

    /// Apply every uninstall plan of a batch.
    ///
    /// Same failure handling as [`Executor::apply_all`].
    pub fn unapply_all<'p>(
        &mut self,
        plans: impl IntoIterator<Item = &'p UninstallPlan>,
    ) -> (Summary, Vec<(PackageId, ExecuteError)>) {
        let mut summary = Summary::default();
        let mut failures = Vec::new();
        for plan in plans {
            match self.unapply(plan) {
                Ok(done) => summary.merge(done),
                Err(err) => failures.push((plan.package().clone(), err)),
            }
        }

        (summary, failures)
    }

    fn progress_bar(&mut self, work: usize, message: String) -> Result<Option<ProgressBar>> {
        if self.dry_run || self.verbose || work == 0 {
            return Ok(None);
        }

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<30}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(work as u64);
        bar.set_style(style);
        bar.set_message(message);

        Ok(Some(bar))
    }

    fn create(&mut self, target: &Path) -> Result<()> {
        if self.dry_run {
            writeln!(self.out, "mkdir {:?}", target.display())?;
            return Ok(());
        }

        if self.verbose {
            writeln!(self.out, "  {}/", target.display())?;
        }

        if target.is_dir() && !target.is_symlink() {
            debug!("directory {:?} already exists", target.display());
            return Ok(());
        }

        create_dir(target).map_err(|err| ExecuteError::CreateDir {
            source: err,
            path: target.to_path_buf(),
        })
    }

    fn link(&mut self, source: &Path, target: &Path) -> Result<()> {
        if self.dry_run {
            writeln!(self.out, "ln -s {:?} {:?}", source.display(), target.display())?;
            return Ok(());
        }

        if self.verbose {
            writeln!(self.out, "  {}", target.display())?;
        }

        if let Ok(Some(Found::Symlink(dest))) = probe(target) {
            if links_to(target, &dest, source) {
                debug!("{:?} already linked", target.display());
                return Ok(());
            }
        }

        symlink(source, target).map_err(|err| ExecuteError::Link {
            source: err,
            path: target.to_path_buf(),
        })
    }

    fn remove(
        &mut self,
        command: &str,
        target: &Path,
        remover: fn(&Path) -> std::io::Result<()>,
    ) -> Result<()> {
        if self.dry_run {
            writeln!(self.out, "{command} {:?}", target.display())?;
            return Ok(());
        }

        if self.verbose {
            writeln!(self.out, "  {}", target.display())?;
        }

        remover(target).map_err(|err| ExecuteError::Remove {
            source: err,
            path: target.to_path_buf(),
        })
    }

    fn remember(&mut self, plan: &Plan, target: &Path, link_type: LinkType) {
        if self.dry_run {
            return;
        }

        self.store.record_installation(Record::new(
            plan.package(),
            plan.source_root(),
            target,
            link_type,
        ));
    }
}

/// Execution error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be created.
    #[error("failed to create symlink {:?}", path.display())]
    Link {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink or directory cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Dry-run or verbose output cannot be written.
    #[error(transparent)]
    Output(#[from] std::io::Error),

    /// Progress bar template is malformed.
    #[error(transparent)]
    Progress(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
type Result<T, E = ExecuteError> = std::result::Result<T, E>;
