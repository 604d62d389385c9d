// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link farm planning engine for dotfiles.
//!
//! A __package__ is a directory whose contents get installed as a unit into a
//! __target__ directory, usually the user's home. Installing mirrors the
//! package into the target as a tree of symbolic links, i.e., a __link
//! farm__. Names starting with `dot-` are installed with a leading `.`
//! instead, so `bash/dot-bashrc` becomes `~/.bashrc`.
//!
//! # Planning Before Doing
//!
//! Nothing touches the file system until a whole package has been planned.
//! The [`PlanBuilder`] decides what every source path turns into, honoring
//! gitignore style ignore patterns and always-create patterns that force a
//! real directory where a symlink would otherwise go. Plans that would
//! clobber something are rejected as a whole. The [`Executor`] then applies
//! a finished plan, and keeps every change in the installation record
//! [`Store`].
//!
//! # See Also
//!
//! 1. [GNU Stow](https://www.gnu.org/software/stow/manual/stow.html)
//! 2. [gitignore](https://git-scm.com/docs/gitignore)
//!
//! [`PlanBuilder`]: crate::plan::PlanBuilder
//! [`Executor`]: crate::executor::Executor
//! [`Store`]: crate::store::Store

pub mod config;
pub mod executor;
pub mod matcher;
pub mod package;
pub mod path;
pub mod plan;
pub mod store;
pub mod sync;

#[cfg(test)]
mod fixture;
