// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use dotx::{
    executor::{Executor, Summary},
    matcher::{Builtins, RuleSources},
    package::Package,
    plan::{Plan, PlanBuilder, PlanIndex},
    store::Store,
};
use std::{
    env::current_dir,
    fs::{canonicalize, create_dir_all, write},
    path::{Path, PathBuf},
};

/// Dotfile packages and a target home inside the working directory of a
/// sealed test.
pub(crate) struct FarmFixture {
    root: PathBuf,
}

impl FarmFixture {
    pub(crate) fn new() -> Result<Self> {
        // INVARIANT: Temporary directory may live behind a symlink.
        let root = canonicalize(current_dir()?)?;
        create_dir_all(root.join("home"))?;
        create_dir_all(root.join("dotfiles"))?;
        Ok(Self { root })
    }

    pub(crate) fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub(crate) fn home(&self) -> PathBuf {
        self.path("home")
    }

    pub(crate) fn package(&self, name: &str) -> PathBuf {
        self.path("dotfiles").join(name)
    }

    pub(crate) fn store_path(&self) -> PathBuf {
        self.path("data/installed.toml")
    }

    pub(crate) fn file(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(&path, contents)?;
        Ok(path)
    }

    /// Plan packages as one batch against the records of the store.
    pub(crate) fn plan(
        &self,
        names: &[&str],
        sources: &RuleSources,
        store: &Store,
    ) -> Result<Vec<Plan>> {
        let builtins = Builtins::new();
        let builder = PlanBuilder::new(&builtins, sources).with_lookup(store);
        let mut index = PlanIndex::new();
        let mut plans = Vec::new();
        for name in names {
            let package = Package::new(self.package(name), Some(&self.path("dotfiles")))?;
            let plan = builder.build(&package, &self.home(), &index)?;
            index.absorb(&plan);
            plans.push(plan);
        }

        Ok(plans)
    }

    /// Plan and apply packages, then save the store.
    pub(crate) fn install(&self, names: &[&str], sources: &RuleSources) -> Result<Summary> {
        let mut store = Store::open(self.store_path())?;
        let plans = self.plan(names, sources, &store)?;

        let mut summary = Summary::default();
        let mut executor = Executor::new(&mut store).with_output(Vec::new());
        for plan in &plans {
            summary.merge(executor.apply(plan)?);
        }
        store.save()?;

        Ok(summary)
    }
}
