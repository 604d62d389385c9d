// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Install plan construction.
//!
//! The builder walks a package depth-first with children in name order. For
//! every object it computes the target path through dot-rename, then decides
//! in this order:
//!
//! 1. Ignored objects are dropped, and ignored directories are not entered.
//! 2. Paths already claimed by an earlier package of the batch are shared if
//!    both sides are directories, and obstructed otherwise.
//! 3. Always-create directories become real directories.
//! 4. Everything else is linked if the target is free or already linked, is
//!    merged into an existing real directory, or is obstructed. An absent
//!    directory holding any `dot-` entry at any depth is created instead of
//!    linked, so the renamed names show up in the target.
//!
//! Every obstruction of the package is collected before the builder gives up,
//! so the user sees the whole list at once.

use crate::{
    matcher::{AlwaysCreateRules, Builtins, IgnoreRules, RuleSources},
    package::Package,
    path::dot_rename,
    plan::{
        links_to, probe, Action, Found, NoRecords, ObjectKind, Obstruction, OwnershipLookup, Plan,
        PlanEntry, PlanError, PlanIndex, Reason, Result,
    },
};

use std::{
    fs::{metadata, read_dir, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Build installation plans.
///
/// Holds everything that stays the same across the packages of a batch. The
/// ownership lookup defaults to [`NoRecords`], i.e., no installation records
/// are consulted.
#[derive(Debug, Clone)]
pub struct PlanBuilder<'a, L = NoRecords>
where
    L: OwnershipLookup,
{
    builtins: &'a Builtins,
    sources: &'a RuleSources,
    lookup: L,
}

impl<'a> PlanBuilder<'a, NoRecords> {
    pub fn new(builtins: &'a Builtins, sources: &'a RuleSources) -> Self {
        Self {
            builtins,
            sources,
            lookup: NoRecords,
        }
    }
}

impl<'a, L> PlanBuilder<'a, L>
where
    L: OwnershipLookup,
{
    /// Consult an ownership lookup before planning any link.
    pub fn with_lookup<M>(self, lookup: M) -> PlanBuilder<'a, M>
    where
        M: OwnershipLookup,
    {
        PlanBuilder {
            builtins: self.builtins,
            sources: self.sources,
            lookup,
        }
    }

    /// Build installation plan for a package into a target directory.
    ///
    /// Planning only reads the file system.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::Rules`] if pattern files cannot be gathered.
    /// - Return [`PlanError::Traversal`] if the package or the target cannot
    ///   be inspected.
    /// - Return [`PlanError::BrokenSymlink`] if the package holds a symlink
    ///   that points nowhere.
    /// - Return [`PlanError::AmbiguousOwnership`] if a target is installed by
    ///   another package.
    /// - Return [`PlanError::Blocked`] if any target path is obstructed.
    #[instrument(skip(self, package, index), fields(package = %package), level = "debug")]
    pub fn build(&self, package: &Package, target_root: &Path, index: &PlanIndex) -> Result<Plan> {
        let ignore = IgnoreRules::discover(package.source(), self.builtins, self.sources)?;
        let always_create = AlwaysCreateRules::load(package.source(), self.builtins, self.sources)?;

        let mut walk = Walk {
            package,
            target_root,
            index,
            lookup: &self.lookup,
            ignore: &ignore,
            always_create: &always_create,
            plan: Plan::new(package.id().clone(), package.source(), target_root),
            obstructions: Vec::new(),
        };
        walk.visit_children(Path::new(""), Path::new(""))?;

        let Walk {
            plan, obstructions, ..
        } = walk;

        if !obstructions.is_empty() {
            return Err(PlanError::Blocked {
                package: package.name().to_string(),
                obstructions,
            });
        }

        info!(
            "planned {package}: {} link(s), {} directory(ies) to create",
            plan.count(Action::Link),
            plan.count(Action::Create)
        );

        Ok(plan)
    }
}

struct Walk<'w, L>
where
    L: OwnershipLookup,
{
    package: &'w Package,
    target_root: &'w Path,
    index: &'w PlanIndex,
    lookup: &'w L,
    ignore: &'w IgnoreRules,
    always_create: &'w AlwaysCreateRules,
    plan: Plan,
    obstructions: Vec<Obstruction>,
}

impl<L> Walk<'_, L>
where
    L: OwnershipLookup,
{
    fn visit_children(&mut self, source_relative: &Path, target_relative: &Path) -> Result<()> {
        let dir = self.package.source().join(source_relative);
        let traversal = |err: std::io::Error| PlanError::Traversal {
            source: err,
            path: dir.clone(),
        };

        let mut names = Vec::new();
        for entry in read_dir(&dir).map_err(traversal)? {
            names.push(entry.map_err(traversal)?.file_name());
        }
        names.sort();

        for name in names {
            let child_target = target_relative.join(dot_rename(&name));
            let child_source = source_relative.join(name);
            self.visit(&child_source, &child_target)?;
        }

        Ok(())
    }

    fn visit(&mut self, source_relative: &Path, target_relative: &Path) -> Result<()> {
        let source = self.package.source().join(source_relative);
        let file_type = symlink_metadata(&source)
            .map_err(|err| PlanError::Traversal {
                source: err,
                path: source.clone(),
            })?
            .file_type();
        let kind = ObjectKind::from(file_type);
        let is_dir = kind == ObjectKind::Directory;

        if self.ignore.is_ignored(source_relative, is_dir) {
            return Ok(());
        }

        let target = self.target_root.join(target_relative);

        if kind == ObjectKind::Other {
            debug!("skip special file {:?}", source.display());
            self.record(target, Action::Skip, source, kind, Reason::Unsupported);
            return Ok(());
        }

        if kind == ObjectKind::Symlink {
            metadata(&source).map_err(|err| PlanError::BrokenSymlink {
                source: err,
                path: source.clone(),
            })?;
        }

        let prior = self
            .index
            .get(&target)
            .map(|prior| (prior.action, prior.package.package_name.clone()));
        if let Some((prior_action, prior_package)) = prior {
            match prior_action {
                Action::Create | Action::Exists if is_dir => {
                    let action = if self.always_create.is_always_create(target_relative, true)
                        && self.inspect(&target)?.is_none()
                    {
                        Action::Create
                    } else {
                        Action::Exists
                    };
                    let reason = Reason::SharedWith {
                        package: prior_package,
                    };
                    self.record(target, action, source, kind, reason);
                    return self.visit_children(source_relative, target_relative);
                }
                Action::Create | Action::Exists => {
                    self.obstruct(target, kind, Found::PlannedDirectory(prior_package));
                    return Ok(());
                }
                Action::Link | Action::Skip => {
                    self.obstruct(target, kind, Found::PlannedLink(prior_package));
                    return Ok(());
                }
            }
        }

        if is_dir {
            if let Some(pattern) = self.always_create.matching_pattern(target_relative, true) {
                let reason = Reason::AlwaysCreate {
                    pattern: pattern.raw().to_string(),
                };
                match self.inspect(&target)? {
                    None => self.record(target, Action::Create, source, kind, reason),
                    Some(Found::Directory) => {
                        self.record(target, Action::Exists, source, kind, reason)
                    }
                    Some(found) => {
                        self.obstruct(target, kind, found);
                        return Ok(());
                    }
                }

                return self.visit_children(source_relative, target_relative);
            }
        }

        match self.inspect(&target)? {
            None if is_dir && self.holds_renamed(source_relative)? => {
                self.record(target, Action::Create, source, kind, Reason::RenamedContents);
                self.visit_children(source_relative, target_relative)
            }
            None => self.link(target, source, kind, Reason::Absent),
            Some(Found::Directory) if is_dir => {
                self.record(target, Action::Exists, source, kind, Reason::ExistingDirectory);
                self.visit_children(source_relative, target_relative)
            }
            Some(Found::Symlink(dest)) if links_to(&target, &dest, &source) => {
                self.link(target, source, kind, Reason::AlreadyLinked)
            }
            Some(found) => {
                self.obstruct(target, kind, found);
                Ok(())
            }
        }
    }

    /// Directory has a non-ignored descendant whose name dot-rename changes.
    fn holds_renamed(&self, source_relative: &Path) -> Result<bool> {
        let dir = self.package.source().join(source_relative);
        let traversal = |err: std::io::Error| PlanError::Traversal {
            source: err,
            path: dir.clone(),
        };

        for entry in read_dir(&dir).map_err(traversal)? {
            let entry = entry.map_err(traversal)?;
            let name = entry.file_name();
            let child = source_relative.join(&name);
            let is_dir = entry.file_type().map_err(traversal)?.is_dir();
            if self.ignore.is_ignored(&child, is_dir) {
                continue;
            }

            if *dot_rename(&name) != *name || (is_dir && self.holds_renamed(&child)?) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn inspect(&self, target: &Path) -> Result<Option<Found>> {
        probe(target).map_err(|err| PlanError::Traversal {
            source: err,
            path: target.to_path_buf(),
        })
    }

    fn link(&mut self, target: PathBuf, source: PathBuf, kind: ObjectKind, reason: Reason) -> Result<()> {
        if let Some(owner) = self.lookup.owner_of(&target) {
            if &owner != self.package.id() {
                return Err(PlanError::AmbiguousOwnership {
                    target,
                    owner,
                    package: self.package.id().clone(),
                });
            }
        }

        self.record(target, Action::Link, source, kind, reason);
        Ok(())
    }

    fn record(&mut self, target: PathBuf, action: Action, source: PathBuf, kind: ObjectKind, reason: Reason) {
        debug!("{action} {:?} ({reason})", target.display());
        self.plan.insert(PlanEntry {
            target,
            action,
            source: Some(source),
            kind,
            reason,
        });
    }

    fn obstruct(&mut self, target: PathBuf, expected: ObjectKind, found: Found) {
        debug!("obstructed {:?} by {found}", target.display());
        self.obstructions.push(Obstruction {
            target,
            expected,
            found,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixture::Sandbox, package::PackageId};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::os::unix::net::UnixListener;

    fn build(package: &str, target: &Path, index: &PlanIndex) -> Result<Plan> {
        let builtins = Builtins::new();
        let sources = RuleSources::default();
        let package = Package::new(package, None)?;
        PlanBuilder::new(&builtins, &sources).build(&package, target, index)
    }

    fn actions(plan: &Plan, root: &Path) -> Vec<(String, Action)> {
        plan.entries()
            .map(|entry| {
                let relative = entry.target.strip_prefix(root).unwrap_or(&entry.target);
                (relative.to_string_lossy().into_owned(), entry.action)
            })
            .collect()
    }

    #[sealed_test]
    fn basic_install_links_renamed_file() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/bash/dot-bashrc", "")?;
        sandbox.file("dotfiles/bash/README", "")?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/bash", &home, &PlanIndex::new())?;
        assert_eq!(
            actions(&plan, &home),
            vec![
                (".bashrc".to_string(), Action::Link),
                ("README".to_string(), Action::Link),
            ]
        );

        let entry = plan.get(home.join(".bashrc")).unwrap();
        assert_eq!(entry.source, Some(sandbox.path("dotfiles/bash/dot-bashrc")));
        assert_eq!(entry.kind, ObjectKind::File);
        assert_eq!(entry.reason, Reason::Absent);

        Ok(())
    }

    #[sealed_test]
    fn absent_directory_links_whole_subtree() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/vim/dot-vim/colors/theme.vim", "")?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/vim", &home, &PlanIndex::new())?;
        assert_eq!(actions(&plan, &home), vec![(".vim".to_string(), Action::Link)]);

        Ok(())
    }

    #[sealed_test]
    fn directory_with_renamed_descendant_is_created() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/app/SIMPLE-DIR/dot-SIMPLE-FILE", "")?;
        sandbox.file("dotfiles/app/deep/plain/dot-theme", "")?;
        sandbox.file("dotfiles/app/deep/other/file", "")?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/app", &home, &PlanIndex::new())?;
        assert_eq!(
            actions(&plan, &home),
            vec![
                ("SIMPLE-DIR".to_string(), Action::Create),
                ("SIMPLE-DIR/.SIMPLE-FILE".to_string(), Action::Link),
                ("deep".to_string(), Action::Create),
                ("deep/other".to_string(), Action::Link),
                ("deep/plain".to_string(), Action::Create),
                ("deep/plain/.theme".to_string(), Action::Link),
            ]
        );
        assert_eq!(
            plan.get(home.join("SIMPLE-DIR")).unwrap().reason,
            Reason::RenamedContents
        );

        Ok(())
    }

    #[sealed_test]
    fn ignored_renamed_descendant_keeps_directory_linked() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/app/.dotxignore", "dot-scratch\n")?;
        sandbox.file("dotfiles/app/notes/dot-scratch", "")?;
        sandbox.file("dotfiles/app/notes/todo.md", "")?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/app", &home, &PlanIndex::new())?;
        assert_eq!(actions(&plan, &home), vec![("notes".to_string(), Action::Link)]);

        Ok(())
    }

    #[sealed_test]
    fn existing_directory_merges_children() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/vim/dot-vim/colors/theme.vim", "")?;
        sandbox.dir("home/.vim")?;
        let home = sandbox.path("home");

        let plan = build("dotfiles/vim", &home, &PlanIndex::new())?;
        assert_eq!(
            actions(&plan, &home),
            vec![
                (".vim".to_string(), Action::Exists),
                (".vim/colors".to_string(), Action::Link),
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn always_create_directory() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/nvim/dot-config/nvim/init.lua", "")?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/nvim", &home, &PlanIndex::new())?;
        assert_eq!(
            actions(&plan, &home),
            vec![
                (".config".to_string(), Action::Create),
                (".config/nvim".to_string(), Action::Link),
            ]
        );
        assert_eq!(
            plan.get(home.join(".config")).unwrap().reason,
            Reason::AlwaysCreate {
                pattern: "/.config/".to_string()
            }
        );

        sandbox.dir("home/.config")?;
        let plan = build("dotfiles/nvim", &home, &PlanIndex::new())?;
        assert_eq!(plan.get(home.join(".config")).unwrap().action, Action::Exists);

        Ok(())
    }

    #[sealed_test]
    fn ignored_objects_are_omitted() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/app/.dotxignore", "*.log\nnotes/\n")?;
        sandbox.file("dotfiles/app/dot-apprc", "")?;
        sandbox.file("dotfiles/app/debug.log", "")?;
        sandbox.file("dotfiles/app/notes/todo.md", "")?;
        sandbox.dir("dotfiles/app/.git")?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/app", &home, &PlanIndex::new())?;
        assert_eq!(actions(&plan, &home), vec![(".apprc".to_string(), Action::Link)]);

        Ok(())
    }

    #[sealed_test]
    fn reinstall_is_idempotent() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/bash/dot-bashrc", "")?;
        sandbox.link("home/.bashrc", sandbox.path("dotfiles/bash/dot-bashrc"))?;
        sandbox.link("home/.profile", "../dotfiles/bash/dot-profile")?;
        sandbox.file("dotfiles/bash/dot-profile", "")?;
        let home = sandbox.path("home");

        let plan = build("dotfiles/bash", &home, &PlanIndex::new())?;
        assert!(plan.entries().all(|entry| entry.action == Action::Link));
        assert!(plan.entries().all(|entry| entry.reason == Reason::AlreadyLinked));
        assert_eq!(plan.len(), 2);

        Ok(())
    }

    #[sealed_test]
    fn obstructions_are_collected() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/bash/dot-bashrc", "")?;
        sandbox.file("dotfiles/bash/dot-inputrc", "")?;
        sandbox.file("dotfiles/bash/dot-profile", "")?;
        sandbox.file("home/.bashrc", "mine")?;
        sandbox.link("home/.profile", "/somewhere/else")?;
        let home = sandbox.path("home");

        let result = build("dotfiles/bash", &home, &PlanIndex::new());
        let Err(PlanError::Blocked {
            package,
            obstructions,
        }) = result
        else {
            panic!("expected blocked plan");
        };

        assert_eq!(package, "bash");
        assert_eq!(
            obstructions,
            vec![
                Obstruction {
                    target: home.join(".bashrc"),
                    expected: ObjectKind::File,
                    found: Found::File,
                },
                Obstruction {
                    target: home.join(".profile"),
                    expected: ObjectKind::File,
                    found: Found::Symlink(PathBuf::from("/somewhere/else")),
                },
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn shared_directory_between_packages() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/app1/dot-config/app1/config", "")?;
        sandbox.file("dotfiles/app2/dot-config/app2/config", "")?;
        let home = sandbox.dir("home")?;

        let mut index = PlanIndex::new();
        let first = build("dotfiles/app1", &home, &index)?;
        index.absorb(&first);
        let second = build("dotfiles/app2", &home, &index)?;

        assert_eq!(
            actions(&first, &home),
            vec![
                (".config".to_string(), Action::Create),
                (".config/app1".to_string(), Action::Link),
            ]
        );
        assert_eq!(
            actions(&second, &home),
            vec![
                (".config".to_string(), Action::Create),
                (".config/app2".to_string(), Action::Link),
            ]
        );
        assert_eq!(
            second.get(home.join(".config")).unwrap().reason,
            Reason::SharedWith {
                package: "app1".to_string()
            }
        );

        Ok(())
    }

    #[sealed_test]
    fn planned_link_of_earlier_package_obstructs() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/one/dot-vimrc", "")?;
        sandbox.file("dotfiles/two/dot-vimrc", "")?;
        sandbox.file("dotfiles/two/dot-gvimrc", "")?;
        let home = sandbox.dir("home")?;

        let mut index = PlanIndex::new();
        index.absorb(&build("dotfiles/one", &home, &index)?);
        let result = build("dotfiles/two", &home, &index);

        let Err(PlanError::Blocked { obstructions, .. }) = result else {
            panic!("expected blocked plan");
        };
        assert_eq!(
            obstructions,
            vec![Obstruction {
                target: home.join(".vimrc"),
                expected: ObjectKind::File,
                found: Found::PlannedLink("one".to_string()),
            }]
        );

        Ok(())
    }

    #[sealed_test]
    fn special_files_are_skipped() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.dir("dotfiles/sock")?;
        let _listener = UnixListener::bind(sandbox.path("dotfiles/sock/agent"))?;
        let home = sandbox.dir("home")?;

        let plan = build("dotfiles/sock", &home, &PlanIndex::new())?;
        let entry = plan.get(home.join("agent")).unwrap();
        assert_eq!(entry.action, Action::Skip);
        assert_eq!(entry.kind, ObjectKind::Other);
        assert_eq!(entry.reason, Reason::Unsupported);

        Ok(())
    }

    #[sealed_test]
    fn broken_source_symlink_fails() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.link("dotfiles/broken/dot-gone", "nowhere")?;
        let home = sandbox.dir("home")?;

        let result = build("dotfiles/broken", &home, &PlanIndex::new());
        assert!(matches!(result, Err(PlanError::BrokenSymlink { .. })));

        Ok(())
    }

    struct OwnedBy(PackageId);

    impl OwnershipLookup for OwnedBy {
        fn owner_of(&self, _: &Path) -> Option<PackageId> {
            Some(self.0.clone())
        }
    }

    #[sealed_test]
    fn link_owned_by_other_package_fails() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.file("dotfiles/bash/dot-bashrc", "")?;
        let home = sandbox.dir("home")?;

        let builtins = Builtins::new();
        let sources = RuleSources::default();
        let package = Package::new("dotfiles/bash", None)?;

        let other = OwnedBy(PackageId::new(sandbox.path("dotfiles"), "zsh"));
        let result = PlanBuilder::new(&builtins, &sources)
            .with_lookup(&other)
            .build(&package, &home, &PlanIndex::new());
        assert!(matches!(result, Err(PlanError::AmbiguousOwnership { .. })));

        let same = OwnedBy(package.id().clone());
        let result = PlanBuilder::new(&builtins, &sources)
            .with_lookup(same)
            .build(&package, &home, &PlanIndex::new());
        assert!(result.is_ok());

        Ok(())
    }
}
