// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::FarmFixture;

use anyhow::Result;
use dotx::{
    matcher::RuleSources,
    plan::{Action, Found, ObjectKind, PlanError},
    store::{LinkType, Store},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{read_link, remove_file},
    os::unix::fs::symlink,
};

#[sealed_test]
fn install_shared_config_directory() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/app1/dot-config/app1/config", "one")?;
    farm.file("dotfiles/app2/dot-config/app2/config", "two")?;
    farm.file("dotfiles/bash/dot-bashrc", "export EDITOR=vi")?;

    let summary = farm.install(&["app1", "app2", "bash"], &RuleSources::default())?;
    assert_eq!(summary.linked, 3);

    let home = farm.home();
    assert!(home.join(".config").is_dir());
    assert!(!home.join(".config").is_symlink());
    assert_eq!(
        read_link(home.join(".config/app1"))?,
        farm.package("app1").join("dot-config/app1")
    );
    assert_eq!(
        read_link(home.join(".config/app2"))?,
        farm.package("app2").join("dot-config/app2")
    );
    assert_eq!(
        read_link(home.join(".bashrc"))?,
        farm.package("bash").join("dot-bashrc")
    );

    let store = Store::open(farm.store_path())?;
    let record = store.find(home.join(".bashrc")).unwrap();
    assert_eq!(record.package_name, "bash");
    assert_eq!(record.link_type, LinkType::File);
    assert_eq!(
        store.find(home.join(".config")).map(|record| record.link_type),
        Some(LinkType::CreatedDir)
    );

    Ok(())
}

#[sealed_test]
fn replanning_installed_packages_changes_nothing() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/app1/dot-config/app1/config", "one")?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.install(&["app1", "bash"], &RuleSources::default())?;

    let store = Store::open(farm.store_path())?;
    let plans = farm.plan(&["app1", "bash"], &RuleSources::default(), &store)?;
    for plan in &plans {
        assert!(plan
            .entries()
            .all(|entry| matches!(entry.action, Action::Link | Action::Exists)));
    }

    farm.install(&["app1", "bash"], &RuleSources::default())?;
    assert_eq!(
        read_link(farm.home().join(".bashrc"))?,
        farm.package("bash").join("dot-bashrc")
    );

    Ok(())
}

#[sealed_test]
fn reinstall_keeps_link_made_through_symlinked_package_root() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    symlink(farm.path("dotfiles"), farm.path("linked"))?;
    let existing = farm.path("linked/bash/dot-bashrc");
    symlink(&existing, farm.home().join(".bashrc"))?;

    let summary = farm.install(&["bash"], &RuleSources::default())?;
    assert_eq!(summary.linked, 1);
    assert_eq!(read_link(farm.home().join(".bashrc"))?, existing);

    let store = Store::open(farm.store_path())?;
    assert_eq!(
        store.find(farm.home().join(".bashrc")).map(|record| record.link_type),
        Some(LinkType::File)
    );

    Ok(())
}

#[sealed_test]
fn renamed_file_inside_plain_directory_gets_its_dot() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/app/SIMPLE-DIR/dot-SIMPLE-FILE", "")?;

    let summary = farm.install(&["app"], &RuleSources::default())?;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.linked, 1);

    let dir = farm.home().join("SIMPLE-DIR");
    assert!(dir.is_dir());
    assert!(!dir.is_symlink());
    assert_eq!(
        read_link(dir.join(".SIMPLE-FILE"))?,
        farm.package("app").join("SIMPLE-DIR/dot-SIMPLE-FILE")
    );
    assert!(!dir.join("dot-SIMPLE-FILE").exists());

    Ok(())
}

#[sealed_test]
fn package_ignore_file_negates_global_pattern() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/tool/dot-toolrc", "")?;
    farm.file("dotfiles/tool/debug.log", "")?;
    farm.file("dotfiles/tool/important.log", "")?;
    farm.file("dotfiles/tool/.dotxignore", "!important.log\n")?;

    let sources = RuleSources::default().with_extra_ignores(["*.log"]);
    farm.install(&["tool"], &sources)?;

    let home = farm.home();
    assert!(home.join(".toolrc").is_symlink());
    assert!(home.join("important.log").is_symlink());
    assert!(!home.join("debug.log").exists());
    assert!(!home.join(".dotxignore").exists());

    Ok(())
}

#[sealed_test]
fn existing_file_blocks_package() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.file("dotfiles/bash/dot-inputrc", "")?;
    farm.file("home/.bashrc", "hand written")?;

    let error = farm
        .install(&["bash"], &RuleSources::default())
        .unwrap_err();
    let Some(PlanError::Blocked { obstructions, .. }) = error.downcast_ref::<PlanError>() else {
        panic!("expected blocked plan, got {error:?}");
    };
    assert_eq!(obstructions.len(), 1);
    assert_eq!(obstructions[0].target, farm.home().join(".bashrc"));
    assert_eq!(obstructions[0].expected, ObjectKind::File);
    assert_eq!(obstructions[0].found, Found::File);

    // INVARIANT: Blocked packages leave the target untouched.
    assert!(!farm.home().join(".inputrc").exists());

    Ok(())
}

#[sealed_test]
fn recorded_target_of_other_package_is_refused() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.file("dotfiles/bash-work/dot-bashrc", "")?;
    farm.install(&["bash"], &RuleSources::default())?;
    remove_file(farm.home().join(".bashrc"))?;

    let error = farm
        .install(&["bash-work"], &RuleSources::default())
        .unwrap_err();
    let Some(PlanError::AmbiguousOwnership { owner, package, .. }) =
        error.downcast_ref::<PlanError>()
    else {
        panic!("expected ownership conflict, got {error:?}");
    };
    assert_eq!(owner.package_name, "bash");
    assert_eq!(package.package_name, "bash-work");

    Ok(())
}
