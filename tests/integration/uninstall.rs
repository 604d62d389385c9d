// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::FarmFixture;

use anyhow::Result;
use dotx::{
    executor::Executor,
    matcher::RuleSources,
    package::PackageId,
    plan::{KeepReason, UninstallAction, UninstallPlan},
    store::Store,
};
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;

fn uninstall(farm: &FarmFixture, name: &str, dry_run: bool) -> Result<(UninstallPlan, String)> {
    let mut store = Store::open(farm.store_path())?;
    let package = PackageId::resolve(farm.package(name), None)?;
    let plan = UninstallPlan::build(&package, store.installations(&package))?;

    let mut executor = Executor::new(&mut store)
        .with_output(Vec::new())
        .dry_run(dry_run);
    executor.unapply(&plan)?;
    let output = String::from_utf8(executor.into_output())?;
    store.save()?;

    Ok((plan, output))
}

#[sealed_test]
fn uninstall_removes_links_and_created_dirs() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/app1/dot-config/app1/config", "")?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.install(&["app1", "bash"], &RuleSources::default())?;

    let (plan, _) = uninstall(&farm, "app1", false)?;
    assert_eq!(plan.count(&UninstallAction::Unlink), 1);
    assert_eq!(plan.count(&UninstallAction::RemoveDir), 1);

    let home = farm.home();
    assert!(!home.join(".config").exists());
    assert!(home.join(".bashrc").is_symlink());

    let store = Store::open(farm.store_path())?;
    let targets = store
        .all()
        .map(|record| record.target_path.clone())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec![home.join(".bashrc")]);

    Ok(())
}

#[sealed_test]
fn uninstall_keeps_directory_still_in_use() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/app1/dot-config/app1/config", "")?;
    farm.file("dotfiles/app2/dot-config/app2/config", "")?;
    farm.install(&["app1", "app2"], &RuleSources::default())?;

    let (plan, _) = uninstall(&farm, "app2", false)?;
    let kept = plan
        .kept()
        .map(|step| step.action.clone())
        .collect::<Vec<_>>();
    assert_eq!(kept, vec![UninstallAction::Keep(KeepReason::InUse)]);

    let home = farm.home();
    assert!(!home.join(".config/app2").exists());
    assert!(home.join(".config/app1").is_symlink());

    Ok(())
}

#[sealed_test]
fn dry_run_uninstall_touches_nothing() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.install(&["bash"], &RuleSources::default())?;

    let (_, output) = uninstall(&farm, "bash", true)?;
    let expect = formatdoc! {r#"
        rm {:?}
    "#, farm.home().join(".bashrc").display()};
    assert_eq!(output, expect);
    assert!(farm.home().join(".bashrc").is_symlink());

    let store = Store::open(farm.store_path())?;
    assert_eq!(store.all().count(), 1);

    Ok(())
}
