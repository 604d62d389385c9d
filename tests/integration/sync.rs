// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::FarmFixture;

use anyhow::Result;
use dotx::{
    matcher::RuleSources,
    store::{LinkType, Store},
    sync::{clean_all_orphaned, record_missing, Discovery, ScanOptions},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs::{remove_file, rename};

#[sealed_test]
fn sync_rebuilds_lost_store() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.file("dotfiles/nvim/dot-config/nvim/init.lua", "")?;
    farm.install(&["bash", "nvim"], &RuleSources::default())?;
    rename(farm.store_path(), farm.path("data/lost.toml"))?;

    let mut store = Store::open(farm.store_path())?;
    assert_eq!(store.all().count(), 0);

    let roots = vec![farm.path("dotfiles")];
    let discovery = Discovery::scan(&farm.home(), &ScanOptions::default(), &roots)?;
    assert_eq!(record_missing(&mut store, &discovery), 2);

    let mut records = store
        .all()
        .map(|record| (record.package_name.clone(), record.link_type))
        .collect::<Vec<_>>();
    records.sort();
    assert_eq!(
        records,
        vec![
            ("bash".to_string(), LinkType::File),
            ("nvim".to_string(), LinkType::Directory),
        ]
    );

    Ok(())
}

#[sealed_test]
fn sync_clean_drops_vanished_targets() -> Result<()> {
    let farm = FarmFixture::new()?;
    farm.file("dotfiles/bash/dot-bashrc", "")?;
    farm.file("dotfiles/bash/dot-inputrc", "")?;
    farm.install(&["bash"], &RuleSources::default())?;
    remove_file(farm.home().join(".inputrc"))?;

    let mut store = Store::open(farm.store_path())?;
    let dropped = clean_all_orphaned(&mut store)
        .into_iter()
        .map(|record| record.target_path)
        .collect::<Vec<_>>();
    assert_eq!(dropped, vec![farm.home().join(".inputrc")]);
    assert!(store.find(farm.home().join(".bashrc")).is_some());

    Ok(())
}
