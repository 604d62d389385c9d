// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rebuild installation records from the file system.
//!
//! Links placed before the record store existed, or by hand, are invisible to
//! uninstall and ownership checks. Syncing scans the target for symlinks,
//! works out which package each one belongs to, and records whatever is
//! missing.
//!
//! # Scan Strategy
//!
//! Dotfiles cluster near the top of the target and inside `.config`, so by
//! default the target is scanned two levels deep, and `.config` four levels
//! deep. Symlinked directories are never entered.
//!
//! # Attribution
//!
//! With package roots, a link whose resolved destination lies below a package
//! root belongs to the package named by the first path component below that
//! root. Links that point anywhere else are left out. Without package roots,
//! the parent directory of the destination is taken as the package.

use crate::{
    package::PackageId,
    store::{LinkType, Record, Store},
};

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{canonicalize, read_dir, ReadDir},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Default scan depth below the target.
pub const TARGET_DEPTH: usize = 1;

/// Default scan depth below `.config` and extra scan paths.
pub const CONFIG_DEPTH: usize = 3;

/// Where and how deep to look for symlinks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Override every default depth.
    pub max_depth: Option<usize>,

    /// Extra directories to scan.
    pub scan_paths: Vec<PathBuf>,

    /// Only scan the target itself, skipping `.config`.
    pub simple: bool,
}

impl ScanOptions {
    /// Directories to scan along with their depth limit.
    pub fn scan_plan(&self, target_root: &Path) -> Vec<(PathBuf, usize)> {
        let mut scans = vec![(
            target_root.to_path_buf(),
            self.max_depth.unwrap_or(TARGET_DEPTH),
        )];

        let config = target_root.join(".config");
        if !self.simple && config.is_dir() {
            scans.push((config, self.max_depth.unwrap_or(CONFIG_DEPTH)));
        }

        for path in &self.scan_paths {
            scans.push((path.clone(), self.max_depth.unwrap_or(CONFIG_DEPTH)));
        }

        scans
    }
}

/// Symlink attributed to a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundLink {
    pub link: PathBuf,
    pub destination: PathBuf,
    pub is_dir: bool,
}

/// Links found in the target grouped by package.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Attributed links with the source directory of their package.
    pub packages: BTreeMap<PackageId, (PathBuf, Vec<FoundLink>)>,

    /// Links that cannot be resolved.
    pub broken: Vec<PathBuf>,

    /// Links that point outside every package root.
    pub filtered: Vec<PathBuf>,
}

impl Discovery {
    /// Scan target for symlinks and attribute them to packages.
    ///
    /// Unreadable directories below a scan path are skipped.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Scan`] if a scan path itself cannot be read.
    #[instrument(skip(options, package_roots), level = "debug")]
    pub fn scan(
        target_root: &Path,
        options: &ScanOptions,
        package_roots: &[PathBuf],
    ) -> Result<Self> {
        let mut links = BTreeSet::new();
        for (dir, depth) in options.scan_plan(target_root) {
            debug!("scan {:?} to depth {depth}", dir.display());
            let entries = read_dir(&dir).map_err(|err| SyncError::Scan {
                source: err,
                path: dir.clone(),
            })?;
            collect_symlinks(entries, 0, depth, &mut links);
        }
        info!("found {} symlink(s)", links.len());

        Ok(Self::attribute(links, package_roots))
    }

    /// Group symlinks by the package they point into.
    pub fn attribute(links: impl IntoIterator<Item = PathBuf>, package_roots: &[PathBuf]) -> Self {
        let roots = package_roots
            .iter()
            .map(|root| canonicalize(root).unwrap_or_else(|_| root.clone()))
            .collect::<Vec<_>>();

        let mut discovery = Self::default();
        for link in links {
            let Ok(destination) = canonicalize(&link) else {
                debug!("cannot resolve {:?}", link.display());
                discovery.broken.push(link);
                continue;
            };

            let owner = if roots.is_empty() {
                package_from_parent(&destination)
            } else {
                roots
                    .iter()
                    .find_map(|root| package_below_root(root, &destination))
            };

            let Some((package, source)) = owner else {
                debug!("{:?} is outside every package root", link.display());
                discovery.filtered.push(link);
                continue;
            };

            let is_dir = destination.is_dir();
            discovery
                .packages
                .entry(package)
                .or_insert_with(|| (source, Vec::new()))
                .1
                .push(FoundLink {
                    link,
                    destination,
                    is_dir,
                });
        }

        discovery
    }

    /// Total number of attributed links.
    pub fn link_count(&self) -> usize {
        self.packages.values().map(|(_, links)| links.len()).sum()
    }

    /// Records for attributed links the store does not know about yet.
    pub fn missing_records(&self, store: &Store) -> Vec<Record> {
        self.packages
            .iter()
            .flat_map(|(package, (source, links))| {
                links.iter().map(move |found| {
                    let link_type = if found.is_dir {
                        LinkType::Directory
                    } else {
                        LinkType::File
                    };
                    Record::new(package, source, &found.link, link_type)
                })
            })
            .filter(|record| store.find(&record.target_path).is_none())
            .collect()
    }
}

/// Record every attributed link the store does not know about yet.
///
/// Returns the number of records added.
pub fn record_missing(store: &mut Store, discovery: &Discovery) -> usize {
    let records = discovery.missing_records(store);
    let added = records.len();
    for record in records {
        store.record_installation(record);
    }

    info!("recorded {added} installation(s)");
    added
}

/// Drop records whose target vanished, across every package.
///
/// Returns the dropped records.
pub fn clean_all_orphaned(store: &mut Store) -> Vec<Record> {
    let packages = store
        .packages()
        .into_iter()
        .map(|summary| summary.package)
        .collect::<Vec<_>>();

    packages
        .iter()
        .flat_map(|package| store.clean_orphaned(package))
        .collect()
}

fn collect_symlinks(
    entries: ReadDir,
    depth: usize,
    max_depth: usize,
    links: &mut BTreeSet<PathBuf>,
) {
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        // INVARIANT: Symlinked directories are collected, never entered.
        if file_type.is_symlink() {
            links.insert(entry.path());
        } else if file_type.is_dir() && depth < max_depth {
            match read_dir(entry.path()) {
                Ok(children) => collect_symlinks(children, depth + 1, max_depth, links),
                Err(err) => debug!("skip {:?}: {err}", entry.path().display()),
            }
        }
    }
}

fn package_below_root(root: &Path, destination: &Path) -> Option<(PackageId, PathBuf)> {
    let relative = destination.strip_prefix(root).ok()?;
    let Some(Component::Normal(name)) = relative.components().next() else {
        return None;
    };

    let package = PackageId::new(root, name.to_string_lossy());
    let source = root.join(name);
    Some((package, source))
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Scan path cannot be read.
    #[error("failed to scan {:?} for symlinks", path.display())]
    Scan {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;

fn package_from_parent(destination: &Path) -> Option<(PackageId, PathBuf)> {
    let source = destination.parent()?;
    let name = source.file_name()?;
    let root = source.parent()?;
    Some((PackageId::new(root, name.to_string_lossy()), source.to_path_buf()))
}
