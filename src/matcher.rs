// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hierarchical pattern matching.
//!
//! Decides two things about every object in a source package: whether it is
//! __ignored__, i.e., never installed at all, and whether a directory is
//! __always-create__, i.e., created as a real directory at the target instead
//! of being linked as a whole.
//!
//! # Precedence
//!
//! Patterns come from several places. Each place is a [`Tier`], and tiers are
//! layered from lowest to highest precedence:
//!
//! 1. Built-in defaults, see [`builtin`].
//! 2. User global pattern file, followed by extra patterns from configuration
//!    or the command line.
//! 3. Pattern files inside the package, shallowest first.
//!
//! All applicable patterns form one ordered list, and the last pattern that
//! matches a path decides its fate. A negated pattern that wins re-includes
//! the path. A path no pattern matches is neither ignored nor always-create.
//!
//! # Coordinate Systems
//!
//! Ignore rules match against paths relative to the package source directory
//! __before__ dot-rename, so they are written as the package author sees the
//! files. Always-create rules match against paths relative to the target
//! __after__ dot-rename, so `/.config/` means the same thing no matter how the
//! package spells it.
//!
//! # See Also
//!
//! - [gitignore](https://git-scm.com/docs/gitignore)
//! - [`pattern`]

pub mod builtin;
pub mod pattern;

pub use builtin::Builtins;
pub use pattern::{Match, Pattern, PatternError, PatternSet, Tier};

use pattern::Result;

use std::{
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Name of per-directory ignore file inside a package.
pub const IGNORE_FILE_NAME: &str = ".dotxignore";

/// Name of always-create file at the top-level of a package.
pub const ALWAYS_CREATE_FILE_NAME: &str = ".always-create";

/// Name of the user's global ignore file in the dotx configuration directory.
pub const GLOBAL_IGNORE_FILE_NAME: &str = "dotxignore";

/// Name of the user's global always-create file in the dotx configuration
/// directory.
pub const GLOBAL_ALWAYS_CREATE_FILE_NAME: &str = "always-create";

/// Ordered collection of pattern sets evaluated as one list.
///
/// # Invariant
///
/// - Sets are kept from lowest to highest precedence.
#[derive(Debug, Clone, Default)]
pub struct HierarchicalMatcher {
    sets: Vec<PatternSet>,
}

impl HierarchicalMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append pattern set with the highest precedence so far.
    pub fn push(&mut self, set: PatternSet) {
        self.sets.push(set);
    }

    pub fn sets(&self) -> &[PatternSet] {
        &self.sets
    }

    /// Total number of patterns across all sets.
    pub fn pattern_count(&self) -> usize {
        self.sets.iter().map(PatternSet::len).sum()
    }

    /// Reorder sets by tier, then by depth.
    ///
    /// Sort is stable, so sets of equal tier and depth keep insertion order.
    pub fn sort_by_precedence(&mut self) {
        self.sets
            .sort_by_key(|set| (set.tier().unwrap_or(Tier::Builtin), set.depth()));
    }

    /// Find the deciding pattern for a package relative path.
    pub fn decide(&self, relative: &Path, is_dir: bool) -> Option<Match<'_>> {
        self.sets
            .iter()
            .rev()
            .find_map(|set| set.matches(relative, is_dir))
    }

    /// Path matched, and the deciding pattern was not a negation.
    pub fn is_match(&self, relative: &Path, is_dir: bool) -> bool {
        self.decide(relative, is_dir)
            .is_some_and(|result| !result.negated)
    }
}

/// Locations of user level pattern sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSources {
    /// User's global ignore file.
    pub global_ignore: Option<PathBuf>,

    /// User's global always-create file.
    pub global_always_create: Option<PathBuf>,

    /// Extra ignore patterns from configuration or the command line.
    pub extra_ignores: Vec<String>,
}

impl RuleSources {
    /// Use the global pattern files inside a dotx configuration directory.
    pub fn from_config_dir(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref();
        Self {
            global_ignore: Some(config_dir.join(GLOBAL_IGNORE_FILE_NAME)),
            global_always_create: Some(config_dir.join(GLOBAL_ALWAYS_CREATE_FILE_NAME)),
            extra_ignores: Vec::new(),
        }
    }

    pub fn with_extra_ignores<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_ignores.extend(patterns.into_iter().map(Into::into));
        self
    }
}

/// Ignore rules of one package.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    matcher: HierarchicalMatcher,
}

impl IgnoreRules {
    /// Gather every ignore pattern that applies to a package.
    ///
    /// Walks the package source directory top-down looking for
    /// [`IGNORE_FILE_NAME`] files. Directories that are already ignored by the
    /// patterns found so far are not entered.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::ReadPatternFile`] if an existing pattern file
    ///   cannot be read.
    /// - Return [`PatternError::Walk`] if a directory of the package cannot be
    ///   listed.
    #[instrument(skip(builtins, sources), level = "debug")]
    pub fn discover(source: &Path, builtins: &Builtins, sources: &RuleSources) -> Result<Self> {
        let mut matcher = HierarchicalMatcher::new();
        matcher.push(builtins.ignore().clone());

        if let Some(path) = &sources.global_ignore {
            if let Some(set) = PatternSet::load(path, Tier::UserGlobal, "")? {
                matcher.push(set);
            }
        }

        if !sources.extra_ignores.is_empty() {
            let extra = sources.extra_ignores.join("\n");
            matcher.push(PatternSet::from_lines(&extra, Tier::UserGlobal, ""));
        }

        collect_package_sets(&mut matcher, source, Path::new(""))?;
        matcher.sort_by_precedence();
        debug!(
            "{} ignore patterns in {} sets",
            matcher.pattern_count(),
            matcher.sets().len()
        );

        Ok(Self { matcher })
    }

    pub fn from_matcher(matcher: HierarchicalMatcher) -> Self {
        Self { matcher }
    }

    /// Check if package relative source path is ignored.
    pub fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        match self.matcher.decide(relative, is_dir) {
            Some(result) if !result.negated => {
                debug!("ignore {:?} by {:?}", relative.display(), result.pattern.raw());
                true
            }
            _ => false,
        }
    }

    pub fn matcher(&self) -> &HierarchicalMatcher {
        &self.matcher
    }
}

fn collect_package_sets(
    matcher: &mut HierarchicalMatcher,
    source: &Path,
    relative: &Path,
) -> Result<()> {
    let dir = source.join(relative);
    if let Some(set) = PatternSet::load(dir.join(IGNORE_FILE_NAME), Tier::PackageLocal, relative)? {
        matcher.push(set);
    }

    let walk_err = |err: std::io::Error| PatternError::Walk {
        source: err,
        path: dir.clone(),
    };

    let mut subdirs = Vec::new();
    for entry in read_dir(&dir).map_err(walk_err)? {
        let entry = entry.map_err(walk_err)?;
        if entry.file_type().map_err(walk_err)?.is_dir() {
            subdirs.push(relative.join(entry.file_name()));
        }
    }
    subdirs.sort();

    for subdir in subdirs {
        // INVARIANT: Never read pattern files from inside ignored directories.
        if matcher.is_match(&subdir, true) {
            continue;
        }

        collect_package_sets(matcher, source, &subdir)?;
    }

    Ok(())
}

/// Always-create rules of one package.
#[derive(Debug, Clone)]
pub struct AlwaysCreateRules {
    matcher: HierarchicalMatcher,
}

impl AlwaysCreateRules {
    /// Gather every always-create pattern that applies to a package.
    ///
    /// Only the [`ALWAYS_CREATE_FILE_NAME`] file at the top-level of the
    /// package source directory is consulted.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::ReadPatternFile`] if an existing pattern file
    ///   cannot be read.
    #[instrument(skip(builtins, sources), level = "debug")]
    pub fn load(source: &Path, builtins: &Builtins, sources: &RuleSources) -> Result<Self> {
        let mut matcher = HierarchicalMatcher::new();
        matcher.push(builtins.always_create().clone());

        if let Some(path) = &sources.global_always_create {
            if let Some(set) = PatternSet::load(path, Tier::UserGlobal, "")? {
                matcher.push(set);
            }
        }

        let local = source.join(ALWAYS_CREATE_FILE_NAME);
        if let Some(set) = PatternSet::load(local, Tier::PackageLocal, "")? {
            matcher.push(set);
        }

        Ok(Self { matcher })
    }

    pub fn from_matcher(matcher: HierarchicalMatcher) -> Self {
        Self { matcher }
    }

    /// Pattern that makes a target relative path always-create.
    ///
    /// Non-directories are never always-create.
    pub fn matching_pattern(&self, relative: &Path, is_dir: bool) -> Option<&Pattern> {
        if !is_dir {
            return None;
        }

        self.matcher
            .decide(relative, true)
            .filter(|result| !result.negated)
            .map(|result| result.pattern)
    }

    pub fn is_always_create(&self, relative: &Path, is_dir: bool) -> bool {
        self.matching_pattern(relative, is_dir).is_some()
    }

    pub fn matcher(&self) -> &HierarchicalMatcher {
        &self.matcher
    }
}
