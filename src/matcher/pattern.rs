// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Compiled ignore and always-create patterns.
//!
//! A pattern file is read one line at a time. Each line compiles into a
//! [`Pattern`] under gitignore rules, and all patterns of one file form a
//! [`PatternSet`] that remembers the order they were declared in.
//!
//! # Pattern Syntax
//!
//! Lines follow gitignore syntax exactly:
//!
//! - Blank lines and lines starting with `#` are skipped. Use `\#` for a
//!   pattern that really starts with a hash, and `\!` for a leading bang.
//! - A leading `!` negates the pattern, i.e., re-includes what an earlier
//!   pattern excluded.
//! - A leading `/` anchors the pattern to the directory holding the pattern
//!   file. A `/` in the middle of the pattern anchors it too.
//! - A leading `**/` lets the rest of the pattern float to any depth.
//! - A trailing `/` restricts the pattern to directories.
//! - Everything else is a glob with `*`, `?`, `**`, and `[...]` classes.
//!   A `*` never crosses a path separator, and a backslash escapes the next
//!   character. Trailing spaces are dropped unless escaped.

use crate::path::to_slash;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Precedence tier a pattern originates from.
///
/// Tiers are ordered from lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Defaults shipped with dotx.
    Builtin,

    /// User's global pattern file, configuration, or command line.
    UserGlobal,

    /// Pattern files living inside a source package.
    PackageLocal,
}

impl Display for Tier {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Builtin => fmt.write_str("built-in"),
            Self::UserGlobal => fmt.write_str("user global"),
            Self::PackageLocal => fmt.write_str("package local"),
        }
    }
}

/// A single compiled pattern.
///
/// Each pattern owns a one-line gitignore matcher, so sets from different
/// tiers can be layered in any order while every line keeps gitignore's own
/// glob semantics.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    tier: Tier,
    depth: usize,
    negated: bool,
    anchored: bool,
    directory_only: bool,
    gitignore: Gitignore,
}

impl Pattern {
    /// Compile one line of a pattern file.
    ///
    /// Returns `Ok(None)` for lines that carry no pattern: blank lines,
    /// comments, and bodies left empty after stripping `!` or slashes.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::Syntax`] if the glob is malformed.
    pub fn compile(line: &str, tier: Tier, depth: usize) -> Result<Option<Self>> {
        // INVARIANT: Same trimming rule as gitignore, an escaped trailing
        // space survives.
        let line = if line.ends_with("\\ ") {
            line
        } else {
            line.trim_end()
        };
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, unescape_leading(line)),
        };
        let (absolute, body) = match body.strip_prefix('/') {
            Some(rest) if !line.starts_with('\\') => (true, rest),
            _ => (false, body),
        };
        let (directory_only, body) = match body.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        if body.is_empty() {
            return Ok(None);
        }

        // INVARIANT: A separator inside the body anchors the pattern, unless
        // the pattern explicitly floats through a leading "**/".
        let anchored = absolute || (body.contains('/') && !body.starts_with("**/"));

        let syntax = |source: ignore::Error| PatternError::Syntax {
            raw: line.to_string(),
            source,
        };
        let mut builder = GitignoreBuilder::new("");
        builder.add_line(None, line).map_err(syntax)?;
        let gitignore = builder.build().map_err(syntax)?;

        Ok(Some(Self {
            raw: line.to_string(),
            tier,
            depth,
            negated,
            anchored,
            directory_only,
            gitignore,
        }))
    }

    /// Pattern exactly as it was written, minus trailing whitespace.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Precedence tier the pattern came from.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Directory depth of the pattern file relative to the package root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn is_directory_only(&self) -> bool {
        self.directory_only
    }

    /// Match a slash separated path relative to the pattern file's directory.
    ///
    /// Anchored patterns must match the whole path. Unanchored patterns match
    /// if any suffix of the path's segments matches.
    pub fn matches(&self, relative: &str, is_dir: bool) -> bool {
        if relative.is_empty() {
            return false;
        }

        !self.gitignore.matched(relative, is_dir).is_none()
    }
}

impl Display for Pattern {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.raw)
    }
}

fn unescape_leading(line: &str) -> &str {
    if line.starts_with("\\#") || line.starts_with("\\!") {
        &line[1..]
    } else {
        line
    }
}

/// Outcome of matching a path against patterns.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    /// Deciding pattern was a negation.
    pub negated: bool,

    /// The last pattern that matched.
    pub pattern: &'a Pattern,
}

/// Ordered patterns from one source.
///
/// Relative paths handed to [`PatternSet::matches`] are relative to the
/// package root. The set only applies to paths strictly below its base
/// directory, and resolves its patterns relative to that base.
///
/// # Invariant
///
/// - Patterns keep their declaration order, later ones override earlier
///   ones.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    source: Option<PathBuf>,
    base: PathBuf,
    tier: Option<Tier>,
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Construct empty pattern set rooted at package relative base.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            ..Default::default()
        }
    }

    /// Compile pattern set from text.
    ///
    /// Lines with malformed globs are skipped and logged as warnings, so one
    /// bad line never throws away the rest of the file.
    pub fn from_lines(content: &str, tier: Tier, base: impl Into<PathBuf>) -> Self {
        let mut set = Self::new(base);
        set.tier = Some(tier);
        for line in content.lines() {
            if let Err(error) = set.push_line(line, tier) {
                warn!("skip pattern: {error}");
            }
        }

        set
    }

    /// Load pattern set from a pattern file on disk.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::ReadPatternFile`] if the file exists but
    ///   cannot be read.
    pub fn load(path: impl AsRef<Path>, tier: Tier, base: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = match read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(PatternError::ReadPatternFile {
                    source: error,
                    path: path.to_path_buf(),
                })
            }
        };

        let mut set = Self::from_lines(&content, tier, base);
        set.source = Some(path.to_path_buf());
        debug!("loaded {} {tier} patterns from {:?}", set.len(), path.display());

        Ok(Some(set))
    }

    /// Compile and append one line.
    ///
    /// Returns `true` if the line carried a pattern.
    ///
    /// # Errors
    ///
    /// - Return [`PatternError::Syntax`] if the glob is malformed.
    pub fn push_line(&mut self, line: &str, tier: Tier) -> Result<bool> {
        let depth = self.base.components().count();
        match Pattern::compile(line, tier, depth)? {
            Some(pattern) => {
                self.patterns.push(pattern);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pattern file this set was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Package relative directory the patterns are resolved against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Tier of the set, taken from its first pattern if not set explicitly.
    pub fn tier(&self) -> Option<Tier> {
        self.tier
            .or_else(|| self.patterns.first().map(Pattern::tier))
    }

    /// Directory depth of the set's base below the package root.
    pub fn depth(&self) -> usize {
        self.base.components().count()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Find the last pattern that matches a package relative path.
    ///
    /// Returns `None` when nothing matches, or when the path does not live
    /// strictly below the set's base directory.
    pub fn matches(&self, relative: &Path, is_dir: bool) -> Option<Match<'_>> {
        let below_base = relative.strip_prefix(&self.base).ok()?;
        let below_base = to_slash(below_base);
        if below_base.is_empty() {
            return None;
        }

        self.patterns
            .iter()
            .rev()
            .find(|pattern| pattern.matches(&below_base, is_dir))
            .map(|pattern| Match {
                negated: pattern.is_negated(),
                pattern,
            })
    }
}

/// Pattern compilation and loading error types.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// Glob of a pattern line is malformed.
    #[error("invalid pattern {raw:?}")]
    Syntax {
        #[source]
        source: ignore::Error,
        raw: String,
    },

    /// Pattern file exists but cannot be read.
    #[error("failed to read pattern file at {:?}", path.display())]
    ReadPatternFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Package directory cannot be walked to discover pattern files.
    #[error("failed to walk {:?} for pattern files", path.display())]
    Walk {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PatternError> = std::result::Result<T, E>;
