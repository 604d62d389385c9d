// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Built-in default patterns.
//!
//! Defaults hold the lowest precedence of all pattern sources, so any user or
//! package pattern can override them with a negation.

use crate::matcher::pattern::{PatternSet, Tier};

/// Files and directories that are never worth installing.
pub const DEFAULT_IGNORE: &str = r#"
.git
.hg
.svn
__pycache__/
.DS_Store
*.swp
.dotxignore
.always-create
"#;

/// Shared directories that many programs write into, so they are always
/// created as real directories rather than linked wholesale.
pub const DEFAULT_ALWAYS_CREATE: &str = r#"
/.config/
/.local/
/.local/bin/
/.local/share/
/.local/state/
/.cache/
/.ssh/
/.gnupg/
"#;

/// Compiled default pattern sets.
///
/// Built once at startup and handed to whatever needs them.
#[derive(Debug, Clone)]
pub struct Builtins {
    ignore: PatternSet,
    always_create: PatternSet,
}

impl Builtins {
    pub fn new() -> Self {
        Self {
            ignore: PatternSet::from_lines(DEFAULT_IGNORE, Tier::Builtin, ""),
            always_create: PatternSet::from_lines(DEFAULT_ALWAYS_CREATE, Tier::Builtin, ""),
        }
    }

    pub fn ignore(&self) -> &PatternSet {
        &self.ignore
    }

    pub fn always_create(&self) -> &PatternSet {
        &self.always_create
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;
    use std::path::Path;

    #[test]
    fn every_default_compiles() {
        let builtins = Builtins::new();
        assert_eq!(builtins.ignore().len(), 8);
        assert_eq!(builtins.always_create().len(), 8);
    }

    #[test_case(".git", true, true; "git directory")]
    #[test_case("sub/.git", true, true; "nested git directory")]
    #[test_case("__pycache__", true, true; "python cache")]
    #[test_case("__pycache__", false, false; "python cache name on a file")]
    #[test_case("dot-vimrc.swp", false, true; "swap file")]
    #[test_case(".dotxignore", false, true; "ignore file itself")]
    #[test_case("dot-bashrc", false, false; "ordinary dotfile")]
    #[test]
    fn default_ignore(path: &str, is_dir: bool, expect: bool) {
        let builtins = Builtins::new();
        let result = builtins.ignore().matches(Path::new(path), is_dir);
        assert_eq!(result.is_some_and(|result| !result.negated), expect);
    }

    #[test_case(".config", true, true; "config")]
    #[test_case(".local/share", true, true; "local share")]
    #[test_case(".config/nvim", true, false; "below config")]
    #[test_case("pkg/.config", true, false; "anchored at target root")]
    #[test_case(".ssh", false, false; "file named like directory")]
    #[test]
    fn default_always_create(path: &str, is_dir: bool, expect: bool) {
        let builtins = Builtins::new();
        let result = builtins.always_create().matches(Path::new(path), is_dir);
        assert_eq!(result.is_some(), expect);
    }
}
