//! Exclude patterns
//!
//! Globs are translated into anchored regular expressions and matched
//! against `/`-separated paths relative to the source root.
//!
//! - `*` matches within a single path segment
//! - `**` matches any number of segments
//! - `?` matches one character other than `/`
//! - `[abc]`, `[!abc]` match character classes
//!
//! A pattern without `/` matches a base name at any depth, so `*.pyc`
//! excludes `a/b/c.pyc` and `node_modules` excludes every directory of that
//! name (and therefore everything below it).

use crate::error::{Error, Result};
use regex::RegexSet;

/// A compiled set of exclude patterns
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    set: RegexSet,
}

impl ExcludeSet {
    /// Compile a list of glob patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let translated: Vec<String> = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(glob_to_regex)
            .collect();

        let set = RegexSet::new(&translated).map_err(|e| Error::InvalidGlob {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            message: e.to_string(),
        })?;

        Ok(Self { set })
    }

    /// A set that excludes nothing
    pub fn empty() -> Self {
        Self {
            set: RegexSet::empty(),
        }
    }

    /// Check a relative path (`/`-separated) against the patterns
    pub fn is_excluded(&self, relative: &str) -> bool {
        !self.set.is_empty() && self.set.is_match(relative)
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether no patterns are configured
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Translate a single glob into an anchored regex
fn glob_to_regex(pattern: &str) -> String {
    let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
    let basename_only = !pattern.contains('/');
    let pattern = pattern.trim_start_matches('/');

    let mut re = String::from("^");
    if basename_only {
        re.push_str("(?:.*/)?");
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                if chars.get(i + 1) == Some(&'/') {
                    i += 1;
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(offset) if offset > 0 => {
                    let class: String = chars[i + 1..i + 1 + offset].iter().collect();
                    re.push('[');
                    if let Some(rest) = class.strip_prefix('!') {
                        re.push('^');
                        re.push_str(&rest.replace('\\', "\\\\"));
                    } else {
                        re.push_str(&class.replace('\\', "\\\\"));
                    }
                    re.push(']');
                    i += offset + 1;
                }
                _ => re.push_str("\\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    re.push('$');
    re
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> ExcludeSet {
        ExcludeSet::new(patterns).unwrap()
    }

    #[test]
    fn test_basename_pattern_matches_any_depth() {
        let s = set(&["*.pyc"]);
        assert!(s.is_excluded("mod.pyc"));
        assert!(s.is_excluded("pkg/sub/mod.pyc"));
        assert!(!s.is_excluded("pkg/mod.py"));
    }

    #[test]
    fn test_directory_name_pattern() {
        let s = set(&["node_modules"]);
        assert!(s.is_excluded("node_modules"));
        assert!(s.is_excluded("web/node_modules"));
        assert!(!s.is_excluded("node_modules_backup"));
    }

    #[test]
    fn test_rooted_pattern() {
        let s = set(&["build/*.log"]);
        assert!(s.is_excluded("build/out.log"));
        assert!(!s.is_excluded("build/nested/out.log"));
        assert!(!s.is_excluded("other/build/out.log"));
    }

    #[test]
    fn test_double_star() {
        let s = set(&["tests/**/*.snap"]);
        assert!(s.is_excluded("tests/a.snap"));
        assert!(s.is_excluded("tests/x/y/a.snap"));
        assert!(!s.is_excluded("src/a.snap"));

        let s = set(&["docs/**"]);
        assert!(s.is_excluded("docs/index.md"));
        assert!(s.is_excluded("docs/a/b.md"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let s = set(&["file?.txt", "[!a]*.md"]);
        assert!(s.is_excluded("file1.txt"));
        assert!(!s.is_excluded("file10.txt"));
        assert!(s.is_excluded("readme.md"));
        assert!(!s.is_excluded("about.md"));
    }

    #[test]
    fn test_dotfiles_and_literal_dots() {
        let s = set(&[".git", ".env"]);
        assert!(s.is_excluded(".git"));
        assert!(s.is_excluded(".env"));
        assert!(!s.is_excluded("xenv"));
        assert!(!s.is_excluded(".envrc"));
    }

    #[test]
    fn test_empty_set() {
        let s = ExcludeSet::empty();
        assert!(s.is_empty());
        assert!(!s.is_excluded("anything"));

        let s = set(&["", "  "]);
        assert!(s.is_empty());
    }
}
