/*!
This module applies `.dockerignore`-style pattern lists to decide whether a
path belonging to a build context should be included in the fingerprint and
sent to the build tool.

Patterns are translated to regular expressions rather than matched with a
glob crate, since `regex` is already part of the dependency stack used
elsewhere in this workspace (see the BuildKit error-signature matching in
`buildsys`'s `builder.rs`, which this crate is adapted from).
*/
pub mod error;

use error::Result;
use regex::Regex;
use snafu::ResultExt;
use std::path::Path;

/// A single compiled rule derived from one line of an ignore file.
struct Rule {
    regex: Regex,
    /// `true` for a `!`-prefixed negation (re-include) rule.
    negate: bool,
}

/// Applies an ordered list of `.dockerignore`-style patterns to decide file
/// inclusion. Rules are evaluated in file order; the last matching rule wins,
/// which is how negation (`!pattern`) overrides an earlier exclusion.
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    /// An empty matcher that excludes nothing. Used when no ignore file
    /// applies to a build context.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Parse an ignore file's contents into a matcher.
    pub fn from_lines<S: AsRef<str>>(lines: S) -> Result<Self> {
        let mut rules = Vec::new();
        for (idx, raw_line) in lines.as_ref().lines().enumerate() {
            if let Some(rule) = Self::compile_line(raw_line, idx + 1)? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    fn compile_line(raw_line: &str, line_no: usize) -> Result<Option<Rule>> {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (negate, pattern) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        if pattern.is_empty() {
            return Ok(None);
        }

        let (dir_only, pattern) = match pattern.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };

        let regex_str = Self::pattern_regex(pattern, dir_only);
        let regex = Regex::new(&regex_str).context(error::InvalidPatternSnafu {
            pattern: pattern.to_string(),
            line: line_no,
        })?;

        Ok(Some(Rule { regex, negate }))
    }

    /// Translate one `.dockerignore` glob into an anchored regular
    /// expression matched against a `/`-separated, context-relative path.
    fn pattern_regex(pattern: &str, dir_only: bool) -> String {
        let (pattern, rooted) = match pattern.strip_prefix('/') {
            Some(rest) => (rest, true),
            None => (pattern, false),
        };

        let mut core = String::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        core.push_str("(?:.*/)?");
                    } else {
                        core.push_str(".*");
                    }
                }
                '*' => core.push_str("[^/]*"),
                '?' => core.push_str("[^/]"),
                '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '[' | ']' | '\\' => {
                    core.push('\\');
                    core.push(c);
                }
                other => core.push(other),
            }
        }

        if dir_only {
            core.push_str("(?:/.*)?");
        }

        // A pattern with no leading `/` matches at any depth, equivalent to
        // prefixing it with `**/` (this is how Docker itself treats a
        // pattern without a rooting `/`).
        if rooted {
            format!("^{core}$")
        } else {
            format!("^(?:.*/)?{core}$")
        }
    }

    /// Returns whether `rel_path` (forward-slash separated, relative to the
    /// context root) is excluded by these patterns.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        let mut excluded = false;
        for rule in &self.rules {
            if rule.regex.is_match(rel_path) {
                excluded = !rule.negate;
            }
        }
        excluded
    }

    /// Convenience wrapper over [`IgnoreMatcher::is_excluded`] for callers
    /// holding a native path instead of a pre-normalized string.
    pub fn is_path_excluded(&self, rel_path: &Path) -> bool {
        self.is_excluded(&super::context::to_slash_path(rel_path))
    }
}
