//! Exclusion rules applied while walking an environment tree
//!
//! Rules are expressed against relative, forward-slash paths:
//!
//! - a plain entry (`wp-content/cache`) excludes that path and everything below it;
//! - an entry containing `*`, `?` or `[` is a glob (`**` crosses directories,
//!   a glob without `/` matches at any depth);
//! - extensions (`log`, `.tmp`) exclude files by suffix, case-insensitively.

use std::collections::HashSet;

use regex::Regex;

use crate::path::extension_of;
use crate::{Error, Result};

/// Compiled path and extension exclusions.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    prefixes: HashSet<String>,
    globs: Vec<(String, Regex)>,
    extensions: HashSet<String>,
}

impl ExclusionRules {
    /// Compile path patterns and an extension deny-list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if a glob cannot be compiled.
    pub fn new<P, E>(paths: P, extensions: E) -> Result<Self>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut rules = Self::default();

        for raw in paths {
            let pattern = raw.as_ref().trim().trim_matches('/');
            if pattern.is_empty() {
                continue;
            }
            if is_glob(pattern) {
                let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
                    Error::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    }
                })?;
                rules.globs.push((pattern.to_string(), regex));
            } else {
                rules.prefixes.insert(pattern.to_string());
            }
        }

        for raw in extensions {
            let ext = raw.as_ref().trim().trim_start_matches('.');
            if !ext.is_empty() {
                rules.extensions.insert(ext.to_ascii_lowercase());
            }
        }

        Ok(rules)
    }

    /// True when no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.globs.is_empty() && self.extensions.is_empty()
    }

    /// Check a relative path.
    ///
    /// Directories are only matched against path rules; files are also
    /// checked against the extension deny-list. Any excluded ancestor
    /// excludes the path.
    pub fn is_excluded(&self, relative: &str, is_dir: bool) -> bool {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            return false;
        }

        if !is_dir
            && let Some(ext) = extension_of(relative)
            && self.extensions.contains(&ext.to_ascii_lowercase())
        {
            return true;
        }

        ancestors(relative).any(|candidate| self.matches_path(candidate))
    }

    fn matches_path(&self, candidate: &str) -> bool {
        self.prefixes.contains(candidate) || self.globs.iter().any(|(_, re)| re.is_match(candidate))
    }
}

/// `a`, `a/b`, `a/b/c` for `a/b/c`.
fn ancestors(relative: &str) -> impl Iterator<Item = &str> {
    relative
        .match_indices('/')
        .map(|(idx, _)| &relative[..idx])
        .chain(std::iter::once(relative))
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    if !pattern.contains('/') {
        out.push_str("(?:.*/)?");
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..].iter().position(|&c| c == ']');
                match close {
                    Some(offset) => {
                        let body: String = chars[i + 1..i + 1 + offset].iter().collect();
                        out.push('[');
                        match body.strip_prefix('!') {
                            Some(rest) => {
                                out.push('^');
                                out.push_str(&escape_class(rest));
                            }
                            None => out.push_str(&escape_class(&body)),
                        }
                        out.push(']');
                        i += offset + 2;
                        continue;
                    }
                    None => out.push_str(r"\["),
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

fn escape_class(body: &str) -> String {
    body.replace('\\', r"\\").replace('[', r"\[")
}
