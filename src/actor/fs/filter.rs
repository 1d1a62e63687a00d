//! Pattern filter over file base names.
//!
//! A pattern is either one regular expression or a list of globs
//! (`*` and `?` wildcards, matched against the whole base name).
//! Editor temp files never match, whatever the pattern says.

use std::path::Path;

use regex::Regex;

use crate::utils::path::{base_name, is_temp_file};

#[derive(Debug, Clone)]
pub enum Pattern {
    Regex(Regex),
    Globs(Vec<Regex>),
}

impl Pattern {
    pub fn regex(expr: &str) -> Result<Self, regex::Error> {
        Regex::new(expr).map(Self::Regex)
    }

    pub fn globs<I, S>(globs: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        globs
            .into_iter()
            .map(|g| Regex::new(&glob_to_regex(g.as_ref())))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Globs)
    }

    /// Test a bare base name.
    pub fn matches_name(&self, name: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(name),
            Self::Globs(globs) => globs.iter().any(|re| re.is_match(name)),
        }
    }

    /// Test the base name of a path.
    pub fn matches(&self, path: &Path) -> bool {
        let name = base_name(path);
        !name.is_empty() && !is_temp_file(path) && self.matches_name(name)
    }

    /// Matches nothing (an empty glob list).
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Globs(globs) if globs.is_empty())
    }
}

/// Translate a glob into an anchored regular expression.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let mut buf = [0u8; 4];
    for c in glob.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}
