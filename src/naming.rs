//! Loader entry naming
//!
//! Entries are named `NN-<dependency>.py`, where `NN` is a two-digit load
//! priority (lower loads first). A compiled `.pyc` sibling belongs to the
//! same dependency. Matching treats the dependency name as an opaque
//! literal, so `foo` never matches entries for `foo-bar` or `f.o`.

use std::fmt;
use std::str::FromStr;

use regex_lite::Regex;

use crate::error::{ManifestError, ManifestResult};

/// Extension of loader entry source
pub const SOURCE_EXTENSION: &str = "py";

/// Two-digit load priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Priority for dependencies without dependencies of their own
    pub const FIRST: Priority = Priority(1);

    pub fn new(value: u8) -> ManifestResult<Self> {
        if value > 99 {
            return Err(ManifestError::InvalidPriority(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl FromStr for Priority {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(ManifestError::InvalidPriority(s.to_string()));
        }
        Ok(Self((bytes[0] - b'0') * 10 + (bytes[1] - b'0')))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Whether `name` can be used as a dependency or package name.
///
/// Names end up as archive member names and file names, so path
/// separators and relative components are refused.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

pub fn validate_name(name: &str) -> ManifestResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ManifestError::InvalidName(name.to_string()))
    }
}

/// Matches the entries that belong to one dependency, at any priority.
#[derive(Debug, Clone)]
pub struct EntryMatcher {
    regex: Regex,
}

impl EntryMatcher {
    pub fn new(dependency: &str) -> ManifestResult<Self> {
        let pattern = format!(
            r"^\d\d-{}\.{}c?$",
            regex_lite::escape(dependency),
            SOURCE_EXTENSION
        );
        Ok(Self {
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn is_match(&self, entry_name: &str) -> bool {
        self.regex.is_match(entry_name)
    }
}

/// One dependency's loader entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderEntry {
    priority: Priority,
    dependency: String,
    code: String,
}

impl LoaderEntry {
    /// Entry with caller-supplied code
    pub fn new(priority: Priority, dependency: &str, code: impl Into<String>) -> ManifestResult<Self> {
        validate_name(dependency)?;
        Ok(Self {
            priority,
            dependency: dependency.to_string(),
            code: code.into(),
        })
    }

    /// Entry that registers the dependency's code path with the host
    pub fn with_default_code(priority: Priority, dependency: &str) -> ManifestResult<Self> {
        let code = default_code(dependency);
        Self::new(priority, dependency, code)
    }

    /// Archive member or file name
    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.priority, self.dependency, SOURCE_EXTENSION)
    }

    pub fn payload(&self) -> &[u8] {
        self.code.as_bytes()
    }
}

/// Default loader code with the dependency name baked in
pub fn default_code(dependency: &str) -> String {
    format!(
        "from package_control import sys_path\nsys_path.add_dependency({})\n",
        python_str_literal(dependency)
    )
}

/// Render `value` as a Python string literal.
///
/// Single quotes unless the value contains a single quote and no double
/// quote. Control characters are escaped.
fn python_str_literal(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut literal = String::with_capacity(value.len() + 2);
    literal.push(quote);
    for c in value.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if c == quote => {
                literal.push('\\');
                literal.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                literal.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => literal.push(c),
        }
    }
    literal.push(quote);
    literal
}
