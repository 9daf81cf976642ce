use regex_lite::Regex;
use std::path::Path;

use crate::error::PushError;

/// Error markers printed by common network operating systems when a
/// configuration line is rejected.
///
/// Markers are anchored at the start of a line: devices print them on a line
/// of their own, while echoed commands start with the prompt.
pub const DEFAULT_ERROR_PATTERNS: &[&str] = &[
    r"(?m)^\s*% ?Invalid input",
    r"(?m)^\s*% ?Incomplete command",
    r"(?m)^\s*% ?Ambiguous command",
    r"(?m)^\s*% ?Unknown command",
    r"(?m)^\s*% ?Invalid command",
    r"(?im)^\s*% ?error",
    r"(?im)^\s*syntax error",
    r"(?im)^\s*error:",
];

/// A rejected line and the marker that flagged it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMatch {
    pub marker: String,
    pub line: String,
}

/// OutputChecker scans raw device output for error markers
#[derive(Debug, Clone)]
pub struct OutputChecker {
    patterns: Vec<Regex>,
}

impl Default for OutputChecker {
    fn default() -> Self {
        // The built-in patterns are constants and always compile
        Self {
            patterns: DEFAULT_ERROR_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

impl OutputChecker {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PushError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    PushError::Config(format!("bad error pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(PushError::Config("no error patterns configured".to_string()));
        }
        Ok(Self { patterns })
    }

    /// Load one pattern per line; blank lines and `#` comments are skipped
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PushError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PushError::Config(format!("cannot read error patterns {}: {}", path.display(), e))
        })?;
        let patterns: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        Self::new(&patterns)
    }

    /// True when the output contains any known error marker
    #[cfg(test)]
    pub fn has_error(&self, output: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(output))
    }

    /// First output line carrying an error marker
    pub fn find_error(&self, output: &str) -> Option<ErrorMatch> {
        for line in output.lines() {
            for re in &self.patterns {
                if re.is_match(line) {
                    return Some(ErrorMatch {
                        marker: re.as_str().to_string(),
                        line: line.trim().to_string(),
                    });
                }
            }
        }
        None
    }
}
