//! Canonical path forms for output records and destination checks.

use crate::config::PathSubstitution;
use std::path::{Path, PathBuf};

/// Converts local filesystem paths into the form written to output records.
///
/// Paths are made absolute, then the first configured prefix substitution
/// that matches is applied (e.g. a local mount point rewritten to the
/// network share it was mounted from).
#[derive(Debug, Clone, Default)]
pub struct PathNormalizer {
    substitutions: Vec<PathSubstitution>,
}

impl PathNormalizer {
    pub fn new(substitutions: Vec<PathSubstitution>) -> Self {
        Self { substitutions }
    }

    pub fn normalize(&self, path: &Path) -> String {
        let absolute = absolute_path(path);
        let display = absolute.to_string_lossy().to_string();

        for substitution in &self.substitutions {
            if let Some(rest) = strip_prefix(&display, &substitution.from) {
                let rest = rest.trim_start_matches(['/', '\\']);
                if rest.is_empty() {
                    return substitution.to.clone();
                }
                let separator = if substitution.to.contains('\\') { '\\' } else { '/' };
                return format!(
                    "{}{}{}",
                    substitution.to.trim_end_matches(['/', '\\']),
                    separator,
                    rest
                );
            }
        }

        display
    }

    pub fn normalize_all(&self, paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| self.normalize(p)).collect()
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

/// Prefix match on whole path components only.
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches(['/', '\\']);
    if prefix.is_empty() {
        return None;
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with(['/', '\\']) {
        Some(rest)
    } else {
        None
    }
}

/// Append the first allowed extension unless the path already has one of them.
pub fn ensure_extension(path: &Path, allowed: &[&str]) -> PathBuf {
    let has_allowed = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false);

    if has_allowed || allowed.is_empty() {
        return path.to_path_buf();
    }

    let mut with_ext = path.as_os_str().to_os_string();
    with_ext.push(".");
    with_ext.push(allowed[0]);
    PathBuf::from(with_ext)
}
