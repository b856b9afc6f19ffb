//! Parsing of `tlmgr search --global --file` output into package names.
//!
//! Result lines look like `texmf-dist/tex/latex/<package>/<file>`; the package is the
//! directory holding the file, or occasionally the one above it.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Generic match that the repository reports for almost any term. Inserted before
/// parsing and removed afterwards so it can never reach an install.
pub const PLACEHOLDER_PACKAGE: &str = "latex";

/// Where and how strictly a search term must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchScope {
    /// Result lines must start with this prefix.
    pub prefix: &'static str,
    /// Require the term to be the final path segment of a result line.
    pub strict: bool,
}

impl SearchScope {
    /// Whole distribution, exact file name.
    pub const FILE: SearchScope = SearchScope {
        prefix: "texmf-dist/",
        strict: true,
    };

    /// Font subtree, substring match.
    pub const FONT: SearchScope = SearchScope {
        prefix: "texmf-dist/fonts/",
        strict: false,
    };

    pub fn label(&self) -> &'static str {
        if self.prefix.contains("fonts") {
            "font"
        } else {
            "file"
        }
    }

    fn matches(&self, line: &str, term: &str) -> bool {
        line.starts_with(self.prefix)
            && (!self.strict
                || line
                    .strip_suffix(term)
                    .is_some_and(|head| head.ends_with('/')))
    }
}

static PARENTHESIZED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((.*)\)").unwrap());

/// Extract the deduplicated package names from raw search output.
pub fn parse_search_output(output: &str, scope: SearchScope, term: &str) -> BTreeSet<String> {
    let mut packages = BTreeSet::new();
    packages.insert(PLACEHOLDER_PACKAGE.to_string());

    for line in output.lines().map(str::trim) {
        if !scope.matches(line, term) {
            continue;
        }
        let segments: Vec<&str> = line.split('/').map(str::trim).collect();
        let n = segments.len();
        // Nested layouts put the package one directory further up.
        for offset in [2, 3] {
            if let Some(segment) = n.checked_sub(offset).map(|i| segments[i])
                && !segment.is_empty()
            {
                packages.insert(segment.to_string());
            }
        }
    }

    packages.remove(PLACEHOLDER_PACKAGE);
    packages
}

/// Drop style annotations such as `(Bold)` that font errors append to names.
pub fn strip_font_annotations(font: &str) -> String {
    PARENTHESIZED.replace_all(font, "").trim().to_string()
}

/// The all-lowercase variant of `term`, if it differs from `term`.
pub fn lowercase_fallback(term: &str) -> Option<String> {
    if term.chars().any(char::is_uppercase) {
        Some(term.to_lowercase())
    } else {
        None
    }
}
