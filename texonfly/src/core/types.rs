//! Shared deterministic types for the compile loop.

use std::fmt;

/// Detection category of a missing resource, declared in priority order.
///
/// Explicit "file not found" errors are the most reliable signal, a metric file inferred
/// from a font error comes next, and a bare font name pulled out of a font error is the
/// brute-force last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandidateKind {
    ExplicitFile,
    InferredFontFile,
    FontName,
}

impl CandidateKind {
    /// All categories, highest priority first.
    pub const PRIORITY: [CandidateKind; 3] = [
        CandidateKind::ExplicitFile,
        CandidateKind::InferredFontFile,
        CandidateKind::FontName,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            CandidateKind::ExplicitFile => 0,
            CandidateKind::InferredFontFile => 1,
            CandidateKind::FontName => 2,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::ExplicitFile => write!(f, "explicit-file"),
            CandidateKind::InferredFontFile => write!(f, "inferred-font-file"),
            CandidateKind::FontName => write!(f, "brute-font-name"),
        }
    }
}

/// A missing file or font name detected in compiler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub name: String,
}

impl Candidate {
    pub fn new(kind: CandidateKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Missing-resource names extracted from one compile, per category, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub explicit_files: Vec<String>,
    pub inferred_font_files: Vec<String>,
    pub font_names: Vec<String>,
}

impl Diagnostics {
    /// All names found for `kind`.
    pub fn names(&self, kind: CandidateKind) -> &[String] {
        match kind {
            CandidateKind::ExplicitFile => &self.explicit_files,
            CandidateKind::InferredFontFile => &self.inferred_font_files,
            CandidateKind::FontName => &self.font_names,
        }
    }

    /// First name found for `kind`, the only one the loop acts on.
    ///
    /// A blank first match disables the category for this compile.
    pub fn first(&self, kind: CandidateKind) -> Option<&str> {
        self.names(kind)
            .first()
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        CandidateKind::PRIORITY
            .iter()
            .all(|kind| self.first(*kind).is_none())
    }
}

/// Whether the current user may modify the TeX Live installation directly.
///
/// Detected once at startup and fixed for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// `tlmgr` can be run as-is.
    Direct,
    /// Updates and installs must go through privilege escalation.
    Escalate,
}
