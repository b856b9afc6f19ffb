//! Per-category memory of the candidates the loop has already acted on.
//!
//! This is the loop's only progress signal: a category is eligible only while its first
//! candidate differs from the last one acted on in that same category. Slots are kept
//! per category so interleaved file and font errors do not mask each other.

use crate::core::types::{Candidate, CandidateKind, Diagnostics};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationMemory {
    last: [Option<String>; 3],
}

impl IterationMemory {
    /// Last candidate acted on in `kind`, if any.
    pub fn last(&self, kind: CandidateKind) -> Option<&str> {
        self.last[kind.slot()].as_deref()
    }

    /// True if `name` differs from the last candidate acted on in `kind`.
    pub fn is_new(&self, kind: CandidateKind, name: &str) -> bool {
        self.last(kind) != Some(name)
    }

    /// Remember `candidate` as the last one acted on in its category.
    pub fn record(&mut self, candidate: &Candidate) {
        self.last[candidate.kind.slot()] = Some(candidate.name.clone());
    }

    /// First candidate of each category that has not been acted on, highest priority first.
    ///
    /// An empty result means the loop has converged.
    pub fn pending(&self, diagnostics: &Diagnostics) -> Vec<Candidate> {
        CandidateKind::PRIORITY
            .iter()
            .filter_map(|kind| {
                diagnostics
                    .first(*kind)
                    .filter(|name| self.is_new(*kind, name))
                    .map(|name| Candidate::new(*kind, name))
            })
            .collect()
    }
}
