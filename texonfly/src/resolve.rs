//! Resource resolution: missing file or font name to TeX Live package names.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::console;
use crate::core::search::{
    SearchScope, lowercase_fallback, parse_search_output, strip_font_annotations,
};
use crate::core::types::{Candidate, CandidateKind};
use crate::io::repository::Repository;
use crate::io::speech::Speaker;

/// Maps candidates to packages by searching the repository.
pub struct Resolver<'a, R: Repository> {
    repository: &'a R,
    speaker: &'a Speaker,
}

impl<'a, R: Repository> Resolver<'a, R> {
    pub fn new(repository: &'a R, speaker: &'a Speaker) -> Self {
        Self {
            repository,
            speaker,
        }
    }

    /// Packages that may provide `candidate`; empty if nothing was found.
    pub fn resolve(&self, candidate: &Candidate) -> Result<BTreeSet<String>> {
        match candidate.kind {
            CandidateKind::ExplicitFile | CandidateKind::InferredFontFile => {
                self.resolve_file(&candidate.name)
            }
            CandidateKind::FontName => self.resolve_font(&candidate.name),
        }
    }

    /// Packages containing a file named exactly `name`.
    pub fn resolve_file(&self, name: &str) -> Result<BTreeSet<String>> {
        self.search(name, SearchScope::FILE)
    }

    /// Packages with font files matching `name`.
    ///
    /// Parenthesized annotations are dropped first; a name that is nothing but an
    /// annotation finds nothing. If nothing matches and the name has uppercase letters,
    /// the lowercase name is tried once more.
    pub fn resolve_font(&self, name: &str) -> Result<BTreeSet<String>> {
        let font = strip_font_annotations(name);
        if font.is_empty() {
            // An empty term would match every font in the distribution.
            debug!(name, "font name is only an annotation, skipping search");
            return Ok(BTreeSet::new());
        }
        let packages = self.search(&font, SearchScope::FONT)?;
        if !packages.is_empty() {
            return Ok(packages);
        }
        match lowercase_fallback(&font) {
            Some(lower) => self.search(&lower, SearchScope::FONT),
            None => Ok(packages),
        }
    }

    #[instrument(skip(self, scope), fields(scope = scope.prefix, strict = scope.strict))]
    fn search(&self, term: &str, scope: SearchScope) -> Result<BTreeSet<String>> {
        let label = scope.label();
        self.speaker
            .installing(&format!("Searching for missing {label}: {term}"));
        console::notice(format!("Searching repositories for missing {label} {term}"));

        let output = self.repository.search(term)?;
        let packages = parse_search_output(&output, scope, term);
        debug!(packages = ?packages, "search parsed");

        if packages.is_empty() {
            self.speaker.failed(&format!("No package found for {term}"));
            console::notice(format!("No results found for {term}"));
        } else {
            self.speaker.installing("Installing.");
            console::notice(format!(
                "Found {term} in package(s) {}; installing",
                join(&packages)
            ));
        }
        Ok(packages)
    }
}

pub(crate) fn join(packages: &BTreeSet<String>) -> String {
    packages
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::search::PLACEHOLDER_PACKAGE;
    use crate::test_support::ScriptedRepository;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn file_resolution_uses_strict_search() {
        let repository = ScriptedRepository::new()
            .with_search("foo.sty", "foopkg:\n\ttexmf-dist/tex/latex/foopkg/foo.sty\n");
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        let packages = resolver.resolve_file("foo.sty").expect("resolve");
        assert_eq!(packages, set(&["foopkg"]));
        assert_eq!(repository.searches(), vec!["foo.sty"]);
    }

    #[test]
    fn font_resolution_strips_annotations() {
        let repository = ScriptedRepository::new().with_search(
            "Cambria",
            "texmf-dist/fonts/truetype/cambria/Cambria.ttf\n",
        );
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        let packages = resolver.resolve_font("Cambria(0)").expect("resolve");
        assert_eq!(packages, set(&["cambria", "truetype"]));
        assert_eq!(repository.searches(), vec!["Cambria"]);
    }

    #[test]
    fn font_resolution_retries_lowercase_exactly_once() {
        let repository = ScriptedRepository::new();
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        let packages = resolver.resolve_font("LinLibertine").expect("resolve");
        assert!(packages.is_empty());
        assert_eq!(repository.searches(), vec!["LinLibertine", "linlibertine"]);
    }

    #[test]
    fn lowercase_font_is_not_retried() {
        let repository = ScriptedRepository::new();
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        assert!(resolver.resolve_font("libertine").expect("resolve").is_empty());
        assert_eq!(repository.searches(), vec!["libertine"]);
    }

    #[test]
    fn lowercase_retry_can_succeed() {
        let repository = ScriptedRepository::new().with_search(
            "libertine",
            "texmf-dist/fonts/type1/public/libertine/fxlr.pfb\n",
        );
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        let packages = resolver.resolve_font("Libertine").expect("resolve");
        assert_eq!(packages, set(&["libertine", "public"]));
    }

    #[test]
    fn annotation_only_font_is_not_searched() {
        let repository = ScriptedRepository::new()
            .with_search("", "texmf-dist/fonts/type1/public/libertine/fxlr.pfb\n");
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        assert!(resolver.resolve_font("(Bold)").expect("resolve").is_empty());
        assert!(resolver.resolve_font("  ").expect("resolve").is_empty());
        assert!(repository.searches().is_empty());
    }

    #[test]
    fn candidates_dispatch_by_kind() {
        let repository = ScriptedRepository::new()
            .with_search("ecrm1000.tfm", "texmf-dist/fonts/tfm/jknappen/ec/ecrm1000.tfm\n");
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        let packages = resolver
            .resolve(&Candidate::new(CandidateKind::InferredFontFile, "ecrm1000.tfm"))
            .expect("resolve");
        assert_eq!(packages, set(&["ec", "jknappen"]));
    }

    #[test]
    fn placeholder_never_escapes_resolution() {
        let repository = ScriptedRepository::new()
            .with_search("x.sty", "texmf-dist/tex/latex/x.sty\ntexmf-dist/latex/x.sty\n");
        let speaker = Speaker::silent();
        let resolver = Resolver::new(&repository, &speaker);

        let packages = resolver.resolve_file("x.sty").expect("resolve");
        assert!(!packages.contains(PLACEHOLDER_PACKAGE));
        assert_eq!(packages, set(&["tex", "texmf-dist"]));
    }
}
