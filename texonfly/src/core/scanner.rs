//! Missing-resource detection in TeX compiler output.
//!
//! TeX engines report missing files and fonts in a handful of fixed phrasings. Each
//! category is extracted independently; matching is best-effort and purely textual.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Diagnostics;

/// Extension of the metric file implied by a failed font load.
pub const FONT_METRIC_EXTENSION: &str = ".tfm";

static LATEX_FILE_NOT_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"! LaTeX Error: File `([^`']*)' not found").unwrap());

static TEX_CANT_FIND_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"! I can't find file `([^`']*)'.").unwrap());

static FONT_METRIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"! Font \\[^=]*=(\S*)\s").unwrap());

static FONT_FILE_SPEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"! Font [^\n]*file:([^:\n]*):").unwrap());

static FONT_FAMILY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"! Font \\[^/]*/([^/]*)/").unwrap());

/// Extract missing-resource candidates from one compile's captured output.
///
/// `document` is the file being compiled; TeX reports it as missing when the path is
/// wrong, and installing packages can never fix that, so it is dropped.
pub fn scan(text: &str, document: &str) -> Diagnostics {
    let document_name = Path::new(document)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(document);

    let explicit_files = captures_in_order(text, &[&LATEX_FILE_NOT_FOUND, &TEX_CANT_FIND_FILE])
        .into_iter()
        .filter(|name| name != document && name != document_name)
        .collect();

    let inferred_font_files = captures_in_order(text, &[&FONT_METRIC])
        .into_iter()
        .map(|name| format!("{name}{FONT_METRIC_EXTENSION}"))
        .collect();

    let font_names = captures_in_order(text, &[&FONT_FILE_SPEC, &FONT_FAMILY]);

    Diagnostics {
        explicit_files,
        inferred_font_files,
        font_names,
    }
}

/// First capture group of every match of every pattern, sorted by position in `text`.
fn captures_in_order(text: &str, patterns: &[&Regex]) -> Vec<String> {
    let mut found: Vec<(usize, String)> = patterns
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect();
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CandidateKind;

    #[test]
    fn explicit_latex_error_is_detected() {
        let text = "(./paper.tex\n! LaTeX Error: File `foo.sty' not found.\n\nType X to quit";
        let found = scan(text, "paper.tex");
        assert_eq!(found.explicit_files, vec!["foo.sty"]);
        assert_eq!(found.first(CandidateKind::ExplicitFile), Some("foo.sty"));
    }

    #[test]
    fn plain_tex_phrasing_is_detected() {
        let text = "! I can't find file `tikz.tex'.\nl.3 \\input tikz";
        let found = scan(text, "paper.tex");
        assert_eq!(found.explicit_files, vec!["tikz.tex"]);
    }

    #[test]
    fn explicit_matches_follow_document_order_across_phrasings() {
        let text = "! I can't find file `first.tex'.\n\
                    ! LaTeX Error: File `second.sty' not found.\n";
        let found = scan(text, "paper.tex");
        assert_eq!(found.explicit_files, vec!["first.tex", "second.sty"]);
    }

    #[test]
    fn document_itself_is_never_a_candidate() {
        let text = "! I can't find file `paper.tex'.\n! I can't find file `paper.tex'.";
        assert!(scan(text, "paper.tex").explicit_files.is_empty());
        assert!(scan(text, "chapters/paper.tex").explicit_files.is_empty());
    }

    #[test]
    fn font_metric_file_is_inferred() {
        let text = "! Font \\T1/cmr/m/n/10=ecrm1000 at 10.0pt not loadable: \
                    Metric (TFM) file not found.";
        let found = scan(text, "paper.tex");
        assert_eq!(found.inferred_font_files, vec!["ecrm1000.tfm"]);
        assert_eq!(found.font_names, vec!["cmr"]);
        assert!(found.explicit_files.is_empty());
    }

    #[test]
    fn font_file_spec_exposes_bare_name() {
        let text = "! Font \\zf@basefont=file:lmroman10-regular:mode=node; at 10pt not loadable";
        let found = scan(text, "paper.tex");
        assert_eq!(found.font_names, vec!["lmroman10-regular"]);
    }

    #[test]
    fn clean_output_yields_nothing() {
        let text = "Output written on paper.pdf (1 page, 1234 bytes).\n";
        assert!(scan(text, "paper.tex").is_empty());
    }
}
