use std::collections::HashMap;

use bibweave_core::config::{CiteSyntax, RewriteConfig};
use bibweave_core::models::{CitationForm, MatchOutcome, MatchResult};
use serde::{Deserialize, Serialize};

use crate::document::parser::bare_key_len;
use crate::document::{Citation, CitationSyntax, Document, Inline, Link};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteStats {
    /// Links replaced by a citation for a resolved or synthesized key.
    pub rewritten: usize,
    /// Links replaced by a citation for a placeholder key.
    pub placeholders: usize,
    pub untouched: usize,
}

/// Swaps link nodes for citation nodes. Everything else is copied as is.
#[derive(Debug, Clone)]
pub struct Rewriter {
    syntax: CiteSyntax,
    rewrite_placeholders: bool,
}

impl Rewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            syntax: config.syntax,
            rewrite_placeholders: config.rewrite_placeholders,
        }
    }

    /// `results` are matched to links by mention ordinal, the position of the
    /// link among the document's links.
    pub fn rewrite(&self, document: &Document, results: &[MatchResult]) -> (Document, RewriteStats) {
        let by_ordinal: HashMap<usize, &MatchResult> =
            results.iter().map(|r| (r.mention.ordinal, r)).collect();

        let nodes = document.nodes();
        let mut out = Vec::with_capacity(nodes.len());
        let mut stats = RewriteStats::default();
        let mut ordinal = 0;
        let mut previous: Option<char> = None;

        for (i, node) in nodes.iter().enumerate() {
            let replacement = match node {
                Inline::Link(link) => {
                    let result = by_ordinal.get(&ordinal).copied();
                    ordinal += 1;
                    // Only text can run into the citation; other nodes start with markup.
                    let following = match nodes.get(i + 1) {
                        Some(Inline::Text(text)) => text.source.as_str(),
                        _ => "",
                    };
                    let citation = result.and_then(|r| self.citation_for(link, r, previous, following));
                    match (&citation, result.map(|r| &r.outcome)) {
                        (Some(_), Some(MatchOutcome::Placeholder { .. })) => stats.placeholders += 1,
                        (Some(_), _) => stats.rewritten += 1,
                        (None, _) => stats.untouched += 1,
                    }
                    citation.map(Inline::Citation)
                }
                _ => None,
            };

            let node = replacement.unwrap_or_else(|| node.clone());
            previous = node.source().chars().next_back().or(previous);
            out.push(node);
        }

        tracing::debug!(
            rewritten = stats.rewritten,
            placeholders = stats.placeholders,
            untouched = stats.untouched,
            "document rewritten"
        );
        (Document::from_nodes(out), stats)
    }

    fn citation_for(
        &self,
        link: &Link,
        result: &MatchResult,
        previous: Option<char>,
        following: &str,
    ) -> Option<Citation> {
        let key = match &result.outcome {
            MatchOutcome::Resolved { key, .. } | MatchOutcome::Synthesized { key, .. } => key,
            MatchOutcome::Placeholder { key, .. } if self.rewrite_placeholders => key,
            MatchOutcome::Placeholder { .. } | MatchOutcome::PassedThrough => return None,
        };
        let (source, syntax) = self.markup(key, result.mention.form, previous, following);
        Some(Citation {
            source,
            offset: link.offset,
            keys: vec![key.clone()],
            syntax,
        })
    }

    fn markup(
        &self,
        key: &str,
        form: CitationForm,
        previous: Option<char>,
        following: &str,
    ) -> (String, CitationSyntax) {
        match (self.syntax, form) {
            (CiteSyntax::Latex, CitationForm::InText) => {
                (format!("\\citet{{{key}}}"), CitationSyntax::LatexInText)
            }
            (CiteSyntax::Latex, CitationForm::Parenthetical) => {
                (format!("\\citep{{{key}}}"), CitationSyntax::LatexParenthetical)
            }
            (CiteSyntax::Pandoc, form) => {
                // `[@key](…)` is a link and `@key[…]` a locator; an escape
                // keeps the following bracket literal.
                let escape_next = following.starts_with(['(', '[']);
                let key = pandoc_key(key, if escape_next { "\\" } else { following });
                // `word@key` would read as an address.
                let glued = previous.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '@');
                let (mut source, syntax) = if form == CitationForm::InText && !glued {
                    (format!("@{key}"), CitationSyntax::PandocInText)
                } else {
                    (format!("[@{key}]"), CitationSyntax::PandocBracketed)
                };
                if escape_next {
                    source.push('\\');
                }
                (source, syntax)
            }
        }
    }
}

/// Braces the key when it is not a bare key or when the text that follows
/// would otherwise be read as part of it.
fn pandoc_key(key: &str, following: &str) -> String {
    let lookahead: String = following.chars().take(2).collect();
    let joined = format!("{key}{lookahead}");
    if bare_key_len(&joined) == Some(key.len()) {
        key.to_string()
    } else {
        format!("{{{key}}}")
    }
}

#[cfg(test)]
mod tests {
    use bibweave_core::models::{MatchStrategy, MentionState, UnresolvedReason};

    use super::*;
    use crate::document::scan_mentions;

    const DOC: &str = "Transformers [Vaswani et al. (2017)](https://arxiv.org/abs/1706.03762) \
        changed NLP [Doe, 2020](https://doi.org/10.1000/abcd). \
        Unknown [Roe 2019](https://example.com/roe). \
        Docs at [the site](https://example.org).\n\
        `[Code 2020](https://doi.org/10.1000/abcd)`\n";

    fn results(doc: &Document) -> Vec<MatchResult> {
        scan_mentions(doc)
            .into_iter()
            .map(|m| match m.ordinal {
                0 => MatchResult::resolved(m, "vaswani2017attention".into(), MatchStrategy::Arxiv),
                1 => MatchResult::resolved(m, "doe2020".into(), MatchStrategy::Doi),
                2 => {
                    let mut r = MatchResult::unresolved(
                        m,
                        "unresolved-0a1b2c3d".into(),
                        UnresolvedReason::NoIdentifier,
                    );
                    r.advance(MentionState::PlaceholderAssigned).unwrap();
                    r
                }
                _ => MatchResult::passed_through(m),
            })
            .collect()
    }

    #[test]
    fn pandoc_rewrite() {
        let doc = Document::parse(DOC).unwrap();
        let (out, stats) = Rewriter::new(&RewriteConfig::default()).rewrite(&doc, &results(&doc));
        assert_eq!(
            out.render(),
            "Transformers @vaswani2017attention changed NLP [@doe2020]. \
             Unknown [Roe 2019](https://example.com/roe). \
             Docs at [the site](https://example.org).\n\
             `[Code 2020](https://doi.org/10.1000/abcd)`\n"
        );
        assert_eq!(stats, RewriteStats { rewritten: 2, placeholders: 0, untouched: 2 });
        assert_eq!(out.reference_count(), doc.reference_count());
    }

    #[test]
    fn latex_rewrite_and_placeholders() {
        let doc = Document::parse(DOC).unwrap();
        let rewriter = Rewriter::new(&RewriteConfig {
            syntax: CiteSyntax::Latex,
            rewrite_placeholders: true,
        });
        let (out, stats) = rewriter.rewrite(&doc, &results(&doc));
        let text = out.render();
        assert!(text.starts_with("Transformers \\citet{vaswani2017attention} changed NLP \\citep{doe2020}."));
        assert!(text.contains("Unknown \\citep{unresolved-0a1b2c3d}."));
        assert!(text.contains("[the site](https://example.org)"));
        assert_eq!(stats.placeholders, 1);
        assert_eq!(out.reference_count(), doc.reference_count());
    }

    #[test]
    fn rewriting_rewritten_output_changes_nothing() {
        let rewriter = Rewriter::new(&RewriteConfig::default());
        let doc = Document::parse(DOC).unwrap();
        let (once, _) = rewriter.rewrite(&doc, &results(&doc));

        let reparsed = Document::parse(&once.render()).unwrap();
        let again: Vec<_> = scan_mentions(&reparsed)
            .into_iter()
            .map(MatchResult::passed_through)
            .collect();
        let (twice, stats) = rewriter.rewrite(&reparsed, &again);
        assert_eq!(twice.render(), once.render());
        assert_eq!(stats.rewritten, 0);
        assert_eq!(reparsed.citations().count(), 2);
    }

    #[test]
    fn following_brackets_are_escaped() {
        let doc = Document::parse(
            "See [Doe, 2020](https://doi.org/10.1/x)(p3) and [Doe (2020)](https://doi.org/10.1/x)[p4].\n",
        )
        .unwrap();
        let results: Vec<_> = scan_mentions(&doc)
            .into_iter()
            .map(|m| MatchResult::resolved(m, "doe2020".into(), MatchStrategy::Doi))
            .collect();
        let (out, stats) = Rewriter::new(&RewriteConfig::default()).rewrite(&doc, &results);
        let text = out.render();
        assert_eq!(text, "See [@doe2020]\\(p3) and @doe2020\\[p4].\n");
        assert_eq!(stats.rewritten, 2);

        let reparsed = Document::parse(&text).unwrap();
        assert_eq!(reparsed.links().count(), 0);
        assert_eq!(reparsed.citations().count(), 2);
        assert_eq!(reparsed.render(), text);

        // A link right after keeps its bracket.
        let doc = Document::parse("[Doe, 2020](https://doi.org/10.1/x)[docs](https://example.org)").unwrap();
        let results: Vec<_> = scan_mentions(&doc)
            .into_iter()
            .map(|m| match m.ordinal {
                0 => MatchResult::resolved(m, "doe2020".into(), MatchStrategy::Doi),
                _ => MatchResult::passed_through(m),
            })
            .collect();
        let (out, _) = Rewriter::new(&RewriteConfig::default()).rewrite(&doc, &results);
        assert_eq!(out.render(), "[@doe2020][docs](https://example.org)");
        assert_eq!(Document::parse(&out.render()).unwrap().links().count(), 1);
    }

    #[test]
    fn keys_that_would_absorb_following_text_are_braced() {
        assert_eq!(pandoc_key("doe2020", "-based"), "{doe2020}");
        assert_eq!(pandoc_key("doe2020", ". Next"), "doe2020");
        assert_eq!(pandoc_key("odd key", ""), "{odd key}");

        let doc = Document::parse("x[Smith (2020)](https://doi.org/10.1/x)").unwrap();
        let results: Vec<_> = scan_mentions(&doc)
            .into_iter()
            .map(|m| MatchResult::resolved(m, "smith2020".into(), MatchStrategy::Doi))
            .collect();
        let (out, _) = Rewriter::new(&RewriteConfig::default()).rewrite(&doc, &results);
        assert_eq!(out.render(), "x[@smith2020]");
    }
}
