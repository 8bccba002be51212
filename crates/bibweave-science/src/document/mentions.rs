//! Link nodes → mention records. The display text decides whether a link is
//! a citation: it has to carry an author + year signature.

use bibweave_core::models::{
    AuthorYearHint, CitationForm, DocumentPosition, MentionKind, MentionRecord,
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::document::{Document, LineIndex};

const PARTICLES: &str = r"(?:(?:van|von|de|der|del|den|du|da|di|le|la)\s+)*";
const NAME: &str = r"\p{Lu}[\p{L}'’\-]+";
const YEAR: &str = r"(?P<year>1[5-9]\d{2}|20\d{2})[a-z]?";

fn authors_pattern() -> String {
    let author = format!("{PARTICLES}{NAME}");
    format!(
        r"(?P<authors>{author}(?:(?:\s*,\s*{author})*\s*,?\s*(?:and|&)\s+{author})?(?:\s+et\s+al\.?)?)"
    )
}

// `Smith et al. (2020)`, `Smith and Jones (2019a)`
static IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}\s*\(\s*{YEAR}\s*\)", authors_pattern())).unwrap());

// `Smith, 2020`, `(Smith et al. 2020)`
static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{}(?:\s*,\s*|\s+){YEAR}\b", authors_pattern())).unwrap());

static SURNAME: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{PARTICLES}({NAME})")).unwrap());

/// Capitalized words that precede years without being authors.
const NOT_AUTHORS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec", "spring", "summer", "autumn", "fall", "winter", "in", "since",
    "until", "from", "before", "after", "during", "year", "version", "update", "edition",
];

/// What a link's display text says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: MentionKind,
    pub form: CitationForm,
    pub hint: AuthorYearHint,
}

pub fn classify(display_text: &str) -> Classification {
    let signature = first_author_match(&IN_TEXT, display_text)
        .map(|caps| (caps, CitationForm::InText))
        .or_else(|| {
            first_author_match(&PARENTHETICAL, display_text)
                .map(|caps| (caps, CitationForm::Parenthetical))
        });

    let Some((caps, form)) = signature else {
        return Classification {
            kind: MentionKind::PlainLink,
            form: CitationForm::default(),
            hint: AuthorYearHint::default(),
        };
    };

    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let author = caps
        .name("authors")
        .and_then(|m| SURNAME.captures(m.as_str()))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let year = caps.name("year").and_then(|m| m.as_str().parse().ok());

    let title_words = [&display_text[..whole.start], &display_text[whole.end..]]
        .iter()
        .flat_map(|part| part.split_whitespace())
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    Classification {
        kind: MentionKind::Citation,
        form,
        hint: AuthorYearHint {
            author,
            year,
            title_words,
        },
    }
}

fn first_author_match<'t>(pattern: &Regex, text: &'t str) -> Option<Captures<'t>> {
    pattern.captures_iter(text).find(|caps| {
        caps.name("authors")
            .and_then(|m| SURNAME.captures(m.as_str()))
            .and_then(|c| c.get(1))
            .is_some_and(|name| !NOT_AUTHORS.contains(&name.as_str().to_lowercase().as_str()))
    })
}

/// One mention per link outside code, ordinals in document order.
pub fn scan_mentions(document: &Document) -> Vec<MentionRecord> {
    let source = document.render();
    let lines = LineIndex::new(&source);

    document
        .links()
        .enumerate()
        .map(|(ordinal, link)| {
            let Classification { kind, form, hint } = classify(&link.text);
            let (line, column) = lines.position(link.offset);
            let display_text = link.text.split_whitespace().collect::<Vec<_>>().join(" ");
            tracing::debug!(ordinal, line, kind = %kind, url = %link.url, "mention found");
            MentionRecord {
                ordinal,
                display_text,
                url: link.url.clone(),
                hint,
                position: DocumentPosition {
                    line,
                    column,
                    offset: link.offset,
                },
                kind,
                form,
            }
        })
        .collect()
}
