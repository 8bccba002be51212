use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{
    Citation, CitationSyntax, Code, CodeBlock, Image, Inline, Inlines, Link, Text,
};
use crate::error::{DocumentError, Result};

// Pandoc citation keys: internal punctuation must be followed by a word char.
const KEY: &str = r"[\p{L}\p{N}_](?:[\p{L}\p{N}_]|[:.#$%&\-+?<>~/][\p{L}\p{N}_])*";

static KEY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{KEY}")).unwrap());

/// Length of the bare citation key at the start of `text`, if any.
pub(crate) fn bare_key_len(text: &str) -> Option<usize> {
    KEY_PREFIX.find(text).map(|m| m.end())
}

static IN_TEXT_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^@(?:\{{([^{{}}\s]+)\}}|({KEY}))")).unwrap());

static BRACKETED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?:^|[\s;\[])-?@(?:\{{([^{{}}\s]+)\}}|({KEY}))")).unwrap()
});

static LATEX_CITATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\\(citet|citep|cite|textcite|parencite|autocite)\*?(?:\[[^\]\n]*\]){0,2}\{([^}\n]+)\}")
        .unwrap()
});

pub(crate) fn parse(source: &str) -> Result<Inlines> {
    Parser::new(source).run()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    text_start: Option<usize>,
    nodes: Inlines,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            text_start: None,
            nodes: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Inlines> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut at_line_start = true;

        while self.pos < src.len() {
            if at_line_start {
                if let Some(end) = self.fenced_block()? {
                    self.pos = end;
                    continue;
                }
            }

            let b = bytes[self.pos];
            let consumed = match b {
                b'`' => self.code_span(),
                b'\\' => self.backslash(),
                b'!' => self.image(),
                b'[' => self.link().or_else(|| self.bracketed_citation()),
                b'@' => self.in_text_citation(),
                _ => None,
            };

            match consumed {
                Some(end) => {
                    self.line += src[self.pos..end].matches('\n').count();
                    at_line_start = src[..end].ends_with('\n');
                    self.pos = end;
                }
                None => {
                    let ch = src[self.pos..].chars().next().unwrap_or('\0');
                    self.text_start.get_or_insert(self.pos);
                    self.pos += ch.len_utf8().max(1);
                    at_line_start = ch == '\n';
                    if at_line_start {
                        self.line += 1;
                    }
                }
            }
        }

        self.flush_text(src.len());
        Ok(self.nodes)
    }

    fn flush_text(&mut self, end: usize) {
        let src = self.src;
        if let Some(start) = self.text_start.take() {
            if start < end {
                self.nodes.push(Inline::Text(Text {
                    source: src[start..end].to_string(),
                    offset: start,
                }));
            }
        }
    }

    fn push(&mut self, node: Inline) {
        self.flush_text(node.offset());
        self.nodes.push(node);
    }

    /// Consumes a fenced block starting at the current line. Returns the
    /// byte offset just past the closing fence line.
    fn fenced_block(&mut self) -> Result<Option<usize>> {
        let src = self.src;
        let start = self.pos;
        let open_end = line_end(src, start);
        let line = &src[start..open_end];

        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            return Ok(None);
        }
        let rest = &line[indent..];
        let Some(fence_char) = rest.chars().next().filter(|c| *c == '`' || *c == '~') else {
            return Ok(None);
        };
        let fence_len = rest.chars().take_while(|c| *c == fence_char).count();
        if fence_len < 3 {
            return Ok(None);
        }
        let info = rest[fence_len..].trim();
        if fence_char == '`' && info.contains('`') {
            return Ok(None);
        }

        let opening_line = self.line;
        let mut cursor = next_line(src, open_end);
        let mut lines = 1;
        while cursor < src.len() {
            let end = line_end(src, cursor);
            let candidate = src[cursor..end].trim_end_matches('\r');
            lines += 1;
            if is_closing_fence(candidate, fence_char, fence_len) {
                let block_end = next_line(src, end);
                self.push(Inline::CodeBlock(CodeBlock {
                    source: src[start..block_end].to_string(),
                    offset: start,
                    info: info.to_string(),
                }));
                self.line += lines;
                return Ok(Some(block_end));
            }
            cursor = next_line(src, end);
        }

        Err(DocumentError::UnterminatedFence(opening_line).into())
    }

    fn code_span(&mut self) -> Option<usize> {
        let src = self.src;
        let start = self.pos;
        let run = run_length(src, start, b'`');
        let mut cursor = start + run;
        while let Some(found) = src[cursor..].find('`') {
            let at = cursor + found;
            let len = run_length(src, at, b'`');
            if len == run {
                let end = at + len;
                self.push(Inline::Code(Code {
                    source: src[start..end].to_string(),
                    offset: start,
                }));
                return Some(end);
            }
            cursor = at + len;
        }
        // No closing run: the backticks are literal.
        self.text_start.get_or_insert(start);
        Some(start + run)
    }

    fn backslash(&mut self) -> Option<usize> {
        let src = self.src;
        let start = self.pos;
        if let Some(m) = LATEX_CITATION.captures(&src[start..]) {
            let end = start + m[0].len();
            let syntax = match &m[1] {
                "citet" | "textcite" => CitationSyntax::LatexInText,
                _ => CitationSyntax::LatexParenthetical,
            };
            let keys = m[2]
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned)
                .collect();
            self.push(Inline::Citation(Citation {
                source: src[start..end].to_string(),
                offset: start,
                keys,
                syntax,
            }));
            return Some(end);
        }

        // An escaped character stays text and never opens markup.
        let escaped = src[start + 1..].chars().next()?;
        self.text_start.get_or_insert(start);
        Some(start + 1 + escaped.len_utf8())
    }

    fn image(&mut self) -> Option<usize> {
        let src = self.src;
        let start = self.pos;
        if src.as_bytes().get(start + 1) != Some(&b'[') {
            return None;
        }
        let (alt, url, end) = link_parts(src, start + 1)?;
        self.push(Inline::Image(Image {
            source: src[start..end].to_string(),
            offset: start,
            alt,
            url,
        }));
        Some(end)
    }

    fn link(&mut self) -> Option<usize> {
        let src = self.src;
        let start = self.pos;
        let (text, url, end) = link_parts(src, start)?;
        self.push(Inline::Link(Link {
            source: src[start..end].to_string(),
            offset: start,
            text,
            url,
        }));
        Some(end)
    }

    fn bracketed_citation(&mut self) -> Option<usize> {
        let src = self.src;
        let start = self.pos;
        let close = matching_bracket(src, start)?;
        let inner = &src[start + 1..close];
        if inner.contains('[') {
            return None;
        }
        let keys: Vec<String> = BRACKETED_KEY
            .captures_iter(inner)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string())
            .collect();
        if keys.is_empty() {
            return None;
        }
        let end = close + 1;
        self.push(Inline::Citation(Citation {
            source: src[start..end].to_string(),
            offset: start,
            keys,
            syntax: CitationSyntax::PandocBracketed,
        }));
        Some(end)
    }

    fn in_text_citation(&mut self) -> Option<usize> {
        let src = self.src;
        let start = self.pos;
        // `name@host` is an address, not a citation.
        let prev = src[..start].chars().next_back();
        if prev.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '@') {
            return None;
        }
        let caps = IN_TEXT_CITATION.captures(&src[start..])?;
        let key = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
        let end = start + caps[0].len();
        self.push(Inline::Citation(Citation {
            source: src[start..end].to_string(),
            offset: start,
            keys: vec![key],
            syntax: CitationSyntax::PandocInText,
        }));
        Some(end)
    }
}

fn line_end(src: &str, from: usize) -> usize {
    src[from..].find('\n').map_or(src.len(), |i| from + i)
}

fn next_line(src: &str, line_end: usize) -> usize {
    (line_end + 1).min(src.len())
}

fn run_length(src: &str, from: usize, byte: u8) -> usize {
    src.as_bytes()[from..].iter().take_while(|b| **b == byte).count()
}

fn is_closing_fence(line: &str, fence_char: char, min_len: usize) -> bool {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let len = rest.chars().take_while(|c| *c == fence_char).count();
    len >= min_len && rest[len..].trim().is_empty()
}

/// Index of the `]` closing the `[` at `open`, skipping escapes and nested
/// pairs. A blank line ends the search.
fn matching_bracket(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'\n' if src[i + 1..].starts_with('\n') || src[i + 1..].starts_with("\r\n") => {
                return None;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// `[text](destination "title")` starting at `open`. Returns the raw text,
/// the destination and the end offset.
fn link_parts(src: &str, open: usize) -> Option<(String, String, usize)> {
    let close = matching_bracket(src, open)?;
    if src.as_bytes().get(close + 1) != Some(&b'(') {
        return None;
    }
    let text = src[open + 1..close].to_string();

    let bytes = src.as_bytes();
    let mut i = close + 2;
    while bytes.get(i).is_some_and(|b| *b == b' ') {
        i += 1;
    }

    let url = if bytes.get(i) == Some(&b'<') {
        let rel = src[i + 1..].find(['>', '\n'])?;
        if bytes[i + 1 + rel] != b'>' {
            return None;
        }
        let url = src[i + 1..i + 1 + rel].to_string();
        i += rel + 2;
        url
    } else {
        let url_start = i;
        let mut depth = 0usize;
        while let Some(&b) = bytes.get(i) {
            match b {
                b'\\' => i += 1,
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                b' ' | b'\t' | b'\n' => break,
                _ => {}
            }
            i += 1;
        }
        src.get(url_start..i)?.to_string()
    };

    // Optional title.
    while bytes.get(i).is_some_and(|b| *b == b' ' || *b == b'\t') {
        i += 1;
    }
    if let Some(&quote) = bytes.get(i).filter(|b| matches!(**b, b'"' | b'\'')) {
        let rel = src[i + 1..].find(quote as char)?;
        i += rel + 2;
        while bytes.get(i).is_some_and(|b| *b == b' ') {
            i += 1;
        }
    }

    (bytes.get(i) == Some(&b')')).then(|| (text, url, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<&'static str> {
        parse(src)
            .unwrap()
            .iter()
            .map(|n| match n {
                Inline::Text(_) => "text",
                Inline::Code(_) => "code",
                Inline::CodeBlock(_) => "block",
                Inline::Link(_) => "link",
                Inline::Citation(_) => "cite",
                Inline::Image(_) => "image",
            })
            .collect()
    }

    #[test]
    fn links_with_titles_and_parens_in_urls() {
        let nodes = parse(r#"[Doe (2019)](https://en.wikipedia.org/wiki/Foo_(bar) "t")."#).unwrap();
        let Inline::Link(link) = &nodes[0] else {
            panic!("expected link, got {nodes:?}");
        };
        assert_eq!(link.url, "https://en.wikipedia.org/wiki/Foo_(bar)");
        assert_eq!(link.text, "Doe (2019)");
        assert_eq!(kinds(r#"[a](<https://x.org/a b>) x"#), vec!["link", "text"]);
    }

    #[test]
    fn brackets_without_destination_are_text() {
        assert_eq!(kinds("[just brackets] and [x] (y)"), vec!["text"]);
        assert_eq!(kinds(r"\[escaped](https://x.org)"), vec!["text"]);
    }

    #[test]
    fn email_addresses_are_not_citations() {
        assert_eq!(kinds("mail jane@example.org now"), vec!["text"]);
        let nodes = parse("per @smith2020.").unwrap();
        let Inline::Citation(c) = &nodes[1] else {
            panic!("expected citation");
        };
        assert_eq!(c.keys, vec!["smith2020"]);
        assert_eq!(c.source, "@smith2020");
    }

    #[test]
    fn braced_and_latex_citations() {
        let nodes = parse(r"@{odd key}x \citep[p.~3]{a, b} \citet{c}").unwrap();
        let cites: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                Inline::Citation(c) => Some((c.keys.clone(), c.syntax)),
                _ => None,
            })
            .collect();
        assert_eq!(cites.len(), 2);
        assert_eq!(cites[0], (vec!["a".to_string(), "b".to_string()], CitationSyntax::LatexParenthetical));
        assert_eq!(cites[1], (vec!["c".to_string()], CitationSyntax::LatexInText));
    }

    #[test]
    fn code_spans_hide_markup() {
        assert_eq!(kinds("``a `[x](y)` b`` [x](y)"), vec!["code", "text", "link"]);
        assert_eq!(kinds("unclosed `tick [x](y)"), vec!["text", "link"]);
    }

    #[test]
    fn fences_need_three_chars_and_matching_close() {
        assert_eq!(kinds("~~~\n[x](y)\n~~~~\nafter"), vec!["block", "text"]);
        assert_eq!(kinds("``\n[x](y)\n``"), vec!["code"]);
        // A shorter closing fence does not close.
        assert!(parse("````\ncode\n```\n").is_err());
        // Inline triple backticks are a code span, not a fence.
        assert_eq!(kinds("```inline``` text"), vec!["code", "text"]);
    }
}
