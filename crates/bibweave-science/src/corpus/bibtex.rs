use biblatex::{Bibliography, ChunksExt};

use crate::corpus::fields::RawEntry;
use crate::corpus::{ParsedEntries, SkippedEntry};

/// Parses a BibTeX/BibLaTeX export. When the file as a whole does not parse,
/// every `@entry{...}` block is retried on its own so a single broken entry
/// only costs that entry.
pub fn parse_bibtex_corpus(content: &str) -> ParsedEntries {
    match Bibliography::parse(content) {
        Ok(bibliography) => records_from_bibliography(&bibliography, 0),
        Err(e) => {
            tracing::warn!(error = %e, "BibTeX file does not parse as a whole, parsing entry by entry");
            parse_entry_by_entry(content)
        }
    }
}

fn records_from_bibliography(bibliography: &Bibliography, line: usize) -> ParsedEntries {
    let mut parsed = ParsedEntries::default();
    for (index, entry) in bibliography.iter().enumerate() {
        let mut raw = RawEntry::new();
        raw.insert("key", entry.key.clone());
        raw.insert("type", entry.entry_type.to_string());
        for (name, chunks) in &entry.fields {
            raw.insert(name, chunks.format_verbatim());
        }
        match raw.into_record() {
            Ok(record) => parsed.records.push(record),
            Err(reason) => parsed.skipped.push(SkippedEntry {
                position: if line == 0 { index } else { line },
                reason,
            }),
        }
    }
    parsed
}

fn parse_entry_by_entry(content: &str) -> ParsedEntries {
    let blocks = split_blocks(content);

    // @string macros are shared by every entry; keep them in front of each retry.
    let macros: String = blocks
        .iter()
        .filter(|block| block.kind.eq_ignore_ascii_case("string"))
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    let mut parsed = ParsedEntries::default();
    for block in blocks {
        if ["string", "comment", "preamble"]
            .iter()
            .any(|kind| block.kind.eq_ignore_ascii_case(kind))
        {
            continue;
        }
        let source = format!("{macros}\n{}", block.text);
        match Bibliography::parse(&source) {
            Ok(bibliography) if !bibliography.is_empty() => {
                let single = records_from_bibliography(&bibliography, block.line);
                parsed.records.extend(single.records);
                parsed.skipped.extend(single.skipped);
            }
            Ok(_) => parsed.skipped.push(SkippedEntry {
                position: block.line,
                reason: "entry produced no record".to_string(),
            }),
            Err(e) => {
                tracing::warn!(line = block.line, error = %e, "skipping malformed BibTeX entry");
                parsed.skipped.push(SkippedEntry {
                    position: block.line,
                    reason: format!("line {}: {e}", block.line),
                });
            }
        }
    }
    parsed
}

struct Block<'a> {
    kind: &'a str,
    text: &'a str,
    /// 1-based line of the `@`.
    line: usize,
}

/// Cuts the file at each top-level `@kind{` or `@kind(` and runs to the
/// matching close. An unbalanced block runs to the next `@` at line start.
fn split_blocks(content: &str) -> Vec<Block<'_>> {
    let bytes = content.as_bytes();
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(rel) = content[pos..].find('@') {
        let start = pos + rel;
        let kind_end = content[start + 1..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .map(|i| start + 1 + i)
            .unwrap_or(content.len());
        let kind = &content[start + 1..kind_end];
        let open = content[kind_end..]
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| (kind_end + i, c));

        let Some((open_at, open_char @ ('{' | '('))) = open else {
            pos = start + 1;
            continue;
        };
        if kind.is_empty() {
            pos = start + 1;
            continue;
        }
        let close_char = if open_char == '{' { b'}' } else { b')' };
        let open_byte = open_char as u8;

        let mut depth = 0usize;
        let mut end = None;
        for (offset, &b) in bytes[open_at..].iter().enumerate() {
            if b == open_byte {
                depth += 1;
            } else if b == close_char {
                depth -= 1;
                if depth == 0 {
                    end = Some(open_at + offset + 1);
                    break;
                }
            }
        }
        let end = end.unwrap_or_else(|| {
            content[open_at..]
                .find("\n@")
                .map(|i| open_at + i + 1)
                .unwrap_or(content.len())
        });

        blocks.push(Block {
            kind,
            text: &content[start..end],
            line: content[..start].matches('\n').count() + 1,
        });
        pos = end.max(start + 1);
    }
    blocks
}
