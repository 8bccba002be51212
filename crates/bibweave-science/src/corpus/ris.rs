use std::collections::BTreeMap;

use crate::corpus::fields::RawEntry;
use crate::corpus::{ParsedEntries, SkippedEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RisEntry {
    pub entry_type: String,
    pub fields: BTreeMap<String, Vec<String>>,
    /// 1-based line of the `TY` tag.
    pub line: usize,
}

impl RisEntry {
    pub fn first(&self, tag: &str) -> Option<&str> {
        self.fields
            .get(tag)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn into_raw_entry(self) -> RawEntry {
        let mut raw = RawEntry::new();
        raw.insert("type", self.entry_type);
        for (tag, values) in self.fields {
            for value in values {
                match tag.as_str() {
                    "AU" | "A1" => raw.push_author(value),
                    "L1" | "L2" | "LK" => raw.insert("link", value),
                    "M1" | "M3" | "AN" => raw.insert("note", value),
                    _ => raw.insert(&tag, value),
                }
            }
        }
        raw
    }
}

/// Splits RIS text into entries. Lines that do not look like `XX  - value`
/// continue the previous field. An entry opened without a closing `ER`
/// before the next `TY` is reported as malformed.
pub fn parse_ris(content: &str) -> (Vec<RisEntry>, Vec<SkippedEntry>) {
    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    let mut current: Option<RisEntry> = None;
    let mut last_tag: Option<String> = None;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim_end().trim_start_matches('\u{feff}');
        if line.trim().is_empty() {
            continue;
        }

        let Some((tag, value)) = split_tag(line) else {
            if let (Some(entry), Some(tag)) = (current.as_mut(), last_tag.as_ref())
                && let Some(last) = entry.fields.get_mut(tag).and_then(|values| values.last_mut())
            {
                last.push(' ');
                last.push_str(line.trim());
            }
            continue;
        };

        match tag {
            "TY" => {
                if let Some(open) = current.take() {
                    tracing::warn!(line = open.line, "RIS entry without ER, skipping");
                    skipped.push(SkippedEntry {
                        position: open.line,
                        reason: format!("entry at line {} has no closing ER", open.line),
                    });
                }
                current = Some(RisEntry {
                    entry_type: value.to_string(),
                    fields: BTreeMap::new(),
                    line: line_no + 1,
                });
                last_tag = None;
            }
            "ER" => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
                last_tag = None;
            }
            _ => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                entry
                    .fields
                    .entry(tag.to_string())
                    .or_default()
                    .push(value.to_string());
                last_tag = Some(tag.to_string());
            }
        }
    }

    // A trailing entry without ER is common in hand-edited files.
    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    (entries, skipped)
}

fn split_tag(line: &str) -> Option<(&str, &str)> {
    let (tag, value) = line.split_once("  -")?;
    let tag = tag.trim();
    let well_formed = tag.len() == 2 && tag.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    well_formed.then(|| (tag, value.trim()))
}

pub fn parse_ris_corpus(content: &str) -> ParsedEntries {
    let (entries, mut skipped) = parse_ris(content);
    let mut parsed = ParsedEntries::default();
    for entry in entries {
        let line = entry.line;
        match entry.into_raw_entry().into_record() {
            Ok(record) => parsed.records.push(record),
            Err(reason) => skipped.push(SkippedEntry {
                position: line,
                reason: format!("line {line}: {reason}"),
            }),
        }
    }
    parsed.skipped = skipped;
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibweave_core::models::EntryType;

    const SAMPLE: &str = "TY  - JOUR
ID  - mnih2015human
TI  - Human-level control through
  deep reinforcement learning
AU  - Mnih, Volodymyr
AU  - Kavukcuoglu, Koray
PY  - 2015/02/26
DO  - 10.1038/nature14539
JO  - Nature
ER  -

TY  - BOOK
TI  - A book without an ID
ER  -

TY  - BOOK
ID  - abelson1996
TI  - Structure and Interpretation of Computer Programs
SN  - 0262510871
";

    #[test]
    fn parses_entries_and_continuation_lines() {
        let (entries, skipped) = parse_ris(SAMPLE);
        assert!(skipped.is_empty());
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].first("TI"),
            Some("Human-level control through deep reinforcement learning")
        );
        assert_eq!(entries[0].line, 1);
    }

    #[test]
    fn keyless_entries_are_skipped() {
        let parsed = parse_ris_corpus(SAMPLE);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped.len(), 1);

        let nature = &parsed.records[0];
        assert_eq!(nature.key, "mnih2015human");
        assert_eq!(nature.authors.len(), 2);
        assert_eq!(nature.year, Some(2015));
        assert_eq!(nature.entry_type, EntryType::Article);
        assert_eq!(nature.container_title.as_deref(), Some("Nature"));

        let sicp = &parsed.records[1];
        assert_eq!(sicp.identifiers.isbn, vec!["0262510871"]);
        assert_eq!(sicp.entry_type, EntryType::Book);
    }

    #[test]
    fn unterminated_entry_before_next_ty_is_malformed() {
        let content = "TY  - JOUR\nID  - a\nTI  - First\nTY  - JOUR\nID  - b\nTI  - Second\nER  -\n";
        let (entries, skipped) = parse_ris(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].first("ID"), Some("b"));
        assert_eq!(skipped.len(), 1);
    }
}
