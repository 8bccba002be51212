use serde_json::{Map, Value};

use crate::corpus::fields::RawEntry;
use crate::corpus::{ParsedEntries, SkippedEntry};
use crate::error::{CorpusError, Result};

/// Accepts CSL-JSON arrays, Zotero web API item arrays (`{key, data}`),
/// `{"items": [...]}` wrappers and flat record arrays.
pub fn parse_json_corpus(content: &str, source_name: &str) -> Result<ParsedEntries> {
    let value: Value = serde_json::from_str(content).map_err(|e| CorpusError::Read {
        path: source_name.into(),
        message: format!("invalid JSON: {e}"),
    })?;
    let items = json_items(value).ok_or_else(|| {
        CorpusError::UnsupportedFormat(format!("{source_name}: expected an array of records"))
    })?;
    Ok(parse_json_items(&items))
}

/// Unwraps the top-level container into the list of entries.
pub fn json_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => ["items", "records", "references", "data"]
            .iter()
            .find_map(|name| match map.remove(*name) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        _ => None,
    }
}

pub fn parse_json_items(items: &[Value]) -> ParsedEntries {
    let mut parsed = ParsedEntries::default();
    for (position, item) in items.iter().enumerate() {
        let outcome = match item {
            Value::Object(map) => raw_entry_from_object(map).into_record(),
            other => Err(format!("expected an object, found {}", json_kind(other))),
        };
        match outcome {
            Ok(record) => parsed.records.push(record),
            Err(reason) => parsed.skipped.push(SkippedEntry { position, reason }),
        }
    }
    parsed
}

fn raw_entry_from_object(map: &Map<String, Value>) -> RawEntry {
    let mut entry = RawEntry::new();

    // Zotero web API: {"key": "ABCD1234", "data": {...}}
    if let Some(Value::Object(data)) = map.get("data") {
        collect_fields(&mut entry, data);
        if let Some(Value::String(key)) = map.get("key") {
            entry.insert("key", key.as_str());
        }
        return entry;
    }

    collect_fields(&mut entry, map);
    entry
}

fn collect_fields(entry: &mut RawEntry, map: &Map<String, Value>) {
    for (name, value) in map {
        let folded = crate::corpus::fields::fold_key(name);
        match folded.as_str() {
            "author" | "authors" | "creators" => collect_authors(entry, value),
            _ => collect_value(entry, name, value),
        }
    }
}

fn collect_value(entry: &mut RawEntry, name: &str, value: &Value) {
    match value {
        Value::String(s) => entry.insert(name, s.as_str()),
        Value::Number(n) => entry.insert(name, n.to_string()),
        Value::Array(values) => {
            for v in values {
                match v {
                    Value::String(s) => entry.insert(name, s.as_str()),
                    Value::Number(n) => entry.insert(name, n.to_string()),
                    _ => {}
                }
            }
        }
        Value::Object(obj) => {
            // CSL dates: {"date-parts": [[2017, 6, 12]]} or {"raw": "2017"}
            if let Some(year) = obj
                .get("date-parts")
                .and_then(|parts| parts.get(0))
                .and_then(|first| first.get(0))
            {
                match year {
                    Value::Number(n) => entry.insert(name, n.to_string()),
                    Value::String(s) => entry.insert(name, s.as_str()),
                    _ => {}
                }
            } else if let Some(Value::String(raw)) = obj.get("raw").or_else(|| obj.get("literal")) {
                entry.insert(name, raw.as_str());
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

fn collect_authors(entry: &mut RawEntry, value: &Value) {
    match value {
        Value::String(s) => entry.insert("author", s.as_str()),
        Value::Array(people) => {
            let named: Vec<(Option<&str>, String)> = people
                .iter()
                .filter_map(|person| match person {
                    Value::String(s) => Some((None, s.clone())),
                    Value::Object(obj) => person_name(obj).map(|name| {
                        (obj.get("creatorType").and_then(Value::as_str), name)
                    }),
                    _ => None,
                })
                .collect();
            // Zotero creators mix authors with editors; prefer the authors.
            let has_typed_authors = named.iter().any(|(role, _)| *role == Some("author"));
            for (role, name) in named {
                if !has_typed_authors || role == Some("author") {
                    entry.push_author(name);
                }
            }
        }
        _ => {}
    }
}

fn person_name(obj: &Map<String, Value>) -> Option<String> {
    let text = |k: &str| obj.get(k).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty());
    let family = text("family").or_else(|| text("lastName"));
    let given = text("given").or_else(|| text("firstName"));
    match (family, given) {
        (Some(f), Some(g)) => Some(format!("{f}, {g}")),
        (Some(f), None) => Some(f.to_string()),
        (None, Some(g)) => Some(g.to_string()),
        (None, None) => text("literal").or_else(|| text("name")).map(str::to_string),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
