use bibweave_core::models::{BibliographicRecord, EntryType, Provenance};

/// One BibTeX entry. Field order is fixed: title, author, year, identifiers,
/// then container, publisher and provenance.
pub fn generate_bibtex(record: &BibliographicRecord) -> String {
    let mut bib = format!("@{}{{{},\n", record.entry_type.to_bibtex_type(), record.key);

    push_field(&mut bib, "title", &record.title);

    let authors: Vec<&str> = record
        .authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if !authors.is_empty() {
        push_field(&mut bib, "author", &authors.join(" and "));
    }

    if let Some(year) = record.year {
        bib.push_str(&format!("  year = {{{year}}},\n"));
    }

    let ids = &record.identifiers;
    if let Some(doi) = &ids.doi {
        push_field(&mut bib, "doi", doi);
    }
    if let Some(arxiv) = &ids.arxiv_id {
        push_field(&mut bib, "eprint", arxiv);
        bib.push_str("  archiveprefix = {arXiv},\n");
    }
    if let Some(isbn) = ids.isbn.first() {
        push_field(&mut bib, "isbn", isbn);
    }
    if let Some(pmid) = &ids.pmid {
        push_field(&mut bib, "pmid", pmid);
    }
    if let Some(url) = &record.url {
        // URLs are verbatim in BibTeX; only braces need care.
        bib.push_str(&format!("  url = {{{}}},\n", url.replace(['{', '}'], "")));
    }

    if let Some(container) = &record.container_title {
        push_field(&mut bib, container_field(record.entry_type), container);
    }
    if let Some(publisher) = &record.publisher {
        push_field(&mut bib, "publisher", publisher);
    }
    if let Provenance::Synthesized(source) = &record.provenance {
        push_field(&mut bib, "note", &format!("Metadata retrieved from {source}"));
    }

    bib.push_str("}\n");
    bib
}

fn push_field(bib: &mut String, name: &str, value: &str) {
    bib.push_str(&format!("  {name} = {{{}}},\n", escape_bibtex(value)));
}

fn container_field(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Chapter | EntryType::ConferencePaper => "booktitle",
        EntryType::Article | EntryType::Preprint => "journal",
        _ => "howpublished",
    }
}

fn escape_bibtex(s: &str) -> String {
    s.replace('\\', "\\textbackslash{}")
        .replace('&', "\\&")
        .replace('_', "\\_")
        .replace('$', "\\$")
        .replace('%', "\\%")
        .replace('#', "\\#")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace("\\textbackslash\\{\\}", "\\textbackslash{}")
}
