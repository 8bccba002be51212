use crate::error::{Result, ScienceError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Isbn {
    pub raw: String,
    pub isbn13: String,
    pub isbn10: Option<String>,
    pub formatted: String,
}

fn strip_isbn(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_uppercase()
}

fn check_isbn10(digits: &[u8]) -> bool {
    // digits[9] may be 10 (X)
    let sum: u32 = digits.iter().enumerate().map(|(i, &d)| (10 - i as u32) * d as u32).sum();
    sum % 11 == 0
}

fn check_isbn13(digits: &[u8]) -> bool {
    let sum: u32 = digits.iter().enumerate().map(|(i, &d)| {
        if i % 2 == 0 { d as u32 } else { d as u32 * 3 }
    }).sum();
    sum % 10 == 0
}

fn isbn10_to_isbn13(digits10: &[u8]) -> String {
    let mut d13: Vec<u8> = vec![9, 7, 8];
    d13.extend_from_slice(&digits10[..9]);
    let sum: u32 = d13.iter().enumerate().map(|(i, &d)| {
        if i % 2 == 0 { d as u32 } else { d as u32 * 3 }
    }).sum();
    let check = (10 - (sum % 10)) % 10;
    d13.push(check as u8);
    d13.iter().map(|d| d.to_string()).collect()
}

fn isbn13_to_isbn10(digits13: &[u8]) -> String {
    let d9 = &digits13[3..12];
    let sum: u32 = d9.iter().enumerate().map(|(i, &d)| (10 - i as u32) * d as u32).sum();
    let check = (11 - (sum % 11)) % 11;
    let check_char = if check == 10 { 'X' } else { (b'0' + check as u8) as char };
    let mut s: String = d9.iter().map(|d| d.to_string()).collect();
    s.push(check_char);
    s
}

fn format_isbn13(s: &str) -> String {
    // Simplified 978-X-XXXX-XXXX-X grouping; real group lengths vary by registrant.
    if s.len() == 13 {
        format!("{}-{}-{}-{}-{}", &s[0..3], &s[3..4], &s[4..8], &s[8..12], &s[12..13])
    } else {
        s.to_string()
    }
}

fn ascii_digits(s: &str) -> Option<Vec<u8>> {
    s.chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect()
}

impl Isbn {
    pub fn parse(input: &str) -> Result<Self> {
        let stripped = strip_isbn(input);
        let stripped = stripped.strip_prefix("ISBN").unwrap_or(&stripped).to_string();

        if stripped.len() == 13 {
            let digits = ascii_digits(&stripped)
                .ok_or_else(|| ScienceError::InvalidIsbn(input.to_string()))?;
            if !(stripped.starts_with("978") || stripped.starts_with("979")) || !check_isbn13(&digits) {
                return Err(ScienceError::InvalidIsbn(input.to_string()));
            }
            // isbn10 only for 978 prefix
            let isbn10 = stripped.starts_with("978").then(|| isbn13_to_isbn10(&digits));
            let formatted = format_isbn13(&stripped);
            return Ok(Self { raw: input.to_string(), isbn13: stripped, isbn10, formatted });
        }

        if stripped.len() == 10 {
            // Parse as ISBN-10; last char may be X
            let mut digits: Vec<u8> = Vec::with_capacity(10);
            for (i, c) in stripped.chars().enumerate() {
                if i == 9 && c == 'X' {
                    digits.push(10);
                } else if let Some(d) = c.to_digit(10) {
                    digits.push(d as u8);
                } else {
                    return Err(ScienceError::InvalidIsbn(input.to_string()));
                }
            }
            if !check_isbn10(&digits) {
                return Err(ScienceError::InvalidIsbn(input.to_string()));
            }
            let isbn13 = isbn10_to_isbn13(&digits);
            let formatted = format_isbn13(&isbn13);
            return Ok(Self { raw: input.to_string(), isbn13, isbn10: Some(stripped), formatted });
        }

        Err(ScienceError::InvalidIsbn(input.to_string()))
    }

    /// Index key: ISBN-10 and ISBN-13 spellings of one book collapse to the ISBN-13.
    pub fn normalized(&self) -> &str {
        &self.isbn13
    }
}

/// Index key for a raw ISBN string; falls back to the bare alphanumerics when
/// the checksum does not validate so that both sides still compare equal.
pub fn normalize_isbn_key(raw: &str) -> Option<String> {
    match Isbn::parse(raw) {
        Ok(isbn) => Some(isbn.isbn13),
        Err(_) => {
            let stripped = strip_isbn(raw);
            let stripped = stripped.strip_prefix("ISBN").unwrap_or(&stripped);
            let plausible = matches!(stripped.len(), 10 | 13)
                && stripped
                    .chars()
                    .enumerate()
                    .all(|(i, c)| c.is_ascii_digit() || (i == 9 && c == 'X'));
            plausible.then(|| stripped.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_isbn13() {
        let isbn = Isbn::parse("9780306406157").unwrap();
        assert_eq!(isbn.isbn13, "9780306406157");
        assert_eq!(isbn.isbn10.as_deref(), Some("0306406152"));
    }

    #[test]
    fn isbn13_with_hyphens() {
        let isbn = Isbn::parse("978-0-306-40615-7").unwrap();
        assert_eq!(isbn.isbn13, "9780306406157");
    }

    #[test]
    fn valid_isbn10() {
        let isbn = Isbn::parse("0306406152").unwrap();
        assert_eq!(isbn.isbn10, Some("0306406152".to_string()));
        assert_eq!(isbn.isbn13, "9780306406157");
    }

    #[test]
    fn isbn10_bookseller_example() {
        let isbn = Isbn::parse("0137670109").unwrap();
        assert_eq!(isbn.isbn13, "9780137670109");
        assert_eq!(isbn.normalized(), Isbn::parse("978-0-13-767010-9").unwrap().normalized());
    }

    #[test]
    fn isbn10_with_x_check() {
        let isbn = Isbn::parse("007462542X").unwrap();
        assert_eq!(isbn.isbn10, Some("007462542X".to_string()));
    }

    #[test]
    fn isbn_prefix_label() {
        let isbn = Isbn::parse("ISBN 0-306-40615-2").unwrap();
        assert_eq!(isbn.isbn13, "9780306406157");
    }

    #[test]
    fn invalid_check_digit() {
        assert!(Isbn::parse("9780306406158").is_err());
    }

    #[test]
    fn non_digit_input_does_not_panic() {
        assert!(Isbn::parse("B00ABCDEFG").is_err());
        assert!(Isbn::parse("ĀĀĀĀĀĀĀĀĀĀ").is_err());
    }

    #[test]
    fn isbn13_979_no_isbn10() {
        let isbn = Isbn::parse("9791032305690").unwrap();
        assert_eq!(isbn.isbn10, None);
    }

    #[test]
    fn normalize_key_falls_back_to_digits() {
        assert_eq!(normalize_isbn_key("0-13-767010-9").as_deref(), Some("9780137670109"));
        assert_eq!(normalize_isbn_key("978-0-306-40615-8").as_deref(), Some("9780306406158"));
        assert_eq!(normalize_isbn_key("not an isbn"), None);
    }
}
