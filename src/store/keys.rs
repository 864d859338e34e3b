//! Row key construction and parsing.
//! A stored version is addressed everywhere by `v<version>.<name>`: it is the table row key
//! and the final path segment in the blob store. The name->versions relation is rebuilt by
//! parsing these keys, so `RowKey::parse` is the single place that understands the layout.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// `v`, one or more ASCII digits, the first `.`, then the name (which may itself contain dots
/// or line breaks).
static ROW_KEY_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)^v([0-9]+)\.(.+)$").ok());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowKeyError {
    #[error("document name cannot be empty")]
    EmptyName,
    #[error("document name cannot contain NUL characters")]
    NulInName,
    #[error("document name cannot contain '/'")]
    SlashInName,
    #[error("'.' and '..' are not valid document names")]
    DotName,
    #[error("version numbers start at 1")]
    ZeroVersion,
    #[error("'{0}' is not a versioned row key")]
    Malformed(String),
    #[error("version in '{0}' does not fit in 64 bits")]
    VersionOverflow(String),
}

/// Normalize a document name to NFC.
pub fn normalize_name(name: &str) -> String {
    name.nfc().collect::<String>()
}

/// Validate a document name:
/// - non-empty, no NUL
/// - no '/', since the row key doubles as a blob path segment
/// - not '.' or '..'
pub fn validate_name(name: &str) -> Result<(), RowKeyError> {
    if name.is_empty() {
        return Err(RowKeyError::EmptyName);
    }
    if name.contains('\u{0000}') {
        return Err(RowKeyError::NulInName);
    }
    if name.contains('/') {
        return Err(RowKeyError::SlashInName);
    }
    if name == "." || name == ".." {
        return Err(RowKeyError::DotName);
    }
    Ok(())
}

/// Validate then NFC-normalize a caller supplied name.
pub fn clean_name(name: &str) -> Result<String, RowKeyError> {
    validate_name(name)?;
    let n = normalize_name(name);
    validate_name(&n)?;
    Ok(n)
}

/// `(name, version)` pair in its row key form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub version: u64,
    pub name: String,
}

impl RowKey {
    pub fn new(name: &str, version: u64) -> Result<Self, RowKeyError> {
        if version == 0 {
            return Err(RowKeyError::ZeroVersion);
        }
        validate_name(name)?;
        Ok(Self { version, name: name.to_string() })
    }

    /// Parse `v<N>.<name>`. Leading zeros in `N` are accepted on read (`v01.a` is version 1)
    /// but never produced.
    pub fn parse(key: &str) -> Result<Self, RowKeyError> {
        let caps = (*ROW_KEY_RE)
            .as_ref()
            .and_then(|re| re.captures(key))
            .ok_or_else(|| RowKeyError::Malformed(key.to_string()))?;
        let digits = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let version: u64 = digits
            .parse()
            .map_err(|_| RowKeyError::VersionOverflow(key.to_string()))?;
        RowKey::new(name, version).map_err(|e| match e {
            RowKeyError::ZeroVersion => RowKeyError::Malformed(key.to_string()),
            other => other,
        })
    }

    /// Path of this version's content under the blob store root.
    pub fn blob_path(&self, root: &str) -> String {
        blob_path(root, &self.to_string())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.version, self.name)
    }
}

/// Join the blob root and a row key; the root always ends up with exactly one trailing '/'.
pub fn blob_path(root: &str, row_key: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{}", row_key)
    } else {
        format!("{}/{}", trimmed, row_key)
    }
}

/// Server-side regex selecting the rows of one document. The store still re-parses each
/// returned key, so this only narrows the scan.
pub fn name_filter_regex(name: &str) -> String {
    format!(r"^v[0-9]+\.{}$", regex::escape(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_layout() {
        let k = RowKey::new("a.txt", 1).unwrap();
        assert_eq!(k.to_string(), "v1.a.txt");
        assert_eq!(RowKey::new("report.pdf", 12).unwrap().to_string(), "v12.report.pdf");
    }

    #[test]
    fn round_trip_names_with_dots_and_digits() {
        for name in ["a.txt", "a", "1.2", "v3.tar.gz", "archive.v2.7z", "x..y", ".hidden", "résumé.doc", "a b.txt", "a\nb", "line\r\nbreak.txt\n"] {
            for v in [1u64, 2, 9, 10, 123, u64::MAX] {
                let k = RowKey::new(name, v).unwrap();
                let back = RowKey::parse(&k.to_string()).unwrap();
                assert_eq!(back.version, v, "version for {name}");
                assert_eq!(back.name, name);
            }
        }
    }

    #[test]
    fn parse_rejects_foreign_keys() {
        assert!(matches!(RowKey::parse("a.txt"), Err(RowKeyError::Malformed(_))));
        assert!(matches!(RowKey::parse("v.a.txt"), Err(RowKeyError::Malformed(_))));
        assert!(matches!(RowKey::parse("v1"), Err(RowKeyError::Malformed(_))));
        assert!(matches!(RowKey::parse("v1."), Err(RowKeyError::Malformed(_))));
        assert!(matches!(RowKey::parse("v0.a.txt"), Err(RowKeyError::Malformed(_))));
        assert!(matches!(RowKey::parse("V1.a.txt"), Err(RowKeyError::Malformed(_))));
        assert!(matches!(
            RowKey::parse("v99999999999999999999999.a"),
            Err(RowKeyError::VersionOverflow(_))
        ));
        assert!(matches!(RowKey::parse("v1.dir/a"), Err(RowKeyError::SlashInName)));
    }

    #[test]
    fn leading_zeros_read_as_number() {
        let k = RowKey::parse("v007.a").unwrap();
        assert_eq!(k.version, 7);
        assert_eq!(k.to_string(), "v7.a");
    }

    #[test]
    fn name_validation() {
        assert_eq!(validate_name(""), Err(RowKeyError::EmptyName));
        assert_eq!(validate_name("a/b"), Err(RowKeyError::SlashInName));
        assert_eq!(validate_name(".."), Err(RowKeyError::DotName));
        assert_eq!(validate_name("a\u{0000}b"), Err(RowKeyError::NulInName));
        assert!(validate_name("a.txt").is_ok());
        assert_eq!(RowKey::new("a", 0), Err(RowKeyError::ZeroVersion));
    }

    #[test]
    fn names_are_nfc_normalized() {
        let decomposed = "Cafe\u{0301}.txt";
        assert_eq!(clean_name(decomposed).unwrap(), "Caf\u{e9}.txt");
    }

    #[test]
    fn blob_paths_join_cleanly() {
        assert_eq!(blob_path("/tmp/", "v1.a"), "/tmp/v1.a");
        assert_eq!(blob_path("/tmp", "v1.a"), "/tmp/v1.a");
        assert_eq!(blob_path("/", "v1.a"), "/v1.a");
        assert_eq!(blob_path("", "v1.a"), "/v1.a");
        assert_eq!(RowKey::new("a", 3).unwrap().blob_path("/dms"), "/dms/v3.a");
    }

    #[test]
    fn filter_regex_is_exact() {
        let re = Regex::new(&name_filter_regex("a.txt")).unwrap();
        assert!(re.is_match("v1.a.txt"));
        assert!(re.is_match("v22.a.txt"));
        assert!(!re.is_match("v1.aXtxt"));
        assert!(!re.is_match("v1.a.txt.bak"));
        assert!(!re.is_match("v1.ba.txt"));

        let re = Regex::new(&name_filter_regex("a\nb")).unwrap();
        assert!(re.is_match("v3.a\nb"));
        assert!(!re.is_match("v3.a\nb\nc"));
    }
}
