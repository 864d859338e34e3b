//! Intrinsic metadata extraction for stored content.
//! Extraction is best effort: a failure yields `None` ("no metadata available") and never
//! fails the operation that asked for it.

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

use crate::store::types::Metadata;

pub trait MetadataExtractor: Send + Sync {
    /// Describe `content`; `name` is only a hint (file extension) for type detection.
    fn extract(&self, name: &str, content: &[u8]) -> Option<Metadata>;
}

/// Extractor that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractor;

impl MetadataExtractor for NoopExtractor {
    fn extract(&self, _name: &str, _content: &[u8]) -> Option<Metadata> { None }
}

/// Magic-byte sniffing plus a few cheap format probes (text, PNG, GIF, PDF).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinExtractor;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Stable ETag for a byte slice using xxh3_64; returned as fixed-width lowercase hex.
pub fn etag_for_bytes(bytes: &[u8]) -> String {
    let h = xxh3_64(bytes);
    format!("{h:016x}")
}

fn sniff_mime(content: &[u8]) -> Option<&'static str> {
    if content.starts_with(PNG_MAGIC) { return Some("image/png"); }
    if content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a") { return Some("image/gif"); }
    if content.starts_with(&[0xFF, 0xD8, 0xFF]) { return Some("image/jpeg"); }
    if content.starts_with(b"%PDF-") { return Some("application/pdf"); }
    if content.starts_with(b"PK\x03\x04") { return Some("application/zip"); }
    if content.starts_with(&[0x1F, 0x8B]) { return Some("application/gzip"); }
    None
}

fn as_text(content: &[u8]) -> Option<&str> {
    if content.contains(&0) { return None; }
    std::str::from_utf8(content).ok()
}

fn line_count(text: &str) -> usize {
    let newlines = text.matches('\n').count();
    if text.is_empty() || text.ends_with('\n') { newlines } else { newlines + 1 }
}

fn png_dimensions(content: &[u8]) -> Option<(u32, u32)> {
    // IHDR is the first chunk: 8 byte magic, 4 byte length, "IHDR", width, height.
    if content.len() < 24 || &content[12..16] != b"IHDR" { return None; }
    let w = u32::from_be_bytes(content[16..20].try_into().ok()?);
    let h = u32::from_be_bytes(content[20..24].try_into().ok()?);
    Some((w, h))
}

fn gif_dimensions(content: &[u8]) -> Option<(u16, u16)> {
    if content.len() < 10 { return None; }
    let w = u16::from_le_bytes(content[6..8].try_into().ok()?);
    let h = u16::from_le_bytes(content[8..10].try_into().ok()?);
    Some((w, h))
}

fn pdf_version(content: &[u8]) -> Option<String> {
    let head = content.get(5..content.len().min(16))?;
    let v: String = head
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();
    if v.is_empty() { None } else { Some(v) }
}

impl MetadataExtractor for BuiltinExtractor {
    fn extract(&self, name: &str, content: &[u8]) -> Option<Metadata> {
        if content.is_empty() {
            return None;
        }
        let mut m = Metadata::new();
        let text = as_text(content);
        let mime = match sniff_mime(content) {
            Some(m) => m.to_string(),
            None => {
                let guessed = mime_guess::from_path(name).first_or_octet_stream();
                if guessed.essence_str() == "application/octet-stream" && text.is_some() {
                    "text/plain".to_string()
                } else {
                    guessed.essence_str().to_string()
                }
            }
        };
        m.insert("size_bytes".into(), content.len().to_string());
        m.insert("etag".into(), etag_for_bytes(content));
        m.insert("sha256".into(), hex::encode(Sha256::digest(content)));

        if let Some(t) = text {
            m.insert("encoding".into(), "utf-8".into());
            m.insert("line_count".into(), line_count(t).to_string());
        }
        match mime.as_str() {
            "image/png" => {
                if let Some((w, h)) = png_dimensions(content) {
                    m.insert("width".into(), w.to_string());
                    m.insert("height".into(), h.to_string());
                }
            }
            "image/gif" => {
                if let Some((w, h)) = gif_dimensions(content) {
                    m.insert("width".into(), w.to_string());
                    m.insert("height".into(), h.to_string());
                }
            }
            "application/pdf" => {
                if let Some(v) = pdf_version(content) {
                    m.insert("pdf_version".into(), v);
                }
            }
            _ => {}
        }
        m.insert("mime_type".into(), mime);
        Some(m)
    }
}
