use std::path::Path;
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Separator `pdftotext` writes between pages.
pub const PAGE_BREAK: char = '\x0c';

/// NFC-normalizes text and collapses every run of whitespace to one space
pub fn normalize_whitespace(text: &str) -> String {
    lazy_static! {
        static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static regex");
    }

    let text = text.nfc().collect::<String>();
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Splits extracted document text into pages, page 1 first
pub fn split_pages(text: &str) -> Vec<&str> {
    let text = text.strip_suffix(PAGE_BREAK).unwrap_or(text);
    if text.is_empty() {
        return Vec::new();
    }
    text.split(PAGE_BREAK).collect()
}

/// Path stem of a source reference, e.g. `platform` for `platform.pdf`
pub fn source_stem(source: &str) -> &str {
    Path::new(source)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source)
}
