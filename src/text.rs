use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static PUNCTUATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*([(),.])\s*").unwrap());
static COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",").unwrap());

/// XML 1.0 valid char ranges:
/// - 0x09, 0x0A, 0x0D
/// - 0x20..=0xD7FF
/// - 0xE000..=0xFFFD
/// - 0x10000..=0x10FFFF
fn is_valid_xml_char(c: char) -> bool {
    matches!(
        c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

pub fn sanitize_xml_text(text: &str) -> String {
    text.chars().filter(|&c| is_valid_xml_char(c)).collect()
}

pub fn sanitized_char_count(text: &str) -> usize {
    text.chars().filter(|&c| is_valid_xml_char(c)).count()
}

/// Strips one pair of surrounding double quotes.
pub fn unquote(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Normalizes a raw token span into single-line display text.
///
/// `"  B.method( a ,\n b )"` becomes `B.method(a, b)`.
pub fn format_text(raw: &str) -> String {
    let clean = sanitize_xml_text(raw);
    let single_line = WHITESPACE_RE.replace_all(unquote(&clean), " ");
    let tight = PUNCTUATION_RE.replace_all(&single_line, "$1");
    COMMA_RE.replace_all(&tight, ", ").trim().to_string()
}
