use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE_FILE_NAME_ILLEGAL: Regex = Regex::new(r#"[\\/:*?"<>|]"#).unwrap();
    static ref RE_MULTI_UNDERSCORE: Regex = Regex::new(r"__+").unwrap();
}

/// Create a lookup key from a title: lowercase, no diacritics, only [a-z0-9].
///
/// Used for comparing titles regardless of case, tone marks and spacing,
/// never for display. `None` yields an empty key.
///
/// Example: "Trường A Hàm" → "truongaham"
pub fn normalize_key(text: Option<&str>) -> String {
    let text = match text {
        Some(t) => t,
        None => return String::new(),
    };

    text.to_lowercase()
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        // đ has no canonical decomposition
        .map(|c| if c == 'đ' { 'd' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Take at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// A short identifier fragment from a title, at most `max_chars` long.
pub fn slug(title: &str, max_chars: usize) -> String {
    truncate_chars(&normalize_key(Some(title)), max_chars)
}

/// Replace characters which are not allowed in file names on common
/// platforms, and spaces, with underscores.
pub fn sanitize_file_name(name: &str) -> String {
    let s = name.replace(' ', "_");
    let s = RE_FILE_NAME_ILLEGAL.replace_all(&s, "_");
    RE_MULTI_UNDERSCORE.replace_all(&s, "_").into_owned()
}

/// File stem to a base document identifier: "Kinh Truong-A Ham" → "Kinh_Truong-A_Ham"
pub fn base_filename(file_stem: &str) -> String {
    sanitize_file_name(file_stem.trim())
}
