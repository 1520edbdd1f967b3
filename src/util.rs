use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("valid regex"));
static MEDIUM_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(CD|disc)\s*\d+").expect("valid regex"));

/// Prepare free text for the search endpoint.
///
/// Punctuation such as "!" or "-" can make the search return nothing even when
/// the words match, so every run of non-word characters becomes a single space
/// (word characters are Unicode-aware). Medium markers like "CD1" or "disc 2"
/// are then removed since they are not part of the release title.
pub fn normalize_query(query: &str) -> String {
    let spaced = NON_WORD.replace_all(query, " ");
    MEDIUM_MARKER.replace_all(&spaced, "").into_owned()
}

/// Titles come back with HTML-escaped double quotes.
pub fn unescape_quotes(s: &str) -> String {
    s.replace("&quot;", "\"")
}
