//! Normalization of raw backend entries into [`Message`]s.
//!
//! Text cleanup is best-effort plain text, not markup fidelity: the site's
//! pseudo-markdown and HTML are flattened, hash-tag tokens are dropped, and
//! whitespace is collapsed. Parsing never fails; an entry with nothing usable
//! becomes a message that fails [`Message::is_displayable`].

use super::{Message, RawEntry};
use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// How a markdown link `[label](url)` is flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStyle {
    /// Keep the target URL (the API's labels are usually the URL anyway)
    Url,
    /// Keep the visible label
    Label,
}

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Converts one raw entry into a message. Never fails.
pub fn parse_entry(raw: &RawEntry, link_style: LinkStyle) -> Message {
    Message {
        id: raw.id.clone(),
        timestamp: raw.created_at.as_deref().and_then(parse_timestamp),
        author: raw
            .author
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        text: raw
            .body
            .as_deref()
            .and_then(|body| clean_text(body, raw.body_is_html, link_style)),
        image_url: raw
            .media_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from),
    }
}

/// Parses the site's creation time. Accepts `yyyy-MM-dd HH:mm:ss`, the same
/// with a `T` separator, and RFC 3339 (reduced to its local wall-clock time).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Flattens a message body to plain text. Returns `None` when nothing remains.
pub fn clean_text(body: &str, is_html: bool, link_style: LinkStyle) -> Option<String> {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static ANNOTATION: OnceLock<Regex> = OnceLock::new();
    static LINK: OnceLock<Regex> = OnceLock::new();
    static BOLD: OnceLock<Regex> = OnceLock::new();
    static HASHTAG: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let mut text = if is_html {
        let with_breaks = regex(&BREAK, r"(?i)<br\s*/?>").replace_all(body, " ");
        let stripped = regex(&TAG, r"(?s)</?[A-Za-z][^>]*>").replace_all(&with_breaks, "");
        html_escape::decode_html_entities(&stripped).into_owned()
    } else {
        body.to_string()
    };

    // "[**LINK**](..)" and "[**MIRROR**](..)" are source annotations, not content
    text = regex(&ANNOTATION, r"(?i)\[\*\*(?:link|mirror)\*\*\]\([^)]*\)")
        .replace_all(&text, "")
        .into_owned();

    let replacement = match link_style {
        LinkStyle::Url => "$url",
        LinkStyle::Label => "$label",
    };
    text = regex(&LINK, r"\[(?P<label>[^\]]+?)\]\((?P<url>[^)\s]+?)\)")
        .replace_all(&text, replacement)
        .into_owned();

    text = regex(&BOLD, r"(?s)\*\*(.+?)\*\*")
        .replace_all(&text, "$1")
        .into_owned();

    // A tag glued to a word or a path ("page#top", "/#/a") is a URL fragment
    text = regex(&HASHTAG, r"(^|[^\w/])#[A-Za-z0-9]+")
        .replace_all(&text, "$1")
        .into_owned();

    let text = regex(&WHITESPACE, r"\s+").replace_all(&text, " ");
    let text = text.trim();

    (!text.is_empty()).then(|| text.to_string())
}
