use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A normalized chat message ready for display.
///
/// Produced by the entry parser from a backend-specific [`RawEntry`]. Only
/// messages for which [`Message::is_displayable`] holds ever leave the merger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Backend-assigned identifier, opaque to the engine
    pub id: String,
    /// Site-local creation time, if the backend supplied a parseable one
    pub timestamp: Option<NaiveDateTime>,
    /// Author's username, empty when unknown
    pub author: String,
    /// Best-effort plain text body
    pub text: Option<String>,
    /// First embedded media URL
    pub image_url: Option<String>,
}

impl Message {
    /// Returns true if the message has something to show: non-empty text or an image.
    pub fn is_displayable(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
            || self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// One raw unit of content as a backend delivered it, before normalization.
///
/// Backends map their own payloads onto this shape; the parser never sees
/// JSON or HTML documents directly, only the fields pulled out of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub id: String,
    pub created_at: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    /// Whether `body` is HTML (scrape) rather than pseudo-markdown (API)
    pub body_is_html: bool,
    pub media_url: Option<String>,
}

/// Selects between the curated and the chronological view of a tag stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Best,
    All,
}

impl FeedKind {
    /// Parses a path or CLI token. Accepts the English names and the site's
    /// localized path segments.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "best" | "najlepsze" => Some(FeedKind::Best),
            "all" | "wszystkie" => Some(FeedKind::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::Best => "best",
            FeedKind::All => "all",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedKind::from_token(s).ok_or_else(|| format!("unknown feed kind: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: Option<&str>, image_url: Option<&str>) -> Message {
        Message {
            id: "1".into(),
            timestamp: None,
            author: String::new(),
            text: text.map(String::from),
            image_url: image_url.map(String::from),
        }
    }

    #[test]
    fn test_displayable_with_text() {
        assert!(message(Some("hello"), None).is_displayable());
    }

    #[test]
    fn test_displayable_with_image_only() {
        assert!(message(None, Some("https://img.example.com/a.jpg")).is_displayable());
    }

    #[test]
    fn test_empty_text_without_image_not_displayable() {
        assert!(!message(Some(""), None).is_displayable());
        assert!(!message(None, None).is_displayable());
        assert!(!message(None, Some("")).is_displayable());
    }

    #[test]
    fn test_feed_kind_tokens() {
        assert_eq!(FeedKind::from_token("best"), Some(FeedKind::Best));
        assert_eq!(FeedKind::from_token("Najlepsze"), Some(FeedKind::Best));
        assert_eq!(FeedKind::from_token("all"), Some(FeedKind::All));
        assert_eq!(FeedKind::from_token("wszystkie"), Some(FeedKind::All));
        assert_eq!(FeedKind::from_token("hot"), None);
    }

    #[test]
    fn test_feed_kind_from_str() {
        assert_eq!("ALL".parse::<FeedKind>(), Ok(FeedKind::All));
        assert!("nope".parse::<FeedKind>().is_err());
    }
}
