//! Entry fetchers: the swappable backend seam of the engine.
//!
//! Everything that knows a remote request or response shape lives behind
//! [`EntrySource`]. The merger only needs two facts about a backend besides
//! its batches: which direction batches arrive in, and whether "since" queries
//! are bounded by time or by the remote id of the last entry.

mod api;
mod scrape;

pub use api::ApiSource;
pub use scrape::{parse_stream, ScrapeSource};

use super::parser::LinkStyle;
use super::{ChatError, FeedTarget, RawEntry};
use crate::http::FetchError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use url::Url;

/// The last raw entry a session has accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub id: String,
    pub timestamp: Option<NaiveDateTime>,
}

/// Direction in which a backend lists a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrder {
    NewestFirst,
    OldestFirst,
}

/// What bounds a backend's "since" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// The backend returns a full page; the merger filters by timestamp
    Timestamp,
    /// The backend returns only entries after the cursor's remote id
    RemoteId,
}

/// One chat backend.
///
/// Both fetches return a single page of raw entries; no implementation
/// paginates. Steady-state errors should be [`ChatError::TransientFetch`]
/// unless the session can no longer make progress at all.
#[async_trait]
pub trait EntrySource: Send + Sync {
    fn name(&self) -> &'static str;

    fn batch_order(&self) -> BatchOrder;

    fn cursor_kind(&self) -> CursorKind;

    /// How markdown links in this backend's bodies are flattened.
    fn link_style(&self) -> LinkStyle;

    /// Current entries for the target, used to prime a session.
    async fn fetch_initial(&self, target: &FeedTarget) -> Result<Vec<RawEntry>, ChatError>;

    /// Entries newer than `cursor`; falls back to a full fetch when the
    /// session has no cursor yet.
    async fn fetch_since(
        &self,
        target: &FeedTarget,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<RawEntry>, ChatError>;
}

/// Builds `base/seg1/seg2/...` with each segment percent-encoded.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = Url::parse(base).map_err(|e| FetchError::Parse(format!("bad base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::Parse(format!("base URL cannot have a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let url = endpoint("https://example.com/api/v3", &["tags", "mecz", "stream"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/v3/tags/mecz/stream");
    }

    #[test]
    fn test_endpoint_handles_trailing_slash() {
        let url = endpoint("https://example.com/", &["tag", "f1"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/tag/f1");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("https://example.com", &["since", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/since/a%2Fb%20c");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        assert!(endpoint("not a url", &["x"]).is_err());
        assert!(endpoint("mailto:someone@example.com", &["x"]).is_err());
    }
}
