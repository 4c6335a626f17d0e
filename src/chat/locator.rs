use super::{ChatError, FeedKind};
use url::Url;

/// Host aliases under which the community site serves tag streams.
const SITE_HOSTS: &[&str] = &["wykop.pl", "www.wykop.pl"];

/// What a session polls: one tag in one feed kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTarget {
    pub tag: String,
    pub kind: FeedKind,
}

/// Resolves a chat URL of the form `https://wykop.pl/tag/<tag>[/<kind>]`.
///
/// The kind token is optional; when it is absent or not recognized,
/// `default_kind` is used. Tags are lower-cased.
///
/// # Errors
///
/// Returns [`ChatError::UnrecognizedSource`] if the URL does not parse, the
/// host is not one of the site's aliases, or the path has no tag.
pub fn locate(url: &str, default_kind: FeedKind) -> Result<FeedTarget, ChatError> {
    let parsed =
        Url::parse(url.trim()).map_err(|e| ChatError::UnrecognizedSource(e.to_string()))?;

    let host = parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ChatError::UnrecognizedSource(format!("no host in {url}")))?;
    if !SITE_HOSTS.contains(&host.as_str()) {
        return Err(ChatError::UnrecognizedSource(format!(
            "unsupported host: {host}"
        )));
    }

    let mut segments = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());

    if segments.next() != Some("tag") {
        return Err(ChatError::UnrecognizedSource(format!(
            "not a tag URL: {}",
            parsed.path()
        )));
    }

    let tag = segments
        .next()
        .filter(|t| t.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(|| {
            ChatError::UnrecognizedSource(format!("missing or invalid tag in {}", parsed.path()))
        })?
        .to_ascii_lowercase();

    let kind = segments
        .next()
        .and_then(FeedKind::from_token)
        .unwrap_or(default_kind);

    Ok(FeedTarget { tag, kind })
}
