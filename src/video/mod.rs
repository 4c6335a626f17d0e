//! Playable stream resolution for the video host.
//!
//! The host's player pages embed the numeric video id in inline JSON. The
//! tokenizer endpoint trades that id for a list of stream formats; we pick
//! the HLS playlist and hand its URL to an external player.

use crate::config::VideoConfig;
use crate::http::{self, FetchError, RequestOptions};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

/// MIME type of an HLS playlist, compared case-insensitively.
const HLS_MIME_TYPE: &str = "application/x-mpegurl";

#[derive(Debug, Error)]
pub enum VideoError {
    /// The page does not carry a video id
    #[error("Unrecognized video source: {0}")]
    UnrecognizedSource(String),
    /// The tokenizer answered but offered no usable stream
    #[error("Could not resolve stream: {0}")]
    Resolution(String),
    #[error("Video fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    formats: Vec<StreamFormat>,
}

#[derive(Deserialize)]
struct StreamFormat {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    url: Option<String>,
}

/// Resolves a video page URL into a playable HLS stream URL.
///
/// # Errors
///
/// - [`VideoError::UnrecognizedSource`] if the page has no video id
/// - [`VideoError::Resolution`] if no HLS format is offered or its URL is invalid
/// - [`VideoError::Fetch`] on network or HTTP failures
pub async fn resolve(
    client: &reqwest::Client,
    page_url: &str,
    config: &VideoConfig,
) -> Result<Url, VideoError> {
    let opts = RequestOptions::new(config.request_timeout());

    let page = http::get_text(client, page_url, opts).await?;
    let video_id = extract_video_id(&page)
        .ok_or_else(|| VideoError::UnrecognizedSource(page_url.to_string()))?;
    tracing::debug!(page = %page_url, video_id = %video_id, "Found video id");

    let token_url = format!("{}/{}", config.tokenizer_url.trim_end_matches('/'), video_id);
    let response: TokenResponse = http::get_json(client, &token_url, opts).await?;

    let stream = response
        .formats
        .into_iter()
        .find(|f| {
            f.mime_type
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(HLS_MIME_TYPE))
        })
        .and_then(|f| f.url)
        .ok_or_else(|| VideoError::Resolution(format!("no HLS format for video {video_id}")))?;

    let url = Url::parse(&stream)
        .map_err(|e| VideoError::Resolution(format!("invalid stream URL: {e}")))?;
    tracing::info!(video_id = %video_id, "Resolved video stream");
    Ok(url)
}

/// Finds `"video_id":N`, falling back to `"_id":N`, after removing all
/// whitespace from the page.
pub fn extract_video_id(page: &str) -> Option<String> {
    static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
    static FALLBACK_ID: OnceLock<Regex> = OnceLock::new();

    let compact: String = page.chars().filter(|c| !c.is_whitespace()).collect();

    let primary = VIDEO_ID.get_or_init(|| Regex::new(r#""video_id":(\d+)"#).expect("static regex"));
    let fallback = FALLBACK_ID.get_or_init(|| Regex::new(r#""_id":(\d+)"#).expect("static regex"));

    primary
        .captures(&compact)
        .or_else(|| fallback.captures(&compact))
        .map(|c| c[1].to_string())
}
