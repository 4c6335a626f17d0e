use super::{endpoint, BatchOrder, Cursor, CursorKind, EntrySource};
use crate::chat::credentials;
use crate::chat::parser::LinkStyle;
use crate::chat::{ChatError, FeedTarget, RawEntry};
use crate::config::ApiConfig;
use crate::http::{self, FetchError, RequestOptions};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Date format the "newer" count request expects (sent form-encoded, space as `+`).
const PROBE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Deserialize)]
struct ApiEntry {
    created_at: Option<String>,
    author: Option<ApiAuthor>,
    content: Option<String>,
    media: Option<ApiMedia>,
}

#[derive(Deserialize)]
struct ApiAuthor {
    username: Option<String>,
}

#[derive(Deserialize)]
struct ApiMedia {
    photo: Option<ApiPhoto>,
}

#[derive(Deserialize)]
struct ApiPhoto {
    url: Option<String>,
}

#[derive(Deserialize)]
struct NewerResponse {
    data: NewerData,
}

#[derive(Deserialize)]
struct NewerData {
    count: Value,
}

/// JSON REST backend authenticated with a per-session bearer token.
///
/// The stream endpoint always returns the whole current page, newest first.
/// Incremental polls ask the cheap "newer" count first and only refetch the
/// page when it reports a non-zero count.
pub struct ApiSource {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
    timeout: Duration,
}

impl ApiSource {
    /// Obtains a token and builds the backend. Credential failures are fatal.
    pub async fn connect(
        client: reqwest::Client,
        api: &ApiConfig,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let token = credentials::obtain_token(&client, api, timeout).await?;
        Ok(Self::with_token(client, &api.base_url, token, timeout))
    }

    pub fn with_token(
        client: reqwest::Client,
        base_url: &str,
        token: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            token,
            timeout,
        }
    }

    fn options(&self) -> RequestOptions<'_> {
        RequestOptions::new(self.timeout).with_bearer(&self.token)
    }

    async fn fetch_stream(&self, target: &FeedTarget) -> Result<Vec<RawEntry>, ChatError> {
        let mut url = endpoint(&self.base_url, &["tags", target.tag.as_str(), "stream"])?;
        url.query_pairs_mut()
            .append_pair("sort", target.kind.as_str());

        let response: StreamResponse = http::get_json(&self.client, url.as_str(), self.options())
            .await
            .map_err(classify)?;

        let total = response.data.len();
        let entries: Vec<RawEntry> = response.data.into_iter().filter_map(to_raw_entry).collect();
        if entries.len() < total {
            tracing::debug!(
                tag = %target.tag,
                skipped = total - entries.len(),
                "Skipped API entries without an id"
            );
        }
        Ok(entries)
    }

    async fn newer_count(
        &self,
        target: &FeedTarget,
        since: NaiveDateTime,
    ) -> Result<u64, ChatError> {
        let mut url = endpoint(&self.base_url, &["tags", target.tag.as_str(), "newer"])?;
        url.query_pairs_mut()
            .append_pair("type", target.kind.as_str())
            .append_pair("date", &since.format(PROBE_DATE_FORMAT).to_string());

        let response: NewerResponse = http::get_json(&self.client, url.as_str(), self.options())
            .await
            .map_err(classify)?;

        parse_count(&response.data.count).ok_or_else(|| {
            ChatError::TransientFetch(FetchError::Parse(format!(
                "unexpected newer count: {}",
                response.data.count
            )))
        })
    }
}

#[async_trait]
impl EntrySource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    fn batch_order(&self) -> BatchOrder {
        BatchOrder::NewestFirst
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn link_style(&self) -> LinkStyle {
        LinkStyle::Url
    }

    async fn fetch_initial(&self, target: &FeedTarget) -> Result<Vec<RawEntry>, ChatError> {
        self.fetch_stream(target).await
    }

    async fn fetch_since(
        &self,
        target: &FeedTarget,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<RawEntry>, ChatError> {
        let Some(since) = cursor.and_then(|c| c.timestamp) else {
            return self.fetch_stream(target).await;
        };

        let count = self.newer_count(target, since).await?;
        if count == 0 {
            tracing::trace!(tag = %target.tag, "No newer entries");
            return Ok(Vec::new());
        }

        tracing::debug!(tag = %target.tag, count = count, "Newer entries reported");
        self.fetch_stream(target).await
    }
}

/// A rejected token cannot recover mid-session; everything else is transient.
fn classify(err: FetchError) -> ChatError {
    if err.is_unauthorized() {
        ChatError::TokenExpired
    } else {
        ChatError::TransientFetch(err)
    }
}

fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0),
        _ => None,
    }
}

/// Maps one JSON entry. Entries without an id are dropped; entries whose
/// other fields have unexpected types keep only their id.
fn to_raw_entry(value: Value) -> Option<RawEntry> {
    let id = match value.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    match serde_json::from_value::<ApiEntry>(value) {
        Ok(entry) => Some(RawEntry {
            id,
            created_at: entry.created_at,
            author: entry.author.and_then(|a| a.username),
            body: entry.content,
            body_is_html: false,
            media_url: entry.media.and_then(|m| m.photo).and_then(|p| p.url),
        }),
        Err(e) => {
            tracing::debug!(id = %id, error = %e, "Malformed API entry, keeping id only");
            Some(RawEntry {
                id,
                ..RawEntry::default()
            })
        }
    }
}
