use super::{endpoint, BatchOrder, Cursor, CursorKind, EntrySource};
use crate::chat::markup::{self, Element};
use crate::chat::parser::LinkStyle;
use crate::chat::{ChatError, FeedKind, FeedTarget, RawEntry};
use crate::http::{self, FetchError, RequestOptions};
use async_trait::async_trait;
use std::time::Duration;

/// `id` of the `<ul>` holding the entry blocks on a tag page.
const STREAM_CONTAINER_ID: &str = "itemsStream";
/// Class marking one entry block (`<li>`) inside the stream container.
const ENTRY_CLASS: &str = "entry";

/// Backend that reads the public tag pages instead of the API.
///
/// The initial batch comes from the tag page; later batches come from the
/// AJAX refresh fragment keyed by the last seen entry id, which lists only
/// entries newer than that id. Both are walked with [`markup`], never parsed
/// as full documents, so unrelated page changes do not break extraction.
pub struct ScrapeSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ScrapeSource {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            timeout,
        }
    }

    async fn fetch_page(&self, target: &FeedTarget) -> Result<Vec<RawEntry>, ChatError> {
        let url = endpoint(
            &self.base_url,
            &["tag", target.tag.as_str(), kind_segment(target.kind)],
        )?;
        let html = http::get_text(&self.client, url.as_str(), RequestOptions::new(self.timeout))
            .await?;
        Ok(parse_stream(&html, false)?)
    }

    async fn fetch_fragment(
        &self,
        target: &FeedTarget,
        cursor: &Cursor,
    ) -> Result<Vec<RawEntry>, ChatError> {
        let url = endpoint(
            &self.base_url,
            &[
                "ajax",
                "tag",
                target.tag.as_str(),
                kind_segment(target.kind),
                "since",
                cursor.id.as_str(),
            ],
        )?;
        let html = http::get_text(&self.client, url.as_str(), RequestOptions::new(self.timeout))
            .await?;
        Ok(parse_stream(&html, true)?)
    }
}

#[async_trait]
impl EntrySource for ScrapeSource {
    fn name(&self) -> &'static str {
        "scrape"
    }

    fn batch_order(&self) -> BatchOrder {
        BatchOrder::NewestFirst
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::RemoteId
    }

    fn link_style(&self) -> LinkStyle {
        LinkStyle::Label
    }

    async fn fetch_initial(&self, target: &FeedTarget) -> Result<Vec<RawEntry>, ChatError> {
        self.fetch_page(target).await
    }

    async fn fetch_since(
        &self,
        target: &FeedTarget,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<RawEntry>, ChatError> {
        match cursor {
            Some(cursor) => self.fetch_fragment(target, cursor).await,
            None => self.fetch_page(target).await,
        }
    }
}

fn kind_segment(kind: FeedKind) -> &'static str {
    match kind {
        FeedKind::Best => "najlepsze",
        FeedKind::All => "wszystkie",
    }
}

/// Extracts entry blocks from a tag page or a refresh fragment.
///
/// Expected structure:
///
/// ```text
/// <ul id="itemsStream">
///   <li class="entry" data-id="ID">
///     <a class="author">NAME</a>
///     <time datetime="RFC3339"></time>
///     <div class="text">BODY</div>
///     <a class="media" href="URL"></a>   or   <img class="media" src="URL">
///   </li>
/// </ul>
/// ```
///
/// A full page without the container is a parse failure. A fragment may
/// carry bare entry blocks, in which case the whole fragment is the container.
/// Blocks without `data-id` are skipped.
pub fn parse_stream(html: &str, is_fragment: bool) -> Result<Vec<RawEntry>, FetchError> {
    let container = markup::find_element(html, "ul", |tag| {
        markup::attr_value(tag, "id") == Some(STREAM_CONTAINER_ID)
    });

    let body = match container {
        Some(element) => element.inner,
        None if is_fragment => html,
        None => {
            return Err(FetchError::Parse(format!(
                "stream container #{STREAM_CONTAINER_ID} not found"
            )))
        }
    };

    Ok(markup::elements(body, "li", |tag| markup::has_class(tag, ENTRY_CLASS))
        .into_iter()
        .filter_map(entry_from_block)
        .collect())
}

fn entry_from_block(block: Element<'_>) -> Option<RawEntry> {
    let id = block.attr("data-id").map(str::trim).filter(|id| !id.is_empty())?;
    let inner = block.inner;

    let author = markup::find_element(inner, "a", |t| markup::has_class(t, "author"))
        .map(|a| decode(&a.text()))
        .filter(|a| !a.is_empty());

    let created_at = markup::find_open_tag_matching(inner, "time", |_| true)
        .and_then(|t| markup::attr_value(t, "datetime"))
        .map(String::from);

    let body = markup::find_element(inner, "div", |t| markup::has_class(t, "text"))
        .map(|d| d.inner.to_string());

    let media_url = markup::find_open_tag_matching(inner, "a", |t| markup::has_class(t, "media"))
        .and_then(|t| markup::attr_value(t, "href"))
        .or_else(|| {
            markup::find_open_tag_matching(inner, "img", |t| markup::has_class(t, "media"))
                .and_then(|t| markup::attr_value(t, "src"))
        })
        .map(decode);

    Some(RawEntry {
        id: id.to_string(),
        created_at,
        author,
        body,
        body_is_html: true,
        media_url,
    })
}

fn decode(s: &str) -> String {
    html_escape::decode_html_entities(s).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>#mecz</title><link rel="stylesheet" href="/s.css"></head>
<body>
  <nav><ul class="menu"><li class="entry-like">nav</li></ul></nav>
  <ul id="itemsStream" class="comments-stream">
    <li class="entry iC" data-id="102">
      <div class="wblock">
        <a class="author color-1" href="/ludzie/kibic">kibic</a>
        <time datetime="2023-05-01T20:16:00+02:00" title="2023-05-01 20:16:00"></time>
        <div class="text"><p><a href="/tag/mecz">#mecz</a> <strong>GOL</strong>!</p></div>
        <a class="media" href="https://img.example.com/goal.jpg?a=1&amp;b=2"><img src="thumb.jpg"></a>
      </div>
      <ul class="sub">
        <li class="entry" data-id="102-1"><div class="text">reply</div></li>
      </ul>
    </li>
    <li class="entry" data-id="101">
      <a class="author" href="/ludzie/fan">fan&amp;co</a>
      <time datetime="2023-05-01T20:15:00+02:00"></time>
      <div class="text">first</div>
    </li>
    <li class="entry">no id here</li>
  </ul>
</body></html>"#;

    #[test]
    fn test_parse_page_entries() {
        let entries = parse_stream(PAGE, false).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["102", "101"]);

        let first = &entries[0];
        assert_eq!(first.author.as_deref(), Some("kibic"));
        assert_eq!(first.created_at.as_deref(), Some("2023-05-01T20:16:00+02:00"));
        assert!(first.body_is_html);
        assert!(first.body.as_deref().unwrap().contains("<strong>GOL</strong>"));
        assert_eq!(
            first.media_url.as_deref(),
            Some("https://img.example.com/goal.jpg?a=1&b=2")
        );

        assert_eq!(entries[1].author.as_deref(), Some("fan&co"));
        assert_eq!(entries[1].media_url, None);
    }

    #[test]
    fn test_page_without_container_is_parse_error() {
        let html = "<html><body><p>Przerwa techniczna</p></body></html>";
        assert!(matches!(parse_stream(html, false), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_fragment_with_bare_entries() {
        let fragment = r#"<li class="entry" data-id="103"><div class="text">new</div>
            <img class="media" src="https://img.example.com/x.png"></li>"#;
        let entries = parse_stream(fragment, true).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "103");
        assert_eq!(entries[0].media_url.as_deref(), Some("https://img.example.com/x.png"));
    }

    #[test]
    fn test_empty_fragment_is_empty_batch() {
        assert_eq!(parse_stream("", true).unwrap(), Vec::new());
    }

    fn target() -> FeedTarget {
        FeedTarget {
            tag: "mecz".into(),
            kind: FeedKind::Best,
        }
    }

    #[tokio::test]
    async fn test_fetch_initial_uses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tag/mecz/najlepsze"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let source = ScrapeSource::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(5));
        let entries = source.fetch_initial(&target()).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_since_uses_fragment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/tag/mecz/najlepsze/since/102"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<li class="entry" data-id="104"><div class="text">hej</div></li>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let source = ScrapeSource::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(5));
        let cursor = Cursor {
            id: "102".into(),
            timestamp: None,
        };
        let entries = source.fetch_since(&target(), Some(&cursor)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "104");
    }

    #[tokio::test]
    async fn test_forbidden_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = ScrapeSource::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(5));
        let result = source.fetch_initial(&target()).await;
        assert!(matches!(
            result,
            Err(ChatError::TransientFetch(FetchError::HttpStatus(403)))
        ));
    }
}
