//! Minimal structural HTML walking for the scrape backend.
//!
//! Uses simple string scanning (no HTML parser dependency). The walk only
//! understands what the tag stream pages need: finding an element by tag name
//! and attribute predicate, balancing nested tags of the same name to find its
//! end, and reading attribute values. Matching is ASCII case-insensitive on
//! tag and attribute names; values keep their original case.
//!
//! Known limitation: a literal `>` inside a quoted attribute value ends the
//! tag early. The site does not emit those in the regions we read.

/// One element found in a fragment: its opening tag and the markup between
/// the opening and the matching closing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub open_tag: &'a str,
    pub inner: &'a str,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        attr_value(self.open_tag, name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        has_class(self.open_tag, class)
    }

    /// Text content with all nested tags removed, whitespace collapsed.
    pub fn text(&self) -> String {
        strip_tags(self.inner)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Finds the first element named `name` whose opening tag satisfies `pred`.
pub fn find_element<'a>(
    html: &'a str,
    name: &str,
    pred: impl Fn(&str) -> bool,
) -> Option<Element<'a>> {
    elements(html, name, pred).into_iter().next()
}

/// Finds all non-nested elements named `name` whose opening tag satisfies
/// `pred`, in document order. Matches nested inside an earlier match are not
/// returned separately.
pub fn elements<'a>(html: &'a str, name: &str, pred: impl Fn(&str) -> bool) -> Vec<Element<'a>> {
    let lower = html.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some((start, open_end)) = find_open_tag(&lower, &name, pos) {
        let open_tag = &html[start..open_end];
        if !pred(open_tag) {
            pos = open_end;
            continue;
        }

        if is_self_closing(open_tag) {
            found.push(Element {
                open_tag,
                inner: "",
            });
            pos = open_end;
            continue;
        }

        // Unclosed elements run to the end of the fragment
        let (inner_end, close_end) =
            find_matching_close(&lower, &name, open_end).unwrap_or((html.len(), html.len()));
        found.push(Element {
            open_tag,
            inner: &html[open_end..inner_end],
        });
        pos = close_end;
    }

    found
}

/// Finds the first opening tag named `name` satisfying `pred`. Suited to void
/// elements such as `<img>` and `<time>` where only attributes matter.
pub fn find_open_tag_matching<'a>(
    html: &'a str,
    name: &str,
    pred: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    let mut pos = 0;
    while let Some((start, end)) = find_open_tag(&lower, &name, pos) {
        let tag = &html[start..end];
        if pred(tag) {
            return Some(tag);
        }
        pos = end;
    }
    None
}

/// Extracts the value of an attribute from an opening tag (case-preserving).
///
/// The attribute name must start at a whitespace boundary, so looking up `id`
/// does not match `data-id`.
pub fn attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let tag_lower = tag.to_ascii_lowercase();
    let attr_prefix = format!("{}=", attr_name.to_ascii_lowercase());
    let bytes = tag.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = tag_lower[search_from..].find(&attr_prefix) {
        let attr_start = search_from + rel;
        search_from = attr_start + attr_prefix.len();

        let at_boundary = attr_start > 0 && bytes[attr_start - 1].is_ascii_whitespace();
        if !at_boundary {
            continue;
        }

        let rest = &tag[search_from..];
        return match rest.as_bytes().first()? {
            quote @ (b'"' | b'\'') => {
                let inner = &rest[1..];
                let end = inner.find(*quote as char)?;
                Some(&inner[..end])
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                Some(&rest[..end])
            }
        };
    }

    None
}

/// Checks whether an opening tag's `class` attribute lists `class`.
pub fn has_class(tag: &str, class: &str) -> bool {
    attr_value(tag, "class").is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

/// Removes every tag from a fragment, leaving raw (undecoded) text.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Locates `<name` followed by whitespace, `>` or `/` at or after `from`.
/// Returns the byte range of the whole opening tag.
fn find_open_tag(lower: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let needle = format!("<{name}");
    let mut pos = from;
    while let Some(rel) = lower.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {
                let end = after + lower[after..].find('>')? + 1;
                return Some((start, end));
            }
            _ => pos = after,
        }
    }
    None
}

/// Locates `</name` followed by whitespace or `>` at or after `from`.
fn find_close_tag(lower: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let mut pos = from;
    while let Some(rel) = lower.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' => {
                let end = after + lower[after..].find('>')? + 1;
                return Some((start, end));
            }
            _ => pos = after,
        }
    }
    None
}

/// Balances nested same-name tags starting just after an opening tag.
/// Returns `(inner_end, close_end)`.
fn find_matching_close(lower: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut pos = from;

    loop {
        let (close_start, close_end) = find_close_tag(lower, name, pos)?;
        match find_open_tag(lower, name, pos) {
            Some((open_start, open_end)) if open_start < close_start => {
                if !is_self_closing(&lower[open_start..open_end]) {
                    depth += 1;
                }
                pos = open_end;
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some((close_start, close_end));
                }
                pos = close_end;
            }
        }
    }
}

fn is_self_closing(tag: &str) -> bool {
    tag.trim_end_matches('>').trim_end().ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_attr_value_quotes() {
        let tag = r#"<li class="entry big" data-id='55' hidden>"#;
        assert_eq!(attr_value(tag, "class"), Some("entry big"));
        assert_eq!(attr_value(tag, "data-id"), Some("55"));
        assert_eq!(attr_value(tag, "missing"), None);
    }

    #[test]
    fn test_attr_value_requires_boundary() {
        let tag = r#"<li data-id="55">"#;
        assert_eq!(attr_value(tag, "id"), None);
        let tag = r#"<li data-id="55" id="x">"#;
        assert_eq!(attr_value(tag, "id"), Some("x"));
    }

    #[test]
    fn test_attr_value_unquoted() {
        assert_eq!(attr_value("<img src=https://a.b/c.jpg>", "src"), Some("https://a.b/c.jpg"));
    }

    #[test]
    fn test_attr_name_case_insensitive() {
        assert_eq!(attr_value(r#"<A HREF="/X">"#, "href"), Some("/X"));
    }

    #[test]
    fn test_has_class() {
        let tag = r#"<div class="text  body">"#;
        assert!(has_class(tag, "text"));
        assert!(has_class(tag, "body"));
        assert!(!has_class(tag, "tex"));
    }

    #[test]
    fn test_find_element_balances_nesting() {
        let html = r#"<div class="outer"><div>a</div><div>b</div></div><div class="other">c</div>"#;
        let outer = find_element(html, "div", |t| has_class(t, "outer")).unwrap();
        assert_eq!(outer.inner, "<div>a</div><div>b</div>");
    }

    #[test]
    fn test_elements_returns_siblings_not_nested() {
        let html = r#"<ul><li class="entry" data-id="1">one<ul><li class="entry" data-id="1a">reply</li></ul></li><li class="entry" data-id="2">two</li></ul>"#;
        let items = elements(html, "li", |t| has_class(t, "entry"));
        let ids: Vec<_> = items.iter().filter_map(|e| e.attr("data-id")).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_tag_prefix_not_confused() {
        // <link> and <li> share a prefix
        let html = r#"<link rel="x"><li class="entry">x</li>"#;
        let items = elements(html, "li", |_| true);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].inner, "x");
    }

    #[test]
    fn test_unclosed_element_runs_to_end() {
        let html = r#"<ul id="itemsStream"><li>x</li>"#;
        let stream = find_element(html, "ul", |t| attr_value(t, "id") == Some("itemsStream")).unwrap();
        assert_eq!(stream.inner, "<li>x</li>");
    }

    #[test]
    fn test_self_closing_element() {
        let html = r#"<div class="x"/><div class="y">y</div>"#;
        let x = find_element(html, "div", |t| has_class(t, "x")).unwrap();
        assert_eq!(x.inner, "");
        let y = find_element(html, "div", |t| has_class(t, "y")).unwrap();
        assert_eq!(y.inner, "y");
    }

    #[test]
    fn test_find_open_tag_matching() {
        let html = r#"<img src="a.png"><img class="media" src="b.png">"#;
        let tag = find_open_tag_matching(html, "img", |t| has_class(t, "media")).unwrap();
        assert_eq!(attr_value(tag, "src"), Some("b.png"));
    }

    #[test]
    fn test_element_text() {
        let html = r#"<a class="author"> <b>kibic</b>
            </a>"#;
        let author = find_element(html, "a", |t| has_class(t, "author")).unwrap();
        assert_eq!(author.text(), "kibic");
    }

    #[test]
    fn test_garbage_input_does_not_panic() {
        for html in ["", "<", "<li", "</li>", "<li class=\"entry\"", "<<<>>>", "<li>ąę</li"] {
            let _ = elements(html, "li", |_| true);
            let _ = find_open_tag_matching(html, "li", |_| true);
        }
    }
}
