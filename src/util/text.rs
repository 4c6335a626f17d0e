use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Marker appended to text cut short by [`truncate_to_width`].
const ELLIPSIS: char = '…';

/// Terminal columns a string occupies.
///
/// ```
/// use tagchat::util::display_width;
///
/// assert_eq!(display_width("kibic"), 5);
/// assert_eq!(display_width("żółw"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cuts `s` to at most `max_width` columns, ending in `…` when shortened.
///
/// Wide characters are never split; the result may be one column narrower
/// than `max_width` when a wide character straddles the limit.
///
/// ```
/// use tagchat::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("kibic", 10), "kibic");
/// assert_eq!(truncate_to_width("stadionowy_kibic", 8), "stadion…");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    let budget = max_width - 1;
    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    let mut out = String::with_capacity(end + ELLIPSIS.len_utf8());
    out.push_str(&s[..end]);
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Truncates or right-pads `s` to exactly `width` columns.
pub fn fit_to_width(s: &str, width: usize) -> String {
    let truncated = truncate_to_width(s, width);
    let pad = width.saturating_sub(display_width(&truncated));
    let mut out = String::with_capacity(truncated.len() + pad);
    out.push_str(&truncated);
    out.extend(std::iter::repeat(' ').take(pad));
    out
}

/// Drops control characters (ANSI escapes included) from remote text before
/// it reaches the terminal. Newlines and tabs become spaces.
///
/// ```
/// use tagchat::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("gol\x1b[2J!"), "gol[2J!");
/// assert_eq!(strip_control_chars("a\nb"), "a b");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.chars()
            .filter_map(|c| match c {
                '\n' | '\r' | '\t' => Some(' '),
                c if c.is_control() => None,
                c => Some(c),
            })
            .collect(),
    )
}
