//! HTML message formatting for item notifications.

use crate::store::Item;

/// Shown in place of a summary that could not be produced.
pub const SUMMARY_PLACEHOLDER: &str = "Summary unavailable.";

/// Description characters shown under the placeholder.
const DESCRIPTION_EXCERPT_CHARS: usize = 500;

/// Escaped title characters inside `<b>`.
pub const MAX_TITLE_CHARS: usize = 256;

/// Longer URLs are shown as text rather than inside `<a href>`.
pub const MAX_LINK_URL_CHARS: usize = 512;

/// Smallest chunk size that still holds the largest title or link element.
pub const MIN_MESSAGE_CHARS: usize = 1024;

/// Format an item as an HTML message body.
///
/// The title and link elements are bounded so that each fits in any chunk
/// of `MIN_MESSAGE_CHARS`, which keeps every split chunk well formed.
pub fn format_message(item: &Item) -> String {
    let mut body = format!(
        "<b>{}</b>\n{}\n\n",
        escaped_title(item.title.trim()),
        item.published_at.format("%Y-%m-%d %H:%M UTC")
    );

    match item.summary.as_deref().map(str::trim) {
        Some(summary) if !summary.is_empty() => {
            body.push_str("Summary: ");
            body.push_str(&escape_html(summary));
        }
        _ => {
            body.push_str("Summary: ");
            body.push_str(SUMMARY_PLACEHOLDER);
            let excerpt = excerpt(item.description.trim(), DESCRIPTION_EXCERPT_CHARS);
            if !excerpt.is_empty() {
                body.push_str("\n\n");
                body.push_str(&escape_html(&excerpt));
            }
        }
    }

    let url = escape_attribute(&item.url);
    if url.chars().count() <= MAX_LINK_URL_CHARS {
        body.push_str(&format!("\n\n<a href=\"{}\">Open</a>", url));
    } else {
        body.push_str("\n\n");
        body.push_str(&url);
    }
    body
}

/// Escape the title, truncating it on a character boundary so the escaped
/// form stays within `MAX_TITLE_CHARS`. Entities are never cut.
fn escaped_title(title: &str) -> String {
    let escaped = escape_html(title);
    if escaped.chars().count() <= MAX_TITLE_CHARS {
        return escaped;
    }

    let mut cut = String::new();
    let mut len = 0;
    for c in title.chars() {
        let piece = escape_html(c.encode_utf8(&mut [0; 4]));
        let piece_len = piece.chars().count();
        if len + piece_len > MAX_TITLE_CHARS - 3 {
            break;
        }
        cut.push_str(&piece);
        len += piece_len;
    }
    cut.push_str("...");
    cut
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars - 3).collect();
    cut.push_str("...");
    cut
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_attribute(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}
