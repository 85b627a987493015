//! Splitting formatted messages to an endpoint's size limit.
//!
//! The body is first broken into atoms that must never be cut: single
//! characters, HTML tags, entities, and whole inline elements such as
//! `<a href="...">text</a>` when they fit in one chunk. Chunks are then
//! built greedily and cut at the last paragraph break, else the last
//! sentence end, else the last whitespace, else wherever the limit falls.
//! Concatenating the chunks in order yields the original body.

/// Longest entity recognised, including `&` and `;`.
const MAX_ENTITY_CHARS: usize = 12;

/// Split `body` into chunks of at most `max_chars` characters.
pub fn split_message(body: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if body.chars().count() <= max_chars {
        return if body.is_empty() {
            Vec::new()
        } else {
            vec![body.to_string()]
        };
    }

    let atoms = atomize(body, max_chars);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < atoms.len() {
        let mut end = start;
        let mut len = 0;
        while end < atoms.len() && len + atoms[end].chars <= max_chars {
            len += atoms[end].chars;
            end += 1;
        }

        if end == atoms.len() {
            chunks.push(join(&atoms[start..end]));
            break;
        }

        if end == start {
            // A lone tag or entity longer than the limit; nothing else to do but cut it.
            let text = atoms[start].text;
            let mut chars = text.chars().peekable();
            while chars.peek().is_some() {
                chunks.push(chars.by_ref().take(max_chars).collect());
            }
            start += 1;
            continue;
        }

        let take = break_point(&atoms[start..end]).unwrap_or(end - start);
        chunks.push(join(&atoms[start..start + take]));
        start += take;
    }

    chunks
}

#[derive(Debug, Clone, Copy)]
struct Atom<'a> {
    text: &'a str,
    chars: usize,
}

impl<'a> Atom<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().count(),
        }
    }

    fn is_whitespace(&self) -> bool {
        self.chars == 1 && self.text.chars().all(char::is_whitespace)
    }

    fn is(&self, c: char) -> bool {
        self.chars == 1 && self.text.starts_with(c)
    }
}

fn join(atoms: &[Atom<'_>]) -> String {
    atoms.iter().map(|a| a.text).collect()
}

/// Number of atoms to take from the front of `window`, cutting at the best
/// available boundary. `None` means no soft boundary exists.
fn break_point(window: &[Atom<'_>]) -> Option<usize> {
    // Paragraph: after a blank line.
    for i in (1..window.len()).rev() {
        if window[i].is('\n') && window[i - 1].is('\n') {
            return Some(i + 1);
        }
    }

    // Sentence: whitespace following terminal punctuation.
    for i in (1..window.len()).rev() {
        if window[i].is_whitespace()
            && (window[i - 1].is('.') || window[i - 1].is('!') || window[i - 1].is('?'))
        {
            return Some(i + 1);
        }
    }

    for i in (1..window.len()).rev() {
        if window[i].is_whitespace() {
            return Some(i + 1);
        }
    }

    None
}

fn atomize(body: &str, max_chars: usize) -> Vec<Atom<'_>> {
    let mut atoms = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        let rest = &body[pos..];
        let len = if rest.starts_with('<') {
            element_len(rest, max_chars)
                .or_else(|| rest.find('>').map(|i| i + 1))
                .unwrap_or(1)
        } else if rest.starts_with('&') {
            entity_len(rest).unwrap_or(1)
        } else {
            rest.chars().next().map(char::len_utf8).unwrap_or(1)
        };

        atoms.push(Atom::new(&rest[..len]));
        pos += len;
    }

    atoms
}

/// Byte length of `&name;` at the start of `text`.
fn entity_len(text: &str) -> Option<usize> {
    let end = text
        .char_indices()
        .take(MAX_ENTITY_CHARS)
        .skip(1)
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '#'))?;
    (end.1 == ';' && end.0 > 1).then_some(end.0 + 1)
}

/// Byte length of a whole inline element `<x ...>...</x>` at the start of
/// `text`, if it fits in `max_chars`.
fn element_len(text: &str, max_chars: usize) -> Option<usize> {
    let open_end = text.find('>')? + 1;
    let open = &text[1..open_end - 1];
    if open.starts_with('/') || open.ends_with('/') {
        return None;
    }

    let name: String = open
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if name.is_empty() {
        return None;
    }

    let close = format!("</{}>", name);
    let close_at = text[open_end..].find(&close)? + open_end;
    let len = close_at + close.len();

    (text[..len].chars().count() <= max_chars).then_some(len)
}
