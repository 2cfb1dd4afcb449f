//! Logical character offsets to target-codec byte offsets.
//!
//! Fixed-layout books address annotations by byte position inside the text as
//! stored in the book: HTML-escaped, in the book's codec, with characters the
//! codec cannot hold written as decimal character references. The mapper finds
//! a mention's text inside that escaped form and measures the encoded prefix.

use std::{borrow::Cow, collections::HashSet};

use encoding_rs::{Encoding, UTF_8};
use quick_xml::escape::escape;

/// How the output format addresses annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Logical character offsets, used by inline markup output.
    Chars,
    /// Byte offsets of the escaped text encoded with the given codec.
    Bytes(&'static Encoding),
}

impl Addressing {
    /// Resolve a codec label such as `cp1252` or `utf-8`.
    pub fn for_codec(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(|enc| Self::Bytes(enc.output_encoding()))
    }
}

/// Escape text the way extraction does: markup-significant characters become
/// entity references and characters `encoding` cannot represent become
/// decimal character references.
pub fn escape_for_codec(text: &str, encoding: &'static Encoding) -> String {
    let escaped = escape(text);
    if encoding == UTF_8 {
        return escaped.into_owned();
    }
    // encode() substitutes `&#N;` for unmappable characters; decoding gives the
    // escaped text back with those references spelled out.
    let (bytes, _, _) = encoding.encode(&escaped);
    let (decoded, _) = encoding.decode_without_bom_handling(&bytes);
    decoded.into_owned()
}

/// Byte length of `text` under `encoding`.
pub fn encoded_len(text: &str, encoding: &'static Encoding) -> usize {
    if encoding == UTF_8 {
        return text.len();
    }
    let (bytes, _, _) = encoding.encode(text);
    bytes.len()
}

/// Find `token` in `escaped` at or after byte `search_from`.
///
/// Returns the byte offset of the match under `encoding` together with the
/// matched text, retrying with the escaped spelling of the token when the raw
/// form is not present.
pub fn map_offset<'t>(
    escaped: &str,
    token: &'t str,
    search_from: usize,
    encoding: &'static Encoding,
) -> Option<(usize, Cow<'t, str>)> {
    let (pos, matched) = find_token(escaped, token, search_from, encoding)?;
    Some((encoded_len(&escaped[..pos], encoding), matched))
}

/// Byte position in `escaped` of the first raw or respelled `token` at or
/// after `search_from`.
fn find_token<'t>(
    escaped: &str,
    token: &'t str,
    search_from: usize,
    encoding: &'static Encoding,
) -> Option<(usize, Cow<'t, str>)> {
    let haystack = escaped.get(search_from..)?;
    if let Some(pos) = haystack.find(token) {
        return Some((search_from + pos, Cow::Borrowed(token)));
    }
    let respelled = escape_for_codec(token, encoding);
    if respelled == token {
        return None;
    }
    let pos = haystack.find(respelled.as_str())?;
    Some((search_from + pos, Cow::Owned(respelled)))
}

/// `token` (raw or respelled) starting exactly at byte `at` of `escaped`.
fn token_at<'t>(
    escaped: &str,
    token: &'t str,
    at: usize,
    encoding: &'static Encoding,
) -> Option<Cow<'t, str>> {
    let rest = escaped.get(at..)?;
    if rest.starts_with(token) {
        return Some(Cow::Borrowed(token));
    }
    let respelled = escape_for_codec(token, encoding);
    (respelled != token && rest.starts_with(respelled.as_str())).then_some(Cow::Owned(respelled))
}

/// Result of locating one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    Mapped { start: usize, length: usize },
    /// Neither the raw nor the escaped token occurs in the unit.
    Unlocatable,
    /// Another occurrence already starts at this offset.
    Duplicate,
}

/// Per-unit mapper. Feed occurrences in scan order.
#[derive(Debug)]
pub struct UnitOffsets<'a> {
    text: &'a str,
    escaped: &'a str,
    encoding: &'static Encoding,
    base: usize,
    emitted: HashSet<usize>,
    /// Byte positions in `text` and `escaped` known to line up: the start of
    /// the last located token.
    anchor: (usize, usize),
}

impl<'a> UnitOffsets<'a> {
    /// `base` is the unit's first byte in the target addressing.
    pub fn new(text: &'a str, escaped: &'a str, encoding: &'static Encoding, base: usize) -> Self {
        Self {
            text,
            escaped,
            encoding,
            base,
            emitted: HashSet::new(),
            anchor: (0, 0),
        }
    }

    /// Map the half-open character span `[start, end)` of the logical text.
    pub fn locate(&mut self, start: usize, end: usize) -> Located {
        let (Some(from), Some(to)) = (char_to_byte(self.text, start), char_to_byte(self.text, end))
        else {
            return Located::Unlocatable;
        };
        if to <= from {
            return Located::Unlocatable;
        }
        let token = &self.text[from..to];

        let (text_anchor, escaped_anchor) = if from >= self.anchor.0 {
            self.anchor
        } else {
            (0, 0)
        };
        let gap = &self.text[text_anchor..from];
        // Escaping never shortens text, so the token cannot sit before `floor`.
        let floor = escaped_anchor + gap.len();
        let expected = escaped_anchor + escape_for_codec(gap, self.encoding).len();
        let found = match token_at(self.escaped, token, expected, self.encoding) {
            Some(matched) => Some((expected, matched)),
            None => find_token(self.escaped, token, floor, self.encoding),
        };
        let Some((pos, matched)) = found else {
            return Located::Unlocatable;
        };
        self.anchor = (from, pos);

        let start = self.base + encoded_len(&self.escaped[..pos], self.encoding);
        if !self.emitted.insert(start) {
            return Located::Duplicate;
        }
        Located::Mapped {
            start,
            length: encoded_len(&matched, self.encoding),
        }
    }
}

/// Byte index of the `idx`-th char; `text.len()` for one past the end.
pub fn char_to_byte(text: &str, idx: usize) -> Option<usize> {
    text.char_indices()
        .map(|(pos, _)| pos)
        .chain(std::iter::once(text.len()))
        .nth(idx)
}

/// Slice by half-open char range.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if end < start {
        return None;
    }
    let from = char_to_byte(text, start)?;
    let to = char_to_byte(text, end)?;
    text.get(from..to)
}
