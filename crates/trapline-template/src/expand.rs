#![forbid(unsafe_code)]

//! Phase 1: rewrite text-content markers into placeholder elements.
//!
//! Outside of tags, the scanner recognizes:
//!
//! | Form | Placeholder |
//! |------|-------------|
//! | `%key`, `%{key}` | variable |
//! | `%func:key`, `%{func:key}` | variable, transformed |
//! | `%key...`, `%{key...}` | list |
//! | `%func:key...`, `%{func:key...}` | list, transformed |
//!
//! and rewrites each to
//! `<template data-type="variable|ellipsis" data-func="func">key</template>`.
//! `\%` produces a literal `%` and suppresses the marker. Text inside tags,
//! including attribute markers, is copied unchanged for phase 2, and so are
//! comments.
//!
//! Every rewrite changes the text length, so [`expand_mapped`] also returns a
//! [`SourceMap`] that takes offsets in the expanded text back to the
//! template the author wrote.

use std::fmt::Write as _;

use crate::markup::{Marker, MarkerKind};

/// A rewritten region: `expanded` in the output came from `source` in the
/// input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    expanded_start: usize,
    expanded_end: usize,
    source_start: usize,
    source_end: usize,
}

/// Offset translation from expanded text back to the template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    regions: Vec<Region>,
}

impl SourceMap {
    /// The template offset of byte `offset` of the expanded text. Offsets
    /// inside a generated placeholder map to the start of its marker.
    #[must_use]
    pub fn source_offset(&self, offset: usize) -> usize {
        let index = self.regions.partition_point(|r| r.expanded_start <= offset);
        let Some(region) = index.checked_sub(1).map(|i| self.regions[i]) else {
            return offset;
        };
        if offset < region.expanded_end {
            region.source_start
        } else {
            region.source_end + (offset - region.expanded_end)
        }
    }

    fn record(&mut self, expanded: (usize, usize), source: (usize, usize)) {
        self.regions.push(Region {
            expanded_start: expanded.0,
            expanded_end: expanded.1,
            source_start: source.0,
            source_end: source.1,
        });
    }
}

/// Expand every text-content marker in `template`.
#[must_use]
pub fn expand(template: &str) -> String {
    expand_mapped(template).0
}

/// Like [`expand`], also returning the offset map back to `template`.
#[must_use]
pub fn expand_mapped(template: &str) -> (String, SourceMap) {
    let mut out = String::with_capacity(template.len() + template.len() / 2);
    let mut map = SourceMap::default();
    let mut rest = template;
    let mut in_tag = false;
    let mut quote: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        let pos = template.len() - rest.len();
        let mut advance = c.len_utf8();
        if in_tag {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (None, '"' | '\'') => quote = Some(c),
                (None, '>') => in_tag = false,
                _ => {}
            }
            out.push(c);
        } else {
            match c {
                '<' if rest.starts_with("<!--") => {
                    advance = rest.find("-->").map_or(rest.len(), |end| end + 3);
                    out.push_str(&rest[..advance]);
                }
                '<' => {
                    in_tag = true;
                    out.push(c);
                }
                '\\' if rest[1..].starts_with('%') => {
                    let start = out.len();
                    out.push('%');
                    advance = 2;
                    map.record((start, out.len()), (pos, pos + advance));
                }
                '%' => match scan_marker(rest) {
                    Some((marker, len)) => {
                        let start = out.len();
                        write_placeholder(&marker, &mut out);
                        advance = len;
                        map.record((start, out.len()), (pos, pos + advance));
                    }
                    None => out.push('%'),
                },
                c => out.push(c),
            }
        }
        rest = &rest[advance..];
    }
    (out, map)
}

fn write_placeholder(marker: &Marker, out: &mut String) {
    let kind = match marker.kind {
        MarkerKind::Variable => "variable",
        MarkerKind::List => "ellipsis",
    };
    let _ = write!(
        out,
        "<template data-type=\"{kind}\" data-func=\"{}\">{}</template>",
        marker.func.as_deref().unwrap_or(""),
        marker.key
    );
}

fn word_len(s: &str) -> usize {
    s.bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count()
}

/// Parse `[func:]key[...]` at the start of `s`.
fn scan_body(s: &str) -> Option<(Marker, usize)> {
    let first = word_len(s);
    if first == 0 {
        return None;
    }
    let mut pos = first;
    let mut func = None;
    let mut key = &s[..first];

    if s[pos..].starts_with(':') {
        let second = word_len(&s[pos + 1..]);
        if second > 0 {
            func = Some(key.to_owned());
            key = &s[pos + 1..pos + 1 + second];
            pos += 1 + second;
        }
    }

    let kind = if s[pos..].starts_with("...") {
        pos += 3;
        MarkerKind::List
    } else {
        MarkerKind::Variable
    };

    Some((
        Marker {
            kind,
            func,
            key: key.to_owned(),
        },
        pos,
    ))
}

/// Parse a marker at the start of `s`, which begins with `%`. Returns the
/// marker and its length in bytes.
fn scan_marker(s: &str) -> Option<(Marker, usize)> {
    let body = &s[1..];
    if let Some(inner) = body.strip_prefix('{') {
        let (marker, len) = scan_body(inner)?;
        inner[len..].starts_with('}').then_some((marker, len + 3))
    } else {
        scan_body(body).map(|(marker, len)| (marker, len + 1))
    }
}
