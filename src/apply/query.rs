//! Structural edits on the query component of a raw URL
//!
//! The URL may still hold template placeholders (`{{name}}`, `{{= expr }}`),
//! so it is never parsed into a `url::Url`. Only separators outside of
//! placeholders are treated as structure; everything else is kept verbatim.

use std::ops::Range;

use url::form_urlencoded;

use crate::templates::placeholder_spans;

/// Split `url` into (before-query, query, fragment-with-hash)
fn split(url: &str) -> (&str, Option<&str>, &str) {
    let spans = placeholder_spans(url);
    let (rest, fragment) = match find_outside(url, '#', &spans) {
        Some(at) => (&url[..at], &url[at..]),
        None => (url, ""),
    };
    match find_outside(rest, '?', &spans) {
        Some(at) => (&rest[..at], Some(&rest[at + 1..]), fragment),
        None => (rest, None, fragment),
    }
}

fn find_outside(text: &str, needle: char, spans: &[Range<usize>]) -> Option<usize> {
    text.char_indices()
        .find(|(i, c)| *c == needle && !spans.iter().any(|s| s.contains(i)))
        .map(|(i, _)| i)
}

/// Split on `&` outside placeholders
fn pairs(query: &str) -> Vec<&str> {
    let spans = placeholder_spans(query);
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in query.char_indices() {
        if c == '&' && !spans.iter().any(|s| s.contains(&i)) {
            parts.push(&query[start..i]);
            start = i + 1;
        }
    }
    parts.push(&query[start..]);
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn decode(raw: &str) -> String {
    // Prefixing a dummy key keeps any `=` inside `raw` as part of the value
    let framed = format!("_={}", raw);
    form_urlencoded::parse(framed.as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| raw.to_string())
}

fn raw_key(pair: &str) -> &str {
    pair.split_once('=').map(|(k, _)| k).unwrap_or(pair)
}

/// Percent-encode text but leave placeholders untouched
fn encode(text: &str) -> String {
    let mut out = String::new();
    let mut last = 0;
    for span in placeholder_spans(text) {
        out.extend(form_urlencoded::byte_serialize(text[last..span.start].as_bytes()));
        out.push_str(&text[span.clone()]);
        last = span.end;
    }
    out.extend(form_urlencoded::byte_serialize(text[last..].as_bytes()));
    out
}

/// Decoded (key, value) pairs of the URL query, in order
pub fn query_values(url: &str) -> Vec<(String, String)> {
    let (_, query, _) = split(url);
    let Some(query) = query else {
        return Vec::new();
    };
    pairs(query)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Apply set (`Some`) / delete (`None`) edits to the URL query.
///
/// A set replaces every existing value of the key, keeping the position of
/// its first occurrence. Unmentioned parameters, the fragment and any
/// placeholder text are preserved.
pub fn edit_query(url: &str, edits: &[(String, Option<Vec<String>>)]) -> String {
    if edits.is_empty() {
        return url.to_string();
    }

    let (base, query, fragment) = split(url);
    let mut entries: Vec<String> = query
        .map(|q| pairs(q).into_iter().map(str::to_string).collect())
        .unwrap_or_default();

    for (key, edit) in edits {
        let slot = entries.iter().position(|e| decode(raw_key(e)) == *key);
        entries.retain(|e| decode(raw_key(e)) != *key);
        if let Some(values) = edit {
            let fresh: Vec<String> = values
                .iter()
                .map(|v| format!("{}={}", encode(key), encode(v)))
                .collect();
            let at = slot.unwrap_or(entries.len()).min(entries.len());
            entries.splice(at..at, fresh);
        }
    }

    let mut out = base.to_string();
    if !entries.is_empty() {
        out.push('?');
        out.push_str(&entries.join("&"));
    }
    out.push_str(fragment);
    out
}
