//! Metadata header ("frontmatter") at the top of a markdown document.
//!
//! Only flat `key: value` pairs with scalar string values are understood.
//! Multi-line scalars, comments, lists and nested maps are dropped on parse,
//! so re-serializing a hand-authored block outside that subset is lossy.

use std::fmt::Write as _;

const DELIMITER: &str = "---";
const NEW_PROPERTY_KEY: &str = "new-property";

/// Ordered key/value metadata. Keys are unique and case-sensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frontmatter {
    entries: Vec<(String, String)>,
}

impl Frontmatter {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|idx| self.entries[idx].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Update `key` in place, or append it. Returns `false` (and changes
    /// nothing) when `key` is not a usable metadata key.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        if !is_valid_key(key) {
            return false;
        }
        let value = value.into();
        match self.position(key) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
        true
    }

    /// Append an empty property under the first free `new-property[-N]` key.
    pub fn add_property(&mut self) -> String {
        let mut key = NEW_PROPERTY_KEY.to_owned();
        let mut n = 1usize;
        while self.contains_key(&key) {
            key = format!("{NEW_PROPERTY_KEY}-{n}");
            n += 1;
        }
        self.entries.push((key.clone(), String::new()));
        key
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.position(key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Rename `old` to `new`, keeping the entry's position.
    ///
    /// Refused when `old` is missing, when `new` equals `old`, is not a
    /// valid key, or is already taken.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new || !is_valid_key(new) || self.contains_key(new) {
            return false;
        }
        let Some(idx) = self.position(old) else {
            return false;
        };
        new.clone_into(&mut self.entries[idx].0);
        true
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Frontmatter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (key, value) in iter {
            let key = key.into();
            let _ = out.set(&key, value);
        }
        out
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.trim() == key && !key.contains([':', '\n', '\r'])
}

/// Result of splitting a document into metadata and body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedContent<'a> {
    pub frontmatter: Frontmatter,
    pub body: &'a str,
    /// Text between the delimiter lines, empty when there is no block.
    pub raw_block: &'a str,
}

/// Split `raw` into frontmatter and body. Never fails: without a leading
/// delimiter line the whole input is body.
pub fn parse(raw: &str) -> ParsedContent<'_> {
    let Some((raw_block, body)) = split_block(raw) else {
        return ParsedContent {
            frontmatter: Frontmatter::new(),
            body: raw,
            raw_block: "",
        };
    };

    let mut frontmatter = Frontmatter::new();
    for line in raw_block.lines() {
        let Some(colon) = line.find(':') else {
            continue;
        };
        if colon == 0 {
            continue;
        }
        let key = line[..colon].trim();
        if key.is_empty() {
            continue;
        }
        let value = unquote(line[colon + 1..].trim());
        let _ = frontmatter.set(key, value);
    }

    ParsedContent {
        frontmatter,
        body,
        raw_block,
    }
}

/// Render `frontmatter` as a delimited block, or `""` when it is empty.
pub fn serialize(frontmatter: &Frontmatter) -> String {
    if frontmatter.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(8 + frontmatter.len() * 24);
    out.push_str(DELIMITER);
    out.push('\n');
    for (key, value) in frontmatter.iter() {
        if needs_quotes(value) {
            let _ = writeln!(out, "{key}: \"{}\"", escape(value));
        } else {
            let _ = writeln!(out, "{key}: {value}");
        }
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out
}

/// Returns `(inner, body)` when `raw` opens with a delimiter line and a
/// matching closing delimiter line follows.
fn split_block(raw: &str) -> Option<(&str, &str)> {
    let rest = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))?;

    let bytes = rest.as_bytes();
    let mut start = 0usize;
    while start <= rest.len() {
        let (line_end, next) = match memchr::memchr(b'\n', &bytes[start..]) {
            Some(rel) => (start + rel, start + rel + 1),
            None => (rest.len(), rest.len()),
        };
        let line = rest[start..line_end].strip_suffix('\r').unwrap_or(&rest[start..line_end]);

        if line == DELIMITER {
            let inner = rest[..start]
                .strip_suffix('\n')
                .map_or(&rest[..start], |s| s.strip_suffix('\r').unwrap_or(s));
            return Some((inner, &rest[next..]));
        }

        if next == line_end {
            break;
        }
        start = next;
    }

    None
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return unescape(inner);
        }
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_owned();
        }
    }
    value.to_owned()
}

fn unescape(inner: &str) -> String {
    inner.replace("\\\"", "\"")
}

fn needs_quotes(value: &str) -> bool {
    value.contains([':', '#', '\n', '\r'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.starts_with(['"', '\''])
}

fn escape(value: &str) -> String {
    value.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fm(pairs: &[(&str, &str)]) -> Frontmatter {
        pairs.iter().copied().collect()
    }

    #[test]
    fn text_without_delimiter_is_all_body() {
        for text in ["", "Body text", "# Title\n\n---\n", " ---\na: b\n---\n", "----\na: b\n----\n"] {
            let parsed = parse(text);
            assert!(parsed.frontmatter.is_empty());
            assert_eq!(parsed.body, text);
            assert_eq!(parsed.raw_block, "");
        }
    }

    #[test]
    fn unterminated_block_is_body() {
        let text = "---\ntitle: Hello\nBody text";
        let parsed = parse(text);
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, text);
    }

    #[test]
    fn parses_block_and_body() {
        let parsed = parse("---\ntitle: Hello\n---\nBody text");
        assert_eq!(parsed.frontmatter, fm(&[("title", "Hello")]));
        assert_eq!(parsed.body, "Body text");
        assert_eq!(parsed.raw_block, "title: Hello");
    }

    #[test]
    fn closing_delimiter_may_end_input() {
        let parsed = parse("---\ntitle: Hello\n---");
        assert_eq!(parsed.frontmatter.get("title"), Some("Hello"));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn empty_block_is_recognized() {
        let parsed = parse("---\n---\nBody");
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, "Body");
        assert_eq!(parsed.raw_block, "");
    }

    #[test]
    fn crlf_line_endings() {
        let parsed = parse("---\r\ntitle: Hello\r\ntags: a\r\n---\r\nBody\r\n");
        assert_eq!(parsed.frontmatter, fm(&[("title", "Hello"), ("tags", "a")]));
        assert_eq!(parsed.body, "Body\r\n");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let parsed = parse("---\nno colon here\n: leading colon\n  : blank key\nkey:value\n---\n");
        assert_eq!(parsed.frontmatter, fm(&[("key", "value")]));
    }

    #[test]
    fn splits_on_first_colon_and_trims() {
        let parsed = parse("---\n  url :  https://example.com/a  \n---\n");
        assert_eq!(parsed.frontmatter.get("url"), Some("https://example.com/a"));
    }

    #[test]
    fn unquotes_values() {
        let parsed = parse(
            "---\na: \"He said \\\"hi\\\"\"\nb: 'it''s raw \\\"'\nc: \"mismatched'\nd: \"\n---\n",
        );
        assert_eq!(parsed.frontmatter.get("a"), Some("He said \"hi\""));
        assert_eq!(parsed.frontmatter.get("b"), Some("it''s raw \\\""));
        assert_eq!(parsed.frontmatter.get("c"), Some("\"mismatched'"));
        assert_eq!(parsed.frontmatter.get("d"), Some("\""));
    }

    #[test]
    fn duplicate_keys_keep_first_position_last_value() {
        let parsed = parse("---\na: 1\nb: 2\na: 3\n---\n");
        let entries: Vec<_> = parsed.frontmatter.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn serialize_empty_is_empty_string() {
        assert_eq!(serialize(&Frontmatter::new()), "");
    }

    #[test]
    fn serialize_preserves_order() {
        let data = fm(&[("title", "Hello"), ("author", "Me"), ("draft", "true")]);
        assert_eq!(
            serialize(&data),
            "---\ntitle: Hello\nauthor: Me\ndraft: true\n---\n"
        );
    }

    #[test]
    fn colon_values_are_quoted_and_round_trip() {
        let data = fm(&[("time", "10:30")]);
        let text = serialize(&data);
        assert_eq!(text, "---\ntime: \"10:30\"\n---\n");
        assert_eq!(parse(&text).frontmatter.get("time"), Some("10:30"));
    }

    #[test]
    fn round_trips_values_the_codec_produces() {
        let data = fm(&[
            ("plain", "Hello world"),
            ("colon", "a: b"),
            ("hash", "#tag"),
            ("padded", "  spaced  "),
            ("quotes", "say \"hi\""),
            ("wrapped", "\"quoted\""),
            ("single", "'x'"),
            ("slash", "C:\\dir\\\"x\""),
            ("empty", ""),
        ]);
        for body in ["", "Body", "# Heading\n\n---\n\nmore\n"] {
            let text = format!("{}{body}", serialize(&data));
            let parsed = parse(&text);
            assert_eq!(parsed.frontmatter, data);
            assert_eq!(parsed.body, body);
        }
    }

    #[test]
    fn backslashes_in_quoted_values_are_literal() {
        let parsed = parse("---\npath: \"C:\\temp\\new\"\n---\nBody");
        assert_eq!(parsed.frontmatter.get("path"), Some("C:\\temp\\new"));

        let data = fm(&[("path", "C:\\temp\\new"), ("dir", "C:\\x:\\")]);
        let text = serialize(&data);
        assert_eq!(
            text,
            "---\npath: C:\\temp\\new\ndir: \"C:\\x:\\\"\n---\n"
        );
        assert_eq!(parse(&text).frontmatter, data);
    }

    #[test]
    fn line_breaks_force_quotes() {
        let text = serialize(&fm(&[("note", "one\ntwo")]));
        assert_eq!(text, "---\nnote: \"one\ntwo\"\n---\n");
    }

    #[test]
    fn set_updates_in_place() {
        let mut data = fm(&[("a", "1"), ("b", "2")]);
        assert!(data.set("a", "9"));
        assert!(data.set("c", "3"));
        assert!(!data.set("bad:key", "x"));
        assert!(!data.set("", "x"));
        let entries: Vec<_> = data.iter().collect();
        assert_eq!(entries, vec![("a", "9"), ("b", "2"), ("c", "3")]);
    }

    #[test]
    fn add_property_picks_free_key() {
        let mut data = Frontmatter::new();
        assert_eq!(data.add_property(), "new-property");
        assert_eq!(data.add_property(), "new-property-1");
        assert_eq!(data.add_property(), "new-property-2");
        assert_eq!(data.get("new-property-1"), Some(""));
    }

    #[test]
    fn rename_keeps_position_and_rejects_collisions() {
        let mut data = fm(&[("a", "1"), ("b", "2"), ("c", "3")]);
        assert!(data.rename("b", "beta"));
        assert!(!data.rename("a", "c"));
        assert!(!data.rename("a", "a"));
        assert!(!data.rename("a", "  "));
        assert!(!data.rename("missing", "z"));
        let keys: Vec<_> = data.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "beta", "c"]);
    }

    #[test]
    fn remove_returns_value() {
        let mut data = fm(&[("a", "1")]);
        assert_eq!(data.remove("a"), Some("1".to_owned()));
        assert_eq!(data.remove("a"), None);
        assert!(data.is_empty());
    }
}
