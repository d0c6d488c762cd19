//! Attribute-list parsing (§4.5, §6, §8 round-trip): the restricted parser that stands in for the
//! original's reliance on a host `eval`/`dict`-literal reader (§9 "Dynamic evaluation").
//!
//! An attribute list is a comma-separated sequence of either bare positional values or
//! `name=value` pairs; either may be double-quoted to embed a literal comma or `=`. Quoted values
//! may escape an embedded quote with `\"`.

use std::collections::HashMap;

/// One parsed `[...]` attribute list: positional values (keyed `"1"`, `"2"`, ... by convention,
/// but also addressable by index) plus named values, both insertion-ordered like
/// [`crate::document::AttributeMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrList {
    order: Vec<String>,
    values: HashMap<String, String>,
    next_positional: usize,
}

impl AttrList {
    pub fn new() -> Self {
        AttrList::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.get(&index.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().map(move |k| (k.as_str(), self.values[k].as_str()))
    }

    fn set_named(&mut self, name: String, value: String) {
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value);
    }

    /// Inserts or overwrites a named entry directly (used to splice a regex-captured `target`
    /// group into an otherwise `attrlist`-derived list).
    pub fn insert_named(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_named(name.into(), value.into());
    }

    fn push_positional(&mut self, value: String) {
        self.next_positional += 1;
        self.set_named(self.next_positional.to_string(), value);
    }

    /// Derives `<option>-option` entries from a comma-separated `options=` value (§4.5).
    pub fn apply_options_derivation(&mut self) {
        let opts = self.get("options").map(|s| s.to_string());
        if let Some(opts) = opts {
            for opt in opts.split(',') {
                let opt = opt.trim();
                if !opt.is_empty() {
                    self.set_named(format!("{}-option", opt), opt.to_string());
                }
            }
        }
    }
}

/// Splits `raw` on top-level commas, honoring double-quoted segments (a `\"` inside a quoted
/// segment is a literal quote, not a terminator).
fn split_top_level(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Parses an attribute list body (the text between `[` and `]`, already attribute-substituted).
pub fn parse_attributes(raw: &str) -> AttrList {
    let mut list = AttrList::new();
    for part in split_top_level(raw) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match find_top_level_eq(part) {
            Some(idx) => {
                let name = part[..idx].trim().to_string();
                let value = part[idx + 1..].trim().to_string();
                list.set_named(name, value);
            }
            None => list.push_positional(part.to_string()),
        }
    }
    list.apply_options_derivation();
    list
}

/// Finds a top-level `=` (outside quotes) in an already-comma-split part.
fn find_top_level_eq(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Re-serializes an [`AttrList`] so it re-parses to the same dictionary (§8 round-trip property).
/// Positional entries with non-contiguous keys are emitted as `name=value` to stay unambiguous.
pub fn format_attributes(list: &AttrList) -> String {
    let mut expected_positional = 1usize;
    let mut parts = Vec::new();
    for (name, value) in list.iter() {
        let is_next_positional = name.parse::<usize>() == Ok(expected_positional);
        let needs_quotes = value.contains(',') || value.contains('=');
        let quoted = if needs_quotes {
            format!("\"{}\"", value.replace('"', "\\\""))
        } else {
            value.to_string()
        };
        if is_next_positional {
            parts.push(quoted);
            expected_positional += 1;
        } else {
            parts.push(format!("{}={}", name, quoted));
        }
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_positional_and_named() {
        let list = parse_attributes(r#"link,role="external""#);
        assert_eq!(list.positional(1), Some("link"));
        assert_eq!(list.get("role"), Some("external"));
    }

    #[test]
    fn explicit_numeric_name_overrides_positional() {
        let list = parse_attributes(r#"link,1="explicit""#);
        assert_eq!(list.positional(1), Some("explicit"));
    }

    #[test]
    fn quoted_value_may_embed_comma() {
        let list = parse_attributes(r#"title="a, b, c""#);
        assert_eq!(list.get("title"), Some("a, b, c"));
    }

    #[test]
    fn derives_option_entries() {
        let list = parse_attributes("options=\"compact,numbered\"");
        assert_eq!(list.get("compact-option"), Some("compact"));
        assert_eq!(list.get("numbered-option"), Some("numbered"));
    }

    #[test]
    fn round_trips_through_format_attributes() {
        let list = parse_attributes(r#"a,b=2,c="x,y""#);
        let formatted = format_attributes(&list);
        let reparsed = parse_attributes(&formatted);
        assert_eq!(list, reparsed);
    }
}
