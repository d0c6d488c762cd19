//! Entry-section parsing: `name=value` pairs, `name!` undefine, `\=` escaping (§4.3, §6).

use super::OrderedMap;

/// A single parsed entry. `value == None` means the line was `name!` (undefine).
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub value: Option<String>,
}

/// Parses `line` as one `name=value` / `name!` entry. Backslash-escaped `=` in the name is
/// unescaped. Returns `None` for lines that don't look like an entry at all.
pub fn parse_entry(line: &str) -> Option<Entry> {
    let trimmed = line;
    if let Some(name) = trimmed.strip_suffix('!') {
        if !name.is_empty() && !name.contains('=') {
            return Some(Entry {
                name: unescape_eq(name).trim().to_string(),
                value: None,
            });
        }
    }
    let eq = find_unescaped_eq(trimmed)?;
    let name = unescape_eq(&trimmed[..eq]).trim().to_string();
    let value = trimmed[eq + 1..].to_string();
    Some(Entry {
        name,
        value: Some(value),
    })
}

fn find_unescaped_eq(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && (i == 0 || bytes[i - 1] != b'\\') {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn unescape_eq(s: &str) -> String {
    s.replace("\\=", "=")
}

/// The resolved form of an entry section: later entries for the same name overwrite earlier ones
/// (last-one-wins within the merged, cascaded sequence); `name!` removes the key.
#[derive(Debug, Clone, Default)]
pub struct EntrySection(pub OrderedMap<String>);

pub fn parse_section(lines: &[String]) -> EntrySection {
    let mut map = OrderedMap::new();
    for line in lines {
        if let Some(entry) = parse_entry(line) {
            match entry.value {
                Some(v) => map.insert(entry.name, v),
                None => map.remove(&entry.name),
            }
        }
    }
    EntrySection(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_entry() {
        let e = parse_entry("strong=<b>|</b>").unwrap();
        assert_eq!(e.name, "strong");
        assert_eq!(e.value.as_deref(), Some("<b>|</b>"));
    }

    #[test]
    fn parses_undefine() {
        let e = parse_entry("numbered!").unwrap();
        assert_eq!(e.name, "numbered");
        assert_eq!(e.value, None);
    }

    #[test]
    fn unescapes_equals_in_name() {
        let e = parse_entry("a\\=b=value").unwrap();
        assert_eq!(e.name, "a=b");
        assert_eq!(e.value.as_deref(), Some("value"));
    }

    #[test]
    fn section_applies_undefine_after_define() {
        let lines = vec!["x=1".to_string(), "y=2".to_string(), "x!".to_string()];
        let section = parse_section(&lines);
        assert!(!section.0.contains("x"));
        assert_eq!(section.0.get("y"), Some(&"2".to_string()));
    }

    #[test]
    fn section_merge_last_one_wins() {
        let lines = vec!["x=1".to_string(), "x=2".to_string()];
        let section = parse_section(&lines);
        assert_eq!(section.0.get("x"), Some(&"2".to_string()));
    }
}
