//! `[tags]` (§4.3): `name=stag|etag` entries become `(starttag, endtag)` pairs.

use super::entries::EntrySection;
use super::OrderedMap;
use crate::error::Result;

use super::config_error;

#[derive(Debug, Clone, Default)]
pub struct Tags(OrderedMap<(String, String)>);

impl Tags {
    pub fn get(&self, name: &str) -> Option<&(String, String)> {
        self.0.get(name)
    }

    pub fn from_entries(entries: &EntrySection) -> Result<Tags> {
        let mut tags = OrderedMap::new();
        for (name, value) in entries.0.iter() {
            if value.is_empty() {
                tags.insert(name, (String::new(), String::new()));
                continue;
            }
            match value.split_once('|') {
                Some((stag, etag)) => tags.insert(name, (stag.to_string(), etag.to_string())),
                None => return Err(config_error(format!("[tags] {} value malformed", name))),
            }
        }
        Ok(Tags(tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entries::parse_section;

    #[test]
    fn splits_start_end() {
        let lines = vec!["strong=<b>|</b>".to_string()];
        let entries = parse_section(&lines);
        let tags = Tags::from_entries(&entries).unwrap();
        assert_eq!(
            tags.get("strong"),
            Some(&("<b>".to_string(), "</b>".to_string()))
        );
    }

    #[test]
    fn malformed_without_pipe_errors() {
        let lines = vec!["strong=<b>".to_string()];
        let entries = parse_section(&lines);
        assert!(Tags::from_entries(&entries).is_err());
    }
}
