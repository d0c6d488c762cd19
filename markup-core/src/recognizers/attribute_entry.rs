//! AttributeEntry (§4.6.1): `:name[.name2]: value` lines that set/clear a document attribute or
//! patch a configuration section at runtime.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ATTRIBUTE_ENTRY;
use crate::document::Document;
use crate::error::Result;

static ATTR_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\W\d][-\w]*$").unwrap());

pub enum Effect {
    /// Sets or clears a document attribute (`name!` clears).
    Attribute { name: String, value: Option<String> },
    /// `:name.section: value` — a runtime patch of configuration section `section`, entry `name`.
    ConfigPatch { section: String, name: String, value: String },
}

/// Parses one already-matched attribute-entry line. Command-line-set attributes are not overridden
/// (§4.6.1); the caller checks that before applying.
pub fn parse(line: &str) -> Option<Effect> {
    let caps = ATTRIBUTE_ENTRY.captures(line)?;
    let name = caps.name("name")?.as_str().to_string();
    if !ATTR_NAME.is_match(&name) {
        return None;
    }
    let bang = caps.name("bang").is_some();
    let value = caps.name("value").map(|m| m.as_str().trim().to_string());
    if let Some(name2) = caps.name("name2") {
        return Some(Effect::ConfigPatch {
            section: name,
            name: name2.as_str().to_string(),
            value: value.unwrap_or_default(),
        });
    }
    if bang {
        Some(Effect::Attribute { name, value: None })
    } else {
        Some(Effect::Attribute {
            name,
            value: Some(value.unwrap_or_default()),
        })
    }
}

/// Applies a parsed attribute entry against `doc`, honoring the "command-line wins" rule via
/// `locked` (names set on the command line).
pub fn apply(effect: Effect, doc: &mut Document, locked: &std::collections::HashSet<String>) -> Result<()> {
    match effect {
        Effect::Attribute { name, value } => {
            if locked.contains(&name) {
                return Ok(());
            }
            match value {
                Some(v) => doc.attributes.set(name, v),
                None => doc.attributes.unset(&name),
            }
            Ok(())
        }
        Effect::ConfigPatch { .. } => {
            // Runtime config-section patches require a mutable ConfigStore the driver holds, not
            // the Document; the driver applies this variant itself and calls `store.rebuild()`.
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Doctype, Document};

    #[test]
    fn parses_plain_set() {
        let effect = parse(":author: Jane Doe").unwrap();
        match effect {
            Effect::Attribute { name, value } => {
                assert_eq!(name, "author");
                assert_eq!(value.as_deref(), Some("Jane Doe"));
            }
            _ => panic!("expected Attribute"),
        }
    }

    #[test]
    fn parses_undefine() {
        let effect = parse(":numbered!:").unwrap();
        match effect {
            Effect::Attribute { name, value } => {
                assert_eq!(name, "numbered");
                assert_eq!(value, None);
            }
            _ => panic!("expected Attribute"),
        }
    }

    #[test]
    fn parses_config_patch() {
        let effect = parse(":strong.tags: <b>|</b>").unwrap();
        match effect {
            Effect::ConfigPatch { section, name, value } => {
                assert_eq!(section, "strong");
                assert_eq!(name, "tags");
                assert_eq!(value, "<b>|</b>");
            }
            _ => panic!("expected ConfigPatch"),
        }
    }

    #[test]
    fn locked_attribute_is_not_overridden() {
        let mut doc = Document::new(Doctype::Article, "html", false);
        doc.attributes.set("author", "cli-value");
        let mut locked = std::collections::HashSet::new();
        locked.insert("author".to_string());
        apply(
            Effect::Attribute {
                name: "author".to_string(),
                value: Some("doc-value".to_string()),
            },
            &mut doc,
            &locked,
        )
        .unwrap();
        assert_eq!(doc.attributes.get("author"), Some("cli-value"));
    }
}
