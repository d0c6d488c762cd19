//! List recognition and translation (§4.6.6): bulleted, numbered, labeled and callout lists.
//! A line consisting only of `+` attaches the following paragraph to the preceding item as a
//! continuation; any other non-blank, non-marker line is treated as wrapped item text. Simplified
//! relative to the original's multi-paragraph list items: one paragraph of continuation per `+`.

use crate::callouts::CalloutMap;
use crate::config::blockdefs::{ListDef, ListType};
use crate::config::ConfigStore;
use crate::document::Document;
use crate::error::{Cursor, Diagnostic, Result};
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::reader::Reader;
use crate::subst::{self, PassthroughStash};

struct Item {
    label: Option<String>,
    text: String,
    index: Option<usize>,
}

fn parse_marker(line: &str, def: &ListDef) -> Option<Item> {
    let caps = def.delimiter.captures(line)?;
    let text = caps.name("text").map(|m| m.as_str().to_string()).unwrap_or_default();
    let label = caps.name("label").map(|m| m.as_str().to_string());
    let index = caps.name("index").and_then(|m| m.as_str().parse::<usize>().ok());
    Some(Item { label, text, index })
}

/// Reads the lines belonging to the item that starts at `first_text`: plain lines and `+`
/// continuation markers up to (not including) the next item marker or a blank line. Uses
/// `Reader::read_next` to peek before committing to consume a line.
fn read_item_body(
    def: &ListDef,
    first_text: String,
    reader: &mut Reader,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<String> {
    let mut text = first_text;
    loop {
        let (_, line) = match reader.read_next(resolver, ops)? {
            Some(item) => item,
            None => return Ok(text),
        };
        if def.delimiter.is_match(&line) || line.trim().is_empty() {
            return Ok(text);
        }
        reader.read(resolver, ops)?;
        if line.trim() == "+" {
            continue;
        }
        text.push('\n');
        text.push_str(&line);
    }
}

/// Translates one list starting at `first_line` (already identified as matching `def`'s
/// delimiter), consuming items from `reader` until a line matches neither the delimiter nor a
/// continuation, and rendering via `store.listtags`.
pub fn translate(
    first_line: &str,
    def: &ListDef,
    store: &ConfigStore,
    reader: &mut Reader,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
    doc: &mut Document,
    diag_cursor: &Cursor,
    callouts: &mut CalloutMap,
) -> Result<String> {
    let tags = store.listtags.get(&def.tags).cloned().unwrap_or_default();
    let mut items: Vec<Item> = Vec::new();
    let mut pending_line = Some(first_line.to_string());

    loop {
        let line = match pending_line.take() {
            Some(l) => l,
            None => match reader.read_next(resolver, ops)? {
                Some((_, l)) if def.delimiter.is_match(&l) => {
                    reader.read(resolver, ops)?;
                    l
                }
                _ => break,
            },
        };
        let marker = match parse_marker(&line, def) {
            Some(m) => m,
            None => break,
        };
        let text = read_item_body(def, marker.text, reader, resolver, ops)?;
        items.push(Item {
            label: marker.label,
            text,
            index: marker.index,
        });
        reader.skip_blank_lines(resolver, ops)?;
    }

    if matches!(def.list_type, ListType::Numbered | ListType::Callout) {
        for (pos, item) in items.iter().enumerate() {
            if let Some(idx) = item.index {
                if idx != pos + 1 {
                    doc.record(Diagnostic::warning(
                        Some(diag_cursor.clone()),
                        format!("list item {} out of sequence (expected {}, got {})", pos + 1, pos + 1, idx),
                    ));
                }
            }
        }
    }

    let mut out = String::new();
    out.push_str(&tags.list.0);
    for (idx, item) in items.iter().enumerate() {
        let mut stash = PassthroughStash::new();
        let mut marks = Vec::new();
        let rendered_text = subst::apply_subs(&item.text, &def.presubs, store, resolver, ops, &mut stash, &mut marks)?;
        let rendered_text = stash.restore(&rendered_text);

        out.push_str(&tags.entry.0);
        if def.list_type == ListType::Labeled {
            if let Some(label) = &item.label {
                out.push_str(&tags.term.0);
                out.push_str(label);
                out.push_str(&tags.term.1);
            }
        }
        out.push_str(&tags.item.0);
        out.push_str(&tags.text.0);
        out.push_str(&rendered_text);
        out.push_str(&tags.text.1);
        if def.list_type == ListType::Callout {
            callouts.bind_item(idx + 1, callouts.observed().to_vec());
        }
        out.push_str(&tags.item.1);
        out.push_str(&tags.entry.1);
    }
    out.push_str(&tags.list.1);

    if def.list_type == ListType::Callout {
        callouts.close_list();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entries::parse_section;
    use std::rc::Rc;

    struct NoAttrs;
    impl NameResolver for NoAttrs {
        fn resolve(&self, _name: &str) -> Option<String> {
            None
        }
    }
    struct NoOps;
    impl SystemOps for NoOps {
        fn safe_mode(&self) -> bool {
            true
        }
        fn run_sys(&mut self, _cmd: &str, _capture_stderr: bool) -> Result<String> {
            Ok(String::new())
        }
        fn include(&mut self, _path: &str) -> Result<String> {
            Ok(String::new())
        }
        fn include1(&self, _path: &str) -> Option<String> {
            None
        }
        fn run_filter(&mut self, _cmd: &str, input: &str) -> Result<String> {
            Ok(input.to_string())
        }
    }

    fn bulleted_def() -> ListDef {
        let lines = vec![
            "delimiter=^-\\s+(?P<text>.*)$".to_string(),
            "type=bulleted".to_string(),
            "tags=bulleted".to_string(),
        ];
        let entries = parse_section(&lines);
        let normal = crate::config::subs::SubsPass::default_normal();
        let verbatim = crate::config::subs::SubsPass::default_verbatim();
        ListDef::from_entries("bulleted", &entries, &normal, &verbatim).unwrap()
    }

    fn bulleted_tags(store: &mut ConfigStore) {
        let tags_lines = vec![
            "list=<ul>|</ul>".to_string(),
            "entry=<li>|</li>".to_string(),
            "item=|".to_string(),
            "text=|".to_string(),
        ];
        let tags_entries = parse_section(&tags_lines);
        store
            .listtags
            .insert("bulleted".to_string(), crate::config::blockdefs::ListTags::from_entries(&tags_entries));
    }

    #[test]
    fn translates_two_item_bulleted_list() {
        let mut store = ConfigStore::new();
        bulleted_tags(&mut store);
        let def = bulleted_def();
        let mut reader = Reader::new(8);
        reader.push_text("t".to_string(), std::path::PathBuf::from("."), "- second\n".to_string(), 0);
        let mut doc = Document::new(crate::document::Doctype::Article, "html", false);
        let mut callouts = CalloutMap::new();
        let cursor = Cursor {
            file: Rc::from("t"),
            line: 1,
            text: "- first".to_string(),
        };
        let rendered = translate(
            "- first",
            &def,
            &store,
            &mut reader,
            &NoAttrs,
            &mut NoOps,
            &mut doc,
            &cursor,
            &mut callouts,
        )
        .unwrap();
        assert_eq!(rendered, "<ul><li>first</li><li>second</li></ul>");
    }
}
