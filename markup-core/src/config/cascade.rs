//! Raw-text section splitting and the deterministic cascade loader (§4.3): turns one
//! configuration file's text into named line-lists merged into [`super::RawSections`], and
//! rebuilds every parsed sub-table from the merged raw state.
//!
//! The actual multi-directory search order (global → application → user → input-file directory →
//! per-document siblings → `--conf-file` arguments, with a realpath set preventing double-loading)
//! is a filesystem concern that belongs to `Engine::new` (§4.8); this module only implements the
//! per-file grammar and the merge/rebuild steps that happen once a file's text is in hand.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

use super::blockdefs::{BlockDef, ListDef, ListTags, ParagraphDef, TableDef, TableTags};
use super::entries::{self, parse_section};
use super::macros;
use super::tags::Tags;
use super::templates::{expand_templates, Template};
use super::titles::Titles;
use super::{config_error, ConfigStore, OrderedMap};

static SECTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(?P<name>[^\W\d][\w-]*)\]\s*$").unwrap());

const FIXED_ENTRY_SECTIONS: &[&str] = &[
    "tags",
    "attributes",
    "miscellaneous",
    "specialcharacters",
    "specialwords",
    "macros",
    "replacements",
    "replacements2",
    "quotes",
    "titles",
    "specialsections",
];

const PREFIX_ENTRY_FAMILIES: &[&str] = &[
    "paradef-",
    "listdef-",
    "blockdef-",
    "tabledef-",
    "listtags-",
    "tabletags-",
];

fn is_entry_section(name: &str) -> bool {
    FIXED_ENTRY_SECTIONS.contains(&name)
        || PREFIX_ENTRY_FAMILIES.iter().any(|p| name.starts_with(p))
}

/// Splits `source` into `(section name, raw lines)` pairs. Column-0 `#` lines are comments and
/// dropped; `\#` unescapes to a literal leading `#` and is kept. Lines before the first `[name]`
/// header are ignored (there is no bare top-level content in this grammar).
fn split_sections(source: &str) -> Vec<(String, Vec<String>)> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for raw_line in source.lines() {
        if raw_line.starts_with('#') {
            continue;
        }
        let line = match raw_line.strip_prefix("\\#") {
            Some(rest) => format!("#{}", rest),
            None => raw_line.to_string(),
        };
        if let Some(caps) = SECTION_HEADER.captures(&line) {
            if let Some(finished) = current.take() {
                sections.push(finished);
            }
            current = Some((caps["name"].to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(finished) = current.take() {
        sections.push(finished);
    }
    sections
}

/// Loads one configuration file's text into `store`, merging per §4.3 (entry sections
/// concatenate, template sections overwrite). Does not rebuild the parsed sub-tables; callers
/// load the whole cascade and call `rebuild` once at the end.
pub fn load_into(store: &mut ConfigStore, source: &str, origin: &str) -> Result<()> {
    for (name, lines) in split_sections(source) {
        store.raw.merge(&name, lines, is_entry_section(&name));
    }
    store.loaded_files.push(origin.to_string());
    Ok(())
}

/// Flattens `[attributes]` into an ordered `(name, Option<value>)` list, preserving explicit
/// undefines (`name!`) as `None` rather than dropping them — downstream attribute overlay (§4.3,
/// §4.7) needs to know an attribute should be *cleared*, not merely that the entry table has
/// nothing to say about it.
fn parse_attr_entries(lines: &[String]) -> Vec<(String, Option<String>)> {
    let mut order: Vec<String> = Vec::new();
    let mut map: HashMap<String, Option<String>> = HashMap::new();
    for line in lines {
        if let Some(entry) = entries::parse_entry(line) {
            if !map.contains_key(&entry.name) {
                order.push(entry.name.clone());
            }
            map.insert(entry.name, entry.value);
        }
    }
    order
        .into_iter()
        .map(|name| {
            let value = map.remove(&name).unwrap();
            (name, value)
        })
        .collect()
}

/// Extracts the quoted words from a `[specialwords]` value: `"word1" "word2" ...`.
fn parse_quoted_words(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '"' {
            let mut word = String::new();
            for c2 in chars.by_ref() {
                if c2 == '"' {
                    break;
                }
                word.push(c2);
            }
            words.push(word);
        }
    }
    words
}

/// Re-derives every parsed sub-table from `store.raw`. Idempotent: calling it twice with
/// unchanged raw state yields identical tables, which is what makes the runtime `:name.section:
/// value` patch (§4.6.1) safe to implement as "mutate raw, rebuild".
pub fn rebuild_tables(store: &mut ConfigStore) -> Result<()> {
    expand_template_macros(store);

    if let Some(lines) = store.raw.get("miscellaneous").map(|v| v.to_vec()) {
        let misc_entries = parse_section(&lines);
        let get = |k: &str| misc_entries.0.get(k).map(|s| s.as_str());
        if let Some(v) = get("tabsize") {
            store.misc.tabsize = v.parse().unwrap_or(store.misc.tabsize);
        }
        if let Some(v) = get("pagewidth") {
            store.misc.pagewidth = v.parse().ok();
        }
        if let Some(v) = get("pageunits") {
            store.misc.pageunits = Some(v.to_string());
        }
        if let Some(v) = get("outfilesuffix") {
            store.misc.outfilesuffix = v.to_string();
        }
        if let Some(v) = get("newline") {
            store.misc.newline = unescape_newline(v);
        }
        if let Some(v) = get("textwidth") {
            store.misc.textwidth = v.parse().unwrap_or(store.misc.textwidth);
        }
        if let Some(v) = get("subsnormal") {
            let normal = super::subs::SubsPass::default_normal();
            let verbatim = super::subs::SubsPass::default_verbatim();
            store.misc.subsnormal = super::subs::parse_subs(v, &normal, &verbatim)
                .map_err(|e| config_error(e.0))?;
        }
        if let Some(v) = get("subsverbatim") {
            let normal = super::subs::SubsPass::default_normal();
            let verbatim = super::subs::SubsPass::default_verbatim();
            store.misc.subsverbatim = super::subs::parse_subs(v, &normal, &verbatim)
                .map_err(|e| config_error(e.0))?;
        }
    }

    store.conf_attrs = store
        .raw
        .get("attributes")
        .map(|lines| parse_attr_entries(lines))
        .unwrap_or_default();

    store.tags = Tags::from_entries(&store.entries_of("tags"))?;

    let mut specialcharacters = OrderedMap::new();
    for (k, v) in store.entries_of("specialcharacters").0.iter() {
        specialcharacters.insert(k, v.clone());
    }
    store.specialcharacters = specialcharacters;

    store.specialwords = store
        .entries_of("specialwords")
        .0
        .iter()
        .map(|(name, value)| (name.to_string(), parse_quoted_words(value), name.to_string()))
        .collect();

    store.replacements = store
        .entries_of("replacements")
        .0
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    store.replacements2 = store
        .entries_of("replacements2")
        .0
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    let mut quotes = OrderedMap::new();
    for (k, v) in store.entries_of("quotes").0.iter() {
        quotes.insert(k, v.clone());
    }
    store.quotes = quotes;

    store.titles = Titles::from_entries(&store.entries_of("titles"))?;

    let mut specialsections = OrderedMap::new();
    for (k, v) in store.entries_of("specialsections").0.iter() {
        specialsections.insert(k, v.clone());
    }
    store.specialsections = specialsections;

    store.macros = macros::parse_macros(&store.entries_of("macros"))?;

    let mut templates = OrderedMap::new();
    let section_names: Vec<String> = store.raw.names().map(|s| s.to_string()).collect();
    for name in &section_names {
        if !is_entry_section(name) {
            let lines = store.raw.get(name).unwrap_or(&[]);
            templates.insert(name.clone(), Template::from_lines(lines));
        }
    }
    store.templates = templates;

    let normal = store.misc.subsnormal.clone();
    let verbatim = store.misc.subsverbatim.clone();

    let mut paragraphs = super::blockdefs::ParagraphDefs::default();
    let mut lists = super::blockdefs::ListDefs::default();
    let mut blocks = super::blockdefs::BlockDefs::default();
    let mut tables = super::blockdefs::TableDefs::default();
    let mut listtags: OrderedMap<ListTags> = OrderedMap::new();
    let mut tabletags: OrderedMap<TableTags> = OrderedMap::new();

    for name in &section_names {
        if let Some(suffix) = name.strip_prefix("paradef-") {
            let entries = store.entries_of(name);
            paragraphs.insert(ParagraphDef::from_entries(suffix, &entries, &normal, &verbatim)?);
        } else if let Some(suffix) = name.strip_prefix("listdef-") {
            let entries = store.entries_of(name);
            lists.insert(ListDef::from_entries(suffix, &entries, &normal, &verbatim)?);
        } else if let Some(suffix) = name.strip_prefix("blockdef-") {
            let entries = store.entries_of(name);
            blocks.insert(BlockDef::from_entries(suffix, &entries, &normal, &verbatim)?);
        } else if let Some(suffix) = name.strip_prefix("tabledef-") {
            let entries = store.entries_of(name);
            tables.insert(TableDef::from_entries(suffix, &entries)?);
        } else if let Some(suffix) = name.strip_prefix("listtags-") {
            let entries = store.entries_of(name);
            listtags.insert(suffix.to_string(), ListTags::from_entries(&entries));
        } else if let Some(suffix) = name.strip_prefix("tabletags-") {
            let entries = store.entries_of(name);
            tabletags.insert(suffix.to_string(), TableTags::from_entries(&entries));
        }
    }

    store.paragraphs = paragraphs;
    store.lists = lists;
    store.blocks = blocks;
    store.tables = tables;
    store.listtags = listtags;
    store.tabletags = tabletags;

    Ok(())
}

/// Runs the `template::[name]` expansion pre-pass (§4.3) over every section, to a fixed point.
fn expand_template_macros(store: &mut ConfigStore) {
    let names: Vec<String> = store.raw.names().map(|s| s.to_string()).collect();
    for _ in 0..8 {
        let mut changed = false;
        for name in &names {
            let lines = match store.raw.get(name) {
                Some(l) => l.to_vec(),
                None => continue,
            };
            let raw_snapshot = store.raw.clone();
            let expanded = expand_templates(&lines, |target| {
                raw_snapshot.get(target).map(|v| v.to_vec())
            });
            if expanded != lines {
                changed = true;
                store.raw.merge(name, expanded, false);
            }
        }
        if !changed {
            break;
        }
    }
}

fn unescape_newline(v: &str) -> String {
    v.replace("\\n", "\n").replace("\\r", "\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sections_and_strips_comments() {
        let src = "# a comment\n[tags]\nstrong=<b>|</b>\n\\#notacomment=1\n[quotes]\n*=strong\n";
        let sections = split_sections(src);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "tags");
        assert_eq!(
            sections[0].1,
            vec!["strong=<b>|</b>".to_string(), "#notacomment=1".to_string()]
        );
        assert_eq!(sections[1].0, "quotes");
    }

    #[test]
    fn load_into_merges_entry_sections_and_overwrites_templates() {
        let mut store = ConfigStore::new();
        load_into(&mut store, "[tags]\na=1|2\n[simpara]\n<p>\n|</p>\n", "first").unwrap();
        load_into(&mut store, "[tags]\nb=3|4\n[simpara]\n<para>\n|</para>\n", "second").unwrap();
        assert_eq!(
            store.raw.get("tags"),
            Some(&vec!["a=1|2".to_string(), "b=3|4".to_string()][..])
        );
        assert_eq!(
            store.raw.get("simpara"),
            Some(&vec!["<para>".to_string(), "|</para>".to_string()][..])
        );
    }

    #[test]
    fn rebuild_populates_tags_and_templates() {
        let mut store = ConfigStore::new();
        load_into(
            &mut store,
            "[tags]\nstrong=<b>|</b>\n[simpara]\n<simpara>\n|</simpara>\n",
            "test",
        )
        .unwrap();
        rebuild_tables(&mut store).unwrap();
        assert_eq!(
            store.tags.get("strong"),
            Some(&("<b>".to_string(), "</b>".to_string()))
        );
        let tpl = store.templates.get("simpara").unwrap();
        assert_eq!(tpl.start, vec!["<simpara>".to_string()]);
        assert_eq!(tpl.end, vec!["</simpara>".to_string()]);
    }

    #[test]
    fn rebuild_populates_blockdefs_and_listtags() {
        let mut store = ConfigStore::new();
        load_into(
            &mut store,
            "[blockdef-sidebar]\ndelimiter=^\\*\\*\\*\\*$\ntemplate=sidebar\n\
             [listdef-bulleted]\ndelimiter=^\\s*-\\s+(?P<text>.*)$\ntype=bulleted\ntags=bulleted\n\
             [listtags-bulleted]\nlist=<ul>|</ul>\nitem=<li>|</li>\n",
            "test",
        )
        .unwrap();
        rebuild_tables(&mut store).unwrap();
        assert!(store.blocks.get("sidebar").is_some());
        assert!(store.lists.get("bulleted").is_some());
        assert_eq!(
            store.listtags.get("bulleted").unwrap().list,
            ("<ul>".to_string(), "</ul>".to_string())
        );
    }
}
