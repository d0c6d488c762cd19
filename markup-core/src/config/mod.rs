//! The Configuration Store (§3, §4.3): an ordered mapping from section name to raw lines, plus the
//! parsed sub-tables every recognizer consults (`tags`, `attributes`, `specialcharacters`, `quotes`,
//! `specialwords`, `replacements`, `replacements2`, `titles`, `macros`, and the block-definition
//! families).
//!
//! Grounded on `lex-config`'s layered-loader idiom for the *cascade* shape (later files win, earlier
//! ones are defaults), but the section/entry parsing itself follows the bespoke INI-like grammar in
//! SPEC_FULL §4.3/§6 rather than `lex-config`'s TOML+serde approach — see `DESIGN.md` for why this
//! lives in `markup-core` instead of a sibling crate.

pub mod blockdefs;
pub mod cascade;
pub mod entries;
pub mod macros;
pub mod subs;
pub mod tags;
pub mod templates;
pub mod titles;
pub mod validate;

use std::collections::HashMap;

use crate::error::{MarkupError, Result};

use blockdefs::{BlockDefs, ListDefs, ListTags, ParagraphDefs, TableDefs, TableTags};
use entries::EntrySection;
use macros::MacroDef;
use subs::SubsPass;
use tags::Tags;
use templates::Template;
use titles::Titles;

/// An insertion-order-preserving string-keyed map, reused across the config tables (same pattern as
/// [`crate::document::AttributeMap`], generalized over the value type).
#[derive(Debug, Clone, Default)]
pub struct OrderedMap<V> {
    order: Vec<String>,
    values: HashMap<String, V>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        OrderedMap {
            order: Vec::new(),
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order.iter().map(move |k| (k.as_str(), &self.values[k]))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Raw section storage: section name → ordered lines, before any per-section-kind parsing.
#[derive(Debug, Clone, Default)]
pub struct RawSections(OrderedMap<Vec<String>>);

impl RawSections {
    pub fn new() -> Self {
        RawSections(OrderedMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(|v| v.as_slice())
    }

    /// Merges `lines` into section `name`. Entry sections concatenate; template sections overwrite
    /// (§4.3).
    pub fn merge(&mut self, name: &str, lines: Vec<String>, is_entry_section: bool) {
        if is_entry_section {
            if let Some(existing) = self.0.values.get_mut(name) {
                existing.extend(lines);
                return;
            }
        }
        self.0.insert(name, lines);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys()
    }
}

/// Miscellaneous typed fields promoted from `[miscellaneous]` (§4.3).
#[derive(Debug, Clone)]
pub struct Miscellaneous {
    pub tabsize: usize,
    pub pagewidth: Option<usize>,
    pub pageunits: Option<String>,
    pub outfilesuffix: String,
    pub newline: String,
    pub subsnormal: Vec<SubsPass>,
    pub subsverbatim: Vec<SubsPass>,
    pub textwidth: usize,
}

impl Default for Miscellaneous {
    fn default() -> Self {
        Miscellaneous {
            tabsize: 8,
            pagewidth: None,
            pageunits: None,
            outfilesuffix: String::new(),
            newline: "\n".to_string(),
            subsnormal: SubsPass::default_normal(),
            subsverbatim: SubsPass::default_verbatim(),
            textwidth: 70,
        }
    }
}

/// The fully parsed configuration: everything a recognizer or the attribute evaluator needs.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    pub raw: RawSections,
    pub misc: Miscellaneous,
    pub conf_attrs: Vec<(String, Option<String>)>,
    pub tags: Tags,
    /// Literal character (as a one-char key, validated in `validate::validate`) → replacement text.
    pub specialcharacters: OrderedMap<String>,
    pub specialwords: Vec<(String, Vec<String>, String)>,
    pub replacements: Vec<(String, String)>,
    pub replacements2: Vec<(String, String)>,
    pub quotes: OrderedMap<String>,
    pub titles: Titles,
    pub specialsections: OrderedMap<String>,
    pub macros: Vec<MacroDef>,
    pub templates: OrderedMap<Template>,
    pub paragraphs: ParagraphDefs,
    pub lists: ListDefs,
    pub blocks: BlockDefs,
    pub tables: TableDefs,
    pub listtags: OrderedMap<ListTags>,
    pub tabletags: OrderedMap<TableTags>,
    pub loaded_files: Vec<String>,
}

impl ConfigStore {
    pub fn new() -> Self {
        ConfigStore::default()
    }

    /// Resolves a raw entry section (`name=value` / `name!`) to a finished ordered table, applying
    /// undefine-in-place semantics.
    pub fn entries_of(&self, section: &str) -> EntrySection {
        entries::parse_section(self.raw.get(section).unwrap_or(&[]))
    }

    /// Loads one configuration file's text into this store, merging per §4.3.
    pub fn load_str(&mut self, source: &str, origin: &str) -> Result<()> {
        cascade::load_into(self, source, origin)
    }

    /// Re-derives every parsed sub-table from `self.raw`. Called once after the whole cascade has
    /// been merged, and again after a runtime `:name.section: value` patch (§4.6.1).
    pub fn rebuild(&mut self) -> Result<()> {
        cascade::rebuild_tables(self)
    }

    /// Runs the validation rules in §3/§7 against the fully rebuilt store.
    pub fn validate(&self) -> Result<()> {
        validate::validate(self)
    }
}

pub(crate) fn config_error(msg: impl Into<String>) -> MarkupError {
    MarkupError::Config(msg.into())
}
