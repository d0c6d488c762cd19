//! Block Recognizers (§4.6): a fixed-priority sum type identifying what comes next in the input,
//! plus a `translate` action per kind. Expressed as a closed `enum Block` rather than a trait object
//! per §9's redesign note — invalid nesting (e.g. a table row outside a table) is then a type a
//! recognizer's `translate` simply never constructs, rather than a runtime state machine error.

pub mod attribute_entry;
pub mod attribute_list;
pub mod block_title;
pub mod delimited_block;
pub mod list;
pub mod paragraph;
pub mod table;
pub mod title;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::macros::MacroKind;
use crate::config::ConfigStore;

/// What the lexer found at the current read position (§4.6), before any of it has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    AttributeEntry,
    AttributeList,
    BlockTitle,
    Title,
    BlockMacro(String),
    List(String),
    DelimitedBlock(String),
    Table(String),
    /// No paragraph definition's first-line pattern matched; translated by the default paragraph
    /// rule (read to the next blank line, wrap in `[specialsections]`-less plain tags).
    DefaultParagraph,
    Paragraph(String),
}

pub(crate) static ATTRIBUTE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^:(?P<bang>!)?(?P<name>[^.:!\s][\w-]*)(?:\.(?P<name2>[^:]+))?:(?:\s+(?P<value>.*))?\s*$").unwrap()
});

pub(crate) static ATTRIBUTE_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(?P<attrlist>[^\[\]]*)\]\s*$").unwrap());

pub(crate) static DEFAULT_BLOCKTITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.(?P<title>\S.*)$").unwrap());

/// Identifies the next element without consuming it, given the next one or two physical lines
/// (double-line titles need the underline). Checked in the fixed priority order named in §4.6.
pub fn identify(lines: &[String], store: &ConfigStore) -> Kind {
    let line = match lines.first() {
        Some(l) => l.as_str(),
        None => return Kind::DefaultParagraph,
    };

    if ATTRIBUTE_ENTRY.is_match(line) {
        return Kind::AttributeEntry;
    }
    if ATTRIBUTE_LIST.is_match(line) {
        return Kind::AttributeList;
    }
    if title::is_title(lines, store) {
        return Kind::Title;
    }
    for def in &store.macros {
        if def.kind == MacroKind::Block && def.pattern.is_match(line) {
            return Kind::BlockMacro(def.name.clone());
        }
    }
    for def in store.lists.iter() {
        if def.delimiter.is_match(line) {
            return Kind::List(def.name.clone());
        }
    }
    for def in store.blocks.iter() {
        if def.delimiter.is_match(line) {
            return Kind::DelimitedBlock(def.name.clone());
        }
    }
    // Old ruler-based table dialect: omitted per SPEC_FULL §9 Open Questions ("may be omitted").
    // This no-op slot marks where its recognizer would have been tried, ahead of the PSV/CSV/DSV
    // dialect below, had it been implemented.
    for def in store.tables.iter() {
        if def.delimiter.is_match(line) {
            return Kind::Table(def.name.clone());
        }
    }
    // Checked last, immediately before the paragraph fallback (§4.6; `asciidoc.py`'s `Lex.next()`
    // checks `BlockTitle.isnext()` only after every block-shaped candidate has refused the line): a
    // `blockdef-*` delimiter beginning with `.` (e.g. a literal block's `....`) must get first
    // refusal, or `DEFAULT_BLOCKTITLE`'s "any line starting with `.`" would swallow it.
    let blocktitle_pattern = store.titles.blocktitle.as_ref();
    let is_blocktitle = match blocktitle_pattern {
        Some(re) => re.is_match(line),
        None => DEFAULT_BLOCKTITLE.is_match(line),
    };
    if is_blocktitle {
        return Kind::BlockTitle;
    }
    for def in store.paragraphs.iter() {
        if def.delimiter.is_match(line) {
            return Kind::Paragraph(def.name.clone());
        }
    }
    Kind::DefaultParagraph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_attribute_entry() {
        let store = ConfigStore::new();
        assert_eq!(identify(&["[title]".to_string()], &store), Kind::AttributeList);
        assert_eq!(identify(&[":name: value".to_string()], &store), Kind::AttributeEntry);
    }

    #[test]
    fn recognizes_default_blocktitle() {
        let store = ConfigStore::new();
        assert_eq!(identify(&[".My title".to_string()], &store), Kind::BlockTitle);
    }

    #[test]
    fn falls_back_to_default_paragraph() {
        let store = ConfigStore::new();
        assert_eq!(identify(&["plain text".to_string()], &store), Kind::DefaultParagraph);
    }
}
