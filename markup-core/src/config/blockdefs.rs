//! The block-definition families: `paradef-*`, `listdef-*`, `blockdef-*`, `tabledef-*`,
//! `listtags-*`, `tabletags-*` (§3). Each family is loaded by prefix match; existing definitions of
//! the same name are replaced wholesale on reload, matching how every other entry-section table in
//! this module is rebuilt from scratch each time `ConfigStore::rebuild` runs (§4.3).
//!
//! A definition's `styles` sub-dictionaries are encoded as `styles.<style-name>.<field>=value`
//! entries within the same section — a single flat entry table rather than a second section per
//! style, which keeps one `paradef-*`/`blockdef-*`/etc. definition fully self-contained in one
//! cascaded section (§3 "each style is a sub-dictionary of the same keys").

use std::collections::HashSet;

use regex::Regex;

use crate::error::Result;

use super::config_error;
use super::entries::EntrySection;
use super::subs::{parse_subs, SubsPass};
use super::OrderedMap;

fn compile(pat: &str) -> Result<Regex> {
    Regex::new(pat).map_err(|e| config_error(format!("bad regex '{}': {}", pat, e)))
}

/// Fields shared by every block-like definition family.
#[derive(Debug, Clone, Default)]
pub struct StyleOverride {
    pub template: Option<String>,
    pub presubs: Option<Vec<SubsPass>>,
    pub postsubs: Option<Vec<SubsPass>>,
    pub subs: Option<Vec<SubsPass>>,
    pub options: Option<HashSet<String>>,
    pub filter: Option<String>,
}

fn parse_options_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Splits the flat entry table into (common fields, per-style override fields), grouped by style
/// name, preserving the `styles.<name>.` prefix convention described in the module docs.
struct Fields<'a> {
    common: &'a EntrySection,
}

impl<'a> Fields<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.common.0.get(key).map(|s| s.as_str())
    }

    fn style_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for key in self.common.0.keys() {
            if let Some(rest) = key.strip_prefix("styles.") {
                if let Some((name, _)) = rest.split_once('.') {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names
    }

    fn style_field(&self, style: &str, field: &str) -> Option<&str> {
        self.common
            .0
            .get(&format!("styles.{}.{}", style, field))
            .map(|s| s.as_str())
    }
}

fn parse_style_override(
    fields: &Fields,
    style: &str,
    normal: &[SubsPass],
    verbatim: &[SubsPass],
) -> Result<StyleOverride> {
    let presubs = match fields.style_field(style, "presubs") {
        Some(v) => Some(parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0))?),
        None => None,
    };
    let postsubs = match fields.style_field(style, "postsubs") {
        Some(v) => Some(parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0))?),
        None => None,
    };
    let subs = match fields.style_field(style, "subs") {
        Some(v) => Some(parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0))?),
        None => None,
    };
    Ok(StyleOverride {
        template: fields.style_field(style, "template").map(|s| s.to_string()),
        presubs,
        postsubs,
        subs,
        options: fields.style_field(style, "options").map(parse_options_set),
        filter: fields.style_field(style, "filter").map(|s| s.to_string()),
    })
}

/// A paragraph definition (§3, §4.6.5): `delimiter` is the first-line regex.
#[derive(Debug, Clone)]
pub struct ParagraphDef {
    pub name: String,
    pub delimiter: Regex,
    pub template: String,
    pub presubs: Vec<SubsPass>,
    pub postsubs: Vec<SubsPass>,
    pub options: HashSet<String>,
    pub filter: Option<String>,
    pub default_style: Option<String>,
    pub styles: OrderedMap<StyleOverride>,
}

impl ParagraphDef {
    pub fn from_entries(
        name: &str,
        entries: &EntrySection,
        normal: &[SubsPass],
        verbatim: &[SubsPass],
    ) -> Result<ParagraphDef> {
        let fields = Fields { common: entries };
        let delimiter = compile(fields.get("delimiter").ok_or_else(|| {
            config_error(format!("[paradef-{}] missing 'delimiter'", name))
        })?)?;
        let template = fields
            .get("template")
            .ok_or_else(|| config_error(format!("[paradef-{}] missing 'template'", name)))?
            .to_string();
        let presubs = match fields.get("presubs") {
            Some(v) => parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0))?,
            None => normal.to_vec(),
        };
        let postsubs = fields
            .get("postsubs")
            .map(|v| parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0)))
            .transpose()?
            .unwrap_or_default();
        let options = fields.get("options").map(parse_options_set).unwrap_or_default();
        let filter = fields.get("filter").map(|s| s.to_string());
        let default_style = fields.get("style").map(|s| s.to_string());
        let mut styles = OrderedMap::new();
        for style in fields.style_names() {
            let ov = parse_style_override(&fields, &style, normal, verbatim)?;
            styles.insert(style, ov);
        }
        Ok(ParagraphDef {
            name: name.to_string(),
            delimiter,
            template,
            presubs,
            postsubs,
            options,
            filter,
            default_style,
            styles,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Bulleted,
    Numbered,
    Labeled,
    Callout,
}

impl ListType {
    pub fn parse(s: &str) -> Option<ListType> {
        match s {
            "bulleted" => Some(ListType::Bulleted),
            "numbered" => Some(ListType::Numbered),
            "labeled" => Some(ListType::Labeled),
            "callout" => Some(ListType::Callout),
            _ => None,
        }
    }
}

/// A list definition (§3, §4.6.6).
#[derive(Debug, Clone)]
pub struct ListDef {
    pub name: String,
    pub delimiter: Regex,
    pub list_type: ListType,
    pub tags: String,
    pub presubs: Vec<SubsPass>,
    pub postsubs: Vec<SubsPass>,
    pub options: HashSet<String>,
}

impl ListDef {
    pub fn from_entries(
        name: &str,
        entries: &EntrySection,
        normal: &[SubsPass],
        verbatim: &[SubsPass],
    ) -> Result<ListDef> {
        let fields = Fields { common: entries };
        let delimiter = compile(
            fields
                .get("delimiter")
                .ok_or_else(|| config_error(format!("[listdef-{}] missing 'delimiter'", name)))?,
        )?;
        let type_str = fields
            .get("type")
            .ok_or_else(|| config_error(format!("[listdef-{}] missing 'type'", name)))?;
        let list_type = ListType::parse(type_str)
            .ok_or_else(|| config_error(format!("[listdef-{}] unknown type '{}'", name, type_str)))?;
        let tags = fields
            .get("tags")
            .ok_or_else(|| config_error(format!("[listdef-{}] missing 'tags'", name)))?
            .to_string();
        let presubs = fields
            .get("presubs")
            .map(|v| parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0)))
            .transpose()?
            .unwrap_or_else(|| normal.to_vec());
        let postsubs = fields
            .get("postsubs")
            .map(|v| parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0)))
            .transpose()?
            .unwrap_or_default();
        let options = fields.get("options").map(parse_options_set).unwrap_or_default();
        Ok(ListDef {
            name: name.to_string(),
            delimiter,
            list_type,
            tags,
            presubs,
            postsubs,
            options,
        })
    }
}

/// `listtags-*` (§3): `list|entry|item|text|label|term`, each a `start|end` template name.
#[derive(Debug, Clone, Default)]
pub struct ListTags {
    pub list: (String, String),
    pub entry: (String, String),
    pub item: (String, String),
    pub text: (String, String),
    pub label: (String, String),
    pub term: (String, String),
}

fn split_pair(v: &str) -> (String, String) {
    match v.split_once('|') {
        Some((a, b)) => (a.to_string(), b.to_string()),
        None => (v.to_string(), String::new()),
    }
}

impl ListTags {
    pub fn from_entries(entries: &EntrySection) -> ListTags {
        let g = |k: &str| entries.0.get(k).map(|v| split_pair(v)).unwrap_or_default();
        ListTags {
            list: g("list"),
            entry: g("entry"),
            item: g("item"),
            text: g("text"),
            label: g("label"),
            term: g("term"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Psv,
    Csv,
    Dsv,
}

impl TableFormat {
    pub fn parse(s: &str) -> Option<TableFormat> {
        match s {
            "psv" => Some(TableFormat::Psv),
            "csv" => Some(TableFormat::Csv),
            "dsv" => Some(TableFormat::Dsv),
            _ => None,
        }
    }

    pub fn default_separator(self) -> &'static str {
        match self {
            TableFormat::Psv => r"((?P<cellcount>\d+)\*)?\|",
            TableFormat::Csv => ",",
            TableFormat::Dsv => r":|\n",
        }
    }
}

/// A table definition (§3, §4.6.8).
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub delimiter: Regex,
    pub format: TableFormat,
    pub separator: String,
    pub tags: String,
}

impl TableDef {
    pub fn from_entries(name: &str, entries: &EntrySection) -> Result<TableDef> {
        let fields = Fields { common: entries };
        let delimiter = compile(
            fields
                .get("delimiter")
                .ok_or_else(|| config_error(format!("[tabledef-{}] missing 'delimiter'", name)))?,
        )?;
        let format_str = fields
            .get("format")
            .ok_or_else(|| config_error(format!("[tabledef-{}] missing 'format'", name)))?;
        let format = TableFormat::parse(format_str)
            .ok_or_else(|| config_error(format!("[tabledef-{}] unknown format '{}'", name, format_str)))?;
        let separator = fields
            .get("separator")
            .map(|s| s.to_string())
            .unwrap_or_else(|| format.default_separator().to_string());
        let tags = fields
            .get("tags")
            .ok_or_else(|| config_error(format!("[tabledef-{}] missing 'tags'", name)))?
            .to_string();
        Ok(TableDef {
            name: name.to_string(),
            delimiter,
            format,
            separator,
            tags,
        })
    }
}

/// `tabletags-*` (§3): `colspec|headrow|footrow|bodyrow|headdata|footdata|bodydata|paragraph`.
/// Missing `headrow`/`footrow`/`headdata`/`footdata` inherit from body (validated separately).
#[derive(Debug, Clone, Default)]
pub struct TableTags {
    pub colspec: Option<(String, String)>,
    pub headrow: Option<(String, String)>,
    pub footrow: Option<(String, String)>,
    pub bodyrow: Option<(String, String)>,
    pub headdata: Option<(String, String)>,
    pub footdata: Option<(String, String)>,
    pub bodydata: Option<(String, String)>,
    pub paragraph: Option<(String, String)>,
}

impl TableTags {
    pub fn from_entries(entries: &EntrySection) -> TableTags {
        let g = |k: &str| entries.0.get(k).map(|v| split_pair(v));
        TableTags {
            colspec: g("colspec"),
            headrow: g("headrow"),
            footrow: g("footrow"),
            bodyrow: g("bodyrow"),
            headdata: g("headdata"),
            footdata: g("footdata"),
            bodydata: g("bodydata"),
            paragraph: g("paragraph"),
        }
    }

    pub fn headrow_or_body(&self) -> Option<&(String, String)> {
        self.headrow.as_ref().or(self.bodyrow.as_ref())
    }

    pub fn footrow_or_body(&self) -> Option<&(String, String)> {
        self.footrow.as_ref().or(self.bodyrow.as_ref())
    }

    pub fn headdata_or_body(&self) -> Option<&(String, String)> {
        self.headdata.as_ref().or(self.bodydata.as_ref())
    }

    pub fn footdata_or_body(&self) -> Option<&(String, String)> {
        self.footdata.as_ref().or(self.bodydata.as_ref())
    }
}

/// `blockdef-*` (§3, §4.6.7): delimited blocks (sidebars, examples, listings, comments, ...).
#[derive(Debug, Clone)]
pub struct BlockDef {
    pub name: String,
    pub delimiter: Regex,
    pub template: String,
    pub presubs: Vec<SubsPass>,
    pub postsubs: Vec<SubsPass>,
    pub options: HashSet<String>,
    pub filter: Option<String>,
    pub posattrs: Vec<String>,
    pub default_style: Option<String>,
    pub styles: OrderedMap<StyleOverride>,
}

impl BlockDef {
    pub fn from_entries(
        name: &str,
        entries: &EntrySection,
        normal: &[SubsPass],
        verbatim: &[SubsPass],
    ) -> Result<BlockDef> {
        let fields = Fields { common: entries };
        let delimiter = compile(
            fields
                .get("delimiter")
                .ok_or_else(|| config_error(format!("[blockdef-{}] missing 'delimiter'", name)))?,
        )?;
        let options = fields.get("options").map(parse_options_set).unwrap_or_default();
        let template = fields.get("template").unwrap_or_default().to_string();
        if template.is_empty() && !options.contains("skip") {
            return Err(config_error(format!(
                "[blockdef-{}] missing 'template' (required unless options=skip)",
                name
            )));
        }
        let presubs = fields
            .get("presubs")
            .map(|v| parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0)))
            .transpose()?
            .unwrap_or_else(|| verbatim.to_vec());
        let postsubs = fields
            .get("postsubs")
            .map(|v| parse_subs(v, normal, verbatim).map_err(|e| config_error(e.0)))
            .transpose()?
            .unwrap_or_default();
        let filter = fields.get("filter").map(|s| s.to_string());
        let posattrs = fields
            .get("posattrs")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        let default_style = fields.get("style").map(|s| s.to_string());
        let mut styles = OrderedMap::new();
        for style in fields.style_names() {
            let ov = parse_style_override(&fields, &style, normal, verbatim)?;
            styles.insert(style, ov);
        }
        Ok(BlockDef {
            name: name.to_string(),
            delimiter,
            template,
            presubs,
            postsubs,
            options,
            filter,
            posattrs,
            default_style,
            styles,
        })
    }
}

macro_rules! registry {
    ($reg:ident, $item:ty) => {
        #[derive(Debug, Clone)]
        pub struct $reg(pub OrderedMap<$item>);

        impl Default for $reg {
            fn default() -> Self {
                $reg(OrderedMap::new())
            }
        }

        impl $reg {
            pub fn get(&self, name: &str) -> Option<&$item> {
                self.0.get(name)
            }

            pub fn insert(&mut self, item: $item) {
                self.0.insert(item.name.clone(), item);
            }

            pub fn iter(&self) -> impl Iterator<Item = &$item> {
                self.0.iter().map(|(_, v)| v)
            }
        }
    };
}

registry!(ParagraphDefs, ParagraphDef);
registry!(ListDefs, ListDef);
registry!(BlockDefs, BlockDef);
registry!(TableDefs, TableDef);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entries::parse_section;

    #[test]
    fn paragraph_def_parses_presubs_and_style() {
        let lines = vec![
            "delimiter=^\\s+\\S.*".to_string(),
            "template=literalparagraph".to_string(),
            "options=verbatim".to_string(),
            "styles.quote.template=quoteparagraph".to_string(),
        ];
        let entries = parse_section(&lines);
        let normal = SubsPass::default_normal();
        let verbatim = SubsPass::default_verbatim();
        let def = ParagraphDef::from_entries("literal", &entries, &normal, &verbatim).unwrap();
        assert_eq!(def.template, "literalparagraph");
        assert!(def.options.contains("verbatim"));
        assert_eq!(
            def.styles.get("quote").unwrap().template.as_deref(),
            Some("quoteparagraph")
        );
    }

    #[test]
    fn table_def_defaults_psv_separator() {
        let lines = vec![
            "delimiter=^\\|===+$".to_string(),
            "format=psv".to_string(),
            "tags=default".to_string(),
        ];
        let entries = parse_section(&lines);
        let def = TableDef::from_entries("default", &entries).unwrap();
        assert_eq!(def.separator, TableFormat::Psv.default_separator());
    }

    #[test]
    fn table_tags_inherit_from_body() {
        let lines = vec![
            "bodyrow=<row>|</row>".to_string(),
            "bodydata=<entry>|</entry>".to_string(),
        ];
        let entries = parse_section(&lines);
        let tags = TableTags::from_entries(&entries);
        assert_eq!(tags.headrow_or_body(), tags.bodyrow.as_ref());
        assert_eq!(tags.headdata_or_body(), tags.bodydata.as_ref());
    }
}
