//! Table recognition and translation (§4.6.8): the principal PSV/CSV/DSV dialect. The legacy
//! ruler-based "old" table is omitted (§9 "may be omitted") — its recognizer slot is the no-op
//! already documented in `recognizers::mod::identify`.

use once_cell::sync::Lazy;

use crate::attrs::AttrList;
use crate::config::blockdefs::{TableDef, TableFormat};
use crate::config::ConfigStore;
use crate::error::Result;
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::reader::Reader;
use crate::subst::{self, PassthroughStash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub enum Width {
    Proportional(u32),
    Percent(u32),
}

#[derive(Debug, Clone)]
pub struct Column {
    pub align: Align,
    pub width: Option<Width>,
    pub style: Option<String>,
}

/// Parses a `cols=` value: either a bare integer (that many equal columns) or a comma list of
/// `[count*][align][width][style]` specs (§4.6.8). Mixing percent and proportional widths across
/// columns is an error.
pub fn parse_cols(spec: &str) -> Result<Vec<Column>> {
    if let Ok(n) = spec.trim().parse::<usize>() {
        return Ok((0..n)
            .map(|_| Column {
                align: Align::Left,
                width: None,
                style: None,
            })
            .collect());
    }
    let mut columns = Vec::new();
    let mut saw_percent = false;
    let mut saw_proportional = false;
    for raw in spec.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (count, rest) = match raw.split_once('*') {
            Some((n, rest)) if n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty() => {
                (n.parse::<usize>().unwrap_or(1), rest)
            }
            _ => (1, raw),
        };
        let mut chars = rest.chars().peekable();
        let align = match chars.peek() {
            Some('<') => {
                chars.next();
                Align::Left
            }
            Some('^') => {
                chars.next();
                Align::Center
            }
            Some('>') => {
                chars.next();
                Align::Right
            }
            _ => Align::Left,
        };
        let remainder: String = chars.collect();
        let digits: String = remainder.chars().take_while(|c| c.is_ascii_digit()).collect();
        let after_digits = &remainder[digits.len()..];
        let width = if digits.is_empty() {
            None
        } else if let Some(stripped) = after_digits.strip_prefix('%') {
            let _ = stripped;
            saw_percent = true;
            Some(Width::Percent(digits.parse().unwrap_or(0)))
        } else {
            saw_proportional = true;
            Some(Width::Proportional(digits.parse().unwrap_or(0)))
        };
        let style_str = if digits.is_empty() {
            after_digits.to_string()
        } else if after_digits.starts_with('%') {
            after_digits[1..].to_string()
        } else {
            after_digits.to_string()
        };
        let style = if style_str.is_empty() { None } else { Some(style_str) };
        for _ in 0..count {
            columns.push(Column {
                align,
                width,
                style: style.clone(),
            });
        }
    }
    if saw_percent && saw_proportional {
        return Err(crate::error::MarkupError::Config(
            "cols=: cannot mix percent and proportional widths".to_string(),
        ));
    }
    Ok(columns)
}

static CELLCOUNT_PREFIX: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^(?P<cellcount>\d+)\*(?P<rest>.*)$").unwrap());

fn push_repeated(cells: &mut Vec<String>, cell: String, count: usize) {
    for _ in 0..count.max(1) {
        cells.push(cell.clone());
    }
}

/// A `N*` multiplier with no separator following it (the common case: the last cell on a row, as
/// in `| c | 2*d`) is written directly on the cell's own text rather than on a separator match.
fn strip_cellcount_prefix(cell: String, inherited: usize) -> (String, usize) {
    if inherited > 1 {
        return (cell, inherited);
    }
    match CELLCOUNT_PREFIX.captures(cell.trim_start()) {
        Some(caps) => {
            let count: usize = caps.name("cellcount").unwrap().as_str().parse().unwrap_or(1);
            (caps.name("rest").unwrap().as_str().to_string(), count.max(1))
        }
        None => (cell, inherited),
    }
}

/// Splits one row on `separator`, honoring `\`-escaped separators. The `N*` cell-count multiplier
/// (`cellcount` capture in `separator`) expands into that many repeated cells: when it precedes a
/// separator match it governs the cell that follows (`asciidoc.py`'s `parse_psv_dsv`); when it has
/// no following separator it is read straight off the trailing cell's own text.
fn split_psv_dsv(raw: &str, separator: &regex::Regex) -> Vec<String> {
    let mut cells = Vec::new();
    let mut last = 0;
    let mut cellcount: usize = 1;
    let chars: Vec<char> = raw.chars().collect();
    for caps in separator.captures_iter(raw) {
        let m = caps.get(0).unwrap();
        if m.start() > 0 && chars.get(m.start().saturating_sub(1)) == Some(&'\\') {
            continue;
        }
        let cell = raw[last..m.start()].replace('\\', "");
        push_repeated(&mut cells, cell, cellcount);
        cellcount = caps
            .name("cellcount")
            .and_then(|c| c.as_str().parse::<usize>().ok())
            .unwrap_or(1);
        last = m.end();
    }
    let (tail, tail_count) = strip_cellcount_prefix(raw[last..].replace('\\', ""), cellcount);
    push_repeated(&mut cells, tail, tail_count);
    cells
}

fn split_csv(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator).map(|s| s.trim().to_string()).collect()
}

fn split_row(raw: &str, def: &TableDef, separator_re: &regex::Regex) -> Vec<String> {
    match def.format {
        TableFormat::Csv => split_csv(raw, def.separator.chars().next().unwrap_or(',')),
        TableFormat::Psv | TableFormat::Dsv => {
            let mut cells = split_psv_dsv(raw, separator_re);
            if def.format == TableFormat::Psv && cells.first().map(|c| c.is_empty()) == Some(true) {
                cells.remove(0);
            }
            cells
        }
    }
}

fn render_cell(
    text: &str,
    column: &Column,
    tags: &crate::config::blockdefs::TableTags,
    is_head: bool,
    is_foot: bool,
    store: &ConfigStore,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<String> {
    let data_tags = if is_head {
        tags.headdata_or_body()
    } else if is_foot {
        tags.footdata_or_body()
    } else {
        tags.bodydata.as_ref()
    };
    let (start, end) = data_tags.cloned().unwrap_or_default();

    let mut stash = PassthroughStash::new();
    let mut callouts = Vec::new();
    let mut rendered = subst::apply_subs(
        text.trim(),
        &crate::config::subs::SubsPass::default_normal(),
        store,
        resolver,
        ops,
        &mut stash,
        &mut callouts,
    )?;
    if let Some(style) = &column.style {
        if let Some(filtered) = store.paragraphs.get(style).and_then(|p| p.filter.clone()) {
            rendered = ops.run_filter(&filtered, &rendered)?;
        }
    }
    rendered = stash.restore(&rendered);

    if !is_head {
        if let Some((pstart, pend)) = &tags.paragraph {
            rendered = rendered
                .split("\n\n")
                .map(|para| format!("{}{}{}", pstart, para, pend))
                .collect::<Vec<_>>()
                .join("");
        }
    }
    Ok(format!("{}{}{}", start, rendered, end))
}

fn render_row(
    cells: &[String],
    columns: &[Column],
    tags: &crate::config::blockdefs::TableTags,
    is_head: bool,
    is_foot: bool,
    store: &ConfigStore,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<String> {
    let row_tags = if is_head {
        tags.headrow_or_body()
    } else if is_foot {
        tags.footrow_or_body()
    } else {
        tags.bodyrow.as_ref()
    };
    let (row_start, row_end) = row_tags.cloned().unwrap_or_default();
    let mut out = String::new();
    out.push_str(&row_start);
    for (idx, cell) in cells.iter().enumerate() {
        let default_column = Column {
            align: Align::Left,
            width: None,
            style: None,
        };
        let column = columns.get(idx).unwrap_or(&default_column);
        out.push_str(&render_cell(cell, column, tags, is_head, is_foot, store, resolver, ops)?);
    }
    out.push_str(&row_end);
    Ok(out)
}

/// Reads and renders a table whose opening delimiter has already been consumed. `attrs` is the
/// preceding `[cols=..., options=...]` attribute list, if any.
pub fn translate(
    def: &TableDef,
    attrs: Option<&AttrList>,
    store: &ConfigStore,
    reader: &mut Reader,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<String> {
    let body_lines = reader.read_until(&def.delimiter, true, resolver, ops)?;
    reader.read(resolver, ops)?; // consume the closing delimiter

    let separator_re = regex::Regex::new(&def.separator)
        .map_err(|e| crate::error::MarkupError::Config(format!("bad table separator '{}': {}", def.separator, e)))?;

    let raw_text: String = body_lines.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join("\n");
    let mut rows: Vec<Vec<String>> = Vec::new();
    match def.format {
        TableFormat::Dsv => {
            for line in raw_text.split('\n') {
                if line.trim().is_empty() {
                    continue;
                }
                rows.push(split_row(line, def, &separator_re));
            }
        }
        _ => {
            for line in raw_text.split('\n') {
                if line.trim().is_empty() {
                    continue;
                }
                rows.push(split_row(line, def, &separator_re));
            }
        }
    }

    let cols_spec = attrs.and_then(|a| a.get("cols")).map(|s| s.to_string());
    let columns = match cols_spec {
        Some(spec) => parse_cols(&spec)?,
        None => {
            let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
            (0..width)
                .map(|_| Column {
                    align: Align::Left,
                    width: None,
                    style: None,
                })
                .collect()
        }
    };

    let options = attrs.and_then(|a| a.get("options")).unwrap_or("");
    let has_header = options.split(',').any(|o| o.trim() == "header");
    let has_footer = options.split(',').any(|o| o.trim() == "footer");

    let tags = store.tabletags.get(&def.tags).cloned().unwrap_or_default();

    let mut head_rendered = String::new();
    let mut foot_rendered = String::new();
    let mut body_rendered = String::new();
    for (idx, row) in rows.iter().enumerate() {
        let is_head = has_header && idx == 0;
        let is_foot = has_footer && idx == rows.len() - 1;
        let rendered = render_row(row, &columns, &tags, is_head, is_foot, store, resolver, ops)?;
        if is_head {
            head_rendered.push_str(&rendered);
        } else if is_foot {
            foot_rendered.push_str(&rendered);
        } else {
            body_rendered.push_str(&rendered);
        }
    }

    // The overall table wrapper is a single fixed `[table]` template carrying the
    // `\theadrows\t`/`\tfootrows\t`/`\tbodyrows\t` sentinels (§4.6.8); per-definition templates
    // are not needed since the row/cell shape already comes from `tabletags-<tags>`.
    let template = store.templates.get("table").cloned().unwrap_or_default();
    let mut assembled = format!("{}{}", template.start_text(), template.end_text());
    assembled = assembled.replace("\theadrows\t", &head_rendered);
    assembled = assembled.replace("\tfootrows\t", &foot_rendered);
    assembled = assembled.replace("\tbodyrows\t", &body_rendered);
    Ok(assembled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cols_accepts_bare_integer() {
        let cols = parse_cols("3").unwrap();
        assert_eq!(cols.len(), 3);
    }

    #[test]
    fn parse_cols_accepts_align_width_style_list() {
        let cols = parse_cols("1*<20%a,^m").unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].align, Align::Left);
        assert!(matches!(cols[0].width, Some(Width::Percent(20))));
        assert_eq!(cols[0].style.as_deref(), Some("a"));
        assert_eq!(cols[1].align, Align::Center);
        assert_eq!(cols[1].style.as_deref(), Some("m"));
    }

    #[test]
    fn parse_cols_rejects_mixed_width_units() {
        let err = parse_cols("10%,5").unwrap_err();
        assert!(matches!(err, crate::error::MarkupError::Config(_)));
    }

    #[test]
    fn split_psv_drops_leading_empty_cell() {
        let def_separator = regex::Regex::new(r"\|").unwrap();
        let lines = vec!["|a|b|c".to_string()];
        let def = TableDef {
            name: "t".to_string(),
            delimiter: regex::Regex::new(r"^\|===$").unwrap(),
            format: TableFormat::Psv,
            separator: r"\|".to_string(),
            tags: "default".to_string(),
        };
        let cells = split_row(&lines[0], &def, &def_separator);
        assert_eq!(cells, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn split_psv_expands_trailing_cellcount_multiplier() {
        let def_separator = regex::Regex::new(r"((?P<cellcount>\d+)\*)?\|").unwrap();
        let def = TableDef {
            name: "t".to_string(),
            delimiter: regex::Regex::new(r"^\|===$").unwrap(),
            format: TableFormat::Psv,
            separator: r"((?P<cellcount>\d+)\*)?\|".to_string(),
            tags: "default".to_string(),
        };
        let cells = split_row("| c | 2*d", &def, &def_separator);
        assert_eq!(cells, vec![" c ".to_string(), "d".to_string(), "d".to_string()]);
    }
}
