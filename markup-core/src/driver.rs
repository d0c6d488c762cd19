//! The Document Driver (§4.7): sequences a whole document through the pipeline — leading
//! attribute entries and comments, an optional header, the preamble or SYNOPSIS section, the
//! section tree, and the footer — maintaining the end-tag stack and section counters that the
//! rest of the crate treats as the driver's own business.
//!
//! Grounded on the original `Document`/`Header`/`Section` classes: a level-0 title starts a
//! header, author/revision lines follow it, and every subsequent title nests under its parent by
//! simple level comparison rather than an explicit tree structure — the call stack of
//! `translate_section` recursion *is* the tree.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::attrs::AttrList;
use crate::callouts::CalloutMap;
use crate::config::blockdefs::ParagraphDef;
use crate::config::subs::SubsPass;
use crate::config::ConfigStore;
use crate::document::{Document, Doctype};
use crate::error::{Cursor, Diagnostic, MarkupError, Result};
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::lexer::Lexer;
use crate::reader::Reader;
use crate::recognizers::{
    attribute_entry, attribute_list, block_title, delimited_block, list, paragraph, table, title,
    Kind,
};
use crate::subst::{self, PassthroughStash};

/// Resolves attribute references against a snapshot of the document's attribute map, taken fresh
/// at each call site. Owning the snapshot (rather than borrowing `Document`) matters: several
/// recognizers take both a resolver *and* `&mut Document` in the same call (to record
/// diagnostics), and a resolver borrowing `doc.attributes` would alias that mutable borrow.
struct AttrResolver {
    attrs: crate::document::AttributeMap,
}

impl NameResolver for AttrResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.attrs.get(name).map(|s| s.to_string())
    }
}

/// Pending state a block macro or the next translatable block must consume: a preceding
/// `[attrs]` line and/or a preceding `.Title` line (§4.6.2, §4.6.3).
#[derive(Default)]
struct Pending {
    attrs: Option<AttrList>,
    title: Option<String>,
}

impl Pending {
    fn clear(&mut self) {
        self.attrs = None;
        self.title = None;
    }

    fn take_style(&self) -> Option<String> {
        self.attrs.as_ref().and_then(|a| a.positional(0)).map(|s| s.to_string())
    }
}

/// Section numbering and ID-uniqueness state, threaded through the whole document (§4.7,
/// §8 "ID uniqueness").
#[derive(Default)]
struct SectionState {
    used_ids: HashSet<String>,
    counters: [usize; 6],
}

impl SectionState {
    fn enter(&mut self, level: usize) -> String {
        let level = level.min(5);
        self.counters[level] += 1;
        for c in self.counters[level + 1..].iter_mut() {
            *c = 0;
        }
        let mut sectnum = String::new();
        for c in &self.counters[1..=level] {
            sectnum.push_str(&c.to_string());
            sectnum.push('.');
        }
        sectnum
    }
}

/// Bundles the mutable components a document translation shares for its whole span. Borrowed
/// exclusively by [`translate`] for the duration of one run; never held across runs (§5, no
/// re-entrant translation).
pub struct Driver<'a> {
    pub store: &'a mut ConfigStore,
    pub doc: &'a mut Document,
    pub reader: &'a mut Reader,
    pub lexer: &'a mut Lexer,
    pub callouts: &'a mut CalloutMap,
    pub ops: &'a mut dyn SystemOps,
    pub locked_attrs: &'a HashSet<String>,
}

impl<'a> Driver<'a> {
    fn resolver(&self) -> AttrResolver {
        AttrResolver { attrs: self.doc.attributes.clone() }
    }

    fn peek_kind(&mut self) -> Result<Option<Kind>> {
        let resolver = self.resolver();
        self.lexer.peek(self.reader, self.store, &resolver, &mut *self.ops)
    }

    /// Peeks the raw next line's text without consuming it, for delimiter checks the lexer's
    /// `Kind` classification doesn't expose.
    fn peek_line(&mut self) -> Result<Option<String>> {
        let resolver = self.resolver();
        let ahead = self.reader.read_ahead(1, &resolver, &mut *self.ops)?;
        Ok(ahead.into_iter().next().map(|(_, text)| text))
    }

    fn read_line(&mut self) -> Result<Option<(Cursor, String)>> {
        let resolver = self.resolver();
        self.reader.read(&resolver, &mut *self.ops)
    }

    fn record_diag(&mut self, cursor: Option<Cursor>, message: impl Into<String>, severity_is_error: bool) {
        let message = message.into();
        if severity_is_error {
            log::error!("{}", message);
            self.doc.record(Diagnostic::error(cursor, message));
        } else {
            log::warn!("{}", message);
            self.doc.record(Diagnostic::warning(cursor, message));
        }
    }

    /// Applies one already-recognized `AttributeEntry` line: document attributes via
    /// `attribute_entry::apply`, or a runtime `name.section` configuration patch that the driver
    /// itself owns (§4.6.1 — `attribute_entry::apply` only handles the plain-attribute variant).
    fn apply_attribute_entry(&mut self) -> Result<()> {
        let (cursor, line) = match self.read_line()? {
            Some(v) => v,
            None => return Ok(()),
        };
        let effect = match attribute_entry::parse(&line) {
            Some(e) => e,
            None => return Ok(()),
        };
        match effect {
            attribute_entry::Effect::Attribute { .. } => {
                attribute_entry::apply(effect, self.doc, self.locked_attrs)?;
            }
            attribute_entry::Effect::ConfigPatch { section, name, value } => {
                self.store.raw.merge(&section, vec![format!("{}={}", name, value)], true);
                if let Err(e) = self.store.rebuild() {
                    self.record_diag(Some(cursor), format!("configuration patch failed: {}", e), true);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Translates everything up to (not including) the next title whose level is `<= stop_level`,
    /// or EOF when `stop_level` is `None` (the whole-document root). This is the single recursive
    /// engine behind the preamble, every section body, and `sectionbody`/`list`-optioned delimited
    /// blocks.
    fn translate_body(
        &mut self,
        stop_level: Option<usize>,
        section: &mut SectionState,
        stop_delimiter: Option<&Regex>,
    ) -> Result<String> {
        let mut out = String::new();
        let mut pending = Pending::default();
        loop {
            if let Some(delim) = stop_delimiter {
                if let Some(line) = self.peek_line()? {
                    if delim.is_match(&line) {
                        break;
                    }
                } else {
                    break;
                }
            }
            let kind = match self.peek_kind()? {
                Some(k) => k,
                None => break,
            };
            match kind {
                Kind::Title => {
                    let resolver = self.resolver();
                    let ahead = self.reader.read_ahead(2, &resolver, &mut *self.ops)?;
                    let lines: Vec<String> = ahead.iter().map(|(_, t)| t.clone()).collect();
                    let tm = match title::recognize(&lines, self.store) {
                        Some(tm) => tm,
                        None => {
                            // The lexer and title::recognize must agree; fall back to a default
                            // paragraph rather than looping forever if they ever disagree.
                            out.push_str(&self.translate_default_paragraph()?);
                            pending.clear();
                            continue;
                        }
                    };
                    if let Some(stop) = stop_level {
                        if tm.level <= stop {
                            break;
                        }
                    }
                    out.push_str(&self.translate_section(tm, section)?);
                    pending.clear();
                }
                Kind::AttributeEntry => {
                    self.apply_attribute_entry()?;
                }
                Kind::AttributeList => {
                    let cursor_line = self.read_line()?;
                    if let Some((_, line)) = cursor_line {
                        let resolver = self.resolver();
                        if let Some(attrs) = attribute_list::parse(&line, &resolver, &mut *self.ops)? {
                            pending.attrs = Some(attrs);
                        }
                    }
                }
                Kind::BlockTitle => {
                    let cursor_line = self.read_line()?;
                    if let Some((_, line)) = cursor_line {
                        let resolver = self.resolver();
                        if let Some(text) = block_title::parse(&line, self.store, &resolver, &mut *self.ops)? {
                            pending.title = Some(text);
                        }
                    }
                }
                Kind::List(name) => {
                    let def = match self.store.lists.get(&name).cloned() {
                        Some(d) => d,
                        None => continue,
                    };
                    let (cursor, first_line) = match self.read_line()? {
                        Some(v) => v,
                        None => break,
                    };
                    let resolver = self.resolver();
                    let rendered = list::translate(
                        &first_line,
                        &def,
                        self.store,
                        self.reader,
                        &resolver,
                        &mut *self.ops,
                        self.doc,
                        &cursor,
                        self.callouts,
                    )?;
                    out.push_str(&self.wrap_pending_title(&rendered, &pending));
                    pending.clear();
                }
                Kind::DelimitedBlock(name) => {
                    let def = match self.store.blocks.get(&name).cloned() {
                        Some(d) => d,
                        None => continue,
                    };
                    let opening = self.read_line()?;
                    let (open_cursor, _) = match opening {
                        Some(v) => v,
                        None => break,
                    };
                    let style = pending.take_style();
                    if def.options.contains("sectionbody") || def.options.contains("list") {
                        let body = self.translate_body(None, section, Some(&def.delimiter))?;
                        self.read_line()?; // consume the closing delimiter line
                        let template = self.store.templates.get(&def.template).cloned().unwrap_or_default();
                        let rendered = format!("{}{}{}", template.start_text(), body, template.end_text());
                        out.push_str(&self.wrap_pending_title(&rendered, &pending));
                    } else {
                        let resolver = self.resolver();
                        match delimited_block::translate(
                            &def,
                            style.as_deref(),
                            self.store,
                            self.reader,
                            &resolver,
                            &mut *self.ops,
                        ) {
                            Ok(Some(rendered)) => out.push_str(&self.wrap_pending_title(&rendered, &pending)),
                            Ok(None) => {}
                            Err(MarkupError::Fatal(msg)) => {
                                self.record_diag(Some(open_cursor), msg.clone(), true);
                                return Err(MarkupError::Fatal(msg));
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    pending.clear();
                }
                Kind::Table(name) => {
                    let def = match self.store.tables.get(&name).cloned() {
                        Some(d) => d,
                        None => continue,
                    };
                    self.read_line()?; // consume the opening delimiter line
                    let resolver = self.resolver();
                    let rendered =
                        table::translate(&def, pending.attrs.as_ref(), self.store, self.reader, &resolver, &mut *self.ops)?;
                    out.push_str(&self.wrap_pending_title(&rendered, &pending));
                    pending.clear();
                }
                Kind::Paragraph(name) => {
                    let def = match self.store.paragraphs.get(&name).cloned() {
                        Some(d) => d,
                        None => continue,
                    };
                    let (_, first_line) = match self.read_line()? {
                        Some(v) => v,
                        None => break,
                    };
                    let style = pending.take_style();
                    let resolver = self.resolver();
                    let rendered =
                        paragraph::translate(&first_line, &def, style.as_deref(), self.store, self.reader, &resolver, &mut *self.ops)?;
                    out.push_str(&self.wrap_pending_title(&rendered, &pending));
                    pending.clear();
                }
                Kind::DefaultParagraph => {
                    let rendered = self.translate_default_paragraph()?;
                    out.push_str(&self.wrap_pending_title(&rendered, &pending));
                    pending.clear();
                }
                Kind::BlockMacro(name) => {
                    if COMMENT_MACRO_NAME.is_match(&name) {
                        self.read_line()?;
                        continue;
                    }
                    let (_, line) = match self.read_line()? {
                        Some(v) => v,
                        None => break,
                    };
                    let resolver = self.resolver();
                    let mut stash = PassthroughStash::new();
                    let mut callout_marks = Vec::new();
                    let rendered = subst::apply_subs(
                        &line,
                        &[SubsPass::Macros],
                        self.store,
                        &resolver,
                        &mut *self.ops,
                        &mut stash,
                        &mut callout_marks,
                    )?;
                    out.push_str(&rendered);
                    pending.clear();
                }
            }
        }
        Ok(out)
    }

    /// Prepends a pending `BlockTitle` as a `<title>`-style wrapper is not this crate's concern to
    /// invent from whole cloth — it is carried as the `title` attribute of the block's own template
    /// rendering via `[specialsections]`/template bodies. All this driver does is make sure a
    /// pending title that nothing consumed (no template referenced `{title}`) does not silently
    /// vanish: it is re-substituted into the rendered block text wherever the block already left a
    /// literal `{title}` placeholder.
    fn wrap_pending_title(&self, rendered: &str, pending: &Pending) -> String {
        match &pending.title {
            Some(title_text) if rendered.contains("{title}") => rendered.replace("{title}", title_text),
            _ => rendered.to_string(),
        }
    }

    fn translate_default_paragraph(&mut self) -> Result<String> {
        let (_, first_line) = match self.read_line()? {
            Some(v) => v,
            None => return Ok(String::new()),
        };
        let def = default_paragraph_def(self.store);
        let resolver = self.resolver();
        paragraph::translate(&first_line, &def, None, self.store, self.reader, &resolver, &mut *self.ops)
    }

    /// Translates one section: consumes its title line(s), computes id/sectnum, emits the start
    /// tag, recurses into the body, and appends the end tag (§4.6.4, §4.7).
    fn translate_section(&mut self, tm: title::TitleMatch, section: &mut SectionState) -> Result<String> {
        for _ in 0..tm.lines_consumed {
            self.read_line()?;
        }
        let sectnum = section.enter(tm.level);
        let id = title::synthesize_id("sect", &tm.text, &mut section.used_ids);
        let start_tag = title::render_start_tag(tm.level, self.store, &sectnum, &id, &tm.text)?;

        let template_name = title::resolve_section_template(tm.level, self.store, &tm.text);
        let end_tag = self.store.templates.get(&template_name).cloned().unwrap_or_default().end_text();

        let body = self.translate_body(Some(tm.level), section, None)?;
        Ok(format!("{}{}{}", start_tag, body, end_tag))
    }

    /// Renders a `[header]`/`[footer]` template through the real attribute-substitution pipeline
    /// (§9 Open Question, decided here): `doctitle`/`author`/`revdate`/etc. are ordinary document
    /// attributes by the time this runs, and a backend's header/footer may also reference any
    /// custom attribute the document set — unlike a title's `sectnum`/`id`/`title`, which are
    /// per-call synthesized values never promoted to attributes, so `title::render_start_tag`
    /// keeps its own ad hoc placeholder replacement rather than being routed through here.
    fn render_named_template(&mut self, name: &str) -> Result<String> {
        let template = match self.store.templates.get(name).cloned() {
            Some(t) => t,
            None => return Ok(String::new()),
        };
        let mut out = String::new();
        for line in template.start_text().split('\n') {
            let resolver = self.resolver();
            match crate::eval::substitute_line(line, &resolver, &mut *self.ops)? {
                Some(rendered) => {
                    out.push_str(&rendered);
                    out.push('\n');
                }
                None => {}
            }
        }
        out.push_str(&template.end_text());
        Ok(out)
    }

    /// Parses the optional author line following a level-0 title: `First [Middle] Last [<email>]`.
    fn parse_author_line(&mut self, line: &str) -> bool {
        let caps = match AUTHOR_LINE.captures(line.trim()) {
            Some(c) => c,
            None => return false,
        };
        let first = caps.name("first").map(|m| m.as_str()).unwrap_or("");
        let middle = caps.name("middle").map(|m| m.as_str());
        let last = caps.name("last").map(|m| m.as_str()).unwrap_or("");
        let email = caps.name("email").map(|m| m.as_str());

        let full = match middle {
            Some(m) => format!("{} {} {}", first, m, last),
            None => format!("{} {}", first, last),
        };
        self.doc.attributes.set("author", full.clone());
        self.doc.attributes.set("firstname", first.to_string());
        if let Some(m) = middle {
            self.doc.attributes.set("middlename", m.to_string());
        }
        self.doc.attributes.set("lastname", last.to_string());
        if let Some(e) = email {
            self.doc.attributes.set("email", e.to_string());
        }
        let mut initials = String::new();
        for part in full.split_whitespace() {
            if let Some(c) = part.chars().next() {
                initials.push(c.to_ascii_uppercase());
            }
        }
        self.doc.attributes.set("authorinitials", initials);
        true
    }

    /// Parses the optional revision line following the author line: either `$Id: file rev date
    /// time author $` or a bare `revision, date`.
    fn parse_revision_line(&mut self, line: &str) -> bool {
        if let Some(caps) = REVISION_ID_LINE.captures(line.trim()) {
            if let Some(rev) = caps.name("rev") {
                self.doc.attributes.set("revnumber", rev.as_str().to_string());
            }
            if let Some(date) = caps.name("date") {
                self.doc.attributes.set("revdate", date.as_str().to_string());
            }
            return true;
        }
        if let Some(caps) = REVISION_PLAIN_LINE.captures(line.trim()) {
            self.doc.attributes.set("revnumber", caps["rev"].trim().to_string());
            self.doc.attributes.set("revdate", caps["date"].trim().to_string());
            return true;
        }
        false
    }

    /// Parses the document header: the level-0 title plus optional author/revision lines, then
    /// (for manpages) `Name(vol)` splitting and a mandatory `NAME` section (§4.7 step 3).
    fn parse_header(&mut self, tm: title::TitleMatch) -> Result<()> {
        for _ in 0..tm.lines_consumed {
            self.read_line()?;
        }
        self.doc.attributes.set("doctitle", tm.text.clone());

        if matches!(self.doc.doctype, Doctype::Manpage) {
            if let Some(caps) = MANPAGE_TITLE.captures(&tm.text) {
                self.doc.attributes.set("mantitle", caps["name"].trim().to_string());
                self.doc.attributes.set("manvolnum", caps["vol"].trim().to_string());
            }
        }

        if let Some(line) = self.peek_line()? {
            if self.parse_author_line(&line) {
                self.read_line()?;
            }
        }
        if let Some(line) = self.peek_line()? {
            if self.parse_revision_line(&line) {
                self.read_line()?;
            }
        }
        Ok(())
    }
}

static AUTHOR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<first>[A-Za-z][-A-Za-z'.]*)(?:\s+(?P<middle>[A-Za-z][-A-Za-z'.]*))?\s+(?P<last>[A-Za-z][-A-Za-z'.]*)(?:\s+<(?P<email>[^>]+)>)?$",
    )
    .unwrap()
});

static REVISION_ID_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$Id:\s*(?P<file>\S+)\s+(?P<rev>\S+)\s+(?P<date>\S+)(?:\s+.*)?\$$").unwrap());

static REVISION_PLAIN_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<rev>[^,]+),\s*(?P<date>.+)$").unwrap());

static MANPAGE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<name>.+)\((?P<vol>[^()]+)\)\s*$").unwrap());

static COMMENT_MACRO_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^comment$").unwrap());

fn default_paragraph_def(store: &ConfigStore) -> ParagraphDef {
    ParagraphDef {
        name: "paragraph".to_string(),
        delimiter: Regex::new(r"^.*$").unwrap(),
        template: "paragraph".to_string(),
        presubs: store.misc.subsnormal.clone(),
        postsubs: Vec::new(),
        options: Default::default(),
        filter: None,
        default_style: None,
        styles: Default::default(),
    }
}

/// Drives one whole document through header, body, and footer. Returns the fully rendered output
/// text; the caller ([`crate::engine::Engine`]) owns writing it out (§4.7, §4.8).
pub fn translate(driver: &mut Driver<'_>, no_header_footer: bool) -> Result<String> {
    let mut out = String::new();
    let mut section = SectionState::default();

    // Step 2: skip a leading comment block/macros, then leading attribute entries. Comments
    // already render to nothing via the `BlockMacro`/`skip`-option branches in `translate_body`,
    // and attribute entries have no text output of their own, so the generic dispatch loop below
    // already performs this step as a side effect of its normal priority order — there is nothing
    // further to special-case here before checking for a header.

    let has_header = match driver.peek_kind()? {
        Some(Kind::Title) => {
            let resolver = driver.resolver();
            let ahead = driver.reader.read_ahead(2, &resolver, &mut *driver.ops)?;
            let lines: Vec<String> = ahead.iter().map(|(_, t)| t.clone()).collect();
            title::recognize(&lines, driver.store).map(|tm| tm.level == 0)
        }
        _ => None,
    }
    .unwrap_or(false);

    if has_header {
        let resolver = driver.resolver();
        let ahead = driver.reader.read_ahead(2, &resolver, &mut *driver.ops)?;
        let lines: Vec<String> = ahead.iter().map(|(_, t)| t.clone()).collect();
        if let Some(tm) = title::recognize(&lines, driver.store) {
            driver.parse_header(tm)?;
        }
        if !no_header_footer {
            out.push_str(&driver.render_named_template("header")?);
        }
    }

    out.push_str(&driver.translate_body(None, &mut section, None)?);

    if !no_header_footer {
        out.push_str(&driver.render_named_template("footer")?);
    }

    Ok(out)
}
