//! The Reader (§4.1): line-oriented input with an unbounded pushback buffer, tab expansion,
//! right-trimming, include-file stacking, `ifdef`/`ifndef`/`endif` conditional exclusion, and the
//! `eval::`/`sys::`/`sys2::` system block macros.
//!
//! Distinct from the inline `{eval:...}`/`{sys:...}` system attributes in `eval.rs`: those splice a
//! result into the middle of a line during substitution, these replace a whole input line before the
//! lexer ever sees it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Read as IoRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::attrs;
use crate::error::{Cursor, MarkupError, Result};
use crate::eval::SystemOps;
use crate::expr::{self, NameResolver};

const DEFAULT_INCLUDE_DEPTH: usize = 5;

static IFDEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ifdef::(?P<names>[^\[]+)\[\]\s*$").unwrap());
static IFNDEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ifndef::(?P<names>[^\[]+)\[\]\s*$").unwrap());
static ENDIF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^endif::(?:[^\[]*)\[\]\s*$").unwrap());
static INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^include(?P<one>1)?::(?P<target>\S+?)\[(?P<attrs>.*)\]\s*$").unwrap());
static SYSBLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<action>eval|sys2|sys)::(?P<arg>.*)$").unwrap());

fn expand_tabs(line: &str, tabsize: usize) -> String {
    if tabsize == 0 || !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut col = 0usize;
    for c in line.chars() {
        if c == '\t' {
            let spaces = tabsize - (col % tabsize);
            out.extend(std::iter::repeat(' ').take(spaces));
            col += spaces;
        } else {
            out.push(c);
            col += 1;
        }
    }
    out
}

struct InputFile {
    name: Rc<str>,
    dir: PathBuf,
    lines: Vec<String>,
    pos: usize,
    depth: usize,
}

/// A stack of `ifdef`/`ifndef` frames; a frame's `active` flag is its own branch condition. Reading
/// is suppressed whenever any frame on the stack is inactive (§4.1 "nested conditions track a depth
/// counter").
#[derive(Debug, Default)]
struct CondStack(Vec<bool>);

impl CondStack {
    fn skipping(&self) -> bool {
        self.0.iter().any(|&active| !active)
    }
}

/// Line-oriented input stream feeding the lexer (§4.1).
pub struct Reader {
    stack: Vec<InputFile>,
    cond: CondStack,
    pending: Vec<(Cursor, String)>,
    tabsize: usize,
    max_include_depth: usize,
    include1_cache: Rc<RefCell<HashMap<String, String>>>,
}

impl Reader {
    pub fn new(tabsize: usize) -> Self {
        Reader {
            stack: Vec::new(),
            cond: CondStack::default(),
            pending: Vec::new(),
            tabsize,
            max_include_depth: DEFAULT_INCLUDE_DEPTH,
            include1_cache: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// A shared handle onto the `include1::` cache, cloned out so a [`crate::eval::SystemOps`]
    /// implementation can serve `{include1:target}` lookups without borrowing the reader itself
    /// (§4.4 system attributes, §4.1 `include1::` block macro).
    pub fn include1_cache_handle(&self) -> Rc<RefCell<HashMap<String, String>>> {
        self.include1_cache.clone()
    }

    /// Switches to a new top-level input; `-` is the stdin sentinel.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let (name, dir, text) = if path == Path::new("-") {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| MarkupError::Io(e.to_string()))?;
            ("<stdin>".to_string(), PathBuf::from("."), buf)
        } else {
            let text = fs::read_to_string(path)
                .map_err(|e| MarkupError::Io(format!("cannot read {}: {}", path.display(), e)))?;
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            (path.display().to_string(), dir, text)
        };
        self.push_text(name, dir, text, 0);
        Ok(())
    }

    pub(crate) fn push_text(&mut self, name: String, dir: PathBuf, text: String, depth: usize) {
        let lines: Vec<String> = text
            .lines()
            .map(|l| expand_tabs(l, self.tabsize).trim_end().to_string())
            .collect();
        self.stack.push(InputFile {
            name: Rc::from(name.as_str()),
            dir,
            lines,
            pos: 0,
            depth,
        });
    }

    pub fn eof(&self) -> bool {
        self.pending.is_empty() && self.stack.iter().all(|f| f.pos >= f.lines.len())
    }

    fn raw_next(&mut self) -> Option<(Rc<str>, PathBuf, usize, String)> {
        while let Some(top) = self.stack.last_mut() {
            if top.pos < top.lines.len() {
                let line_no = top.pos + 1;
                let text = top.lines[top.pos].clone();
                top.pos += 1;
                return Some((top.name.clone(), top.dir.clone(), line_no, text));
            }
            self.stack.pop();
        }
        None
    }

    /// Current include depth: the file a newly encountered `include::` line is read from.
    fn current_depth(&self) -> usize {
        self.stack.last().map(|f| f.depth).unwrap_or(0)
    }

    fn resolve_target(&self, dir: &Path, target: &str) -> PathBuf {
        let candidate = Path::new(target);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            dir.join(candidate)
        }
    }

    fn handle_include(
        &mut self,
        cursor: &Cursor,
        dir: &Path,
        is_include1: bool,
        target_raw: &str,
        attrs_raw: &str,
        resolver: &dyn NameResolver,
        ops: &mut dyn SystemOps,
    ) -> Result<Option<String>> {
        let target = crate::eval::substitute_line(target_raw, resolver, ops)?.unwrap_or_default();
        let attrs = attrs::parse_attributes(attrs_raw);
        let depth_override = attrs.get("depth").and_then(|v| v.parse::<usize>().ok());
        let tabsize_override = attrs.get("tabsize").and_then(|v| v.parse::<usize>().ok());
        let max_depth = depth_override.unwrap_or(self.max_include_depth);
        let next_depth = self.current_depth() + 1;
        if next_depth > max_depth {
            // Degrade silently: emit the include line unsubstituted rather than recursing (§4.1).
            return Ok(Some(format!(
                "include{}::{}[{}]",
                if is_include1 { "1" } else { "" },
                target_raw,
                attrs_raw
            )));
        }
        let path = self.resolve_target(dir, &target);
        if ops.safe_mode() && !path_is_within(dir, &path) {
            return Ok(Some(String::new()));
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| MarkupError::Io(format!("cannot include {}: {}", path.display(), e)))?;
        let saved_tabsize = self.tabsize;
        if let Some(ts) = tabsize_override {
            self.tabsize = ts;
        }
        let child_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
        if is_include1 {
            let expanded: Vec<String> = text
                .lines()
                .map(|l| expand_tabs(l, self.tabsize).trim_end().to_string())
                .collect();
            self.include1_cache.borrow_mut().insert(target, expanded.join("\n"));
            self.tabsize = saved_tabsize;
            return Ok(None);
        }
        self.push_text(path.display().to_string(), child_dir, text, next_depth);
        self.tabsize = saved_tabsize;
        let _ = cursor;
        Ok(None)
    }

    fn handle_sysblock(
        &mut self,
        action: &str,
        arg: &str,
        resolver: &dyn NameResolver,
        ops: &mut dyn SystemOps,
    ) -> Result<Option<String>> {
        let output = match action {
            "eval" => match expr::eval(arg, &EvalAdapter(resolver)) {
                Ok(expr::Value::Bool(false)) => return Ok(None),
                Ok(v) => v.to_output_string(),
                Err(_) => return Ok(None),
            },
            "sys" => ops.run_sys(arg, false)?,
            "sys2" => ops.run_sys(arg, true)?,
            _ => unreachable!(),
        };
        Ok(Some(output))
    }

    /// Retrieves previously cached `include1::` content, for the `{include1:target}` system
    /// attribute (§4.4).
    pub fn include1_cached(&self, target: &str) -> Option<String> {
        self.include1_cache.borrow().get(target).cloned()
    }

    /// Reads the next processed line, or `None` at end of input. Processes conditionals, includes,
    /// and system block macros transparently (§4.1).
    pub fn read(&mut self, resolver: &dyn NameResolver, ops: &mut dyn SystemOps) -> Result<Option<(Cursor, String)>> {
        if !self.pending.is_empty() {
            return Ok(Some(self.pending.remove(0)));
        }
        loop {
            let (file, dir, line_no, raw) = match self.raw_next() {
                Some(v) => v,
                None => {
                    if !self.cond.0.is_empty() {
                        return Err(MarkupError::Fatal("missing endif at end of input".into()));
                    }
                    return Ok(None);
                }
            };
            let cursor = Cursor::new(file, line_no, raw.clone());

            if let Some(caps) = IFDEF.captures(&raw) {
                let active = eval_condition(&caps["names"], resolver, true);
                self.cond.0.push(active);
                continue;
            }
            if let Some(caps) = IFNDEF.captures(&raw) {
                let active = eval_condition(&caps["names"], resolver, false);
                self.cond.0.push(active);
                continue;
            }
            if ENDIF.is_match(&raw) {
                if self.cond.0.pop().is_none() {
                    return Err(MarkupError::Fatal(format!("{} endif without matching ifdef/ifndef", cursor)));
                }
                continue;
            }

            if self.cond.skipping() {
                continue;
            }

            if let Some(caps) = INCLUDE.captures(&raw) {
                let is_include1 = caps.name("one").is_some();
                let target = caps["target"].to_string();
                let attrs_raw = caps.name("attrs").map(|m| m.as_str()).unwrap_or("").to_string();
                if let Some(line) =
                    self.handle_include(&cursor, &dir, is_include1, &target, &attrs_raw, resolver, ops)?
                {
                    return Ok(Some((cursor, line)));
                }
                continue;
            }

            if let Some(caps) = SYSBLOCK.captures(&raw) {
                let action = caps["action"].to_string();
                let arg = caps["arg"].to_string();
                match self.handle_sysblock(&action, &arg, resolver, ops)? {
                    Some(text) => {
                        let mut lines = text.split('\n');
                        let first = lines.next().unwrap_or("").to_string();
                        for (i, rest) in lines.enumerate() {
                            self.pending
                                .push((Cursor::new(cursor.file.clone(), line_no, rest.to_string()), rest.to_string()));
                            let _ = i;
                        }
                        return Ok(Some((cursor, first)));
                    }
                    None => continue,
                }
            }

            return Ok(Some((cursor, raw)));
        }
    }

    pub fn read_next(&mut self, resolver: &dyn NameResolver, ops: &mut dyn SystemOps) -> Result<Option<(Cursor, String)>> {
        match self.read(resolver, ops)? {
            Some(item) => {
                self.pending.insert(0, item.clone());
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    pub fn read_ahead(
        &mut self,
        n: usize,
        resolver: &dyn NameResolver,
        ops: &mut dyn SystemOps,
    ) -> Result<Vec<(Cursor, String)>> {
        let mut collected = Vec::with_capacity(n);
        for _ in 0..n {
            match self.read(resolver, ops)? {
                Some(item) => collected.push(item),
                None => break,
            }
        }
        let mut restored = collected.clone();
        restored.extend(std::mem::take(&mut self.pending));
        self.pending = restored;
        Ok(collected)
    }

    /// Returns lines up to (not including) the first line matching `until`; that line remains next.
    /// When `same_file` is set, also stops (without consuming) at the first line from a different
    /// file than the one the scan started in.
    pub fn read_until(
        &mut self,
        until: &Regex,
        same_file: bool,
        resolver: &dyn NameResolver,
        ops: &mut dyn SystemOps,
    ) -> Result<Vec<(Cursor, String)>> {
        let mut out: Vec<(Cursor, String)> = Vec::new();
        let start_file = self.stack.last().map(|f| f.name.clone());
        loop {
            match self.read(resolver, ops)? {
                Some((cursor, text)) => {
                    if until.is_match(&text) || (same_file && Some(cursor.file.clone()) != start_file) {
                        self.pending.insert(0, (cursor, text));
                        break;
                    }
                    out.push((cursor, text));
                }
                None => break,
            }
        }
        Ok(out)
    }

    pub fn skip_blank_lines(&mut self, resolver: &dyn NameResolver, ops: &mut dyn SystemOps) -> Result<()> {
        loop {
            match self.read(resolver, ops)? {
                Some((cursor, text)) => {
                    if !text.trim().is_empty() {
                        self.pending.insert(0, (cursor, text));
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(())
    }
}

struct EvalAdapter<'a>(&'a dyn NameResolver);
impl<'a> NameResolver for EvalAdapter<'a> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.0.resolve(name)
    }
}

/// `ifdef::a,b[]` is satisfied if any named attribute is defined (OR); `ifdef::a+b[]` requires all
/// (AND). `ifndef` inverts the per-name test before combining. A reasonable, explicitly simplified
/// reading of the original's conditional-inclusion grammar, which this spec does not pin down.
fn eval_condition(names: &str, resolver: &dyn NameResolver, want_defined: bool) -> bool {
    if names.contains('+') {
        names.split('+').all(|n| resolver.resolve(n.trim()).is_some() == want_defined)
    } else {
        names.split(',').any(|n| resolver.resolve(n.trim()).is_some() == want_defined)
    }
}

fn path_is_within(root: &Path, candidate: &Path) -> bool {
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let candidate_parent = candidate.parent().unwrap_or(candidate);
    let candidate_abs = fs::canonicalize(candidate_parent).unwrap_or_else(|_| candidate_parent.to_path_buf());
    candidate_abs.starts_with(&root) || candidate_abs == root
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoAttrs;
    impl NameResolver for NoAttrs {
        fn resolve(&self, _name: &str) -> Option<String> {
            None
        }
    }

    struct DefinedX;
    impl NameResolver for DefinedX {
        fn resolve(&self, name: &str) -> Option<String> {
            if name == "x" {
                Some("1".to_string())
            } else {
                None
            }
        }
    }

    struct NoOps;
    impl SystemOps for NoOps {
        fn safe_mode(&self) -> bool {
            false
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

    fn reader_over(text: &str) -> Reader {
        let mut reader = Reader::new(8);
        reader.push_text("t".to_string(), PathBuf::from("."), text.to_string(), 0);
        reader
    }

    #[test]
    fn reads_plain_lines_in_order() {
        let mut reader = reader_over("one\ntwo\n");
        let (_, a) = reader.read(&NoAttrs, &mut NoOps).unwrap().unwrap();
        let (_, b) = reader.read(&NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(a, "one");
        assert_eq!(b, "two");
        assert!(reader.read(&NoAttrs, &mut NoOps).unwrap().is_none());
    }

    #[test]
    fn ifdef_skips_block_when_attribute_undefined() {
        let mut reader = reader_over("ifdef::missing[]\nhidden\nendif::[]\nvisible\n");
        let (_, line) = reader.read(&NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(line, "visible");
        assert!(reader.read(&NoAttrs, &mut NoOps).unwrap().is_none());
    }

    #[test]
    fn ifdef_keeps_block_when_attribute_defined() {
        let mut reader = reader_over("ifdef::x[]\nshown\nendif::[]\n");
        let (_, line) = reader.read(&DefinedX, &mut NoOps).unwrap().unwrap();
        assert_eq!(line, "shown");
    }

    #[test]
    fn unmatched_endif_is_fatal() {
        let mut reader = reader_over("endif::[]\n");
        assert!(reader.read(&NoAttrs, &mut NoOps).is_err());
    }

    #[test]
    fn missing_endif_at_eof_is_fatal() {
        let mut reader = reader_over("ifdef::x[]\nline\n");
        reader.read(&DefinedX, &mut NoOps).unwrap();
        assert!(reader.read(&DefinedX, &mut NoOps).is_err());
    }

    #[test]
    fn tabs_expand_to_configured_width() {
        let mut reader = reader_over("a\tb\n");
        let (_, line) = reader.read(&NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(line, "a       b");
    }

    #[test]
    fn skip_blank_lines_stops_before_content() {
        let mut reader = reader_over("\n\ncontent\n");
        reader.skip_blank_lines(&NoAttrs, &mut NoOps).unwrap();
        let (_, line) = reader.read(&NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(line, "content");
    }

    #[test]
    fn read_ahead_does_not_consume() {
        let mut reader = reader_over("one\ntwo\nthree\n");
        let peeked = reader.read_ahead(2, &NoAttrs, &mut NoOps).unwrap();
        assert_eq!(peeked.iter().map(|(_, l)| l.as_str()).collect::<Vec<_>>(), vec!["one", "two"]);
        let (_, first) = reader.read(&NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(first, "one");
    }
}
