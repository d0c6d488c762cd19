//! The Engine (§4.8): the single public entry point. Owns the configuration cascade, the
//! `Document`, the `Reader` stack, the `Lexer`, and the `CalloutMap` for the span of one
//! `translate` call, and provides the concrete [`SystemOps`] that wires `sys:`/`sys2:`/`include:`/
//! filters to real subprocesses and filesystem reads, gated by safe mode.
//!
//! Grounded on the teacher's `DocumentLoader` (`lex_parser::lex::loader`): a single owning facade
//! over a multi-stage pipeline, constructed once and driven to completion by one call.

use std::collections::HashSet;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::callouts::CalloutMap;
use crate::config::ConfigStore;
use crate::document::{Doctype, Document};
use crate::driver::{self, Driver};
use crate::error::{Diagnostic, MarkupError, Result};
use crate::eval::SystemOps;
use crate::lexer::Lexer;
use crate::reader::Reader;

/// Where the document's source text comes from (§6 positional argument: a path, or `-` for
/// stdin).
pub enum Input {
    File(PathBuf),
    Stdin,
}

/// Everything the engine needs, gathered once by the CLI from its parsed flags (§6).
pub struct EngineOptions {
    pub doctype: Doctype,
    pub backend: String,
    /// `-f/--conf-file`, in the order given; loaded last in the cascade, after the directory
    /// search, and required to exist.
    pub conf_files: Vec<PathBuf>,
    /// `-e/--no-conf`: skips the directory-search portion of the cascade entirely. Explicit
    /// `conf_files` still load.
    pub no_conf: bool,
    /// The input path, when known up front, so `Engine::new` can search its directory and its
    /// sibling `<docname>.conf`/`<docname>-<backend>.conf` files (§4.3 steps 4–5). `None` for
    /// stdin input, where neither step applies.
    pub input_path: Option<PathBuf>,
    /// `-a/--attribute name[=value][@]`; a trailing `@` ("do not override") is resolved by the
    /// CLI before it reaches here (`attrs::parse_attributes` recognizes `@` on the attribute list
    /// grammar, not on this flag, so the CLI applies the weaker form by simply omitting entries
    /// that already have a value set elsewhere).
    pub attributes: Vec<(String, Option<String>)>,
    pub no_header_footer: bool,
    /// `-n/--section-numbers`, an alias for `-a numbered` (§6).
    pub section_numbers: bool,
    /// `--unsafe`: disables safe mode (default is safe).
    pub unsafe_mode: bool,
}

impl EngineOptions {
    pub fn new(doctype: Doctype, backend: impl Into<String>) -> Self {
        EngineOptions {
            doctype,
            backend: backend.into(),
            conf_files: Vec::new(),
            no_conf: false,
            input_path: None,
            attributes: Vec::new(),
            no_header_footer: false,
            section_numbers: false,
            unsafe_mode: false,
        }
    }
}

/// What the CLI reports to the user and turns into a process exit code (§4.8, §7).
pub struct RunSummary {
    pub error_count: usize,
    pub warning_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// The single public entry point (§4.8). `translate` consumes `self`: no re-entrant translation
/// of the same engine is supported (§5).
pub struct Engine {
    store: ConfigStore,
    options: EngineOptions,
}

impl Engine {
    /// Runs the configuration cascade (§4.3) and validates the result (§7). Directory-search
    /// candidates that don't exist are skipped silently; explicit `--conf-file` arguments that
    /// don't exist are a `MarkupError::Config`.
    pub fn new(options: EngineOptions) -> Result<Engine> {
        let mut store = ConfigStore::new();
        let mut loaded: HashSet<PathBuf> = HashSet::new();

        if !options.no_conf {
            for path in cascade_search_paths(&options) {
                load_optional(&mut store, &path, &mut loaded)?;
            }
        }
        for path in &options.conf_files {
            load_required(&mut store, path, &mut loaded)?;
        }

        store.rebuild()?;
        store.validate()?;
        Ok(Engine { store, options })
    }

    /// Returns the fully merged, pre-rebuild configuration text, section by section, for
    /// `-c/--dump-conf` (§6).
    pub fn dump_conf(&self) -> String {
        let mut out = String::new();
        for name in self.store.raw.names() {
            out.push_str(&format!("[{}]\n", name));
            for line in self.store.raw.get(name).unwrap_or(&[]) {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Drives the Document Driver (§4.7) to completion and writes the rendered output to `output`.
    /// Consumes `self` (§5, no re-entrant translation).
    pub fn translate(mut self, input: Input, output: &mut dyn IoWrite) -> Result<RunSummary> {
        let mut reader = Reader::new(self.store.misc.tabsize);
        let root_dir = match &input {
            Input::File(path) => {
                reader.open(path)?;
                path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
            }
            Input::Stdin => {
                reader.open(Path::new("-"))?;
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }
        };

        let mut doc = Document::new(self.options.doctype, self.options.backend.clone(), !self.options.unsafe_mode);
        doc.attributes.set("backend", self.options.backend.clone());
        doc.attributes.set("doctype", self.options.doctype.as_str().to_string());

        for (name, value) in self.store.conf_attrs.clone() {
            match value {
                Some(v) => doc.attributes.set(name, v),
                None => doc.attributes.unset(&name),
            }
        }

        let mut locked_attrs: HashSet<String> = HashSet::new();
        for (name, value) in &self.options.attributes {
            locked_attrs.insert(name.clone());
            match value {
                Some(v) => doc.attributes.set(name.clone(), v.clone()),
                None => doc.attributes.unset(name),
            }
        }
        if self.options.section_numbers && !locked_attrs.contains("numbered") {
            locked_attrs.insert("numbered".to_string());
            doc.attributes.set("numbered", "");
        }

        let mut lexer = Lexer::new();
        let mut callouts = CalloutMap::new();
        let mut ops = RealSystemOps {
            safe: !self.options.unsafe_mode,
            root_dir,
            include1_cache: reader.include1_cache_handle(),
        };

        let rendered = {
            let mut drv = Driver {
                store: &mut self.store,
                doc: &mut doc,
                reader: &mut reader,
                lexer: &mut lexer,
                callouts: &mut callouts,
                ops: &mut ops,
                locked_attrs: &locked_attrs,
            };
            driver::translate(&mut drv, self.options.no_header_footer)
        };

        let rendered = match rendered {
            Ok(text) => text,
            Err(MarkupError::Fatal(msg)) => {
                log::error!("{}", msg);
                doc.record(Diagnostic::error(None, msg.clone()));
                return Err(MarkupError::Fatal(msg));
            }
            Err(e) => return Err(e),
        };

        let newline = self.store.misc.newline.clone();
        for line in rendered.split('\n') {
            output.write_all(line.as_bytes()).map_err(|e| MarkupError::Io(e.to_string()))?;
            output.write_all(newline.as_bytes()).map_err(|e| MarkupError::Io(e.to_string()))?;
        }
        output.flush().map_err(|e| MarkupError::Io(e.to_string()))?;

        Ok(RunSummary {
            error_count: doc.error_count(),
            warning_count: doc.warning_count(),
            diagnostics: doc.diagnostics().to_vec(),
        })
    }
}

/// The ordered directory-search candidates (§4.3 steps 1–5), before the explicit `--conf-file`
/// step. Missing candidates are fine; they're filtered out by [`load_optional`].
fn cascade_search_paths(options: &EngineOptions) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Global directory: a fixed location baked in at build time (§6 "Environment").
    paths.push(PathBuf::from("/etc/markup/markup.conf"));

    // 2. Application directory: alongside the running executable.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join("markup.conf"));
        }
    }

    // 3. User directory: `$HOME/.markup/markup.conf`.
    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".markup").join("markup.conf"));
    }

    if let Some(input_path) = &options.input_path {
        let dir = input_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

        // 4. Input-file directory.
        paths.push(dir.join("markup.conf"));

        // 5. Per-document siblings.
        if let Some(stem) = input_path.file_stem().and_then(|s| s.to_str()) {
            paths.push(dir.join(format!("{}.conf", stem)));
            paths.push(dir.join(format!("{}-{}.conf", stem, options.backend)));
        }
    }

    paths
}

fn load_optional(store: &mut ConfigStore, path: &Path, loaded: &mut HashSet<PathBuf>) -> Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    load_into_store(store, path, loaded)
}

fn load_required(store: &mut ConfigStore, path: &Path, loaded: &mut HashSet<PathBuf>) -> Result<()> {
    if !path.is_file() {
        return Err(MarkupError::Config(format!("conf-file not found: {}", path.display())));
    }
    load_into_store(store, path, loaded)
}

fn load_into_store(store: &mut ConfigStore, path: &Path, loaded: &mut HashSet<PathBuf>) -> Result<()> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !loaded.insert(canonical) {
        return Ok(());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| MarkupError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    log::debug!("loading configuration {}", path.display());
    store.load_str(&text, &path.display().to_string())
}

fn path_is_within(root: &Path, candidate: &Path) -> bool {
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let candidate_parent = candidate.parent().unwrap_or(candidate);
    let candidate_abs = std::fs::canonicalize(candidate_parent).unwrap_or_else(|_| candidate_parent.to_path_buf());
    candidate_abs.starts_with(&root) || candidate_abs == root
}

/// The concrete [`SystemOps`]: `sys:`/`sys2:` and `filter=` pipe through `sh -c`; `include:` reads
/// from the document directory; `include1:` serves the reader's own `include1::` cache. Safe mode
/// suppresses every side-effecting path and logs instead of failing the run (§7 "unsafe operation
/// in safe mode").
struct RealSystemOps {
    safe: bool,
    root_dir: PathBuf,
    include1_cache: std::rc::Rc<std::cell::RefCell<std::collections::HashMap<String, String>>>,
}

impl SystemOps for RealSystemOps {
    fn safe_mode(&self) -> bool {
        self.safe
    }

    fn run_sys(&mut self, cmd: &str, capture_stderr: bool) -> Result<String> {
        if self.safe {
            log::error!("sys:: blocked in safe mode: {}", cmd);
            return Ok(String::new());
        }
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd).current_dir(&self.root_dir).stdin(Stdio::null()).stdout(Stdio::piped());
        command.stderr(if capture_stderr { Stdio::piped() } else { Stdio::null() });
        let output = command.output().map_err(|e| MarkupError::Io(e.to_string()))?;
        if !output.status.success() {
            log::warn!("sys:: '{}' exited with {}", cmd, output.status);
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if capture_stderr {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(text.trim_end_matches('\n').to_string())
    }

    /// A simplification against §4.4's "attribute-substitute its lines": `SystemOps::include`
    /// takes no resolver, so it reads and joins lines without re-running the evaluator over the
    /// included text. Recognizer-level `include::`, which does have a resolver in scope, performs
    /// the real thing in `Reader::handle_include`.
    fn include(&mut self, path: &str) -> Result<String> {
        let target = self.root_dir.join(path);
        if self.safe && !path_is_within(&self.root_dir, &target) {
            log::error!("include: blocked outside document root: {}", path);
            return Ok(String::new());
        }
        let text = std::fs::read_to_string(&target)
            .map_err(|e| MarkupError::Io(format!("cannot include {}: {}", target.display(), e)))?;
        Ok(text.lines().collect::<Vec<_>>().join("\n"))
    }

    fn include1(&self, path: &str) -> Option<String> {
        self.include1_cache.borrow().get(path).cloned()
    }

    fn run_filter(&mut self, cmd: &str, input: &str) -> Result<String> {
        if self.safe {
            log::warn!("filter blocked in safe mode: {}", cmd);
            return Ok(input.to_string());
        }
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.root_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MarkupError::Io(e.to_string()))?;
        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| MarkupError::Io("filter subprocess has no stdin".to_string()))?;
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| MarkupError::Io(e.to_string()))?;
        }
        let output = child.wait_with_output().map_err(|e| MarkupError::Io(e.to_string()))?;
        if !output.status.success() {
            log::warn!("filter '{}' exited with {}", cmd, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fails_on_missing_explicit_conf_file() {
        let mut options = EngineOptions::new(Doctype::Article, "test");
        options.no_conf = true;
        options.conf_files.push(PathBuf::from("/nonexistent/path/markup.conf"));
        assert!(Engine::new(options).is_err());
    }

    #[test]
    fn new_with_no_conf_and_no_explicit_files_validates_empty_store() {
        let mut options = EngineOptions::new(Doctype::Article, "test");
        options.no_conf = true;
        assert!(Engine::new(options).is_ok());
    }

    #[test]
    fn translate_renders_minimal_document_with_inline_conf() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("markup.conf");
        std::fs::write(
            &conf_path,
            "[paradef-paragraph]\ndelimiter=^.*$\ntemplate=paragraph\n\n[paragraph]\n|\n",
        )
        .unwrap();
        let input_path = dir.path().join("doc.txt");
        std::fs::write(&input_path, "hello world\n").unwrap();

        let mut options = EngineOptions::new(Doctype::Article, "test");
        options.no_conf = true;
        options.conf_files.push(conf_path);
        options.no_header_footer = true;
        let engine = Engine::new(options).unwrap();

        let mut out = Vec::new();
        let summary = engine.translate(Input::File(input_path), &mut out).unwrap();
        assert_eq!(summary.error_count, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "hello world\n");
    }
}
