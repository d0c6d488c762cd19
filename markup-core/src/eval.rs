//! The Attribute Evaluator's reference layer (§4.4 steps 1–6): escape normalization, `{name}` /
//! conditional `{name OP rval}` references, the undefined-reference drop rule, and the five
//! system attributes (`eval`, `sys`, `sys2`, `include`, `include1`).
//!
//! The ordered substitution-pass pipeline that calls this per line (specialcharacters, quotes,
//! specialwords, replacements, attributes, macros, callouts) lives in `subst.rs`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{MarkupError, Result};
use crate::expr::{self, NameResolver};

/// Placeholders for `\{`/`\}` during scanning, restored to literal `{`/`}` at the end (§4.4 step
/// 1/6). Chosen from the C0 range so they cannot collide with tab-expanded, NUL-free input text
/// (§6 "special sentinel characters").
const OPEN_SENTINEL: char = '\u{1}';
const CLOSE_SENTINEL: char = '\u{2}';

/// Side-effecting system actions the evaluator cannot perform itself — subprocess execution,
/// filesystem reads, safe-mode gating — owned by the engine/reader and injected as a trait object
/// so this module stays free of I/O.
pub trait SystemOps {
    fn safe_mode(&self) -> bool;
    /// `sys:` (false) / `sys2:` (true, also captures stderr). Safe mode must be checked by the
    /// implementation; a blocked call records its own diagnostic and returns `Ok(String::new())`.
    fn run_sys(&mut self, cmd: &str, capture_stderr: bool) -> Result<String>;
    /// `include:` — reads, tab-expands and attribute-substitutes the file at `path`, joined by
    /// `\n`. The implementation is responsible for the safe-mode root check (§8 include safety).
    fn include(&mut self, path: &str) -> Result<String>;
    /// `include1:` — previously cached content from an `include1::` block-macro read, if any.
    fn include1(&self, path: &str) -> Option<String>;
    /// Pipes `input` through the shell command `cmd`, returning its stdout (§4.6.5/§4.6.7
    /// `filter=`). Safe mode must be checked by the implementation the same way as `run_sys`.
    fn run_filter(&mut self, cmd: &str, input: &str) -> Result<String>;
}

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(?P<name>[^\W\d][-\w]*)(?:(?P<op>=|\?|!|#|%|@|\$)(?P<rval>[^}]*))?\}").unwrap()
});

static SIMPLE_LEFTOVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^\W\d][-\w]*\}").unwrap());

static SYSTEM_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(?P<action>eval|sys2|sys|include1|include):(?P<arg>[^}]*)\}").unwrap()
});

fn normalize_escapes(line: &str) -> String {
    line.replace("\\{", &OPEN_SENTINEL.to_string())
        .replace("\\}", &CLOSE_SENTINEL.to_string())
}

fn restore_escapes(line: &str) -> String {
    line.replace(OPEN_SENTINEL, "{").replace(CLOSE_SENTINEL, "}")
}

fn conditional_value(op: &str, defined: Option<&str>, rval: &str, dropped: &mut bool) -> String {
    match op {
        "=" => defined.map(|v| v.to_string()).unwrap_or_else(|| rval.to_string()),
        "?" => {
            if defined.is_some() {
                rval.to_string()
            } else {
                String::new()
            }
        }
        "!" => {
            if defined.is_some() {
                String::new()
            } else {
                rval.to_string()
            }
        }
        "#" => match defined {
            Some(_) => rval.to_string(),
            None => {
                *dropped = true;
                String::new()
            }
        },
        "%" => match defined {
            Some(_) => {
                *dropped = true;
                String::new()
            }
            None => rval.to_string(),
        },
        "@" | "$" => match defined {
            None => {
                *dropped = true;
                String::new()
            }
            Some(v) => regex_conditional(op, v, rval, dropped),
        },
        _ => String::new(),
    }
}

/// `{name@pattern:v1[:v2]}` / `{name$pattern:v1[:v2]}` (§4.4 step 3).
fn regex_conditional(op: &str, value: &str, rval: &str, dropped: &mut bool) -> String {
    let mut parts = rval.splitn(2, ':');
    let pattern = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");
    let (v1, v2) = match rest.split_once(':') {
        Some((a, b)) => (a, Some(b)),
        None => (rest, None),
    };
    let matches = Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false);
    if matches {
        v1.to_string()
    } else if op == "@" {
        v2.unwrap_or("").to_string()
    } else if let Some(v2) = v2 {
        v2.to_string()
    } else {
        *dropped = true;
        String::new()
    }
}

/// Resolves `{name}` / `{name OP rval}` references (§4.4 steps 2–4). Returns `None` if the line
/// must be dropped: an explicit drop-line marker (`#`/`%`/undefined-`@`/`$`) or a simple reference
/// to an undefined attribute left unresolved.
fn resolve_references(line: &str, resolver: &dyn NameResolver) -> Option<String> {
    let mut dropped = false;
    let replaced = REFERENCE.replace_all(line, |caps: &Captures| {
        if dropped {
            return String::new();
        }
        let name = &caps["name"];
        let defined = resolver.resolve(name);
        match caps.name("op").map(|m| m.as_str()) {
            None => defined.unwrap_or_else(|| caps[0].to_string()),
            Some(op) => {
                let rval = caps.name("rval").map(|m| m.as_str()).unwrap_or("");
                conditional_value(op, defined.as_deref(), rval, &mut dropped)
            }
        }
    });
    if dropped {
        return None;
    }
    let replaced = replaced.into_owned();
    if SIMPLE_LEFTOVER.is_match(&replaced) {
        return None;
    }
    Some(replaced)
}

struct ResolverAdapter<'a>(&'a dyn NameResolver);
impl<'a> NameResolver for ResolverAdapter<'a> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.0.resolve(name)
    }
}

/// Executes the system attributes (§4.4 step 5) remaining after reference resolution.
fn apply_system_attributes(
    line: &str,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<Option<String>> {
    if !SYSTEM_ATTR.is_match(line) {
        return Ok(Some(line.to_string()));
    }
    let mut dropped = false;
    let mut error: Option<MarkupError> = None;
    let replaced = SYSTEM_ATTR.replace_all(line, |caps: &Captures| {
        if dropped || error.is_some() {
            return String::new();
        }
        let action = &caps["action"];
        let arg = &caps["arg"];
        match action {
            "eval" => match expr::eval(arg, &ResolverAdapter(resolver)) {
                Ok(expr::Value::Bool(false)) => {
                    dropped = true;
                    String::new()
                }
                Ok(v) => v.to_output_string(),
                Err(_) => {
                    dropped = true;
                    String::new()
                }
            },
            "sys" => match ops.run_sys(arg, false) {
                Ok(s) => s,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            },
            "sys2" => match ops.run_sys(arg, true) {
                Ok(s) => s,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            },
            "include" => match ops.include(arg) {
                Ok(s) => s,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            },
            "include1" => match ops.include1(arg) {
                Some(s) => s,
                None => {
                    dropped = true;
                    String::new()
                }
            },
            _ => String::new(),
        }
    });
    if let Some(e) = error {
        return Err(e);
    }
    if dropped {
        return Ok(None);
    }
    Ok(Some(replaced.into_owned()))
}

/// Runs the full attribute-reference substitution over one line (§4.4 steps 1–6): escape
/// normalization, references, the undefined-reference drop test, system attributes, unescape.
/// Returns `Ok(None)` when the line must be dropped.
pub fn substitute_line(
    line: &str,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<Option<String>> {
    let normalized = normalize_escapes(line);
    let after_refs = match resolve_references(&normalized, resolver) {
        Some(s) => s,
        None => return Ok(None),
    };
    let after_system = match apply_system_attributes(&after_refs, resolver, ops)? {
        Some(s) => s,
        None => return Ok(None),
    };
    Ok(Some(restore_escapes(&after_system)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Map(Vec<(&'static str, &'static str)>);
    impl NameResolver for Map {
        fn resolve(&self, name: &str) -> Option<String> {
            self.0.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
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

    #[test]
    fn conditional_reference_scenario() {
        let map = Map(vec![("x", "one")]);
        let out = substitute_line("{x?yes}{y?no}", &map, &mut NoOps).unwrap();
        assert_eq!(out.as_deref(), Some("yes"));
    }

    #[test]
    fn undefined_simple_reference_drops_line() {
        let map = Map(vec![("x", "a")]);
        let out = substitute_line("before {y} after", &map, &mut NoOps).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn defined_simple_reference_substitutes() {
        let map = Map(vec![("x", "a")]);
        let out = substitute_line("before {x} after", &map, &mut NoOps).unwrap();
        assert_eq!(out.as_deref(), Some("before a after"));
    }

    #[test]
    fn escaped_braces_survive_as_literal() {
        let map = Map(vec![]);
        let out = substitute_line(r"\{notareference\}", &map, &mut NoOps).unwrap();
        assert_eq!(out.as_deref(), Some("{notareference}"));
    }

    #[test]
    fn hash_operator_drops_line_when_undefined() {
        let map = Map(vec![]);
        let out = substitute_line("{missing#text}", &map, &mut NoOps).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn coalesce_operator_prefers_defined_value() {
        let map = Map(vec![("x", "actual")]);
        let out = substitute_line("{x=default}", &map, &mut NoOps).unwrap();
        assert_eq!(out.as_deref(), Some("actual"));
    }

    #[test]
    fn eval_system_attribute_substitutes_result() {
        let map = Map(vec![]);
        let out = substitute_line("{eval:1 + 2}", &map, &mut NoOps).unwrap();
        assert_eq!(out.as_deref(), Some("3"));
    }
}
