//! The ordered substitution-pass pipeline (§4.4): specialcharacters, quotes, specialwords,
//! replacements/replacements2, attributes, macros, callouts, applied over a block body in
//! caller-specified order. `attributes` is the only pass applied line-by-line rather than over
//! the joined body (§9 "Attribute drop semantics").

use regex::Regex;

use crate::attrs::{self, AttrList};
use crate::config::subs::SubsPass;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::eval::{self, SystemOps};
use crate::expr::NameResolver;

/// Extracts and restores passthrough text (§4.5, §6 `\tN\t` sentinels, §8 passthrough-preservation
/// invariant).
#[derive(Debug, Default)]
pub struct PassthroughStash {
    stashed: Vec<String>,
}

impl PassthroughStash {
    pub fn new() -> Self {
        PassthroughStash::default()
    }

    pub fn stash(&mut self, text: String) -> String {
        let n = self.stashed.len();
        self.stashed.push(text);
        format!("\t{}\t", n)
    }

    pub fn restore(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (n, content) in self.stashed.iter().enumerate() {
            out = out.replace(&format!("\t{}\t", n), content);
        }
        out
    }
}

fn apply_specialcharacters(body: &str, store: &ConfigStore) -> String {
    let mut out = String::with_capacity(body.len());
    for c in body.chars() {
        let key = c.to_string();
        match store.specialcharacters.get(&key) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn find_seq(chars: &[char], start: usize, seq: &[char]) -> Option<usize> {
    if seq.is_empty() || start > chars.len() {
        return None;
    }
    let mut i = start;
    while i + seq.len() <= chars.len() {
        if chars[i..i + seq.len()] == *seq {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn seq_matches_at(chars: &[char], pos: usize, seq: &[char]) -> bool {
    pos + seq.len() <= chars.len() && chars[pos..pos + seq.len()] == *seq
}

/// One quote-delimiter substitution (§4.4). Constrained quotes require a non-word character (or
/// string boundary) outside the delimiters and a non-space character just inside; unconstrained
/// quotes (tag name prefixed `#`) match anywhere. A leading `\` escapes the opening delimiter.
///
/// Simplification: the attribute-list-seeded quote form (`[role]*text*`) is not implemented —
/// plain quoting only.
fn apply_one_quote(text: &str, left: &str, right: &str, unconstrained: bool, stag: &str, etag: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let left_chars: Vec<char> = left.chars().collect();
    let right_chars: Vec<char> = right.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if seq_matches_at(&chars, i, &left_chars) {
            if i > 0 && chars[i - 1] == '\\' {
                out.pop();
                out.extend(left_chars.iter());
                i += left_chars.len();
                continue;
            }
            let before_ok = unconstrained || i == 0 || !is_word_char(chars[i - 1]);
            if before_ok {
                if let Some(close_at) = find_seq(&chars, i + left_chars.len(), &right_chars) {
                    let inner_start = i + left_chars.len();
                    if close_at > inner_start {
                        let first_ok = unconstrained || !chars[inner_start].is_whitespace();
                        let after_idx = close_at + right_chars.len();
                        let after_ok =
                            unconstrained || after_idx >= chars.len() || !is_word_char(chars[after_idx]);
                        if first_ok && after_ok {
                            out.push_str(stag);
                            out.extend(chars[inner_start..close_at].iter());
                            out.push_str(etag);
                            i = after_idx;
                            continue;
                        }
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn apply_quotes(body: &str, store: &ConfigStore) -> String {
    let mut text = body.to_string();
    for (key, tagval) in store.quotes.iter() {
        let (unconstrained, tagname) = match tagval.strip_prefix('#') {
            Some(rest) => (true, rest),
            None => (false, tagval.as_str()),
        };
        let (left, right) = key.split_once('|').unwrap_or((key, key));
        let (stag, etag) = store
            .tags
            .get(tagname)
            .cloned()
            .unwrap_or_else(|| (String::new(), String::new()));
        text = apply_one_quote(&text, left, right, unconstrained, &stag, &etag);
    }
    text
}

fn apply_specialwords(body: &str, store: &ConfigStore) -> String {
    let mut text = body.to_string();
    for (_name, words, template_name) in &store.specialwords {
        let (stag, etag) = store
            .templates
            .get(template_name)
            .map(|t| (t.start_text(), t.end_text()))
            .unwrap_or_default();
        for word in words {
            let pattern = format!(r"\b{}\b", regex::escape(word));
            if let Ok(re) = Regex::new(&pattern) {
                text = re
                    .replace_all(&text, |caps: &regex::Captures| {
                        format!("{}{}{}", stag, &caps[0], etag)
                    })
                    .into_owned();
            }
        }
    }
    text
}

fn apply_replacements(body: &str, table: &[(String, String)]) -> String {
    let mut text = body.to_string();
    for (pattern, replacement) in table {
        if let Ok(re) = Regex::new(pattern) {
            text = re.replace_all(&text, replacement.as_str()).into_owned();
        }
    }
    text
}

/// The `attributes` pass (§4.4, §9): applied per line, dropping any line with an unresolved
/// reference rather than the whole body.
fn apply_attributes(body: &str, resolver: &dyn NameResolver, ops: &mut dyn SystemOps) -> Result<String> {
    let mut out = Vec::new();
    for line in body.split('\n') {
        if let Some(substituted) = eval::substitute_line(line, resolver, ops)? {
            out.push(substituted);
        }
    }
    Ok(out.join("\n"))
}

struct MatchResolver<'a> {
    attrs: &'a AttrList,
    fallback: &'a dyn NameResolver,
}

impl<'a> NameResolver for MatchResolver<'a> {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Ok(idx) = name.parse::<usize>() {
            if let Some(v) = self.attrs.positional(idx) {
                return Some(v.to_string());
            }
        }
        self.attrs.get(name).map(|s| s.to_string()).or_else(|| self.fallback.resolve(name))
    }
}

/// Expands every inline macro definition in `store` against `body`, in definition order.
/// `stash` receives passthrough text (patterns with a `passtext` group); callers restore it after
/// the remaining passes run. `callout_marks` collects the positional value of any macro literally
/// named `callout` (§4.6.6, §3 callout map).
fn apply_macros(
    body: &str,
    store: &ConfigStore,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
    stash: &mut PassthroughStash,
    callout_marks: &mut Vec<usize>,
    only_callouts: bool,
) -> Result<String> {
    let mut text = body.to_string();
    for def in &store.macros {
        if def.kind != crate::config::macros::MacroKind::Inline {
            continue;
        }
        if only_callouts != (def.name == "callout") {
            continue;
        }
        let template_name = format!("{}-inlinemacro", def.name);
        let template = store.templates.get(&template_name).cloned().unwrap_or_default();
        let pattern = def.pattern.clone();
        let has_passtext = def.has_passtext();
        let mut replace_err: Option<crate::error::MarkupError> = None;
        let replaced = pattern.replace_all(&text, |caps: &regex::Captures| {
            if replace_err.is_some() {
                return String::new();
            }
            let whole = caps.get(0).unwrap().as_str();
            if whole.starts_with('\\') {
                return whole[1..].to_string();
            }
            let attrlist_raw = caps.name("attrlist").map(|m| m.as_str()).unwrap_or("");
            let mut attrs = attrs::parse_attributes(attrlist_raw);
            if def.name == "callout" {
                if let Some(n) = attrs.positional(1).and_then(|s| s.parse::<usize>().ok()) {
                    callout_marks.push(n);
                }
            }
            if has_passtext {
                let passtext = caps.name("passtext").map(|m| m.as_str()).unwrap_or("").to_string();
                return stash.stash(passtext);
            }
            if let Some(target) = caps.name("target") {
                attrs = merge_target(attrs, target.as_str());
            }
            let match_resolver = MatchResolver {
                attrs: &attrs,
                fallback: resolver,
            };
            let mut rendered = String::new();
            for part in [template.start_text(), template.end_text()] {
                match eval::substitute_line(&part, &match_resolver, ops) {
                    Ok(Some(s)) => rendered.push_str(&s),
                    Ok(None) => {}
                    Err(e) => {
                        replace_err = Some(e);
                        return String::new();
                    }
                }
            }
            rendered
        });
        if let Some(e) = replace_err {
            return Err(e);
        }
        text = replaced.into_owned();
    }
    Ok(text)
}

fn merge_target(mut attrs: AttrList, target: &str) -> AttrList {
    attrs.insert_named("target", target);
    attrs
}

/// Runs `passes` over `body` in order, returning the fully substituted block body.
#[allow(clippy::too_many_arguments)]
pub fn apply_subs(
    body: &str,
    passes: &[SubsPass],
    store: &ConfigStore,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
    stash: &mut PassthroughStash,
    callout_marks: &mut Vec<usize>,
) -> Result<String> {
    let mut text = body.to_string();
    for pass in passes {
        text = match pass {
            SubsPass::SpecialCharacters => apply_specialcharacters(&text, store),
            SubsPass::Quotes => apply_quotes(&text, store),
            SubsPass::SpecialWords => apply_specialwords(&text, store),
            SubsPass::Replacements => apply_replacements(&text, &store.replacements),
            SubsPass::Replacements2 => apply_replacements(&text, &store.replacements2),
            SubsPass::Attributes => apply_attributes(&text, resolver, ops)?,
            SubsPass::Macros => apply_macros(&text, store, resolver, ops, stash, callout_marks, false)?,
            SubsPass::Callouts => apply_macros(&text, store, resolver, ops, stash, callout_marks, true)?,
        };
    }
    Ok(stash.restore(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cascade::load_into;

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

    #[test]
    fn specialcharacters_pass_is_idempotent_after_one_application() {
        let mut store = ConfigStore::new();
        load_into(&mut store, "[specialcharacters]\n&=&amp;\n<=&lt;\n>=&gt;\n", "t").unwrap();
        store.rebuild().unwrap();
        let once = apply_specialcharacters("a < b & c", &store);
        assert_eq!(once, "a &lt; b &amp; c");
        let twice = apply_specialcharacters(&once, &store);
        assert_eq!(once, twice);
    }

    #[test]
    fn quoted_text_wraps_with_tag() {
        let mut store = ConfigStore::new();
        load_into(&mut store, "[tags]\nstrong=<b>|</b>\n[quotes]\n*|*=strong\n", "t").unwrap();
        store.rebuild().unwrap();
        let out = apply_quotes("a *bold* b", &store);
        assert_eq!(out, "a <b>bold</b> b");
    }

    #[test]
    fn escaped_quote_is_literal() {
        let mut store = ConfigStore::new();
        load_into(&mut store, "[tags]\nstrong=<b>|</b>\n[quotes]\n*|*=strong\n", "t").unwrap();
        store.rebuild().unwrap();
        let out = apply_quotes(r"a \*literal* b", &store);
        assert_eq!(out, "a *literal* b");
    }

    #[test]
    fn attributes_pass_drops_only_offending_line() {
        let store = ConfigStore::new();
        let mut ops = NoOps;
        let out = apply_attributes("before\n{y}\nafter", &NoAttrs, &mut ops).unwrap();
        assert_eq!(out, "before\nafter");
    }
}
