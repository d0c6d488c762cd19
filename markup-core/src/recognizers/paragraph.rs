//! Paragraph recognition and translation (§4.6.5): a first line matching a `ParagraphDef`'s
//! `delimiter`, followed by a body read to the next blank line or block boundary.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::blockdefs::ParagraphDef;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::reader::Reader;
use crate::subst::{self, PassthroughStash};

static BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*$").unwrap());

/// Left-margin normalization (§4.6.5): common leading whitespace is stripped from every body line
/// unless the definition opts into verbatim handling.
fn strip_left_margin(lines: &[String], verbatim: bool) -> Vec<String> {
    if verbatim {
        return lines.to_vec();
    }
    let margin = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| if l.len() >= margin { l[margin..].to_string() } else { l.trim_start().to_string() })
        .collect()
}

fn style_for<'a>(def: &'a ParagraphDef, style: Option<&str>) -> (&'a str, &'a [crate::config::subs::SubsPass], &'a [crate::config::subs::SubsPass]) {
    if let Some(name) = style.or(def.default_style.as_deref()) {
        if let Some(ov) = def.styles.get(name) {
            let template = ov.template.as_deref().unwrap_or(def.template.as_str());
            let presubs = ov.presubs.as_deref().unwrap_or(def.presubs.as_slice());
            let postsubs = ov.postsubs.as_deref().unwrap_or(def.postsubs.as_slice());
            return (template, presubs, postsubs);
        }
    }
    (def.template.as_str(), def.presubs.as_slice(), def.postsubs.as_slice())
}

/// Reads a paragraph's body starting from its already-matched first line and renders it through
/// `def`'s template. `style` comes from the preceding `[style, ...]` attribute list, if any.
pub fn translate(
    first_line: &str,
    def: &ParagraphDef,
    style: Option<&str>,
    store: &ConfigStore,
    reader: &mut Reader,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<String> {
    let mut body_lines = vec![first_line.to_string()];
    let rest = reader.read_until(&BLANK, false, resolver, ops)?;
    body_lines.extend(rest.into_iter().map(|(_, text)| text));

    let (template_name, presubs, postsubs) = style_for(def, style);
    let verbatim = def.options.contains("verbatim");
    let normalized = strip_left_margin(&body_lines, verbatim);
    let mut body = normalized.join("\n");

    if let Some(filter) = &def.filter {
        body = ops.run_filter(filter, &body)?;
    }

    let mut stash = PassthroughStash::new();
    let mut callouts = Vec::new();
    body = subst::apply_subs(&body, presubs, store, resolver, ops, &mut stash, &mut callouts)?;
    body = subst::apply_subs(&body, postsubs, store, resolver, ops, &mut stash, &mut callouts)?;
    body = stash.restore(&body);

    let template = store.templates.get(template_name).cloned().unwrap_or_default();
    Ok(format!("{}{}{}", template.start_text(), body, template.end_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entries::parse_section;

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

    fn simple_def() -> ParagraphDef {
        let lines = vec!["delimiter=^.*$".to_string(), "template=simpara".to_string()];
        let entries = parse_section(&lines);
        let normal = crate::config::subs::SubsPass::default_normal();
        let verbatim = crate::config::subs::SubsPass::default_verbatim();
        ParagraphDef::from_entries("simple", &entries, &normal, &verbatim).unwrap()
    }

    #[test]
    fn reads_body_until_blank_line_and_wraps_in_template() {
        let mut store = ConfigStore::new();
        let template_lines = vec!["<p>".to_string(), "|</p>".to_string()];
        store
            .templates
            .insert("simpara".to_string(), crate::config::templates::Template::from_lines(&template_lines));
        let def = simple_def();
        let mut reader = Reader::new(8);
        reader.push_text("t.txt".into(), std::path::PathBuf::from("."), "second line\n\nnext para\n".into(), 0);
        let rendered = translate("first line", &def, None, &store, &mut reader, &NoAttrs, &mut NoOps).unwrap();
        assert_eq!(rendered, "<p>first line\nsecond line</p>");
    }
}
