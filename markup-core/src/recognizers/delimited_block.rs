//! DelimitedBlock recognition and translation (§4.6.7): a `delimiter` regex opens the block, the
//! same regex closes it. `options=skip` discards the body silently; `options` containing
//! `sectionbody`/`list` is the driver's concern (recursing into nested structure) and is not
//! handled here — this module only renders a block's own verbatim/filtered/templated body.

use crate::config::blockdefs::BlockDef;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::reader::Reader;
use crate::subst::{self, PassthroughStash};

/// Reads and renders a delimited block whose opening line has already been consumed from
/// `reader`. Returns `None` when `options=skip` silently discards the block.
pub fn translate(
    def: &BlockDef,
    style: Option<&str>,
    store: &ConfigStore,
    reader: &mut Reader,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<Option<String>> {
    let body_lines = reader.read_until(&def.delimiter, true, resolver, ops)?;
    reader.read(resolver, ops)?; // consume the closing delimiter line

    if def.options.contains("skip") {
        return Ok(None);
    }

    let (template_name, presubs, postsubs, filter) = resolve_style(def, style);
    let mut body = body_lines.into_iter().map(|(_, text)| text).collect::<Vec<_>>().join("\n");

    if let Some(filter_cmd) = filter {
        body = ops.run_filter(filter_cmd, &body)?;
    }

    let mut stash = PassthroughStash::new();
    let mut callouts = Vec::new();
    body = subst::apply_subs(&body, presubs, store, resolver, ops, &mut stash, &mut callouts)?;
    body = subst::apply_subs(&body, postsubs, store, resolver, ops, &mut stash, &mut callouts)?;
    body = stash.restore(&body);

    let template = store.templates.get(template_name).cloned().unwrap_or_default();
    Ok(Some(format!("{}{}{}", template.start_text(), body, template.end_text())))
}

fn resolve_style<'a>(
    def: &'a BlockDef,
    style: Option<&str>,
) -> (
    &'a str,
    &'a [crate::config::subs::SubsPass],
    &'a [crate::config::subs::SubsPass],
    Option<&'a str>,
) {
    if let Some(name) = style.or(def.default_style.as_deref()) {
        if let Some(ov) = def.styles.get(name) {
            let template = ov.template.as_deref().unwrap_or(def.template.as_str());
            let presubs = ov.presubs.as_deref().unwrap_or(def.presubs.as_slice());
            let postsubs = ov.postsubs.as_deref().unwrap_or(def.postsubs.as_slice());
            let filter = ov.filter.as_deref().or(def.filter.as_deref());
            return (template, presubs, postsubs, filter);
        }
    }
    (def.template.as_str(), def.presubs.as_slice(), def.postsubs.as_slice(), def.filter.as_deref())
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

    fn example_def() -> BlockDef {
        let lines = vec!["delimiter=^====+$".to_string(), "template=example".to_string()];
        let entries = parse_section(&lines);
        let normal = crate::config::subs::SubsPass::default_normal();
        let verbatim = crate::config::subs::SubsPass::default_verbatim();
        BlockDef::from_entries("example", &entries, &normal, &verbatim).unwrap()
    }

    #[test]
    fn reads_body_until_matching_closing_delimiter() {
        let mut store = ConfigStore::new();
        let template_lines = vec!["<example>".to_string(), "|</example>".to_string()];
        store
            .templates
            .insert("example".to_string(), crate::config::templates::Template::from_lines(&template_lines));
        let def = example_def();
        let mut reader = Reader::new(8);
        reader.push_text("t".to_string(), std::path::PathBuf::from("."), "body line\n====\n".to_string(), 0);
        let rendered = translate(&def, None, &store, &mut reader, &NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(rendered, "<example>body line</example>");
    }

    #[test]
    fn skip_option_discards_body() {
        let mut store = ConfigStore::new();
        let lines = vec![
            "delimiter=^////+$".to_string(),
            "options=skip".to_string(),
        ];
        let entries = parse_section(&lines);
        let normal = crate::config::subs::SubsPass::default_normal();
        let verbatim = crate::config::subs::SubsPass::default_verbatim();
        let def = BlockDef::from_entries("comment", &entries, &normal, &verbatim).unwrap();
        let mut reader = Reader::new(8);
        reader.push_text("t".to_string(), std::path::PathBuf::from("."), "secret\n////\n".to_string(), 0);
        let rendered = translate(&def, None, &store, &mut reader, &NoAttrs, &mut NoOps).unwrap();
        assert!(rendered.is_none());
    }
}
