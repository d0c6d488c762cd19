//! BlockTitle (§4.6.3): a `.Title` line, substituted with `subsnormal` and stashed as the pending
//! title for the next block.

use super::DEFAULT_BLOCKTITLE;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::subst::{self, PassthroughStash};

pub fn parse(
    line: &str,
    store: &ConfigStore,
    resolver: &dyn NameResolver,
    ops: &mut dyn SystemOps,
) -> Result<Option<String>> {
    let text = match &store.titles.blocktitle {
        Some(re) => match re.captures(line) {
            Some(caps) => caps
                .name("title")
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| line.to_string()),
            None => return Ok(None),
        },
        None => match DEFAULT_BLOCKTITLE.captures(line) {
            Some(caps) => caps["title"].to_string(),
            None => return Ok(None),
        },
    };
    let mut stash = PassthroughStash::new();
    let mut callouts = Vec::new();
    let rendered = subst::apply_subs(&text, &store.misc.subsnormal, store, resolver, ops, &mut stash, &mut callouts)?;
    Ok(Some(rendered))
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
    fn parses_default_blocktitle_syntax() {
        let store = ConfigStore::new();
        let title = parse(".An Example", &store, &NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(title, "An Example");
    }

    #[test]
    fn non_blocktitle_line_is_none() {
        let store = ConfigStore::new();
        assert!(parse("plain", &store, &NoAttrs, &mut NoOps).unwrap().is_none());
    }
}
