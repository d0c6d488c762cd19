//! AttributeList (§4.6.2): a bracketed `[...]` line, attribute-substituted then parsed into the
//! pending attribute list consumed by the next block.

use super::ATTRIBUTE_LIST;
use crate::attrs::{self, AttrList};
use crate::error::Result;
use crate::eval::{self, SystemOps};
use crate::expr::NameResolver;

pub fn parse(line: &str, resolver: &dyn NameResolver, ops: &mut dyn SystemOps) -> Result<Option<AttrList>> {
    let caps = match ATTRIBUTE_LIST.captures(line) {
        Some(c) => c,
        None => return Ok(None),
    };
    let raw = caps.name("attrlist").map(|m| m.as_str()).unwrap_or("");
    let substituted = eval::substitute_line(raw, resolver, ops)?.unwrap_or_default();
    Ok(Some(attrs::parse_attributes(&substituted)))
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
    fn parses_bracketed_positional_and_named() {
        let list = parse("[quote, Attribution]", &NoAttrs, &mut NoOps).unwrap().unwrap();
        assert_eq!(list.positional(1), Some("quote"));
        assert_eq!(list.positional(2), Some("Attribution"));
    }

    #[test]
    fn non_bracketed_line_is_not_a_list() {
        assert!(parse("plain text", &NoAttrs, &mut NoOps).unwrap().is_none());
    }
}
