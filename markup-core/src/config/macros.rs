//! `[macros]` (§4.3, §4.5): `pattern = [+#]name[subs]` entries compiled into [`MacroDef`]s.

use regex::Regex;

use crate::error::Result;

use super::config_error;
use super::entries::EntrySection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    /// `+name`: used only by the reader (`eval`, `sys`, `sys2`, `include`, `include1`).
    System,
    /// `#name`: must match a whole input line.
    Block,
    /// Plain `name`: inline macro.
    Inline,
}

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub kind: MacroKind,
    pub pattern: Regex,
    pub subs_override: Option<String>,
}

impl MacroDef {
    pub fn has_passtext(&self) -> bool {
        self.pattern
            .capture_names()
            .flatten()
            .any(|n| n == "passtext")
    }
}

/// Parses one `pattern=value` line from `[macros]`. `value` is `[+#]name[subslist]`: an optional
/// kind sigil, the template base name, and an optional bracketed subs-list override.
pub fn parse_macros(entries: &EntrySection) -> Result<Vec<MacroDef>> {
    let mut out = Vec::new();
    for (pattern, value) in entries.0.iter() {
        let (kind, rest) = match value.chars().next() {
            Some('+') => (MacroKind::System, &value[1..]),
            Some('#') => (MacroKind::Block, &value[1..]),
            _ => (MacroKind::Inline, value.as_str()),
        };
        let (name, subs_override) = match rest.find('[') {
            Some(idx) if rest.ends_with(']') => {
                (rest[..idx].to_string(), Some(rest[idx + 1..rest.len() - 1].to_string()))
            }
            _ => (rest.to_string(), None),
        };
        let compiled = Regex::new(pattern)
            .map_err(|e| config_error(format!("bad macro pattern '{}': {}", pattern, e)))?;
        // `name` comes from the value side, not a capture group. `target` only makes sense for
        // block/inline macros (system macros like `eval:`/`sys:` have no target, just `attrlist`).
        let mut required: Vec<&str> = vec!["attrlist"];
        if kind != MacroKind::System {
            required.push("target");
        }
        for group in required {
            if compiled.capture_names().flatten().all(|n| n != group) {
                return Err(config_error(format!(
                    "macro pattern '{}' is missing required named group '{}'",
                    pattern, group
                )));
            }
        }
        out.push(MacroDef {
            name,
            kind,
            pattern: compiled,
            subs_override,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entries::parse_section;

    #[test]
    fn parses_inline_macro() {
        let lines =
            vec![r"(?P<target>\S+)\[(?P<attrlist>.*?)\]=link".to_string()];
        let entries = parse_section(&lines);
        let macros = parse_macros(&entries).unwrap();
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].kind, MacroKind::Inline);
        assert_eq!(macros[0].name, "link");
    }

    #[test]
    fn system_macro_needs_no_target_group() {
        let lines = vec![r"eval:(?P<attrlist>.*)=+eval".to_string()];
        let entries = parse_section(&lines);
        let macros = parse_macros(&entries).unwrap();
        assert_eq!(macros[0].kind, MacroKind::System);
        assert_eq!(macros[0].name, "eval");
    }

    #[test]
    fn inline_macro_missing_target_group_errors() {
        let lines = vec![r"(?P<attrlist>.*)=link".to_string()];
        let entries = parse_section(&lines);
        assert!(parse_macros(&entries).is_err());
    }

    #[test]
    fn parses_block_macro_with_subs_override() {
        let lines = vec![
            r"^include1?::(?P<target>\S+)\[(?P<attrlist>.*?)\]$=#include[specialcharacters]"
                .to_string(),
        ];
        let entries = parse_section(&lines);
        let macros = parse_macros(&entries).unwrap();
        assert_eq!(macros[0].kind, MacroKind::Block);
        assert_eq!(macros[0].name, "include");
        assert_eq!(macros[0].subs_override.as_deref(), Some("specialcharacters"));
    }
}
