//! Subs list parsing (§3, §4.4): the ordered sequence of substitution passes applied to a block
//! body, plus the `normal`/`verbatim`/`none` shorthand names.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsPass {
    SpecialCharacters,
    Quotes,
    SpecialWords,
    Replacements,
    Replacements2,
    Attributes,
    Macros,
    Callouts,
}

impl SubsPass {
    pub fn name(self) -> &'static str {
        match self {
            SubsPass::SpecialCharacters => "specialcharacters",
            SubsPass::Quotes => "quotes",
            SubsPass::SpecialWords => "specialwords",
            SubsPass::Replacements => "replacements",
            SubsPass::Replacements2 => "replacements2",
            SubsPass::Attributes => "attributes",
            SubsPass::Macros => "macros",
            SubsPass::Callouts => "callouts",
        }
    }

    pub fn default_normal() -> Vec<SubsPass> {
        vec![
            SubsPass::SpecialCharacters,
            SubsPass::Quotes,
            SubsPass::Attributes,
            SubsPass::SpecialWords,
            SubsPass::Replacements,
            SubsPass::Macros,
        ]
    }

    pub fn default_verbatim() -> Vec<SubsPass> {
        vec![SubsPass::SpecialCharacters, SubsPass::Callouts]
    }
}

impl fmt::Display for SubsPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsOptionsError(pub String);

impl fmt::Display for SubsOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a comma-separated subs list, expanding the `normal`/`verbatim`/`none` shorthands (§4.4).
/// `normal_list`/`verbatim_list` are the currently configured `subsnormal`/`subsverbatim` expansions
/// (themselves configurable via `[miscellaneous]`).
pub fn parse_subs(
    raw: &str,
    normal_list: &[SubsPass],
    verbatim_list: &[SubsPass],
) -> Result<Vec<SubsPass>, SubsOptionsError> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part {
            "normal" => out.extend_from_slice(normal_list),
            "verbatim" => out.extend_from_slice(verbatim_list),
            "none" => {}
            "specialcharacters" => out.push(SubsPass::SpecialCharacters),
            "quotes" => out.push(SubsPass::Quotes),
            "specialwords" => out.push(SubsPass::SpecialWords),
            "replacements" => out.push(SubsPass::Replacements),
            "replacements2" => out.push(SubsPass::Replacements2),
            "attributes" => out.push(SubsPass::Attributes),
            "macros" => out.push(SubsPass::Macros),
            "callouts" => out.push(SubsPass::Callouts),
            other => {
                return Err(SubsOptionsError(format!(
                    "unknown substitution option: {}",
                    other
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_normal_shorthand() {
        let normal = SubsPass::default_normal();
        let parsed = parse_subs("normal", &normal, &[]).unwrap();
        assert_eq!(parsed, normal);
    }

    #[test]
    fn rejects_unknown_option() {
        assert!(parse_subs("bogus", &[], &[]).is_err());
    }

    #[test]
    fn none_yields_empty() {
        assert_eq!(parse_subs("none", &[], &[]).unwrap(), Vec::new());
    }
}
