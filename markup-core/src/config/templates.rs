//! Template sections (§3, §6): literal lines, split into a start and end half on the first line
//! that contains a bare `|`.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub start: Vec<String>,
    pub end: Vec<String>,
}

impl Template {
    pub fn from_lines(lines: &[String]) -> Template {
        for (i, line) in lines.iter().enumerate() {
            if let Some(idx) = line.find('|') {
                let mut start: Vec<String> = lines[..i].to_vec();
                let before = &line[..idx];
                let after = &line[idx + 1..];
                if !before.is_empty() {
                    start.push(before.to_string());
                }
                let mut end = Vec::new();
                if !after.is_empty() {
                    end.push(after.to_string());
                }
                end.extend(lines[i + 1..].iter().cloned());
                return Template { start, end };
            }
        }
        Template {
            start: lines.to_vec(),
            end: Vec::new(),
        }
    }

    pub fn start_text(&self) -> String {
        self.start.join("\n")
    }

    pub fn end_text(&self) -> String {
        self.end.join("\n")
    }
}

/// Expands `template::[name]` block-macro lines (§4.3) by inline-replacing them with the named
/// section's raw lines. Applied as a pre-pass before the rest of the cascade is interpreted; applying
/// it twice is a fixed point (§8) because a line that was already expanded no longer matches the
/// `template::` pattern.
pub fn expand_templates(lines: &[String], lookup: impl Fn(&str) -> Option<Vec<String>>) -> Vec<String> {
    let mut out = Vec::new();
    for line in lines {
        if let Some(name) = line
            .strip_prefix("template::[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            if let Some(expansion) = lookup(name) {
                out.extend(expansion);
                continue;
            }
        }
        out.push(line.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_pipe_line() {
        let lines = vec!["<simpara>".to_string(), "|</simpara>".to_string()];
        let t = Template::from_lines(&lines);
        assert_eq!(t.start, vec!["<simpara>".to_string()]);
        assert_eq!(t.end, vec!["</simpara>".to_string()]);
    }

    #[test]
    fn no_pipe_is_all_start() {
        let lines = vec!["literal".to_string()];
        let t = Template::from_lines(&lines);
        assert_eq!(t.start, vec!["literal".to_string()]);
        assert!(t.end.is_empty());
    }

    #[test]
    fn expand_templates_is_idempotent() {
        let lines = vec!["template::[p]".to_string()];
        let lookup = |name: &str| -> Option<Vec<String>> {
            if name == "p" {
                Some(vec!["expanded".to_string()])
            } else {
                None
            }
        };
        let once = expand_templates(&lines, lookup);
        let twice = expand_templates(&once, lookup);
        assert_eq!(once, twice);
    }
}
