//! Title / Section recognition and translation (§4.6.4): single-line (`sect0..sect4` patterns) or
//! double-line (a `sectiontitle` line followed by a matching underline).

use crate::config::ConfigStore;
use crate::error::Result;

/// One recognized title: its nesting level and the literal title text (not yet substituted).
pub struct TitleMatch {
    pub level: usize,
    pub text: String,
    /// Number of physical lines consumed (1 for single-line, 2 for double-line).
    pub lines_consumed: usize,
}

pub fn is_title(lines: &[String], store: &ConfigStore) -> bool {
    recognize(lines, store).is_some()
}

pub fn recognize(lines: &[String], store: &ConfigStore) -> Option<TitleMatch> {
    let line = lines.first()?;
    for (level, pattern) in store.titles.sect.iter().enumerate() {
        if let Some(re) = pattern {
            if let Some(caps) = re.captures(line) {
                let text = caps
                    .name("title")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| line.to_string());
                return Some(TitleMatch {
                    level,
                    text,
                    lines_consumed: 1,
                });
            }
        }
    }
    if let Some(re) = &store.titles.sectiontitle {
        if let Some(caps) = re.captures(line) {
            let text = caps.name("title").map(|m| m.as_str().to_string())?;
            let underline = lines.get(1)?;
            let level = store.titles.level_for_underline(text.chars().count(), underline)?;
            return Some(TitleMatch {
                level,
                text,
                lines_consumed: 2,
            });
        }
    }
    None
}

/// Synthesizes a unique section ID: `prefix` plus lowercased `[a-zA-Z0-9]+` runs from `text` joined
/// by `_`, de-duplicated against `used` with a numeric suffix (§4.6.4, §3 "ID synthesis").
pub fn synthesize_id(prefix: &str, text: &str, used: &mut std::collections::HashSet<String>) -> String {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    let base = format!("{}{}", prefix, words.join("_"));
    let mut candidate = base.clone();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Resolves the template used for a section's start/end tags: a `[specialsections]` entry whose
/// pattern matches the title text overrides the level's default `sect<N>` template (§4.3, §4.6.4).
pub(crate) fn resolve_section_template(level: usize, store: &ConfigStore, title: &str) -> String {
    for (pattern, template_name) in store.specialsections.iter() {
        if regex::Regex::new(pattern).map(|re| re.is_match(title)).unwrap_or(false) {
            return template_name.clone();
        }
    }
    format!("sect{}", level)
}

pub fn render_start_tag(level: usize, store: &ConfigStore, sectnum: &str, id: &str, title: &str) -> Result<String> {
    let template_name = resolve_section_template(level, store, title);
    let template = store.templates.get(&template_name).cloned().unwrap_or_default();
    let mut rendered = template.start_text();
    rendered = rendered.replace("{sectnum}", sectnum).replace("{id}", id).replace("{title}", title);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cascade::load_into;

    #[test]
    fn recognizes_single_line_title_by_level() {
        let mut store = ConfigStore::new();
        load_into(&mut store, "[titles]\nsect0=^(?P<title>.+)$\n", "t").unwrap();
        store.rebuild().unwrap();
        let m = recognize(&["Introduction".to_string()], &store).unwrap();
        assert_eq!(m.level, 0);
        assert_eq!(m.text, "Introduction");
    }

    #[test]
    fn synthesize_id_deduplicates() {
        let mut used = std::collections::HashSet::new();
        let a = synthesize_id("", "Overview", &mut used);
        let b = synthesize_id("", "Overview", &mut used);
        assert_eq!(a, "overview");
        assert_eq!(b, "overview_2");
    }
}
