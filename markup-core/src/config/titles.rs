//! `[titles]` (§4.3, §4.6.4): underline character pairs for the five section levels, the
//! double-line `sectiontitle` pattern, the `blocktitle` pattern, and optional single-line
//! `sect0..sect4` patterns.

use regex::Regex;

use crate::error::Result;

use super::config_error;
use super::entries::EntrySection;

#[derive(Debug, Clone)]
pub struct Titles {
    pub underlines: [String; 5],
    pub sectiontitle: Option<Regex>,
    pub blocktitle: Option<Regex>,
    pub sect: [Option<Regex>; 5],
}

impl Default for Titles {
    fn default() -> Self {
        Titles {
            underlines: [
                "=".repeat(2),
                "-".repeat(2),
                "~".repeat(2),
                "^".repeat(2),
                "+".repeat(2),
            ],
            sectiontitle: None,
            blocktitle: None,
            sect: [None, None, None, None, None],
        }
    }
}

impl Titles {
    pub fn from_entries(entries: &EntrySection) -> Result<Titles> {
        let mut titles = Titles::default();
        if let Some(u) = entries.0.get("underlines") {
            let parts: Vec<&str> = u.split(',').map(|s| s.trim()).collect();
            if parts.len() != 5 {
                return Err(config_error(
                    "[titles] underlines must list exactly 5 comma-separated sequences",
                ));
            }
            for (i, p) in parts.iter().enumerate() {
                titles.underlines[i] = p.to_string();
            }
        }
        if let Some(pat) = entries.0.get("sectiontitle") {
            titles.sectiontitle = Some(compile(pat)?);
        }
        if let Some(pat) = entries.0.get("blocktitle") {
            titles.blocktitle = Some(compile(pat)?);
        }
        for level in 0..5 {
            let key = format!("sect{}", level);
            if let Some(pat) = entries.0.get(&key) {
                titles.sect[level] = Some(compile(pat)?);
            }
        }
        Ok(titles)
    }

    /// Returns the section level (0-based) whose underline-pair prefix matches `underline`, scaled
    /// to the title's visible length within ±3 characters (§4.6.4).
    pub fn level_for_underline(&self, title_visible_len: usize, underline: &str) -> Option<usize> {
        let len = underline.chars().count();
        if len == 0 {
            return None;
        }
        let diff = (len as isize - title_visible_len as isize).unsigned_abs();
        if diff > 3 {
            return None;
        }
        for (level, pair) in self.underlines.iter().enumerate() {
            let mut chars = pair.chars();
            let c0 = chars.next()?;
            let repeated: String = std::iter::repeat(c0).take(len).collect();
            if underline == repeated {
                return Some(level);
            }
        }
        None
    }
}

fn compile(pat: &str) -> Result<Regex> {
    Regex::new(pat).map_err(|e| config_error(format!("bad regex '{}': {}", pat, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_underlines_distinguish_levels() {
        let t = Titles::default();
        assert_eq!(t.level_for_underline(5, "====="), Some(0));
        assert_eq!(t.level_for_underline(5, "-----"), Some(1));
    }

    #[test]
    fn underline_length_tolerance() {
        let t = Titles::default();
        assert_eq!(t.level_for_underline(8, "====="), Some(0));
        assert_eq!(t.level_for_underline(20, "====="), None);
    }
}
