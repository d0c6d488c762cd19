//! Post-cascade validation (§3 Invariants, §7 "Malformed configuration"): every block-family
//! reference resolves, every special-character entry key is one character, and table-tag sets
//! carry at least the mandatory body entries.

use crate::error::Result;

use super::config_error;
use super::ConfigStore;

fn template_exists(store: &ConfigStore, name: &str) -> bool {
    store.templates.get(name).is_some()
}

fn validate_paragraphs(store: &ConfigStore) -> Result<()> {
    for def in store.paragraphs.iter() {
        if !template_exists(store, &def.template) {
            for (style_name, ov) in def.styles.iter() {
                let tpl = ov.template.as_deref().unwrap_or(&def.template);
                if !template_exists(store, tpl) {
                    return Err(config_error(format!(
                        "paradef-{}: style '{}' references missing template '{}'",
                        def.name, style_name, tpl
                    )));
                }
            }
            if def.styles.is_empty() {
                return Err(config_error(format!(
                    "paradef-{}: missing template '{}'",
                    def.name, def.template
                )));
            }
        }
    }
    Ok(())
}

fn validate_blocks(store: &ConfigStore) -> Result<()> {
    for def in store.blocks.iter() {
        if def.options.contains("skip") {
            continue;
        }
        if !template_exists(store, &def.template) {
            if def.styles.is_empty() {
                return Err(config_error(format!(
                    "blockdef-{}: missing template '{}'",
                    def.name, def.template
                )));
            }
            for (style_name, ov) in def.styles.iter() {
                let tpl = ov.template.as_deref().unwrap_or(&def.template);
                if !template_exists(store, tpl) {
                    return Err(config_error(format!(
                        "blockdef-{}: style '{}' references missing template '{}'",
                        def.name, style_name, tpl
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_lists(store: &ConfigStore) -> Result<()> {
    for def in store.lists.iter() {
        if store.listtags.get(&def.tags).is_none() {
            return Err(config_error(format!(
                "listdef-{}: references missing listtags-{}",
                def.name, def.tags
            )));
        }
    }
    Ok(())
}

fn validate_tables(store: &ConfigStore) -> Result<()> {
    for def in store.tables.iter() {
        let tags = store.tabletags.get(&def.tags).ok_or_else(|| {
            config_error(format!(
                "tabledef-{}: references missing tabletags-{}",
                def.name, def.tags
            ))
        })?;
        if tags.bodyrow.is_none() {
            return Err(config_error(format!(
                "tabletags-{}: missing mandatory 'bodyrow'",
                def.tags
            )));
        }
        if tags.bodydata.is_none() {
            return Err(config_error(format!(
                "tabletags-{}: missing mandatory 'bodydata'",
                def.tags
            )));
        }
        if tags.paragraph.is_none() {
            return Err(config_error(format!(
                "tabletags-{}: missing mandatory 'paragraph'",
                def.tags
            )));
        }
    }
    Ok(())
}

fn validate_specialcharacters(store: &ConfigStore) -> Result<()> {
    for (key, _) in store.specialcharacters.iter() {
        if key.chars().count() != 1 {
            return Err(config_error(format!(
                "[specialcharacters] key '{}' must be exactly one character",
                key
            )));
        }
    }
    Ok(())
}

/// Runs every rule named in §3/§7 against the fully rebuilt store.
pub fn validate(store: &ConfigStore) -> Result<()> {
    validate_specialcharacters(store)?;
    validate_paragraphs(store)?;
    validate_blocks(store)?;
    validate_lists(store)?;
    validate_tables(store)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cascade::load_into;

    #[test]
    fn rejects_multi_char_special_character_key() {
        let mut store = ConfigStore::new();
        load_into(&mut store, "[specialcharacters]\nab=&amp;\n", "test").unwrap();
        store.rebuild().unwrap();
        assert!(validate(&store).is_err());
    }

    #[test]
    fn rejects_blockdef_with_missing_template() {
        let mut store = ConfigStore::new();
        load_into(
            &mut store,
            "[blockdef-sidebar]\ndelimiter=^\\*\\*\\*\\*$\ntemplate=sidebar\n",
            "test",
        )
        .unwrap();
        store.rebuild().unwrap();
        assert!(validate(&store).is_err());
    }

    #[test]
    fn accepts_blockdef_with_existing_template() {
        let mut store = ConfigStore::new();
        load_into(
            &mut store,
            "[blockdef-sidebar]\ndelimiter=^\\*\\*\\*\\*$\ntemplate=sidebar\n[sidebar]\n<sidebar>\n|</sidebar>\n",
            "test",
        )
        .unwrap();
        store.rebuild().unwrap();
        assert!(validate(&store).is_ok());
    }

    #[test]
    fn rejects_listdef_with_missing_listtags() {
        let mut store = ConfigStore::new();
        load_into(
            &mut store,
            "[listdef-bulleted]\ndelimiter=^\\s*-\\s+(?P<text>.*)$\ntype=bulleted\ntags=missing\n",
            "test",
        )
        .unwrap();
        store.rebuild().unwrap();
        assert!(validate(&store).is_err());
    }
}
