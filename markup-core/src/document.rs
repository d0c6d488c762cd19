//! The per-run [`Document`]: attributes, diagnostics, and the handful of counters the driver and
//! recognizers consult while translating.
//!
//! # Attribute values
//!
//! Per the data model, an attribute's value is a string, the empty string, or *undefined* — and
//! undefined is not the same as empty: an undefined reference drops the line it appears on, while an
//! empty one substitutes to nothing. We represent this as `Option<String>` stored only for attributes
//! that are *defined* (empty string included); undefined is simply "absent from the map". `name!`
//! entries remove the key outright rather than inserting a tombstone, which gives the same observable
//! behavior with a simpler map.

use std::collections::HashMap;

use crate::error::{Diagnostic, Severity};

/// Document shape, selecting header and section templates (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Doctype {
    Article,
    Manpage,
    Book,
}

impl Doctype {
    pub fn as_str(self) -> &'static str {
        match self {
            Doctype::Article => "article",
            Doctype::Manpage => "manpage",
            Doctype::Book => "book",
        }
    }

    pub fn parse(s: &str) -> Option<Doctype> {
        match s {
            "article" => Some(Doctype::Article),
            "manpage" => Some(Doctype::Manpage),
            "book" => Some(Doctype::Book),
            _ => None,
        }
    }
}

/// Ordered string→string map used for document attributes. Insertion order is preserved because
/// dumping/iteration is an observable behavior (§3).
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    order: Vec<String>,
    values: HashMap<String, String>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// True if the attribute is defined and its value is the empty string.
    pub fn is_empty_value(&self, name: &str) -> bool {
        matches!(self.values.get(name).map(|s| s.is_empty()), Some(true))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value.into());
    }

    pub fn unset(&mut self, name: &str) {
        if self.values.remove(name).is_some() {
            self.order.retain(|k| k != name);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), self.values[k].as_str()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One per invocation. Owns the attribute namespace, nesting level, safe-mode flag, and the
/// diagnostics collected while translating.
#[derive(Debug, Clone)]
pub struct Document {
    pub doctype: Doctype,
    pub backend: String,
    pub attributes: AttributeMap,
    pub level: usize,
    pub safe: bool,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl Document {
    pub fn new(doctype: Doctype, backend: impl Into<String>, safe: bool) -> Self {
        Document {
            doctype,
            backend: backend.into(),
            attributes: AttributeMap::new(),
            level: 0,
            safe,
            diagnostics: Vec::new(),
            error_count: 0,
            warning_count: 0,
        }
    }

    pub fn record(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Warning => self.warning_count += 1,
            Severity::Error => self.error_count += 1,
        }
        self.diagnostics.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_and_empty_are_distinct() {
        let mut attrs = AttributeMap::new();
        attrs.set("x", "");
        assert!(attrs.is_defined("x"));
        assert!(attrs.is_empty_value("x"));
        assert!(!attrs.is_defined("y"));
    }

    #[test]
    fn unset_removes_from_order() {
        let mut attrs = AttributeMap::new();
        attrs.set("a", "1");
        attrs.set("b", "2");
        attrs.unset("a");
        let dumped: Vec<_> = attrs.iter().collect();
        assert_eq!(dumped, vec![("b", "2")]);
    }

    #[test]
    fn insertion_order_preserved() {
        let mut attrs = AttributeMap::new();
        attrs.set("z", "1");
        attrs.set("a", "2");
        attrs.set("z", "3");
        let names: Vec<_> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
