//! The Lexer (§4.6): wraps `recognizers::identify` with the two-line lookahead titles need, and
//! caches its answer by cursor identity so repeated peeks (the driver checking what comes next,
//! then a recognizer doing the same check before consuming) don't re-run every regex twice.

use std::collections::HashMap;
use std::rc::Rc;

use crate::config::ConfigStore;
use crate::error::Result;
use crate::eval::SystemOps;
use crate::expr::NameResolver;
use crate::reader::Reader;
use crate::recognizers::Kind;

pub struct Lexer {
    cache: HashMap<(Rc<str>, usize), Kind>,
}

impl Lexer {
    pub fn new() -> Self {
        Lexer { cache: HashMap::new() }
    }

    /// Identifies what comes next in `reader` without consuming it. Returns `None` at EOF.
    pub fn peek(
        &mut self,
        reader: &mut Reader,
        store: &ConfigStore,
        resolver: &dyn NameResolver,
        ops: &mut dyn SystemOps,
    ) -> Result<Option<Kind>> {
        let ahead = reader.read_ahead(2, resolver, ops)?;
        let first = match ahead.first() {
            Some((cursor, _)) => cursor.clone(),
            None => return Ok(None),
        };
        let key = (first.file.clone(), first.line);
        if let Some(kind) = self.cache.get(&key) {
            return Ok(Some(kind.clone()));
        }
        let texts: Vec<String> = ahead.into_iter().map(|(_, text)| text).collect();
        let kind = crate::recognizers::identify(&texts, store);
        self.cache.insert(key, kind.clone());
        Ok(Some(kind))
    }

    /// Drops cached answers for lines that have been consumed (their cursor can never be peeked
    /// again, but the map would otherwise grow for the life of a long document).
    pub fn forget_before(&mut self, file: &Rc<str>, line: usize) {
        self.cache.retain(|(f, l), _| f != file || *l >= line);
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Lexer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

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
    fn peeking_twice_does_not_consume() {
        let store = ConfigStore::new();
        let mut reader = Reader::new(8);
        reader.push_text("t".to_string(), PathBuf::from("."), "plain text\n".to_string(), 0);
        let mut lexer = Lexer::new();
        let first = lexer.peek(&mut reader, &store, &NoAttrs, &mut NoOps).unwrap();
        let second = lexer.peek(&mut reader, &store, &NoAttrs, &mut NoOps).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(Kind::DefaultParagraph));
        let consumed = reader.read(&NoAttrs, &mut NoOps).unwrap();
        assert_eq!(consumed.unwrap().1, "plain text");
    }

    #[test]
    fn eof_returns_none() {
        let store = ConfigStore::new();
        let mut reader = Reader::new(8);
        let mut lexer = Lexer::new();
        assert_eq!(lexer.peek(&mut reader, &store, &NoAttrs, &mut NoOps).unwrap(), None);
    }
}
