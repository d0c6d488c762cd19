//! The Writer (§4.2): a line-oriented output sink with a configured newline and optional
//! blank-line suppression, opening either a real path or the stdout sentinel (`-`).

use std::fs::File;
use std::io::{self, BufWriter, Write as IoWrite};
use std::path::Path;

use crate::error::{MarkupError, Result};

pub enum Sink {
    Stdout(io::Stdout),
    File(BufWriter<File>),
}

/// Writes scalars, sequences, and nested sequences one element per line (§4.2).
pub struct Writer {
    sink: Sink,
    newline: String,
    suppress_blank_lines: bool,
}

impl Writer {
    /// Opens `path` for writing, or stdout if `path` is `None` / `-`.
    pub fn open(path: Option<&Path>, newline: impl Into<String>, suppress_blank_lines: bool) -> Result<Writer> {
        let sink = match path {
            None => Sink::Stdout(io::stdout()),
            Some(p) if p == Path::new("-") => Sink::Stdout(io::stdout()),
            Some(p) => {
                let file = File::create(p)
                    .map_err(|e| MarkupError::Io(format!("cannot create {}: {}", p.display(), e)))?;
                Sink::File(BufWriter::new(file))
            }
        };
        Ok(Writer {
            sink,
            newline: newline.into(),
            suppress_blank_lines: suppress_blank_lines,
        })
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if self.suppress_blank_lines && line.is_empty() {
            return Ok(());
        }
        let text = format!("{}{}", line, self.newline);
        match &mut self.sink {
            Sink::Stdout(out) => out
                .write_all(text.as_bytes())
                .map_err(|e| MarkupError::Io(e.to_string())),
            Sink::File(f) => f.write_all(text.as_bytes()).map_err(|e| MarkupError::Io(e.to_string())),
        }
    }

    pub fn write_sequence<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for line in lines {
            self.write_line(line)?;
        }
        Ok(())
    }

    pub fn write_nested(&mut self, groups: &[Vec<String>]) -> Result<()> {
        for group in groups {
            for line in group {
                self.write_line(line)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.sink {
            Sink::Stdout(out) => out.flush().map_err(|e| MarkupError::Io(e.to_string())),
            Sink::File(f) => f.flush().map_err(|e| MarkupError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn writes_lines_with_configured_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut writer = Writer::open(Some(&path), "\r\n", false).unwrap();
            writer.write_line("a").unwrap();
            writer.write_line("b").unwrap();
            writer.flush().unwrap();
        }
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "a\r\nb\r\n");
    }

    #[test]
    fn suppresses_blank_lines_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut writer = Writer::open(Some(&path), "\n", true).unwrap();
            writer.write_line("a").unwrap();
            writer.write_line("").unwrap();
            writer.write_line("b").unwrap();
            writer.flush().unwrap();
        }
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "a\nb\n");
    }
}
