//! Line-oriented `key=value` property file, as read by the server.
//!
//! Only the requested key is ever touched. Comments, blank lines and every
//! other key pass through byte for byte.
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Key holding the active world
pub const LEVEL_NAME_KEY: &str = "level-name";

/// Escapes a value the way Java properties files expect.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\")
}

/// Undoes [`escape_value`], plus the `\:` and `\=` escapes the server may write.
pub fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return None;
    }
    trimmed
        .split_once('=')
        .map(|(key, value)| (key.trim(), value.trim_start()))
}

/// Value of `key` in `contents`, unescaped
pub fn lookup(contents: &str, key: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(split_entry)
        .find(|(k, _)| *k == key)
        .map(|(_, value)| unescape_value(value))
}

fn split_terminator(line: &str) -> (&str, &str) {
    let body = match line.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => line,
    };
    (body, &line[body.len()..])
}

/// `contents` with the first `key` line replaced, or the key appended.
///
/// The replaced line keeps its own line ending. An appended line uses CRLF
/// if the file already does.
pub fn upsert(contents: &str, key: &str, value: &str) -> String {
    let entry = format!("{}={}", key, escape_value(value));
    let newline = if contents.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out = String::with_capacity(contents.len() + entry.len() + newline.len());
    let mut replaced = false;

    for line in contents.split_inclusive('\n') {
        let (body, terminator) = split_terminator(line);
        if !replaced && split_entry(body).is_some_and(|(k, _)| k == key) {
            out.push_str(&entry);
            out.push_str(terminator);
            replaced = true;
        } else {
            out.push_str(line);
        }
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push_str(newline);
        }
        out.push_str(&entry);
        out.push_str(newline);
    }
    out
}

/// The server's property file on disk.
#[derive(Debug, Clone)]
pub struct PropertyFile {
    path: PathBuf,
}

impl PropertyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole file; a missing file reads as empty
    pub fn read(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::PropertyFile(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lookup(&self.read()?, key))
    }

    /// Replace or append `key`, writing through a temp file and rename
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let updated = upsert(&self.read()?, key, value);

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, updated.as_bytes())
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                Error::PropertyFile(format!("Failed to write {}: {}", self.path.display(), e))
            })
    }
}
