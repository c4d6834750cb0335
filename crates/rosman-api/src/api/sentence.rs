//! Command sentences and reply parsing.
//!
//! A request is the command path word (`/user/print`) followed by
//! attribute words (`=name=value`). Replies come back as sentences whose
//! first word is `!re` (one data row), `!done` (end of command), `!trap`
//! (command failed) or `!fatal` (connection is dead).

use std::collections::HashMap;

pub const REPLY_RE: &str = "!re";
pub const REPLY_DONE: &str = "!done";
pub const REPLY_TRAP: &str = "!trap";
pub const REPLY_FATAL: &str = "!fatal";

// ── Outgoing commands ───────────────────────────────────────────────

/// Builder for one command sentence.
#[derive(Debug, Clone)]
pub struct Command {
    path: String,
    words: Vec<String>,
}

impl Command {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), words: Vec::new() }
    }

    /// Add an `=key=value` attribute word.
    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.words.push(format!("={key}={value}"));
        self
    }

    /// Add a bare `=key` word, used by commands such as `/export =terse`
    /// that take value-less switches.
    pub fn flag(mut self, key: &str) -> Self {
        self.words.push(format!("={key}"));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// All words of the sentence, command path first.
    pub fn into_words(self) -> Vec<String> {
        let mut words = Vec::with_capacity(self.words.len() + 1);
        words.push(self.path);
        words.extend(self.words);
        words
    }
}

// ── Incoming sentences ──────────────────────────────────────────────

/// One reply sentence as read off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    pub words: Vec<String>,
}

impl Sentence {
    /// The reply word (`!re`, `!done`, ...), if any.
    pub fn category(&self) -> Option<&str> {
        self.words.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Parse the attribute words into a row. Non-attribute words (the
    /// category itself, `.tag=` words) are skipped.
    pub fn attributes(&self) -> ReplyRow {
        let mut attributes = HashMap::new();
        for word in &self.words {
            if let Some((key, value)) = split_attribute(word) {
                attributes.insert(key.to_string(), value.to_string());
            }
        }
        ReplyRow { attributes }
    }
}

/// Split an `=key=value` word. Bare `=key` words parse as an empty
/// value; anything not starting with `=` is not an attribute.
pub fn split_attribute(word: &str) -> Option<(&str, &str)> {
    let rest = word.strip_prefix('=')?;
    match rest.split_once('=') {
        Some((key, value)) => Some((key, value)),
        None => Some((rest, "")),
    }
}

/// Attributes of a single `!re` (or `!done`) sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyRow {
    attributes: HashMap<String, String>,
}

impl ReplyRow {
    /// Attribute value, or `""` when absent. RouterOS omits attributes
    /// whose value is empty, so lookups treat the two the same way.
    pub fn get(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn opt(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Everything a command produced up to its `!done`.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// One row per `!re` sentence, in arrival order.
    pub rows: Vec<ReplyRow>,
    /// Attributes of the `!done` sentence (e.g. `ret` for `/login`).
    pub done: ReplyRow,
}

impl Reply {
    pub fn done_attr(&self, key: &str) -> Option<&str> {
        self.done.opt(key)
    }
}
