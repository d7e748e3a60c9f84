//! Operator reply parsing.
//!
//! A reply is `<mark>[<separator><description>]`. The first character is the
//! mark; `0` discards the transaction. Anything after the mark (minus one
//! separator) replaces the bank's description.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mark value meaning "do not record this transaction".
pub const DISCARD: char = '0';

/// Single-character category code attached by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark(char);

impl Mark {
    pub fn new(c: char) -> Self {
        Self(c)
    }

    pub fn as_char(&self) -> char {
        self.0
    }

    pub fn is_discard(&self) -> bool {
        self.0 == DISCARD
    }

    /// Human label for the marks offered in the prompt.
    pub fn label(&self) -> Option<&'static str> {
        match self.0 {
            '1' => Some("Useful"),
            '2' => Some("Forced"),
            '3' => Some("Bad"),
            DISCARD => Some("Don't add to spreadsheet"),
            _ => None,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Discard,
    Categorize {
        mark: Mark,
        /// Replacement description; `None` keeps the original.
        description: Option<String>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("empty reply")]
    Empty,
}

pub fn parse_reply(text: &str) -> Result<Reply, ReplyError> {
    let text = text.trim();
    let mut chars = text.chars();
    let mark = Mark::new(chars.next().ok_or(ReplyError::Empty)?);
    if mark.is_discard() {
        return Ok(Reply::Discard);
    }

    let rest = chars.as_str();
    let rest = match rest.chars().next() {
        Some(c) if is_separator(c) => &rest[c.len_utf8()..],
        _ => rest,
    };
    let rest = rest.trim();

    Ok(Reply::Categorize {
        mark,
        description: (!rest.is_empty()).then(|| rest.to_string()),
    })
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | ':' | ',' | '.' | ';' | '|')
}
