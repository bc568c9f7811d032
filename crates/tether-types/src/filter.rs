//! LDAP-style service filters.
//!
//! Supported syntax:
//!
//! - `(key=value)` equality, with `*` wildcards inside the value
//! - `(key=*)` presence
//! - `(&(..)(..))`, `(|(..)(..))`, `(!(..))` composition
//! - `\(`, `\)`, `\*` and `\\` escapes inside values
//!
//! A bare `key=value` without surrounding parentheses is accepted as well.
//! Equality against a comma-separated property (e.g. `objectClass`) matches
//! when the whole value or any single item of the list matches.

use crate::error::RsaError;
use crate::properties::Properties;
use std::fmt;
use std::str::FromStr;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `key=value`; `chunks` are the literal pieces between wildcards, so an
    /// exact match has exactly one chunk.
    Equal { key: String, chunks: Vec<String> },
    Present(String),
}

impl Filter {
    /// Exact equality filter on one key.
    pub fn equal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equal {
            key: key.into(),
            chunks: vec![value.into()],
        }
    }

    /// Evaluate the filter against a property map.
    pub fn matches(&self, props: &Properties) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(props)),
            Filter::Or(items) => items.iter().any(|f| f.matches(props)),
            Filter::Not(inner) => !inner.matches(props),
            Filter::Present(key) => props.contains_key(key),
            Filter::Equal { key, chunks } => match props.get(key) {
                Some(value) => {
                    chunks_match(chunks, value)
                        || (value.contains(',')
                            && value.split(',').any(|item| chunks_match(chunks, item.trim())))
                }
                None => false,
            },
        }
    }
}

fn chunks_match(chunks: &[String], value: &str) -> bool {
    if chunks.len() == 1 {
        return chunks[0] == value;
    }
    let first = &chunks[0];
    let last = &chunks[chunks.len() - 1];
    let Some(mut rest) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    for middle in &chunks[1..chunks.len() - 1] {
        match rest.find(middle.as_str()) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last.as_str())
}

impl FromStr for Filter {
    type Err = RsaError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RsaError::IllegalArgument("empty filter".into()));
        }
        let owned;
        let source = if trimmed.starts_with('(') {
            trimmed
        } else {
            owned = format!("({trimmed})");
            owned.as_str()
        };
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        parser.skip_ws();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(filter)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn error(&self, msg: &str) -> RsaError {
        RsaError::IllegalArgument(format!("invalid filter at offset {}: {msg}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), RsaError> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, RsaError> {
        self.expect('(')?;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end")),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, RsaError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some('(') {
                break;
            }
            items.push(self.parse_filter()?);
        }
        if items.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, RsaError> {
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if c == '=' {
                break;
            }
            if matches!(c, '(' | ')' | '*') {
                return Err(self.error("invalid character in key"));
            }
            key.push(c);
            self.pos += 1;
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error("missing key"));
        }
        self.expect('=')?;

        let mut chunks = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('*') => {
                    chunks.push(String::new());
                    self.pos += 1;
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    if let Some(last) = chunks.last_mut() {
                        last.push(escaped);
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    if let Some(last) = chunks.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
            }
        }

        if chunks.len() == 2 && chunks.iter().all(String::is_empty) {
            return Ok(Filter::Present(key));
        }
        Ok(Filter::Equal { key, chunks })
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                write!(f, "(&")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Filter::Or(items) => {
                write!(f, "(|")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Present(key) => write!(f, "({key}=*)"),
            Filter::Equal { key, chunks } => {
                let value: Vec<String> = chunks.iter().map(|c| escape(c)).collect();
                write!(f, "({key}={})", value.join("*"))
            }
        }
    }
}
