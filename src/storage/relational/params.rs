//! Named SQL parameters.
//!
//! Statements are written with `:name` placeholders and a map of values. Before
//! execution the text is rewritten to positional `?` markers and the values are
//! ordered to match. Quoted strings and identifiers (with backslash escapes), comments,
//! `::` casts and `\:` escapes are passed through untouched.

use std::collections::HashMap;

use super::row::SqlValue;
use crate::error_handling::StoreError;

/// Named parameter values for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlParams(HashMap<String, SqlValue>);

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for SqlParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = SqlParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// A statement ready for positional binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Rewrites `:name` placeholders to `?` and collects values in placeholder order.
///
/// Without `params` the text is returned unchanged and nothing is bound.
///
/// # Errors
///
/// `StoreError::InvalidParameters` if a placeholder has no value.
pub fn bind_named(sql: &str, params: Option<&SqlParams>) -> Result<BoundStatement, StoreError> {
    let Some(params) = params else {
        return Ok(BoundStatement {
            sql: sql.to_string(),
            values: Vec::new(),
        });
    };

    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' && q != '`' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '#' => {
                out.push(c);
                copy_until(&mut chars, &mut out, "\n");
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push_str("--");
                chars.next();
                // MySQL only treats `--` as a comment when whitespace follows
                if chars.peek().map_or(true, |&(_, n)| n.is_whitespace()) {
                    copy_until(&mut chars, &mut out, "\n");
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push_str("/*");
                chars.next();
                copy_until(&mut chars, &mut out, "*/");
            }
            '\\' if matches!(chars.peek(), Some((_, ':'))) => {
                out.push(':');
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                out.push_str("::");
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, n)) if n.is_ascii_alphabetic() || *n == '_') => {
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = j + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &sql[start..end];
                let value = params.get(name).ok_or_else(|| {
                    StoreError::InvalidParameters(format!("no value supplied for :{name}"))
                })?;
                values.push(value.clone());
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    Ok(BoundStatement { sql: out, values })
}

/// Copies everything up to and including `end` verbatim. An unterminated comment
/// runs to the end of the statement.
fn copy_until(chars: &mut impl Iterator<Item = (usize, char)>, out: &mut String, end: &str) {
    let start = out.len();
    for (_, c) in chars {
        out.push(c);
        if out[start..].ends_with(end) {
            return;
        }
    }
}
