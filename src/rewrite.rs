//! Named-to-positional placeholder rewriting done before `SQLPrepare`.
//!
//! ODBC drivers only understand `?` markers, so `:name` placeholders are
//! replaced and their names remembered in order. The scanner skips quoted
//! strings, quoted identifiers and comments.

use std::borrow::Cow;

/// Query text after rewriting, with parameter names in marker order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten<'a> {
    pub sql: Cow<'a, str>,
    pub names: Vec<String>,
}

impl Rewritten<'_> {
    pub fn is_rewritten(&self) -> bool {
        matches!(self.sql, Cow::Owned(_))
    }
}

/// The rewriter could not make sense of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteError {
    pub state: String,
    pub message: String,
}

pub trait PlaceholderRewriter: Send + Sync {
    fn rewrite<'a>(&self, sql: &'a str) -> Result<Rewritten<'a>, RewriteError>;
}

/// Default rewriter: `:name` becomes `?`, plain `?` passes through, mixing the
/// two is a syntax error (`HY093`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedPlaceholders;

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl PlaceholderRewriter for NamedPlaceholders {
    fn rewrite<'a>(&self, sql: &'a str) -> Result<Rewritten<'a>, RewriteError> {
        let bytes = sql.as_bytes();
        let mut out: Option<String> = None;
        let mut names = Vec::new();
        let mut positional = 0usize;
        let mut state = State::Normal;
        let mut copied = 0usize;
        let mut idx = 0usize;

        while idx < bytes.len() {
            let b = bytes[idx];
            match state {
                State::Normal => match b {
                    b'\'' => state = State::SingleQuoted,
                    b'"' => state = State::DoubleQuoted,
                    b'-' if bytes.get(idx + 1) == Some(&b'-') => state = State::LineComment,
                    b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                        state = State::BlockComment;
                        idx += 1;
                    }
                    b'?' => positional += 1,
                    b':' if bytes.get(idx + 1) == Some(&b':') => {
                        // `::type` cast
                        idx += 1;
                    }
                    b':' if bytes.get(idx + 1).copied().is_some_and(is_name_byte) => {
                        let start = idx + 1;
                        let mut end = start;
                        while end < bytes.len() && is_name_byte(bytes[end]) {
                            end += 1;
                        }
                        let buf = out.get_or_insert_with(String::new);
                        buf.push_str(&sql[copied..idx]);
                        buf.push('?');
                        names.push(sql[start..end].to_string());
                        copied = end;
                        idx = end;
                        continue;
                    }
                    _ => {}
                },
                State::SingleQuoted => {
                    if b == b'\'' {
                        if bytes.get(idx + 1) == Some(&b'\'') {
                            idx += 1; // escaped quote
                        } else {
                            state = State::Normal;
                        }
                    }
                }
                State::DoubleQuoted => {
                    if b == b'"' {
                        if bytes.get(idx + 1) == Some(&b'"') {
                            idx += 1;
                        } else {
                            state = State::Normal;
                        }
                    }
                }
                State::LineComment => {
                    if b == b'\n' {
                        state = State::Normal;
                    }
                }
                State::BlockComment => {
                    if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                        state = State::Normal;
                        idx += 1;
                    }
                }
            }
            idx += 1;
        }

        if positional > 0 && !names.is_empty() {
            return Err(RewriteError {
                state: "HY093".to_string(),
                message: "Invalid parameter number: mixed named and positional parameters"
                    .to_string(),
            });
        }

        let sql = match out {
            Some(mut buf) => {
                buf.push_str(&sql[copied..]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(sql),
        };
        Ok(Rewritten { sql, names })
    }
}
