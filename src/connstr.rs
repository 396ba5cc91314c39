//! ODBC connection-string helpers: value quoting, credential splicing and a
//! brace-aware key/value parser.

use std::borrow::Cow;

/// Characters that force a value to be wrapped in `{}`.
const QUOTE_TRIGGERS: &[char] = &['[', ']', '{', '}', '(', ')', ',', ';', '?', '*', '=', '!', '@'];

/// Whether `value` is already a `{...}` quoted value, i.e. it opens with `{`
/// and every `}` before the final one is doubled.
pub fn is_quoted(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.first() != Some(&b'{') {
        return false;
    }
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'}' {
            if bytes.get(i + 1) == Some(&b'}') {
                i += 1;
            } else if i + 1 != bytes.len() {
                return false;
            }
        }
        i += 1;
    }
    true
}

pub fn should_quote(value: &str) -> bool {
    value.contains(QUOTE_TRIGGERS)
}

/// Wrap `value` in braces, doubling any embedded `}`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('{');
    for c in value.chars() {
        if c == '}' {
            out.push('}');
        }
        out.push(c);
    }
    out.push('}');
    out
}

/// Quote `value` unless it is already quoted or needs no quoting.
pub fn quote_if_needed(value: &str) -> Cow<'_, str> {
    if !is_quoted(value) && should_quote(value) {
        Cow::Owned(quote(value))
    } else {
        Cow::Borrowed(value)
    }
}

/// A data source containing `=` is a full connection string.
pub fn is_connection_string(data_source: &str) -> bool {
    data_source.contains('=')
}

fn contains_key(data_source: &str, key: &str) -> bool {
    data_source
        .as_bytes()
        .windows(key.len())
        .any(|window| window.eq_ignore_ascii_case(key.as_bytes()))
}

/// Append `UID=`/`PWD=` clauses for credentials the connection string does not
/// already carry. Returns `None` when nothing had to be added.
pub fn with_credentials(
    data_source: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> Option<String> {
    let uid = username.filter(|_| !contains_key(data_source, "uid="));
    let pwd = password.filter(|_| !contains_key(data_source, "pwd="));
    if uid.is_none() && pwd.is_none() {
        return None;
    }

    let base = data_source.strip_suffix(';').unwrap_or(data_source);
    let mut dsn = String::from(base);
    if let Some(uid) = uid {
        dsn.push_str(";UID=");
        dsn.push_str(&quote_if_needed(uid));
    }
    if let Some(pwd) = pwd {
        dsn.push_str(";PWD=");
        dsn.push_str(&quote_if_needed(pwd));
    }
    dsn.push(';');
    Some(dsn)
}

/// Split a connection string into `(lowercased key, unquoted value)` pairs.
/// Values wrapped in `{}` may contain `;` and use `}}` for a literal `}`.
pub fn parse_pairs(conn_str: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = conn_str.chars().peekable();

    loop {
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' || c == ';' {
                if c == ';' {
                    key.clear();
                    continue;
                }
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_lowercase();
        if key.is_empty() && chars.peek().is_none() {
            break;
        }

        let mut value = String::new();
        while chars.peek() == Some(&' ') {
            chars.next();
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '}' {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        value.push('}');
                        continue;
                    }
                    break;
                }
                value.push(c);
            }
            // skip anything up to the separator
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
                value.push(c);
            }
            value = value.trim().to_string();
        }

        if !key.is_empty() {
            pairs.push((key, value));
        }
        if chars.peek().is_none() {
            break;
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_left_alone() {
        assert!(!should_quote("scott"));
        assert_eq!(quote_if_needed("scott"), "scott");
    }

    #[test]
    fn quotes_and_doubles_braces() {
        assert!(should_quote("p;ss}word"));
        assert_eq!(quote("p;ss}word"), "{p;ss}}word}");
        assert!(is_quoted(&quote("p;ss}word")));
        assert!(is_quoted(&quote("a}}b}")));
    }

    #[test]
    fn detects_quoted_values() {
        assert!(is_quoted("{abc}"));
        assert!(is_quoted("{a}}b}"));
        assert!(!is_quoted("{a}b}"));
        assert!(!is_quoted("abc"));
        assert_eq!(quote_if_needed("{already;quoted}"), "{already;quoted}");
    }

    #[test]
    fn direct_mode_detection() {
        assert!(is_connection_string("DSN=PHP"));
        assert!(is_connection_string("Driver=x;Server=y"));
        assert!(!is_connection_string("PHP"));
    }

    #[test]
    fn appends_both_credentials() {
        let dsn = with_credentials("Driver=x;Server=y;", Some("scott"), Some("tiger"));
        assert_eq!(dsn.as_deref(), Some("Driver=x;Server=y;UID=scott;PWD=tiger;"));
    }

    #[test]
    fn appends_only_missing_credential() {
        let dsn = with_credentials("DSN=PHP;uid=scott", Some("other"), Some("t;ger"));
        assert_eq!(dsn.as_deref(), Some("DSN=PHP;uid=scott;PWD={t;ger};"));

        let dsn = with_credentials("DSN=PHP;PWD=x", Some("scott"), Some("tiger"));
        assert_eq!(dsn.as_deref(), Some("DSN=PHP;PWD=x;UID=scott;"));
    }

    #[test]
    fn nothing_to_add() {
        assert_eq!(with_credentials("DSN=PHP;UID=a;PWD=b", Some("c"), Some("d")), None);
        assert_eq!(with_credentials("DSN=PHP", None, None), None);
    }

    #[test]
    fn parses_quoted_pairs() {
        let pairs = parse_pairs("DSN=PHP;UID={a;b};PWD={x}}y};Database = db ;");
        assert_eq!(
            pairs,
            vec![
                ("dsn".to_string(), "PHP".to_string()),
                ("uid".to_string(), "a;b".to_string()),
                ("pwd".to_string(), "x}y".to_string()),
                ("database".to_string(), "db".to_string()),
            ]
        );
    }
}
