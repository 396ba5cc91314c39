use std::fmt;
use std::sync::Arc;

use crate::attr::Attribute;
use crate::error::{Error, Result};
use crate::rewrite::{NamedPlaceholders, PlaceholderRewriter};
use crate::types::*;

/// Generic attribute / option value as handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// Weak boolean coercion: integers are true when non-zero, strings unless
    /// empty or `"0"`. `Null` is rejected.
    pub fn coerce_bool(&self, option: &'static str) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Str(s) => Ok(!(s.is_empty() || s == "0")),
            Value::Null => Err(Error::InvalidOption {
                option,
                reason: "expected a boolean, got null".to_string(),
            }),
        }
    }

    pub fn coerce_int(&self, option: &'static str) -> Result<i64> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            Value::Str(s) => s.trim().parse().map_err(|_| Error::InvalidOption {
                option,
                reason: format!("expected an integer, got {s:?}"),
            }),
            Value::Null => Err(Error::InvalidOption {
                option,
                reason: "expected an integer, got null".to_string(),
            }),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// Whether the ODBC cursor library shim is loaded (`SQL_ATTR_ODBC_CURSORS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorLibrary {
    #[default]
    UseIfNeeded,
    UseOdbc,
    UseDriver,
}

impl CursorLibrary {
    pub fn native(self) -> SQLULEN {
        match self {
            CursorLibrary::UseIfNeeded => SQL_CUR_USE_IF_NEEDED,
            CursorLibrary::UseOdbc => SQL_CUR_USE_ODBC,
            CursorLibrary::UseDriver => SQL_CUR_USE_DRIVER,
        }
    }

    pub fn from_native(value: SQLULEN) -> Option<Self> {
        match value {
            SQL_CUR_USE_IF_NEEDED => Some(CursorLibrary::UseIfNeeded),
            SQL_CUR_USE_ODBC => Some(CursorLibrary::UseOdbc),
            SQL_CUR_USE_DRIVER => Some(CursorLibrary::UseDriver),
            _ => None,
        }
    }
}

/// Driver-manager connection pooling (`SQL_ATTR_CONNECTION_POOLING`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pooling {
    #[default]
    Off,
    OnePerDriver,
    OnePerEnv,
}

impl Pooling {
    pub fn native(self) -> SQLULEN {
        match self {
            Pooling::Off => SQL_CP_OFF,
            Pooling::OnePerDriver => SQL_CP_ONE_PER_DRIVER,
            Pooling::OnePerEnv => SQL_CP_ONE_PER_HENV,
        }
    }
}

/// How pooled connections are matched (`SQL_ATTR_CP_MATCH`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolMatch {
    #[default]
    Strict,
    Relaxed,
}

impl PoolMatch {
    pub fn native(self) -> SQLULEN {
        match self {
            PoolMatch::Strict => SQL_CP_STRICT_MATCH,
            PoolMatch::Relaxed => SQL_CP_RELAXED_MATCH,
        }
    }
}

/// Options applied while building a connection.
#[derive(Clone)]
pub struct ConnectOptions {
    pub autocommit: bool,
    pub assume_utf8: bool,
    pub cursor_library: CursorLibrary,
    pub pooling: Pooling,
    pub pool_match: PoolMatch,
    pub rewriter: Arc<dyn PlaceholderRewriter>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self {
            autocommit: true,
            assume_utf8: false,
            cursor_library: CursorLibrary::default(),
            pooling: Pooling::default(),
            pool_match: PoolMatch::default(),
            rewriter: Arc::new(NamedPlaceholders),
        }
    }

    #[must_use]
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    #[must_use]
    pub fn assume_utf8(mut self, assume_utf8: bool) -> Self {
        self.assume_utf8 = assume_utf8;
        self
    }

    #[must_use]
    pub fn cursor_library(mut self, cursor_library: CursorLibrary) -> Self {
        self.cursor_library = cursor_library;
        self
    }

    #[must_use]
    pub fn pooling(mut self, pooling: Pooling, pool_match: PoolMatch) -> Self {
        self.pooling = pooling;
        self.pool_match = pool_match;
        self
    }

    #[must_use]
    pub fn rewriter(mut self, rewriter: Arc<dyn PlaceholderRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Apply one entry of a host driver-options map. Attributes that only make
    /// sense on an open connection are ignored here.
    pub fn set(&mut self, attribute: Attribute, value: &Value) -> Result<()> {
        match attribute {
            Attribute::Autocommit => self.autocommit = value.coerce_bool("autocommit")?,
            Attribute::AssumeUtf8 => self.assume_utf8 = value.coerce_bool("assume_utf8")?,
            Attribute::CursorLibrary => {
                let raw = value.coerce_int("cursor_library")?;
                self.cursor_library = usize::try_from(raw)
                    .ok()
                    .and_then(CursorLibrary::from_native)
                    .ok_or_else(|| Error::InvalidOption {
                        option: "cursor_library",
                        reason: format!("unknown cursor library mode {raw}"),
                    })?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("autocommit", &self.autocommit)
            .field("assume_utf8", &self.assume_utf8)
            .field("cursor_library", &self.cursor_library)
            .field("pooling", &self.pooling)
            .field("pool_match", &self.pool_match)
            .finish_non_exhaustive()
    }
}

/// Cursor requested for a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    #[default]
    ForwardOnly,
    Scroll,
}

/// Per-statement driver options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementOptions {
    pub cursor: CursorType,
}

impl StatementOptions {
    #[must_use]
    pub fn with_cursor(mut self, cursor: CursorType) -> Self {
        self.cursor = cursor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_coercion() {
        assert!(Value::Bool(true).coerce_bool("x").unwrap());
        assert!(Value::Int(2).coerce_bool("x").unwrap());
        assert!(!Value::Int(0).coerce_bool("x").unwrap());
        assert!(!Value::from("0").coerce_bool("x").unwrap());
        assert!(!Value::from("").coerce_bool("x").unwrap());
        assert!(Value::from("yes").coerce_bool("x").unwrap());
        assert!(matches!(
            Value::Null.coerce_bool("x"),
            Err(Error::InvalidOption { option: "x", .. })
        ));
    }

    #[test]
    fn defaults() {
        let options = ConnectOptions::default();
        assert!(options.autocommit);
        assert!(!options.assume_utf8);
        assert_eq!(options.cursor_library, CursorLibrary::UseIfNeeded);
        assert_eq!(options.pooling, Pooling::Off);
        assert_eq!(StatementOptions::default().cursor, CursorType::ForwardOnly);
    }

    #[test]
    fn driver_options_map() {
        let mut options = ConnectOptions::default();
        options.set(Attribute::Autocommit, &Value::Int(0)).unwrap();
        options.set(Attribute::AssumeUtf8, &Value::from("1")).unwrap();
        options
            .set(Attribute::CursorLibrary, &Value::Int(SQL_CUR_USE_DRIVER as i64))
            .unwrap();
        options.set(Attribute::Timeout, &Value::Int(30)).unwrap();

        assert!(!options.autocommit);
        assert!(options.assume_utf8);
        assert_eq!(options.cursor_library, CursorLibrary::UseDriver);

        let err = options
            .set(Attribute::CursorLibrary, &Value::Int(9))
            .unwrap_err();
        assert!(err.to_string().contains("unknown cursor library mode 9"));
    }
}
