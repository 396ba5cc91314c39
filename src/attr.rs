use tracing::debug;

use crate::error::Result;
use crate::handle::Connection;
use crate::options::Value;
use crate::types::*;

/// Reported for [`Attribute::ClientVersion`]; built locally, no native call.
const CLIENT_VERSION: &str = concat!("ODBC-", env!("CARGO_PKG_NAME"));

/// Buffer size for `SQLGetInfo` string results.
const INFO_BUFFER_LEN: usize = 256;

/// Connection attributes understood by the adapter. Anything else arrives as
/// `Unrecognized` with the host's raw identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Autocommit,
    AssumeUtf8,
    ClientVersion,
    ServerVersion,
    ServerInfo,
    CursorLibrary,
    Prefetch,
    Timeout,
    ConnectionStatus,
    Unrecognized(i64),
}

impl Connection {
    pub fn set_attribute(&self, attribute: Attribute, value: &Value) -> Result<()> {
        match attribute {
            Attribute::AssumeUtf8 => {
                self.assume_utf8.set(value.coerce_bool("assume_utf8")?);
                Ok(())
            }
            Attribute::Autocommit => {
                let requested = value.coerce_bool("autocommit")?;
                if self.in_transaction.get() {
                    return Err(self.adapter_error(
                        "HY000",
                        "Cannot change autocommit mode while a transaction is already open",
                        "setAttribute",
                    ));
                }
                if requested == self.autocommit.get() {
                    return Ok(());
                }
                let dbc = self.live_dbc("setAttribute")?;
                let (native, what) = if requested {
                    (SQL_AUTOCOMMIT_ON, "SQLSetConnectAttr AUTOCOMMIT = ON")
                } else {
                    (SQL_AUTOCOMMIT_OFF, "SQLSetConnectAttr AUTOCOMMIT = OFF")
                };
                let rc = self.client.set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, native);
                if !succeeded(rc) {
                    return Err(self.native_error(SQL_HANDLE_DBC, dbc, what));
                }
                self.autocommit.set(requested);
                debug!(autocommit = requested, "autocommit changed");
                Ok(())
            }
            _ => Err(self.adapter_error("IM001", "Unknown Attribute", "setAttribute")),
        }
    }

    /// `Ok(None)` means the attribute is not handled here and the host should
    /// fall back to its own default.
    pub fn get_attribute(&self, attribute: Attribute) -> Result<Option<Value>> {
        match attribute {
            Attribute::ClientVersion => Ok(Some(Value::Str(CLIENT_VERSION.to_string()))),
            Attribute::ServerVersion => self
                .info_string(SQL_DBMS_VER, "SQLGetInfo: SQL_DBMS_VER")
                .map(|v| Some(Value::Str(v))),
            Attribute::ServerInfo => self
                .info_string(SQL_DBMS_NAME, "SQLGetInfo: SQL_DBMS_NAME")
                .map(|v| Some(Value::Str(v))),
            Attribute::AssumeUtf8 => Ok(Some(Value::Bool(self.assume_utf8.get()))),
            Attribute::Autocommit => Ok(Some(Value::Bool(self.autocommit.get()))),
            _ => Ok(None),
        }
    }

    fn info_string(&self, info_type: SQLUSMALLINT, what: &'static str) -> Result<String> {
        let dbc = self.live_dbc(what)?;
        let mut buf = [0u8; INFO_BUFFER_LEN];
        let mut out_len: SQLSMALLINT = 0;
        let rc = self.client.get_info(dbc, info_type, &mut buf, &mut out_len);
        if !succeeded(rc) {
            return Err(self.native_error(SQL_HANDLE_DBC, dbc, what));
        }
        let len = usize::try_from(out_len)
            .unwrap_or(0)
            .min(INFO_BUFFER_LEN - 1);
        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }
}
