use std::cell::{Cell, RefCell};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ErrorInfo, ErrorRecord, NO_ERROR_STATE};
use crate::options::CursorType;
use crate::rewrite::PlaceholderRewriter;
use crate::types::*;
use crate::wire::WireClient;

/// A native handle owned by the adapter. Dropping it calls `SQLFreeHandle`
/// exactly once.
pub struct OwnedHandle {
    client: Arc<dyn WireClient>,
    handle_type: SQLSMALLINT,
    raw: SQLHANDLE,
}

impl OwnedHandle {
    /// `SQLAllocHandle`; on failure the return code is handed back and nothing
    /// is owned.
    pub(crate) fn alloc(
        client: &Arc<dyn WireClient>,
        handle_type: SQLSMALLINT,
        parent: SQLHANDLE,
    ) -> Result<Self, SQLRETURN> {
        let mut raw = SQL_NULL_HANDLE;
        let rc = client.alloc_handle(handle_type, parent, &mut raw);
        if !succeeded(rc) || raw == SQL_NULL_HANDLE {
            return Err(rc);
        }
        debug!(
            handle_type = handle_type_name(handle_type),
            handle = raw,
            "allocated handle"
        );
        Ok(Self {
            client: Arc::clone(client),
            handle_type,
            raw,
        })
    }

    pub fn raw(&self) -> SQLHANDLE {
        self.raw
    }

    pub fn handle_type(&self) -> SQLSMALLINT {
        self.handle_type
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let rc = self.client.free_handle(self.handle_type, self.raw);
        if succeeded(rc) {
            debug!(
                handle_type = handle_type_name(self.handle_type),
                handle = self.raw,
                "released handle"
            );
        } else {
            warn!(
                handle_type = handle_type_name(self.handle_type),
                handle = self.raw,
                rc,
                "SQLFreeHandle failed"
            );
        }
    }
}

/// Connection handle bundle.
///
/// Owns the environment and connection handles. Not `Sync`: the host must
/// serialise calls on one connection. Statements borrow the connection, so
/// none can outlive it.
pub struct Connection {
    // Declaration order is release order: the connection handle goes first.
    pub(crate) dbc: Option<OwnedHandle>,
    pub(crate) env: OwnedHandle,
    pub(crate) client: Arc<dyn WireClient>,
    pub(crate) rewriter: Arc<dyn PlaceholderRewriter>,
    pub(crate) assume_utf8: Cell<bool>,
    pub(crate) autocommit: Cell<bool>,
    pub(crate) in_transaction: Cell<bool>,
    pub(crate) error: RefCell<Option<ErrorRecord>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("dbc", &self.raw_dbc())
            .field("env", &self.raw_env())
            .field("autocommit", &self.autocommit.get())
            .field("in_transaction", &self.in_transaction.get())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn record_error(&self, record: ErrorRecord) {
        self.error.replace(Some(record));
    }

    /// Raw connection handle, if still allocated.
    pub fn raw_dbc(&self) -> Option<SQLHANDLE> {
        self.dbc.as_ref().map(OwnedHandle::raw)
    }

    pub fn raw_env(&self) -> SQLHANDLE {
        self.env.raw()
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit.get()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    pub fn assume_utf8(&self) -> bool {
        self.assume_utf8.get()
    }

    /// Most recent error recorded on the connection.
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.error.borrow().clone()
    }

    /// `(native code, formatted message, SQLSTATE)` of the current error.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.error.borrow().as_ref().and_then(ErrorRecord::info)
    }

    /// SQLSTATE of the current error, `00000` when there is none.
    pub fn error_code(&self) -> String {
        self.error
            .borrow()
            .as_ref()
            .map_or_else(|| NO_ERROR_STATE.to_string(), |r| r.state.clone())
    }
}

/// Statement handle bundle.
pub struct Statement<'conn> {
    pub(crate) conn: &'conn Connection,
    pub(crate) stmt: OwnedHandle,
    pub(crate) assume_utf8: bool,
    pub(crate) cursor: CursorType,
    pub(crate) query: String,
    pub(crate) parameter_names: Vec<String>,
    pub(crate) error: Option<ErrorRecord>,
}

impl<'conn> Statement<'conn> {
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn raw(&self) -> SQLHANDLE {
        self.stmt.raw()
    }

    /// UTF-8 assumption in force when the statement was prepared.
    pub fn assume_utf8(&self) -> bool {
        self.assume_utf8
    }

    pub fn cursor(&self) -> CursorType {
        self.cursor
    }

    /// Query text as sent to `SQLPrepare`.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Names of rewritten `:name` parameters, one per `?` marker.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.error.as_ref().and_then(ErrorRecord::info)
    }

    pub fn error_code(&self) -> &str {
        self.error.as_ref().map_or(NO_ERROR_STATE, |r| r.state.as_str())
    }
}
