use std::cell::{Cell, RefCell};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::connstr;
use crate::diagnostics::collect;
use crate::error::{Error, ErrorRecord, Result};
use crate::handle::{Connection, OwnedHandle};
use crate::options::{ConnectOptions, CursorLibrary, Pooling};
use crate::types::*;
use crate::wire::WireClient;

#[track_caller]
fn bootstrap_error(
    client: &Arc<dyn WireClient>,
    handle_type: SQLSMALLINT,
    handle: SQLHANDLE,
    what: &'static str,
) -> Error {
    let record = collect(client.as_ref(), handle_type, handle, what);
    warn!(what, state = %record.state, "connection bootstrap failed");
    Error::Connect(record)
}

impl Connection {
    /// Build the environment → connection handle chain and connect.
    ///
    /// `data_source` containing `=` is passed to `SQLDriverConnect` as a full
    /// connection string (with `UID`/`PWD` spliced in when the string lacks
    /// them); anything else is a DSN name for `SQLConnect`. On failure every
    /// handle allocated so far is released, connection before environment,
    /// and the first diagnostic record comes back as [`Error::Connect`].
    pub fn open(
        client: Arc<dyn WireClient>,
        data_source: &str,
        username: Option<&str>,
        password: Option<&str>,
        options: &ConnectOptions,
    ) -> Result<Self> {
        // Pooling is a process-level attribute: it goes on the null handle
        // before any environment exists.
        if options.pooling != Pooling::Off {
            let rc = client.set_env_attr(
                SQL_NULL_HANDLE,
                SQL_ATTR_CONNECTION_POOLING,
                options.pooling.native(),
            );
            if !succeeded(rc) {
                return Err(bootstrap_error(
                    &client,
                    SQL_HANDLE_ENV,
                    SQL_NULL_HANDLE,
                    "SQLSetEnvAttr: SQL_ATTR_CONNECTION_POOLING",
                ));
            }
        }

        let env = OwnedHandle::alloc(&client, SQL_HANDLE_ENV, SQL_NULL_HANDLE).map_err(|_| {
            bootstrap_error(&client, SQL_HANDLE_ENV, SQL_NULL_HANDLE, "SQLAllocHandle: ENV")
        })?;

        let rc = client.set_env_attr(env.raw(), SQL_ATTR_ODBC_VERSION, SQL_OV_ODBC3);
        if !succeeded(rc) {
            return Err(bootstrap_error(
                &client,
                SQL_HANDLE_ENV,
                env.raw(),
                "SQLSetEnvAttr: ODBC3",
            ));
        }

        if options.pooling != Pooling::Off {
            let rc = client.set_env_attr(env.raw(), SQL_ATTR_CP_MATCH, options.pool_match.native());
            if !succeeded(rc) {
                return Err(bootstrap_error(
                    &client,
                    SQL_HANDLE_ENV,
                    env.raw(),
                    "SQLSetEnvAttr: SQL_ATTR_CP_MATCH",
                ));
            }
        }

        // Locals drop in reverse order, so on any early return below the
        // connection handle is released before the environment.
        let dbc = OwnedHandle::alloc(&client, SQL_HANDLE_DBC, env.raw()).map_err(|_| {
            bootstrap_error(&client, SQL_HANDLE_ENV, env.raw(), "SQLAllocHandle: DBC")
        })?;

        let autocommit = if options.autocommit {
            SQL_AUTOCOMMIT_ON
        } else {
            SQL_AUTOCOMMIT_OFF
        };
        let rc = client.set_connect_attr(dbc.raw(), SQL_ATTR_AUTOCOMMIT, autocommit);
        if !succeeded(rc) {
            return Err(bootstrap_error(
                &client,
                SQL_HANDLE_DBC,
                dbc.raw(),
                "SQLSetConnectAttr AUTOCOMMIT",
            ));
        }

        let rc = client.set_connect_attr(
            dbc.raw(),
            SQL_ATTR_ODBC_CURSORS,
            options.cursor_library.native(),
        );
        if !succeeded(rc) {
            if options.cursor_library != CursorLibrary::UseIfNeeded {
                return Err(bootstrap_error(
                    &client,
                    SQL_HANDLE_DBC,
                    dbc.raw(),
                    "SQLSetConnectAttr SQL_ODBC_CURSORS",
                ));
            }
            debug!(rc, "driver manager rejected SQL_ODBC_CURSORS, continuing");
        }

        // "DSN=PHP" is a connection string even without a `;`
        let direct = connstr::is_connection_string(data_source);
        let rc = if direct {
            let spliced = connstr::with_credentials(data_source, username, password);
            debug!(
                credentials_spliced = spliced.is_some(),
                "connecting with SQLDriverConnect"
            );
            let mut completed = String::new();
            client.driver_connect(
                dbc.raw(),
                spliced.as_deref().unwrap_or(data_source),
                &mut completed,
            )
        } else {
            debug!(dsn = data_source, "connecting with SQLConnect");
            client.connect(dbc.raw(), data_source, username, password)
        };
        if !succeeded(rc) {
            let what = if direct {
                "SQLDriverConnect"
            } else {
                "SQLConnect"
            };
            return Err(bootstrap_error(&client, SQL_HANDLE_DBC, dbc.raw(), what));
        }

        Ok(Connection {
            dbc: Some(dbc),
            env,
            rewriter: Arc::clone(&options.rewriter),
            client,
            assume_utf8: Cell::new(options.assume_utf8),
            autocommit: Cell::new(options.autocommit),
            in_transaction: Cell::new(false),
            error: RefCell::new(None),
        })
    }

    /// Roll back, disconnect and release both handles.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(dbc) = self.dbc.take() else {
            return;
        };
        let rc = self.client.end_tran(SQL_HANDLE_DBC, dbc.raw(), SQL_ROLLBACK);
        if !succeeded(rc) {
            warn!(rc, "rollback on close failed");
        }
        let rc = self.client.disconnect(dbc.raw());
        if !succeeded(rc) {
            warn!(rc, "SQLDisconnect failed");
        }
        self.in_transaction.set(false);
        drop(dbc);
    }

    /// Connection handle, or a synthesized `08003` when it was released.
    #[track_caller]
    pub(crate) fn live_dbc(&self, what: &'static str) -> Result<SQLHANDLE> {
        match self.dbc.as_ref() {
            Some(dbc) => Ok(dbc.raw()),
            None => {
                let record = ErrorRecord::synthesized("08003", "Connection does not exist", what);
                self.record_error(record.clone());
                Err(Error::Adapter(record))
            }
        }
    }

    /// Collect diagnostics from `handle` into the connection's error slot.
    #[track_caller]
    pub(crate) fn native_error(
        &self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
        what: &'static str,
    ) -> Error {
        let record = collect(self.client.as_ref(), handle_type, handle, what);
        self.record_error(record.clone());
        Error::Native(record)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
