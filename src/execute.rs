use tracing::{debug, warn};

use crate::error::{Error, ErrorRecord, Result};
use crate::handle::{Connection, OwnedHandle, Statement};
use crate::options::{CursorType, StatementOptions};
use crate::types::*;

impl Connection {
    /// Rewrite placeholders, allocate a statement handle and `SQLPrepare` it.
    ///
    /// A success-with-info prepare still yields the statement, with the
    /// warning left in its error slot.
    pub fn prepare(&self, sql: &str, options: &StatementOptions) -> Result<Statement<'_>> {
        let rewritten = match self.rewriter.rewrite(sql) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                self.record_error(ErrorRecord::synthesized(
                    &err.state,
                    err.message.clone(),
                    "placeholder rewrite",
                ));
                return Err(Error::Rewrite {
                    state: err.state,
                    message: err.message,
                });
            }
        };

        let dbc = self.live_dbc("SQLAllocStmt")?;
        let stmt = OwnedHandle::alloc(&self.client, SQL_HANDLE_STMT, dbc)
            .map_err(|_| self.native_error(SQL_HANDLE_DBC, dbc, "SQLAllocStmt"))?;

        let mut statement = Statement {
            conn: self,
            stmt,
            assume_utf8: self.assume_utf8.get(),
            cursor: options.cursor,
            query: rewritten.sql.into_owned(),
            parameter_names: rewritten.names,
            error: None,
        };

        if statement.cursor == CursorType::Scroll {
            let rc =
                self.client
                    .set_stmt_attr(statement.raw(), SQL_ATTR_CURSOR_SCROLLABLE, SQL_SCROLLABLE);
            if !succeeded(rc) {
                return Err(statement.fail("SQLSetStmtAttr: SQL_ATTR_CURSOR_SCROLLABLE"));
            }
        }

        let rc = self.client.prepare(statement.raw(), &statement.query);
        match rc {
            SQL_SUCCESS => {}
            SQL_SUCCESS_WITH_INFO => {
                statement.capture("SQLPrepare");
                warn!(state = statement.error_code(), "SQLPrepare returned a warning");
            }
            _ => {
                let err = statement.fail("SQLPrepare");
                if let Some(record) = err.record() {
                    self.record_error(record.clone());
                }
                return Err(err);
            }
        }

        debug!(
            handle = statement.raw(),
            parameters = statement.parameter_names.len(),
            "prepared statement"
        );
        Ok(statement)
    }

    /// Run `sql` once on a throwaway statement handle and return the number
    /// of affected rows. Nothing is returned to the caller for result sets.
    pub fn exec(&self, sql: &str) -> Result<u64> {
        let dbc = self.live_dbc("SQLAllocHandle: STMT")?;
        let stmt = OwnedHandle::alloc(&self.client, SQL_HANDLE_STMT, dbc)
            .map_err(|_| self.native_error(SQL_HANDLE_DBC, dbc, "SQLAllocHandle: STMT"))?;

        let rc = self.client.exec_direct(stmt.raw(), sql);
        if rc == SQL_NO_DATA {
            // searched UPDATE/DELETE that matched nothing
            return Ok(0);
        }
        if !succeeded(rc) {
            return Err(self.native_error(SQL_HANDLE_STMT, stmt.raw(), "SQLExecDirect"));
        }

        let mut row_count: SQLLEN = -1;
        let rc = self.client.row_count(stmt.raw(), &mut row_count);
        if !succeeded(rc) {
            return Err(self.native_error(SQL_HANDLE_STMT, stmt.raw(), "SQLRowCount"));
        }
        Ok(u64::try_from(row_count).unwrap_or(0))
    }
}
