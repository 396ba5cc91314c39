use tracing::{debug, warn};

use crate::error::{Error, ErrorRecord, Result};
use crate::handle::Connection;
use crate::types::*;

impl Connection {
    /// Open a manual transaction by switching native autocommit off.
    pub fn begin(&self) -> Result<()> {
        if self.in_transaction.get() {
            return Err(self.adapter_error(
                "HY000",
                "There is already an active transaction",
                "beginTransaction",
            ));
        }
        let dbc = self.live_dbc("beginTransaction")?;
        if self.autocommit.get() {
            let rc = self
                .client
                .set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, SQL_AUTOCOMMIT_OFF);
            if !succeeded(rc) {
                return Err(self.native_error(
                    SQL_HANDLE_DBC,
                    dbc,
                    "SQLSetConnectAttr AUTOCOMMIT = OFF",
                ));
            }
        }
        self.in_transaction.set(true);
        debug!(dbc, "transaction started");
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.end_transaction(SQL_COMMIT, "commit", "SQLEndTran: Commit")
    }

    pub fn rollback(&self) -> Result<()> {
        self.end_transaction(SQL_ROLLBACK, "rollBack", "SQLEndTran: Rollback")
    }

    fn end_transaction(
        &self,
        completion: SQLSMALLINT,
        operation: &'static str,
        what: &'static str,
    ) -> Result<()> {
        if !self.in_transaction.get() {
            return Err(self.adapter_error("HY000", "There is no active transaction", operation));
        }
        let dbc = self.live_dbc(operation)?;

        let rc = self.client.end_tran(SQL_HANDLE_DBC, dbc, completion);
        match rc {
            SQL_SUCCESS => {}
            SQL_SUCCESS_WITH_INFO => {
                let err = self.native_error(SQL_HANDLE_DBC, dbc, what);
                warn!(state = err.sqlstate(), what, "transaction completed with a warning");
            }
            _ => return Err(self.native_error(SQL_HANDLE_DBC, dbc, what)),
        }

        // the transaction stays open until native autocommit is restored
        if self.autocommit.get() {
            let rc = self
                .client
                .set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, SQL_AUTOCOMMIT_ON);
            if !succeeded(rc) {
                return Err(self.native_error(
                    SQL_HANDLE_DBC,
                    dbc,
                    "SQLSetConnectAttr AUTOCOMMIT = ON",
                ));
            }
        }
        self.in_transaction.set(false);
        debug!(dbc, what, "transaction finished");
        Ok(())
    }

    #[track_caller]
    pub(crate) fn adapter_error(
        &self,
        state: &str,
        message: &str,
        what: &'static str,
    ) -> Error {
        let record = ErrorRecord::synthesized(state, message, what);
        self.record_error(record.clone());
        Error::Adapter(record)
    }
}
