use tracing::{trace, warn};

use crate::diagnostics::collect;
use crate::error::{Error, ErrorRecord, Result};
use crate::handle::Statement;
use crate::types::*;

impl Statement<'_> {
    /// `SQLExecute` the prepared query. `SQL_NO_DATA` (nothing affected) is
    /// not an error.
    pub fn execute(&mut self) -> Result<()> {
        let rc = self.conn.client.execute(self.raw());
        match rc {
            SQL_SUCCESS | SQL_NO_DATA => Ok(()),
            SQL_SUCCESS_WITH_INFO => {
                self.capture("SQLExecute");
                warn!(state = self.error_code(), "SQLExecute returned a warning");
                Ok(())
            }
            _ => Err(self.fail("SQLExecute")),
        }
    }

    /// Advance the cursor. `Ok(false)` once the result set is exhausted.
    pub fn fetch(&mut self) -> Result<bool> {
        let rc = self.conn.client.fetch(self.raw());
        trace!(handle = self.raw(), rc, "SQLFetch");
        match rc {
            SQL_NO_DATA => Ok(false),
            SQL_SUCCESS => Ok(true),
            SQL_SUCCESS_WITH_INFO => {
                self.capture("SQLFetch");
                warn!(state = self.error_code(), "SQLFetch returned a warning");
                Ok(true)
            }
            _ => Err(self.fail("SQLFetch")),
        }
    }

    /// Rows affected by the last execute; drivers reporting `-1` give 0.
    pub fn row_count(&mut self) -> Result<u64> {
        let mut count: SQLLEN = -1;
        let rc = self.conn.client.row_count(self.raw(), &mut count);
        if !succeeded(rc) {
            return Err(self.fail("SQLRowCount"));
        }
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Pull the statement's diagnostics into its own error slot.
    #[track_caller]
    pub(crate) fn capture(&mut self, what: &'static str) -> &ErrorRecord {
        let record = collect(self.conn.client.as_ref(), SQL_HANDLE_STMT, self.raw(), what);
        self.error.insert(record)
    }

    #[track_caller]
    pub(crate) fn fail(&mut self, what: &'static str) -> Error {
        Error::Native(self.capture(what).clone())
    }
}
