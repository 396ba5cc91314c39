use tracing::debug;

use crate::handle::Connection;
use crate::types::*;

impl Connection {
    /// Best-effort liveness check.
    ///
    /// A driver that supports `SQL_ATTR_CONNECTION_DEAD` and reports the
    /// connection dead is believed. Otherwise the read-only flag is fetched
    /// with `SQLGetInfo`; a non-empty answer counts as alive. Some backends
    /// answer that from cached state, so a dead link can still pass.
    pub fn check_liveness(&self) -> bool {
        let Some(dbc) = self.raw_dbc() else {
            return false;
        };

        let mut dead: SQLULEN = SQL_CD_FALSE;
        let rc = self
            .client
            .get_connect_attr(dbc, SQL_ATTR_CONNECTION_DEAD, &mut dead);
        if rc == SQL_SUCCESS && dead == SQL_CD_TRUE {
            debug!(dbc, "driver reports connection dead");
            return false;
        }

        let mut buf = [0u8; 32];
        let mut len: SQLSMALLINT = 0;
        let rc = self
            .client
            .get_info(dbc, SQL_DATA_SOURCE_READ_ONLY, &mut buf, &mut len);
        let alive = rc == SQL_SUCCESS && len > 0;
        debug!(dbc, alive, "probed SQL_DATA_SOURCE_READ_ONLY");
        alive
    }
}
