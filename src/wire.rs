use crate::types::*;

/// The native client protocol the adapter drives.
///
/// Every call reports its outcome through a `SQLRETURN` code and hands data
/// back through out-parameters, exactly like the ODBC C API. Errors are never
/// returned as values: on failure the implementation attaches diagnostic
/// records to the handle involved, which the caller then drains with
/// [`WireClient::get_diag_rec`].
///
/// Implementations are not required to be reentrant per handle; the adapter
/// issues at most one call at a time on any connection or statement.
pub trait WireClient: Send + Sync {
    /// `SQLAllocHandle`. `input` is `SQL_NULL_HANDLE` for environments, the
    /// environment for connections and the connection for statements.
    fn alloc_handle(
        &self,
        handle_type: SQLSMALLINT,
        input: SQLHANDLE,
        output: &mut SQLHANDLE,
    ) -> SQLRETURN;

    /// `SQLFreeHandle`.
    fn free_handle(&self, handle_type: SQLSMALLINT, handle: SQLHANDLE) -> SQLRETURN;

    fn set_env_attr(&self, env: SQLHANDLE, attribute: SQLINTEGER, value: SQLULEN) -> SQLRETURN;

    fn set_connect_attr(&self, dbc: SQLHANDLE, attribute: SQLINTEGER, value: SQLULEN)
        -> SQLRETURN;

    fn get_connect_attr(
        &self,
        dbc: SQLHANDLE,
        attribute: SQLINTEGER,
        value: &mut SQLULEN,
    ) -> SQLRETURN;

    fn set_stmt_attr(&self, stmt: SQLHANDLE, attribute: SQLINTEGER, value: SQLULEN) -> SQLRETURN;

    /// `SQLConnect`: named data source plus separate credentials.
    fn connect(
        &self,
        dbc: SQLHANDLE,
        server_name: &str,
        user_name: Option<&str>,
        authentication: Option<&str>,
    ) -> SQLRETURN;

    /// `SQLDriverConnect` with `SQL_DRIVER_NOPROMPT`. The completed connection
    /// string is written to `out_connection_string`.
    fn driver_connect(
        &self,
        dbc: SQLHANDLE,
        connection_string: &str,
        out_connection_string: &mut String,
    ) -> SQLRETURN;

    fn disconnect(&self, dbc: SQLHANDLE) -> SQLRETURN;

    fn prepare(&self, stmt: SQLHANDLE, text: &str) -> SQLRETURN;

    fn execute(&self, stmt: SQLHANDLE) -> SQLRETURN;

    fn exec_direct(&self, stmt: SQLHANDLE, text: &str) -> SQLRETURN;

    fn fetch(&self, stmt: SQLHANDLE) -> SQLRETURN;

    fn row_count(&self, stmt: SQLHANDLE, row_count: &mut SQLLEN) -> SQLRETURN;

    fn end_tran(
        &self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
        completion_type: SQLSMALLINT,
    ) -> SQLRETURN;

    /// `SQLGetDiagRec`. Records are numbered from 1; `SQL_NO_DATA` marks the
    /// end of the chain.
    fn get_diag_rec(
        &self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
        rec_number: SQLSMALLINT,
        state: &mut String,
        native_error: &mut SQLINTEGER,
        message: &mut String,
    ) -> SQLRETURN;

    /// `SQLGetInfo` for string-valued info types. At most `buffer.len() - 1`
    /// bytes are written (NUL terminated); `string_length` receives the full
    /// length of the value.
    fn get_info(
        &self,
        dbc: SQLHANDLE,
        info_type: SQLUSMALLINT,
        buffer: &mut [u8],
        string_length: &mut SQLSMALLINT,
    ) -> SQLRETURN;
}
