// ODBC type aliases and the subset of constants the adapter speaks.

pub type SQLSMALLINT = i16;
pub type SQLUSMALLINT = u16;
pub type SQLINTEGER = i32;
pub type SQLUINTEGER = u32;
pub type SQLLEN = isize;
pub type SQLULEN = usize;
pub type SQLRETURN = SQLSMALLINT;

/// Opaque native handle. `SQL_NULL_HANDLE` is never a live handle.
pub type SQLHANDLE = usize;
pub const SQL_NULL_HANDLE: SQLHANDLE = 0;

// Return codes
pub const SQL_SUCCESS: SQLRETURN = 0;
pub const SQL_SUCCESS_WITH_INFO: SQLRETURN = 1;
pub const SQL_NO_DATA: SQLRETURN = 100;
pub const SQL_ERROR: SQLRETURN = -1;
pub const SQL_INVALID_HANDLE: SQLRETURN = -2;

/// `SQL_SUCCEEDED` from the ODBC headers.
pub fn succeeded(rc: SQLRETURN) -> bool {
    rc == SQL_SUCCESS || rc == SQL_SUCCESS_WITH_INFO
}

// Handle types
pub const SQL_HANDLE_ENV: SQLSMALLINT = 1;
pub const SQL_HANDLE_DBC: SQLSMALLINT = 2;
pub const SQL_HANDLE_STMT: SQLSMALLINT = 3;

pub fn handle_type_name(handle_type: SQLSMALLINT) -> &'static str {
    match handle_type {
        SQL_HANDLE_ENV => "ENV",
        SQL_HANDLE_DBC => "DBC",
        SQL_HANDLE_STMT => "STMT",
        _ => "UNKNOWN",
    }
}

// Environment attributes
pub const SQL_ATTR_ODBC_VERSION: SQLINTEGER = 200;
pub const SQL_ATTR_CONNECTION_POOLING: SQLINTEGER = 201;
pub const SQL_ATTR_CP_MATCH: SQLINTEGER = 202;
pub const SQL_OV_ODBC3: SQLULEN = 3;

pub const SQL_CP_OFF: SQLULEN = 0;
pub const SQL_CP_ONE_PER_DRIVER: SQLULEN = 1;
pub const SQL_CP_ONE_PER_HENV: SQLULEN = 2;
pub const SQL_CP_STRICT_MATCH: SQLULEN = 0;
pub const SQL_CP_RELAXED_MATCH: SQLULEN = 1;

// Connection attributes
pub const SQL_ATTR_ODBC_CURSORS: SQLINTEGER = 110;
pub const SQL_ATTR_AUTOCOMMIT: SQLINTEGER = 102;
pub const SQL_ATTR_CONNECTION_DEAD: SQLINTEGER = 1209;

pub const SQL_AUTOCOMMIT_OFF: SQLULEN = 0;
pub const SQL_AUTOCOMMIT_ON: SQLULEN = 1;

pub const SQL_CUR_USE_IF_NEEDED: SQLULEN = 0;
pub const SQL_CUR_USE_ODBC: SQLULEN = 1;
pub const SQL_CUR_USE_DRIVER: SQLULEN = 2;

pub const SQL_CD_TRUE: SQLULEN = 1;
pub const SQL_CD_FALSE: SQLULEN = 0;

// Statement attributes
pub const SQL_ATTR_CURSOR_SCROLLABLE: SQLINTEGER = -1;
pub const SQL_NONSCROLLABLE: SQLULEN = 0;
pub const SQL_SCROLLABLE: SQLULEN = 1;

// SQLEndTran completion types
pub const SQL_COMMIT: SQLSMALLINT = 0;
pub const SQL_ROLLBACK: SQLSMALLINT = 1;

// SQLGetInfo types
pub const SQL_DATA_SOURCE_READ_ONLY: SQLUSMALLINT = 25;
pub const SQL_DBMS_NAME: SQLUSMALLINT = 17;
pub const SQL_DBMS_VER: SQLUSMALLINT = 18;
pub const SQL_DRIVER_NAME: SQLUSMALLINT = 6;
pub const SQL_DATA_SOURCE_NAME: SQLUSMALLINT = 2;
pub const SQL_USER_NAME: SQLUSMALLINT = 47;
