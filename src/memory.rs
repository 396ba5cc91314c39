//! In-process wire client emulating an ODBC driver manager.
//!
//! `MemoryDriver` keeps environment, connection and statement handles in
//! memory, follows the ODBC handle state rules the adapter depends on (ODBC
//! version before connection allocation, disconnect before free, diagnostics
//! cleared on every call) and lets callers script query results and inject
//! failures with attached diagnostic chains. Every call is recorded so tests can
//! assert on the exact native call sequence.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::connstr;
use crate::types::*;
use crate::wire::WireClient;

/// Diagnostic record attached to a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    pub state: String, // 5-char SQLSTATE e.g. "HY000"
    pub native_error: SQLINTEGER,
    pub message: String,
}

impl DiagRecord {
    pub fn new(state: &str, native_error: SQLINTEGER, message: &str) -> Self {
        Self {
            state: state.to_string(),
            native_error,
            message: message.to_string(),
        }
    }
}

/// A recorded native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AllocHandle {
        handle_type: SQLSMALLINT,
        input: SQLHANDLE,
    },
    FreeHandle {
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
    },
    SetEnvAttr {
        env: SQLHANDLE,
        attribute: SQLINTEGER,
        value: SQLULEN,
    },
    SetConnectAttr {
        attribute: SQLINTEGER,
        value: SQLULEN,
    },
    GetConnectAttr {
        attribute: SQLINTEGER,
    },
    SetStmtAttr {
        attribute: SQLINTEGER,
        value: SQLULEN,
    },
    Connect {
        server_name: String,
        user_name: Option<String>,
        authentication: Option<String>,
    },
    DriverConnect {
        connection_string: String,
    },
    Disconnect,
    Prepare {
        text: String,
    },
    Execute,
    ExecDirect {
        text: String,
    },
    Fetch,
    RowCount,
    EndTran {
        completion_type: SQLSMALLINT,
    },
    GetDiagRec {
        handle_type: SQLSMALLINT,
        rec_number: SQLSMALLINT,
    },
    GetInfo {
        info_type: SQLUSMALLINT,
    },
}

/// Call site a [`Fault`] can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    AllocEnv,
    AllocDbc,
    AllocStmt,
    SetEnvAttr(SQLINTEGER),
    SetConnectAttr(SQLINTEGER),
    GetConnectAttr(SQLINTEGER),
    SetStmtAttr(SQLINTEGER),
    Connect,
    DriverConnect,
    Disconnect,
    Prepare,
    Execute,
    ExecDirect,
    Fetch,
    RowCount,
    EndTran,
    GetInfo(SQLUSMALLINT),
}

/// Outcome forced onto the next call of an [`Op`].
///
/// With `SQL_SUCCESS_WITH_INFO` the call still takes effect; any other code
/// aborts it. The records are attached to the handle the call operates on
/// (the parent handle for allocations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub rc: SQLRETURN,
    pub records: Vec<DiagRecord>,
}

impl Fault {
    pub fn error(records: Vec<DiagRecord>) -> Self {
        Self {
            rc: SQL_ERROR,
            records,
        }
    }

    pub fn with_info(records: Vec<DiagRecord>) -> Self {
        Self {
            rc: SQL_SUCCESS_WITH_INFO,
            records,
        }
    }

    pub fn no_data() -> Self {
        Self {
            rc: SQL_NO_DATA,
            records: Vec::new(),
        }
    }

    pub fn invalid_handle() -> Self {
        Self {
            rc: SQL_INVALID_HANDLE,
            records: Vec::new(),
        }
    }
}

/// Result a statement text produces when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedResult {
    pub row_count: SQLLEN,
    pub rows: usize,
    pub no_data: bool,
}

impl ScriptedResult {
    /// A DML statement touching `count` rows.
    pub fn affected(count: SQLLEN) -> Self {
        Self {
            row_count: count,
            rows: 0,
            no_data: false,
        }
    }

    /// A query producing `rows` rows; the row count is unknown (-1).
    pub fn rows(rows: usize) -> Self {
        Self {
            row_count: -1,
            rows,
            no_data: false,
        }
    }

    /// A searched UPDATE/DELETE that matched nothing: execution returns `SQL_NO_DATA`.
    pub fn no_data() -> Self {
        Self {
            row_count: 0,
            rows: 0,
            no_data: true,
        }
    }
}

impl Default for ScriptedResult {
    fn default() -> Self {
        Self::affected(-1)
    }
}

struct Environment {
    odbc_version: SQLULEN,
    attrs: HashMap<SQLINTEGER, SQLULEN>,
    connections: Vec<SQLHANDLE>,
    diagnostics: Vec<DiagRecord>,
}

struct Connection {
    env: SQLHANDLE,
    connected: bool,
    autocommit: bool,
    in_transaction: bool,
    attrs: HashMap<SQLINTEGER, SQLULEN>,
    connection_string: Option<String>,
    uid: Option<String>,
    statements: Vec<SQLHANDLE>,
    diagnostics: Vec<DiagRecord>,
}

struct Statement {
    conn: SQLHANDLE,
    prepared_sql: Option<String>,
    scrollable: bool,
    executed: bool,
    row_count: SQLLEN,
    rows_remaining: usize,
    diagnostics: Vec<DiagRecord>,
}

enum Injected {
    Clean,
    Info,
    Stop(SQLRETURN),
}

impl Injected {
    fn rc(&self) -> SQLRETURN {
        match self {
            Injected::Clean => SQL_SUCCESS,
            Injected::Info => SQL_SUCCESS_WITH_INFO,
            Injected::Stop(rc) => *rc,
        }
    }
}

struct State {
    next_handle: SQLHANDLE,
    envs: HashMap<SQLHANDLE, Environment>,
    conns: HashMap<SQLHANDLE, Connection>,
    stmts: HashMap<SQLHANDLE, Statement>,
    calls: Vec<Call>,
    faults: HashMap<Op, VecDeque<Fault>>,
    results: HashMap<String, ScriptedResult>,
    info: HashMap<SQLUSMALLINT, String>,
    pooling: SQLULEN,
    dead_attr_supported: bool,
    dead: bool,
    diag_records_returned: usize,
}

impl State {
    fn diagnostics_mut(
        &mut self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
    ) -> Option<&mut Vec<DiagRecord>> {
        match handle_type {
            SQL_HANDLE_ENV => self.envs.get_mut(&handle).map(|e| &mut e.diagnostics),
            SQL_HANDLE_DBC => self.conns.get_mut(&handle).map(|c| &mut c.diagnostics),
            SQL_HANDLE_STMT => self.stmts.get_mut(&handle).map(|s| &mut s.diagnostics),
            _ => None,
        }
    }

    fn exists(&self, handle_type: SQLSMALLINT, handle: SQLHANDLE) -> bool {
        match handle_type {
            SQL_HANDLE_ENV => self.envs.contains_key(&handle),
            SQL_HANDLE_DBC => self.conns.contains_key(&handle),
            SQL_HANDLE_STMT => self.stmts.contains_key(&handle),
            _ => false,
        }
    }

    fn clear_diagnostics(&mut self, handle_type: SQLSMALLINT, handle: SQLHANDLE) {
        if let Some(diagnostics) = self.diagnostics_mut(handle_type, handle) {
            diagnostics.clear();
        }
    }

    fn post(&mut self, handle_type: SQLSMALLINT, handle: SQLHANDLE, record: DiagRecord) {
        if let Some(diagnostics) = self.diagnostics_mut(handle_type, handle) {
            diagnostics.push(record);
        }
    }

    fn inject(&mut self, op: Op, handle_type: SQLSMALLINT, handle: SQLHANDLE) -> Injected {
        let fault = match self.faults.get_mut(&op).and_then(|queue| queue.pop_front()) {
            Some(fault) => fault,
            None => return Injected::Clean,
        };
        if let Some(diagnostics) = self.diagnostics_mut(handle_type, handle) {
            diagnostics.extend(fault.records);
        }
        match fault.rc {
            SQL_SUCCESS => Injected::Clean,
            SQL_SUCCESS_WITH_INFO => Injected::Info,
            rc => Injected::Stop(rc),
        }
    }

    fn alloc_id(&mut self) -> SQLHANDLE {
        self.next_handle += 1;
        self.next_handle
    }

    fn run(&mut self, stmt: SQLHANDLE, text: &str) -> SQLRETURN {
        let result = self.results.get(text).copied().unwrap_or_default();
        let conn_handle = match self.stmts.get(&stmt) {
            Some(s) => s.conn,
            None => return SQL_INVALID_HANDLE,
        };
        if let Some(conn) = self.conns.get_mut(&conn_handle) {
            if !conn.autocommit {
                conn.in_transaction = true;
            }
        }
        let Some(s) = self.stmts.get_mut(&stmt) else {
            return SQL_INVALID_HANDLE;
        };
        if result.no_data {
            s.executed = false;
            s.row_count = 0;
            s.rows_remaining = 0;
            return SQL_NO_DATA;
        }
        s.executed = true;
        s.row_count = result.row_count;
        s.rows_remaining = result.rows;
        SQL_SUCCESS
    }
}

/// See the module documentation.
pub struct MemoryDriver {
    state: Mutex<State>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        let mut info = HashMap::new();
        info.insert(SQL_DRIVER_NAME, "libmemory.so".to_string());
        info.insert(SQL_DBMS_NAME, "MemoryDB".to_string());
        info.insert(SQL_DBMS_VER, "01.00.0000".to_string());
        info.insert(SQL_DATA_SOURCE_READ_ONLY, "N".to_string());
        Self {
            state: Mutex::new(State {
                next_handle: 0,
                envs: HashMap::new(),
                conns: HashMap::new(),
                stmts: HashMap::new(),
                calls: Vec::new(),
                faults: HashMap::new(),
                results: HashMap::new(),
                info,
                pooling: SQL_CP_OFF,
                dead_attr_supported: true,
                dead: false,
                diag_records_returned: 0,
            }),
        }
    }

    /// Value `SQLGetInfo` reports for `info_type`.
    pub fn with_info(self, info_type: SQLUSMALLINT, value: &str) -> Self {
        self.state.lock().info.insert(info_type, value.to_string());
        self
    }

    /// Result produced when `text` is executed (directly or after prepare).
    pub fn with_result(self, text: &str, result: ScriptedResult) -> Self {
        self.state.lock().results.insert(text.to_string(), result);
        self
    }

    /// Make `SQL_ATTR_CONNECTION_DEAD` unsupported, like many older drivers.
    pub fn without_dead_attr(self) -> Self {
        self.state.lock().dead_attr_supported = false;
        self
    }

    /// Force the outcome of the next call of `op`. Faults queue up per op.
    pub fn fail_next(&self, op: Op, fault: Fault) {
        self.state
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    /// Simulate the server going away: liveness attribute reports dead and
    /// info queries fail with a link failure.
    pub fn set_dead(&self, dead: bool) {
        self.state.lock().dead = dead;
    }

    /// Attach diagnostic records to a live handle directly.
    pub fn push_diagnostics(
        &self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
        records: Vec<DiagRecord>,
    ) {
        if let Some(diagnostics) = self.state.lock().diagnostics_mut(handle_type, handle) {
            diagnostics.extend(records);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of diagnostic records handed out by `get_diag_rec` so far.
    pub fn diag_records_returned(&self) -> usize {
        self.state.lock().diag_records_returned
    }

    /// Handles allocated and not yet freed, of any type.
    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.envs.len() + state.conns.len() + state.stmts.len()
    }

    /// Process-wide pooling mode set through the null environment handle.
    pub fn pooling(&self) -> SQLULEN {
        self.state.lock().pooling
    }

    pub fn env_attr(&self, env: SQLHANDLE, attribute: SQLINTEGER) -> Option<SQLULEN> {
        self.state
            .lock()
            .envs
            .get(&env)
            .and_then(|e| e.attrs.get(&attribute).copied())
    }

    /// Whether a statement handle was switched to a scrollable cursor.
    pub fn is_scrollable(&self, stmt: SQLHANDLE) -> Option<bool> {
        self.state.lock().stmts.get(&stmt).map(|s| s.scrollable)
    }

    pub fn connection_handles(&self) -> Vec<SQLHANDLE> {
        let mut handles: Vec<_> = self.state.lock().conns.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Native autocommit mode of a connection handle.
    pub fn autocommit(&self, dbc: SQLHANDLE) -> Option<bool> {
        self.state.lock().conns.get(&dbc).map(|c| c.autocommit)
    }

    pub fn in_transaction(&self, dbc: SQLHANDLE) -> Option<bool> {
        self.state.lock().conns.get(&dbc).map(|c| c.in_transaction)
    }

    /// Connection string the driver was given (or built for `SQLConnect`).
    pub fn connection_string(&self, dbc: SQLHANDLE) -> Option<String> {
        self.state
            .lock()
            .conns
            .get(&dbc)
            .and_then(|c| c.connection_string.clone())
    }

    /// User the connection authenticated as, after unquoting.
    pub fn connected_user(&self, dbc: SQLHANDLE) -> Option<String> {
        self.state.lock().conns.get(&dbc).and_then(|c| c.uid.clone())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl WireClient for MemoryDriver {
    fn alloc_handle(
        &self,
        handle_type: SQLSMALLINT,
        input: SQLHANDLE,
        output: &mut SQLHANDLE,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::AllocHandle { handle_type, input });
        *output = SQL_NULL_HANDLE;

        match handle_type {
            SQL_HANDLE_ENV => {
                let injected = state.inject(Op::AllocEnv, SQL_HANDLE_ENV, SQL_NULL_HANDLE);
                if let Injected::Stop(rc) = injected {
                    return rc;
                }
                let id = state.alloc_id();
                state.envs.insert(
                    id,
                    Environment {
                        odbc_version: 0,
                        attrs: HashMap::new(),
                        connections: Vec::new(),
                        diagnostics: Vec::new(),
                    },
                );
                *output = id;
                injected.rc()
            }
            SQL_HANDLE_DBC => {
                let Some(env) = state.envs.get(&input) else {
                    return SQL_INVALID_HANDLE;
                };
                let odbc_version = env.odbc_version;
                state.clear_diagnostics(SQL_HANDLE_ENV, input);
                let injected = state.inject(Op::AllocDbc, SQL_HANDLE_ENV, input);
                if let Injected::Stop(rc) = injected {
                    return rc;
                }
                if odbc_version == 0 {
                    state.post(
                        SQL_HANDLE_ENV,
                        input,
                        DiagRecord::new("HY010", 0, "Function sequence error"),
                    );
                    return SQL_ERROR;
                }
                let id = state.alloc_id();
                state.conns.insert(
                    id,
                    Connection {
                        env: input,
                        connected: false,
                        autocommit: true,
                        in_transaction: false,
                        attrs: HashMap::new(),
                        connection_string: None,
                        uid: None,
                        statements: Vec::new(),
                        diagnostics: Vec::new(),
                    },
                );
                if let Some(env) = state.envs.get_mut(&input) {
                    env.connections.push(id);
                }
                *output = id;
                injected.rc()
            }
            SQL_HANDLE_STMT => {
                let Some(conn) = state.conns.get(&input) else {
                    return SQL_INVALID_HANDLE;
                };
                let connected = conn.connected;
                state.clear_diagnostics(SQL_HANDLE_DBC, input);
                let injected = state.inject(Op::AllocStmt, SQL_HANDLE_DBC, input);
                if let Injected::Stop(rc) = injected {
                    return rc;
                }
                if !connected {
                    state.post(
                        SQL_HANDLE_DBC,
                        input,
                        DiagRecord::new("08003", 0, "Connection does not exist"),
                    );
                    return SQL_ERROR;
                }
                let id = state.alloc_id();
                state.stmts.insert(
                    id,
                    Statement {
                        conn: input,
                        prepared_sql: None,
                        scrollable: false,
                        executed: false,
                        row_count: -1,
                        rows_remaining: 0,
                        diagnostics: Vec::new(),
                    },
                );
                if let Some(conn) = state.conns.get_mut(&input) {
                    conn.statements.push(id);
                }
                *output = id;
                injected.rc()
            }
            _ => SQL_ERROR,
        }
    }

    fn free_handle(&self, handle_type: SQLSMALLINT, handle: SQLHANDLE) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::FreeHandle {
            handle_type,
            handle,
        });
        if !state.exists(handle_type, handle) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(handle_type, handle);

        match handle_type {
            SQL_HANDLE_ENV => {
                let busy = state
                    .envs
                    .get(&handle)
                    .is_some_and(|env| !env.connections.is_empty());
                if busy {
                    state.post(
                        SQL_HANDLE_ENV,
                        handle,
                        DiagRecord::new("HY010", 0, "Function sequence error"),
                    );
                    return SQL_ERROR;
                }
                state.envs.remove(&handle);
            }
            SQL_HANDLE_DBC => {
                let connected = state.conns.get(&handle).is_some_and(|c| c.connected);
                if connected {
                    state.post(
                        SQL_HANDLE_DBC,
                        handle,
                        DiagRecord::new("HY010", 0, "Function sequence error"),
                    );
                    return SQL_ERROR;
                }
                if let Some(conn) = state.conns.remove(&handle) {
                    for stmt in conn.statements {
                        state.stmts.remove(&stmt);
                    }
                    if let Some(env) = state.envs.get_mut(&conn.env) {
                        env.connections.retain(|&c| c != handle);
                    }
                }
            }
            SQL_HANDLE_STMT => {
                if let Some(stmt) = state.stmts.remove(&handle) {
                    if let Some(conn) = state.conns.get_mut(&stmt.conn) {
                        conn.statements.retain(|&s| s != handle);
                    }
                }
            }
            _ => return SQL_ERROR,
        }
        SQL_SUCCESS
    }

    fn set_env_attr(&self, env: SQLHANDLE, attribute: SQLINTEGER, value: SQLULEN) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::SetEnvAttr {
            env,
            attribute,
            value,
        });
        if env == SQL_NULL_HANDLE {
            // process-level attributes only
            if attribute != SQL_ATTR_CONNECTION_POOLING {
                return SQL_INVALID_HANDLE;
            }
            let injected = state.inject(Op::SetEnvAttr(attribute), SQL_HANDLE_ENV, env);
            if let Injected::Stop(rc) = injected {
                return rc;
            }
            state.pooling = value;
            return injected.rc();
        }
        if !state.envs.contains_key(&env) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_ENV, env);
        let injected = state.inject(Op::SetEnvAttr(attribute), SQL_HANDLE_ENV, env);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        if attribute == SQL_ATTR_CONNECTION_POOLING {
            state.post(
                SQL_HANDLE_ENV,
                env,
                DiagRecord::new("HY092", 0, "Invalid attribute/option identifier"),
            );
            return SQL_ERROR;
        }
        if let Some(e) = state.envs.get_mut(&env) {
            match attribute {
                SQL_ATTR_ODBC_VERSION => e.odbc_version = value,
                _ => {
                    e.attrs.insert(attribute, value);
                }
            }
        }
        injected.rc()
    }

    fn set_connect_attr(
        &self,
        dbc: SQLHANDLE,
        attribute: SQLINTEGER,
        value: SQLULEN,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::SetConnectAttr { attribute, value });
        if !state.conns.contains_key(&dbc) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_DBC, dbc);
        let injected = state.inject(Op::SetConnectAttr(attribute), SQL_HANDLE_DBC, dbc);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let Some(conn) = state.conns.get_mut(&dbc) else {
            return SQL_INVALID_HANDLE;
        };
        match attribute {
            SQL_ATTR_AUTOCOMMIT => {
                let new_autocommit = value != SQL_AUTOCOMMIT_OFF;
                // switching autocommit back on commits the open transaction
                if new_autocommit && conn.in_transaction {
                    conn.in_transaction = false;
                }
                conn.autocommit = new_autocommit;
            }
            _ => {
                conn.attrs.insert(attribute, value);
            }
        }
        injected.rc()
    }

    fn get_connect_attr(
        &self,
        dbc: SQLHANDLE,
        attribute: SQLINTEGER,
        value: &mut SQLULEN,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::GetConnectAttr { attribute });
        if !state.conns.contains_key(&dbc) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_DBC, dbc);
        let injected = state.inject(Op::GetConnectAttr(attribute), SQL_HANDLE_DBC, dbc);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        if attribute == SQL_ATTR_CONNECTION_DEAD && !state.dead_attr_supported {
            state.post(
                SQL_HANDLE_DBC,
                dbc,
                DiagRecord::new("HYC00", 0, "Optional feature not implemented"),
            );
            return SQL_ERROR;
        }
        let dead = state.dead;
        let Some(conn) = state.conns.get(&dbc) else {
            return SQL_INVALID_HANDLE;
        };
        *value = match attribute {
            SQL_ATTR_AUTOCOMMIT if conn.autocommit => SQL_AUTOCOMMIT_ON,
            SQL_ATTR_AUTOCOMMIT => SQL_AUTOCOMMIT_OFF,
            SQL_ATTR_CONNECTION_DEAD if dead || !conn.connected => SQL_CD_TRUE,
            SQL_ATTR_CONNECTION_DEAD => SQL_CD_FALSE,
            _ => conn.attrs.get(&attribute).copied().unwrap_or(0),
        };
        injected.rc()
    }

    fn set_stmt_attr(&self, stmt: SQLHANDLE, attribute: SQLINTEGER, value: SQLULEN) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::SetStmtAttr { attribute, value });
        if !state.stmts.contains_key(&stmt) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_STMT, stmt);
        let injected = state.inject(Op::SetStmtAttr(attribute), SQL_HANDLE_STMT, stmt);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        if let Some(s) = state.stmts.get_mut(&stmt) {
            if attribute == SQL_ATTR_CURSOR_SCROLLABLE {
                s.scrollable = value == SQL_SCROLLABLE;
            }
        }
        injected.rc()
    }

    fn connect(
        &self,
        dbc: SQLHANDLE,
        server_name: &str,
        user_name: Option<&str>,
        authentication: Option<&str>,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::Connect {
            server_name: server_name.to_string(),
            user_name: user_name.map(str::to_string),
            authentication: authentication.map(str::to_string),
        });
        if !state.conns.contains_key(&dbc) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_DBC, dbc);
        let injected = state.inject(Op::Connect, SQL_HANDLE_DBC, dbc);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let Some(conn) = state.conns.get_mut(&dbc) else {
            return SQL_INVALID_HANDLE;
        };
        if conn.connected {
            conn.diagnostics
                .push(DiagRecord::new("08002", 0, "Connection name in use"));
            return SQL_ERROR;
        }
        conn.connected = true;
        conn.uid = user_name.map(str::to_string);
        conn.connection_string = Some(format!("DSN={server_name}"));
        injected.rc()
    }

    fn driver_connect(
        &self,
        dbc: SQLHANDLE,
        connection_string: &str,
        out_connection_string: &mut String,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::DriverConnect {
            connection_string: connection_string.to_string(),
        });
        if !state.conns.contains_key(&dbc) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_DBC, dbc);
        let injected = state.inject(Op::DriverConnect, SQL_HANDLE_DBC, dbc);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let Some(conn) = state.conns.get_mut(&dbc) else {
            return SQL_INVALID_HANDLE;
        };
        if conn.connected {
            conn.diagnostics
                .push(DiagRecord::new("08002", 0, "Connection name in use"));
            return SQL_ERROR;
        }
        for (key, value) in connstr::parse_pairs(connection_string) {
            if key == "uid" || key == "user id" {
                conn.uid = Some(value);
            }
        }
        conn.connected = true;
        conn.connection_string = Some(connection_string.to_string());
        out_connection_string.clear();
        out_connection_string.push_str(connection_string);
        injected.rc()
    }

    fn disconnect(&self, dbc: SQLHANDLE) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::Disconnect);
        if !state.conns.contains_key(&dbc) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_DBC, dbc);
        let injected = state.inject(Op::Disconnect, SQL_HANDLE_DBC, dbc);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let Some(conn) = state.conns.get_mut(&dbc) else {
            return SQL_INVALID_HANDLE;
        };
        if !conn.connected {
            conn.diagnostics
                .push(DiagRecord::new("08003", 0, "Connection does not exist"));
            return SQL_ERROR;
        }
        if conn.in_transaction {
            conn.diagnostics
                .push(DiagRecord::new("25000", 0, "Invalid transaction state"));
            return SQL_ERROR;
        }
        conn.connected = false;
        let statements = std::mem::take(&mut conn.statements);
        for stmt in statements {
            state.stmts.remove(&stmt);
        }
        injected.rc()
    }

    fn prepare(&self, stmt: SQLHANDLE, text: &str) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::Prepare {
            text: text.to_string(),
        });
        if !state.stmts.contains_key(&stmt) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_STMT, stmt);
        let injected = state.inject(Op::Prepare, SQL_HANDLE_STMT, stmt);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        if let Some(s) = state.stmts.get_mut(&stmt) {
            s.prepared_sql = Some(text.to_string());
            s.executed = false;
        }
        injected.rc()
    }

    fn execute(&self, stmt: SQLHANDLE) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::Execute);
        if !state.stmts.contains_key(&stmt) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_STMT, stmt);
        let injected = state.inject(Op::Execute, SQL_HANDLE_STMT, stmt);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let Some(sql) = state.stmts.get(&stmt).and_then(|s| s.prepared_sql.clone()) else {
            state.post(
                SQL_HANDLE_STMT,
                stmt,
                DiagRecord::new("HY010", 0, "No prepared statement"),
            );
            return SQL_ERROR;
        };
        match state.run(stmt, &sql) {
            SQL_SUCCESS => injected.rc(),
            rc => rc,
        }
    }

    fn exec_direct(&self, stmt: SQLHANDLE, text: &str) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::ExecDirect {
            text: text.to_string(),
        });
        if !state.stmts.contains_key(&stmt) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_STMT, stmt);
        let injected = state.inject(Op::ExecDirect, SQL_HANDLE_STMT, stmt);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        match state.run(stmt, text) {
            SQL_SUCCESS => injected.rc(),
            rc => rc,
        }
    }

    fn fetch(&self, stmt: SQLHANDLE) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::Fetch);
        if !state.stmts.contains_key(&stmt) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_STMT, stmt);
        let injected = state.inject(Op::Fetch, SQL_HANDLE_STMT, stmt);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let Some(s) = state.stmts.get_mut(&stmt) else {
            return SQL_INVALID_HANDLE;
        };
        if !s.executed {
            s.diagnostics
                .push(DiagRecord::new("24000", 0, "Invalid cursor state"));
            return SQL_ERROR;
        }
        if s.rows_remaining == 0 {
            return SQL_NO_DATA;
        }
        s.rows_remaining -= 1;
        injected.rc()
    }

    fn row_count(&self, stmt: SQLHANDLE, row_count: &mut SQLLEN) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::RowCount);
        if !state.stmts.contains_key(&stmt) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_STMT, stmt);
        let injected = state.inject(Op::RowCount, SQL_HANDLE_STMT, stmt);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        if let Some(s) = state.stmts.get(&stmt) {
            *row_count = s.row_count;
        }
        injected.rc()
    }

    fn end_tran(
        &self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
        completion_type: SQLSMALLINT,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::EndTran { completion_type });
        if !state.exists(handle_type, handle) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(handle_type, handle);
        let injected = state.inject(Op::EndTran, handle_type, handle);
        if let Injected::Stop(rc) = injected {
            return rc;
        }

        let connections: Vec<SQLHANDLE> = match handle_type {
            SQL_HANDLE_DBC => vec![handle],
            SQL_HANDLE_ENV => state
                .envs
                .get(&handle)
                .map(|env| env.connections.clone())
                .unwrap_or_default(),
            _ => return SQL_ERROR,
        };
        for dbc in connections {
            let Some(conn) = state.conns.get_mut(&dbc) else {
                continue;
            };
            if !conn.connected {
                conn.diagnostics
                    .push(DiagRecord::new("08003", 0, "Connection does not exist"));
                return SQL_ERROR;
            }
            conn.in_transaction = false;
        }
        injected.rc()
    }

    fn get_diag_rec(
        &self,
        handle_type: SQLSMALLINT,
        handle: SQLHANDLE,
        rec_number: SQLSMALLINT,
        state_out: &mut String,
        native_error: &mut SQLINTEGER,
        message: &mut String,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::GetDiagRec {
            handle_type,
            rec_number,
        });
        if rec_number < 1 {
            return SQL_ERROR;
        }
        let Some(diagnostics) = state.diagnostics_mut(handle_type, handle) else {
            return SQL_INVALID_HANDLE;
        };
        let idx = (rec_number - 1) as usize;
        let Some(rec) = diagnostics.get(idx).cloned() else {
            return SQL_NO_DATA;
        };

        state_out.clear();
        state_out.extend(rec.state.chars().take(5));
        *native_error = rec.native_error;
        message.clear();
        message.push_str(&rec.message);
        state.diag_records_returned += 1;
        SQL_SUCCESS
    }

    fn get_info(
        &self,
        dbc: SQLHANDLE,
        info_type: SQLUSMALLINT,
        buffer: &mut [u8],
        string_length: &mut SQLSMALLINT,
    ) -> SQLRETURN {
        let mut state = self.state.lock();
        state.calls.push(Call::GetInfo { info_type });
        if !state.conns.contains_key(&dbc) {
            return SQL_INVALID_HANDLE;
        }
        state.clear_diagnostics(SQL_HANDLE_DBC, dbc);
        let injected = state.inject(Op::GetInfo(info_type), SQL_HANDLE_DBC, dbc);
        if let Injected::Stop(rc) = injected {
            return rc;
        }
        let connected = state.conns.get(&dbc).is_some_and(|c| c.connected);
        if state.dead || !connected {
            state.post(
                SQL_HANDLE_DBC,
                dbc,
                DiagRecord::new("08S01", 0, "Communication link failure"),
            );
            return SQL_ERROR;
        }

        let value = state.info.get(&info_type).cloned().unwrap_or_default();
        let bytes = value.as_bytes();
        *string_length = bytes.len() as SQLSMALLINT;
        let mut rc = injected.rc();
        if !buffer.is_empty() {
            let copy_len = std::cmp::min(bytes.len(), buffer.len() - 1);
            buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
            buffer[copy_len] = 0;
            if copy_len < bytes.len() {
                state.post(
                    SQL_HANDLE_DBC,
                    dbc,
                    DiagRecord::new("01004", 0, "String data, right truncated"),
                );
                rc = SQL_SUCCESS_WITH_INFO;
            }
        }
        rc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(driver: &MemoryDriver) -> (SQLHANDLE, SQLHANDLE) {
        let mut env = SQL_NULL_HANDLE;
        let mut dbc = SQL_NULL_HANDLE;
        assert_eq!(driver.alloc_handle(SQL_HANDLE_ENV, SQL_NULL_HANDLE, &mut env), SQL_SUCCESS);
        assert_eq!(driver.set_env_attr(env, SQL_ATTR_ODBC_VERSION, SQL_OV_ODBC3), SQL_SUCCESS);
        assert_eq!(driver.alloc_handle(SQL_HANDLE_DBC, env, &mut dbc), SQL_SUCCESS);
        assert_eq!(driver.connect(dbc, "PHP", None, None), SQL_SUCCESS);
        (env, dbc)
    }

    #[test]
    fn dbc_requires_odbc_version() {
        let driver = MemoryDriver::new();
        let mut env = SQL_NULL_HANDLE;
        let mut dbc = SQL_NULL_HANDLE;
        driver.alloc_handle(SQL_HANDLE_ENV, SQL_NULL_HANDLE, &mut env);
        assert_eq!(driver.alloc_handle(SQL_HANDLE_DBC, env, &mut dbc), SQL_ERROR);
        assert_eq!(dbc, SQL_NULL_HANDLE);
    }

    #[test]
    fn pooling_is_set_on_the_null_handle_only() {
        let driver = MemoryDriver::new();
        let (env, _dbc) = connected(&driver);
        assert_eq!(
            driver.set_env_attr(env, SQL_ATTR_CONNECTION_POOLING, SQL_CP_ONE_PER_DRIVER),
            SQL_ERROR
        );
        let (mut state, mut code, mut msg) = (String::new(), 0, String::new());
        assert_eq!(
            driver.get_diag_rec(SQL_HANDLE_ENV, env, 1, &mut state, &mut code, &mut msg),
            SQL_SUCCESS
        );
        assert_eq!(state, "HY092");
        assert_eq!(driver.pooling(), SQL_CP_OFF);

        assert_eq!(
            driver.set_env_attr(SQL_NULL_HANDLE, SQL_ATTR_CONNECTION_POOLING, SQL_CP_ONE_PER_DRIVER),
            SQL_SUCCESS
        );
        assert_eq!(driver.pooling(), SQL_CP_ONE_PER_DRIVER);
        assert_eq!(
            driver.set_env_attr(SQL_NULL_HANDLE, SQL_ATTR_ODBC_VERSION, SQL_OV_ODBC3),
            SQL_INVALID_HANDLE
        );
    }

    #[test]
    fn free_order_is_enforced() {
        let driver = MemoryDriver::new();
        let (env, dbc) = connected(&driver);
        assert_eq!(driver.free_handle(SQL_HANDLE_ENV, env), SQL_ERROR);
        assert_eq!(driver.free_handle(SQL_HANDLE_DBC, dbc), SQL_ERROR);
        assert_eq!(driver.disconnect(dbc), SQL_SUCCESS);
        assert_eq!(driver.free_handle(SQL_HANDLE_DBC, dbc), SQL_SUCCESS);
        assert_eq!(driver.free_handle(SQL_HANDLE_ENV, env), SQL_SUCCESS);
        assert_eq!(driver.live_handles(), 0);
    }

    #[test]
    fn diagnostics_are_cleared_by_the_next_call() {
        let driver = MemoryDriver::new();
        let (_env, dbc) = connected(&driver);
        driver.fail_next(
            Op::SetConnectAttr(SQL_ATTR_AUTOCOMMIT),
            Fault::error(vec![DiagRecord::new("HY000", 1, "nope")]),
        );
        assert_eq!(driver.set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, 0), SQL_ERROR);

        let (mut state, mut code, mut msg) = (String::new(), 0, String::new());
        assert_eq!(
            driver.get_diag_rec(SQL_HANDLE_DBC, dbc, 1, &mut state, &mut code, &mut msg),
            SQL_SUCCESS
        );
        assert_eq!((state.as_str(), code, msg.as_str()), ("HY000", 1, "nope"));

        assert_eq!(driver.set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, 0), SQL_SUCCESS);
        assert_eq!(
            driver.get_diag_rec(SQL_HANDLE_DBC, dbc, 1, &mut state, &mut code, &mut msg),
            SQL_NO_DATA
        );
    }

    #[test]
    fn info_is_truncated_to_buffer() {
        let driver = MemoryDriver::new().with_info(SQL_DBMS_NAME, "A Very Long Server Name");
        let (_env, dbc) = connected(&driver);
        let mut buf = [0u8; 8];
        let mut len = 0;
        assert_eq!(
            driver.get_info(dbc, SQL_DBMS_NAME, &mut buf, &mut len),
            SQL_SUCCESS_WITH_INFO
        );
        assert_eq!(len, 23);
        assert_eq!(&buf[..7], b"A Very ");
        assert_eq!(buf[7], 0);
    }

    #[test]
    fn scripted_results_drive_fetch() {
        let driver = MemoryDriver::new().with_result("SELECT 1", ScriptedResult::rows(1));
        let (_env, dbc) = connected(&driver);
        let mut stmt = SQL_NULL_HANDLE;
        assert_eq!(driver.alloc_handle(SQL_HANDLE_STMT, dbc, &mut stmt), SQL_SUCCESS);
        assert_eq!(driver.fetch(stmt), SQL_ERROR);
        assert_eq!(driver.exec_direct(stmt, "SELECT 1"), SQL_SUCCESS);
        assert_eq!(driver.fetch(stmt), SQL_SUCCESS);
        assert_eq!(driver.fetch(stmt), SQL_NO_DATA);
    }
}
