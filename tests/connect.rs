use std::sync::Arc;

use odbc_bridge::memory::{Call, DiagRecord, Fault, Op};
use odbc_bridge::types::*;
use odbc_bridge::{
    ConnectOptions, Connection, CursorLibrary, Error, MemoryDriver, PoolMatch, Pooling, WireClient,
};

fn client(driver: &Arc<MemoryDriver>) -> Arc<dyn WireClient> {
    Arc::clone(driver) as Arc<dyn WireClient>
}

#[test]
fn bare_name_uses_simple_connect() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::open(
        client(&driver),
        "Sales",
        Some("scott"),
        Some("tiger"),
        &ConnectOptions::default(),
    )
    .unwrap();

    let calls = driver.calls();
    assert!(calls.contains(&Call::Connect {
        server_name: "Sales".to_string(),
        user_name: Some("scott".to_string()),
        authentication: Some("tiger".to_string()),
    }));
    assert!(!calls
        .iter()
        .any(|c| matches!(c, Call::DriverConnect { .. })));

    let dbc = conn.raw_dbc().unwrap();
    assert_eq!(driver.connected_user(dbc).as_deref(), Some("scott"));
    assert_eq!(conn.error_code(), "00000");
    assert!(conn.error_info().is_none());
}

#[test]
fn key_value_string_uses_driver_connect() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::open(
        client(&driver),
        "DSN=PHP",
        None,
        None,
        &ConnectOptions::default(),
    )
    .unwrap();

    assert!(driver.calls().contains(&Call::DriverConnect {
        connection_string: "DSN=PHP".to_string(),
    }));
    assert_eq!(
        driver.count_calls(|c| matches!(c, Call::Connect { .. })),
        0
    );
    assert_eq!(
        driver.connection_string(conn.raw_dbc().unwrap()).as_deref(),
        Some("DSN=PHP")
    );
}

#[test]
fn separate_credentials_are_spliced_and_quoted() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::open(
        client(&driver),
        "Driver=Memory;Server=db1;",
        Some("scott"),
        Some("p;ss}"),
        &ConnectOptions::default(),
    )
    .unwrap();

    let conn_str = driver.connection_string(conn.raw_dbc().unwrap()).unwrap();
    assert_eq!(conn_str, "Driver=Memory;Server=db1;UID=scott;PWD={p;ss}}};");
    assert_eq!(conn_str.matches("UID=").count(), 1);
    assert_eq!(conn_str.matches("PWD=").count(), 1);
}

#[test]
fn embedded_credentials_win() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::open(
        client(&driver),
        "DSN=PHP;Uid=alice",
        Some("bob"),
        None,
        &ConnectOptions::default(),
    )
    .unwrap();

    let dbc = conn.raw_dbc().unwrap();
    assert_eq!(driver.connection_string(dbc).as_deref(), Some("DSN=PHP;Uid=alice"));
    assert_eq!(driver.connected_user(dbc).as_deref(), Some("alice"));
}

#[test]
fn bootstrap_sequence() {
    let driver = Arc::new(MemoryDriver::new());
    let options = ConnectOptions::default()
        .autocommit(false)
        .pooling(Pooling::OnePerDriver, PoolMatch::Relaxed);
    let conn = Connection::open(client(&driver), "Sales", None, None, &options).unwrap();

    let env = conn.raw_env();
    let calls = driver.calls();
    assert_eq!(
        &calls[..7],
        &[
            Call::SetEnvAttr {
                env: SQL_NULL_HANDLE,
                attribute: SQL_ATTR_CONNECTION_POOLING,
                value: SQL_CP_ONE_PER_DRIVER,
            },
            Call::AllocHandle {
                handle_type: SQL_HANDLE_ENV,
                input: SQL_NULL_HANDLE,
            },
            Call::SetEnvAttr {
                env,
                attribute: SQL_ATTR_ODBC_VERSION,
                value: SQL_OV_ODBC3,
            },
            Call::SetEnvAttr {
                env,
                attribute: SQL_ATTR_CP_MATCH,
                value: SQL_CP_RELAXED_MATCH,
            },
            Call::AllocHandle {
                handle_type: SQL_HANDLE_DBC,
                input: env,
            },
            Call::SetConnectAttr {
                attribute: SQL_ATTR_AUTOCOMMIT,
                value: SQL_AUTOCOMMIT_OFF,
            },
            Call::SetConnectAttr {
                attribute: SQL_ATTR_ODBC_CURSORS,
                value: SQL_CUR_USE_IF_NEEDED,
            },
        ]
    );
    assert_eq!(driver.pooling(), SQL_CP_ONE_PER_DRIVER);
    assert_eq!(
        driver.env_attr(env, SQL_ATTR_CP_MATCH),
        Some(SQL_CP_RELAXED_MATCH)
    );
    assert!(!conn.autocommit());
    assert_eq!(driver.autocommit(conn.raw_dbc().unwrap()), Some(false));
}

#[test]
fn pooling_off_leaves_environment_alone() {
    let driver = Arc::new(MemoryDriver::new());
    let _conn =
        Connection::open(client(&driver), "Sales", None, None, &ConnectOptions::default())
            .unwrap();
    assert_eq!(
        driver.count_calls(|c| matches!(c, Call::SetEnvAttr { .. })),
        1
    );
    assert_eq!(driver.pooling(), SQL_CP_OFF);
}

#[test]
fn pooling_failure_stops_before_environment_exists() {
    let driver = Arc::new(MemoryDriver::new());
    driver.fail_next(
        Op::SetEnvAttr(SQL_ATTR_CONNECTION_POOLING),
        Fault::error(vec![DiagRecord::new("HY024", 0, "Invalid attribute value")]),
    );
    let options = ConnectOptions::default().pooling(Pooling::OnePerDriver, PoolMatch::Strict);

    let err = Connection::open(client(&driver), "Sales", None, None, &options).unwrap_err();
    assert_eq!(
        err.record().unwrap().what,
        "SQLSetEnvAttr: SQL_ATTR_CONNECTION_POOLING"
    );
    assert!(!driver
        .calls()
        .iter()
        .any(|c| matches!(c, Call::AllocHandle { .. })));
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn connect_failure_reports_first_record_and_releases_handles() {
    let driver = Arc::new(MemoryDriver::new());
    driver.fail_next(
        Op::Connect,
        Fault::error(vec![
            DiagRecord::new("28000", 18456, "Login failed for user 'scott'"),
            DiagRecord::new("01S00", 0, "Invalid connection string attribute"),
        ]),
    );

    let err = Connection::open(
        client(&driver),
        "Sales",
        Some("scott"),
        Some("wrong"),
        &ConnectOptions::default(),
    )
    .err()
    .unwrap();

    let Error::Connect(record) = &err else {
        panic!("expected a bootstrap error, got {err:?}");
    };
    assert_eq!(record.state, "28000");
    assert_eq!(record.native_code, 18456);
    assert_eq!(record.what, "SQLConnect");
    assert!(record.file.ends_with("connect.rs"));
    assert_eq!(
        err.to_string(),
        "SQLSTATE[28000] SQLConnect: 18456 Login failed for user 'scott'"
    );

    assert_eq!(driver.live_handles(), 0);
    let frees: Vec<_> = driver
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::FreeHandle { handle_type, .. } => Some(handle_type),
            _ => None,
        })
        .collect();
    assert_eq!(frees, vec![SQL_HANDLE_DBC, SQL_HANDLE_ENV]);
}

#[test]
fn environment_failure_releases_environment() {
    let driver = Arc::new(MemoryDriver::new());
    driver.fail_next(
        Op::SetEnvAttr(SQL_ATTR_ODBC_VERSION),
        Fault::error(vec![DiagRecord::new("HY092", 0, "Invalid attribute identifier")]),
    );

    let err = Connection::open(
        client(&driver),
        "Sales",
        None,
        None,
        &ConnectOptions::default(),
    )
    .err()
    .unwrap();
    assert_eq!(err.sqlstate(), "HY092");
    assert_eq!(err.record().unwrap().what, "SQLSetEnvAttr: ODBC3");
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn cursor_library_failure_tolerated_only_when_if_needed() {
    let driver = Arc::new(MemoryDriver::new());
    driver.fail_next(
        Op::SetConnectAttr(SQL_ATTR_ODBC_CURSORS),
        Fault::error(vec![DiagRecord::new("HYC00", 0, "Optional feature not implemented")]),
    );
    let conn = Connection::open(
        client(&driver),
        "Sales",
        None,
        None,
        &ConnectOptions::default(),
    );
    assert!(conn.is_ok());
    drop(conn);

    let driver = Arc::new(MemoryDriver::new());
    driver.fail_next(
        Op::SetConnectAttr(SQL_ATTR_ODBC_CURSORS),
        Fault::error(vec![DiagRecord::new("HYC00", 0, "Optional feature not implemented")]),
    );
    let err = Connection::open(
        client(&driver),
        "Sales",
        None,
        None,
        &ConnectOptions::default().cursor_library(CursorLibrary::UseOdbc),
    )
    .err()
    .unwrap();
    assert_eq!(err.sqlstate(), "HYC00");
    assert_eq!(err.record().unwrap().what, "SQLSetConnectAttr SQL_ODBC_CURSORS");
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn close_rolls_back_and_disconnects() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = Connection::open(
        client(&driver),
        "Sales",
        None,
        None,
        &ConnectOptions::default(),
    )
    .unwrap();
    driver.clear_calls();

    conn.close();

    let calls = driver.calls();
    assert_eq!(calls[0], Call::EndTran {
        completion_type: SQL_ROLLBACK,
    });
    assert_eq!(calls[1], Call::Disconnect);
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn drop_releases_everything() {
    let driver = Arc::new(MemoryDriver::new());
    {
        let conn = Connection::open(
            client(&driver),
            "DSN=PHP",
            None,
            None,
            &ConnectOptions::default(),
        )
        .unwrap();
        conn.exec("delete from t").unwrap();
        assert_eq!(driver.live_handles(), 2);
    }
    assert_eq!(driver.live_handles(), 0);
    assert!(driver.connection_handles().is_empty());
}
