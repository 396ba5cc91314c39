use std::sync::Arc;

use odbc_bridge::memory::{Call, DiagRecord, Fault, Op};
use odbc_bridge::types::*;
use odbc_bridge::{ConnectOptions, Connection, MemoryDriver, WireClient};

fn open(driver: &Arc<MemoryDriver>) -> Connection {
    let client = Arc::clone(driver) as Arc<dyn WireClient>;
    Connection::open(client, "Sales", None, None, &ConnectOptions::default()).unwrap()
}

fn read_only_probes(driver: &MemoryDriver) -> usize {
    driver.count_calls(|c| {
        *c == Call::GetInfo {
            info_type: SQL_DATA_SOURCE_READ_ONLY,
        }
    })
}

#[test]
fn healthy_connection_is_alive() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = open(&driver);
    assert!(conn.check_liveness());
    assert_eq!(read_only_probes(&driver), 1);
}

#[test]
fn dead_attribute_wins_over_fallback() {
    let driver = Arc::new(MemoryDriver::new());
    let conn = open(&driver);
    driver.set_dead(true);
    driver.clear_calls();

    assert!(!conn.check_liveness());
    assert_eq!(
        driver.calls(),
        vec![Call::GetConnectAttr {
            attribute: SQL_ATTR_CONNECTION_DEAD,
        }]
    );
}

#[test]
fn unsupported_attribute_falls_back_to_info_probe() {
    let driver = Arc::new(MemoryDriver::new().without_dead_attr());
    let conn = open(&driver);
    assert!(conn.check_liveness());
    assert_eq!(read_only_probes(&driver), 1);

    driver.set_dead(true);
    assert!(!conn.check_liveness());
}

#[test]
fn empty_or_warning_probe_is_dead() {
    let driver = Arc::new(
        MemoryDriver::new()
            .without_dead_attr()
            .with_info(SQL_DATA_SOURCE_READ_ONLY, ""),
    );
    let conn = open(&driver);
    assert!(!conn.check_liveness());

    let driver = Arc::new(MemoryDriver::new().without_dead_attr());
    let conn = open(&driver);
    driver.fail_next(
        Op::GetInfo(SQL_DATA_SOURCE_READ_ONLY),
        Fault::with_info(vec![DiagRecord::new("01000", 0, "General warning")]),
    );
    assert!(!conn.check_liveness());
}

#[test]
fn liveness_does_not_touch_error_slot() {
    let driver = Arc::new(MemoryDriver::new().without_dead_attr());
    let conn = open(&driver);
    driver.set_dead(true);
    assert!(!conn.check_liveness());
    assert_eq!(conn.error_code(), "00000");
}
