use std::panic::Location;

use tracing::{debug, trace};

use crate::error::ErrorRecord;
use crate::types::*;
use crate::wire::WireClient;

/// State used when the driver could not hand back a first record.
const UNKNOWN_STATE: &str = "HY000";

/// Read diagnostic record #1 of `handle` into an [`ErrorRecord`], then drain
/// the rest of the chain.
///
/// Some drivers (SQL Server among them) keep cursor state tied to pending
/// diagnostic records, so every record is pulled even though only the first
/// one is kept.
#[track_caller]
pub fn collect(
    client: &dyn WireClient,
    handle_type: SQLSMALLINT,
    handle: SQLHANDLE,
    what: &'static str,
) -> ErrorRecord {
    let location = Location::caller();
    let mut state = String::new();
    let mut native_error: SQLINTEGER = 0;
    let mut message = String::new();
    let mut rec_number: SQLSMALLINT = 1;

    let mut rc = client.get_diag_rec(
        handle_type,
        handle,
        rec_number,
        &mut state,
        &mut native_error,
        &mut message,
    );
    if !succeeded(rc) {
        state = UNKNOWN_STATE.to_string();
        native_error = 0;
        message.clear();
    }

    debug!(
        handle_type = handle_type_name(handle_type),
        what,
        state = %state,
        native_error,
        message = %message,
        "captured diagnostic record"
    );

    let mut discarded = 0usize;
    // record numbers are SQLSMALLINT, so a driver that never ends the chain
    // stops at the last addressable record
    while succeeded(rc) && rec_number < SQLSMALLINT::MAX {
        rec_number += 1;
        let mut discard_state = String::new();
        let mut discard_code: SQLINTEGER = 0;
        let mut discard_message = String::new();
        rc = client.get_diag_rec(
            handle_type,
            handle,
            rec_number,
            &mut discard_state,
            &mut discard_code,
            &mut discard_message,
        );
        if succeeded(rc) {
            trace!(rec_number, state = %discard_state, "discarded diagnostic record");
            discarded += 1;
        }
    }
    if discarded > 0 {
        trace!(discarded, "drained diagnostic chain");
    }

    ErrorRecord {
        native_code: native_error,
        state,
        message,
        what,
        file: location.file(),
        line: location.line(),
    }
}
