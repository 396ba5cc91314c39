//! ODBC driver adapter for a database-abstraction host.
//!
//! A [`Connection`] owns an environment and a connection handle allocated
//! through a [`WireClient`]; [`Statement`]s borrow it. Every failing native
//! call is turned into an [`ErrorRecord`] taken from the first diagnostic
//! record of the offending handle, after the rest of the chain is drained.
//!
//! [`MemoryDriver`] is an in-process wire client that emulates the driver
//! manager closely enough to exercise every path of the adapter.

mod attr;
mod connect;
pub mod connstr;
mod diagnostics;
mod error;
mod execute;
mod fetch;
mod handle;
mod liveness;
pub mod memory;
mod options;
pub mod rewrite;
mod transaction;
pub mod types;
mod wire;

pub use attr::Attribute;
pub use diagnostics::collect;
pub use error::{Error, ErrorInfo, ErrorRecord, Result, NO_ERROR_STATE};
pub use handle::{Connection, OwnedHandle, Statement};
pub use memory::MemoryDriver;
pub use options::{
    ConnectOptions, CursorLibrary, CursorType, PoolMatch, Pooling, StatementOptions, Value,
};
pub use rewrite::{NamedPlaceholders, PlaceholderRewriter, RewriteError, Rewritten};
pub use wire::WireClient;
