//! Database module for MySQL connectivity and statement execution
//!
//! Connections are opened per query and closed before the call returns.

pub mod connection;
pub mod executor;

pub use connection::{connect, connect_options};
pub use executor::{MySqlExecutor, QueryExecutor, QueryOutcome};
