//! MySQL adapters for the collaborator seams
//!
//! - [`MySqlCatalog`] lists log files with `SHOW BINARY LOGS`
//! - [`MySqlStreamClient`] opens non-blocking binlog dumps, one connection each
//!
//! The wire protocol and event decoding live in [`protocol`] and [`decoder`].

pub mod catalog;
pub mod decoder;
pub mod json;
pub mod protocol;
pub mod stream;

pub use catalog::MySqlCatalog;
pub use decoder::BinlogDecoder;
pub use stream::{MySqlEventStream, MySqlStreamClient};
