//! Durable, append-only stores.
//!
//! Patient clinical histories and doctor audit trails, each kept in its own sharded Git
//! repository under the data directory.

pub mod activity;
pub mod records;
pub(crate) mod shared;
