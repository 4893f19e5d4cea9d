//! JSON-to-relational staging pipeline: two-pass schema inference and typed
//! bulk load from a tenant HTTP service into a warehouse.

pub mod catalog;
pub mod cmd;
pub mod config;
pub mod db;
pub mod errors;
pub mod extract;
pub mod identifiers;
pub mod log;
pub mod staging;
