//! Infrastructure shared by the store and the sync services
//!
//! - `db`: embedded SQLite schema (sea-orm entities and migrations)
//! - `storage`: key/value document persistence on top of `db`
//! - `event`: sync event bus
//! - `remote`: queued operation descriptors and the gateway executing them

pub mod db;
pub mod event;
pub mod remote;
pub mod storage;
