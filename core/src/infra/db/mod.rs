//! Embedded database layer

pub mod entities;
pub mod migration;

pub use migration::Migrator;
