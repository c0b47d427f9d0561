//! Key store adapters

mod sql;

pub use sql::SqlKeyStore;
