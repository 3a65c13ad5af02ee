//! Database configuration and connection handling for the connection proxy.
//!
//! This crate provides driver dispatch (mysql/postgres/sqlite), statement
//! binding, and the `Connection`/`ConnectionFactory` seam the proxy workers
//! are built on, with a sqlx-backed implementation and a scripted mock.

mod bind;
mod config;
mod connection;
pub mod mock;
mod sql;

pub use bind::{BindKey, BindMap, BindValue, Row, SqlValue};
pub use config::{DbConfig, DbDriver};
pub use connection::{classify_sqlx_error, Connection, ConnectionFactory, SqlxConnection, SqlxFactory};
pub use sql::rewrite_placeholders;

// Re-export sqlx for consumers that need driver-level types
pub use sqlx;
