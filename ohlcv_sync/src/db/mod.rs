//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - Connection helpers: [`connection::connect_sqlite`] applies WAL, foreign_keys=ON, and a 5000ms
//!   busy_timeout; [`connection::connect_postgres`] opens a plain `PgConnection`.
//! - Embedded Diesel migrations (one set per backend) and runners: [`migrate::run_sqlite`],
//!   [`migrate::run_postgres`], and [`migrate::run_all`] which dispatches on the URL.
//!
//! Example:
//! ```no_run
//! use ohlcv_sync::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("ohlcv_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```
//!
//! Note: Building with PostgreSQL support requires the system libpq (e.g., libpq-dev on Debian/Ubuntu).

pub mod connection;
pub mod migrate;

/// True for `postgres://` and `postgresql://` URLs; anything else is a SQLite path.
pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}
