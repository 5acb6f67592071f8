//! Connection helpers.
//!
//! [`connect_sqlite`] opens a connection and applies the PRAGMAs every store
//! connection relies on: WAL journaling, foreign_keys=ON, and a 5000ms
//! busy_timeout.

use diesel::{Connection, ConnectionResult, PgConnection, RunQueryDsl, SqliteConnection, sql_query};

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let path = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
    let mut conn = SqliteConnection::establish(path)?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

pub fn connect_postgres(database_url: &str) -> ConnectionResult<PgConnection> {
    PgConnection::establish(database_url)
}
