//! Embedded migrations for the `ohlcv_bars` table.

use anyhow::anyhow;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::db::{
    connection::{connect_postgres, connect_sqlite},
    is_postgres_url,
};

/// SQLite migrations (text timestamps).
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

/// PostgreSQL migrations (`timestamptz`).
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

/// Runs pending migrations on a SQLite database at the given path or `sqlite://` URL.
pub fn run_sqlite(url: &str) -> anyhow::Result<()> {
    let mut conn = connect_sqlite(url)?;
    conn.run_pending_migrations(SQLITE_MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    Ok(())
}

/// Runs pending migrations on a PostgreSQL database at the given URL.
pub fn run_postgres(url: &str) -> anyhow::Result<()> {
    let mut conn = connect_postgres(url)?;
    conn.run_pending_migrations(POSTGRES_MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    Ok(())
}

/// Runs pending migrations for the given database URL by delegating to the
/// matching backend. `postgres://` and `postgresql://` URLs go to PostgreSQL,
/// everything else is treated as a SQLite path.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    if database_url.trim().is_empty() {
        anyhow::bail!("empty DATABASE_URL");
    }
    if is_postgres_url(database_url) {
        run_postgres(database_url)
    } else {
        run_sqlite(database_url)
    }
}
