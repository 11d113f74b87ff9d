//! Connection pool bootstrap for SQLite.
//!
//! # Responsibility
//! - Build file-backed or in-memory connection pools.
//! - Configure per-connection pragmas required by catalog behavior.
//! - Trigger schema migrations before returning a usable pool.
//!
//! # Invariants
//! - Every pooled connection has `foreign_keys=ON` and a busy timeout.
//! - Returned pools have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbPool, DbResult};
use crate::config::DatabaseConfig;
use log::{error, info};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::time::{Duration, Instant};

const IN_MEMORY_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a pool over the configured SQLite file and applies pending migrations.
///
/// # Side effects
/// - Creates the database file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_pool(config: &DatabaseConfig) -> DbResult<DbPool> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=file pool_size={}",
        config.pool_size
    );

    let busy_timeout = config.busy_timeout();
    let manager = SqliteConnectionManager::file(&config.path).with_init(move |conn| {
        configure_connection(conn, busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Ok(())
    });
    let builder = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(config.connection_timeout());

    finish_open(builder, manager, "file", started_at)
}

/// Opens a single-connection in-memory pool and applies all migrations.
///
/// The database lives as long as the pool's only connection, so the pool never
/// expires it.
pub fn open_pool_in_memory() -> DbResult<DbPool> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory pool_size=1");

    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| configure_connection(conn, IN_MEMORY_BUSY_TIMEOUT));
    let builder = r2d2::Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None);

    finish_open(builder, manager, "memory", started_at)
}

fn finish_open(
    builder: r2d2::Builder<SqliteConnectionManager>,
    manager: SqliteConnectionManager,
    mode: &str,
    started_at: Instant,
) -> DbResult<DbPool> {
    let pool = match builder.build(manager) {
        Ok(pool) => pool,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_pool_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match migrate_pool(&pool) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(pool)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn migrate_pool(pool: &DbPool) -> DbResult<()> {
    let mut conn = pool.get()?;
    apply_migrations(&mut conn)
}

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
