//! Soul Player Storage
//!
//! `SQLite` layer behind the library indexer.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: Each table group owns its own queries
//! - **Connection-scoped**: Slices take `&mut SqliteConnection`, so the same
//!   call works on a pooled connection or inside an open transaction
//! - **No foreign keys**: Orphans are swept by [`maintenance::cleanup`]
//!
//! # Example
//!
//! ```rust,no_run
//! use soul_storage::{create_pool, paths, run_migrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://library.db").await?;
//! run_migrations(&pool).await?;
//!
//! let mut conn = pool.acquire().await?;
//! paths::add(&mut conn, "/music/").await?;
//! let roots = paths::all(&mut conn).await?;
//! # Ok(())
//! # }
//! ```

mod error;

// Vertical slices
pub mod maintenance;
pub mod paths;
pub mod playlists;
pub mod schema;
pub mod tracks;

pub use error::{Result, StorageError};

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// The indexer itself never migrates; binaries and tests call this once
/// to start from an empty file.
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30)))
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://library.db>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    tracing::debug!(database_url, "creating pool");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(database_url)?)
        .await?;

    Ok(pool)
}

/// Open the single-connection pool used for one scan cycle
///
/// Every write of a cycle funnels through this one connection; holding its
/// transaction while asking the pool for another connection would deadlock.
///
/// # Errors
///
/// Returns an error if the database cannot be opened
pub async fn open_indexer_pool(database_url: &str) -> Result<SqlitePool> {
    tracing::debug!(database_url, "opening indexer connection");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(database_url)?)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    Ok(pool)
}
