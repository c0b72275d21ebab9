use soul_core::error::Result;
use sqlx::{Row, SqliteConnection};

/// A managed root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRow {
    pub id: i64,
    pub path: String,
}

/// Every registered root, in insertion order
pub async fn all(conn: &mut SqliteConnection) -> Result<Vec<PathRow>> {
    let rows = sqlx::query("SELECT id, path FROM paths ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| PathRow {
            id: row.get("id"),
            path: row.get("path"),
        })
        .collect())
}

/// Register a root; a no-op if it is already present
pub async fn add(conn: &mut SqliteConnection, path: &str) -> Result<()> {
    sqlx::query("INSERT INTO paths (path) VALUES (?) ON CONFLICT(path) DO NOTHING")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Unregister a root
///
/// Tracks under it stay until the next delete pass drops every local track
/// whose `path_id` no longer resolves.
pub async fn remove(conn: &mut SqliteConnection, path: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM paths WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
