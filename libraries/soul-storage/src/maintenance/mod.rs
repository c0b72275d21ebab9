//! Delete, cleanup and optimize passes run at the end of a scan cycle

use soul_core::error::Result;
use sqlx::SqliteConnection;

/// Orphan sweeps, in dependency order
///
/// Link tables go first so the lookup tables see their final references.
/// Every subquery filters NULLs; a NULL inside `NOT IN` would match nothing.
const CLEANUP: &[&str] = &[
    "DELETE FROM track_artists WHERE track_id NOT IN (SELECT id FROM tracks)",
    r#"DELETE FROM artists
       WHERE id NOT IN (SELECT visual_artist_id FROM tracks WHERE visual_artist_id IS NOT NULL)
         AND id NOT IN (SELECT album_artist_id FROM tracks WHERE album_artist_id IS NOT NULL)
         AND id NOT IN (SELECT artist_id FROM track_artists)"#,
    "DELETE FROM track_genres WHERE track_id NOT IN (SELECT id FROM tracks)",
    r#"DELETE FROM genres
       WHERE id NOT IN (SELECT visual_genre_id FROM tracks WHERE visual_genre_id IS NOT NULL)
         AND id NOT IN (SELECT genre_id FROM track_genres)"#,
    "DELETE FROM albums WHERE id NOT IN (SELECT album_id FROM tracks WHERE album_id IS NOT NULL)",
    "DELETE FROM track_meta WHERE track_id NOT IN (SELECT id FROM tracks)",
    "DELETE FROM meta_values WHERE id NOT IN (SELECT meta_value_id FROM track_meta)",
    "DELETE FROM meta_keys WHERE id NOT IN (SELECT meta_key_id FROM meta_values)",
    "DELETE FROM replay_gain WHERE track_id NOT IN (SELECT id FROM tracks)",
    "DELETE FROM directories WHERE id NOT IN (SELECT directory_id FROM tracks WHERE directory_id IS NOT NULL)",
];

/// Tables whose `sort_order` follows their case-insensitive trimmed name
const SORTED: &[(&str, &str)] = &[
    ("genres", "name"),
    ("artists", "name"),
    ("albums", "name"),
    ("meta_values", "content"),
];

/// Delete local tracks whose root directory is no longer registered
pub async fn delete_tracks_without_path(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM tracks
         WHERE source_id = 0
           AND (path_id IS NULL OR path_id NOT IN (SELECT id FROM paths))",
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Remove lookup, metadata, replay gain and directory rows nothing refers to
pub async fn cleanup(conn: &mut SqliteConnection) -> Result<()> {
    for statement in CLEANUP {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Reassign dense, zero-based `sort_order` values by name
///
/// Returns the number of rows ordered across all tables.
pub async fn optimize(conn: &mut SqliteConnection) -> Result<u64> {
    let mut total = 0;

    for (table, column) in SORTED {
        let ids: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {table} ORDER BY lower(trim({column})), id"
        ))
        .fetch_all(&mut *conn)
        .await?;

        for (order, id) in ids.iter().enumerate() {
            sqlx::query(&format!("UPDATE {table} SET sort_order = ? WHERE id = ?"))
                .bind(order as i64)
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }

        total += ids.len() as u64;
    }

    Ok(total)
}

/// Reclaim free pages; must run outside any transaction
pub async fn vacuum(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("VACUUM").execute(&mut *conn).await?;
    Ok(())
}
