use soul_core::error::Result;
use soul_core::types::SourceId;
use sqlx::SqliteConnection;

/// Rewrite every playlist's `sort_order` as 0, 1, 2, ...
///
/// Entries keep their relative order; ties on `sort_order` fall back to
/// insertion order. Returns the number of playlists visited.
pub async fn repair_sort_order(conn: &mut SqliteConnection) -> Result<u64> {
    let playlists: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT id FROM playlists ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    for playlist_id in &playlists {
        // Collected up front; the rows are rewritten below.
        let entries: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM playlist_tracks WHERE playlist_id = ? ORDER BY sort_order, id",
        )
        .bind(playlist_id)
        .fetch_all(&mut *conn)
        .await?;

        for (order, entry_id) in entries.iter().enumerate() {
            sqlx::query("UPDATE playlist_tracks SET sort_order = ? WHERE id = ?")
                .bind(order as i64)
                .bind(entry_id)
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(playlists.len() as u64)
}

/// Drop entries of `source_id` whose external id the source no longer reports
pub async fn remove_unresolved_entries(
    conn: &mut SqliteConnection,
    source_id: SourceId,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM playlist_tracks
        WHERE source_id = ?
          AND track_external_id NOT IN (
              SELECT DISTINCT external_id FROM tracks
              WHERE source_id = ? AND external_id IS NOT NULL
          )
        "#,
    )
    .bind(source_id)
    .bind(source_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
