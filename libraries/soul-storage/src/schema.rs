use soul_core::error::Result;
use sqlx::SqliteConnection;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS tracks_filename_index ON tracks (filename)",
    "CREATE INDEX IF NOT EXISTS tracks_external_id_index ON tracks (source_id, external_id)",
    "CREATE INDEX IF NOT EXISTS tracks_path_id_index ON tracks (path_id)",
    "CREATE INDEX IF NOT EXISTS tracks_album_id_index ON tracks (album_id)",
    "CREATE INDEX IF NOT EXISTS track_artists_track_id_index ON track_artists (track_id)",
    "CREATE INDEX IF NOT EXISTS track_genres_track_id_index ON track_genres (track_id)",
    "CREATE INDEX IF NOT EXISTS track_meta_track_id_index ON track_meta (track_id)",
    "CREATE INDEX IF NOT EXISTS meta_values_meta_key_id_index ON meta_values (meta_key_id)",
    "CREATE INDEX IF NOT EXISTS playlist_tracks_playlist_id_index ON playlist_tracks (playlist_id)",
];

/// Create the lookup indexes the indexer relies on; safe to call repeatedly
pub async fn create_indexes(conn: &mut SqliteConnection) -> Result<()> {
    for statement in INDEXES {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}
