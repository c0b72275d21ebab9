use soul_core::error::Result;
use soul_core::types::{keys, ReplayGain, SourceId, TrackId, TrackRecord, LOCAL_SOURCE_ID};
use soul_core::TagStore;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::path::Path;

/// Size and modification time recorded for a local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub id: TrackId,
    pub filesize: i64,
    pub filetime: i64,
}

/// A track owned by a plugin source, as handed to its per-track refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTrackRef {
    pub id: TrackId,
    pub filename: Option<String>,
    pub external_id: Option<String>,
}

/// Column values of one `tracks` row, extracted from a record
struct TrackColumns {
    track: Option<i64>,
    disc: Option<i64>,
    bpm: Option<f64>,
    duration: Option<i64>,
    filesize: i64,
    year: Option<i64>,
    title: Option<String>,
    filename: Option<String>,
    filetime: i64,
    path_id: Option<i64>,
    directory_id: Option<i64>,
    album_id: Option<i64>,
    visual_artist_id: Option<i64>,
    album_artist_id: Option<i64>,
    visual_genre_id: Option<i64>,
    source_id: SourceId,
    external_id: Option<String>,
}

/// Signature of the local track stored for `filename`, if any
pub async fn local_signature(
    conn: &mut SqliteConnection,
    filename: &str,
) -> Result<Option<FileSignature>> {
    let row = sqlx::query(
        "SELECT id, filesize, filetime FROM tracks
         WHERE source_id = 0 AND filename = ?
         ORDER BY id LIMIT 1",
    )
    .bind(filename)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| FileSignature {
        id: row.get("id"),
        filesize: row.get("filesize"),
        filetime: row.get("filetime"),
    }))
}

/// Id of the row in one of the name lookup tables, inserting it if needed
async fn lookup_id(conn: &mut SqliteConnection, table: &'static str, name: &str) -> Result<i64> {
    sqlx::query(&format!(
        "INSERT INTO {table} (name) VALUES (?) ON CONFLICT(name) DO NOTHING"
    ))
    .bind(name)
    .execute(&mut *conn)
    .await?;

    let id: i64 = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE name = ?"))
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}

async fn optional_lookup_id(
    conn: &mut SqliteConnection,
    table: &'static str,
    name: Option<&str>,
) -> Result<Option<i64>> {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Ok(Some(lookup_id(conn, table, name).await?)),
        None => Ok(None),
    }
}

/// Row to overwrite when saving `track`
///
/// Resolved by the record's own id, then `(source_id, external_id)` for
/// source tracks, then `filename` for local tracks.
async fn existing_id(conn: &mut SqliteConnection, track: &TrackRecord) -> Result<Option<TrackId>> {
    if let Some(id) = track.id() {
        return Ok(Some(id));
    }

    let source_id = track.source_id();
    let id: Option<TrackId> = if source_id == LOCAL_SOURCE_ID {
        match track.filename() {
            Some(filename) => {
                sqlx::query_scalar(
                    "SELECT id FROM tracks WHERE source_id = 0 AND filename = ? ORDER BY id LIMIT 1",
                )
                .bind(filename)
                .fetch_optional(&mut *conn)
                .await?
            }
            None => None,
        }
    } else {
        match track.external_id() {
            Some(external_id) => {
                sqlx::query_scalar(
                    "SELECT id FROM tracks WHERE source_id = ? AND external_id = ? ORDER BY id LIMIT 1",
                )
                .bind(source_id)
                .bind(external_id)
                .fetch_optional(&mut *conn)
                .await?
            }
            None => None,
        }
    };

    Ok(id)
}

async fn columns(conn: &mut SqliteConnection, track: &TrackRecord) -> Result<TrackColumns> {
    let source_id = track.source_id();
    let filename = track.filename().map(str::to_string);

    let directory = filename
        .as_deref()
        .filter(|_| source_id == LOCAL_SOURCE_ID)
        .and_then(|filename| Path::new(filename).parent())
        .map(|dir| dir.to_string_lossy().into_owned());

    let artist = track.joined(keys::ARTIST);
    let album_artist = track
        .get(keys::ALBUM_ARTIST)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| artist.clone());

    Ok(TrackColumns {
        track: track.get_i64(keys::TRACK),
        disc: track.get_i64(keys::DISC),
        bpm: track.get_f64(keys::BPM),
        duration: track.get_i64(keys::DURATION),
        filesize: track.get_i64(keys::FILESIZE).unwrap_or(0),
        year: track.get_i64(keys::YEAR),
        title: track.get(keys::TITLE).map(str::to_string),
        filetime: track.get_i64(keys::FILETIME).unwrap_or(0),
        path_id: track.get_i64(keys::PATH_ID),
        directory_id: optional_lookup_id(conn, "directories", directory.as_deref()).await?,
        album_id: optional_lookup_id(conn, "albums", track.get(keys::ALBUM)).await?,
        visual_artist_id: optional_lookup_id(conn, "artists", artist.as_deref()).await?,
        album_artist_id: optional_lookup_id(conn, "artists", album_artist.as_deref()).await?,
        visual_genre_id: optional_lookup_id(conn, "genres", track.joined(keys::GENRE).as_deref())
            .await?,
        source_id,
        external_id: track.external_id().map(str::to_string),
        filename,
    })
}

async fn insert_row(conn: &mut SqliteConnection, c: &TrackColumns) -> Result<TrackId> {
    let result = sqlx::query(
        r#"
        INSERT INTO tracks (
            track, disc, bpm, duration, filesize, year, title, filename, filetime,
            path_id, directory_id, album_id, visual_artist_id, album_artist_id,
            visual_genre_id, source_id, external_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(c.track)
    .bind(c.disc)
    .bind(c.bpm)
    .bind(c.duration)
    .bind(c.filesize)
    .bind(c.year)
    .bind(&c.title)
    .bind(&c.filename)
    .bind(c.filetime)
    .bind(c.path_id)
    .bind(c.directory_id)
    .bind(c.album_id)
    .bind(c.visual_artist_id)
    .bind(c.album_artist_id)
    .bind(c.visual_genre_id)
    .bind(c.source_id)
    .bind(&c.external_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn update_row(conn: &mut SqliteConnection, id: TrackId, c: &TrackColumns) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tracks SET
            track = ?, disc = ?, bpm = ?, duration = ?, filesize = ?, year = ?,
            title = ?, filename = ?, filetime = ?, path_id = ?, directory_id = ?,
            album_id = ?, visual_artist_id = ?, album_artist_id = ?,
            visual_genre_id = ?, source_id = ?, external_id = ?
        WHERE id = ?
        "#,
    )
    .bind(c.track)
    .bind(c.disc)
    .bind(c.bpm)
    .bind(c.duration)
    .bind(c.filesize)
    .bind(c.year)
    .bind(&c.title)
    .bind(&c.filename)
    .bind(c.filetime)
    .bind(c.path_id)
    .bind(c.directory_id)
    .bind(c.album_id)
    .bind(c.visual_artist_id)
    .bind(c.album_artist_id)
    .bind(c.visual_genre_id)
    .bind(c.source_id)
    .bind(&c.external_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace the rows linking a track to artists or genres
async fn replace_links(
    conn: &mut SqliteConnection,
    track_id: TrackId,
    link_table: &'static str,
    link_column: &'static str,
    lookup_table: &'static str,
    names: &[String],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {link_table} WHERE track_id = ?"))
        .bind(track_id)
        .execute(&mut *conn)
        .await?;

    let mut seen = Vec::new();
    for name in names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        if seen.contains(&name) {
            continue;
        }
        seen.push(name);

        let lookup = lookup_id(conn, lookup_table, name).await?;
        sqlx::query(&format!(
            "INSERT INTO {link_table} (track_id, {link_column}) VALUES (?, ?)"
        ))
        .bind(track_id)
        .bind(lookup)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn replace_meta(
    conn: &mut SqliteConnection,
    track_id: TrackId,
    pairs: Vec<(String, String)>,
) -> Result<()> {
    sqlx::query("DELETE FROM track_meta WHERE track_id = ?")
        .bind(track_id)
        .execute(&mut *conn)
        .await?;

    for (key, value) in pairs {
        let key_id = lookup_id(conn, "meta_keys", &key).await?;

        sqlx::query(
            "INSERT INTO meta_values (meta_key_id, content) VALUES (?, ?)
             ON CONFLICT(meta_key_id, content) DO NOTHING",
        )
        .bind(key_id)
        .bind(&value)
        .execute(&mut *conn)
        .await?;

        let value_id: i64 =
            sqlx::query_scalar("SELECT id FROM meta_values WHERE meta_key_id = ? AND content = ?")
                .bind(key_id)
                .bind(&value)
                .fetch_one(&mut *conn)
                .await?;

        sqlx::query("INSERT INTO track_meta (track_id, meta_value_id) VALUES (?, ?)")
            .bind(track_id)
            .bind(value_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn save_replay_gain(
    conn: &mut SqliteConnection,
    track_id: TrackId,
    gain: ReplayGain,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO replay_gain (track_id, album_gain, album_peak, track_gain, track_peak)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(track_id) DO UPDATE SET
            album_gain = excluded.album_gain,
            album_peak = excluded.album_peak,
            track_gain = excluded.track_gain,
            track_peak = excluded.track_peak
        "#,
    )
    .bind(track_id)
    .bind(f64::from(gain.album_gain))
    .bind(f64::from(gain.album_peak))
    .bind(f64::from(gain.track_gain))
    .bind(f64::from(gain.track_peak))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Persist a track and its normalized metadata
///
/// Updates the matching row when one exists, inserts otherwise, and binds
/// `track` to the resulting row id.
pub async fn save(conn: &mut SqliteConnection, track: &mut TrackRecord) -> Result<TrackId> {
    let columns = columns(conn, track).await?;

    let id = match existing_id(conn, track).await? {
        Some(id) => {
            if update_row(conn, id, &columns).await? {
                id
            } else {
                insert_row(conn, &columns).await?
            }
        }
        None => insert_row(conn, &columns).await?,
    };

    replace_links(
        conn,
        id,
        "track_artists",
        "artist_id",
        "artists",
        track.get_all(keys::ARTIST),
    )
    .await?;
    replace_links(
        conn,
        id,
        "track_genres",
        "genre_id",
        "genres",
        track.get_all(keys::GENRE),
    )
    .await?;

    let pairs = track
        .extra_values()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    replace_meta(conn, id, pairs).await?;

    if let Some(gain) = track.replay_gain() {
        save_replay_gain(conn, id, gain).await?;
    }

    track.set_id(id);
    Ok(id)
}

fn set_optional<T: ToString>(track: &mut TrackRecord, key: &str, value: Option<T>) {
    if let Some(value) = value {
        track.set_value(key, &value.to_string());
    }
}

fn names(rows: &[SqliteRow]) -> Vec<String> {
    rows.iter().map(|row| row.get("name")).collect()
}

/// Full metadata of one track, including lookups and free-form pairs
pub async fn load(conn: &mut SqliteConnection, id: TrackId) -> Result<Option<TrackRecord>> {
    let Some(row) = sqlx::query(
        r#"
        SELECT
            t.track, t.disc, t.bpm, t.duration, t.filesize, t.year, t.title,
            t.filename, t.filetime, t.path_id, t.source_id, t.external_id,
            al.name AS album,
            aa.name AS album_artist,
            va.name AS visual_artist,
            vg.name AS visual_genre
        FROM tracks t
        LEFT JOIN albums al ON al.id = t.album_id
        LEFT JOIN artists aa ON aa.id = t.album_artist_id
        LEFT JOIN artists va ON va.id = t.visual_artist_id
        LEFT JOIN genres vg ON vg.id = t.visual_genre_id
        WHERE t.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let mut track = TrackRecord::with_id(id);
    set_optional(&mut track, keys::TITLE, row.get::<Option<String>, _>("title"));
    set_optional(&mut track, keys::TRACK, row.get::<Option<i64>, _>("track"));
    set_optional(&mut track, keys::DISC, row.get::<Option<i64>, _>("disc"));
    set_optional(&mut track, keys::BPM, row.get::<Option<f64>, _>("bpm"));
    set_optional(&mut track, keys::DURATION, row.get::<Option<i64>, _>("duration"));
    set_optional(&mut track, keys::YEAR, row.get::<Option<i64>, _>("year"));
    set_optional(&mut track, keys::FILENAME, row.get::<Option<String>, _>("filename"));
    set_optional(&mut track, keys::PATH_ID, row.get::<Option<i64>, _>("path_id"));
    set_optional(&mut track, keys::EXTERNAL_ID, row.get::<Option<String>, _>("external_id"));
    set_optional(&mut track, keys::ALBUM, row.get::<Option<String>, _>("album"));
    set_optional(&mut track, keys::ALBUM_ARTIST, row.get::<Option<String>, _>("album_artist"));
    track.set_value(keys::FILESIZE, &row.get::<i64, _>("filesize").to_string());
    track.set_value(keys::FILETIME, &row.get::<i64, _>("filetime").to_string());
    track.set_value(keys::SOURCE_ID, &row.get::<i64, _>("source_id").to_string());

    let artists = sqlx::query(
        "SELECT a.name FROM track_artists ta
         JOIN artists a ON a.id = ta.artist_id
         WHERE ta.track_id = ? ORDER BY ta.id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    let artists = names(&artists);
    if artists.is_empty() {
        set_optional(&mut track, keys::ARTIST, row.get::<Option<String>, _>("visual_artist"));
    }
    for artist in &artists {
        track.set_value(keys::ARTIST, artist);
    }

    let genres = sqlx::query(
        "SELECT g.name FROM track_genres tg
         JOIN genres g ON g.id = tg.genre_id
         WHERE tg.track_id = ? ORDER BY tg.id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    let genres = names(&genres);
    if genres.is_empty() {
        set_optional(&mut track, keys::GENRE, row.get::<Option<String>, _>("visual_genre"));
    }
    for genre in &genres {
        track.set_value(keys::GENRE, genre);
    }

    let meta = sqlx::query(
        "SELECT k.name, v.content FROM track_meta tm
         JOIN meta_values v ON v.id = tm.meta_value_id
         JOIN meta_keys k ON k.id = v.meta_key_id
         WHERE tm.track_id = ? ORDER BY tm.id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    for pair in meta {
        let key: String = pair.get("name");
        let content: String = pair.get("content");
        track.set_value(&key, &content);
    }

    let gain = sqlx::query(
        "SELECT album_gain, album_peak, track_gain, track_peak FROM replay_gain WHERE track_id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(gain) = gain {
        let column = |name: &str| gain.get::<Option<f64>, _>(name).unwrap_or(0.0) as f32;
        track.set_replay_gain(ReplayGain {
            album_gain: column("album_gain"),
            album_peak: column("album_peak"),
            track_gain: column("track_gain"),
            track_peak: column("track_peak"),
        });
    }

    Ok(Some(track))
}

pub async fn remove_by_uri(
    conn: &mut SqliteConnection,
    source_id: SourceId,
    uri: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tracks WHERE source_id = ? AND filename = ?")
        .bind(source_id)
        .bind(uri)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn remove_by_external_id(
    conn: &mut SqliteConnection,
    source_id: SourceId,
    external_id: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tracks WHERE source_id = ? AND external_id = ?")
        .bind(source_id)
        .bind(external_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every track owned by `source_id`
pub async fn remove_all_for_source(conn: &mut SqliteConnection, source_id: SourceId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tracks WHERE source_id = ?")
        .bind(source_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Stored `filetime` of a source track
pub async fn last_modified_time(
    conn: &mut SqliteConnection,
    source_id: SourceId,
    external_id: &str,
) -> Result<Option<i64>> {
    let filetime: Option<i64> = sqlx::query_scalar(
        "SELECT filetime FROM tracks WHERE source_id = ? AND external_id = ? ORDER BY id LIMIT 1",
    )
    .bind(source_id)
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(filetime)
}

/// Zero every stored modification time so the next scan re-reads every file
pub async fn invalidate_metadata(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("UPDATE tracks SET filetime = 0")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Source ids present in `tracks` that match neither a configured source
/// nor the local source `0`
pub async fn orphaned_source_ids(
    conn: &mut SqliteConnection,
    configured: &[SourceId],
) -> Result<Vec<SourceId>> {
    let placeholders = vec!["?"; configured.len() + 1].join(", ");
    let sql = format!(
        "SELECT DISTINCT source_id FROM tracks WHERE source_id NOT IN ({placeholders}) ORDER BY source_id"
    );

    let mut query = sqlx::query_scalar::<_, SourceId>(&sql).bind(LOCAL_SOURCE_ID);
    for id in configured {
        query = query.bind(*id);
    }

    Ok(query.fetch_all(&mut *conn).await?)
}

/// Tracks owned by a source, in id order
pub async fn for_source(
    conn: &mut SqliteConnection,
    source_id: SourceId,
) -> Result<Vec<SourceTrackRef>> {
    let rows = sqlx::query(
        "SELECT id, filename, external_id FROM tracks WHERE source_id = ? ORDER BY id",
    )
    .bind(source_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SourceTrackRef {
            id: row.get("id"),
            filename: row.get("filename"),
            external_id: row.get("external_id"),
        })
        .collect())
}

/// Smallest track id greater than `after`
pub async fn next_id_after(conn: &mut SqliteConnection, after: TrackId) -> Result<Option<TrackId>> {
    let id: Option<TrackId> = sqlx::query_scalar("SELECT id FROM tracks WHERE id > ? ORDER BY id LIMIT 1")
        .bind(after)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// `(id, filename)` of every local track
pub async fn local_files(conn: &mut SqliteConnection) -> Result<Vec<(TrackId, String)>> {
    let rows = sqlx::query(
        "SELECT id, filename FROM tracks
         WHERE source_id = 0 AND filename IS NOT NULL
         ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("filename")))
        .collect())
}

pub async fn delete(conn: &mut SqliteConnection, id: TrackId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tracks")
        .fetch_one(&mut *conn)
        .await?)
}
