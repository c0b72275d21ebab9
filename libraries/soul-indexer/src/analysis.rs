//! Analyzer pipeline
//!
//! Decodes every track once and streams the buffers to the analyzers that
//! accepted it. Tracks are saved again when any analyzer reports success.

use crate::cycle::Cycle;
use crate::indexer::PluginRegistry;
use crate::Result;
use soul_core::{Analyzer, StreamOptions, TrackId, TrackRecord};
use soul_storage::tracks;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub(crate) async fn run(cycle: &Cycle) -> Result<()> {
    if cycle.shared.plugins.analyzers.is_empty() {
        return Ok(());
    }

    tracing::info!(
        analyzers = cycle.shared.plugins.analyzers.len(),
        "running analyzers"
    );

    let mut last_id: TrackId = 0;
    let mut saved = 0_u64;

    loop {
        let (id, track) = {
            let mut conn = cycle.pool.acquire().await?;
            let Some(id) = tracks::next_id_after(&mut conn, last_id).await? else {
                break;
            };
            (id, tracks::load(&mut conn, id).await?)
        };
        last_id = id;

        if let Some(track) = track {
            let shared = Arc::clone(&cycle.shared);
            let analyzed =
                tokio::task::spawn_blocking(move || analyze_track(&shared.plugins, track)).await;

            match analyzed {
                Ok(Some(mut track)) => match save(cycle, &mut track).await {
                    Ok(()) => saved += 1,
                    Err(e) => tracing::warn!(track_id = id, "Failed to save analyzed track: {}", e),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(track_id = id, "Analyzer task failed: {}", e),
            }
        }

        if cycle.bail() {
            tracing::info!("analyzers interrupted");
            return Ok(());
        }
    }

    tracing::info!(tracks = saved, "analyzers finished");
    Ok(())
}

async fn save(cycle: &Cycle, track: &mut TrackRecord) -> Result<()> {
    let mut tx = cycle.pool.begin().await?;
    tracks::save(&mut tx, track).await?;
    tx.commit().await?;
    Ok(())
}

fn guarded(name: &str, call: impl FnOnce() -> bool) -> bool {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|_| {
        tracing::warn!(analyzer = name, "Analyzer panicked");
        false
    })
}

/// Run one track through the analyzers
///
/// Returns the track when it should be saved. A track nobody accepts, or
/// whose audio cannot be opened, is left alone.
pub(crate) fn analyze_track(plugins: &PluginRegistry, mut track: TrackRecord) -> Option<TrackRecord> {
    let accepted: Vec<&Arc<dyn Analyzer>> = plugins
        .analyzers
        .iter()
        .filter(|analyzer| guarded(analyzer.name(), || analyzer.start(&mut track)))
        .collect();

    if accepted.is_empty() {
        return None;
    }

    let uri = track.filename()?.to_string();
    let Some(decoder) = plugins.decoders.iter().find(|d| d.can_decode(&uri)) else {
        tracing::debug!(uri = %uri, "no decoder for track");
        return None;
    };

    let options = StreamOptions::default();
    let mut stream = match catch_unwind(AssertUnwindSafe(|| decoder.open(&uri, &options))) {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(uri = %uri, "Cannot open stream: {}", e);
            return None;
        }
        Err(_) => {
            tracing::warn!(uri = %uri, "Decoder panicked opening stream");
            return None;
        }
    };

    let mut active = accepted.clone();
    while !active.is_empty() {
        let buffer = match catch_unwind(AssertUnwindSafe(|| stream.next_buffer())) {
            Ok(Ok(Some(buffer))) => buffer,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                tracing::debug!(uri = %uri, "Decode stopped: {}", e);
                break;
            }
            Err(_) => {
                tracing::warn!(uri = %uri, "Decoder panicked");
                break;
            }
        };

        active.retain(|analyzer| guarded(analyzer.name(), || analyzer.analyze(&mut track, &buffer)));
    }
    drop(stream);

    // Analyzers dropped mid-stream still get to finish
    let succeeded = accepted
        .iter()
        .filter(|analyzer| guarded(analyzer.name(), || analyzer.end(&mut track)))
        .count();

    (succeeded > 0).then_some(track)
}
