//! End-to-end indexer scenarios against a real library database


use async_trait::async_trait;
use soul_core::types::keys;
use soul_core::{
    Analyzer, IndexerSource, IndexerWriter, ScanPaths, ScanResult, SoulError, SourceId,
    SyncType, TagReader, TagStore, TrackRecord,
};
use soul_indexer::{Indexer, IndexerConfig, IndexerEvent, IndexerState, PluginRegistry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_helpers::*;
use tokio::sync::broadcast;

fn with_reader(reader: &Arc<FakeTagReader>) -> PluginRegistry {
    let mut plugins = PluginRegistry::new();
    plugins
        .tag_readers
        .push(Arc::clone(reader) as Arc<dyn TagReader>);
    plugins
}

async fn indexer(config: IndexerConfig, plugins: PluginRegistry) -> Indexer {
    Indexer::new(config, plugins)
        .await
        .expect("Failed to create indexer")
}

/// Run one cycle to completion and return its processed count
async fn run(indexer: &Indexer, sync_type: SyncType, source_id: Option<SourceId>) -> u64 {
    let mut events = indexer.subscribe();
    indexer.schedule(sync_type, source_id);
    wait_finished(&mut events).await
}

/// Every event up to and including the next `Finished`
async fn events_until_finished(events: &mut broadcast::Receiver<IndexerEvent>) -> Vec<IndexerEvent> {
    let collect = async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("Event channel failed");
            seen.push(event);
            if matches!(event, IndexerEvent::Finished(_)) {
                return seen;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), collect)
        .await
        .expect("Timed out waiting for Finished")
}

// ============================================================================
// Lifecycle and queue
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_state_follows_lifecycle() {
    let lib = TestLibrary::new().await;
    let indexer = indexer(lib.config(1), PluginRegistry::new()).await;

    assert_eq!(indexer.state(), IndexerState::Stopped);

    run(&indexer, SyncType::Local, None).await;
    wait_until("idle", || indexer.state() == IndexerState::Idle).await;

    indexer.shutdown();
    assert_eq!(indexer.state(), IndexerState::Stopped);

    // Second shutdown is a no-op
    indexer.shutdown();
    assert_eq!(indexer.state(), IndexerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_requests_collapse_while_busy() {
    let lib = TestLibrary::new().await;
    let source = Arc::new(FakeSource::new(3).closed());
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    let mut events = indexer.subscribe();
    indexer.schedule(SyncType::All, None);
    wait_until("scan to start", || source.scanning.load(Ordering::SeqCst)).await;

    for _ in 0..3 {
        indexer.schedule(SyncType::Local, None);
    }
    indexer.schedule(SyncType::Sources, Some(3));
    indexer.schedule(SyncType::Sources, Some(3));
    source.open_gate();

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.extend(events_until_finished(&mut events).await);
    }
    wait_until("idle", || indexer.state() == IndexerState::Idle).await;

    let started = seen
        .iter()
        .filter(|event| **event == IndexerEvent::Started)
        .count();
    assert_eq!(started, 3);
    assert!(drain(&mut events).is_empty());
    assert_eq!(source.scan_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_running_cycle() {
    let lib = TestLibrary::new().await;
    lib.execute("INSERT INTO artists (name) VALUES ('Nobody')").await;

    let source = Arc::new(FakeSource::new(4).closed());
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    let mut events = indexer.subscribe();
    indexer.schedule(SyncType::All, None);
    wait_until("scan to start", || source.scanning.load(Ordering::SeqCst)).await;

    indexer.shutdown();

    assert_eq!(indexer.state(), IndexerState::Stopped);
    assert!(source.interrupted.load(Ordering::SeqCst));
    assert_eq!(source.after.load(Ordering::SeqCst), 1);

    let seen = drain(&mut events);
    assert!(seen.contains(&IndexerEvent::Started));
    assert!(!seen
        .iter()
        .any(|event| matches!(event, IndexerEvent::Finished(_))));

    // Cleanup never ran
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM artists").await, 1);

    // A fresh thread picks up new work
    source.open_gate();
    run(&indexer, SyncType::Local, None).await;
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM artists").await, 0);
}

// ============================================================================
// Local files
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_local_scan_indexes_readable_files() {
    let lib = TestLibrary::new().await;
    let alpha = lib.write("alpha.fake", "Alpha");
    lib.write("nested/deeper/beta.fake", "Beta");
    lib.write("notes.txt", "not music");
    lib.write("broken.fake", "garbage");
    lib.write("cursed.fake", "panic");

    let reader = FakeTagReader::new();
    let indexer = indexer(lib.config(2), with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    let processed = run(&indexer, SyncType::Local, None).await;

    // Every readable extension counts, whether or not the read succeeded
    assert_eq!(processed, 4);
    assert_eq!(
        lib.strings("SELECT title FROM tracks ORDER BY title").await,
        vec!["Alpha", "Beta"]
    );
    assert_eq!(
        lib.scalar("SELECT COUNT(*) FROM tracks WHERE source_id = 0 AND path_id IS NOT NULL")
            .await,
        2
    );
    assert_eq!(
        lib.scalar("SELECT COUNT(*) FROM tracks WHERE length(external_id) = 64")
            .await,
        2
    );
    assert_eq!(reader.reads_of(&alpha), 1);
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM artists").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_local_scan_reads_nothing_new() {
    let lib = TestLibrary::new().await;
    let alpha = lib.write("alpha.fake", "Alpha");
    let beta = lib.write("beta.fake", "Beta");

    let reader = FakeTagReader::new();
    let indexer = indexer(lib.config(4), with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;
    let ids = lib.strings("SELECT CAST(id AS TEXT) FROM tracks ORDER BY id").await;

    run(&indexer, SyncType::Local, None).await;

    assert_eq!(reader.reads_of(&alpha), 1);
    assert_eq!(reader.reads_of(&beta), 1);
    assert_eq!(
        lib.strings("SELECT CAST(id AS TEXT) FROM tracks ORDER BY id").await,
        ids
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changed_file_is_read_again() {
    let lib = TestLibrary::new().await;
    let alpha = lib.write("alpha.fake", "Alpha");

    let reader = FakeTagReader::new();
    let indexer = indexer(lib.config(1), with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;
    let id = lib.scalar("SELECT id FROM tracks").await;

    lib.write("alpha.fake", "Alpha (Remastered)");
    run(&indexer, SyncType::Local, None).await;

    assert_eq!(reader.reads_of(&alpha), 2);
    assert_eq!(lib.scalar("SELECT id FROM tracks").await, id);
    assert_eq!(
        lib.strings("SELECT title FROM tracks").await,
        vec!["Alpha (Remastered)"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_pool_processes_each_file_once() {
    let lib = TestLibrary::new().await;
    for i in 0..1000 {
        lib.write(&format!("disc{}/track{i:04}.fake", i % 10), &format!("Track {i}"));
    }

    let reader = FakeTagReader::new();
    let indexer = indexer(lib.config(4), with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    let mut events = indexer.subscribe();
    indexer.schedule(SyncType::Local, None);
    let seen = events_until_finished(&mut events).await;

    assert_eq!(seen.last(), Some(&IndexerEvent::Finished(1000)));
    for checkpoint in [300, 600, 900] {
        assert!(
            seen.contains(&IndexerEvent::Progress(checkpoint)),
            "missing progress at {checkpoint}: {seen:?}"
        );
    }

    assert_eq!(reader.distinct_files(), 1000);
    assert_eq!(reader.max_reads_per_file(), 1);
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_path_drops_its_tracks() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");

    let reader = FakeTagReader::new();
    let indexer = indexer(lib.config(1), with_reader(&reader)).await;
    let root = lib.music_root();

    indexer.add_path(&root);
    let paths = indexer.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with(&root));
    run(&indexer, SyncType::Local, None).await;
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 1);
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM paths").await, 1);

    indexer.remove_path(&root);
    assert!(indexer.paths().is_empty());
    run(&indexer, SyncType::Local, None).await;

    assert_eq!(lib.scalar("SELECT COUNT(*) FROM paths").await, 0);
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 0);
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM albums").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_files_are_removed() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");
    let beta = lib.write("beta.fake", "Beta");

    let reader = FakeTagReader::new();
    let indexer = indexer(lib.config(2), with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 2);

    std::fs::remove_file(&beta).unwrap();
    run(&indexer, SyncType::Local, None).await;

    assert_eq!(lib.strings("SELECT title FROM tracks").await, vec!["Alpha"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_files_are_kept_when_disabled() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");
    let beta = lib.write("beta.fake", "Beta");

    let mut config = lib.config(2);
    config.remove_missing_files = false;

    let reader = FakeTagReader::new();
    let indexer = indexer(config, with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;
    std::fs::remove_file(&beta).unwrap();
    run(&indexer, SyncType::Local, None).await;

    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scan_log_records_files() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");

    let mut config = lib.config(1);
    config.log_enabled = true;
    let log_path = config.log_path();

    let reader = FakeTagReader::new();
    let indexer = indexer(config, with_reader(&reader)).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;
    indexer.shutdown();

    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("SYNCING LOCAL FILES:"));
    assert!(log.contains("alpha.fake"));
}

enum ReadOutcome {
    Panic,
    Fail,
    Decline,
    Succeed(&'static str),
}

/// Tag reader with a fixed outcome that counts its calls
struct ScriptedReader {
    name: &'static str,
    outcome: ReadOutcome,
    calls: AtomicUsize,
}

impl ScriptedReader {
    fn new(name: &'static str, outcome: ReadOutcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }
}

impl TagReader for ScriptedReader {
    fn name(&self) -> &str {
        self.name
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "fake"
    }

    fn read(&self, _path: &Path, store: &mut dyn TagStore) -> soul_core::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            ReadOutcome::Panic => panic!("{} exploded", self.name),
            ReadOutcome::Fail => Err(SoulError::metadata("unreadable tags")),
            ReadOutcome::Decline => Ok(false),
            ReadOutcome::Succeed(title) => {
                store.set_value(keys::TITLE, title);
                Ok(true)
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_successful_tag_reader_wins() {
    let lib = TestLibrary::new().await;
    lib.write("song.fake", "ignored");

    let readers = [
        ScriptedReader::new("panicking", ReadOutcome::Panic),
        ScriptedReader::new("failing", ReadOutcome::Fail),
        ScriptedReader::new("declining", ReadOutcome::Decline),
        ScriptedReader::new("second", ReadOutcome::Succeed("From second")),
        ScriptedReader::new("third", ReadOutcome::Succeed("From third")),
    ];
    let mut plugins = PluginRegistry::new();
    for reader in &readers {
        plugins
            .tag_readers
            .push(Arc::clone(reader) as Arc<dyn TagReader>);
    }
    let indexer = indexer(lib.config(1), plugins).await;
    indexer.add_path(&lib.music_root());

    assert_eq!(run(&indexer, SyncType::Local, None).await, 1);

    assert_eq!(
        lib.strings("SELECT title FROM tracks").await,
        vec!["From second"]
    );
    let calls: Vec<usize> = readers
        .iter()
        .map(|reader| reader.calls.load(Ordering::SeqCst))
        .collect();
    assert_eq!(calls, vec![1, 1, 1, 1, 0]);
}

// ============================================================================
// Sources
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orphaned_source_tracks_are_swept() {
    let lib = TestLibrary::new().await;
    lib.insert(source_track(7, "gone", "Gone")).await;
    lib.insert(source_track(3, "kept", "Kept")).await;

    let source = Arc::new(FakeSource::new(3).with_items(&[("fresh", "Fresh")]));
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks WHERE source_id = 7").await, 0);
    assert_eq!(
        lib.strings("SELECT external_id FROM tracks WHERE source_id = 3 ORDER BY id")
            .await,
        vec!["kept", "fresh"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sources_receive_live_roots() {
    let lib = TestLibrary::new().await;
    let source = Arc::new(FakeSource::new(8));
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    indexer.add_path(&lib.music_root());
    indexer.add_path("/definitely/not/a/real/music/dir");
    run(&indexer, SyncType::Sources, None).await;

    let roots = source.scanned_paths.lock().unwrap().clone();
    assert_eq!(roots.len(), 1);
    assert!(roots[0].starts_with(PathBuf::from(lib.music_root())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rebuild_purges_stable_sources_and_rereads_local_files() {
    let lib = TestLibrary::new().await;
    let song = lib.write("song.fake", "Song");
    lib.insert(source_track(5, "gone", "Gone")).await;
    lib.insert(source_track(6, "old", "Old")).await;

    let stable = Arc::new(FakeSource::new(5).with_items(&[("a", "A")]));
    let unstable = Arc::new(FakeSource::new(6).unstable().with_items(&[("n", "N")]));

    let reader = FakeTagReader::new();
    let plugins = with_reader(&reader)
        .with_source(stable.clone())
        .with_source(unstable.clone());
    let indexer = indexer(lib.config(2), plugins).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::All, None).await;
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks WHERE external_id = 'gone'").await, 1);
    let song_id = lib.scalar("SELECT id FROM tracks WHERE source_id = 0").await;

    run(&indexer, SyncType::Rebuild, None).await;

    assert_eq!(
        lib.strings("SELECT external_id FROM tracks WHERE source_id = 5").await,
        vec!["a"]
    );
    assert_eq!(
        lib.strings("SELECT external_id FROM tracks WHERE source_id = 6 ORDER BY id")
            .await,
        vec!["old", "n"]
    );
    assert_eq!(reader.reads_of(&song), 2);
    assert_eq!(lib.scalar("SELECT id FROM tracks WHERE source_id = 0").await, song_id);
    assert_eq!(stable.scan_count(), 2);
    assert_eq!(unstable.scan_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_sources_roll_back_and_the_next_one_runs() {
    let lib = TestLibrary::new().await;

    let rollback = Arc::new(
        FakeSource::new(11)
            .with_items(&[("r", "R")])
            .with_behavior(ScanBehavior::Rollback),
    );
    let failing = Arc::new(
        FakeSource::new(12)
            .with_items(&[("f", "F")])
            .with_behavior(ScanBehavior::Fail),
    );
    let panicking = Arc::new(
        FakeSource::new(13)
            .with_items(&[("p", "P")])
            .with_behavior(ScanBehavior::Panic),
    );
    let healthy = Arc::new(FakeSource::new(14).with_items(&[("c", "C")]));

    let plugins = PluginRegistry::new()
        .with_source(rollback.clone())
        .with_source(failing.clone())
        .with_source(panicking.clone())
        .with_source(healthy.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(
        lib.scalar("SELECT COUNT(*) FROM tracks WHERE source_id IN (11, 12, 13)")
            .await,
        0
    );
    assert_eq!(
        lib.strings("SELECT title FROM tracks WHERE source_id = 14").await,
        vec!["C"]
    );

    for source in [&rollback, &failing, &panicking, &healthy] {
        assert_eq!(source.before.load(Ordering::SeqCst), 1, "source {}", source.id);
        assert_eq!(source.after.load(Ordering::SeqCst), 1, "source {}", source.id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_targeted_scan_only_runs_that_source() {
    let lib = TestLibrary::new().await;
    let first = Arc::new(FakeSource::new(15));
    let second = Arc::new(FakeSource::new(16));

    let plugins = PluginRegistry::new()
        .with_source(first.clone())
        .with_source(second.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, Some(16)).await;

    assert_eq!(first.scan_count(), 0);
    assert_eq!(second.scan_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reserved_source_id_is_never_scanned() {
    let lib = TestLibrary::new().await;
    let reserved = Arc::new(FakeSource::new(0).with_items(&[("x", "X")]));
    let plugins = PluginRegistry::new().with_source(reserved.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(reserved.before.load(Ordering::SeqCst), 0);
    assert_eq!(reserved.scan_count(), 0);
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_per_track_scan_refreshes_owned_tracks() {
    let lib = TestLibrary::new().await;
    let source = Arc::new(
        FakeSource::new(21)
            .with_track_scan()
            .with_items(&[("one", "One"), ("two", "Two")]),
    );
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(*source.track_scans.lock().unwrap(), vec!["one", "two"]);
    assert_eq!(
        lib.strings("SELECT title FROM tracks ORDER BY id").await,
        vec!["One (refreshed)", "Two (refreshed)"]
    );
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks").await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_commit_progress_feeds_the_scan_counter() {
    let lib = TestLibrary::new().await;
    let mut source = FakeSource::new(31);
    source.progress = 450;
    let plugins = PluginRegistry::new().with_source(Arc::new(source));
    let indexer = indexer(lib.config(1), plugins).await;

    let mut events = indexer.subscribe();
    indexer.schedule(SyncType::Sources, None);
    let seen = events_until_finished(&mut events).await;

    assert_eq!(seen.last(), Some(&IndexerEvent::Finished(450)));
    assert!(seen.contains(&IndexerEvent::Progress(450)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_schedule_rescan_queues_a_targeted_cycle() {
    let lib = TestLibrary::new().await;
    let source = Arc::new(FakeSource::new(41));
    source.rescan_once.store(true, Ordering::SeqCst);
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    let mut events = indexer.subscribe();
    indexer.schedule(SyncType::All, None);
    events_until_finished(&mut events).await;
    events_until_finished(&mut events).await;

    assert_eq!(source.scan_count(), 2);
}

/// Probes every writer operation from inside a scan
struct ProbeSource {
    results: Mutex<Vec<(&'static str, bool)>>,
}

impl ProbeSource {
    fn record(&self, check: &'static str, passed: bool) {
        self.results.lock().unwrap().push((check, passed));
    }
}

#[async_trait]
impl IndexerSource for ProbeSource {
    fn source_id(&self) -> SourceId {
        51
    }

    fn has_stable_ids(&self) -> bool {
        true
    }

    async fn scan(&self, writer: &dyn IndexerWriter, _paths: &ScanPaths) -> soul_core::Result<ScanResult> {
        let impostor = FakeSource::new(0);

        let saved = writer
            .save(&impostor, source_track(0, "x", "Impostor"), "x")
            .await;
        self.record("impostor save", !saved);
        self.record("impostor remove_all", writer.remove_all(&impostor).await == 0);
        self.record(
            "impostor remove_by_uri",
            !writer.remove_by_uri(&impostor, "stream://0/x").await,
        );
        self.record(
            "impostor last_modified_time",
            writer.last_modified_time(&impostor, "x").await.is_none(),
        );

        self.record(
            "empty external id",
            !writer.save(self, writer.create_writer(), "").await,
        );
        self.record("empty uri", !writer.remove_by_uri(self, "").await);
        self.record(
            "empty external id removal",
            !writer.remove_by_external_id(self, "").await,
        );

        let mut track = writer.create_writer();
        track.set_value(keys::TITLE, "Probe");
        track.set_value(keys::FILENAME, "stream://51/probe");
        track.set_value(keys::FILETIME, "1234");
        self.record("save", writer.save(self, track, "probe").await);
        self.record(
            "last_modified_time",
            writer.last_modified_time(self, "probe").await == Some(1234),
        );

        let mut doomed = writer.create_writer();
        doomed.set_value(keys::FILENAME, "stream://51/doomed");
        self.record("save doomed", writer.save(self, doomed, "doomed").await);
        self.record(
            "remove_by_uri",
            writer.remove_by_uri(self, "stream://51/doomed").await,
        );

        Ok(ScanResult::Commit)
    }

    fn interrupt(&self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writer_validates_callers_and_arguments() {
    let lib = TestLibrary::new().await;
    let probe = Arc::new(ProbeSource {
        results: Mutex::new(Vec::new()),
    });
    let plugins = PluginRegistry::new().with_source(probe.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    let results = probe.results.lock().unwrap().clone();
    assert_eq!(results.len(), 11);
    for (check, passed) in results {
        assert!(passed, "writer check failed: {check}");
    }

    assert_eq!(
        lib.strings("SELECT external_id FROM tracks").await,
        vec!["probe"]
    );
    assert_eq!(lib.scalar("SELECT COUNT(*) FROM tracks WHERE source_id = 0").await, 0);
}

/// Saves a record bound to a row it does not own
struct ForgingSource {
    target: AtomicI64,
    path_id: AtomicI64,
}

#[async_trait]
impl IndexerSource for ForgingSource {
    fn source_id(&self) -> SourceId {
        9
    }

    fn has_stable_ids(&self) -> bool {
        true
    }

    async fn scan(&self, writer: &dyn IndexerWriter, _paths: &ScanPaths) -> soul_core::Result<ScanResult> {
        let target = self.target.load(Ordering::SeqCst);
        if target == 0 {
            return Ok(ScanResult::Commit);
        }

        let mut track = TrackRecord::with_id(target);
        track.set_value(keys::TITLE, "hijacked");
        track.set_value(keys::FILENAME, "stream://9/stolen");
        track.set_value(keys::PATH_ID, &self.path_id.load(Ordering::SeqCst).to_string());

        if writer.save(self, track, "stolen").await {
            Ok(ScanResult::Commit)
        } else {
            Ok(ScanResult::Rollback)
        }
    }

    fn interrupt(&self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sources_cannot_overwrite_rows_by_id() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");

    let reader = FakeTagReader::new();
    let source = Arc::new(ForgingSource {
        target: AtomicI64::new(0),
        path_id: AtomicI64::new(0),
    });
    let plugins = with_reader(&reader).with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;
    indexer.add_path(&lib.music_root());
    run(&indexer, SyncType::Local, None).await;

    let local_id = lib.scalar("SELECT id FROM tracks WHERE source_id = 0").await;
    let path_id = lib.scalar("SELECT path_id FROM tracks WHERE source_id = 0").await;
    source.target.store(local_id, Ordering::SeqCst);
    source.path_id.store(path_id, Ordering::SeqCst);

    run(&indexer, SyncType::Sources, Some(9)).await;

    assert_eq!(
        lib.scalar(&format!(
            "SELECT COUNT(*) FROM tracks WHERE id = {local_id} AND source_id = 0 AND title = 'Alpha'"
        ))
        .await,
        1
    );
    assert_eq!(
        lib.strings("SELECT source_id || ':' || title FROM tracks ORDER BY id").await,
        vec!["0:Alpha", "9:hijacked"]
    );
    assert_eq!(
        lib.scalar("SELECT COUNT(*) FROM tracks WHERE source_id = 9 AND path_id IS NOT NULL")
            .await,
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crash_during_track_scan_ends_the_pass() {
    let lib = TestLibrary::new().await;
    let source = Arc::new(
        FakeSource::new(22)
            .with_track_scan()
            .with_items(&[("one", "One"), ("two", "crash"), ("three", "Three")]),
    );
    let plugins = PluginRegistry::new().with_source(source.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(*source.track_scans.lock().unwrap(), vec!["one", "two"]);
    assert_eq!(
        lib.strings("SELECT title FROM tracks ORDER BY id").await,
        vec!["One (refreshed)", "crash", "Three"]
    );
}

// ============================================================================
// Finalize passes
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_playlist_order_is_repaired() {
    let lib = TestLibrary::new().await;
    lib.execute("INSERT INTO playlists (id, name) VALUES (1, 'Mix')").await;
    lib.execute(
        "INSERT INTO playlist_tracks (playlist_id, track_external_id, source_id, sort_order)
         VALUES (1, 'a', 0, 5), (1, 'b', 0, 5), (1, 'c', 0, 2)",
    )
    .await;

    let indexer = indexer(lib.config(1), PluginRegistry::new()).await;
    run(&indexer, SyncType::Local, None).await;

    assert_eq!(
        lib.strings(
            "SELECT track_external_id || ':' || sort_order FROM playlist_tracks ORDER BY sort_order"
        )
        .await,
        vec!["c:0", "a:1", "b:2"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unresolved_playlist_entries_go_for_unstable_sources() {
    let lib = TestLibrary::new().await;
    lib.execute("INSERT INTO playlists (id, name) VALUES (1, 'Stream')").await;
    lib.execute(
        "INSERT INTO playlist_tracks (playlist_id, track_external_id, source_id, sort_order)
         VALUES (1, 'live', 61, 0), (1, 'vanished', 61, 1), (1, 'elsewhere', 62, 2)",
    )
    .await;

    let unstable = Arc::new(FakeSource::new(61).unstable().with_items(&[("live", "Live")]));
    let stable = Arc::new(FakeSource::new(62));
    let plugins = PluginRegistry::new()
        .with_source(unstable.clone())
        .with_source(stable.clone());
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(
        lib.strings("SELECT track_external_id FROM playlist_tracks ORDER BY sort_order")
            .await,
        vec!["live", "elsewhere"]
    );
    assert_eq!(
        lib.strings("SELECT CAST(sort_order AS TEXT) FROM playlist_tracks ORDER BY sort_order")
            .await,
        vec!["0", "1"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_optimize_orders_lookup_names() {
    let lib = TestLibrary::new().await;
    for (external_id, artist) in [("z", "Zed"), ("a", "abba"), ("m", "Mid")] {
        let mut track = source_track(71, external_id, external_id);
        track.set_value(keys::ARTIST, artist);
        lib.insert(track).await;
    }

    let plugins = PluginRegistry::new().with_source(Arc::new(FakeSource::new(71)));
    let indexer = indexer(lib.config(1), plugins).await;

    run(&indexer, SyncType::Sources, None).await;

    assert_eq!(
        lib.strings("SELECT name FROM artists ORDER BY sort_order").await,
        vec!["abba", "Mid", "Zed"]
    );
    assert_eq!(
        lib.strings("SELECT CAST(sort_order AS TEXT) FROM artists ORDER BY sort_order")
            .await,
        vec!["0", "1", "2"]
    );
}

// ============================================================================
// Analyzers
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_analyzers_run_on_accepted_tracks() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");
    lib.write("skipped.fake", "skip me");

    let reader = FakeTagReader::new();
    let counter = FrameCounter::new();
    let mut plugins = with_reader(&reader).with_decoder(FakeDecoder);
    plugins
        .analyzers
        .push(Arc::clone(&counter) as Arc<dyn Analyzer>);

    let indexer = indexer(lib.config(2), plugins).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;

    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    assert_eq!(counter.ended.load(Ordering::SeqCst), 1);
    assert_eq!(
        lib.strings(
            "SELECT v.content FROM meta_values v
             JOIN meta_keys k ON k.id = v.meta_key_id
             WHERE k.name = 'analyzed_frames'"
        )
        .await,
        vec!["8192"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_analyzers_skip_tracks_without_a_decoder() {
    let lib = TestLibrary::new().await;
    lib.write("alpha.fake", "Alpha");

    let reader = FakeTagReader::new();
    let counter = FrameCounter::new();
    let mut plugins = with_reader(&reader);
    plugins
        .analyzers
        .push(Arc::clone(&counter) as Arc<dyn Analyzer>);

    let indexer = indexer(lib.config(1), plugins).await;
    indexer.add_path(&lib.music_root());

    run(&indexer, SyncType::Local, None).await;

    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    assert_eq!(counter.ended.load(Ordering::SeqCst), 0);
    assert_eq!(
        lib.scalar("SELECT COUNT(*) FROM meta_keys WHERE name = 'analyzed_frames'")
            .await,
        0
    );
}
