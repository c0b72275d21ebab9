//! Public indexer handle and its background thread

use crate::config::IndexerConfig;
use crate::events::{IndexerEvent, EVENT_CAPACITY};
use crate::scan_log::ScanLog;
use crate::state::{normalize_dir, IndexerState, Inner, PathChange};
use crate::{cycle, IndexerError, Result};
use soul_core::{
    Analyzer, DecoderFactory, IndexerSource, SourceId, SyncContext, SyncType, TagReader,
};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::broadcast;

/// Plugins available to the indexer, in the order they are consulted
#[derive(Clone, Default)]
pub struct PluginRegistry {
    pub tag_readers: Vec<Arc<dyn TagReader>>,
    pub sources: Vec<Arc<dyn IndexerSource>>,
    pub analyzers: Vec<Arc<dyn Analyzer>>,
    pub decoders: Vec<Arc<dyn DecoderFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_reader(mut self, reader: impl TagReader + 'static) -> Self {
        self.tag_readers.push(Arc::new(reader));
        self
    }

    pub fn with_source(mut self, source: Arc<dyn IndexerSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_analyzer(mut self, analyzer: impl Analyzer + 'static) -> Self {
        self.analyzers.push(Arc::new(analyzer));
        self
    }

    pub fn with_decoder(mut self, decoder: impl DecoderFactory + 'static) -> Self {
        self.decoders.push(Arc::new(decoder));
        self
    }

    /// Whether any tag reader accepts the file's extension
    pub(crate) fn can_read(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| {
            self.tag_readers.iter().any(|reader| reader.can_read(&ext))
        })
    }

    pub(crate) fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|source| source.source_id()).collect()
    }
}

/// Lowercase extension without the dot
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// State shared between the handle, the background thread and its tasks
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
    pub(crate) config: IndexerConfig,
    pub(crate) plugins: PluginRegistry,
    pub(crate) scan_log: ScanLog,
    events: broadcast::Sender<IndexerEvent>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cooperative cancellation check for long-running loops
    pub(crate) fn bail(&self) -> bool {
        self.lock().state.should_bail()
    }

    /// Queue a context for the already running thread
    pub(crate) fn enqueue(&self, context: SyncContext) {
        let added = {
            let mut inner = self.lock();
            if inner.state.should_bail() {
                return;
            }
            inner.enqueue(context)
        };

        if added {
            self.wake.notify_all();
        }
    }

    pub(crate) fn emit(&self, event: IndexerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn set_current_source(&self, source: Option<Arc<dyn IndexerSource>>) {
        self.lock().current_source = source;
    }

    pub(crate) fn is_current_source(&self, source_id: SourceId) -> bool {
        self.lock()
            .current_source
            .as_ref()
            .is_some_and(|current| current.source_id() == source_id)
    }

    pub(crate) fn take_path_changes(&self) -> Vec<PathChange> {
        self.lock().path_changes.drain(..).collect()
    }
}

/// Background library indexer
///
/// All public methods are synchronous and return immediately, apart from
/// [`shutdown`](Self::shutdown) which waits for the thread to exit.
pub struct Indexer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Indexer {
    /// Create an indexer over an existing library database
    ///
    /// Loads the registered root directories; no thread is started until
    /// the first [`schedule`](Self::schedule).
    pub async fn new(config: IndexerConfig, plugins: PluginRegistry) -> Result<Self> {
        config.validate()?;

        let pool = soul_storage::open_indexer_pool(&config.database_url).await?;
        let rows = {
            let mut conn = pool.acquire().await?;
            soul_storage::paths::all(&mut conn).await?
        };
        pool.close().await;

        let scan_log = if config.log_enabled {
            ScanLog::open(&config.log_path())
        } else {
            ScanLog::default()
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let paths = rows.into_iter().map(|row| row.path).collect();

        tracing::debug!(
            tag_readers = plugins.tag_readers.len(),
            sources = plugins.sources.len(),
            analyzers = plugins.analyzers.len(),
            "indexer created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::new(paths)),
                wake: Condvar::new(),
                config,
                plugins,
                scan_log,
                events,
            }),
            thread: Mutex::new(None),
        })
    }

    fn thread_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a scan cycle
    ///
    /// Starts the background thread if needed. A request equal to one that
    /// is already pending is dropped.
    pub fn schedule(&self, sync_type: SyncType, source_id: Option<SourceId>) {
        let context = SyncContext::new(sync_type, source_id);
        let mut thread = self.thread_handle();

        {
            let mut inner = self.shared.lock();

            if thread.is_none() {
                inner.state = IndexerState::Idle;

                let shared = Arc::clone(&self.shared);
                match std::thread::Builder::new()
                    .name("soul-indexer".to_string())
                    .spawn(move || thread_loop(&shared))
                {
                    Ok(handle) => *thread = Some(handle),
                    Err(e) => {
                        inner.state = IndexerState::Stopped;
                        tracing::error!("{}", IndexerError::Thread(e.to_string()));
                        return;
                    }
                }
            }

            if !inner.enqueue(context) {
                tracing::debug!(%sync_type, source_id = context.source_id, "scan already queued");
                return;
            }
        }

        self.shared.wake.notify_all();
    }

    /// Stop the background thread and wait for it
    ///
    /// Pending requests are dropped and the running source is interrupted.
    /// A no-op when no thread is running; a later [`schedule`](Self::schedule)
    /// starts a fresh thread.
    pub fn shutdown(&self) {
        let mut thread = self.thread_handle();
        let Some(handle) = thread.take() else {
            return;
        };

        let current_source = {
            let mut inner = self.shared.lock();
            inner.queue.clear();
            inner.state = IndexerState::Stopping;
            inner.current_source.clone()
        };

        if let Some(source) = current_source {
            tracing::info!(source_id = source.source_id(), "interrupting source");
            source.interrupt();
        }

        self.shared.wake.notify_all();

        if handle.join().is_err() {
            tracing::error!("Indexer thread panicked");
        }

        self.shared.lock().state = IndexerState::Stopped;
        self.shared.scan_log.flush();
    }

    /// Register a root directory; persisted at the start of the next cycle
    pub fn add_path(&self, path: &str) {
        let path = normalize_dir(path);
        let mut inner = self.shared.lock();
        if !inner.paths.contains(&path) {
            inner.paths.push(path.clone());
        }
        inner.path_changes.push_back(PathChange::Add(path));
    }

    /// Unregister a root directory; its tracks go in the next cycle's delete pass
    pub fn remove_path(&self, path: &str) {
        let path = normalize_dir(path);
        let mut inner = self.shared.lock();
        inner.paths.retain(|p| *p != path);
        inner.path_changes.push_back(PathChange::Remove(path));
    }

    /// Registered roots, including changes not yet persisted
    pub fn paths(&self) -> Vec<String> {
        self.shared.lock().paths.clone()
    }

    pub fn state(&self) -> IndexerState {
        self.shared.lock().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexerEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.shared.config
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wait for work, run it, repeat until shutdown
fn thread_loop(shared: &Arc<Shared>) {
    tracing::debug!("indexer thread started");

    loop {
        let context = {
            let mut inner = shared.lock();
            loop {
                if inner.state.should_bail() {
                    tracing::debug!("indexer thread exiting");
                    return;
                }
                if let Some(context) = inner.queue.pop_front() {
                    inner.state = IndexerState::Indexing;
                    break context;
                }
                inner.state = IndexerState::Idle;
                inner = shared
                    .wake
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        shared.emit(IndexerEvent::Started);

        if let Err(e) = run_cycle(shared, context) {
            tracing::error!(sync_type = %context.sync_type, "Scan cycle failed: {}", e);
        }

        let mut inner = shared.lock();
        inner.current_source = None;
        if inner.state == IndexerState::Indexing {
            inner.state = IndexerState::Idle;
        }
    }
}

/// Run one cycle on a runtime that lives exactly as long as the cycle
///
/// The runtime's worker threads are the tag extraction pool.
fn run_cycle(shared: &Arc<Shared>, context: SyncContext) -> Result<()> {
    let threads = shared.config.thread_count;

    let runtime = if threads > 1 {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("soul-indexer-worker")
            .enable_all()
            .build()?
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
    };

    let result = runtime.block_on(cycle::run(Arc::clone(shared), context));
    runtime.shutdown_background();
    result
}
