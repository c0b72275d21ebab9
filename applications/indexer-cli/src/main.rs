/// Soul Indexer - keeps a library database in line with its music folders
use anyhow::Context;
use clap::{Parser, Subcommand};
use soul_audio::SymphoniaDecoderFactory;
use soul_core::{SourceId, SyncType};
use soul_indexer::{Indexer, IndexerConfig, IndexerEvent, PluginRegistry};
use soul_loudness::ReplayGainAnalyzer;
use soul_metadata::LoftyTagReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "soul-indexer")]
#[command(about = "Soul Player library indexer", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./indexer.toml)
    #[arg(short, long, env = "SOUL_INDEXER_CONFIG")]
    config: Option<PathBuf>,

    /// Library database, overriding the configuration
    #[arg(long)]
    database: Option<String>,

    /// Print indexer events as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan cycle and exit
    Scan {
        /// local, sources, all or rebuild
        #[arg(short = 't', long = "type", default_value = "all")]
        sync_type: SyncType,

        /// Restrict a sources scan to one source id
        #[arg(long)]
        source: Option<SourceId>,

        /// Skip the ReplayGain analysis pass
        #[arg(long)]
        no_analyze: bool,
    },
    /// Register a music folder and scan it
    AddPath {
        path: PathBuf,
    },
    /// Unregister a music folder and drop its tracks
    RemovePath {
        path: PathBuf,
    },
    /// List registered music folders
    ListPaths,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soul_indexer=info,soul_indexer_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config =
        IndexerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database_url = database;
    }

    prepare_database(&config.database_url).await?;

    match cli.command {
        Commands::Scan {
            sync_type,
            source,
            no_analyze,
        } => {
            let indexer = Arc::new(build_indexer(config, !no_analyze).await?);
            let events = indexer.subscribe();
            indexer.schedule(sync_type, source);
            wait(&indexer, events, cli.json).await?;
        }
        Commands::AddPath { path } => {
            let path = absolute(&path)?;
            let indexer = Arc::new(build_indexer(config, true).await?);
            let events = indexer.subscribe();
            indexer.add_path(&path);
            indexer.schedule(SyncType::Local, None);
            wait(&indexer, events, cli.json).await?;
        }
        Commands::RemovePath { path } => {
            let path = absolute(&path)?;
            let indexer = Arc::new(build_indexer(config, false).await?);
            let events = indexer.subscribe();
            indexer.remove_path(&path);
            indexer.schedule(SyncType::Local, None);
            wait(&indexer, events, cli.json).await?;
        }
        Commands::ListPaths => {
            let pool = soul_storage::create_pool(&config.database_url).await?;
            let mut conn = pool.acquire().await?;
            for row in soul_storage::paths::all(&mut conn).await? {
                println!("{}\t{}", row.id, row.path);
            }
        }
    }

    Ok(())
}

/// Create the database file and bring its schema up to date
async fn prepare_database(database_url: &str) -> anyhow::Result<()> {
    let pool = soul_storage::create_pool(database_url)
        .await
        .with_context(|| format!("Failed to open {database_url}"))?;
    soul_storage::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    pool.close().await;
    Ok(())
}

async fn build_indexer(config: IndexerConfig, analyze: bool) -> anyhow::Result<Indexer> {
    let mut plugins = PluginRegistry::new().with_tag_reader(LoftyTagReader::new());

    if analyze {
        plugins = plugins
            .with_decoder(SymphoniaDecoderFactory::new())
            .with_analyzer(ReplayGainAnalyzer::new());
    }

    Ok(Indexer::new(config, plugins).await?)
}

fn absolute(path: &Path) -> anyhow::Result<String> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

/// Report events until the cycle finishes or Ctrl-C stops it
async fn wait(
    indexer: &Arc<Indexer>,
    mut events: broadcast::Receiver<IndexerEvent>,
    json: bool,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    report(event, json)?;
                    if matches!(event, IndexerEvent::Finished(_)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "missed indexer events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping indexer");
                break;
            }
        }
    }

    let indexer = Arc::clone(indexer);
    tokio::task::spawn_blocking(move || indexer.shutdown()).await?;
    Ok(())
}

fn report(event: IndexerEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(&event)?);
        return Ok(());
    }

    match event {
        IndexerEvent::Started => tracing::info!("Scan started"),
        IndexerEvent::Progress(tracks) => tracing::info!(tracks, "Scanning"),
        IndexerEvent::Finished(tracks) => tracing::info!(tracks, "Scan finished"),
    }
    Ok(())
}
