//! Sumstats Ingest - summary-statistics ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use sumstats_common::logging::{init_logging, LogConfig, LogLevel};
use sumstats_ingest::config::{FetchKind, IngestConfig, SourceDefinition};
use sumstats_ingest::credentials::{
    CredentialProvider, Credentials, EnvCredentialProvider, SecretDocumentProvider,
};
use sumstats_ingest::fetch::{HttpFetcher, ObjectStoreFetcher, PortalFetcher, RoutingFetcher, SourceFetcher};
use sumstats_ingest::lookup::LookupSet;
use sumstats_ingest::manifest::list_merged_objects;
use sumstats_ingest::model::SourceFile;
use sumstats_ingest::pipeline::{PipelineDriver, PipelineOptions, RunSummary};
use sumstats_ingest::storage::{ObjectStore, S3ObjectStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sumstats-ingest")]
#[command(author, version, about = "Summary-statistics ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest FinnGen R10 summary statistics
    Finngen {
        /// Manifest file, overrides the built-in path
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Ingest deCODE SomaScan protein GWAS
    Decode {
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Ingest UKB-PPP Olink pQTL archives from the research portal
    UkbOlink {
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Split legacy merged objects into per-chromosome partitions
    Repartition {
        #[arg(value_enum)]
        source: RepartitionSource,
    },

    /// Ingest a source described by a JSON definition
    Run {
        #[arg(short, long)]
        definition: PathBuf,

        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RepartitionSource {
    Finngen,
    UkbOlink,
}

impl RepartitionSource {
    fn definition(self) -> SourceDefinition {
        match self {
            RepartitionSource::Finngen => SourceDefinition::finngen(),
            RepartitionSource::UkbOlink => SourceDefinition::ukb_olink(),
        }
    }
}

fn build_fetcher(
    kind: &FetchKind,
    config: &IngestConfig,
    credentials: &Credentials,
    store: Arc<dyn ObjectStore>,
) -> Result<Arc<dyn SourceFetcher>> {
    let routing = RoutingFetcher::new().with_object_store(Arc::new(ObjectStoreFetcher::new(store)));

    let routing = match kind {
        FetchKind::Http => routing.with_http(Arc::new(HttpFetcher::new()?)),
        FetchKind::ObjectStore => routing,
        FetchKind::Portal { base_url } => {
            let base_url = base_url
                .clone()
                .or_else(|| config.portal_base_url.clone())
                .context("PORTAL_BASE_URL must be set for portal sources")?;
            let token = credentials
                .portal_token
                .clone()
                .context("A portal token is required for portal sources")?;
            routing.with_portal(Arc::new(PortalFetcher::new(base_url, token)?))
        }
    };

    Ok(Arc::new(routing))
}

async fn plan_ingest(
    mut definition: SourceDefinition,
    manifest: Option<PathBuf>,
    config: &IngestConfig,
    credentials: &Credentials,
    store: Arc<dyn ObjectStore>,
) -> Result<(PipelineDriver, Vec<SourceFile>)> {
    definition.validate()?;
    if let Some(path) = manifest {
        definition.manifest.path = path;
    }

    info!(source = %definition.name, base_prefix = %definition.base_prefix, "Preparing ingestion");
    let files = config.apply_limit(definition.manifest.load().await?);

    info!("Loading lookup tables");
    let lookups = LookupSet::load_all(&definition.lookups, store.as_ref()).await?;

    let fetcher = build_fetcher(&definition.fetch, config, credentials, store.clone())?;
    let options = PipelineOptions::ingest(&definition, config.concurrency_for(&definition));
    Ok((PipelineDriver::new(store, fetcher, Arc::new(lookups), options), files))
}

async fn plan_repartition(
    source: RepartitionSource,
    config: &IngestConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<(PipelineDriver, Vec<SourceFile>)> {
    let definition = source.definition();
    info!(source = %definition.name, base_prefix = %definition.base_prefix, "Preparing repartition");

    let files = config.apply_limit(list_merged_objects(store.as_ref(), &definition.base_prefix).await?);
    let fetcher = Arc::new(ObjectStoreFetcher::new(store.clone()));
    let options = PipelineOptions::repartition(definition.base_prefix.clone(), config.concurrency_for(&definition));
    Ok((PipelineDriver::new(store, fetcher, Arc::new(LookupSet::new()), options), files))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sumstats-ingest")
        .build()
        .merge_env()?;
    // dropped at the end of main, after the run summary is logged
    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env()?;
    let credentials = match &config.secret_document {
        Some(path) => SecretDocumentProvider::new(path).get_credentials().await?,
        None => EnvCredentialProvider.get_credentials().await?,
    };
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(&config.storage, &credentials).await?);

    let (driver, files) = match cli.command {
        Command::Finngen { manifest } => {
            plan_ingest(SourceDefinition::finngen(), manifest, &config, &credentials, store).await?
        }
        Command::Decode { manifest } => {
            plan_ingest(SourceDefinition::decode(), manifest, &config, &credentials, store).await?
        }
        Command::UkbOlink { manifest } => {
            plan_ingest(SourceDefinition::ukb_olink(), manifest, &config, &credentials, store).await?
        }
        Command::Run { definition, manifest } => {
            let definition = SourceDefinition::from_json_file(&definition)?;
            plan_ingest(definition, manifest, &config, &credentials, store).await?
        }
        Command::Repartition { source } => plan_repartition(source, &config, store).await?,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, letting files in flight finish");
                cancel.cancel();
            }
        }
    });

    let started = Instant::now();
    let results = driver.run(files, &cancel).await;
    RunSummary::from_results(driver.run_id(), &results, started.elapsed()).log();

    // per-file failures are reported above and never fail the process
    Ok(())
}
