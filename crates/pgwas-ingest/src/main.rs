//! PGWAS Ingest - dataset validation and import tool

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pgwas_common::logging::{init_logging, LogConfig};
use pgwas_ingest::config::{create_pool, health_check, DbConfig, ImportOptions};
use pgwas_ingest::store::{IdentityStore, MemoryStore, PgStore};
use pgwas_ingest::validation::config::{load_context, validate_dataset};
use pgwas_ingest::validation::{ValidationOptions, ValidationSelection};
use pgwas_ingest::{DatasetContext, Importer, Resolver};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pgwas-ingest")]
#[command(author, version, about = "Validate and import GWAS datasets into PGWAS")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Environment file with database credentials
    #[arg(long, global = true)]
    env: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a dataset without touching the database
    Validate(DatasetArgs),

    /// Validate, then import a dataset
    Import {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Import into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Remember resolved ids for the rest of the run
        #[arg(long)]
        identity_cache: bool,

        /// Show per-file progress bars
        #[arg(long)]
        progress: bool,
    },

    /// Empty every PGWAS table and reset its id sequence
    Truncate {
        /// Confirm the truncation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// Dataset manifest (JSON)
    manifest: PathBuf,

    /// Directory holding the dataset files; defaults to the manifest's directory
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Validation steps to run (config, line, genotype, variant, kinship,
    /// population, phenotype, runs, result, all)
    #[arg(long = "validate", value_delimiter = ',', default_value = "all")]
    steps: Vec<String>,

    /// Trust genotype matrices without validating them
    #[arg(long)]
    skip_genotype_validation: bool,
}

impl DatasetArgs {
    fn context(&self) -> Result<DatasetContext> {
        load_context(&self.manifest, self.dir.as_deref())
            .with_context(|| format!("Failed to load manifest {}", self.manifest.display()))
    }

    fn selection(&self) -> ValidationSelection {
        ValidationSelection::parse(&self.steps)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load environment file {}", path.display()))?;
        },
        None => {
            dotenvy::dotenv().ok();
        },
    }

    let log_config = LogConfig::from_env()
        .context("Invalid logging settings")?
        .with_verbosity(cli.verbose);
    let _guard = init_logging(&log_config)?;

    let result = match cli.command {
        Command::Validate(args) => validate(&args),
        Command::Import {
            dataset,
            dry_run,
            identity_cache,
            progress,
        } => import(&dataset, dry_run, identity_cache, progress).await,
        Command::Truncate { yes } => truncate(yes).await,
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Command failed");
    }
    result
}

fn validate(args: &DatasetArgs) -> Result<()> {
    let ctx = args.context()?;
    let selection = args.selection();
    if selection.is_empty() {
        warn!("No validation steps selected");
    }

    let report = validate_dataset(
        &ctx,
        &selection,
        ValidationOptions {
            skip_genotype_validation: args.skip_genotype_validation,
        },
    )
    .context("Dataset failed validation")?;

    for (kind, path) in &report.skipped {
        warn!(%kind, path = %path.display(), "Not validated");
    }
    info!(
        validated = report.validated.len(),
        skipped = report.skipped.len(),
        steps = %selection,
        "Dataset is valid"
    );
    Ok(())
}

async fn import(args: &DatasetArgs, dry_run: bool, identity_cache: bool, progress: bool) -> Result<()> {
    let ctx = args.context()?;

    let mut options = ImportOptions::from_env().context("Invalid import settings")?;
    options.skip_genotype_validation = args.skip_genotype_validation;
    options.identity_cache = identity_cache;
    options.show_progress = progress;

    let store: Arc<dyn IdentityStore> = if dry_run {
        info!("Dry run: importing into memory");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(PgStore::new(connect().await?))
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling import");
            on_interrupt.cancel();
        }
    });

    let importer = Importer::new(Resolver::new(store, options).with_cancellation(cancel));
    let (report, summary) = importer
        .validate_and_run(&ctx, &args.selection())
        .await
        .with_context(|| format!("Import of {} failed", args.manifest.display()))?;

    info!(
        validated = report.validated.len(),
        variants_inserted = summary.variants_inserted,
        "Import complete"
    );
    Ok(())
}

async fn truncate(yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to truncate without --yes");
    }
    let store = PgStore::new(connect().await?);
    store.truncate_all().await.context("Truncate failed")?;
    Ok(())
}

async fn connect() -> Result<sqlx::PgPool> {
    let config = DbConfig::from_env().context("Database is not configured")?;
    let pool = create_pool(&config).await.context("Failed to connect to database")?;
    health_check(&pool).await.context("Database health check failed")?;
    Ok(pool)
}
