//! Offline model training
//!
//! Trains on a CSV export or synthetic data and writes the artifact to the
//! configured artifact directory. With a database configured the new version
//! is registered and activated for the server's next start.

use std::path::PathBuf;

use agri_siddhi::ml::{load_csv, synthesize, ArtifactStore, ModelTrainer, SynthesisConfig};
use agri_siddhi::services::registry::{ModelRegistry, NewModelVersion, PgModelRegistry};
use agri_siddhi::{init_tracing, Config};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::FeatureNormalizer;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser, Debug)]
#[command(name = "agri-train", version, about = "Train and inspect yield models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model and save its artifact.
    Train(TrainArgs),
    /// Print the metrics and feature importance of an artifact.
    Inspect {
        /// Defaults to the newest artifact in `ml.artifact_dir`
        artifact: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
struct TrainArgs {
    /// Labelled samples; synthetic data is used when omitted
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Synthetic sample count
    #[arg(long)]
    samples: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides `ml.artifact_dir`
    #[arg(long)]
    output: Option<PathBuf>,
    /// Randomized search iterations, 0 disables the search
    #[arg(long)]
    search_iterations: Option<usize>,
    /// Version stamped on the artifact when no database is configured
    #[arg(long, default_value = "1.0.0")]
    version: semver::Version,
    /// Register and activate the version in the database
    #[arg(long)]
    register: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    match cli.command {
        Commands::Train(args) => train(config, args).await,
        Commands::Inspect { artifact } => inspect(&config, artifact),
    }
}

async fn train(mut config: Config, args: TrainArgs) -> Result<()> {
    if let Some(dir) = args.output {
        config.ml.artifact_dir = dir;
    }
    if let Some(iterations) = args.search_iterations {
        config.ml.search_iterations = iterations;
    }
    let seed = args.seed.unwrap_or(config.ml.seed);

    let samples = match &args.csv {
        Some(path) => load_csv(path, &FeatureNormalizer::new())
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let n = args.samples.unwrap_or(config.ml.synthetic_samples);
            tracing::info!(samples = n, seed, "Generating synthetic training data");
            synthesize(seed, n, &SynthesisConfig::default())?
        }
    };

    let registry = if args.register {
        let Some(url) = &config.database.url else {
            bail!("--register needs database.url to be configured");
        };
        let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Some(PgModelRegistry::new(pool))
    } else {
        None
    };

    let version = match &registry {
        Some(registry) => registry.next_version().await?,
        None => args.version,
    };

    let mut trainer_config = config.ml.trainer_config();
    trainer_config.forest.seed = seed;
    let artifact = ModelTrainer::new(trainer_config).train(&samples, &version)?;
    let store = ArtifactStore::new(config.ml.artifact_dir.clone());
    let stored = store.save(&artifact)?;

    if let Some(registry) = &registry {
        let entry = NewModelVersion {
            version: version.clone(),
            artifact_path: stored.path.to_string_lossy().into_owned(),
            checksum: stored.checksum.clone(),
            metrics: artifact.metrics,
            feature_importance: artifact.feature_importance.clone(),
        };
        if let Err(e) = registry.register_active(entry).await {
            store.remove(&stored.path)?;
            return Err(e.into());
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": "success",
            "version": version.to_string(),
            "artifact_path": stored.path,
            "checksum": stored.checksum,
            "metrics": artifact.metrics,
        }))?
    );
    Ok(())
}

fn inspect(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let store = ArtifactStore::new(config.ml.artifact_dir.clone());
    let path = match path {
        Some(path) => path,
        None => match store.latest()? {
            Some(path) => path,
            None => bail!("no artifacts in {}", store.root().display()),
        },
    };
    let artifact = store
        .load(&path, None)
        .with_context(|| format!("loading {}", path.display()))?;

    println!("version   {}", artifact.version);
    println!("created   {}", artifact.created_at);
    println!(
        "metrics   r2={:.3} mae={:.1} rmse={:.1} cv_mae={:.1}",
        artifact.metrics.r2, artifact.metrics.mae, artifact.metrics.rmse, artifact.metrics.cv_mae
    );
    println!("importance");
    for item in artifact.feature_importance.iter().take(10) {
        println!("  {:<28} {:.4}", item.feature, item.importance);
    }
    Ok(())
}

