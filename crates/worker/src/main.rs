use clap::{Parser, Subcommand};
use metals_core::domain::{DateKey, FeatureKey};
use metals_core::job::{ExtractionStatus, Extractor};
use metals_core::storage::RawLayout;
use metals_core::store::{FirebaseClient, InMemoryStore, RemoteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "metals_worker")]
struct Args {
    /// Output root. Defaults to RAW_DATA_ROOT, then `raw`.
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Read prices from a local JSON file instead of Firebase. The file mirrors the remote
    /// tree, e.g. `{"historical_prices": {"2025-01-01": {"GC": {...}}}}`.
    #[arg(long)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract one feature for one date into <raw>/<FEATURE>/<date>/<date>.json.
    Extract {
        #[arg(long)]
        date: String,

        #[arg(long)]
        feature: String,
    },
    /// Extract every date and feature into <raw>/ALL_HISTORICAL_DATA/.
    ExtractAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = metals_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let raw_dir = args.raw_dir.unwrap_or_else(|| settings.raw_data_root.clone());
    let store: Arc<dyn RemoteStore> = match args.fixture.as_deref() {
        Some(path) => Arc::new(InMemoryStore::from_file(path).await?),
        None => Arc::new(FirebaseClient::from_settings(&settings)?),
    };
    tracing::info!(store = store.store_name(), raw_dir = %raw_dir.display(), "worker starting");

    let extractor = Extractor::new(store, RawLayout::new(raw_dir));

    match args.command {
        Command::Extract { date, feature } => {
            let date = DateKey::parse(&date)?;
            let feature = FeatureKey::parse(&feature)?;
            anyhow::ensure!(
                !metals_core::storage::is_reserved_feature(&feature),
                "'{feature}' is reserved and cannot be used as a feature"
            );

            match extractor.extract(&date, &feature).await {
                Ok(out) => {
                    if out.status != ExtractionStatus::Saved {
                        tracing::warn!(%date, %feature, status = ?out.status, "no data; wrote error document");
                    }
                    println!("{}", out.path.display());
                }
                Err(err) => return Err(report(err)),
            }
        }
        Command::ExtractAll => match extractor.extract_all().await {
            Ok(saved) => {
                tracing::info!(files = saved.len(), "bulk extraction finished");
                println!("{}", extractor.layout().bulk_dir().display());
            }
            Err(err) => return Err(report(err)),
        },
    }

    Ok(())
}

fn report(err: metals_core::job::ExtractionFailure) -> anyhow::Error {
    let err = anyhow::Error::new(err);
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "extraction run failed");
    err
}

fn init_sentry(settings: &metals_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
