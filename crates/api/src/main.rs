use anyhow::Context;
use metals_core::job::Extractor;
use metals_core::storage::RawLayout;
use metals_core::store::{FirebaseClient, RemoteStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;

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

    tokio::fs::create_dir_all(&settings.raw_data_root)
        .await
        .with_context(|| format!("failed to create {}", settings.raw_data_root.display()))?;
    let raw_root = tokio::fs::canonicalize(&settings.raw_data_root)
        .await
        .with_context(|| format!("failed to resolve {}", settings.raw_data_root.display()))?;

    let store = FirebaseClient::from_settings(&settings)?;
    // Jobs connect on demand; a failure here only means the first job will retry it.
    if let Err(e) = store.connect().await {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "firebase connect failed; jobs will fail until credentials load");
    }

    let extractor = Extractor::new(Arc::new(store), RawLayout::new(raw_root.clone()));
    let state = routes::AppState {
        extractor: Arc::new(extractor),
    };
    let app = routes::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, raw_root = %raw_root.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
