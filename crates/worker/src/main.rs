use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fableworks_comfyui::ComfyUiApi;
use fableworks_core::clock::SystemClock;
use fableworks_core::config::{EngineSettings, WorkerSettings};
use fableworks_pipeline::default_providers;
use fableworks_queue::{JobQueue, MemoryStore};
use fableworks_worker::JobDispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fableworks=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let engine_settings = EngineSettings::from_env()?;
    let worker_settings = WorkerSettings::from_env()?;
    tracing::info!(
        engine_url = %engine_settings.base_url,
        family = %engine_settings.family,
        concurrency = worker_settings.concurrency,
        "Loaded worker configuration",
    );

    // --- Queue and providers ---
    let queue = Arc::new(JobQueue::new(Arc::new(MemoryStore::new())));
    let api = Arc::new(ComfyUiApi::new(engine_settings.base_url.clone()));
    let clock = Arc::new(SystemClock::new());
    let providers = default_providers(api, clock.clone(), &engine_settings);

    // --- Dispatcher ---
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        providers,
        worker_settings,
        clock,
    ));
    Arc::clone(&dispatcher).start();

    // --- Retention sweeper ---
    let sweeper_queue = queue.clone();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper_queue.prune().await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    });

    // --- Shutdown ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    sweeper.abort();
    dispatcher.stop().await;

    Ok(())
}
