//! Process entrypoint: load configuration, connect to the container
//! engine, build the facades, and serve the HTTP surface.

use std::sync::Arc;

use sandboxd::config::ServiceConfig;
use sandboxd::engine::{BollardEngine, ContainerEngine};
use sandboxd::facade::{ExecutionFacade, FileOpsFacade};
use sandboxd::http::{router, AppState};
use sandboxd::runner::ContainerRunner;
use sandboxd::volumes::VolumeRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(ServiceConfig::from_env()?);
    tracing::info!(
        image = %config.image_name,
        bind_addr = %config.bind_addr,
        "starting sandbox control plane"
    );

    let engine = Arc::new(BollardEngine::connect()?);
    match engine.ping().await {
        Ok(()) => tracing::info!("container engine reachable"),
        Err(e) => tracing::error!(error = %e, "container engine unreachable at startup; serving in degraded state"),
    }

    let volumes = Arc::new(VolumeRegistry::new(engine.clone()));
    let runner = Arc::new(ContainerRunner::new(engine.clone(), volumes));

    let state = Arc::new(AppState {
        execution: ExecutionFacade::new(runner.clone(), config.clone()),
        fileops: FileOpsFacade::new(runner, config.clone()),
        engine,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
