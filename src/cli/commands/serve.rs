//! Serve command - run the HTTP proxy

use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::error::ProxyResult;
use crate::server::{self, AppState, ListenSpec};
use tracing::info;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> ProxyResult<()> {
    let spec: ListenSpec = args
        .listen
        .as_deref()
        .unwrap_or(&config.server.listen)
        .parse()?;
    let workspace = config.cache.resolve_workspace(args.workspace.as_deref())?;
    let state = AppState::from_config(config, &workspace);

    let listener = spec.bind(&config.server.fd_env_prefix)?;
    info!(
        "Listened on {:?}; serving {} from {}",
        spec.to_string(),
        config.retriever.program,
        state.coordinator.oracle().root().display()
    );

    server::serve(listener, state, shutdown_signal()).await?;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
