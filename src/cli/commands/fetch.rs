//! Fetch command - refresh one package and archive it to a file

use crate::archive::write_archive;
use crate::cache::ResourceKey;
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::server::AppState;
use crate::ui::{self, TaskSpinner, UiContext};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> ProxyResult<()> {
    let ctx = UiContext::detect();
    let key = ResourceKey::parse(&args.key)?;
    let workspace = config.cache.resolve_workspace(args.workspace.as_deref())?;
    let state = AppState::from_config(config, &workspace);

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Getting {}...", key));
    let dir = match state.coordinator.ensure_fresh(&key).await {
        Ok(dir) => {
            spinner.stop(&format!("{} is up to date", key));
            dir
        }
        Err(e) => {
            spinner.stop_error(&format!("Could not get {}", key));
            return Err(e);
        }
    };

    let output = args.output.clone();
    let policy = Arc::clone(&state.policy);
    let source = dir.clone();
    tokio::task::spawn_blocking(move || -> ProxyResult<()> {
        let file = File::create(&output)
            .map_err(|e| ProxyError::io(format!("creating {}", output.display()), e))?;
        let written = write_archive(BufWriter::new(file), &source, &policy);
        if written.is_err() {
            // A truncated archive is worse than none.
            let _ = std::fs::remove_file(&output);
        }
        written.map(|_| ())
    })
    .await
    .map_err(|e| ProxyError::Internal(format!("archive task failed: {}", e)))??;

    ui::step_ok_detail(&ctx, "Archive written", &args.output.display().to_string());
    ui::key_value(&ctx, "Source", &dir.display().to_string());
    Ok(())
}
