//! Serve command - build, then serve the site over HTTP

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use quire_core::Config;
use quire_generator::Builder;
use tokio::net::TcpListener;

use super::build::print_build_stats;
use crate::{
    server::{AppState, create_router},
    watcher,
};

/// Run the serve command.
///
/// With `watch` the served snapshot is replaced after every successful
/// rebuild.
pub async fn run(config: Config, watch: bool, open_browser: bool) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, watch, "Starting server");

    let builder = Arc::new(Builder::new(config));
    let initial = Arc::clone(&builder);
    let site = tokio::task::spawn_blocking(move || initial.build())
        .await
        .wrap_err("Build task panicked")?
        .wrap_err("Build failed")?;
    print_build_stats(&site.stats, &builder.config().destination);

    let state = AppState::new(site);

    if watch {
        let rebuild_state = state.clone();
        let watch_builder = Arc::clone(&builder);
        tokio::spawn(async move {
            let result = watcher::run(watch_builder, move |site| rebuild_state.replace(site)).await;
            if let Err(e) = result {
                tracing::error!(error = %e, "File watcher stopped");
            }
        });
    }

    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    let url = format!("http://{addr}");
    println!("  Server running at {url}");
    println!("  Press Ctrl+C to stop");
    println!();

    if open_browser {
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, "Failed to open browser");
        }
    }

    axum::serve(listener, create_router(state))
        .await
        .wrap_err("Server error")?;

    Ok(())
}
