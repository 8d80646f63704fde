//! Watch command - rebuild on every source change

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use quire_core::Config;
use quire_generator::Builder;

use super::build::print_build_stats;
use crate::watcher;

/// Run the watch command.
///
/// A failing initial build is reported and watching starts anyway, so the
/// next save can fix it.
pub async fn run(config: Config) -> Result<()> {
    tracing::info!(source = %config.source.display(), "Starting watch mode");

    let builder = Arc::new(Builder::new(config));
    let initial = Arc::clone(&builder);
    match tokio::task::spawn_blocking(move || initial.build())
        .await
        .wrap_err("Build task panicked")?
    {
        Ok(site) => print_build_stats(&site.stats, &builder.config().destination),
        Err(e) => {
            tracing::error!(error = %e, "Initial build failed");
            eprintln!("  ✗ Build failed: {e}");
        }
    }

    watcher::run(builder, |_| {}).await
}
