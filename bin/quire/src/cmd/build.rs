//! Build command - generates the static site

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use quire_core::Config;
use quire_generator::{BuildStats, Builder};

/// Run the build command.
///
/// Builds the static site from the source tree to the destination.
pub fn run(config: Config) -> Result<()> {
    tracing::info!(
        source = %config.source.display(),
        destination = %config.destination.display(),
        "Starting build"
    );

    let builder = Builder::new(config);
    let site = builder.build().wrap_err("Build failed")?;

    print_build_stats(&site.stats, &builder.config().destination);
    tracing::info!(stats = ?site.stats, "Build completed successfully");

    Ok(())
}

/// Print build statistics in a user-friendly format.
pub fn print_build_stats(stats: &BuildStats, output: &Path) {
    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Pages:      {:>6}", stats.pages);
    println!("  Posts:      {:>6}", stats.posts);
    println!("  Listings:   {:>6}", stats.listings);
    println!("  Assets:     {:>6}", stats.assets);
    println!();
    println!("  Duration:   {:>6}ms", stats.duration_ms);
    println!("  Output:     {}", output.display());
    println!();
}
