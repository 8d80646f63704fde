//! Quire CLI Library
//!
//! This library provides the core functionality for the Quire static site generator CLI.
//! It is designed to be used by the binary entry point while also exposing
//! public APIs for documentation and integration purposes.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, serve, watch, new, doctor, test-markdown)
//! - [`server`] - HTTP server with trie-routed dispatch and search
//! - [`watcher`] - Content-hashed file watcher with debounced rebuilds
//!
//! # Example
//!
//! ```no_run
//! use quire::{Config, ConfigOverrides, cmd};
//!
//! // Build a static site
//! let config = Config::load(None, &ConfigOverrides::default()).unwrap();
//! cmd::build::run(config).unwrap();
//! ```

pub mod cmd;
pub mod server;
pub mod watcher;

// Re-export core types for convenience
pub use quire_core::{Config, ConfigOverrides};
pub use quire_generator::{BuildStats, Builder, Site};

/// Initialize tracing with the specified verbosity level.
///
/// `quiet` wins over `verbose`. `RUST_LOG` directives are honored on top
/// of the base level.
///
/// # Example
///
/// ```no_run
/// quire::init_tracing(2, false); // Enable DEBUG level logging
/// ```
pub fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level(verbose, quiet).into()),
        )
        .init();
}

fn log_level(verbose: u8, quiet: bool) -> tracing::Level {
    if quiet {
        return tracing::Level::ERROR;
    }
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}
