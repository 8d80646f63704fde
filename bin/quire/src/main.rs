//! Quire CLI
//!
//! Single binary static site generator for Markdown blogs.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use quire::cmd;
use quire_core::{Config, ConfigOverrides};

/// Command-line interface for Quire.
///
/// Without a mode flag the site is built once.
#[derive(Parser, Debug)]
#[command(
    name = "quire",
    version,
    about = "A blog-oriented static site generator"
)]
struct Cli {
    /// Build, then serve the destination directory
    #[arg(long)]
    serve: bool,

    /// Build, then rebuild whenever a source file changes
    #[arg(long)]
    watch: bool,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Override the site base URL
    #[arg(long)]
    baseurl: Option<String>,

    /// Path to configuration file (default: _config.{yml,yaml,toml} in the source)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source directory
    #[arg(long)]
    source: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    destination: Option<PathBuf>,

    /// Create a post with the given title, dated today
    #[arg(long = "new_post", value_name = "TITLE")]
    new_post: Option<String>,

    /// Create `<NAME>/index.md`
    #[arg(long = "new_page", value_name = "NAME")]
    new_page: Option<String>,

    /// Check the project structure and content, creating missing directories
    #[arg(long)]
    doctor: bool,

    /// Run the Markdown validator and converter self-test
    #[arg(long = "test-markdown")]
    test_markdown: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Open the site in a browser once the server is up
    #[arg(long, requires = "serve")]
    open: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source: self.source.clone(),
            destination: self.destination.clone(),
            host: self.host.clone(),
            port: self.port,
            url: self.baseurl.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    quire::init_tracing(cli.verbose, cli.quiet);

    if cli.test_markdown {
        return cmd::test_markdown::run();
    }

    let config = Config::load(cli.config.as_deref(), &cli.overrides())
        .wrap_err("Failed to load configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    if let Some(title) = &cli.new_post {
        cmd::new::post(&config, title)?;
    } else if let Some(name) = &cli.new_page {
        cmd::new::page(&config, name)?;
    } else if cli.doctor {
        cmd::doctor::run(&config)?;
    } else if cli.serve {
        cmd::serve::run(config, cli.watch, cli.open).await?;
    } else if cli.watch {
        cmd::watch::run(config).await?;
    } else {
        cmd::build::run(config)?;
    }

    Ok(())
}
