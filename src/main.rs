//! CLI entry point for kontentsu

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kontentsu_client::config::ClientConfig;

#[derive(Parser)]
#[command(name = "kontentsu")]
#[command(version)]
#[command(about = "Render Kontentsu content through server-supplied templates", long_about = None)]
struct Cli {
    /// Configuration file (defaults to kontentsu.yml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one page to an HTML document
    #[command(alias = "r")]
    Render {
        /// Location to render (defaults to the front page)
        #[arg(default_value = "/")]
        path: String,

        /// Write the document to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start a local preview server
    #[command(alias = "s")]
    Preview {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// IP address to bind to
        #[arg(short, long, default_value = "localhost")]
        ip: String,

        /// Open browser automatically
        #[arg(short, long)]
        open: bool,
    },

    /// Display version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "kontentsu_client=debug,info"
    } else {
        "kontentsu_client=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config;
    let load_config = || -> Result<ClientConfig> {
        let config = match &config_path {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::from_dir(std::env::current_dir()?)?,
        };
        tracing::debug!("Content API: {}", config.files_api);
        Ok(config)
    };

    match cli.command {
        Commands::Render { path, output } => {
            let config = load_config()?;
            kontentsu_client::commands::render::run(config, &path, output.as_deref()).await?;
        }

        Commands::Preview { port, ip, open } => {
            let config = load_config()?;
            tracing::info!("Starting preview at http://{}:{}", ip, port);
            kontentsu_client::server::start(config, &ip, port, open).await?;
        }

        Commands::Version => {
            println!("kontentsu version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
