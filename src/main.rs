//! copilot-gateway - OpenAI-compatible gateway in front of GitHub Copilot
//!
//! Accepts chat, embeddings and model requests authorized with a GitHub
//! OAuth token and relays them to the Copilot API with a short-lived
//! upstream credential.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use copilot_gateway::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "copilot-gateway")]
#[command(about = "OpenAI-compatible gateway in front of GitHub Copilot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Path to configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Try the next port when the chosen one is in use
        #[arg(long)]
        auto_port: bool,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("copilot_gateway={},tower_http=info", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            auto_port,
        } => {
            let mut cfg = Config::load(config.as_deref())?;
            init_tracing(&cfg.logging.level);

            match &config {
                Some(path) => tracing::info!(config = %path.display(), "Loaded configuration"),
                None => tracing::info!("No config file given, using defaults"),
            }

            if let Some(port) = port {
                cfg.set_port(port);
                tracing::info!(listen = %cfg.server.listen, "Override listen port");
            }
            if auto_port {
                cfg.server.auto_increment_port = true;
            }

            copilot_gateway::proxy::run_server(cfg).await
        }

        Commands::Check { config } => {
            let cfg = Config::load(config.as_deref())?;
            init_tracing(&cfg.logging.level);

            println!("Configuration OK");
            println!("  listen:       {}", cfg.server.listen);
            println!("  database:     {}", cfg.database.path);
            println!("  upstream:     {}", cfg.upstream.api_base);
            println!("  insecure TLS: {}", cfg.upstream.insecure_tls);
            if let Some(bundle) = &cfg.upstream.ca_bundle {
                println!("  CA bundle:    {}", bundle.display());
            }
            println!(
                "  reasoning models without streaming: {}",
                cfg.fingerprint.reasoning_model_prefixes.join(", ")
            );

            // Building the client also reads and parses the CA bundle.
            cfg.upstream.build_client()?;
            Ok(())
        }
    }
}
