#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parley_conversation::{TurnConfig, TurnOrchestrator};
use parley_core::LLMProvider;
use parley_http::{AppState, cors_layer, router, serve};
use parley_providers::GeminiProvider;
use parley_threads::ThreadStore;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "parley conversational API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// Model-provider credential
        #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Comma-separated CORS origin allowlist
        #[arg(long, env = "FRONTEND_ORIGINS", default_value = "http://localhost:3000")]
        origins: String,

        /// Model to use for completions
        #[arg(long, env = "PARLEY_MODEL", default_value = "gemini-2.5-flash")]
        model: String,

        /// Upper bound on one model invocation, in seconds
        #[arg(long, env = "PARLEY_INVOKE_TIMEOUT_SECS", default_value_t = 60)]
        invoke_timeout_secs: u64,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            api_key,
            origins,
            model,
            invoke_timeout_secs,
        } => {
            let origins: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();

            let provider: Arc<dyn LLMProvider> = Arc::new(GeminiProvider::new(api_key));
            let store = Arc::new(ThreadStore::new());
            let config = TurnConfig::default()
                .with_model(model)
                .with_invoke_timeout(Duration::from_secs(invoke_timeout_secs));

            info!("Serving model {} on {host}:{port}", config.model);

            let orchestrator = Arc::new(TurnOrchestrator::new(
                provider,
                Arc::clone(&store),
                config,
            ));

            let state = AppState {
                orchestrator,
                store: Arc::clone(&store),
            };
            let app = router(state, cors_layer(&origins));

            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            serve(addr, app).await?;

            info!(
                "Stopped with {} threads in memory",
                store.thread_count().await
            );
        }
        Commands::Version => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
