use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use gcs_bq_loader::{config::Config, models::LoadRequest, routes::create_router, utils, AppState};

#[derive(Debug, Parser)]
#[command(name = "gcs-bq-loader", version, about = "Incremental Cloud Storage to BigQuery loads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the load and dispatch endpoints (default)
    Serve,
    /// Queue one load task per configured job and print the report
    Dispatch,
    /// Run one load for a job and print the outcome
    Load {
        #[arg(long)]
        job_name: String,
        #[arg(long)]
        backfill: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_tracing();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    // Create shared state (runs migrations for the Postgres store)
    let state = AppState::build(config.clone()).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let app = create_router(state);

            let ip = config
                .server
                .host
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid HOST {}: {}", config.server.host, e))?;
            let addr = SocketAddr::new(ip, config.server.port);
            info!("Server listening on {}", addr);

            let listener = TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
        Commands::Dispatch => {
            let report = state.dispatcher.dispatch_all().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Load { job_name, backfill } => {
            let request = LoadRequest {
                job_name: Some(job_name),
                backfill,
            };
            let outcome = state.orchestrator.run(&request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
