//! Combined binary for development - runs auth-service and the gateway in one process.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rust-api")]
#[command(about = "Combined auth-service and gateway binary for development")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both services in a single process (development mode)
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "3000")]
        gateway_port: u16,
        #[arg(long, default_value = "50051")]
        auth_port: u16,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Create the standard accounts if they do not exist yet
    Seed {
        #[arg(long, env = "SEED_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum MigrateAction {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset database and run all migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            gateway_port,
            auth_port,
        } => {
            info!("Starting combined services in development mode");
            info!("  Gateway:      http://{}:{}", host, gateway_port);
            info!("  Auth service: http://{}:{}", host, auth_port);

            // auth-service owns the database and runs migrations on start
            let auth_host = host.clone();
            let auth_handle = tokio::spawn(async move {
                if let Err(e) = auth_service_lib::run_embedded(&auth_host, auth_port).await {
                    error!("Auth service failed: {}", e);
                }
            });

            // The gateway channel is lazy, so a late auth-service only delays first calls
            let gateway_host = host.clone();
            let gateway_handle = tokio::spawn(async move {
                if let Err(e) =
                    gateway_lib::run_embedded(&gateway_host, gateway_port, auth_port).await
                {
                    error!("Gateway failed: {}", e);
                }
            });

            tokio::select! {
                _ = auth_handle => {
                    error!("Auth service exited");
                }
                _ = gateway_handle => {
                    error!("Gateway exited");
                }
            }
        }
        Commands::Migrate { action } => {
            let migrate_action = match action {
                MigrateAction::Up => auth_service_lib::MigrateAction::Up,
                MigrateAction::Down => auth_service_lib::MigrateAction::Down,
                MigrateAction::Status => auth_service_lib::MigrateAction::Status,
                MigrateAction::Fresh => auth_service_lib::MigrateAction::Fresh,
            };

            auth_service_lib::run_migrations(migrate_action).await?;
        }
        Commands::Seed { password } => {
            let report = auth_service_lib::run_seed(&password).await?;
            info!("Seeded {:?}, skipped {:?}", report.created, report.skipped);
        }
    }

    Ok(())
}
