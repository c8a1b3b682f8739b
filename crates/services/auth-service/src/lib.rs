//! Auth Service Library
//!
//! This crate owns credentials and sessions: it stores identities with
//! self-describing password hashes, issues signed access tokens backed by
//! revocable server-side sessions, and exposes all of it over gRPC.

pub mod clock;
pub mod config;
pub mod grpc;
pub mod infra;
pub mod repository;
pub mod service;
pub mod session;
pub mod token;

use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::{info, warn};

use domain::CredentialHasher;

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthServiceConfig, StorageBackend};
use crate::grpc::AuthGrpcService;
use crate::infra::Database;
use crate::repository::{IdentityRepository, IdentityStore};
use crate::service::{default_seeds, seed_identities, Authenticator, CredentialWorkers, SeedReport};
use crate::session::{
    DbSessionStore, GuardedSessionStore, InMemorySessionStore, SessionStore, SessionSweeper,
};
use crate::token::TokenIssuer;

/// Run the auth service as an embedded component (for combined binary).
pub async fn run_embedded(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = AuthServiceConfig::from_env()?;
    run_server_with_config(host, port, config).await
}

/// Build an authenticator from configuration and already-constructed stores.
pub fn build_authenticator(
    config: &AuthServiceConfig,
    identities: Arc<dyn IdentityRepository>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
) -> Result<Authenticator, Box<dyn std::error::Error>> {
    let tokens = Arc::new(TokenIssuer::new(
        config.key_ring()?,
        config.token_lifetime,
        config.token_issuer.clone(),
        clock,
    ));
    let hasher = CredentialHasher::new(config.hash_params)?;
    let workers = Arc::new(CredentialWorkers::new(hasher, config.hash_workers));

    Ok(Authenticator::new(identities, sessions, tokens, workers)
        .with_min_password_length(config.min_password_length))
}

/// Session store for the configured backend, bounded by the session guard.
pub fn session_store(
    config: &AuthServiceConfig,
    db: &Database,
    clock: Arc<dyn Clock>,
) -> Arc<dyn SessionStore> {
    let inner: Arc<dyn SessionStore> = match config.session_backend {
        StorageBackend::Database => Arc::new(DbSessionStore::new(db.get_connection(), clock)),
        StorageBackend::Memory => {
            warn!("Using in-memory session store: sessions are lost on restart");
            Arc::new(InMemorySessionStore::new(clock))
        }
    };

    Arc::new(GuardedSessionStore::new(
        inner,
        config.session_timeout,
        config.session_retry_backoff,
    ))
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AuthServiceConfig::from_env()?;
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}

/// Create the standard accounts with an operator-supplied password.
///
/// Existing usernames are left untouched, so running it twice is harmless.
pub async fn run_seed(password: &str) -> Result<SeedReport, Box<dyn std::error::Error>> {
    let config = AuthServiceConfig::from_env()?;
    let db = Database::connect(&config.database).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let identities = Arc::new(IdentityStore::new(db.get_connection()));
    let sessions = session_store(&config, &db, clock.clone());
    let service = build_authenticator(&config, identities, sessions, clock)?;

    let report = seed_identities(&service, &default_seeds(password)).await?;
    info!(
        created = report.created.len(),
        skipped = report.skipped.len(),
        "Seeding finished"
    );
    Ok(report)
}

/// Run the gRPC server with the given configuration.
async fn run_server_with_config(
    host: &str,
    port: u16,
    config: AuthServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(?config, "Starting auth service");

    // Initialize database
    let db = Database::connect(&config.database).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Wire stores and service
    let identities = Arc::new(IdentityStore::new(db.get_connection()));
    let sessions = session_store(&config, &db, clock.clone());
    let service = Arc::new(build_authenticator(
        &config,
        identities,
        sessions.clone(),
        clock.clone(),
    )?);

    // Background purge of long-expired sessions
    let sweeper = SessionSweeper::new(
        sessions,
        clock,
        config.session_retention,
        config.session_sweep_interval,
    )
    .spawn();

    // Create gRPC service
    let grpc_service = AuthGrpcService::new(service);

    // Build address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Auth service listening on {}", addr);

    // Run server
    let served = Server::builder()
        .add_service(proto::AuthServiceServer::new(grpc_service))
        .serve_with_shutdown(addr, shutdown_signal())
        .await;

    sweeper.shutdown().await;
    served?;

    info!("Auth service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
