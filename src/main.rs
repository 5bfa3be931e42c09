use std::sync::Arc;

use crate::{
    backend::SchedulerBackend,
    configuration::{BackendKind, Configuration},
    configuration_handler::ConfigurationHandler,
    error::ConfigError,
    http::{create_app, AppState},
    identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore},
    local_store::LocalStore,
    remote_store::RemoteStore,
    session::SchedulerSession,
};
use futures::StreamExt;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod backend;
mod configuration;
mod configuration_handler;
#[cfg(feature = "postgres")]
mod database_interface;
mod eligibility;
mod error;
mod form;
mod formatting;
mod grouping;
mod http;
mod identity;
mod local_store;
mod remote_store;
#[cfg(feature = "postgres")]
mod schema;
mod session;
#[cfg(test)]
mod testutils;
mod types;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("#####################");
    println!("# Booking Scheduler #");
    println!("#####################");

    let configuration = ConfigurationHandler::parse_arguments();
    if let Err(err) = configuration.validate() {
        error!(%err, "Invalid configuration");
        std::process::exit(1);
    }

    if let Err(err) = start(configuration).await {
        error!(%err, "Scheduler stopped");
        std::process::exit(1);
    }
}

async fn start(configuration: ConfigurationHandler) -> Result<(), Box<dyn std::error::Error>> {
    match configuration.backend() {
        BackendKind::Rest => {
            let backend = RemoteStore::new(configuration.store_credentials()?)?;
            let identity = FileIdentityStore::new(configuration.identity_file());
            info!(path = %identity.path().display(), "Remembering bookings in");
            run(backend, Arc::new(identity), configuration).await
        }
        BackendKind::Postgres => {
            let backend = connect_database(&configuration).await?;
            let identity = FileIdentityStore::new(configuration.identity_file());
            info!(path = %identity.path().display(), "Remembering bookings in");
            run(backend, Arc::new(identity), configuration).await
        }
        BackendKind::Memory => {
            info!("Using impersistent in-memory store with example slots");
            let backend = LocalStore::default();
            backend.insert_example_slots(&configuration.scheduler_id());
            run(backend, Arc::new(MemoryIdentityStore::default()), configuration).await
        }
    }
}

#[cfg(feature = "postgres")]
async fn connect_database(
    configuration: &impl Configuration,
) -> Result<database_interface::DatabaseInterface, ConfigError> {
    use std::time::Duration;
    use tokio::time::sleep;

    let database_url = configuration
        .database_url()
        .ok_or(ConfigError::MissingDatabaseUrl)?;
    loop {
        match database_interface::DatabaseInterface::new(&database_url) {
            Ok(backend) => {
                info!("Successfully connected to database");
                return Ok(backend);
            }
            Err(err) => {
                error!(?err, "Failed to establish database connection. Retry in 1 sec. You may want to restart it with the memory backend (impersistent slots).");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn connect_database(_configuration: &impl Configuration) -> Result<LocalStore, ConfigError> {
    Err(ConfigError::UnsupportedBackend("postgres"))
}

async fn run<B: SchedulerBackend>(
    backend: B,
    identity: Arc<dyn IdentityStore>,
    configuration: impl Configuration,
) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler_id = configuration.scheduler_id();
    let session = SchedulerSession::with_sync_interval(backend, configuration.sync_interval());
    session.initialize(&scheduler_id, &configuration.dates()).await;
    session.start_sync();
    info!(
        %scheduler_id,
        slots = session.slots().len(),
        bookings = session.bookings().len(),
        syncing = session.is_syncing(),
        "Scheduler initialized"
    );

    let mut bookings = session.subscribe();
    tokio::spawn(async move {
        while let Some(bookings) = bookings.next().await {
            debug!(count = bookings.len(), "Bookings updated");
        }
    });

    let app = create_app(AppState::new(session, identity));

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessible at:\n{}", address);
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
