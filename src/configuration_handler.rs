use crate::{
    configuration::{BackendKind, Configuration},
    error::ConfigError,
    remote_store::StoreCredentials,
};
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use tracing::debug;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Appointment scheduler widget host")]
pub struct ConfigurationHandler {
    /// Where slots and bookings are stored
    #[arg(long, value_enum, env = "SCHEDULER_BACKEND", default_value = "rest")]
    backend: BackendKind,

    /// Endpoint of the REST store, e.g. https://<project>.supabase.co
    #[arg(long, env = "SCHEDULER_STORE_URL")]
    store_url: Option<String>,

    /// Public access key of the REST store
    #[arg(long, env = "SCHEDULER_STORE_KEY", hide_env_values = true)]
    store_key: Option<String>,

    /// Postgres connection URL for the postgres backend
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "SCHEDULER_ID")]
    scheduler_id: String,

    /// Only show slots on these dates (YYYY-MM-DD, comma separated)
    #[arg(long, env = "SCHEDULER_DATES", value_delimiter = ',')]
    dates: Vec<String>,

    #[arg(long, env = "SCHEDULER_SYNC_INTERVAL_SECS", default_value_t = 10)]
    sync_interval_secs: u64,

    #[arg(long, env = "SCHEDULER_PORT", default_value = "3000")]
    port: String,

    /// File remembering the email this installation booked with
    #[arg(long, env = "SCHEDULER_IDENTITY_FILE", default_value = "scheduler_identity.json")]
    identity_file: PathBuf,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded environment file");
        }
        Self::parse()
    }

    /// Fails for settings the selected backend can't run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler_id.trim().is_empty() {
            return Err(ConfigError::MissingSchedulerId);
        }
        match self.backend {
            BackendKind::Rest => self.store_credentials().map(|_| ()),
            BackendKind::Postgres if self.database_url().is_none() => {
                Err(ConfigError::MissingDatabaseUrl)
            }
            BackendKind::Postgres | BackendKind::Memory => Ok(()),
        }
    }
}

impl Configuration for ConfigurationHandler {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn store_credentials(&self) -> Result<StoreCredentials, ConfigError> {
        StoreCredentials::new(self.store_url.clone(), self.store_key.clone())
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn scheduler_id(&self) -> String {
        self.scheduler_id.trim().to_string()
    }

    fn dates(&self) -> Vec<String> {
        self.dates
            .iter()
            .map(|date| date.trim().to_string())
            .filter(|date| !date.is_empty())
            .collect()
    }

    fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    fn port(&self) -> String {
        self.port.clone()
    }

    fn identity_file(&self) -> PathBuf {
        self.identity_file.clone()
    }
}
