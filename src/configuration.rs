use crate::{error::ConfigError, remote_store::StoreCredentials};
use clap::ValueEnum;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// PostgREST-style HTTP store
    Rest,
    /// Direct Postgres connection
    Postgres,
    /// Impersistent in-memory store with example slots
    Memory,
}

pub trait Configuration: Clone + Send + Sync + 'static {
    fn backend(&self) -> BackendKind;
    fn store_credentials(&self) -> Result<StoreCredentials, ConfigError>;
    fn database_url(&self) -> Option<String>;
    fn scheduler_id(&self) -> String;
    fn dates(&self) -> Vec<String>;
    fn sync_interval(&self) -> Duration;
    fn port(&self) -> String;
    fn identity_file(&self) -> PathBuf;
}
