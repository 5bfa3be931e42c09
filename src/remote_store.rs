//! Client for a PostgREST-style table API (`{url}/rest/v1/{table}`).

use crate::{
    backend::SchedulerBackend,
    error::{ConfigError, StoreError},
    types::{AppointmentSlot, Booking, NewBooking},
};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const APPOINTMENTS_TABLE: &str = "appointments";
const BOOKINGS_TABLE: &str = "bookings";

/// Upper bound for one store request, shorter than the sync interval.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub url: String,
    pub key: String,
}

impl StoreCredentials {
    pub fn new(url: Option<String>, key: Option<String>) -> Result<Self, ConfigError> {
        let url = url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingStoreUrl)?;
        let key = key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingStoreKey)?;
        Ok(Self { url, key })
    }
}

#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base: Url,
    key: String,
}

impl RemoteStore {
    pub fn new(credentials: StoreCredentials) -> Result<Self, ConfigError> {
        Self::with_timeout(credentials, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        credentials: StoreCredentials,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStoreUrl {
            url: credentials.url.clone(),
            reason,
        };
        let mut base = Url::parse(credentials.url.trim()).map_err(|err| invalid(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot be a base".into()));
        }
        base.path_segments_mut()
            .map_err(|_| invalid("URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["rest", "v1"]);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            base,
            key: credentials.key,
        })
    }

    fn table(&self, table: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(table);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.key))
    }

    async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(body));
        }
        Err(StoreError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SchedulerBackend for RemoteStore {
    async fn appointments(
        &self,
        scheduler_id: &str,
        dates: &[String],
    ) -> Result<Vec<AppointmentSlot>, StoreError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("scheduler_id", format!("eq.{scheduler_id}")),
        ];
        if !dates.is_empty() {
            query.push(("date", format!("in.({})", dates.join(","))));
        }

        let request = self.client.get(self.table(APPOINTMENTS_TABLE)).query(&query);
        let response = self.authorize(request).send().await?;
        let slots: Vec<AppointmentSlot> = Self::rows(response).await?;
        debug!(scheduler_id, count = slots.len(), "Fetched appointments");
        Ok(slots)
    }

    async fn bookings(&self, scheduler_id: &str) -> Result<Vec<Booking>, StoreError> {
        let query = [
            ("select", "*".to_string()),
            ("scheduler_id", format!("eq.{scheduler_id}")),
        ];

        let request = self.client.get(self.table(BOOKINGS_TABLE)).query(&query);
        let response = self.authorize(request).send().await?;
        Self::rows(response).await
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let request = self
            .client
            .post(self.table(BOOKINGS_TABLE))
            .header("Prefer", "return=representation")
            .json(&booking);
        let response = self.authorize(request).send().await?;

        Self::rows::<Booking>(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote {
                status: StatusCode::OK.as_u16(),
                body: "insert returned no row".into(),
            })
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.table(BOOKINGS_TABLE))
            .query(&[("id", format!("eq.{booking_id}"))])
            .header("Prefer", "return=representation");
        let response = self.authorize(request).send().await?;

        let deleted: Vec<Booking> = Self::rows(response).await?;
        if deleted.is_empty() {
            return Err(StoreError::NotFound(format!("Booking {booking_id}")));
        }
        Ok(())
    }
}
