use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

lazy_static! {
    static ref DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref TIME_RE: Regex = Regex::new(r"^\d{2}:\d{2}(:\d{2})?$").unwrap();
}

/// A bookable time window. Read-only reference data owned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub scheduler_id: String,
    pub date: String,
    pub time: String,
    pub length: u32,
}

impl AppointmentSlot {
    /// Ordering of slots compares `date` and `time` as strings, which is only
    /// chronological for zero-padded `YYYY-MM-DD` and `HH:MM[:SS]`.
    pub fn is_well_formed(&self) -> bool {
        DATE_RE.is_match(&self.date) && TIME_RE.is_match(&self.time) && self.length > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(deserialize_with = "opaque_id")]
    pub appointment_id: String,
    pub scheduler_id: String,
    pub name: String,
    pub email: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub notes: String,
}

/// Row submitted to the store. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub appointment_id: String,
    pub scheduler_id: String,
    pub name: String,
    pub email: String,
    pub notes: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
