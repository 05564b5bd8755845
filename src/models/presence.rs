use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    Users,
    Drivers,
}

impl PresenceKind {
    pub const ALL: [PresenceKind; 2] = [PresenceKind::Users, PresenceKind::Drivers];

    pub fn collection(self) -> &'static str {
        match self {
            PresenceKind::Users => "users",
            PresenceKind::Drivers => "drivers",
        }
    }
}

impl fmt::Display for PresenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for PresenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(PresenceKind::Users),
            "drivers" => Ok(PresenceKind::Drivers),
            other => Err(format!("unknown presence collection: {other}")),
        }
    }
}

/// A logged-in user or driver as stored under `users/{id}` or `drivers/{id}`.
///
/// Decoding is lenient: an unreadable location becomes `None` and a
/// non-string `lastActiveAt` is kept as its JSON text so the sweeper can
/// classify it as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_location")]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_active_at: Option<String>,
}

fn lenient_location<'de, D>(deserializer: D) -> Result<Option<GeoPoint>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}
