use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A chat message as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            timestamp,
        }
    }

    /// Whether this message renders on the current user's side of the view.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    /// Short `HH:MM` label shown under a bubble.
    pub fn display_time(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let timestamp = wire
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let id = wire.id.unwrap_or_else(|| {
            // Fallback only: the backend is expected to assign ids.
            let raw = match &wire.timestamp {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => timestamp.timestamp_millis().to_string(),
            };
            synthesize_id(&wire.sender_id, &raw)
        });
        Self {
            id,
            sender_id: wire.sender_id,
            content: wire.content,
            timestamp,
        }
    }
}

/// Builds a best-effort key from sender and timestamp plus a random tie-breaker.
pub fn synthesize_id(sender_id: &str, raw_timestamp: &str) -> String {
    format!("{sender_id}-{raw_timestamp}-{}", uuid::Uuid::new_v4().simple())
}

/// Message as it appears on the wire, from the history endpoint or a push frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "required_string_or_number")]
    pub sender_id: String,
    #[serde(default, alias = "text")]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Body published to the conversation's send destination.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub content: String,
}

/// Entry of the user's conversation directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(deserialize_with = "required_string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "required_string_or_number")]
    pub employer_id: String,
    #[serde(default)]
    pub employer_name: Option<String>,
    #[serde(default, deserialize_with = "required_string_or_number")]
    pub applicant_id: String,
    #[serde(default)]
    pub applicant_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub application_id: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// Name of the other party, seen from `user_id`.
    pub fn partner_name(&self, user_id: &str) -> &str {
        let name = if self.employer_id == user_id {
            self.applicant_name.as_deref()
        } else {
            self.employer_name.as_deref()
        };
        name.unwrap_or("Unknown")
    }
}

/// Bearer token plus the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub user_id: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { token: token.into(), user_id: user_id.into() }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Accepts ISO-8601 with or without offset (naive values are UTC) or epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn required_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(deserializer).map(Option::unwrap_or_default)
}
