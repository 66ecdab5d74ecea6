use serde::{Deserialize, Serialize};

/// A secret message that each channel member may reveal exactly once.
///
/// Records are stored as JSON in the host KV store. Every field carries
/// `#[serde(default)]` so that records written by older builds deserialise
/// with zero values and unknown fields from newer builds are ignored.
/// `viewed_by` keeps insertion order and never contains duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    /// Parent post id when the secret lives in a thread; empty otherwise.
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub viewed_by: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub expires_at: i64,
}

impl Secret {
    /// Whether the record's lifetime has elapsed at `now_millis`.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at > 0 && now_millis >= self.expires_at
    }

    pub fn has_viewed(&self, user_id: &str) -> bool {
        self.viewed_by.iter().any(|id| id == user_id)
    }

    /// Append `user_id` to the viewed-by set. Returns whether the set grew.
    pub fn mark_viewed(&mut self, user_id: &str) -> bool {
        if self.has_viewed(user_id) {
            return false;
        }
        self.viewed_by.push(user_id.to_string());
        true
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Request body for `POST /api/v1/secrets`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretRequest {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
}

/// Request body for `POST /api/v1/secrets/viewed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretViewedRequest {
    #[serde(default)]
    pub secret_id: String,
}
