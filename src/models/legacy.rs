use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

use super::queue_item::{ItemBody, QueueItem};
use super::submission::{Location, SubmissionPayload};

/// Namespace for ids derived from legacy entries that were stored without one.
const LEGACY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_4c2e_93a8_4b7a_a1e5_0c3f_52d9_7e10);

/// One entry of the flat list written by the old offline store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub form_id: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(
        default,
        alias = "timestamp",
        deserialize_with = "capture_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// The old store wrote either an RFC 3339 string or epoch milliseconds.
fn capture_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Text(at)) => Ok(Some(at)),
        Some(Raw::Millis(ms)) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("timestamp {ms} out of range"))),
    }
}

impl LegacyEntry {
    /// The entry's own id, or one derived from its content so repeated
    /// migrations of the same data land on the same id.
    pub fn stable_id(&self) -> Uuid {
        self.id.unwrap_or_else(|| {
            let canonical = serde_json::to_vec(self).unwrap_or_default();
            Uuid::new_v5(&LEGACY_NAMESPACE, &canonical)
        })
    }

    pub fn into_item(self, migrated_at: DateTime<Utc>) -> QueueItem {
        let id = self.stable_id();
        let created_at = self.created_at.unwrap_or(migrated_at);
        QueueItem::with_id(
            id,
            ItemBody::Submission(SubmissionPayload {
                form_id: self.form_id,
                data: self.data,
                stop_id: self.stop_id,
                location: self.location,
            }),
            created_at,
        )
    }
}
