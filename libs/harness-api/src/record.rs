use serde::{Deserialize, Serialize};

/// Primary key of a seeded response: partition + sequence number.
///
/// Ordering is `(partition_key, sequence_key)`, so a sorted scan of one
/// partition yields records oldest first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition_key: String,
    pub sequence_key: i64,
}

impl RecordKey {
    pub fn new(partition_key: impl Into<String>, sequence_key: i64) -> Self {
        Self {
            partition_key: partition_key.into(),
            sequence_key,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.partition_key, self.sequence_key)
    }
}

/// One canned response, served exactly once.
///
/// Wire names follow the seeding format (`pk`, `sk`, `statusCode`,
/// `response`); the descriptive names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "pk", alias = "partitionKey")]
    pub partition_key: String,
    #[serde(rename = "sk", alias = "sequenceKey")]
    pub sequence_key: i64,
    /// Kept wide: seeded values pass through uninspected until served.
    #[serde(rename = "statusCode")]
    pub status_code: i64,
    #[serde(rename = "response", alias = "payload", default)]
    pub payload: serde_json::Value,
}

impl Record {
    pub fn new(
        partition_key: impl Into<String>,
        sequence_key: i64,
        status_code: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            sequence_key,
            status_code,
            payload,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.partition_key.clone(), self.sequence_key)
    }
}
