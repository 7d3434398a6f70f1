// Core data structures for warplog

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the history API and the persisted store
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rank of the top rarity tier
pub const TOP_RANK: u8 = 5;

/// Rank of the tier just below the top
pub const HIGH_RANK: u8 = 4;

/// Rank assumed when the API omits or garbles `rank_type`
pub const DEFAULT_RANK: u8 = 3;

/// One pull, as fetched from the history API
///
/// Records are immutable once created: fields are private and only exposed
/// through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default = "default_rank")]
    rank: u8,
    #[serde(default)]
    time: String,
    #[serde(default)]
    gacha_type: String,
    #[serde(default, alias = "type")]
    item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
}

fn default_rank() -> u8 {
    DEFAULT_RANK
}

impl PullRecord {
    /// Create a record without item type or account id
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rank: u8,
        time: impl Into<String>,
        gacha_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rank,
            time: time.into(),
            gacha_type: gacha_type.into(),
            item_type: String::new(),
            uid: None,
        }
    }

    /// Attach the item type label (character, light cone, ...)
    #[must_use]
    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = item_type.into();
        self
    }

    /// Attach the originating account id
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        let uid = uid.into();
        self.uid = (!uid.is_empty()).then_some(uid);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Timestamp string in `YYYY-MM-DD HH:MM:SS` form
    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn gacha_type(&self) -> &str {
        &self.gacha_type
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Whether this pull hit the top rarity tier
    pub fn is_top_rank(&self) -> bool {
        self.rank == TOP_RANK
    }

    /// Parsed timestamp, `None` if the string does not follow [`TIME_FORMAT`]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.time, TIME_FORMAT).ok()
    }

    /// Deduplication key: (id or empty, name, time)
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            id: self.id.clone(),
            name: self.name.clone(),
            time: self.time.clone(),
        }
    }
}

/// Tuple used to recognise the same pull across repeated fetch runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub id: String,
    pub name: String,
    pub time: String,
}

impl IdentityKey {
    /// A key with every field empty identifies nothing
    pub fn is_degenerate(&self) -> bool {
        self.id.is_empty() && self.name.is_empty() && self.time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_uid_is_none() {
        let record = PullRecord::new("1", "Seele", 5, "2024-01-01 00:00:00", "11").with_uid("");
        assert_eq!(record.uid(), None);

        let record = record.with_uid("100000001");
        assert_eq!(record.uid(), Some("100000001"));
    }

    #[test]
    fn test_timestamp_parsing() {
        let record = PullRecord::new("1", "Arrows", 3, "2024-03-05 18:22:09", "1");
        let ts = record.timestamp().unwrap();
        assert_eq!(ts.format(TIME_FORMAT).to_string(), "2024-03-05 18:22:09");

        let bad = PullRecord::new("1", "Arrows", 3, "yesterday", "1");
        assert!(bad.timestamp().is_none());
    }

    #[test]
    fn test_identity_key() {
        let record = PullRecord::new("", "Arrows", 3, "2024-03-05 18:22:09", "1");
        let key = record.identity_key();
        assert_eq!(key.id, "");
        assert!(!key.is_degenerate());

        let empty = PullRecord::new("", "", 3, "", "1");
        assert!(empty.identity_key().is_degenerate());
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let record: PullRecord = serde_json::from_str(r#"{"name":"Arrows"}"#).unwrap();
        assert_eq!(record.rank(), DEFAULT_RANK);
        assert_eq!(record.id(), "");
        assert!(!record.is_top_rank());
    }
}
