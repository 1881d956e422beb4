use std::fmt;

use calvault_types::{ObjectId, Timestamp};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One version of an entity: when it was saved and the hash of its content.
///
/// On disk each entry is a JSON array `[timestamp, hashHex, ...extra]`.
/// Trailing elements this version does not understand are kept in `extra`
/// and written back unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub hash: ObjectId,
    pub extra: Vec<Value>,
}

impl HistoryEntry {
    /// An entry with no extra elements.
    pub fn new(timestamp: Timestamp, hash: ObjectId) -> Self {
        Self {
            timestamp,
            hash,
            extra: Vec::new(),
        }
    }
}

impl Serialize for HistoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.extra.len()))?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.hash)?;
        for value in &self.extra {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for HistoryEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = HistoryEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [timestamp, hash, ...] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<HistoryEntry, A::Error> {
                let timestamp = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let hash = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let mut extra = Vec::new();
                while let Some(value) = seq.next_element::<Value>()? {
                    extra.push(value);
                }
                Ok(HistoryEntry {
                    timestamp,
                    hash,
                    extra,
                })
            }
        }

        deserializer.deserialize_seq(EntryVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_as_tuple() {
        let hash = calvault_crypto::ContentHasher::OBJECT.hash(b"content");
        let entry = HistoryEntry::new(Timestamp::from_secs(1_700_000_000), hash);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, json!([1_700_000_000, hash.to_hex()]));
    }

    #[test]
    fn extra_elements_survive() {
        let hash = calvault_crypto::ContentHasher::OBJECT.hash(b"content");
        let raw = json!([1_600_000_000, hash.to_hex(), "note", {"k": 1}]);
        let entry: HistoryEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.hash, hash);
        assert_eq!(entry.extra.len(), 2);
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn float_timestamps_are_truncated() {
        let hash = calvault_crypto::ContentHasher::OBJECT.hash(b"content");
        let entry: HistoryEntry =
            serde_json::from_value(json!([1_600_000_000.75, hash.to_hex()])).unwrap();
        assert_eq!(entry.timestamp, Timestamp::from_secs(1_600_000_000));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!(serde_json::from_value::<HistoryEntry>(json!([1])).is_err());
        assert!(serde_json::from_value::<HistoryEntry>(json!([1, "nothex"])).is_err());
        assert!(serde_json::from_value::<HistoryEntry>(json!({"ts": 1})).is_err());
    }
}
