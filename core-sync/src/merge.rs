//! Last-writer-wins merge of a remote collection into a local one.
//!
//! For each remote record:
//! - unknown key: appended (`added`)
//! - remote timestamp strictly newer: replaces the local record (`updated`)
//! - otherwise the local record stays (`skipped`); equal timestamps keep local
//!
//! The merge only moves data remote-into-local. Other devices converge once
//! the merged result is uploaded.

use crate::error::{Result, SyncError};
use crate::records::{
    ActivityEntry, SyncedRecord, Tag, VocabularyEntry, ACTIVITY_LOG_FILE, TAGS_FILE,
    VOCABULARY_FILE,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MergeStats {
    /// Whether the local collection was modified.
    pub fn changed(&self) -> bool {
        self.added + self.updated > 0
    }
}

/// Merge `remote` into `local` in place. Local order is kept; new records
/// are appended in remote order.
pub fn merge_collection<R>(local: &mut Vec<R>, remote: &[R]) -> MergeStats
where
    R: SyncedRecord + Clone,
{
    let mut index: HashMap<String, usize> = local
        .iter()
        .enumerate()
        .map(|(i, record)| (record.key().to_string(), i))
        .collect();
    let mut stats = MergeStats::default();

    for incoming in remote {
        match index.get(incoming.key()) {
            None => {
                index.insert(incoming.key().to_string(), local.len());
                local.push(incoming.clone());
                stats.added += 1;
            }
            Some(&i) if incoming.timestamp() > local[i].timestamp() => {
                local[i] = incoming.clone();
                stats.updated += 1;
            }
            Some(_) => stats.skipped += 1,
        }
    }

    stats
}

/// Merge two serialized documents of the given synchronized file.
///
/// Returns the merged document and the merge counts.
pub fn merge_document(file_name: &str, local: &[u8], remote: &[u8]) -> Result<(Bytes, MergeStats)> {
    match file_name {
        VOCABULARY_FILE => merge_typed::<VocabularyEntry>(file_name, local, remote),
        TAGS_FILE => merge_typed::<Tag>(file_name, local, remote),
        ACTIVITY_LOG_FILE => merge_typed::<ActivityEntry>(file_name, local, remote),
        other => Err(SyncError::Serialization {
            file: other.to_string(),
            message: "no merge rule for this file".to_string(),
        }),
    }
}

fn merge_typed<R>(file_name: &str, local: &[u8], remote: &[u8]) -> Result<(Bytes, MergeStats)>
where
    R: SyncedRecord + Clone + Serialize + DeserializeOwned,
{
    let mut merged: Vec<R> = parse_document(file_name, local)?;
    let incoming: Vec<R> = parse_document(file_name, remote)?;
    let stats = merge_collection(&mut merged, &incoming);

    let json = serde_json::to_vec_pretty(&merged).map_err(|e| SyncError::Serialization {
        file: file_name.to_string(),
        message: e.to_string(),
    })?;
    Ok((Bytes::from(json), stats))
}

/// An empty or whitespace-only document is an empty collection.
fn parse_document<R: DeserializeOwned>(file_name: &str, raw: &[u8]) -> Result<Vec<R>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(raw).map_err(|e| SyncError::Serialization {
        file: file_name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Map;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn word(text: &str, added: i64) -> VocabularyEntry {
        VocabularyEntry {
            word: text.to_string(),
            definition: None,
            tag_ids: Vec::new(),
            added_at: at(added),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_apple_banana_scenario() {
        let mut local = vec![word("apple", 100)];
        let remote = vec![word("apple", 200), word("banana", 50)];

        let stats = merge_collection(&mut local, &remote);

        assert_eq!(local, vec![word("apple", 200), word("banana", 50)]);
        assert_eq!(
            stats,
            MergeStats {
                added: 1,
                updated: 1,
                skipped: 0
            }
        );
    }

    #[test]
    fn test_tie_keeps_local() {
        let mut local_apple = word("apple", 100);
        local_apple.definition = Some("local".into());
        let mut remote_apple = word("apple", 100);
        remote_apple.definition = Some("remote".into());
        let mut local = vec![local_apple.clone()];

        let stats = merge_collection(&mut local, &[remote_apple]);

        assert_eq!(local, vec![local_apple]);
        assert_eq!(stats.skipped, 1);
        assert!(!stats.changed());
    }

    #[test]
    fn test_older_remote_is_skipped() {
        let mut local = vec![word("apple", 300)];
        let stats = merge_collection(&mut local, &[word("apple", 200)]);

        assert_eq!(local[0].added_at, at(300));
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_newer_remote_replaces_exactly() {
        let mut remote_apple = word("apple", 200);
        remote_apple.definition = Some("a fruit".into());
        remote_apple
            .extra
            .insert("difficulty".into(), serde_json::json!(3));
        let mut local = vec![word("apple", 100)];

        merge_collection(&mut local, &[remote_apple.clone()]);

        assert_eq!(local[0], remote_apple);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let remote = vec![word("apple", 200), word("banana", 50), word("cherry", 10)];
        let mut once = vec![word("apple", 100), word("damson", 70)];
        merge_collection(&mut once, &remote);

        let mut twice = once.clone();
        let stats = merge_collection(&mut twice, &remote);

        assert_eq!(once, twice);
        assert!(!stats.changed());
    }

    #[test]
    fn test_merge_document_for_tags() {
        let local = br#"[{"id":"t1","name":"verbs","createdAt":"2024-03-01T00:00:00Z"}]"#;
        let remote = br#"[{"id":"t2","name":"nouns","createdAt":"2024-02-01T00:00:00Z"}]"#;

        let (merged, stats) = merge_document(TAGS_FILE, local, remote).unwrap();
        let tags: Vec<Tag> = serde_json::from_slice(&merged).unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(
            tags.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t2"]
        );
    }

    #[test]
    fn test_merge_document_empty_local() {
        let remote = br#"[{"id":"a1","activity":"quiz","timestamp":"2024-03-01T00:00:00Z"}]"#;
        let (_, stats) = merge_document(ACTIVITY_LOG_FILE, b"", remote).unwrap();
        assert_eq!(stats.added, 1);
    }

    #[test]
    fn test_merge_document_rejects_malformed_remote() {
        let result = merge_document(VOCABULARY_FILE, b"[]", b"{oops");
        assert!(matches!(result, Err(SyncError::Serialization { .. })));
    }
}
