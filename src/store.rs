use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::Error;

/// Identifier of a committed revision; monotonically increasing per
/// parameter, starting at 1.
pub type RevisionId = u64;

/// The persisted portion of a parameter: the rule dicts of its latest
/// committed revision plus the schema version they were written at.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSnapshot {
    /// Dict representations of the parameter's rules.
    pub rules: Vec<Value>,
    /// The schema version the rule dicts were committed at.
    pub rule_schema_version: u32,
}

/// ParameterStore is the interface to the durable versioned backend that
/// holds committed rule sets.
///
/// The store owns commit serialization: two concurrent updates to the same
/// parameter race at this layer, and the loser surfaces as
/// [Error::Conflict]. The registry never retries; the caller may.
pub trait ParameterStore: Send + Sync {
    /// Loads the latest committed revision for `name`, or None if nothing
    /// has ever been committed under that name.
    fn load_latest(&self, name: &str) -> Result<Option<ParameterSnapshot>, Error>;

    /// Commits a new revision tagged with the committer and message,
    /// returning its id. Rejects stale or conflicting commits.
    fn commit(
        &self,
        name: &str,
        committer_id: &str,
        commit_message: &str,
        rules: Vec<Value>,
        rule_schema_version: u32,
    ) -> Result<RevisionId, Error>;
}

/// ParameterCache is the interface to the distributed cache used to memoize
/// parameter reads across processes. Entries are opaque bytes keyed by
/// [crate::PlatformParameter::cache_key].
pub trait ParameterCache: Send + Sync {
    /// Fetches a cached entry, or None on miss.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores an entry, replacing any previous value.
    fn set(&self, key: &str, bytes: Vec<u8>);

    /// Removes the given keys; missing keys are ignored.
    fn delete_many(&self, keys: &[String]);
}

/// One committed revision of a parameter's rule set, with its audit trail.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    /// The revision id; 1 for the first commit under a name.
    pub revision_id: RevisionId,
    /// Who committed the change.
    pub committer_id: String,
    /// Why the change was made.
    pub commit_message: String,
    /// When the revision was committed.
    pub committed_on: DateTime<Utc>,
    /// The rule dicts committed in this revision.
    pub rules: Vec<Value>,
    /// The schema version the rule dicts were written at.
    pub rule_schema_version: u32,
}

/// In-memory [ParameterStore] keeping the full revision history per
/// parameter. Commits are serialized by an internal lock, so this binding
/// never conflicts; it exists for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStore {
    revisions: RwLock<HashMap<String, Vec<Revision>>>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// The committed revisions for `name`, oldest first.
    pub fn revisions(&self, name: &str) -> Vec<Revision> {
        self.revisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl ParameterStore for InMemoryStore {
    fn load_latest(&self, name: &str) -> Result<Option<ParameterSnapshot>, Error> {
        let revisions = self
            .revisions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(revisions.get(name).and_then(|history| {
            history.last().map(|revision| ParameterSnapshot {
                rules: revision.rules.clone(),
                rule_schema_version: revision.rule_schema_version,
            })
        }))
    }

    fn commit(
        &self,
        name: &str,
        committer_id: &str,
        commit_message: &str,
        rules: Vec<Value>,
        rule_schema_version: u32,
    ) -> Result<RevisionId, Error> {
        let mut revisions = self
            .revisions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let history = revisions.entry(name.to_string()).or_default();
        let revision_id = history.len() as RevisionId + 1;
        history.push(Revision {
            revision_id,
            committer_id: committer_id.to_string(),
            commit_message: commit_message.to_string(),
            committed_on: Utc::now(),
            rules,
            rule_schema_version,
        });
        Ok(revision_id)
    }
}

/// In-memory [ParameterCache]; a locked byte map.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        InMemoryCache::default()
    }
}

impl ParameterCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, bytes: Vec<u8>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes);
    }

    fn delete_many(&self, keys: &[String]) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spectral::prelude::*;

    #[test]
    fn load_latest_returns_none_for_uncommitted_names() {
        let store = InMemoryStore::new();
        assert_that!(store.load_latest("promo_message").unwrap()).is_none();
    }

    #[test]
    fn commits_build_an_audit_trail() {
        let store = InMemoryStore::new();
        let first = store
            .commit("promo_message", "admin_1", "initial rules", vec![json!({})], 1)
            .unwrap();
        let second = store
            .commit(
                "promo_message",
                "admin_2",
                "tightened rollout",
                vec![json!({}), json!({})],
                1,
            )
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let history = store.revisions("promo_message");
        assert_that!(history).has_length(2);
        assert_eq!(history[0].committer_id, "admin_1");
        assert_eq!(history[0].commit_message, "initial rules");
        assert_eq!(history[1].committer_id, "admin_2");
        assert!(history[0].committed_on <= history[1].committed_on);
    }

    #[test]
    fn load_latest_sees_only_the_newest_revision() {
        let store = InMemoryStore::new();
        store
            .commit("promo_message", "admin", "v1", vec![json!({"v": 1})], 1)
            .unwrap();
        store
            .commit("promo_message", "admin", "v2", vec![json!({"v": 2})], 1)
            .unwrap();
        let snapshot = store.load_latest("promo_message").unwrap().unwrap();
        assert_eq!(snapshot.rules, vec![json!({"v": 2})]);
        assert_eq!(snapshot.rule_schema_version, 1);
    }

    #[test]
    fn revisions_are_isolated_per_name() {
        let store = InMemoryStore::new();
        store.commit("a", "admin", "m", vec![], 1).unwrap();
        assert!(store.revisions("b").is_empty());
        assert_that!(store.load_latest("b").unwrap()).is_none();
    }

    #[test]
    fn cache_set_get_delete() {
        let cache = InMemoryCache::new();
        assert_that!(cache.get("parameter:p")).is_none();

        cache.set("parameter:p", b"one".to_vec());
        cache.set("parameter:q", b"two".to_vec());
        assert_eq!(cache.get("parameter:p"), Some(b"one".to_vec()));

        cache.set("parameter:p", b"three".to_vec());
        assert_eq!(cache.get("parameter:p"), Some(b"three".to_vec()));

        cache.delete_many(&["parameter:p".to_string(), "parameter:missing".to_string()]);
        assert_that!(cache.get("parameter:p")).is_none();
        assert_eq!(cache.get("parameter:q"), Some(b"two".to_vec()));
    }
}
