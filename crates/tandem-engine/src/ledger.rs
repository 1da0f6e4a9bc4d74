//! Call ledger
//!
//! The table of live calls, indexed two ways: by call-id and by the DID
//! the call holds. Both indices live behind one lock and every mutation
//! touches them together, so a reader of either side always sees a
//! consistent pairing.

use chrono::Duration as ChronoDuration;
use chrono::Utc;
use std::collections::HashMap;
use tandem_core::{models::CallRecord, AppError, AppResult};
use tokio::sync::Mutex;

#[derive(Default)]
struct Indexes {
    by_call_id: HashMap<String, CallRecord>,
    did_to_call: HashMap<String, String>,
}

/// In-memory index of currently live calls
#[derive(Default)]
pub struct CallLedger {
    inner: Mutex<Indexes>,
}

impl CallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record under both indices
    ///
    /// Fails if the call-id is already present.
    pub async fn insert(&self, record: CallRecord) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.by_call_id.contains_key(&record.call_id) {
            return Err(AppError::AlreadyExists(record.call_id.clone()));
        }
        inner
            .did_to_call
            .insert(record.assigned_did.clone(), record.call_id.clone());
        inner.by_call_id.insert(record.call_id.clone(), record);
        Ok(())
    }

    /// Look up a live call by call-id
    pub async fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.inner.lock().await.by_call_id.get(call_id).cloned()
    }

    /// Look up a live call by the DID it holds
    pub async fn get_by_did(&self, did: &str) -> Option<CallRecord> {
        let inner = self.inner.lock().await;
        let call_id = inner.did_to_call.get(did)?;
        inner.by_call_id.get(call_id).cloned()
    }

    /// Fallback lookup by the original identity pair, used when the
    /// call-id was lost across a provider
    pub async fn find_by_ani_dnis(&self, ani: &str, dnis: &str) -> Option<CallRecord> {
        self.inner
            .lock()
            .await
            .by_call_id
            .values()
            .find(|r| r.original_ani == ani && r.original_dnis == dnis)
            .cloned()
    }

    /// Apply a mutation to a live record and return the updated copy
    pub async fn update<F>(&self, call_id: &str, mutate: F) -> AppResult<CallRecord>
    where
        F: FnOnce(&mut CallRecord),
    {
        let mut inner = self.inner.lock().await;
        let record = inner
            .by_call_id
            .get_mut(call_id)
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;
        mutate(record);
        Ok(record.clone())
    }

    /// Remove a record from both indices, returning it
    pub async fn remove(&self, call_id: &str) -> Option<CallRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.by_call_id.remove(call_id)?;
        inner.did_to_call.remove(&record.assigned_did);
        Some(record)
    }

    /// Number of live calls
    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_call_id.len()
    }

    /// Whether the ledger holds no live calls
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of all live records
    pub async fn records(&self) -> Vec<CallRecord> {
        self.inner.lock().await.by_call_id.values().cloned().collect()
    }

    /// Call-ids of records older than `max_age`
    pub async fn stale_call_ids(&self, max_age: ChronoDuration) -> Vec<String> {
        let now = Utc::now();
        self.inner
            .lock()
            .await
            .by_call_id
            .values()
            .filter(|r| now - r.start_time > max_age)
            .map(|r| r.call_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::models::{CallStatus, CallStep};

    fn record(call_id: &str, did: &str) -> CallRecord {
        CallRecord {
            call_id: call_id.to_string(),
            original_ani: "15550000001".to_string(),
            original_dnis: "15550000002".to_string(),
            transformed_ani: "15550000002".to_string(),
            assigned_did: did.to_string(),
            inbound_peer: "s1".to_string(),
            intermediate_peer: "s3a".to_string(),
            final_peer: "s4".to_string(),
            status: CallStatus::Active,
            current_step: CallStep::S1ToS2,
            start_time: Utc::now(),
            end_time: None,
            duration_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_both_indices_agree() {
        let ledger = CallLedger::new();
        ledger.insert(record("c1", "18005550001")).await.unwrap();

        let by_id = ledger.get("c1").await.unwrap();
        let by_did = ledger.get_by_did("18005550001").await.unwrap();
        assert_eq!(by_id.call_id, by_did.call_id);
        assert_eq!(by_id.assigned_did, by_did.assigned_did);
    }

    #[tokio::test]
    async fn test_duplicate_call_id_is_rejected() {
        let ledger = CallLedger::new();
        ledger.insert(record("c1", "18005550001")).await.unwrap();

        let err = ledger.insert(record("c1", "18005550002")).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
        // The losing insert must not have clobbered the DID index
        assert!(ledger.get_by_did("18005550002").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_clears_both_indices() {
        let ledger = CallLedger::new();
        ledger.insert(record("c1", "18005550001")).await.unwrap();

        let removed = ledger.remove("c1").await.unwrap();
        assert_eq!(removed.call_id, "c1");
        assert!(ledger.get("c1").await.is_none());
        assert!(ledger.get_by_did("18005550001").await.is_none());
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_by_ani_dnis() {
        let ledger = CallLedger::new();
        ledger.insert(record("c1", "18005550001")).await.unwrap();

        let found = ledger
            .find_by_ani_dnis("15550000001", "15550000002")
            .await
            .unwrap();
        assert_eq!(found.call_id, "c1");

        assert!(ledger
            .find_by_ani_dnis("15550000001", "19990000000")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_detection() {
        let ledger = CallLedger::new();
        let mut old = record("old", "18005550001");
        old.start_time = Utc::now() - ChronoDuration::minutes(45);
        ledger.insert(old).await.unwrap();
        ledger.insert(record("fresh", "18005550002")).await.unwrap();

        let stale = ledger.stale_call_ids(ChronoDuration::minutes(30)).await;
        assert_eq!(stale, vec!["old".to_string()]);
    }
}
