//! StateStore: redb-backed persistence for endpoints and their health checks.
//!
//! Endpoints are stored as their JSON document shape (see
//! [`uptrack_core::EndpointDocument`]). The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};
use uptrack_core::{Endpoint, EndpointId, EndpointUpdated, MAX_DAILY_STATUSES};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Health checks older than this (relative to the newest one recorded for
/// the same endpoint) are pruned, matching the endpoint's own history.
pub const HEALTH_CHECK_RETENTION_DAYS: i64 = MAX_DAILY_STATUSES as i64;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Pause between attempts while waiting for the database lock.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Thread-safe state store backed by redb.
///
/// redb takes an exclusive file lock for as long as a `Database` is open,
/// so a store shared between processes must be opened only for the work at
/// hand and dropped (with all its clones) afterwards.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// Fails with [`StateError::Locked`] if another handle has it open.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Locked(path.to_path_buf()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Like [`StateStore::open`], but retries for up to `wait` while the
    /// database is locked by someone else. Blocks the calling thread.
    pub fn open_waiting(path: &Path, wait: Duration) -> StateResult<Self> {
        let deadline = Instant::now() + wait;
        loop {
            match Self::open(path) {
                Err(StateError::Locked(_)) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                result => return result,
            }
        }
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        txn.open_table(HEALTH_CHECKS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Endpoints ──────────────────────────────────────────────────

    /// Insert or replace an endpoint.
    pub fn save_endpoint(&self, endpoint: &Endpoint) -> StateResult<()> {
        let key = endpoint.id().as_str();
        let value = serde_json::to_vec(endpoint).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(endpoint_id = %key, "endpoint stored");
        Ok(())
    }

    /// Load an endpoint by id.
    pub fn find_endpoint(&self, id: &EndpointId) -> StateResult<Option<Endpoint>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        match table.get(id.as_str()).map_err(map_err!(Read))? {
            Some(guard) => decode(id.as_str(), guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored endpoint, ordered by id.
    ///
    /// Documents that no longer decode are logged and left out, so one bad
    /// record does not hide the rest; [`StateStore::find_endpoint`] still
    /// reports them.
    pub fn list_endpoints(&self) -> StateResult<Vec<Endpoint>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            match decode(key.value(), value.value()) {
                Ok(endpoint) => results.push(endpoint),
                Err(e) => warn!(error = %e, "skipping undecodable endpoint"),
            }
        }
        Ok(results)
    }

    /// Delete an endpoint and its health-check log. Returns true if it existed.
    pub fn delete_endpoint(&self, id: &EndpointId) -> StateResult<bool> {
        let (lo, hi) = check_range(id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let checks_removed;
        {
            let mut endpoints = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
            existed = endpoints
                .remove(id.as_str())
                .map_err(map_err!(Write))?
                .is_some();

            let mut checks = txn.open_table(HEALTH_CHECKS).map_err(map_err!(Table))?;
            let keys: Vec<String> = checks
                .range(lo.as_str()..hi.as_str())
                .map_err(map_err!(Read))?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<_, _>>()
                .map_err(map_err!(Read))?;
            for key in &keys {
                checks.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            checks_removed = keys.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(endpoint_id = %id, existed, checks_removed, "endpoint deleted");
        Ok(existed)
    }

    // ── Health-check log ───────────────────────────────────────────

    /// Append one processed health check to the endpoint's log.
    ///
    /// Checks landing in the same millisecond are kept; the later one
    /// takes the next free key. In the same transaction, checks of this
    /// endpoint older than [`HEALTH_CHECK_RETENTION_DAYS`] before this one
    /// are removed.
    pub fn record_health_check(&self, check: &EndpointUpdated) -> StateResult<()> {
        let value = serde_json::to_vec(check).map_err(map_err!(Serialize))?;
        let millis = check.timestamp.timestamp_millis();
        let (lo, _) = check_range(&check.endpoint_id);
        let cutoff = check_key(
            &check.endpoint_id,
            millis.saturating_sub(HEALTH_CHECK_RETENTION_DAYS * MILLIS_PER_DAY),
        );

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let pruned;
        {
            let mut table = txn.open_table(HEALTH_CHECKS).map_err(map_err!(Table))?;

            let expired: Vec<String> = table
                .range(lo.as_str()..cutoff.as_str())
                .map_err(map_err!(Read))?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<_, _>>()
                .map_err(map_err!(Read))?;
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            pruned = expired.len();

            let mut slot = millis;
            let mut key = check_key(&check.endpoint_id, slot);
            while table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                slot = slot.saturating_add(1);
                key = check_key(&check.endpoint_id, slot);
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if pruned > 0 {
            debug!(endpoint_id = %check.endpoint_id, pruned, "expired health checks removed");
        }
        Ok(())
    }

    /// Most recent health checks for an endpoint, newest first.
    pub fn list_health_checks(
        &self,
        id: &EndpointId,
        limit: usize,
    ) -> StateResult<Vec<EndpointUpdated>> {
        let (lo, hi) = check_range(id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HEALTH_CHECKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let check: EndpointUpdated =
                serde_json::from_slice(value.value()).map_err(|e| StateError::Deserialize {
                    key: key.value().to_string(),
                    reason: e.to_string(),
                })?;
            results.push(check);
        }
        Ok(results)
    }
}

fn decode(key: &str, bytes: &[u8]) -> StateResult<Endpoint> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Deserialize {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Zero-padded so lexicographic order matches chronological order for
/// timestamps after the epoch.
fn check_key(id: &EndpointId, timestamp_millis: i64) -> String {
    format!("{id}:{:020}", timestamp_millis.max(0))
}

/// Half-open key range covering every check of `id` (`;` sorts right after `:`).
fn check_range(id: &EndpointId) -> (String, String) {
    (format!("{id}:"), format!("{id};"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uptrack_core::Observation;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn test_endpoint(name: &str) -> Endpoint {
        Endpoint::create_at("owner-1", format!("{name}.example.com"), name, t0()).unwrap()
    }

    fn check(endpoint: &Endpoint, minute: i64, ok: bool) -> EndpointUpdated {
        let at = t0() + Duration::minutes(minute);
        let obs = if ok {
            Observation::success(at, 20.0)
        } else {
            Observation::failure(at)
        };
        EndpointUpdated::new(endpoint, &obs)
    }

    // ── Endpoint CRUD ──────────────────────────────────────────────

    #[test]
    fn endpoint_save_and_find() {
        let store = StateStore::open_in_memory().unwrap();
        let ep = test_endpoint("api");

        store.save_endpoint(&ep).unwrap();
        let found = store.find_endpoint(ep.id()).unwrap();

        assert_eq!(found, Some(ep));
    }

    #[test]
    fn endpoint_find_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        let id = EndpointId::generate();
        assert!(store.find_endpoint(&id).unwrap().is_none());
    }

    #[test]
    fn endpoint_list_all() {
        let store = StateStore::open_in_memory().unwrap();
        for name in ["a", "b", "c"] {
            store.save_endpoint(&test_endpoint(name)).unwrap();
        }
        assert_eq!(store.list_endpoints().unwrap().len(), 3);
    }

    #[test]
    fn endpoint_save_after_mutation_is_visible() {
        let store = StateStore::open_in_memory().unwrap();
        let mut ep = test_endpoint("api");
        store.save_endpoint(&ep).unwrap();

        ep.apply_observation_at(&Observation::failure(t0()), t0()).unwrap();
        ep.apply_observation_at(&Observation::failure(t0() + Duration::minutes(1)), t0())
            .unwrap();
        store.save_endpoint(&ep).unwrap();

        let found = store.find_endpoint(ep.id()).unwrap().unwrap();
        assert_eq!(found.cumulative_downtime_minutes(), 1);
        assert_eq!(found.outage_started_at(), Some(t0()));
        assert_eq!(found, ep);
        assert_eq!(store.list_endpoints().unwrap().len(), 1);
    }

    #[test]
    fn endpoint_delete_drops_health_checks() {
        let store = StateStore::open_in_memory().unwrap();
        let ep = test_endpoint("api");
        let other = test_endpoint("other");
        store.save_endpoint(&ep).unwrap();
        store.save_endpoint(&other).unwrap();
        store.record_health_check(&check(&ep, 0, true)).unwrap();
        store.record_health_check(&check(&ep, 1, false)).unwrap();
        store.record_health_check(&check(&other, 0, true)).unwrap();

        assert!(store.delete_endpoint(ep.id()).unwrap());
        assert!(!store.delete_endpoint(ep.id()).unwrap());
        assert!(store.find_endpoint(ep.id()).unwrap().is_none());
        assert!(store.list_health_checks(ep.id(), 10).unwrap().is_empty());
        // Other endpoint untouched.
        assert_eq!(store.list_health_checks(other.id(), 10).unwrap().len(), 1);
    }

    // ── Health-check log ───────────────────────────────────────────

    #[test]
    fn health_checks_newest_first_with_limit() {
        let store = StateStore::open_in_memory().unwrap();
        let ep = test_endpoint("api");
        for minute in 0..5 {
            store
                .record_health_check(&check(&ep, minute, minute % 2 == 0))
                .unwrap();
        }

        let all = store.list_health_checks(ep.id(), 10).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].timestamp, t0() + Duration::minutes(4));
        assert_eq!(all[4].timestamp, t0());
        assert!(all.windows(2).all(|w| w[0].timestamp > w[1].timestamp));

        let limited = store.list_health_checks(ep.id(), 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].timestamp, t0() + Duration::minutes(3));
    }

    #[test]
    fn health_checks_in_the_same_millisecond_are_both_kept() {
        let store = StateStore::open_in_memory().unwrap();
        let ep = test_endpoint("api");
        store.record_health_check(&check(&ep, 0, true)).unwrap();
        store.record_health_check(&check(&ep, 0, false)).unwrap();

        let all = store.list_health_checks(ep.id(), 10).unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].succeeded);
        assert!(all[1].succeeded);
    }

    #[test]
    fn health_checks_past_retention_are_pruned() {
        let store = StateStore::open_in_memory().unwrap();
        let ep = test_endpoint("api");
        let other = test_endpoint("other");
        let day = 24 * 60;

        store.record_health_check(&check(&ep, 0, true)).unwrap();
        store.record_health_check(&check(&ep, day, true)).unwrap();
        store.record_health_check(&check(&other, 0, true)).unwrap();

        // 90 days after the first check: nothing is older than the window yet.
        store.record_health_check(&check(&ep, 90 * day, false)).unwrap();
        assert_eq!(store.list_health_checks(ep.id(), 10).unwrap().len(), 3);

        // One more day drops the first check only.
        store.record_health_check(&check(&ep, 91 * day, false)).unwrap();
        let kept = store.list_health_checks(ep.id(), 10).unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[2].timestamp, t0() + Duration::minutes(day));

        // Other endpoints keep their own log.
        assert_eq!(store.list_health_checks(other.id(), 10).unwrap().len(), 1);
    }

    #[test]
    fn check_keys_sort_chronologically() {
        let id = EndpointId::parse("ep").unwrap();
        assert!(check_key(&id, 999) < check_key(&id, 1_000));
        assert_eq!(check_key(&id, 5), "ep:00000000000000000005");
        let (lo, hi) = check_range(&id);
        assert!(lo.as_str() < check_key(&id, 0).as_str());
        assert!(check_key(&id, i64::MAX).as_str() < hi.as_str());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let mut ep = test_endpoint("api");
        ep.apply_observation_at(&Observation::success(t0(), 42.0), t0())
            .unwrap();

        {
            let store = StateStore::open(&db_path).unwrap();
            store.save_endpoint(&ep).unwrap();
            store.record_health_check(&check(&ep, 0, true)).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let found = store.find_endpoint(ep.id()).unwrap().unwrap();
        assert_eq!(found, ep);
        assert_eq!(found.current_status().unwrap().average_response_time_ms(), 42.0);
        assert_eq!(store.list_health_checks(ep.id(), 10).unwrap().len(), 1);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();
        let id = EndpointId::generate();

        assert!(store.list_endpoints().unwrap().is_empty());
        assert!(store.list_health_checks(&id, 10).unwrap().is_empty());
        assert!(!store.delete_endpoint(&id).unwrap());
    }

    #[test]
    fn corrupt_document_is_reported_by_find_and_skipped_by_list() {
        let store = StateStore::open_in_memory().unwrap();
        let good = test_endpoint("good");
        store.save_endpoint(&good).unwrap();

        let txn = store.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(ENDPOINTS).unwrap();
            table.insert("broken", b"{not json".as_slice()).unwrap();
        }
        txn.commit().unwrap();

        let listed = store.list_endpoints().unwrap();
        assert_eq!(listed, vec![good]);

        let id = EndpointId::parse("broken").unwrap();
        match store.find_endpoint(&id) {
            Err(StateError::Deserialize { key, .. }) => assert_eq!(key, "broken"),
            other => panic!("expected deserialize error, got {other:?}"),
        }
    }

    // ── Locking ────────────────────────────────────────────────────

    #[test]
    fn second_open_reports_lock_until_first_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let first = StateStore::open(&db_path).unwrap();
        let held = first.clone();
        match StateStore::open(&db_path) {
            Err(StateError::Locked(path)) => assert_eq!(path, db_path),
            other => panic!("expected lock error, got {:?}", other.err()),
        }
        assert!(matches!(
            StateStore::open_waiting(&db_path, std::time::Duration::from_millis(50)),
            Err(StateError::Locked(_))
        ));

        drop(first);
        drop(held);
        StateStore::open(&db_path).unwrap();
    }

    #[test]
    fn open_waiting_succeeds_once_lock_is_released() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let ep = test_endpoint("api");

        let holder = StateStore::open(&db_path).unwrap();
        holder.save_endpoint(&ep).unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            drop(holder);
        });

        let store = StateStore::open_waiting(&db_path, std::time::Duration::from_secs(5)).unwrap();
        releaser.join().unwrap();
        assert_eq!(store.find_endpoint(ep.id()).unwrap(), Some(ep));
    }
}
