//! Snapshot memoization and the refresh cycle.
//!
//! Snapshots are keyed by a content fingerprint of the five source sheets plus
//! an epoch counter. Bumping the epoch (an explicit user refresh) orphans every
//! existing entry; entries also expire after the configured time-to-live.

use crate::error::Result;
use crate::ingestion::{RawTable, SourceTables};
use crate::schema::PlanningConfig;
use crate::{build_snapshot, DashboardSnapshot};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

const UNIT_SEPARATOR: [u8; 1] = [0x1f];
const RECORD_SEPARATOR: [u8; 1] = [0x1e];

fn hash_table(hasher: &mut Sha256, table: &RawTable) {
    hasher.update(table.name.as_bytes());
    hasher.update(RECORD_SEPARATOR);
    for header in &table.headers {
        hasher.update(header.as_bytes());
        hasher.update(UNIT_SEPARATOR);
    }
    for row in &table.rows {
        hasher.update(RECORD_SEPARATOR);
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update(UNIT_SEPARATOR);
        }
    }
    hasher.update(RECORD_SEPARATOR);
}

/// SHA-256 over every sheet's name, headers and cells, hex encoded.
pub fn fingerprint(tables: &SourceTables) -> String {
    let mut hasher = Sha256::new();
    for table in tables.all() {
        hash_table(&mut hasher, table);
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: String,
    pub epoch: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: Arc<V>,
    computed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SnapshotCache<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    epoch: u64,
    ttl: Duration,
}

impl<V> SnapshotCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            epoch: 0,
            ttl,
        }
    }

    pub fn from_config(config: &PlanningConfig) -> Result<Self> {
        Ok(Self::new(config.cache_ttl()?))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn key_for(&self, tables: &SourceTables) -> CacheKey {
        CacheKey {
            fingerprint: fingerprint(tables),
            epoch: self.epoch,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now - entry.computed_at < self.ttl
    }

    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| Arc::clone(&entry.value))
    }

    pub fn insert(&mut self, key: CacheKey, value: V, now: DateTime<Utc>) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                computed_at: now,
            },
        );
        value
    }

    /// Returns the cached value for `key`, computing and storing it when absent
    /// or expired. A failed computation leaves the cache untouched.
    pub fn get_or_try_insert_with<F>(
        &mut self,
        key: CacheKey,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(hit) = self.get(&key, now) {
            debug!(
                "Cache hit for {} (epoch {})",
                key.fingerprint.get(..12).unwrap_or(&key.fingerprint),
                key.epoch
            );
            return Ok(hit);
        }

        let value = compute()?;
        self.purge_expired(now);
        Ok(self.insert(key, value, now))
    }

    /// Drops every entry and moves to a new epoch.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.entries.clear();
        debug!("Cache invalidated; epoch is now {}", self.epoch);
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.computed_at < ttl);
    }
}

/// When the current snapshot's sheets were loaded, and under which epoch.
#[derive(Debug, Clone, Copy)]
struct LoadStamp {
    loaded_at: DateTime<Utc>,
    epoch: u64,
}

/// Owns the configuration, the snapshot cache and the last good snapshot.
pub struct DemandPlanner {
    config: PlanningConfig,
    cache: SnapshotCache<DashboardSnapshot>,
    current: Option<Arc<DashboardSnapshot>>,
    loaded: Option<LoadStamp>,
    last_error: Option<String>,
}

impl DemandPlanner {
    pub fn new(config: PlanningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: SnapshotCache::from_config(&config)?,
            config,
            current: None,
            loaded: None,
            last_error: None,
        })
    }

    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    /// The last snapshot that built successfully.
    pub fn snapshot(&self) -> Option<&DashboardSnapshot> {
        self.current.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn refresh_with<F>(&mut self, loader: F) -> Result<Arc<DashboardSnapshot>>
    where
        F: FnOnce() -> Result<SourceTables>,
    {
        self.refresh_with_at(loader, Utc::now())
    }

    /// Returns the current snapshot while its load is younger than the TTL and
    /// the epoch is unchanged. Otherwise calls `loader` and rebuilds the snapshot
    /// unless an identical, fresh one is cached. On failure the previous snapshot
    /// stays current.
    pub fn refresh_with_at<F>(
        &mut self,
        loader: F,
        now: DateTime<Utc>,
    ) -> Result<Arc<DashboardSnapshot>>
    where
        F: FnOnce() -> Result<SourceTables>,
    {
        if let Some(current) = self.fresh_snapshot(now) {
            debug!("Sheets loaded within TTL; skipping reload");
            return Ok(current);
        }

        let outcome = loader().and_then(|tables| {
            let key = self.cache.key_for(&tables);
            let config = &self.config;
            self.cache
                .get_or_try_insert_with(key, now, || build_snapshot(&tables, config))
        });

        match outcome {
            Ok(snapshot) => {
                self.current = Some(Arc::clone(&snapshot));
                self.loaded = Some(LoadStamp {
                    loaded_at: now,
                    epoch: self.cache.epoch(),
                });
                self.last_error = None;
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    "Refresh failed, keeping previous snapshot ({}): {}",
                    if self.current.is_some() { "available" } else { "none" },
                    e
                );
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn fresh_snapshot(&self, now: DateTime<Utc>) -> Option<Arc<DashboardSnapshot>> {
        let stamp = self.loaded?;
        if stamp.epoch != self.cache.epoch() || now - stamp.loaded_at >= self.cache.ttl() {
            return None;
        }
        self.current.as_ref().map(Arc::clone)
    }

    /// Forces the next refresh to reload and recompute even for unchanged sheets.
    pub fn force_refresh(&mut self) {
        info!("Forced refresh requested");
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanningError;
    use std::cell::Cell;

    fn tables(po_qty: u32) -> SourceTables {
        SourceTables {
            product: RawTable::from_csv_str("Product_Master", "SKU_ID,Status\nA1,Active\n").unwrap(),
            forecast: RawTable::from_csv_str("Rofo", "SKU_ID,Jan-25\nA1,100\n").unwrap(),
            purchase_orders: RawTable::from_csv_str("PO", &format!("SKU_ID,Jan-25\nA1,{}\n", po_qty))
                .unwrap(),
            ..SourceTables::default()
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600 + seconds, 0).unwrap()
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        assert_eq!(fingerprint(&tables(90)), fingerprint(&tables(90)));
        assert_ne!(fingerprint(&tables(90)), fingerprint(&tables(91)));
        assert_eq!(fingerprint(&tables(90)).len(), 64);
    }

    #[test]
    fn test_cell_boundaries_change_fingerprint() {
        let a = SourceTables {
            sales: RawTable::new("Sales", ["SKU_ID"], vec![vec!["ab".to_string(), "c".to_string()]]),
            ..SourceTables::default()
        };
        let b = SourceTables {
            sales: RawTable::new("Sales", ["SKU_ID"], vec![vec!["a".to_string(), "bc".to_string()]]),
            ..SourceTables::default()
        };
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_cache_hits_expires_and_invalidates() {
        let mut cache: SnapshotCache<u32> = SnapshotCache::new(Duration::seconds(300));
        let key = cache.key_for(&tables(90));
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(7)
        };

        assert_eq!(*cache.get_or_try_insert_with(key.clone(), at(0), compute).unwrap(), 7);
        assert_eq!(*cache.get_or_try_insert_with(key.clone(), at(299), compute).unwrap(), 7);
        assert_eq!(calls.get(), 1);

        cache.get_or_try_insert_with(key.clone(), at(300), compute).unwrap();
        assert_eq!(calls.get(), 2);

        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(cache.epoch(), 1);
        let new_key = cache.key_for(&tables(90));
        assert_ne!(new_key, key);
        cache.get_or_try_insert_with(new_key, at(301), compute).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let mut cache: SnapshotCache<u32> = SnapshotCache::new(Duration::seconds(300));
        let key = cache.key_for(&tables(90));
        let result = cache.get_or_try_insert_with(key, at(0), || {
            Err(PlanningError::SourceUnavailable("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_planner_keeps_previous_snapshot_on_failure() {
        let mut planner = DemandPlanner::new(PlanningConfig::default()).unwrap();
        assert!(planner.snapshot().is_none());

        let first = planner.refresh_with_at(|| Ok(tables(90)), at(0)).unwrap();
        assert_eq!(first.latest_accuracy(), Some(90.0));

        let failed = planner.refresh_with_at(
            || Err(PlanningError::SourceUnavailable("worksheet 'PO' not found".to_string())),
            at(400),
        );
        assert!(matches!(failed, Err(PlanningError::SourceUnavailable(_))));
        assert_eq!(planner.snapshot().unwrap().latest_accuracy(), Some(90.0));
        assert!(planner.last_error().unwrap().contains("PO"));

        let second = planner.refresh_with_at(|| Ok(tables(80)), at(410)).unwrap();
        assert_eq!(second.latest_accuracy(), Some(80.0));
        assert!(planner.last_error().is_none());
    }

    #[test]
    fn test_loader_runs_once_per_ttl_window() {
        let mut planner = DemandPlanner::new(PlanningConfig::default()).unwrap();
        let loads = Cell::new(0);
        let loader = || {
            loads.set(loads.get() + 1);
            Ok(tables(90))
        };

        let first = planner.refresh_with_at(loader, at(0)).unwrap();
        let second = planner.refresh_with_at(loader, at(5)).unwrap();
        planner.refresh_with_at(loader, at(299)).unwrap();
        assert_eq!(loads.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        planner.refresh_with_at(loader, at(300)).unwrap();
        assert_eq!(loads.get(), 2);

        planner.force_refresh();
        planner.refresh_with_at(loader, at(301)).unwrap();
        assert_eq!(loads.get(), 3);
    }

    #[test]
    fn test_short_fingerprint_key_is_served() {
        let mut cache: SnapshotCache<u32> = SnapshotCache::new(Duration::seconds(300));
        let short = CacheKey {
            fingerprint: "abc".to_string(),
            epoch: 0,
        };
        cache.insert(short.clone(), 1, at(0));
        let hit = cache.get_or_try_insert_with(short, at(1), || Ok(2)).unwrap();
        assert_eq!(*hit, 1);
    }

    #[test]
    fn test_out_of_range_ttl_is_rejected() {
        let config = PlanningConfig {
            cache_ttl_seconds: i64::MAX,
            ..PlanningConfig::default()
        };
        assert!(matches!(
            DemandPlanner::new(config),
            Err(PlanningError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_force_refresh_recomputes() {
        let mut planner = DemandPlanner::new(PlanningConfig::default()).unwrap();
        let first = planner.refresh_with_at(|| Ok(tables(90)), at(0)).unwrap();
        planner.force_refresh();
        let second = planner.refresh_with_at(|| Ok(tables(90)), at(1)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }
}
