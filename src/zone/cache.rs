//! Zone-level cache in front of the key-value backend.
//!
//! Entries are immutable `Arc<CacheEntry>` values swapped wholesale on refresh,
//! so readers never see a partially loaded zone. Refreshes of the same zone are
//! serialized by a per-zone async mutex; whoever waited on the mutex takes the
//! outcome of the refresh that just finished, success or failure, instead of
//! fetching again.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::Zone;
use super::record::Location;
use crate::backend::{KeySchema, KeyValueGateway};
use crate::dns::name;
use crate::error::{DnsError, Result};

#[derive(Debug)]
pub struct CacheEntry {
    pub zone: Arc<Zone>,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// One refresh at a time per key. `completed` counts finished refreshes so a
/// caller that queued behind one can tell it ran and reuse its error.
#[derive(Default)]
struct RefreshSlot {
    completed: AtomicU64,
    last_error: Mutex<Option<DnsError>>,
}

impl RefreshSlot {
    fn generation(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    fn finish(&self, last_error: &mut Option<DnsError>, outcome: Option<DnsError>) {
        *last_error = outcome;
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

struct ZoneList {
    names: Arc<[String]>,
    fetched_at: Instant,
}

pub struct ZoneCache {
    gateway: Arc<dyn KeyValueGateway>,
    schema: KeySchema,
    ttl: Duration,
    zones: DashMap<String, Arc<CacheEntry>>,
    refreshes: DashMap<String, Arc<RefreshSlot>>,
    zone_list: RwLock<Option<ZoneList>>,
    zone_list_refresh: RefreshSlot,
}

impl ZoneCache {
    pub fn new(gateway: Arc<dyn KeyValueGateway>, schema: KeySchema, ttl: Duration) -> Self {
        Self {
            gateway,
            schema,
            ttl,
            zones: DashMap::new(),
            refreshes: DashMap::new(),
            zone_list: RwLock::new(None),
            zone_list_refresh: RefreshSlot::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the zone, fetching it when the cached copy is missing or stale.
    ///
    /// A failed fetch leaves any previous entry in place and returns the error,
    /// both to the caller that fetched and to every caller queued behind it.
    pub async fn load(&self, zone_name: &str) -> Result<Arc<Zone>> {
        let key = name::normalize(zone_name);
        if let Some(zone) = self.fresh_zone(&key) {
            trace!("Zone cache hit for {}", key);
            return Ok(zone);
        }

        let slot = self.refreshes.entry(key.clone()).or_default().clone();
        let seen = slot.generation();
        let mut last_error = slot.last_error.lock().await;

        // Someone else may have refreshed while we waited
        if let Some(zone) = self.fresh_zone(&key) {
            debug!("Reusing concurrent refresh of {}", key);
            return Ok(zone);
        }
        if slot.generation() != seen {
            if let Some(e) = last_error.as_ref() {
                debug!("Concurrent refresh of {} failed: {}", key, e);
                return Err(e.clone());
            }
        }

        let zone = match self.fetch_zone(&key).await {
            Ok(zone) => Arc::new(zone),
            Err(e) => {
                warn!("Failed to load zone {}: {}", key, e);
                slot.finish(&mut last_error, Some(e.clone()));
                return Err(e);
            }
        };
        info!(
            "Loaded zone {} ({} locations, {} records, serial {})",
            key,
            zone.location_count(),
            zone.record_count(),
            zone.serial()
        );

        self.zones.insert(
            key,
            Arc::new(CacheEntry {
                zone: zone.clone(),
                fetched_at: Instant::now(),
                ttl: self.ttl,
            }),
        );
        slot.finish(&mut last_error, None);
        Ok(zone)
    }

    /// Names of all zones present in the backend.
    ///
    /// When listing fails, the last successful listing is served if there is one.
    pub async fn zone_names(&self) -> Result<Arc<[String]>> {
        if let Some(names) = self.fresh_zone_list() {
            return Ok(names);
        }

        let slot = &self.zone_list_refresh;
        let seen = slot.generation();
        let mut last_error = slot.last_error.lock().await;
        if let Some(names) = self.fresh_zone_list() {
            return Ok(names);
        }
        if slot.generation() != seen {
            if let Some(e) = last_error.as_ref() {
                return self.stale_zone_list(e.clone());
            }
        }

        match self.fetch_zone_names().await {
            Ok(names) => {
                debug!("Found {} zones", names.len());
                *self.zone_list.write() = Some(ZoneList {
                    names: names.clone(),
                    fetched_at: Instant::now(),
                });
                slot.finish(&mut last_error, None);
                Ok(names)
            }
            Err(e) => {
                slot.finish(&mut last_error, Some(e.clone()));
                self.stale_zone_list(e)
            }
        }
    }

    fn stale_zone_list(&self, e: DnsError) -> Result<Arc<[String]>> {
        match self.zone_list.read().as_ref() {
            Some(stale) => {
                warn!("Failed to list zones, serving previous list: {}", e);
                Ok(stale.names.clone())
            }
            None => Err(e),
        }
    }

    /// Drop a cached zone so the next load goes to the backend
    pub fn invalidate(&self, zone_name: &str) {
        let key = name::normalize(zone_name);
        if self.zones.remove(&key).is_some() {
            debug!("Invalidated zone {}", key);
        }
    }

    /// Current entry for a zone, fresh or not
    pub fn cached(&self, zone_name: &str) -> Option<Arc<CacheEntry>> {
        self.zones
            .get(&name::normalize(zone_name))
            .map(|entry| entry.value().clone())
    }

    fn fresh_zone(&self, key: &str) -> Option<Arc<Zone>> {
        let entry = self.zones.get(key)?;
        entry
            .is_fresh(Instant::now())
            .then(|| entry.zone.clone())
    }

    fn fresh_zone_list(&self) -> Option<Arc<[String]>> {
        let list = self.zone_list.read();
        list.as_ref()
            .filter(|list| Instant::now().saturating_duration_since(list.fetched_at) < self.ttl)
            .map(|list| list.names.clone())
    }

    async fn fetch_zone(&self, zone_name: &str) -> Result<Zone> {
        let pattern = self.schema.zone_pattern(zone_name);
        let mut locations = Vec::new();
        let mut keys = Vec::new();
        for key in self.gateway.scan(&pattern).await? {
            match self.schema.parse_key(&key) {
                Some((location, zone)) if zone == zone_name => {
                    locations.push(location);
                    keys.push(key);
                }
                _ => trace!("Ignoring key {} while loading {}", key, zone_name),
            }
        }
        debug!("Zone {} has {} stored locations", zone_name, keys.len());

        let values = self.gateway.get_many(&keys).await?;
        let mut decoded = Vec::with_capacity(values.len());
        for ((location, key), value) in locations.into_iter().zip(&keys).zip(values) {
            let Some(json) = value else {
                debug!("Key {} disappeared during load", key);
                continue;
            };
            match Location::from_json(&location, zone_name, &json) {
                Ok(location) => decoded.push(location),
                Err(e) => warn!("Skipping location: {}", e),
            }
        }

        Zone::new(zone_name, decoded)
    }

    async fn fetch_zone_names(&self) -> Result<Arc<[String]>> {
        let keys = self.gateway.scan(&self.schema.all_keys_pattern()).await?;
        let names: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| self.schema.parse_key(key))
            .map(|(_, zone)| zone)
            .collect();
        Ok(names.into_iter().collect())
    }
}
