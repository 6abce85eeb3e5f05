use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sitewatch_core::{AppKey, AppStatus, Location};
use sitewatch_protocol::{SyncEntry, SyncResponse};
use tracing::warn;

/// Cached status of one application plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub app: AppStatus,
    pub last_synced: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    /// True for statuses this instance produced, false for federated ones.
    pub sync_enabled: bool,
}

impl From<CacheEntry> for SyncEntry {
    fn from(entry: CacheEntry) -> Self {
        SyncEntry {
            app: entry.app,
            last_synced: entry.last_synced,
            last_success: entry.last_success,
            sync_enabled: entry.sync_enabled,
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<AppKey, CacheEntry>,
    locations: BTreeMap<String, Location>,
}

impl CacheInner {
    fn entry_for(&self, app: AppStatus, now: DateTime<Utc>, local: bool) -> CacheEntry {
        let last_success = if app.is_up() {
            Some(now)
        } else {
            self.entries
                .get(&app.key())
                .and_then(|previous| previous.last_success)
        };
        CacheEntry {
            app,
            last_synced: now,
            last_success,
            sync_enabled: local,
        }
    }
}

/// Latest known status per `(origin, source, name)`, shared by the scrape
/// loops, the sync responder and the read API.
///
/// Writers replace whole batches under a single write lock, so readers
/// never observe half of a source's refresh.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<RwLock<CacheInner>>,
    local_origin: Arc<str>,
}

impl StatusCache {
    pub fn new(local_origin: &str, locations: Vec<Location>) -> Self {
        let cache = Self {
            inner: Arc::default(),
            local_origin: Arc::from(local_origin),
        };
        cache.add_locations(locations);
        cache
    }

    pub fn local_origin(&self) -> &str {
        &self.local_origin
    }

    /// Registers locations, ignoring invalid ones. Existing names are updated.
    pub fn add_locations(&self, locations: Vec<Location>) {
        let mut inner = self.inner.write();
        for location in locations {
            if let Err(err) = location.validate() {
                warn!(location = %location.name, error = %err, "ignoring invalid location");
                continue;
            }
            inner.locations.insert(location.name.clone(), location);
        }
    }

    /// Replaces every entry under `(origin, source)` with `apps`.
    /// Returns the number of entries stored.
    pub fn replace_source(&self, origin: &str, source: &str, apps: Vec<AppStatus>) -> usize {
        self.replace_where(apps, |key| key.belongs_to(origin, Some(source)))
    }

    /// Replaces every entry of `origin` with `apps`.
    pub fn replace_origin(&self, origin: &str, apps: Vec<AppStatus>) -> usize {
        self.replace_where(apps, |key| key.belongs_to(origin, None))
    }

    /// Upserts a single entry. Returns false when it was dropped.
    pub fn merge_entry(&self, app: AppStatus) -> bool {
        let now = Utc::now();
        let mut inner = self.inner.write();
        if !inner.locations.contains_key(&app.location) {
            drop(inner);
            warn_unknown_location(&app);
            return false;
        }
        let local = app.origin == *self.local_origin;
        let entry = inner.entry_for(app, now, local);
        inner.entries.insert(entry.app.key(), entry);
        true
    }

    fn replace_where<P>(&self, apps: Vec<AppStatus>, in_scope: P) -> usize
    where
        P: Fn(&AppKey) -> bool,
    {
        let now = Utc::now();
        let mut dropped = Vec::new();
        let stored = {
            let mut inner = self.inner.write();
            let mut fresh = HashMap::with_capacity(apps.len());
            for app in apps {
                let key = app.key();
                if !in_scope(&key) || !inner.locations.contains_key(&app.location) {
                    dropped.push(app);
                    continue;
                }
                let local = app.origin == *self.local_origin;
                fresh.insert(key, inner.entry_for(app, now, local));
            }
            inner.entries.retain(|key, _| !in_scope(key));
            let stored = fresh.len();
            inner.entries.extend(fresh);
            stored
        };

        for app in dropped {
            if in_scope(&app.key()) {
                warn_unknown_location(&app);
            } else {
                warn!(key = %app.key(), "dropping status outside the replaced scope");
            }
        }
        stored
    }

    pub fn get(&self, key: &AppKey) -> Option<CacheEntry> {
        self.inner.read().entries.get(key).cloned()
    }

    /// All entries, ordered by key.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        let inner = self.inner.read();
        let mut entries: Vec<_> = inner.entries.values().cloned().collect();
        drop(inner);
        entries.sort_by(|a, b| a.app.key().cmp(&b.app.key()));
        entries
    }

    pub fn apps(&self) -> Vec<AppStatus> {
        self.snapshot().into_iter().map(|entry| entry.app).collect()
    }

    pub fn locations(&self) -> Vec<Location> {
        self.inner.read().locations.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries per origin.
    pub fn origins(&self) -> BTreeMap<String, usize> {
        let inner = self.inner.read();
        let mut counts = BTreeMap::new();
        for key in inner.entries.keys() {
            *counts.entry(key.origin.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// The whole cache as served by `/sync`.
    pub fn sync_payload(&self) -> SyncResponse {
        sitewatch_protocol::sync::build_response(self.snapshot().into_iter().map(SyncEntry::from))
    }
}

fn warn_unknown_location(app: &AppStatus) {
    warn!(
        key = %app.key(),
        location = %app.location,
        "dropping status for unknown location"
    );
}
