use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitewatch_core::AppStatus;

pub const SYNC_PATH: &str = "/sync";

/// One application as served by `/sync`: the status itself plus the
/// bookkeeping the responder keeps for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    #[serde(flatten)]
    pub app: AppStatus,
    #[serde(rename = "lastSynced")]
    pub last_synced: DateTime<Utc>,
    #[serde(rename = "lastSuccess", default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(rename = "syncEnabled", default)]
    pub sync_enabled: bool,
}

/// Body of a successful `/sync` response, keyed by `origin/source/name`.
pub type SyncResponse = BTreeMap<String, SyncEntry>;

/// Builds the wire map from entries, keying each by its composite identity.
pub fn build_response(entries: impl IntoIterator<Item = SyncEntry>) -> SyncResponse {
    entries
        .into_iter()
        .map(|entry| (entry.app.key().to_string(), entry))
        .collect()
}

/// Joins `base` and the sync path without doubling slashes.
pub fn sync_url(base: &str) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    url.push_str(SYNC_PATH);
    url
}
