//! Read operations over the status cache, filtered to what a caller may see.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sitewatch_core::{AppStatus, Labels, Location, Status};

use crate::error::AccessError;
use crate::permissions::{LabelSets, UserPermissions};

/// Optional narrowing of an app listing. All label filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppQuery {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub labels: Labels,
}

impl AppQuery {
    /// Builds a query from raw parameters: `status` and repeated `key:value`
    /// label filters.
    pub fn parse<S: AsRef<str>>(status: Option<&str>, labels: &[S]) -> Result<Self, AccessError> {
        let status = match status.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                Some(Status::parse(raw).ok_or_else(|| AccessError::InvalidStatus(raw.to_string()))?)
            }
            None => None,
        };

        let mut parsed = Labels::new();
        for raw in labels {
            let raw = raw.as_ref();
            let (key, value) = raw
                .split_once(':')
                .filter(|(key, value)| !key.trim().is_empty() && !value.trim().is_empty())
                .ok_or_else(|| AccessError::InvalidLabel(raw.to_string()))?;
            parsed.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self {
            status,
            labels: parsed,
        })
    }

    pub fn matches(&self, app: &AppStatus) -> bool {
        self.status.map_or(true, |status| app.status == status)
            && self
                .labels
                .iter()
                .all(|(key, value)| app.labels.get(key) == Some(value))
    }
}

/// Apps the caller may see that also satisfy `query`.
pub fn filtered_apps(apps: &[AppStatus], perms: &UserPermissions, query: &AppQuery) -> Vec<AppStatus> {
    apps.iter()
        .filter(|app| perms.can_access_app(&app.labels) && query.matches(app))
        .cloned()
        .collect()
}

/// Locations hosting at least one visible app. Admins see every location,
/// occupied or not.
pub fn filtered_locations(
    locations: &[Location],
    apps: &[AppStatus],
    perms: &UserPermissions,
) -> Vec<Location> {
    if perms.is_admin {
        return locations.to_vec();
    }
    let occupied: BTreeSet<&str> = apps
        .iter()
        .filter(|app| perms.can_access_app(&app.labels))
        .map(|app| app.location.as_str())
        .collect();
    locations
        .iter()
        .filter(|location| occupied.contains(location.name.as_str()))
        .cloned()
        .collect()
}

/// Label keys and values present on apps, narrowed to the granted pairs.
pub fn filtered_labels(apps: &[AppStatus], perms: &UserPermissions) -> LabelSets {
    let mut all = LabelSets::new();
    for app in apps {
        for (key, value) in &app.labels {
            all.entry(key.clone()).or_default().insert(value.clone());
        }
    }
    perms.filter_labels(&all)
}
