use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sitewatch_core::Labels;
use tracing::debug;

/// Visible label values per label key.
pub type LabelSets = BTreeMap<String, BTreeSet<String>>;

/// What a caller may see, derived per request from their role names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserPermissions {
    pub is_admin: bool,
    pub allowed_labels: LabelSets,
}

impl UserPermissions {
    /// Sees everything.
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            allowed_labels: LabelSets::new(),
        }
    }

    /// Union of the grants of every named role. Unknown roles add nothing.
    pub fn from_roles<S: AsRef<str>>(roles: &BTreeMap<String, Labels>, role_names: &[S]) -> Self {
        let mut allowed_labels = LabelSets::new();
        for name in role_names {
            let name = name.as_ref();
            let Some(grants) = roles.get(name) else {
                debug!(role = %name, "ignoring unknown role");
                continue;
            };
            for (key, value) in grants {
                allowed_labels
                    .entry(key.clone())
                    .or_default()
                    .insert(value.clone());
            }
        }
        Self {
            is_admin: false,
            allowed_labels,
        }
    }

    pub fn can_access_label(&self, key: &str, value: &str) -> bool {
        self.is_admin
            || self
                .allowed_labels
                .get(key)
                .is_some_and(|values| values.contains(value))
    }

    /// Visible when any one of the app's labels is granted.
    pub fn can_access_app(&self, labels: &Labels) -> bool {
        self.is_admin
            || labels
                .iter()
                .any(|(key, value)| self.can_access_label(key, value))
    }

    /// Narrows `all` to the granted pairs, dropping keys left empty.
    pub fn filter_labels(&self, all: &LabelSets) -> LabelSets {
        all.iter()
            .filter_map(|(key, values)| {
                let visible: BTreeSet<String> = values
                    .iter()
                    .filter(|value| self.can_access_label(key, value))
                    .cloned()
                    .collect();
                (!visible.is_empty()).then(|| (key.clone(), visible))
            })
            .collect()
    }

    pub fn sees_nothing(&self) -> bool {
        !self.is_admin && self.allowed_labels.is_empty()
    }
}
