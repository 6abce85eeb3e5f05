//! Label-based authorization for SiteWatch.
//!
//! Roles map to label grants; a caller's grants are the union of their roles.
//! An app is visible when any of its labels is granted, and a location is
//! visible when it hosts a visible app. Nothing is cached between requests.

mod error;
mod permissions;
mod view;

pub use error::AccessError;
pub use permissions::{LabelSets, UserPermissions};
pub use view::{filtered_apps, filtered_labels, filtered_locations, AppQuery};
