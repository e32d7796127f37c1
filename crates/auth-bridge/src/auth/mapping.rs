//! Group-to-permission mapping.
//!
//! Translates identity-provider group claims (`cognito:groups`) into the host
//! application's permission names. The table is fixed at startup: the
//! built-in defaults with per-deployment overrides merged over them. Override
//! entries replace the default entry for the same group, they are not unioned.
//!
//! Unknown groups map to nothing. Absence of a mapping is least privilege,
//! not an error.

use crate::errors::AuthError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Host application permissions understood by the bridge.
///
/// Serialized with the host's uppercase names (`TICKET_VIEW`, `TRAC_ADMIN`).
/// Parsing rejects any other name, so a misspelled override fails at load
/// time instead of silently granting nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    BrowserView,
    ChangesetView,
    FileView,
    LogView,
    MilestoneView,
    MilestoneCreate,
    MilestoneModify,
    ReportView,
    ReportCreate,
    RoadmapView,
    SearchView,
    TicketView,
    TicketCreate,
    TicketAppend,
    TicketModify,
    TimelineView,
    WikiView,
    WikiCreate,
    WikiModify,
    WikiDelete,
    TracAdmin,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Permission; 21] = [
        Permission::BrowserView,
        Permission::ChangesetView,
        Permission::FileView,
        Permission::LogView,
        Permission::MilestoneView,
        Permission::MilestoneCreate,
        Permission::MilestoneModify,
        Permission::ReportView,
        Permission::ReportCreate,
        Permission::RoadmapView,
        Permission::SearchView,
        Permission::TicketView,
        Permission::TicketCreate,
        Permission::TicketAppend,
        Permission::TicketModify,
        Permission::TimelineView,
        Permission::WikiView,
        Permission::WikiCreate,
        Permission::WikiModify,
        Permission::WikiDelete,
        Permission::TracAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::BrowserView => "BROWSER_VIEW",
            Permission::ChangesetView => "CHANGESET_VIEW",
            Permission::FileView => "FILE_VIEW",
            Permission::LogView => "LOG_VIEW",
            Permission::MilestoneView => "MILESTONE_VIEW",
            Permission::MilestoneCreate => "MILESTONE_CREATE",
            Permission::MilestoneModify => "MILESTONE_MODIFY",
            Permission::ReportView => "REPORT_VIEW",
            Permission::ReportCreate => "REPORT_CREATE",
            Permission::RoadmapView => "ROADMAP_VIEW",
            Permission::SearchView => "SEARCH_VIEW",
            Permission::TicketView => "TICKET_VIEW",
            Permission::TicketCreate => "TICKET_CREATE",
            Permission::TicketAppend => "TICKET_APPEND",
            Permission::TicketModify => "TICKET_MODIFY",
            Permission::TimelineView => "TIMELINE_VIEW",
            Permission::WikiView => "WIKI_VIEW",
            Permission::WikiCreate => "WIKI_CREATE",
            Permission::WikiModify => "WIKI_MODIFY",
            Permission::WikiDelete => "WIKI_DELETE",
            Permission::TracAdmin => "TRAC_ADMIN",
        }
    }

    /// Whether `held` satisfies a check for `self`.
    ///
    /// `TRAC_ADMIN` satisfies every check, matching the host's superuser
    /// semantics.
    pub fn is_satisfied_by(&self, held: &BTreeSet<Permission>) -> bool {
        held.contains(self) || held.contains(&Permission::TracAdmin)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown permission name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// Per-deployment overrides: group name to the full permission set it grants.
pub type PermissionOverrides = BTreeMap<String, BTreeSet<Permission>>;

/// Parse overrides from their JSON configuration form.
///
/// ```json
/// {"students": ["TICKET_VIEW", "WIKI_VIEW"], "graders": ["TICKET_MODIFY"]}
/// ```
///
/// # Errors
///
/// Returns the serde error message if the JSON is invalid or names an
/// unknown permission.
pub fn parse_permission_overrides(json: &str) -> Result<PermissionOverrides, String> {
    serde_json::from_str(json).map_err(|e| e.to_string())
}

/// Maps identity-provider groups to host permissions.
#[derive(Debug, Clone)]
pub struct ClaimMapper {
    table: BTreeMap<String, BTreeSet<Permission>>,
}

impl ClaimMapper {
    /// Build the mapper from the default table with `overrides` merged over it.
    pub fn new(overrides: &PermissionOverrides) -> Self {
        let mut table = default_table();
        for (group, permissions) in overrides {
            table.insert(group.clone(), permissions.clone());
        }

        tracing::info!(
            target: "bridge.auth.mapping",
            groups = table.len(),
            overrides = overrides.len(),
            "Permission mapping loaded"
        );

        Self { table }
    }

    /// Union of the permissions granted by each group. Unknown groups grant
    /// nothing.
    pub fn map_groups(&self, groups: &BTreeSet<String>) -> BTreeSet<Permission> {
        let mut permissions = BTreeSet::new();
        for group in groups {
            match self.table.get(group) {
                Some(granted) => permissions.extend(granted.iter().copied()),
                None => {
                    tracing::debug!(target: "bridge.auth.mapping", group = %group, "Ignoring unmapped group");
                }
            }
        }
        permissions
    }

    /// Check that every permission in `permissions` is traceable to `groups`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MappingPolicyViolation` naming the untraceable
    /// permissions.
    pub fn verify_traceable(
        &self,
        groups: &BTreeSet<String>,
        permissions: &BTreeSet<Permission>,
    ) -> Result<(), AuthError> {
        let traceable = self.map_groups(groups);
        let untraceable: Vec<&'static str> = permissions
            .difference(&traceable)
            .map(Permission::as_str)
            .collect();

        if untraceable.is_empty() {
            Ok(())
        } else {
            Err(AuthError::MappingPolicyViolation(format!(
                "permissions not traceable to current groups: {}",
                untraceable.join(", ")
            )))
        }
    }

    /// Configured permission set for a single group, if mapped.
    pub fn permissions_for(&self, group: &str) -> Option<&BTreeSet<Permission>> {
        self.table.get(group)
    }
}

impl Default for ClaimMapper {
    fn default() -> Self {
        Self::new(&PermissionOverrides::new())
    }
}

fn default_table() -> BTreeMap<String, BTreeSet<Permission>> {
    use Permission::*;

    BTreeMap::from([
        ("admins".to_string(), BTreeSet::from([TracAdmin])),
        (
            "instructors".to_string(),
            BTreeSet::from([
                TicketView,
                TicketCreate,
                TicketModify,
                WikiView,
                WikiCreate,
                WikiModify,
                MilestoneView,
                MilestoneCreate,
                RoadmapView,
                ReportView,
                TimelineView,
                SearchView,
            ]),
        ),
        (
            "students".to_string(),
            BTreeSet::from([
                TicketView,
                TicketCreate,
                WikiView,
                MilestoneView,
                RoadmapView,
                TimelineView,
                SearchView,
            ]),
        ),
    ])
}
