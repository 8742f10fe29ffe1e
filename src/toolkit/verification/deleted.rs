use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::core::resource::{Record, ResourceKind};
use crate::db::{ApiError, ResourceApi};
use crate::utils::safe_truncate_ellipsis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletedCheck {
    pub gone: bool,
}

/// `gone` only when the API answers not-found; any other error is returned.
pub async fn verify_deleted(
    api: &dyn ResourceApi,
    kind: ResourceKind,
    ids: &[i64],
) -> Result<BTreeMap<i64, DeletedCheck>, ApiError> {
    let mut checks = BTreeMap::new();
    for id in ids {
        let gone = match api.get(kind, *id).await {
            Ok(_) => {
                warn!("{} {} still exists", kind, id);
                false
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => return Err(e),
        };
        checks.insert(*id, DeletedCheck { gone });
    }
    let remaining = checks.values().filter(|c| !c.gone).count();
    info!("{} of {} {} confirmed gone", ids.len() - remaining, ids.len(), kind.collection());
    Ok(checks)
}

#[derive(Debug, Clone, Serialize)]
pub struct PresentItem {
    pub id: i64,
    pub name: String,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingItem {
    pub id: i64,
    pub expected_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceReport {
    pub kind: ResourceKind,
    pub restored: Vec<PresentItem>,
    pub still_missing: Vec<MissingItem>,
}

impl PresenceReport {
    pub fn all_present(&self) -> bool {
        self.still_missing.is_empty()
    }
}

/// Checks that previously deleted records are back, comparing names when given.
pub async fn check_present(
    api: &dyn ResourceApi,
    kind: ResourceKind,
    ids: &[i64],
    expected_names: &HashMap<i64, String>,
) -> Result<PresenceReport, ApiError> {
    info!("Checking if {} {} have been restored", ids.len(), kind.collection());
    let mut report = PresenceReport {
        kind,
        restored: Vec::new(),
        still_missing: Vec::new(),
    };

    for id in ids {
        let expected = expected_names.get(id).map(String::as_str).unwrap_or("Unknown");
        match api.get(kind, *id).await {
            Ok(record) => {
                let name = record.display_name().to_string();
                if expected != "Unknown" && expected != name {
                    warn!(
                        "{} {} restored under a different name: {:?} (expected {:?})",
                        kind, id, name, expected
                    );
                }
                info!("{} {}: RESTORED ({})", kind, id, safe_truncate_ellipsis(&name, 60));
                report.restored.push(PresentItem {
                    id: *id,
                    name,
                    record,
                });
            }
            Err(e) if e.is_not_found() => {
                warn!("{} {}: STILL MISSING ({})", kind, id, safe_truncate_ellipsis(expected, 60));
                report.still_missing.push(MissingItem {
                    id: *id,
                    expected_name: expected.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Restored: {}, still missing: {}",
        report.restored.len(),
        report.still_missing.len()
    );
    Ok(report)
}
