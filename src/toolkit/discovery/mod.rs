pub mod region;
pub mod search;

pub use region::{RegionAnalysis, RegionSummary, analyze_region};
pub use search::{Matcher, SearchHit, SearchReport, search};

use std::sync::Arc;
use tracing::info;

use crate::core::resource::{ResourceKind, ResourceRef};
use crate::db::{ApiError, ResourceApi};
use crate::toolkit::deletion::{DependencyChecker, DependencyReport};

/// Dependency reports for the given ids, in input order.
pub async fn find_dependencies(
    api: Arc<dyn ResourceApi>,
    kind: ResourceKind,
    ids: &[i64],
) -> Result<Vec<DependencyReport>, ApiError> {
    info!("Checking dependencies for {} {}", ids.len(), kind.collection());
    let reports = DependencyChecker::new(api)
        .check_all(ids.iter().map(|id| ResourceRef::new(kind, *id)))
        .await?;
    let blocked = reports.iter().filter(|r| !r.safe_to_delete).count();
    info!(
        "{} of {} {} have dependents",
        blocked,
        reports.len(),
        kind.collection()
    );
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeApi;
    use serde_json::json;

    #[tokio::test]
    async fn test_find_dependencies_per_id() {
        let api = Arc::new(
            FakeApi::sandbox()
                .with(ResourceKind::Subprocess, json!({"id": 8, "process_id": 40}))
                .with(ResourceKind::Subprocess, json!({"id": 9, "process_id": 40})),
        );
        let reports = find_dependencies(api, ResourceKind::Process, &[40, 41]).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].children.len(), 2);
        assert!(reports[1].safe_to_delete);
    }
}
