use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::DependencyReport;
use crate::core::resource::{ChildRelation, ListFilter, ResourceRef};
use crate::db::{ApiError, ResourceApi};

const PREVIEW_CHILDREN: usize = 5;

/// Lists the direct children of a resource through the hierarchy relations.
pub struct DependencyChecker {
    api: Arc<dyn ResourceApi>,
}

impl DependencyChecker {
    pub fn new(api: Arc<dyn ResourceApi>) -> Self {
        Self { api }
    }

    pub async fn check(&self, target: ResourceRef) -> Result<DependencyReport, ApiError> {
        let mut children = Vec::new();
        let mut seen = HashSet::new();
        let mut unidentified = 0;

        for relation in target.kind.child_relations() {
            match *relation {
                ChildRelation::Direct { child, field } => {
                    let filter = ListFilter::new(field, target.id);
                    for record in self.api.list(child, Some(&filter)).await? {
                        match record.id() {
                            Some(id) if seen.insert(ResourceRef::new(child, id)) => {
                                children.push(ResourceRef::new(child, id))
                            }
                            Some(_) => {}
                            None => unidentified += 1,
                        }
                    }
                }
                ChildRelation::Linked {
                    child,
                    link,
                    parent_field,
                    child_field,
                } => {
                    let filter = ListFilter::new(parent_field, target.id);
                    for row in self.api.list_links(link, Some(&filter)).await? {
                        match row.int_field(child_field) {
                            Some(id) if seen.insert(ResourceRef::new(child, id)) => {
                                children.push(ResourceRef::new(child, id))
                            }
                            Some(_) => {}
                            None => unidentified += 1,
                        }
                    }
                }
            }
        }

        let report = DependencyReport::new(target, children, unidentified);
        if report.safe_to_delete {
            debug!("{} has no dependents", target);
        } else {
            let preview: Vec<String> = report
                .children
                .iter()
                .take(PREVIEW_CHILDREN)
                .map(|c| c.to_string())
                .collect();
            warn!(
                "{} has {} dependent(s): {}{}",
                target,
                report.blocker_count(),
                preview.join(", "),
                if report.blocker_count() > PREVIEW_CHILDREN { ", ..." } else { "" }
            );
        }
        Ok(report)
    }

    /// Checks in order; the first failing check aborts the batch.
    pub async fn check_all(
        &self,
        targets: impl IntoIterator<Item = ResourceRef>,
    ) -> Result<Vec<DependencyReport>, ApiError> {
        let mut reports = Vec::new();
        for target in targets {
            reports.push(self.check(target).await?);
        }
        Ok(reports)
    }
}
