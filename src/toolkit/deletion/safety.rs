use std::sync::Arc;
use tracing::{info, warn};

use super::dependency::DependencyChecker;
use super::models::{
    Authorization, DEPENDENCIES_EXIST, DeletionRequest, DependencyReport,
};
use crate::core::config::is_sandbox_url;
use crate::core::resource::ResourceKind;
use crate::db::{ApiError, ErrorClass, ResourceApi};

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub authorization: Authorization,
    pub dependency_reports: Vec<DependencyReport>,
}

/// What the operator is asked to acknowledge before a production run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub environment_url: String,
    pub kind: ResourceKind,
    pub count: usize,
}

impl ConfirmationPrompt {
    /// Exact text the operator must type, e.g. `DELETE 3 CONTROLS`.
    pub fn phrase(&self) -> String {
        format!(
            "DELETE {} {}",
            self.count,
            self.kind.collection().to_uppercase()
        )
    }
}

pub trait Confirmer: Send + Sync {
    /// True only on an explicit, exact confirmation.
    fn confirm(&self, prompt: &ConfirmationPrompt) -> bool;
}

/// Accepts everything. Used for non-interactive runs the operator already approved.
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _prompt: &ConfirmationPrompt) -> bool {
        true
    }
}

pub struct RejectAll;

impl Confirmer for RejectAll {
    fn confirm(&self, _prompt: &ConfirmationPrompt) -> bool {
        false
    }
}

pub struct SafetyGate {
    checker: DependencyChecker,
    sandbox_marker: String,
}

impl SafetyGate {
    pub fn new(api: Arc<dyn ResourceApi>, sandbox_marker: impl Into<String>) -> Self {
        Self {
            checker: DependencyChecker::new(api),
            sandbox_marker: sandbox_marker.into(),
        }
    }

    pub async fn authorize(
        &self,
        request: &DeletionRequest,
        environment_url: &str,
    ) -> Result<GateDecision, ApiError> {
        let dependency_reports = if request.force() {
            warn!(
                "--force: skipping dependency checks for {} {}",
                request.len(),
                request.kind().collection()
            );
            Vec::new()
        } else if request.mode().is_dry_run() {
            match self.checker.check_all(request.targets()).await {
                Ok(reports) => reports,
                Err(e) if e.class() == ErrorClass::Unauthorized => return Err(e),
                Err(e) => {
                    warn!("[DRY-RUN] dependency check failed ({}): {}", e.class(), e);
                    Vec::new()
                }
            }
        } else {
            self.checker.check_all(request.targets()).await?
        };

        let live = evaluate(
            request.force(),
            &dependency_reports,
            environment_url,
            &self.sandbox_marker,
        );

        let authorization = if request.mode().is_dry_run() {
            match &live {
                Authorization::Authorized => {}
                Authorization::Denied(reason) => {
                    info!("[DRY-RUN] a live run would be denied: {}", reason)
                }
                Authorization::RequiresConfirmation => {
                    info!("[DRY-RUN] a live run would require confirmation for {}", environment_url)
                }
            }
            Authorization::Authorized
        } else {
            live
        };

        Ok(GateDecision {
            authorization,
            dependency_reports,
        })
    }
}

/// The live-mode rules: dependents deny, production asks, sandbox proceeds.
pub fn evaluate(
    force: bool,
    reports: &[DependencyReport],
    environment_url: &str,
    sandbox_marker: &str,
) -> Authorization {
    if !force && reports.iter().any(|r| !r.safe_to_delete) {
        return Authorization::Denied(DEPENDENCIES_EXIST.to_string());
    }
    if !is_sandbox_url(environment_url, sandbox_marker) {
        return Authorization::RequiresConfirmation;
    }
    Authorization::Authorized
}
