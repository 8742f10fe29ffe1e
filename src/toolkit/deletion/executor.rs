use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::artifact::{ArtifactWriter, deletion_artifact_path};
use super::models::{
    AUTH_ABORTED, Authorization, DRY_RUN_REASON, DeletionRequest, DeletionResult, NOT_CONFIRMED,
    PostCondition, TargetResult,
};
use super::safety::{ConfirmationPrompt, Confirmer, GateDecision, SafetyGate};
use crate::core::config::PurgeConfig;
use crate::core::error::{PurgeError, Result};
use crate::core::resource::{LinkKind, ListFilter, ResourceKind, ResourceRef};
use crate::db::{ErrorClass, ResourceApi};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub sandbox_marker: String,
    pub pause_every_n: usize,
    pub rate_limit_delay: Duration,
    pub countdown: Duration,
    pub results_dir: PathBuf,
}

impl ExecutorSettings {
    pub fn from_config(config: &PurgeConfig) -> Self {
        Self {
            sandbox_marker: config.safety.sandbox_marker.clone(),
            pause_every_n: config.deletion.pause_every_n.max(1),
            rate_limit_delay: config.safety.rate_limit_delay(),
            countdown: config.safety.countdown(),
            results_dir: config.deletion.results_dir.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub result: DeletionResult,
    pub artifact: PathBuf,
}

/// Runs one batch end to end: gate, confirmation, per-target deletion, artifact.
pub struct DeletionExecutor {
    api: Arc<dyn ResourceApi>,
    gate: SafetyGate,
    confirmer: Arc<dyn Confirmer>,
    settings: ExecutorSettings,
}

impl DeletionExecutor {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        confirmer: Arc<dyn Confirmer>,
        settings: ExecutorSettings,
    ) -> Self {
        let gate = SafetyGate::new(api.clone(), settings.sandbox_marker.clone());
        Self {
            api,
            gate,
            confirmer,
            settings,
        }
    }

    /// An authentication failure still writes the artifact before returning the error.
    pub async fn run(
        &self,
        request: DeletionRequest,
        output: Option<PathBuf>,
    ) -> Result<CompletedRun> {
        let environment_url = self.api.environment_url().to_string();
        let mut result = DeletionResult::new(request.clone(), environment_url.clone());
        let path = output.unwrap_or_else(|| {
            deletion_artifact_path(
                &self.settings.results_dir,
                request.kind(),
                request.mode(),
                result.run_id,
            )
        });
        let mut writer = ArtifactWriter::create(path)?;

        info!("{}", "=".repeat(70));
        info!(
            "{} DELETION - {}",
            request.kind().collection().to_uppercase(),
            request.mode().banner()
        );
        info!("{}", "=".repeat(70));
        info!("Run: {}", result.run_id);
        info!("Environment: {}", environment_url);
        info!("Targets: {}", request.len());

        let decision = match self.gate.authorize(&request, &environment_url).await {
            Ok(decision) => decision,
            Err(e) if e.class() == ErrorClass::Unauthorized => {
                error!("Authentication failed during dependency check: {}", e);
                result.authorization = Authorization::Denied(AUTH_ABORTED.to_string());
                begin_journal(&mut writer, &result);
                self.skip_all(&request, AUTH_ABORTED, &mut result, &mut writer);
                let artifact = finish(writer, &mut result)?;
                return Err(PurgeError::Authentication(format!(
                    "{} (results: {})",
                    e,
                    artifact.display()
                )));
            }
            Err(e) => {
                error!("Dependency check failed ({}): {}", e.class(), e);
                GateDecision {
                    authorization: Authorization::Denied(format!("dependency check failed: {}", e)),
                    dependency_reports: Vec::new(),
                }
            }
        };

        result.authorization = match decision.authorization {
            Authorization::RequiresConfirmation if request.is_empty() => {
                info!("No targets; nothing to confirm");
                Authorization::Authorized
            }
            Authorization::RequiresConfirmation => self.confirm(&request, &environment_url),
            other => other,
        };
        result.dependency_reports = decision.dependency_reports;
        begin_journal(&mut writer, &result);

        let aborted = match result.authorization.clone() {
            Authorization::Denied(reason) => {
                warn!("Deletion denied: {}", reason);
                self.skip_all(&request, &reason, &mut result, &mut writer);
                false
            }
            _ => {
                if !request.mode().is_dry_run() && !request.is_empty() {
                    self.countdown(&request).await;
                }
                self.process(&request, &mut result, &mut writer).await
            }
        };

        let artifact = finish(writer, &mut result)?;
        log_summary(&result);

        if aborted {
            return Err(PurgeError::Authentication(format!(
                "credential rejected mid-run; remaining targets skipped (results: {})",
                artifact.display()
            )));
        }
        Ok(CompletedRun { result, artifact })
    }

    fn confirm(&self, request: &DeletionRequest, environment_url: &str) -> Authorization {
        let prompt = ConfirmationPrompt {
            environment_url: environment_url.to_string(),
            kind: request.kind(),
            count: request.len(),
        };
        warn!("Non-sandbox environment: {}", environment_url);
        if self.confirmer.confirm(&prompt) {
            info!("Deletion confirmed by operator");
            Authorization::Authorized
        } else {
            warn!("Deletion not confirmed");
            Authorization::Denied(NOT_CONFIRMED.to_string())
        }
    }

    async fn countdown(&self, request: &DeletionRequest) {
        let seconds = self.settings.countdown.as_secs();
        if seconds == 0 {
            return;
        }
        warn!(
            "LIVE DELETION of {} {} starts in {} seconds. Press Ctrl+C to cancel.",
            request.len(),
            request.kind().collection(),
            seconds
        );
        for remaining in (1..=seconds).rev() {
            info!("{}...", remaining);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    fn skip_all(
        &self,
        request: &DeletionRequest,
        reason: &str,
        result: &mut DeletionResult,
        writer: &mut ArtifactWriter,
    ) {
        for target in request.targets() {
            push(result, writer, TargetResult::skipped(target, reason));
        }
    }

    /// Returns true when the run was aborted by an authentication failure.
    async fn process(
        &self,
        request: &DeletionRequest,
        result: &mut DeletionResult,
        writer: &mut ArtifactWriter,
    ) -> bool {
        let total = request.len();
        let mut deletions = 0usize;
        let mut aborted = false;

        for (index, target) in request.targets().enumerate() {
            if aborted {
                push(result, writer, TargetResult::skipped(target, AUTH_ABORTED));
                continue;
            }
            info!("[{}/{}] {}", index + 1, total, target);

            if request.mode().is_dry_run() {
                info!("[DRY-RUN] Would delete {}", target);
                push(result, writer, TargetResult::skipped(target, DRY_RUN_REASON));
                continue;
            }

            let entry = self.delete_one(target).await;
            deletions += 1;
            if entry.error_class() == Some(ErrorClass::Unauthorized) {
                error!("Authentication failed; aborting remaining targets");
                aborted = true;
            }
            push(result, writer, entry);

            let remaining = index + 1 < total;
            if !aborted && remaining && deletions % self.settings.pause_every_n == 0 {
                info!(
                    "Rate limit pause after {} deletions ({:?})",
                    deletions, self.settings.rate_limit_delay
                );
                tokio::time::sleep(self.settings.rate_limit_delay).await;
            }
        }
        aborted
    }

    async fn delete_one(&self, target: ResourceRef) -> TargetResult {
        let snapshot = match self.api.get(target.kind, target.id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to read {} ({}): {}", target, e.class(), e);
                return TargetResult::failed(target, e.class(), e.to_string());
            }
        };

        if let Err(e) = self.api.delete(target.kind, target.id).await {
            error!("Failed to delete {} ({}): {}", target, e.class(), e);
            return TargetResult::failed(target, e.class(), e.to_string());
        }
        info!("Deleted {} ({})", target, snapshot.display_name());

        let post_condition = self.post_condition(target).await;
        TargetResult::succeeded(target, snapshot, post_condition)
    }

    async fn post_condition(&self, target: ResourceRef) -> PostCondition {
        if target.kind != ResourceKind::Process {
            return PostCondition::NotApplicable;
        }
        let filter = ListFilter::new("process_id", target.id);
        match self.api.list_links(LinkKind::ProcessesData, Some(&filter)).await {
            Ok(rows) if rows.is_empty() => PostCondition::Clean,
            Ok(rows) => {
                let link_ids: Vec<i64> = rows.iter().filter_map(|r| r.id()).collect();
                warn!(
                    "{} deleted but {} processes_data row(s) remain: {:?}",
                    target,
                    rows.len(),
                    link_ids
                );
                PostCondition::Residual { link_ids }
            }
            Err(e) => {
                warn!("Could not verify processes_data cleanup for {}: {}", target, e);
                PostCondition::Unverified {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn begin_journal(writer: &mut ArtifactWriter, result: &DeletionResult) {
    if let Err(e) = writer.begin(result) {
        warn!("Journal unavailable ({}); results are kept in memory only", e);
    }
}

fn push(result: &mut DeletionResult, writer: &mut ArtifactWriter, entry: TargetResult) {
    if let Err(e) = writer.record(&entry) {
        warn!("Failed to journal {}: {}", entry.target, e);
    }
    result.outcomes.push(entry);
}

fn finish(writer: ArtifactWriter, result: &mut DeletionResult) -> Result<PathBuf> {
    result.finish();
    writer.finalize(result)
}

fn log_summary(result: &DeletionResult) {
    let summary = result.summary;
    info!("{}", "=".repeat(70));
    info!("DELETION SUMMARY");
    info!("{}", "=".repeat(70));
    info!("Total: {}", summary.total);
    info!("Succeeded: {}", summary.succeeded);
    info!("Skipped: {}", summary.skipped);
    info!("Failed: {}", summary.failed);
}
