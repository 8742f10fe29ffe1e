use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use strum::{EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::core::resource::{Record, ResourceKind, ResourceRef};
use crate::db::ErrorClass;

pub const DRY_RUN_REASON: &str = "dry-run";
pub const DEPENDENCIES_EXIST: &str = "dependencies exist";
pub const NOT_CONFIRMED: &str = "not confirmed";
pub const AUTH_ABORTED: &str = "aborted: authentication failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeletionMode {
    DryRun,
    Live,
}

impl DeletionMode {
    /// Live only when `--live` was given and nothing pins dry-run.
    pub fn resolve(live_flag: bool, force_dry_run: bool) -> Self {
        if live_flag && !force_dry_run {
            Self::Live
        } else {
            Self::DryRun
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == Self::DryRun
    }

    /// Tag used in artifact file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::DryRun => "dryrun",
            Self::Live => "live",
        }
    }

    pub fn banner(self) -> &'static str {
        match self {
            Self::DryRun => "DRY RUN",
            Self::Live => "LIVE MODE",
        }
    }
}

/// How the operator chose the targets; kept in the artifact for reproducibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum TargetSelector {
    Ids,
    IdsFile {
        path: PathBuf,
    },
    Pattern {
        pattern: String,
        regex: bool,
        case_sensitive: bool,
    },
    Region {
        region_id: i64,
    },
}

/// One bulk deletion, fixed at construction. All targets share one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    kind: ResourceKind,
    targets: Vec<i64>,
    mode: DeletionMode,
    force: bool,
    selector: TargetSelector,
}

impl DeletionRequest {
    /// Duplicate ids are dropped; first-seen order is kept.
    pub fn new(
        kind: ResourceKind,
        ids: impl IntoIterator<Item = i64>,
        mode: DeletionMode,
        force: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        let targets = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self {
            kind,
            targets,
            mode,
            force,
            selector: TargetSelector::Ids,
        }
    }

    pub fn with_selector(mut self, selector: TargetSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn mode(&self) -> DeletionMode {
        self.mode
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn ids(&self) -> &[i64] {
        &self.targets
    }

    pub fn targets(&self) -> impl Iterator<Item = ResourceRef> + '_ {
        self.targets.iter().map(|id| ResourceRef::new(self.kind, *id))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub resource: ResourceRef,
    pub children: Vec<ResourceRef>,
    /// Child rows returned without a usable id. They still block deletion.
    #[serde(default)]
    pub unidentified_children: usize,
    pub safe_to_delete: bool,
}

impl DependencyReport {
    pub fn new(resource: ResourceRef, children: Vec<ResourceRef>, unidentified: usize) -> Self {
        let safe_to_delete = children.is_empty() && unidentified == 0;
        Self {
            resource,
            children,
            unidentified_children: unidentified,
            safe_to_delete,
        }
    }

    pub fn blocker_count(&self) -> usize {
        self.children.len() + self.unidentified_children
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Authorization {
    Authorized,
    Denied(String),
    RequiresConfirmation,
}

impl Authorization {
    /// An operator refusing confirmation ends the command with a failure exit.
    /// Dependency denials are an expected outcome of a completed run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Denied(reason) if reason == NOT_CONFIRMED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Skipped { reason: String },
    Failed { error: ErrorClass, message: String },
}

/// Result of the explicit check that link rows went away with their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PostCondition {
    NotApplicable,
    Clean,
    Residual { link_ids: Vec<i64> },
    Unverified { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: ResourceRef,
    pub outcome: Outcome,
    /// Pre-deletion payload, present for succeeded targets.
    pub snapshot: Option<Record>,
    pub post_condition: PostCondition,
    pub recorded_at: DateTime<Utc>,
}

impl TargetResult {
    pub fn skipped(target: ResourceRef, reason: impl Into<String>) -> Self {
        Self::with_outcome(
            target,
            Outcome::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn failed(target: ResourceRef, error: ErrorClass, message: impl Into<String>) -> Self {
        Self::with_outcome(
            target,
            Outcome::Failed {
                error,
                message: message.into(),
            },
        )
    }

    pub fn succeeded(target: ResourceRef, snapshot: Record, post_condition: PostCondition) -> Self {
        Self {
            snapshot: Some(snapshot),
            post_condition,
            ..Self::with_outcome(target, Outcome::Succeeded)
        }
    }

    fn with_outcome(target: ResourceRef, outcome: Outcome) -> Self {
        Self {
            target,
            outcome,
            snapshot: None,
            post_condition: PostCondition::NotApplicable,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded)
    }

    pub fn error_class(&self) -> Option<ErrorClass> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(*error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Audit record of one run, serialized once when the run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionResult {
    pub run_id: Uuid,
    pub request: DeletionRequest,
    pub environment_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub authorization: Authorization,
    pub dependency_reports: Vec<DependencyReport>,
    pub outcomes: Vec<TargetResult>,
    pub summary: Summary,
}

impl DeletionResult {
    pub fn new(request: DeletionRequest, environment_url: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            request,
            environment_url: environment_url.into(),
            started_at: Utc::now(),
            finished_at: None,
            authorization: Authorization::RequiresConfirmation,
            dependency_reports: Vec::new(),
            outcomes: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn compute_summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for entry in &self.outcomes {
            match entry.outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.summary = self.compute_summary();
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TargetResult> {
        self.outcomes.iter().filter(|o| o.is_succeeded())
    }

    pub fn outcome_for(&self, target: ResourceRef) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.target == target)
            .map(|o| &o.outcome)
    }
}
