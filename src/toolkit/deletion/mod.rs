pub mod artifact;
pub mod dependency;
pub mod executor;
pub mod models;
pub mod safety;
pub mod targets;

pub use artifact::{ArtifactWriter, load_result, save_json};
pub use dependency::DependencyChecker;
pub use executor::{CompletedRun, DeletionExecutor, ExecutorSettings};
pub use models::{
    Authorization, DeletionMode, DeletionRequest, DeletionResult, DependencyReport, Outcome,
    PostCondition, Summary, TargetResult, TargetSelector,
};
pub use safety::{AutoConfirm, ConfirmationPrompt, Confirmer, GateDecision, RejectAll, SafetyGate};
pub use targets::{TargetSpec, parse_expected_names, read_ids_file};
