pub mod deletion;
pub mod discovery;
pub mod verification;

pub use deletion::{DeletionExecutor, DeletionRequest, DeletionResult};
pub use discovery::{analyze_region, find_dependencies, search};
pub use verification::{check_present, verify_deleted, verify_restored};
