pub mod core;
pub mod db;
pub mod toolkit;
pub mod utils;

pub use utils::{file_stamp, safe_truncate_ellipsis};

pub use core::config::PurgeConfig;
pub use core::error::{PurgeError, Result};
pub use core::resource::{Record, ResourceKind, ResourceRef};
pub use db::{ApiError, GatewayClient, ResourceApi};

pub const DEFAULT_RESULTS_DIR: &str = "results";
