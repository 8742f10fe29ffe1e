pub mod config;
pub mod error;
pub mod logging;
pub mod resource;

pub use config::{DeletionConfig, GatewayConfig, LoggingConfig, PurgeConfig, SafetyConfig};
pub use error::{PurgeError, Result};
pub use resource::{ChildRelation, LinkKind, ListFilter, Record, ResourceKind, ResourceRef};
