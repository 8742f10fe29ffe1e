pub mod api;
pub mod client;
pub mod error;
pub mod retry;

#[cfg(test)]
pub(crate) mod fake;

pub use api::ResourceApi;
pub use client::GatewayClient;
pub use error::{ApiError, ErrorClass};
pub use retry::RetryPolicy;
