use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::api::ResourceApi;
use super::error::ApiError;
use super::retry::RetryPolicy;
use crate::core::config::GatewayConfig;
use crate::core::error::PurgeError;
use crate::core::resource::{LinkKind, ListFilter, Record, ResourceKind};
use crate::utils::safe_truncate_ellipsis;

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Authenticated client for the vendor REST API.
pub struct GatewayClient {
    http: Client,
    base_url: String,
    api_token: String,
    retry: RetryPolicy,
}

impl GatewayClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, PurgeError> {
        if api_token.trim().is_empty() {
            return Err(PurgeError::Configuration("API token is empty".to_string()));
        }
        url::Url::parse(base_url)
            .map_err(|e| PurgeError::Configuration(format!("invalid base URL {base_url}: {e}")))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PurgeError::Configuration(format!("HTTP client setup failed: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!("GatewayClient created for {}", base_url);

        Ok(Self {
            http,
            base_url,
            api_token: api_token.to_string(),
            retry,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, PurgeError> {
        Self::new(
            &config.base_url,
            &config.api_token,
            config.timeout(),
            config.retry_policy(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn checked(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(
            status.as_u16(),
            safe_truncate_ellipsis(body.trim(), ERROR_BODY_PREVIEW_CHARS),
        ))
    }

    /// GETs `path` and unwraps the `{"<envelope>": [...]}` response.
    async fn fetch_records(
        &self,
        path: &str,
        envelope: &str,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        let url = self.url(path);
        let operation = format!("GET {}", path);

        let url = url.as_str();

        let body: Value = self
            .retry
            .run(&operation, || async move {
                let mut request = self
                    .http
                    .get(url)
                    .bearer_auth(&self.api_token)
                    .header(ACCEPT, "application/json");
                if let Some(filter) = filter {
                    request = request.query(&[(filter.field, filter.value)]);
                }
                let response = Self::checked(request.send().await?).await?;
                Ok(response.json::<Value>().await?)
            })
            .await?;

        let records = unwrap_envelope(body, envelope)?;
        let records: Vec<Record> = match filter {
            Some(filter) => records.into_iter().filter(|r| filter.matches(r)).collect(),
            None => records,
        };
        debug!("{} returned {} records", operation, records.len());
        Ok(records)
    }
}

#[async_trait]
impl ResourceApi for GatewayClient {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        self.fetch_records(kind.collection(), kind.collection(), filter)
            .await
    }

    async fn get(&self, kind: ResourceKind, id: i64) -> Result<Record, ApiError> {
        let path = format!("{}/{}", kind.collection(), id);
        self.fetch_records(&path, kind.collection(), None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", kind, id)))
    }

    async fn delete(&self, kind: ResourceKind, id: i64) -> Result<(), ApiError> {
        let path = format!("{}/{}", kind.collection(), id);
        let url = self.url(&path);
        let operation = format!("DELETE {}", path);

        let url = url.as_str();

        self.retry
            .run(&operation, || async move {
                let response = self
                    .http
                    .delete(url)
                    .bearer_auth(&self.api_token)
                    .send()
                    .await?;
                Self::checked(response).await?;
                Ok(())
            })
            .await?;

        debug!("{} succeeded", operation);
        Ok(())
    }

    async fn list_links(
        &self,
        link: LinkKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        self.fetch_records(link.collection(), link.collection(), filter)
            .await
    }

    fn environment_url(&self) -> &str {
        &self.base_url
    }
}

/// Accepts either the enveloped form or a bare array.
fn unwrap_envelope(body: Value, envelope: &str) -> Result<Vec<Record>, ApiError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(envelope) {
            Some(Value::Array(items)) => items,
            Some(Value::Object(single)) => vec![Value::Object(single)],
            Some(Value::Null) | None => {
                return Err(ApiError::Decode(format!(
                    "response has no '{}' collection",
                    envelope
                )));
            }
            Some(other) => {
                return Err(ApiError::Decode(format!(
                    "'{}' is not a list: {}",
                    envelope, other
                )));
            }
        },
        other => {
            return Err(ApiError::Decode(format!(
                "unexpected response body: {}",
                safe_truncate_ellipsis(&other.to_string(), ERROR_BODY_PREVIEW_CHARS)
            )));
        }
    };

    items
        .into_iter()
        .map(|item| {
            Record::from_value(item)
                .ok_or_else(|| ApiError::Decode(format!("non-object item in '{}'", envelope)))
        })
        .collect()
}
