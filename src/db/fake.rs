use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use super::api::ResourceApi;
use super::error::ApiError;
use crate::core::resource::{LinkKind, ListFilter, Record, ResourceKind, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(ResourceKind),
    Get(ResourceRef),
    Delete(ResourceRef),
    ListLinks(LinkKind),
}

/// In-memory stand-in for the vendor API.
pub struct FakeApi {
    url: String,
    records: Mutex<HashMap<ResourceKind, Vec<Record>>>,
    links: Mutex<HashMap<LinkKind, Vec<Record>>>,
    delete_failures: Mutex<HashMap<ResourceRef, u16>>,
    list_failures: Mutex<HashMap<ResourceKind, u16>>,
    cascade_links: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            records: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
            delete_failures: Mutex::new(HashMap::new()),
            list_failures: Mutex::new(HashMap::new()),
            cascade_links: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn sandbox() -> Self {
        Self::new("https://acme-sandbox.example.com/api/v1")
    }

    pub fn production() -> Self {
        Self::new("https://acme.example.com/api/v1")
    }

    pub fn with(self, kind: ResourceKind, value: Value) -> Self {
        let record = Record::from_value(value).expect("fake records are objects");
        self.records
            .lock()
            .entry(kind)
            .or_default()
            .push(record);
        self
    }

    pub fn with_link(self, link: LinkKind, value: Value) -> Self {
        let record = Record::from_value(value).expect("fake links are objects");
        self.links.lock().entry(link).or_default().push(record);
        self
    }

    pub fn fail_delete(self, kind: ResourceKind, id: i64, status: u16) -> Self {
        self.delete_failures
            .lock()
            .insert(ResourceRef::new(kind, id), status);
        self
    }

    pub fn fail_list(self, kind: ResourceKind, status: u16) -> Self {
        self.list_failures.lock().insert(kind, status);
        self
    }

    /// Leaves `processes_data` rows behind when a process is deleted.
    pub fn keep_links_on_delete(mut self) -> Self {
        self.cascade_links = false;
        self
    }

    /// Replaces a stored record, simulating a restore with drifted fields.
    pub fn put(&self, kind: ResourceKind, value: Value) {
        let record = Record::from_value(value).expect("fake records are objects");
        let mut records = self.records.lock();
        let bucket = records.entry(kind).or_default();
        bucket.retain(|r| r.id() != record.id());
        bucket.push(record);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn delete_calls(&self) -> Vec<ResourceRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, kind: ResourceKind, id: i64) -> bool {
        self.records
            .lock()
            .get(&kind)
            .is_some_and(|rs| rs.iter().any(|r| r.id() == Some(id)))
    }

    fn record_call(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ResourceApi for FakeApi {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        self.record_call(Call::List(kind));
        if let Some(status) = self.list_failures.lock().get(&kind) {
            return Err(ApiError::from_status(*status, "injected list failure"));
        }
        let records = self.records.lock();
        Ok(records
            .get(&kind)
            .map(|rs| {
                rs.iter()
                    .filter(|r| filter.is_none_or(|f| f.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, kind: ResourceKind, id: i64) -> Result<Record, ApiError> {
        self.record_call(Call::Get(ResourceRef::new(kind, id)));
        self.records
            .lock()
            .get(&kind)
            .and_then(|rs| rs.iter().find(|r| r.id() == Some(id)).cloned())
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", kind, id)))
    }

    async fn delete(&self, kind: ResourceKind, id: i64) -> Result<(), ApiError> {
        let target = ResourceRef::new(kind, id);
        self.record_call(Call::Delete(target));
        if let Some(status) = self.delete_failures.lock().get(&target) {
            return Err(ApiError::from_status(*status, "injected delete failure"));
        }

        let mut records = self.records.lock();
        let bucket = records.entry(kind).or_default();
        let before = bucket.len();
        bucket.retain(|r| r.id() != Some(id));
        if bucket.len() == before {
            return Err(ApiError::NotFound(target.to_string()));
        }

        if kind == ResourceKind::Process && self.cascade_links {
            if let Some(rows) = self.links.lock().get_mut(&LinkKind::ProcessesData) {
                rows.retain(|r| r.int_field("process_id") != Some(id));
            }
        }
        Ok(())
    }

    async fn list_links(
        &self,
        link: LinkKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, ApiError> {
        self.record_call(Call::ListLinks(link));
        let links = self.links.lock();
        Ok(links
            .get(&link)
            .map(|rs| {
                rs.iter()
                    .filter(|r| filter.is_none_or(|f| f.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn environment_url(&self) -> &str {
        &self.url
    }
}
