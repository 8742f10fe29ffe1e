use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::core::error::{PurgeError, Result};
use crate::core::resource::{Record, ResourceKind};
use crate::db::ResourceApi;

/// Matches a record on its `uid` or `name`.
#[derive(Debug, Clone)]
pub enum Matcher {
    Substring { pattern: String, case_sensitive: bool },
    Regex(Regex),
}

impl Matcher {
    pub fn substring(pattern: &str, case_sensitive: bool) -> Self {
        let pattern = if case_sensitive {
            pattern.to_string()
        } else {
            pattern.to_lowercase()
        };
        Self::Substring {
            pattern,
            case_sensitive,
        }
    }

    pub fn regex(pattern: &str, case_sensitive: bool) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| {
                PurgeError::Configuration(format!("invalid pattern {:?}: {}", pattern, e))
            })?;
        Ok(Self::Regex(regex))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Substring { pattern, .. } => pattern.clone(),
            Self::Regex(regex) => regex.as_str().to_string(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        [record.uid(), record.name()]
            .into_iter()
            .flatten()
            .any(|value| self.matches_str(value))
    }

    fn matches_str(&self, value: &str) -> bool {
        match self {
            Self::Substring {
                pattern,
                case_sensitive: true,
            } => value.contains(pattern.as_str()),
            Self::Substring { pattern, .. } => value.to_lowercase().contains(pattern.as_str()),
            Self::Regex(regex) => regex.is_match(value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record: Record,
    /// Ancestors, nearest first (e.g. subprocess, process, region for a control).
    pub lineage: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub kind: ResourceKind,
    pub pattern: String,
    pub scanned: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchReport {
    pub fn ids(&self) -> Vec<i64> {
        self.hits.iter().filter_map(|h| h.record.id()).collect()
    }
}

/// Lists every record of `kind`, keeps matches and resolves each hit's ancestors.
pub async fn search(
    api: &dyn ResourceApi,
    kind: ResourceKind,
    matcher: &Matcher,
) -> Result<SearchReport> {
    info!("Searching {} for pattern: '{}'", kind.collection(), matcher.describe());
    let records = api.list(kind, None).await?;
    let scanned = records.len();
    info!("Total {} in environment: {}", kind.collection(), scanned);

    let matching: Vec<Record> = records.into_iter().filter(|r| matcher.matches(r)).collect();

    let mut ancestors: HashMap<ResourceKind, HashMap<i64, Record>> = HashMap::new();
    if !matching.is_empty() {
        let mut step = kind.lineage_field();
        while let Some((parent, _)) = step {
            let by_id = api
                .list(parent, None)
                .await?
                .into_iter()
                .filter_map(|r| r.id().map(|id| (id, r)))
                .collect();
            ancestors.insert(parent, by_id);
            step = parent.lineage_field();
        }
    }

    let hits: Vec<SearchHit> = matching
        .into_iter()
        .map(|record| {
            let lineage = lineage_of(kind, &record, &ancestors);
            SearchHit { record, lineage }
        })
        .collect();

    info!("Found {} matching {}", hits.len(), kind.collection());
    Ok(SearchReport {
        kind,
        pattern: matcher.describe(),
        scanned,
        hits,
    })
}

fn lineage_of(
    kind: ResourceKind,
    record: &Record,
    ancestors: &HashMap<ResourceKind, HashMap<i64, Record>>,
) -> Vec<Record> {
    let mut lineage = Vec::new();
    let mut current = record;
    let mut step = kind.lineage_field();
    while let Some((parent, field)) = step {
        let Some(found) = current
            .int_field(field)
            .and_then(|id| ancestors.get(&parent)?.get(&id))
        else {
            break;
        };
        lineage.push(found.clone());
        current = found;
        step = parent.lineage_field();
    }
    lineage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::{Call, FakeApi};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn hierarchy() -> FakeApi {
        FakeApi::sandbox()
            .with(ResourceKind::Region, json!({"id": 15, "name": "EMEA"}))
            .with(
                ResourceKind::Process,
                json!({"id": 40, "uid": "P-40", "name": "Finance", "region_id": 15}),
            )
            .with(
                ResourceKind::Subprocess,
                json!({"id": 8, "uid": "SP-8", "name": "Payables", "process_id": 40}),
            )
            .with(
                ResourceKind::Control,
                json!({
                    "id": 100,
                    "uid": "SOX-100",
                    "name": "Invoice approval",
                    "subprocess_id": 8
                }),
            )
            .with(
                ResourceKind::Control,
                json!({"id": 101, "uid": "ITGC-1", "name": "Password policy", "subprocess_id": 8}),
            )
            .with(
                ResourceKind::Control,
                json!({"id": 102, "uid": "sox-102", "name": "Orphan", "subprocess_id": 77}),
            )
    }

    #[test]
    fn test_substring_matching() {
        let ctrl = record(json!({"uid": "SOX-100", "name": "Invoice approval"}));
        assert!(Matcher::substring("sox", false).matches(&ctrl));
        assert!(!Matcher::substring("sox", true).matches(&ctrl));
        assert!(Matcher::substring("invoice", false).matches(&ctrl));
        assert!(!Matcher::substring("x", false).matches(&record(json!({"id": 1}))));
    }

    #[test]
    fn test_regex_matching() {
        let ctrl = record(json!({"uid": "SOX-100"}));
        assert!(Matcher::regex(r"^sox-\d+$", false).unwrap().matches(&ctrl));
        assert!(!Matcher::regex(r"^sox-\d+$", true).unwrap().matches(&ctrl));
        assert!(matches!(Matcher::regex("(", false), Err(PurgeError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_search_resolves_lineage() {
        let api = hierarchy();
        let report = search(&api, ResourceKind::Control, &Matcher::substring("sox", false))
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.ids(), vec![100, 102]);
        let names: Vec<&str> = report.hits[0].lineage.iter().filter_map(|r| r.name()).collect();
        assert_eq!(names, vec!["Payables", "Finance", "EMEA"]);
        assert!(report.hits[1].lineage.is_empty());
    }

    #[tokio::test]
    async fn test_search_without_hits_skips_ancestor_lookups() {
        let api = hierarchy();
        let report = search(&api, ResourceKind::Control, &Matcher::substring("nothing", false))
            .await
            .unwrap();
        assert!(report.hits.is_empty());
        assert_eq!(api.calls(), vec![Call::List(ResourceKind::Control)]);
    }
}
