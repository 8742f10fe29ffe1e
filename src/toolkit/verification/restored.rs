use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::db::{ApiError, ResourceApi};
use crate::toolkit::deletion::DeletionResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Dotted path, with `[i]` for array positions.
    pub path: String,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoredCheck {
    pub restored: bool,
    pub missing: bool,
    pub diffs: Vec<FieldDiff>,
    /// Top-level fields excluded from the comparison at the operator's request.
    pub ignored_fields: Vec<String>,
}

/// Compares each succeeded target's snapshot with the record as it exists now.
pub async fn verify_restored(
    api: &dyn ResourceApi,
    result: &DeletionResult,
    ignore_fields: &[String],
) -> Result<BTreeMap<i64, RestoredCheck>, ApiError> {
    let kind = result.request.kind();
    let ignore: BTreeSet<&str> = ignore_fields.iter().map(String::as_str).collect();
    let mut checks = BTreeMap::new();

    for entry in result.succeeded() {
        let Some(snapshot) = entry.snapshot.as_ref() else {
            warn!("{} has no stored snapshot; skipping", entry.target);
            continue;
        };
        let id = entry.target.id;

        let ignored_fields: Vec<String> = snapshot
            .0
            .keys()
            .filter(|k| ignore.contains(k.as_str()))
            .cloned()
            .collect();

        let check = match api.get(kind, id).await {
            Ok(current) => {
                let mut diffs = Vec::new();
                diff_objects("", &snapshot.0, &current.0, &ignore, &mut diffs);
                if diffs.is_empty() {
                    info!("{}: restored, all fields match", entry.target);
                } else {
                    warn!("{}: {} field(s) differ", entry.target, diffs.len());
                    for diff in &diffs {
                        warn!("   {}: {:?} -> {:?}", diff.path, diff.expected, diff.actual);
                    }
                }
                RestoredCheck {
                    restored: diffs.is_empty(),
                    missing: false,
                    diffs,
                    ignored_fields,
                }
            }
            Err(e) if e.is_not_found() => {
                warn!("{}: NOT FOUND", entry.target);
                RestoredCheck {
                    restored: false,
                    missing: true,
                    diffs: Vec::new(),
                    ignored_fields,
                }
            }
            Err(e) => return Err(e),
        };
        checks.insert(id, check);
    }

    let perfect = checks.values().filter(|c| c.restored).count();
    info!("{} of {} {} restored exactly", perfect, checks.len(), kind.collection());
    Ok(checks)
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_objects(
    prefix: &str,
    expected: &serde_json::Map<String, Value>,
    actual: &serde_json::Map<String, Value>,
    ignore: &BTreeSet<&str>,
    out: &mut Vec<FieldDiff>,
) {
    let keys: BTreeSet<&String> = expected.keys().chain(actual.keys()).collect();
    for key in keys {
        if prefix.is_empty() && ignore.contains(key.as_str()) {
            continue;
        }
        let path = join(prefix, key);
        match (expected.get(key), actual.get(key)) {
            (Some(e), Some(a)) => diff_values(&path, e, a, ignore, out),
            (e, a) => out.push(FieldDiff {
                path,
                expected: e.cloned(),
                actual: a.cloned(),
            }),
        }
    }
}

fn diff_values(
    path: &str,
    expected: &Value,
    actual: &Value,
    ignore: &BTreeSet<&str>,
    out: &mut Vec<FieldDiff>,
) {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => diff_objects(path, e, a, ignore, out),
        (Value::Array(e), Value::Array(a)) => {
            for index in 0..e.len().max(a.len()) {
                let item_path = format!("{}[{}]", path, index);
                match (e.get(index), a.get(index)) {
                    (Some(ei), Some(ai)) => diff_values(&item_path, ei, ai, ignore, out),
                    (ei, ai) => out.push(FieldDiff {
                        path: item_path,
                        expected: ei.cloned(),
                        actual: ai.cloned(),
                    }),
                }
            }
        }
        (e, a) if e != a => out.push(FieldDiff {
            path: path.to_string(),
            expected: Some(e.clone()),
            actual: Some(a.clone()),
        }),
        _ => {}
    }
}
