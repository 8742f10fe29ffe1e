use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::models::TargetSelector;
use crate::core::error::{PurgeError, Result};
use crate::core::resource::{ListFilter, ResourceKind};
use crate::db::ResourceApi;
use crate::toolkit::discovery::{Matcher, search};

/// Operator's choice of targets, before resolution against the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Ids(Vec<i64>),
    IdsFile(PathBuf),
    Pattern {
        pattern: String,
        regex: bool,
        case_sensitive: bool,
    },
    Region(i64),
}

impl TargetSpec {
    /// Resolves to concrete ids of `kind`, plus the selector kept in the artifact.
    pub async fn resolve(
        &self,
        api: &dyn ResourceApi,
        kind: ResourceKind,
    ) -> Result<(Vec<i64>, TargetSelector)> {
        match self {
            Self::Ids(ids) => Ok((ids.clone(), TargetSelector::Ids)),
            Self::IdsFile(path) => Ok((
                read_ids_file(path)?,
                TargetSelector::IdsFile { path: path.clone() },
            )),
            Self::Pattern {
                pattern,
                regex,
                case_sensitive,
            } => {
                let matcher = if *regex {
                    Matcher::regex(pattern, *case_sensitive)?
                } else {
                    Matcher::substring(pattern, *case_sensitive)
                };
                let report = search(api, kind, &matcher).await?;
                Ok((
                    report.ids(),
                    TargetSelector::Pattern {
                        pattern: pattern.clone(),
                        regex: *regex,
                        case_sensitive: *case_sensitive,
                    },
                ))
            }
            Self::Region(region_id) => {
                let selector = TargetSelector::Region {
                    region_id: *region_id,
                };
                match kind {
                    ResourceKind::Region => Ok((vec![*region_id], selector)),
                    ResourceKind::Entity | ResourceKind::Process => {
                        let filter = ListFilter::new("region_id", *region_id);
                        let ids: Vec<i64> = api
                            .list(kind, Some(&filter))
                            .await?
                            .iter()
                            .filter_map(|r| r.id())
                            .collect();
                        info!("Region {} holds {} {}", region_id, ids.len(), kind.collection());
                        Ok((ids, selector))
                    }
                    ResourceKind::Subprocess | ResourceKind::Control => {
                        Err(PurgeError::Configuration(format!(
                            "--region-id cannot select {}",
                            kind.collection()
                        )))
                    }
                }
            }
        }
    }
}

/// Reads a JSON array of ids, e.g. `[100, 101, 102]`.
pub fn read_ids_file(path: &Path) -> Result<Vec<i64>> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PurgeError::Configuration(format!("cannot read ids file {}: {}", path.display(), e))
    })?;
    let ids: Vec<i64> = serde_json::from_str(&raw).map_err(|e| {
        PurgeError::Configuration(format!(
            "ids file {} must be a JSON array of integers: {}",
            path.display(),
            e
        ))
    })?;
    if ids.is_empty() {
        warn!("ids file {} is empty", path.display());
    }
    Ok(ids)
}

/// Parses `{"25": "Entity 25"}` into id -> expected name.
pub fn parse_expected_names(raw: &str) -> Result<HashMap<i64, String>> {
    let names: HashMap<String, String> = serde_json::from_str(raw)
        .map_err(|e| PurgeError::Configuration(format!("invalid names JSON: {}", e)))?;
    names
        .into_iter()
        .map(|(id, name)| {
            id.trim()
                .parse::<i64>()
                .map(|id| (id, name))
                .map_err(|_| {
                    PurgeError::Configuration(format!("invalid id in names JSON: {:?}", id))
                })
        })
        .collect()
}
