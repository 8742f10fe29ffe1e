use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::core::resource::{LinkKind, Record, ResourceKind};
use crate::db::{ApiError, ResourceApi};
use crate::utils::safe_truncate_ellipsis;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub entities: usize,
    pub processes_data: usize,
    pub processes: usize,
    pub subprocesses_data: usize,
    pub subprocesses: usize,
    pub controls: usize,
    pub controls_data: usize,
    /// Entities, processes, subprocesses and controls; link rows are not counted.
    pub total_items: usize,
}

/// Everything that deleting a region would remove, walked top-down.
#[derive(Debug, Clone, Serialize)]
pub struct RegionAnalysis {
    pub region_id: i64,
    pub analyzed_at: DateTime<Utc>,
    pub region: Option<Record>,
    pub entities: Vec<Record>,
    pub processes_data: Vec<Record>,
    pub processes: Vec<Record>,
    pub subprocesses_data: Vec<Record>,
    pub subprocesses: Vec<Record>,
    pub controls: Vec<Record>,
    pub controls_data: Vec<Record>,
    pub summary: RegionSummary,
}

impl RegionAnalysis {
    fn empty(region_id: i64) -> Self {
        Self {
            region_id,
            analyzed_at: Utc::now(),
            region: None,
            entities: Vec::new(),
            processes_data: Vec::new(),
            processes: Vec::new(),
            subprocesses_data: Vec::new(),
            subprocesses: Vec::new(),
            controls: Vec::new(),
            controls_data: Vec::new(),
            summary: RegionSummary::default(),
        }
    }

    fn summarize(&mut self) {
        let name = self
            .region
            .as_ref()
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| "N/A".to_string());
        self.summary = RegionSummary {
            region: format!("Region {} - {}", self.region_id, name),
            entities: self.entities.len(),
            processes_data: self.processes_data.len(),
            processes: self.processes.len(),
            subprocesses_data: self.subprocesses_data.len(),
            subprocesses: self.subprocesses.len(),
            controls: self.controls.len(),
            controls_data: self.controls_data.len(),
            total_items: self.entities.len()
                + self.processes.len()
                + self.subprocesses.len()
                + self.controls.len(),
        };
    }
}

fn ids_of(records: &[Record], field: &str) -> Vec<i64> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| r.int_field(field))
        .filter(|id| seen.insert(*id))
        .collect()
}

fn keep_by_field(records: Vec<Record>, field: &str, wanted: &HashSet<i64>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| r.int_field(field).is_some_and(|v| wanted.contains(&v)))
        .collect()
}

/// Region -> entities -> processes_data -> processes -> subprocesses_data -> subprocesses
/// -> controls -> controls_data.
/// A missing region yields an empty analysis.
pub async fn analyze_region(
    api: &dyn ResourceApi,
    region_id: i64,
) -> Result<RegionAnalysis, ApiError> {
    info!("REGION ANALYSIS - Region {}", region_id);
    let mut analysis = RegionAnalysis::empty(region_id);

    match api.get(ResourceKind::Region, region_id).await {
        Ok(region) => {
            info!("1. Region {}: {}", region_id, region.display_name());
            analysis.region = Some(region);
        }
        Err(e) if e.is_not_found() => {
            warn!("Region {} not found", region_id);
            analysis.summarize();
            return Ok(analysis);
        }
        Err(e) => return Err(e),
    }

    let region_set = HashSet::from([region_id]);
    analysis.entities = keep_by_field(
        api.list(ResourceKind::Entity, None).await?,
        "region_id",
        &region_set,
    );
    info!("2. Entities: {}", analysis.entities.len());
    if analysis.entities.is_empty() {
        warn!("No entities found in region {}", region_id);
    }

    let entity_ids: HashSet<i64> = ids_of(&analysis.entities, "id").into_iter().collect();
    if !entity_ids.is_empty() {
        analysis.processes_data =
            keep_by_field(
                api.list_links(LinkKind::ProcessesData, None).await?,
                "entity_id",
                &entity_ids,
            );
    }
    info!("3. processes_data links: {}", analysis.processes_data.len());

    let process_ids = ids_of(&analysis.processes_data, "process_id");
    if !process_ids.is_empty() {
        let wanted: HashSet<i64> = process_ids.iter().copied().collect();
        analysis.processes =
            keep_by_field(api.list(ResourceKind::Process, None).await?, "id", &wanted);
    }
    info!("4. Processes: {}", analysis.processes.len());

    let datum_ids: HashSet<i64> = ids_of(&analysis.processes_data, "id").into_iter().collect();
    if !datum_ids.is_empty() {
        analysis.subprocesses_data = keep_by_field(
            api.list_links(LinkKind::SubprocessesData, None).await?,
            "processes_datum_id",
            &datum_ids,
        );
    }
    info!("5. subprocesses_data links: {}", analysis.subprocesses_data.len());

    let subprocess_ids: HashSet<i64> = ids_of(&analysis.subprocesses_data, "subprocess_id")
        .into_iter()
        .collect();
    if !subprocess_ids.is_empty() {
        analysis.subprocesses =
            keep_by_field(api.list(ResourceKind::Subprocess, None).await?, "id", &subprocess_ids);
        analysis.controls = keep_by_field(
            api.list(ResourceKind::Control, None).await?,
            "subprocess_id",
            &subprocess_ids,
        );
    }
    info!("6. Subprocesses: {}", analysis.subprocesses.len());
    info!("7. Controls: {}", analysis.controls.len());
    for control in analysis.controls.iter().take(5) {
        info!(
            "   - {}: {}",
            control.uid().unwrap_or("N/A"),
            safe_truncate_ellipsis(control.name().unwrap_or("N/A"), 50)
        );
    }
    if analysis.controls.len() > 5 {
        info!("   ... and {} more", analysis.controls.len() - 5);
    }

    let control_ids: HashSet<i64> = ids_of(&analysis.controls, "id").into_iter().collect();
    if !control_ids.is_empty() {
        analysis.controls_data =
            keep_by_field(
                api.list_links(LinkKind::ControlsData, None).await?,
                "control_id",
                &control_ids,
            );
    }
    info!("8. controls_data instances: {}", analysis.controls_data.len());

    analysis.summarize();
    info!("Total items: {}", analysis.summary.total_items);
    if analysis.summary.total_items > 0 {
        warn!("Deleting this region would permanently remove all of the data above");
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ErrorClass;
    use crate::db::fake::FakeApi;
    use serde_json::json;

    fn region_15() -> FakeApi {
        FakeApi::sandbox()
            .with(ResourceKind::Region, json!({"id": 15, "name": "EMEA"}))
            .with(ResourceKind::Entity, json!({"id": 25, "name": "Acme GmbH", "region_id": 15}))
            .with(ResourceKind::Entity, json!({"id": 26, "name": "Elsewhere", "region_id": 16}))
            .with_link(
                LinkKind::ProcessesData,
                json!({"id": 500, "entity_id": 25, "process_id": 40}),
            )
            .with_link(
                LinkKind::ProcessesData,
                json!({"id": 501, "entity_id": 26, "process_id": 41}),
            )
            .with(ResourceKind::Process, json!({"id": 40, "uid": "P-40", "name": "Finance"}))
            .with(ResourceKind::Process, json!({"id": 41, "uid": "P-41", "name": "HR"}))
            .with_link(
                LinkKind::SubprocessesData,
                json!({"id": 600, "processes_datum_id": 500, "subprocess_id": 8}),
            )
            .with(ResourceKind::Subprocess, json!({"id": 8, "uid": "SP-8", "process_id": 40}))
            .with(ResourceKind::Control, json!({"id": 100, "uid": "CC-100", "subprocess_id": 8}))
            .with(ResourceKind::Control, json!({"id": 101, "uid": "CC-101", "subprocess_id": 8}))
            .with(ResourceKind::Control, json!({"id": 102, "uid": "CC-102", "subprocess_id": 9}))
            .with_link(
                LinkKind::ControlsData,
                json!({"id": 700, "control_id": 100, "subprocesses_datum_id": 600}),
            )
    }

    #[tokio::test]
    async fn test_analyze_walks_the_hierarchy() {
        let api = region_15();
        let analysis = analyze_region(&api, 15).await.unwrap();

        assert_eq!(
            analysis.summary,
            RegionSummary {
                region: "Region 15 - EMEA".to_string(),
                entities: 1,
                processes_data: 1,
                processes: 1,
                subprocesses_data: 1,
                subprocesses: 1,
                controls: 2,
                controls_data: 1,
                total_items: 5,
            }
        );
        assert_eq!(analysis.processes[0].uid(), Some("P-40"));
    }

    #[tokio::test]
    async fn test_missing_region_is_empty() {
        let api = FakeApi::sandbox();
        let analysis = analyze_region(&api, 99).await.unwrap();
        assert!(analysis.region.is_none());
        assert_eq!(analysis.summary.total_items, 0);
        assert_eq!(analysis.summary.region, "Region 99 - N/A");
    }

    #[tokio::test]
    async fn test_list_errors_propagate() {
        let api = region_15().fail_list(ResourceKind::Entity, 502);
        let err = analyze_region(&api, 15).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::ServerError);
    }
}
