use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{
    Authorization, DeletionMode, DeletionRequest, DeletionResult, DependencyReport, TargetResult,
};
use crate::core::error::{PurgeError, Result};
use crate::core::resource::ResourceKind;
use crate::utils::file_stamp;

const JOURNAL_SUFFIX: &str = ".partial.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalHeader {
    run_id: Uuid,
    request: DeletionRequest,
    environment_url: String,
    started_at: DateTime<Utc>,
    authorization: Authorization,
    dependency_reports: Vec<DependencyReport>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
enum JournalEntry {
    Header(JournalHeader),
    Target(TargetResult),
}

/// `<dir>/<collection>_deletion_<dryrun|live>_<stamp>_<run>.json`
pub fn deletion_artifact_path(
    dir: &Path,
    kind: ResourceKind,
    mode: DeletionMode,
    run_id: Uuid,
) -> PathBuf {
    let run = run_id.simple().to_string();
    dir.join(format!(
        "{}_deletion_{}_{}_{}.json",
        kind.collection(),
        mode.file_tag(),
        file_stamp(Local::now()),
        &run[..8]
    ))
}

/// `<dir>/<command>_<detail>_<stamp>.json` for search and verification reports.
pub fn report_path(dir: &Path, command: &str, detail: &str) -> PathBuf {
    dir.join(format!("{}_{}_{}.json", command, detail, file_stamp(Local::now())))
}

pub fn journal_path_for(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(JOURNAL_SUFFIX);
    PathBuf::from(name)
}

/// Writes a pretty JSON document, creating parent directories.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Loads a finished artifact, or rebuilds a partial one from its journal.
pub fn load_result(path: &Path) -> Result<DeletionResult> {
    if path.to_string_lossy().ends_with(JOURNAL_SUFFIX) {
        return ArtifactWriter::recover(path);
    }
    let file = File::open(path).map_err(|e| {
        PurgeError::Artifact(format!("cannot open {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Journals outcomes as they happen and writes the final artifact exactly once.
pub struct ArtifactWriter {
    path: PathBuf,
    journal_path: PathBuf,
    journal: Option<BufWriter<File>>,
}

impl ArtifactWriter {
    pub fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            return Err(PurgeError::Artifact(format!(
                "artifact already exists: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let journal_path = journal_path_for(&path);
        Ok(Self {
            path,
            journal_path,
            journal: None,
        })
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Opens the journal and writes the run header.
    pub fn begin(&mut self, result: &DeletionResult) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.journal_path)?;
        self.journal = Some(BufWriter::new(file));
        self.append(&JournalEntry::Header(JournalHeader {
            run_id: result.run_id,
            request: result.request.clone(),
            environment_url: result.environment_url.clone(),
            started_at: result.started_at,
            authorization: result.authorization.clone(),
            dependency_reports: result.dependency_reports.clone(),
        }))
    }

    pub fn record(&mut self, entry: &TargetResult) -> Result<()> {
        self.append(&JournalEntry::Target(entry.clone()))
    }

    fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let Some(journal) = self.journal.as_mut() else {
            return Ok(());
        };
        serde_json::to_writer(&mut *journal, entry)?;
        journal.write_all(b"\n")?;
        journal.flush()?;
        Ok(())
    }

    /// Writes the artifact (never overwriting) and drops the journal.
    pub fn finalize(mut self, result: &DeletionResult) -> Result<PathBuf> {
        let file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PurgeError::Artifact(format!(
                    "refusing to overwrite {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, result)?;
        writer.flush()?;

        if self.journal.take().is_some() {
            if let Err(e) = fs::remove_file(&self.journal_path) {
                warn!("could not remove journal {}: {}", self.journal_path.display(), e);
            }
        }
        info!("Results saved to: {}", self.path.display());
        Ok(self.path)
    }

    /// Rebuilds a result from a journal left by an interrupted run.
    /// A torn final line is dropped; the result has no `finished_at`.
    pub fn recover(journal: &Path) -> Result<DeletionResult> {
        let file = File::open(journal).map_err(|e| {
            PurgeError::Artifact(format!("cannot open journal {}: {}", journal.display(), e))
        })?;
        let lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;
        let last = lines.len().saturating_sub(1);

        let mut result: Option<DeletionResult> = None;
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) if index == last => {
                    warn!("dropping torn journal line {}: {}", index + 1, e);
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            match (entry, result.as_mut()) {
                (JournalEntry::Header(header), None) => {
                    let mut recovered = DeletionResult::new(header.request, header.environment_url);
                    recovered.run_id = header.run_id;
                    recovered.started_at = header.started_at;
                    recovered.authorization = header.authorization;
                    recovered.dependency_reports = header.dependency_reports;
                    result = Some(recovered);
                }
                (JournalEntry::Target(entry), Some(recovered)) => recovered.outcomes.push(entry),
                (JournalEntry::Header(_), Some(_)) => {
                    return Err(PurgeError::Artifact("journal has two headers".to_string()));
                }
                (JournalEntry::Target(_), None) => {
                    return Err(PurgeError::Artifact(
                        "journal entry before header".to_string(),
                    ));
                }
            }
        }

        let mut recovered = result
            .ok_or_else(|| PurgeError::Artifact(format!("empty journal {}", journal.display())))?;
        recovered.summary = recovered.compute_summary();
        debug!(
            "recovered {} outcome(s) from {}",
            recovered.outcomes.len(),
            journal.display()
        );
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{Record, ResourceRef};
    use crate::toolkit::deletion::models::{DRY_RUN_REASON, PostCondition};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_result() -> DeletionResult {
        let request =
            DeletionRequest::new(ResourceKind::Control, [100, 101], DeletionMode::Live, false);
        let mut result = DeletionResult::new(request, "https://acme-sandbox.example.com");
        result.authorization = Authorization::Authorized;
        result
    }

    #[test]
    fn test_artifact_file_name() {
        let path = deletion_artifact_path(
            Path::new("results"),
            ResourceKind::Control,
            DeletionMode::DryRun,
            Uuid::new_v4(),
        );
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("controls_deletion_dryrun_"));
        assert!(name.ends_with(".json"));
        assert_eq!(
            journal_path_for(&path).file_name().unwrap().to_string_lossy(),
            format!("{}.partial.jsonl", name)
        );
    }

    #[test]
    fn test_finalize_writes_once_and_removes_journal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("controls.json");
        let mut result = sample_result();

        let mut writer = ArtifactWriter::create(path.clone()).unwrap();
        writer.begin(&result).unwrap();
        let target = ResourceRef::new(ResourceKind::Control, 100);
        let entry = TargetResult::skipped(target, DRY_RUN_REASON);
        writer.record(&entry).unwrap();
        let journal = writer.journal_path().to_path_buf();
        assert!(journal.exists());

        result.outcomes.push(entry);
        result.finish();
        let written = writer.finalize(&result).unwrap();
        assert_eq!(written, path);
        assert!(!journal.exists());

        let loaded = load_result(&path).unwrap();
        assert_eq!(loaded, result);

        assert!(matches!(
            ArtifactWriter::create(path),
            Err(PurgeError::Artifact(_))
        ));
    }

    #[test]
    fn test_finalize_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("controls.json");
        let writer = ArtifactWriter::create(path.clone()).unwrap();
        fs::write(&path, "{}").unwrap();

        let err = writer.finalize(&sample_result()).unwrap_err();
        assert!(matches!(err, PurgeError::Artifact(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_recover_interrupted_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("controls.json");
        let result = sample_result();

        let mut writer = ArtifactWriter::create(path).unwrap();
        writer.begin(&result).unwrap();
        let snapshot = Record::from_value(json!({"id": 100, "uid": "CC-1"})).unwrap();
        writer
            .record(&TargetResult::succeeded(
                ResourceRef::new(ResourceKind::Control, 100),
                snapshot,
                PostCondition::NotApplicable,
            ))
            .unwrap();
        let journal = writer.journal_path().to_path_buf();
        drop(writer);

        let mut file = OpenOptions::new().append(true).open(&journal).unwrap();
        write!(file, "{{\"entry\":\"target\",\"tar").unwrap();

        let recovered = load_result(&journal).unwrap();
        assert_eq!(recovered.run_id, result.run_id);
        assert_eq!(recovered.outcomes.len(), 1);
        assert_eq!(recovered.summary.succeeded, 1);
        assert!(recovered.finished_at.is_none());
        assert_eq!(
            recovered.outcomes[0].snapshot.as_ref().and_then(|s| s.uid()),
            Some("CC-1")
        );
    }

    #[test]
    fn test_load_missing_artifact() {
        let err = load_result(Path::new("/nope/missing.json")).unwrap_err();
        assert!(matches!(err, PurgeError::Artifact(_)));
    }
}
