//! Results storage and retrieval
//!
//! Persists one JSON record per run under `<results dir>/<board SN>/<run id>.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::executor::DialoguePass;
use crate::models::{NetworkIdentity, TestReport};

/// Outcome of flashing the deploy image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum DeployStatus {
    NotAttempted,
    Programmed,
    Failed(String),
}

/// Wall-clock time spent in one phase of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTiming {
    pub phase: String,
    pub duration_ms: u64,
}

/// Station environment a run was executed on
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub tool_version: String,
    pub serial_port: String,
}

impl EnvironmentInfo {
    pub fn new(serial_port: impl Into<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            serial_port: serial_port.into(),
        }
    }
}

/// Everything recorded about one unit's run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique run ID
    pub id: String,

    pub board_sn: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Overall verdict, mirrors `report.passed`
    pub passed: bool,

    pub report: TestReport,

    /// Test pass followed by the store pass
    pub passes: Vec<DialoguePass>,

    /// Identity committed by the store pass
    pub deployed: NetworkIdentity,

    pub deploy_image: PathBuf,

    pub deploy: DeployStatus,

    /// Rendered certificate, if rendering succeeded
    pub report_path: Option<PathBuf>,

    /// Non-fatal problems met after judgement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    pub phases: Vec<PhaseTiming>,

    pub environment: EnvironmentInfo,
}

impl RunRecord {
    pub fn new(
        started_at: DateTime<Utc>,
        report: TestReport,
        passes: Vec<DialoguePass>,
        deployed: NetworkIdentity,
        environment: EnvironmentInfo,
    ) -> Self {
        Self {
            id: generate_run_id(),
            board_sn: report.board.board_sn.clone(),
            started_at,
            completed_at: Utc::now(),
            passed: report.passed,
            report,
            passes,
            deployed,
            deploy_image: PathBuf::new(),
            deploy: DeployStatus::NotAttempted,
            report_path: None,
            notes: Vec::new(),
            phases: Vec::new(),
            environment,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    /// Create a new results storage
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Serial numbers are used as directory names
    fn board_dir(&self, board_sn: &str) -> PathBuf {
        self.base_dir.join(board_sn.replace(['/', '\\'], "_"))
    }

    fn run_path(&self, board_sn: &str, run_id: &str) -> PathBuf {
        self.board_dir(board_sn).join(format!("{run_id}.json"))
    }

    /// Save a run record
    pub fn save(&self, run: &RunRecord) -> Result<PathBuf> {
        let board_dir = self.board_dir(&run.board_sn);
        fs::create_dir_all(&board_dir)
            .with_context(|| format!("Failed to create {}", board_dir.display()))?;

        let path = self.run_path(&run.board_sn, &run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved run record to {}", path.display());
        Ok(path)
    }

    /// Load one run of a board
    pub fn load(&self, board_sn: &str, run_id: &str) -> Result<RunRecord> {
        let path = self.run_path(board_sn, run_id);
        let run = self.load_from_path(&path)?;
        debug!("Loaded run record from {}", path.display());
        Ok(run)
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<RunRecord> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open results file {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// All runs of a board, newest first
    pub fn load_board(&self, board_sn: &str) -> Result<Vec<RunRecord>> {
        let board_dir = self.board_dir(board_sn);
        if !board_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&board_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => debug!("Failed to load {}: {}", path.display(), e),
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// List all boards with results
    pub fn list_boards(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut boards = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    boards.push(name.to_string());
                }
            }
        }

        boards.sort();
        Ok(boards)
    }

    /// Brief listing of a board's runs, newest first
    pub fn list_runs(&self, board_sn: &str) -> Result<Vec<RunInfo>> {
        Ok(self
            .load_board(board_sn)?
            .into_iter()
            .map(|run| RunInfo {
                id: run.id,
                started_at: run.started_at,
                passed: run.passed,
                deployed_ip: run.deployed.ip,
                failed: run
                    .report
                    .failed_subsystems()
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect(),
            })
            .collect())
    }

    /// Latest run of a board
    pub fn latest(&self, board_sn: &str) -> Result<Option<RunRecord>> {
        let runs = self.load_board(board_sn)?;
        Ok(runs.into_iter().next())
    }

    /// Delete a run
    pub fn delete(&self, board_sn: &str, run_id: &str) -> Result<()> {
        let path = self.run_path(board_sn, run_id);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Deleted results: {}", path.display());
        }
        Ok(())
    }

    /// Export run to a file
    pub fn export(&self, run: &RunRecord, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record([
                    "run_id",
                    "board_sn",
                    "subsystem",
                    "status",
                    "key",
                    "value",
                    "passed",
                    "details",
                ])?;

                for result in run.report.subsystems() {
                    for m in &result.measurements {
                        let details: Vec<String> = m
                            .attributes
                            .iter()
                            .map(|(k, v)| format!("{k}={v}"))
                            .collect();
                        writer.write_record([
                            run.id.clone(),
                            run.board_sn.clone(),
                            result.subsystem.key().to_string(),
                            result.status.to_string(),
                            m.key.clone(),
                            m.value.to_string(),
                            m.passed.to_string(),
                            details.join(";"),
                        ])?;
                    }
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub passed: bool,
    pub deployed_ip: String,
    pub failed: Vec<String>,
}

/// Export format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;
    use crate::models::Subsystem;
    use tempfile::TempDir;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert!(!id1.is_empty());
        assert_eq!(id1.len(), id2.len());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = record("CN00001", true);

        let path = storage.save(&run).unwrap();
        assert!(path.starts_with(dir.path().join("CN00001")));

        let loaded = storage.load("CN00001", &run.id).unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.report.board, run.report.board);
        assert_eq!(loaded.report.feram.pattern, "DEADBEEF");
        assert_eq!(loaded.deployed.ip, "10.0.18.201");
        assert!(loaded.passed);
    }

    #[test]
    fn test_list_and_latest() {
        let dir = TempDir::new().unwrap();
        let storage = ResultsStorage::new(dir.path());

        let mut older = record("CN00002", false);
        older.id = "older".to_string();
        older.started_at = Utc::now() - chrono::Duration::hours(1);
        let mut newer = record("CN00002", true);
        newer.id = "newer".to_string();
        storage.save(&older).unwrap();
        storage.save(&newer).unwrap();
        storage.save(&record("CN00001", true)).unwrap();

        assert_eq!(storage.list_boards().unwrap(), vec!["CN00001", "CN00002"]);

        let runs = storage.list_runs("CN00002").unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, "newer");
        assert_eq!(runs[1].failed, vec!["LED".to_string()]);

        let latest = storage.latest("CN00002").unwrap().unwrap();
        assert_eq!(latest.id, "newer");
        assert!(storage.latest("CN99999").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = record("CN00003", true);
        storage.save(&run).unwrap();

        storage.delete("CN00003", &run.id).unwrap();
        assert!(storage.list_runs("CN00003").unwrap().is_empty());
    }

    #[test]
    fn test_export_csv_one_row_per_measurement() {
        let dir = TempDir::new().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = record("CN00004", true);
        let path = dir.path().join("export.csv");

        storage.export(&run, &path, ExportFormat::Csv).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(&rows[0][2], "led");
        assert_eq!(&rows[0][7], "threshold=0.5");
    }

    #[test]
    fn test_export_json_round_trips() {
        let dir = TempDir::new().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = record("CN00005", false);
        let path = dir.path().join("export.json");

        storage.export(&run, &path, ExportFormat::Json).unwrap();
        let loaded = storage.load_from_path(&path).unwrap();
        assert_eq!(loaded.report.failed_subsystems(), vec![Subsystem::Led]);
        assert!(!loaded.passed);
    }

    #[test]
    fn test_export_format() {
        assert_eq!(ExportFormat::from_str("JSON"), Some(ExportFormat::Json));
        assert_eq!(
            ExportFormat::from_extension(Path::new("out.csv")),
            Some(ExportFormat::Csv)
        );
        assert!(ExportFormat::from_str("xml").is_none());
    }
}
