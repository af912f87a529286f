//! One ingestion run: acquire, hash, decode, store, export.
//!
//! Acquisition happens before the store is touched, so a run that never gets
//! a valid snapshot leaves no category tables behind.

use crate::config::{IngestConfig, OutputKind};
use crate::error::{DecodeError, PipelineError};
use crate::export::{write_csv, write_json};
use crate::store::{AcquisitionRecord, IngestionStore};
use crate::tree::HiveDecoder;
use amc_acquire::retry::Sleeper;
use amc_acquire::{AcquisitionOrchestrator, HiveSource, Platform, SourceSelector};
use amc_core::IngestionSummary;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

/// How the operator asked for the hive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    /// Snapshot the live Amcache hive at the configured path
    Live,
    /// Snapshot an offline hive file through the registry
    Offline(PathBuf),
    /// Read a hive file exported earlier, no privileged snapshot
    Exported(PathBuf),
}

impl InputMode {
    pub fn is_live(&self) -> bool {
        matches!(self, InputMode::Live)
    }

    pub fn source(&self, config: &IngestConfig) -> HiveSource {
        let snapshot_of = |path: PathBuf| HiveSource::Snapshot {
            selector: SourceSelector::AppHive { path },
            destination: config.acquisition.snapshot_out.clone(),
        };
        match self {
            InputMode::Live => snapshot_of(config.acquisition.live_hive_path.clone()),
            InputMode::Offline(path) => snapshot_of(path.clone()),
            InputMode::Exported(path) => HiveSource::Exported { path: path.clone() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub summary: IngestionSummary,
    pub sha256: String,
    pub size: u64,
    pub dirty: bool,
    /// Export file and the number of categories or rows written to it
    pub export: Option<(PathBuf, usize)>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn read_all<R: Read + ?Sized>(stream: &mut R) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    stream
        .read_to_end(&mut bytes)
        .map_err(|source| PipelineError::Io {
            op: "read snapshot".to_string(),
            source,
        })?;
    Ok(bytes)
}

pub struct Pipeline<'a> {
    config: &'a IngestConfig,
    platform: &'a dyn Platform,
    decoder: &'a dyn HiveDecoder,
    sleeper: Option<&'a dyn Sleeper>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a IngestConfig,
        platform: &'a dyn Platform,
        decoder: &'a dyn HiveDecoder,
    ) -> Self {
        Self {
            config,
            platform,
            decoder,
            sleeper: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn run(&self, source: &HiveSource) -> Result<RunOutcome, PipelineError> {
        let acquisition_cfg = &self.config.acquisition;
        let mut orchestrator = AcquisitionOrchestrator::new(
            self.platform,
            acquisition_cfg.temp_dir(),
            acquisition_cfg.retry_policy(),
        );
        if let Some(sleeper) = self.sleeper {
            orchestrator = orchestrator.with_sleeper(sleeper);
        }

        let mut acquisition = orchestrator.acquire(source)?;
        let bytes = read_all(acquisition.stream.as_mut())?;
        // Release the snapshot handle (and its temp file) before the long part
        drop(acquisition.stream);

        let sha256 = sha256_hex(&bytes);
        info!(source = %acquisition.source, size = bytes.len(), %sha256, "snapshot read");

        let root = self.decoder.decode(&bytes)?;
        let categories_root = root
            .subpath(&self.config.root_path)
            .ok_or_else(|| DecodeError::MissingPath(self.config.root_path.clone()))?;

        let mut store = IngestionStore::open(&self.config.db_path)?;
        store.record_acquisition(&AcquisitionRecord {
            source: acquisition.source.clone(),
            sha256: sha256.clone(),
            size: bytes.len() as u64,
            acquired_at: Utc::now(),
            dirty: acquisition.dirty,
        })?;

        let summary = store.ingest(categories_root, self.config.search_keys.as_deref())?;

        let export = match (self.config.output, self.config.export_path()) {
            (OutputKind::Json, Some(path)) => {
                let written = write_json(&store, &path)?;
                Some((path, written))
            }
            (OutputKind::Csv, Some(path)) => {
                let written = write_csv(&store, &path)?;
                Some((path, written))
            }
            _ => None,
        };

        Ok(RunOutcome {
            summary,
            sha256,
            size: bytes.len() as u64,
            dirty: acquisition.dirty,
            export,
        })
    }
}
