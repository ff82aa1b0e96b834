use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_KIND: &str = "normal";

/// Parameters of a single ingestion run. Built once, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkProcessingConfiguration {
    pub memory_throttling: bool,
    pub process_rulings: bool,
    pub sets_only: bool,
    /// Empty means every set.
    pub set_codes: Vec<String>,
    pub released_after: Option<NaiveDate>,
    /// How often progress is reported and memory pressure re-checked.
    pub refresh_cadence: Duration,
    pub download_images: bool,
    pub image_kinds: Vec<String>,
    pub workers: usize,
}

impl Default for BulkProcessingConfiguration {
    fn default() -> Self {
        Self {
            memory_throttling: false,
            process_rulings: true,
            sets_only: false,
            set_codes: Vec::new(),
            released_after: None,
            refresh_cadence: Duration::from_secs(1),
            download_images: false,
            image_kinds: vec![DEFAULT_IMAGE_KIND.to_string()],
            workers: 4,
        }
    }
}

impl BulkProcessingConfiguration {
    /// Same configuration restricted to `codes`, used to retry failed sets.
    pub fn retrying(&self, codes: Vec<String>) -> Self {
        Self {
            set_codes: codes,
            ..self.clone()
        }
    }
}

/// Process-wide settings resolved from the command line and environment.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub data_dir: String,
    pub source_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub api_listen: SocketAddr,
    pub log_file: Option<String>,
    pub reset: bool,
    pub permits: usize,
    pub min_interval: Duration,
    pub memory_threshold_bytes: u64,
    pub refresh_interval: Duration,
    pub ingest: BulkProcessingConfiguration,
}

impl Configuration {
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("cardindex.sqlite")
    }

    pub fn blob_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("blobs")
    }
}
