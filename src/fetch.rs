//! Upstream batch sources.
//!
//! A batch is either a JSON [`FetchBatch`] document or a FASTA file, read from
//! a local path, a `file://` URL or an `http(s)://` URL, optionally gzipped.

use crate::artifacts::{parse_fasta, validate_record};
use crate::error::{AlignError, Result};
use covphylo_protocol::FetchBatch;
use flate2::read::GzDecoder;
use reqwest::blocking::get;
use std::{
    fs::{self, File},
    io::Read,
    path::PathBuf,
    time::UNIX_EPOCH,
};

pub trait BatchSource {
    fn fetch(&self) -> Result<FetchBatch>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    Fasta,
}

impl BatchFormat {
    pub fn infer(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        let lower = lower.strip_suffix(".gz").unwrap_or(&lower);
        if lower.ends_with(".json") {
            Self::Json
        } else {
            Self::Fasta
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBatchSource {
    source: String,
    format: BatchFormat,
    timestamp: Option<i64>,
}

impl FileBatchSource {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            format: BatchFormat::infer(source),
            timestamp: None,
        }
    }

    pub fn with_format(mut self, format: BatchFormat) -> Self {
        self.format = format;
        self
    }

    /// Overrides the request timestamp, e.g. when replaying an old download.
    pub fn with_timestamp(mut self, epoch_secs: i64) -> Self {
        self.timestamp = Some(epoch_secs);
        self
    }

    fn fetch_error(&self, message: impl Into<String>) -> AlignError {
        AlignError::Fetch {
            origin: self.source.clone(),
            message: message.into(),
        }
    }

    /// Fallback timestamp for sources that do not carry one: the file's
    /// modification time, or now for remote sources.
    fn source_timestamp(&self) -> i64 {
        local_path(&self.source)
            .and_then(|p| fs::metadata(p).ok())
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }
}

impl BatchSource for FileBatchSource {
    fn fetch(&self) -> Result<FetchBatch> {
        let mut reader = open_source_reader(&self.source).map_err(|e| self.fetch_error(e))?;
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| self.fetch_error(format!("Could not read: {e}")))?;

        let mut batch = match self.format {
            BatchFormat::Json => serde_json::from_str::<FetchBatch>(&text)
                .map_err(|e| self.fetch_error(format!("Could not parse batch JSON: {e}")))?,
            BatchFormat::Fasta => FetchBatch {
                request_timestamp: self.source_timestamp(),
                records: parse_fasta(text.as_bytes(), &self.source)
                    .map_err(|e| self.fetch_error(e))?,
            },
        };
        for (i, record) in batch.records.iter().enumerate() {
            validate_record(record)
                .map_err(|e| self.fetch_error(format!("Record {}: {e}", i + 1)))?;
        }
        if let Some(ts) = self.timestamp {
            batch.request_timestamp = ts;
        }
        tracing::info!(
            source = %self.source,
            records = batch.records.len(),
            request_timestamp = batch.request_timestamp,
            "Fetched batch"
        );
        Ok(batch)
    }
}

fn is_http_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn is_gzip_source(source: &str) -> bool {
    source.to_ascii_lowercase().ends_with(".gz")
}

fn local_path(source: &str) -> Option<PathBuf> {
    if is_http_source(source) {
        return None;
    }
    Some(PathBuf::from(source.strip_prefix("file://").unwrap_or(source)))
}

fn open_source_reader(source: &str) -> std::result::Result<Box<dyn Read>, String> {
    let reader: Box<dyn Read> = match local_path(source) {
        None => {
            let response = get(source)
                .and_then(|r| r.error_for_status())
                .map_err(|e| format!("Could not fetch: {e}"))?;
            Box::new(response)
        }
        Some(path) => Box::new(
            File::open(&path)
                .map_err(|e| format!("Could not open '{}': {e}", path.display()))?,
        ),
    };
    if is_gzip_source(source) {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(reader)
    }
}
