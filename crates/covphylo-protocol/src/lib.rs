//! Machine-readable contracts shared between the covphylo library, its CLI and
//! anything that consumes the JSON it writes (ledgers, batches, reports).

use serde::{Deserialize, Serialize};

pub type RunIdText = String;

/// One fetched sequence entry. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sequence: String,
}

impl Record {
    pub fn new(id: &str, description: &str, sequence: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            sequence: sequence.to_string(),
        }
    }
}

/// What the upstream fetch client hands over per cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchBatch {
    pub request_timestamp: i64,
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Every keyword must occur in the description.
    All,
    /// At least one keyword must occur.
    Any,
    /// No keyword may occur.
    None,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub mode: FilterMode,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// On-disk form of a selection ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub last_run_id: Option<RunIdText>,
    pub incorporated_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AlignmentStrategy {
    FromScratch,
    AddToExisting { previous_run_id: RunIdText },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub selection: String,
    pub run_id: RunIdText,
    pub strategy: AlignmentStrategy,
    pub new_record_ids: Vec<String>,
    pub incorporated_count: usize,
    pub unaligned_path: String,
    pub aligned_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_aligned_path: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LedgerCorrupt,
    AlignerUnavailable,
    AlignerFailed,
    ArtifactIo,
    RunIdCollision,
    InvalidInput,
    Config,
    Fetch,
    TreeBuilderUnavailable,
    TreeBuilderFailed,
}

impl ErrorKind {
    /// Whether re-invoking the same run later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AlignerFailed | Self::ArtifactIo | Self::Fetch | Self::TreeBuilderFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SelectionOutcome {
    Aligned { report: RunReport },
    NoNewRecords,
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub selection: String,
    pub outcome: SelectionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub run_id: RunIdText,
    pub request_timestamp: i64,
    pub record_count: usize,
    pub selections: Vec<SelectionReport>,
}

impl CycleReport {
    pub fn failed_selections(&self) -> Vec<&str> {
        self.selections
            .iter()
            .filter(|s| matches!(s.outcome, SelectionOutcome::Failed { .. }))
            .map(|s| s.selection.as_str())
            .collect()
    }
}
