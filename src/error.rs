use covphylo_protocol::ErrorKind;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Ledger '{path}' is corrupt: {message}")]
    LedgerCorrupt { path: String, message: String },

    #[error("Could not run aligner '{executable}': {message}")]
    AlignerUnavailable { executable: String, message: String },

    #[error("Aligner '{executable}' failed (status={status:?}): {reason}")]
    AlignerFailed {
        executable: String,
        status: Option<i32>,
        reason: String,
    },

    #[error("Artifact I/O failed for '{path}': {message}")]
    ArtifactIo { path: String, message: String },

    #[error("Run '{run_id}' of selection '{selection}' already has an alignment at '{path}'")]
    RunIdCollision {
        selection: String,
        run_id: String,
        path: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not fetch batch from '{origin}': {message}")]
    Fetch { origin: String, message: String },

    #[error("Could not run tree builder '{executable}': {message}")]
    TreeBuilderUnavailable { executable: String, message: String },

    #[error("Tree builder '{executable}' failed (status={status:?}): {reason}")]
    TreeBuilderFailed {
        executable: String,
        status: Option<i32>,
        reason: String,
    },
}

impl AlignError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LedgerCorrupt { .. } => ErrorKind::LedgerCorrupt,
            Self::AlignerUnavailable { .. } => ErrorKind::AlignerUnavailable,
            Self::AlignerFailed { .. } => ErrorKind::AlignerFailed,
            Self::ArtifactIo { .. } => ErrorKind::ArtifactIo,
            Self::RunIdCollision { .. } => ErrorKind::RunIdCollision,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Config(_) => ErrorKind::Config,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::TreeBuilderUnavailable { .. } => ErrorKind::TreeBuilderUnavailable,
            Self::TreeBuilderFailed { .. } => ErrorKind::TreeBuilderFailed,
        }
    }

    pub(crate) fn artifact_io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::ArtifactIo {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn ledger_corrupt(path: &Path, message: impl Into<String>) -> Self {
        Self::LedgerCorrupt {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = AlignError> = std::result::Result<T, E>;
