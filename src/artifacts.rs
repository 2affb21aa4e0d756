//! Deterministic artifact naming and FASTA materialization.
//!
//! Every file belonging to a selection is derived from `(selection, run_id)`,
//! so the head alignment can be located from a ledger alone.

use crate::config::PipelineConfig;
use crate::error::{AlignError, Result};
use crate::run_id::RunId;
use bio::io::fasta;
use covphylo_protocol::Record;
use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Read},
    path::{Path, PathBuf},
};

pub const UNALIGNED_SUFFIX: &str = "unaligned.fasta";
pub const ALIGNED_SUFFIX: &str = "aligned.fasta";

pub fn validate_selection_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AlignError::InvalidInput(
            "Selection name must not be empty".to_string(),
        ));
    }
    if name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(AlignError::InvalidInput(format!(
            "Selection name '{name}' cannot be used as a file name"
        )));
    }
    Ok(())
}

/// `<path>.part`, the name a file is written under before it is renamed
/// into place.
pub fn part_path(path: &Path) -> PathBuf {
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(".part");
    PathBuf::from(tmp)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    fasta_dir: PathBuf,
    tree_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(fasta_dir: impl Into<PathBuf>, tree_dir: impl Into<PathBuf>) -> Self {
        Self {
            fasta_dir: fasta_dir.into(),
            tree_dir: tree_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.fasta_dir(), config.tree_dir())
    }

    pub fn fasta_dir(&self) -> &Path {
        &self.fasta_dir
    }

    pub fn tree_dir(&self) -> &Path {
        &self.tree_dir
    }

    pub fn unaligned_path(&self, selection: &str, run_id: &RunId) -> Result<PathBuf> {
        validate_selection_name(selection)?;
        Ok(self
            .fasta_dir
            .join(format!("{selection}_{run_id}_{UNALIGNED_SUFFIX}")))
    }

    pub fn aligned_path(&self, selection: &str, run_id: &RunId) -> Result<PathBuf> {
        validate_selection_name(selection)?;
        Ok(self
            .fasta_dir
            .join(format!("{selection}_{run_id}_{ALIGNED_SUFFIX}")))
    }

    /// Input file for tree inference; each run gets its own directory because
    /// the tree builder drops several outputs next to its input.
    pub fn tree_input_path(&self, selection: &str, run_id: &RunId) -> Result<PathBuf> {
        validate_selection_name(selection)?;
        let stem = format!("{selection}_{run_id}");
        Ok(self.tree_dir.join(&stem).join(format!("{stem}.fasta")))
    }
}

/// Checks that a record can be written as exactly one FASTA entry whose
/// id reads back unchanged.
pub fn validate_record(record: &Record) -> Result<()> {
    if record.id.is_empty() {
        return Err(AlignError::InvalidInput(
            "Record has an empty identifier".to_string(),
        ));
    }
    if record.id.chars().any(char::is_whitespace) {
        return Err(AlignError::InvalidInput(format!(
            "Record identifier '{}' contains whitespace",
            record.id.escape_debug()
        )));
    }
    if record.description.contains(['\n', '\r']) {
        return Err(AlignError::InvalidInput(format!(
            "Description of record '{}' contains a line break",
            record.id
        )));
    }
    if record.sequence.contains(['\n', '\r', '>']) {
        return Err(AlignError::InvalidInput(format!(
            "Sequence of record '{}' contains a line break or '>'",
            record.id
        )));
    }
    Ok(())
}

/// Header description for a record. A description that starts with the id
/// as a whole word (as NCBI FASTA headers do) does not repeat it.
fn header_description(record: &Record) -> Option<&str> {
    let desc = match record.description.strip_prefix(record.id.as_str()) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        _ => record.description.as_str(),
    }
    .trim();
    if desc.is_empty() { None } else { Some(desc) }
}

pub fn write_fasta(path: &Path, records: &[&Record]) -> Result<()> {
    for record in records {
        validate_record(record)?;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AlignError::artifact_io(parent, e))?;
        }
    }
    let file = File::create(path).map_err(|e| AlignError::artifact_io(path, e))?;
    let mut writer = fasta::Writer::new(BufWriter::new(file));
    for record in records {
        writer
            .write(
                &record.id,
                header_description(record),
                record.sequence.as_bytes(),
            )
            .map_err(|e| AlignError::artifact_io(path, e))?;
    }
    writer.flush().map_err(|e| AlignError::artifact_io(path, e))
}

/// Parses FASTA text into records. The description keeps the whole header
/// line, id included, so keyword filters see what the upstream source wrote.
pub fn parse_fasta<R: Read>(reader: R, origin: &str) -> std::result::Result<Vec<Record>, String> {
    let mut records = vec![];
    for (i, result) in fasta::Reader::new(reader).records().enumerate() {
        let record =
            result.map_err(|e| format!("Could not read FASTA record {} in '{origin}': {e}", i + 1))?;
        if record.id().is_empty() {
            return Err(format!(
                "FASTA record {} in '{origin}' has an empty identifier",
                i + 1
            ));
        }
        let description = match record.desc() {
            Some(desc) => format!("{} {desc}", record.id()),
            None => record.id().to_string(),
        };
        records.push(Record {
            id: record.id().to_string(),
            description,
            sequence: String::from_utf8_lossy(record.seq()).into_owned(),
        });
    }
    Ok(records)
}

pub fn read_fasta(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).map_err(|e| AlignError::artifact_io(path, e))?;
    parse_fasta(file, &path.display().to_string()).map_err(|e| AlignError::artifact_io(path, e))
}
