//! Drives one selection's alignment lineage forward by one run.
//!
//! Order of effects for a run with new records:
//! 1. the unaligned FASTA for `(selection, run_id)` is written,
//! 2. the aligner produces the aligned artifact for `(selection, run_id)`,
//! 3. the ledger is committed.
//!
//! The ledger write is the last step and happens only after the aligner
//! succeeded, so a failed or interrupted run leaves the previous ledger and
//! every previous artifact as they were. If the commit itself fails, the
//! new aligned artifact is removed again so the same run can be retried.

use crate::aligner::{Aligner, MafftAligner};
use crate::artifacts::{ArtifactLayout, validate_record, write_fasta};
use crate::config::PipelineConfig;
use crate::error::{AlignError, Result};
use crate::ledger::{Ledger, LedgerStore, LineageHead};
use crate::run_id::RunId;
use crate::selections::Selection;
use crate::selector::select;
use covphylo_protocol::{AlignmentStrategy, Record, RunReport};
use std::{fs, path::PathBuf, time::Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No relevant record was new; nothing was written and the aligner was
    /// not called.
    NoNewRecords,
    Aligned(RunReport),
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Aligned(report) => Some(report),
            Self::NoNewRecords => None,
        }
    }
}

/// Runs of one selection must be issued sequentially; distinct selections
/// share nothing and may be run from different threads.
pub struct AlignmentOrchestrator<A: Aligner = MafftAligner> {
    layout: ArtifactLayout,
    ledgers: LedgerStore,
    aligner: A,
}

impl AlignmentOrchestrator<MafftAligner> {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config, MafftAligner::from_config(config))
    }
}

impl<A: Aligner> AlignmentOrchestrator<A> {
    pub fn new(config: &PipelineConfig, aligner: A) -> Self {
        Self::with_parts(
            ArtifactLayout::from_config(config),
            LedgerStore::new(config.ledger_dir()),
            aligner,
        )
    }

    pub fn with_parts(layout: ArtifactLayout, ledgers: LedgerStore, aligner: A) -> Self {
        Self {
            layout,
            ledgers,
            aligner,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn ledgers(&self) -> &LedgerStore {
        &self.ledgers
    }

    pub fn aligner(&self) -> &A {
        &self.aligner
    }

    pub fn ledger(&self, selection: &str) -> Result<Ledger> {
        self.ledgers.load(selection)
    }

    /// Path of the newest successful alignment, if the selection has one.
    pub fn head_artifact(&self, selection: &str) -> Result<Option<(RunId, PathBuf)>> {
        match self.ledgers.load(selection)?.head() {
            LineageHead::Bootstrap => Ok(None),
            LineageHead::Incremental(run_id) => {
                let path = self.layout.aligned_path(selection, &run_id)?;
                Ok(Some((run_id, path)))
            }
        }
    }

    pub fn run_alignment(
        &self,
        selection: &Selection,
        run_id: &RunId,
        batch: &[Record],
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let name = selection.name();
        let ledger = self.ledgers.load(name)?;
        let head = ledger.head();

        let selected = select(batch, &ledger, selection.filters());
        if selected.is_empty() {
            tracing::info!(
                selection = name,
                batch = batch.len(),
                already_incorporated = selected.already_incorporated,
                filtered_out = selected.filtered_out,
                "No new records to align"
            );
            return Ok(RunOutcome::NoNewRecords);
        }

        if let LineageHead::Incremental(previous) = &head {
            if run_id <= previous {
                return Err(AlignError::InvalidInput(format!(
                    "Run '{run_id}' of '{name}' is not newer than the current head '{previous}'"
                )));
            }
        }
        for record in &selected.records {
            validate_record(record)?;
        }
        let unaligned = self.layout.unaligned_path(name, run_id)?;
        let aligned = self.layout.aligned_path(name, run_id)?;
        if aligned.exists() {
            return Err(AlignError::RunIdCollision {
                selection: name.to_string(),
                run_id: run_id.to_string(),
                path: aligned.display().to_string(),
            });
        }

        let (strategy, previous_aligned) = match &head {
            LineageHead::Bootstrap => {
                tracing::info!(selection = name, "No previous alignment, aligning from scratch");
                (AlignmentStrategy::FromScratch, None)
            }
            LineageHead::Incremental(previous) => {
                let previous_path = self.layout.aligned_path(name, previous)?;
                if !previous_path.is_file() {
                    return Err(AlignError::artifact_io(
                        &previous_path,
                        format!("alignment of head run '{previous}' is missing"),
                    ));
                }
                tracing::info!(
                    selection = name,
                    previous = %previous,
                    incorporated = ledger.len(),
                    "Adding to previous alignment"
                );
                (
                    AlignmentStrategy::AddToExisting {
                        previous_run_id: previous.to_string(),
                    },
                    Some(previous_path),
                )
            }
        };

        tracing::info!(
            selection = name,
            run_id = %run_id,
            new_records = selected.records.len(),
            "Will align new sequences"
        );
        fs::create_dir_all(self.layout.fasta_dir())
            .map_err(|e| AlignError::artifact_io(self.layout.fasta_dir(), e))?;
        write_fasta(&unaligned, &selected.records)?;

        let aligned_result = match &previous_aligned {
            None => self.aligner.align(&unaligned, &aligned),
            Some(previous_path) => self.aligner.align_add(&unaligned, previous_path, &aligned),
        };
        if let Err(e) = aligned_result {
            tracing::warn!(
                selection = name,
                run_id = %run_id,
                unaligned = %unaligned.display(),
                "Alignment failed, ledger left unchanged: {e}"
            );
            return Err(e);
        }
        if !aligned.is_file() {
            return Err(AlignError::AlignerFailed {
                executable: "aligner".to_string(),
                status: None,
                reason: format!("reported success but '{}' is missing", aligned.display()),
            });
        }

        let new_ids = selected.ids();
        let advanced = ledger.advanced(run_id, new_ids.iter().copied());
        if let Err(e) = self.ledgers.commit_ledger(name, &advanced) {
            // The artifact is not part of the lineage until the ledger names it.
            let _ = fs::remove_file(&aligned);
            tracing::warn!(
                selection = name,
                run_id = %run_id,
                "Ledger commit failed, removed new alignment: {e}"
            );
            return Err(e);
        }

        Ok(RunOutcome::Aligned(RunReport {
            selection: name.to_string(),
            run_id: run_id.to_string(),
            strategy,
            new_record_ids: new_ids.into_iter().map(str::to_string).collect(),
            incorporated_count: advanced.len(),
            unaligned_path: unaligned.display().to_string(),
            aligned_path: aligned.display().to_string(),
            previous_aligned_path: previous_aligned.map(|p| p.display().to_string()),
            duration_ms: start.elapsed().as_millis(),
        }))
    }
}
