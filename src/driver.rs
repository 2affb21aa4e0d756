use crate::aligner::{Aligner, MafftAligner};
use crate::config::PipelineConfig;
use crate::error::{AlignError, Result};
use crate::fetch::BatchSource;
use crate::orchestrator::{AlignmentOrchestrator, RunOutcome};
use crate::run_id::RunId;
use crate::selections::Selection;
use covphylo_protocol::{CycleReport, FetchBatch, Record, SelectionOutcome, SelectionReport};
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Runs every selection once per fetched batch.
pub struct PipelineDriver<A: Aligner = MafftAligner> {
    orchestrator: AlignmentOrchestrator<A>,
    parallel: bool,
}

impl PipelineDriver<MafftAligner> {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(AlignmentOrchestrator::from_config(config))
            .with_parallel(config.parallel_selections)
    }
}

impl<A: Aligner> PipelineDriver<A> {
    pub fn new(orchestrator: AlignmentOrchestrator<A>) -> Self {
        Self {
            orchestrator,
            parallel: false,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn orchestrator(&self) -> &AlignmentOrchestrator<A> {
        &self.orchestrator
    }

    /// Fetches one batch from `source` and runs a cycle over it.
    pub fn run_once(
        &self,
        source: &dyn BatchSource,
        selections: &[Selection],
    ) -> Result<CycleReport> {
        let batch = source.fetch()?;
        self.run_cycle(&batch, selections)
    }

    /// Advances each selection by one run keyed by the batch timestamp.
    ///
    /// Only a bad timestamp or a duplicated selection fails the cycle as a
    /// whole; errors inside a selection end up in its `SelectionOutcome`.
    pub fn run_cycle(&self, batch: &FetchBatch, selections: &[Selection]) -> Result<CycleReport> {
        let run_id = RunId::from_timestamp(batch.request_timestamp)?;
        let mut seen = BTreeSet::new();
        for selection in selections {
            if !seen.insert(selection.name()) {
                return Err(AlignError::InvalidInput(format!(
                    "Selection '{}' is listed more than once",
                    selection.name()
                )));
            }
        }
        tracing::info!(
            run_id = %run_id,
            records = batch.records.len(),
            selections = selections.len(),
            parallel = self.parallel,
            "Starting alignment cycle"
        );

        let records = batch.records.as_slice();
        let reports: Vec<SelectionReport> = if self.parallel {
            selections
                .par_iter()
                .map(|s| self.run_selection(s, &run_id, records))
                .collect()
        } else {
            selections
                .iter()
                .map(|s| self.run_selection(s, &run_id, records))
                .collect()
        };

        let report = CycleReport {
            run_id: run_id.to_string(),
            request_timestamp: batch.request_timestamp,
            record_count: batch.records.len(),
            selections: reports,
        };
        let failed = report.failed_selections();
        if failed.is_empty() {
            tracing::info!(run_id = %run_id, "Alignment cycle completed");
        } else {
            tracing::warn!(run_id = %run_id, failed = ?failed, "Alignment cycle completed with failures");
        }
        Ok(report)
    }

    fn run_selection(&self, selection: &Selection, run_id: &RunId, records: &[Record]) -> SelectionReport {
        let outcome = match self.orchestrator.run_alignment(selection, run_id, records) {
            Ok(RunOutcome::Aligned(report)) => SelectionOutcome::Aligned { report },
            Ok(RunOutcome::NoNewRecords) => SelectionOutcome::NoNewRecords,
            Err(e) => {
                tracing::error!(selection = selection.name(), run_id = %run_id, "Selection failed: {e}");
                SelectionOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        SelectionReport {
            selection: selection.name().to_string(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactLayout;
    use crate::filters::{FilterSet, KeywordFilter};
    use crate::ledger::LedgerStore;
    use crate::orchestrator::testing::RecordingAligner;
    use covphylo_protocol::ErrorKind;
    use std::fs;
    use tempfile::tempdir;

    const T0: i64 = 1_588_291_200; // 2020-05-01 00:00:00 UTC

    fn driver(root: &std::path::Path, aligner: RecordingAligner) -> PipelineDriver<RecordingAligner> {
        PipelineDriver::new(AlignmentOrchestrator::with_parts(
            ArtifactLayout::new(root.join("fasta"), root.join("tree")),
            LedgerStore::new(root.join("fasta")),
            aligner,
        ))
    }

    fn selections() -> Vec<Selection> {
        vec![
            Selection::new("gene_N", FilterSet::new().with(KeywordFilter::all(["(N) gene"])))
                .unwrap(),
            Selection::new("gene_S", FilterSet::new().with(KeywordFilter::all(["(S) gene"])))
                .unwrap(),
        ]
    }

    fn batch(ts: i64, records: &[(&str, &str)]) -> FetchBatch {
        FetchBatch {
            request_timestamp: ts,
            records: records
                .iter()
                .map(|(id, desc)| Record::new(id, desc, "ACGT"))
                .collect(),
        }
    }

    #[test]
    fn test_cycle_reports_each_selection() {
        let td = tempdir().unwrap();
        let driver = driver(td.path(), RecordingAligner::default());
        let report = driver
            .run_cycle(
                &batch(T0, &[("a", "isolate (N) gene"), ("b", "isolate (N) gene")]),
                &selections(),
            )
            .unwrap();
        assert_eq!(report.run_id, "20200501000000");
        assert_eq!(report.record_count, 2);
        assert_eq!(report.selections.len(), 2);
        match &report.selections[0].outcome {
            SelectionOutcome::Aligned { report } => {
                assert_eq!(report.new_record_ids, vec!["a", "b"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.selections[1].outcome, SelectionOutcome::NoNewRecords);
        assert!(report.failed_selections().is_empty());
    }

    #[test]
    fn test_failure_in_one_selection_does_not_stop_others() {
        let td = tempdir().unwrap();
        let driver = driver(td.path(), RecordingAligner::default()).with_parallel(true);
        fs::create_dir_all(td.path().join("fasta")).unwrap();
        fs::write(
            driver.orchestrator().ledgers().path_for("gene_N").unwrap(),
            "{not json",
        )
        .unwrap();

        let report = driver
            .run_cycle(
                &batch(T0, &[("a", "isolate (N) gene"), ("s", "isolate (S) gene")]),
                &selections(),
            )
            .unwrap();
        assert_eq!(report.failed_selections(), vec!["gene_N"]);
        match &report.selections[0].outcome {
            SelectionOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::LedgerCorrupt),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            report.selections[1].outcome,
            SelectionOutcome::Aligned { .. }
        ));
    }

    #[test]
    fn test_repeated_cycles_only_align_new_records() {
        let td = tempdir().unwrap();
        let driver = driver(td.path(), RecordingAligner::default());
        driver
            .run_cycle(&batch(T0, &[("a", "(N) gene")]), &selections())
            .unwrap();
        let second = driver
            .run_cycle(
                &batch(T0 + 3600, &[("a", "(N) gene"), ("b", "(N) gene")]),
                &selections(),
            )
            .unwrap();
        match &second.selections[0].outcome {
            SelectionOutcome::Aligned { report } => {
                assert_eq!(report.new_record_ids, vec!["b"]);
                assert_eq!(report.incorporated_count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(driver.orchestrator().aligner().calls().len(), 2);
    }

    #[test]
    fn test_cycle_level_errors() {
        let td = tempdir().unwrap();
        let driver = driver(td.path(), RecordingAligner::default());
        assert!(matches!(
            driver.run_cycle(&batch(-1, &[]), &selections()),
            Err(AlignError::InvalidInput(_))
        ));

        let mut twice = selections();
        twice.push(twice[0].clone());
        assert!(matches!(
            driver.run_cycle(&batch(T0, &[]), &twice),
            Err(AlignError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_run_once_fetches_from_source() {
        struct Fixed(FetchBatch);
        impl BatchSource for Fixed {
            fn fetch(&self) -> Result<FetchBatch> {
                Ok(self.0.clone())
            }
        }

        let td = tempdir().unwrap();
        let driver = driver(td.path(), RecordingAligner::default());
        let report = driver
            .run_once(&Fixed(batch(T0, &[("s", "(S) gene")])), &selections())
            .unwrap();
        assert_eq!(report.selections[0].outcome, SelectionOutcome::NoNewRecords);
        assert!(matches!(
            report.selections[1].outcome,
            SelectionOutcome::Aligned { .. }
        ));
    }
}
