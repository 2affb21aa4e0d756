//! Tree inference over the aligned artifacts.
//!
//! A tree is built from a subset of the alignment: the `n` records with the
//! fewest gap characters, copied into a per-run directory under the tree
//! directory because the tree builder writes its outputs next to its input.

use crate::artifacts::{ArtifactLayout, read_fasta, write_fasta};
use crate::config::PipelineConfig;
use crate::error::{AlignError, Result};
use crate::external::{ExternalError, path_arg, run_external, stderr_tail};
use crate::run_id::RunId;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

const GAP: char = '-';
const TREEFILE_SUFFIX: &str = ".treefile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeSelectionReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub available: usize,
    pub selected_ids: Vec<String>,
    pub gap_counts: Vec<usize>,
}

pub fn gap_count(sequence: &str) -> usize {
    sequence.chars().filter(|c| *c == GAP).count()
}

/// Copies the `n` least gapped records of `aligned` into `destination`.
/// Ties keep alignment order.
pub fn select_least_gapped(
    aligned: &Path,
    n: usize,
    destination: &Path,
) -> Result<GenomeSelectionReport> {
    if n == 0 {
        return Err(AlignError::InvalidInput(
            "Number of genomes to select must be at least 1".to_string(),
        ));
    }
    let records = read_fasta(aligned)?;
    let chosen = records
        .iter()
        .map(|r| (r, gap_count(&r.sequence)))
        .sorted_by_key(|(_, gaps)| *gaps)
        .take(n)
        .collect::<Vec<_>>();
    if chosen.is_empty() {
        return Err(AlignError::InvalidInput(format!(
            "Alignment '{}' contains no records",
            aligned.display()
        )));
    }

    let selected = chosen.iter().map(|(r, _)| *r).collect::<Vec<_>>();
    write_fasta(destination, &selected)?;
    tracing::info!(
        source = %aligned.display(),
        destination = %destination.display(),
        selected = selected.len(),
        available = records.len(),
        "Selected least gapped genomes"
    );
    Ok(GenomeSelectionReport {
        source: aligned.to_path_buf(),
        destination: destination.to_path_buf(),
        available: records.len(),
        selected_ids: selected.iter().map(|r| r.id.clone()).collect(),
        gap_counts: chosen.iter().map(|(_, gaps)| *gaps).collect(),
    })
}

/// [`select_least_gapped`] with paths taken from the artifact layout.
pub fn select_genomes_for_run(
    layout: &ArtifactLayout,
    selection: &str,
    run_id: &RunId,
    n: usize,
) -> Result<GenomeSelectionReport> {
    let aligned = layout.aligned_path(selection, run_id)?;
    let destination = layout.tree_input_path(selection, run_id)?;
    select_least_gapped(&aligned, n, &destination)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeReport {
    pub alignment: PathBuf,
    pub treefile: PathBuf,
    pub command: Vec<String>,
    pub duration_ms: u128,
}

pub trait TreeBuilder {
    fn infer(&self, alignment: &Path) -> Result<TreeReport>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqTree {
    executable: String,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl IqTree {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            extra_args: vec![],
            timeout: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.iqtree_executable()).with_timeout(config.tree_timeout())
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn treefile_path(alignment: &Path) -> PathBuf {
        let mut path = alignment.as_os_str().to_owned();
        path.push(TREEFILE_SUFFIX);
        PathBuf::from(path)
    }

    fn failed(&self, status: Option<i32>, reason: String) -> AlignError {
        AlignError::TreeBuilderFailed {
            executable: self.executable.clone(),
            status,
            reason,
        }
    }
}

impl TreeBuilder for IqTree {
    fn infer(&self, alignment: &Path) -> Result<TreeReport> {
        if !alignment.is_file() {
            return Err(AlignError::InvalidInput(format!(
                "Tree input '{}' does not exist",
                alignment.display()
            )));
        }
        let mut args = self.extra_args.clone();
        args.push("-s".to_string());
        args.push(path_arg(alignment));
        tracing::info!(executable = %self.executable, args = ?args, "Executing tree inference");

        let out = run_external(&self.executable, &args, None, self.timeout).map_err(|e| match e {
            ExternalError::Unavailable(message) => AlignError::TreeBuilderUnavailable {
                executable: self.executable.clone(),
                message,
            },
            ExternalError::TimedOut(limit) => {
                self.failed(None, format!("timed out after {}s", limit.as_secs_f64()))
            }
            ExternalError::Io(message) => AlignError::artifact_io(alignment, message),
        })?;
        if !out.status.success() {
            return Err(self.failed(
                out.status.code(),
                format!("exited with {}: {}", out.status, stderr_tail(&out.stderr)),
            ));
        }
        let treefile = Self::treefile_path(alignment);
        if !treefile.is_file() {
            return Err(self.failed(
                out.status.code(),
                format!("no tree written to '{}'", treefile.display()),
            ));
        }
        tracing::info!(
            treefile = %treefile.display(),
            duration_ms = out.duration.as_millis() as u64,
            "Tree inference completed"
        );
        Ok(TreeReport {
            alignment: alignment.to_path_buf(),
            treefile,
            command: args,
            duration_ms: out.duration.as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const ALIGNED: &str = ">a gappy\nAC--GT--\n>b clean\nACGTACGT\n>c one gap\nACG-ACGT\n>d also clean\nACGTACGA\n";

    #[test]
    fn test_least_gapped_keeps_alignment_order_for_ties() {
        let td = tempdir().unwrap();
        let aligned = td.path().join("aligned.fasta");
        fs::write(&aligned, ALIGNED).unwrap();
        let dest = td.path().join("tree").join("sel").join("sel.fasta");

        let report = select_least_gapped(&aligned, 3, &dest).unwrap();
        assert_eq!(report.selected_ids, vec!["b", "d", "c"]);
        assert_eq!(report.gap_counts, vec![0, 0, 1]);
        assert_eq!(report.available, 4);

        let written = read_fasta(&dest).unwrap();
        assert_eq!(
            written.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "d", "c"]
        );
        assert_eq!(written[2].sequence, "ACG-ACGT");
        assert_eq!(written[0].description, "b clean");
    }

    #[test]
    fn test_selecting_more_than_available_takes_all() {
        let td = tempdir().unwrap();
        let aligned = td.path().join("aligned.fasta");
        fs::write(&aligned, ALIGNED).unwrap();
        let report = select_least_gapped(&aligned, 10, &td.path().join("out.fasta")).unwrap();
        assert_eq!(report.selected_ids.len(), 4);
        assert_eq!(report.selected_ids.last().map(String::as_str), Some("a"));
    }

    #[test]
    fn test_zero_genomes_is_invalid() {
        let td = tempdir().unwrap();
        let aligned = td.path().join("aligned.fasta");
        fs::write(&aligned, ALIGNED).unwrap();
        let dest = td.path().join("out.fasta");
        assert!(matches!(
            select_least_gapped(&aligned, 0, &dest),
            Err(AlignError::InvalidInput(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_select_genomes_for_run_uses_layout() {
        let td = tempdir().unwrap();
        let layout = ArtifactLayout::new(td.path().join("fasta"), td.path().join("tree"));
        let run_id = RunId::parse("20200501000000").unwrap();
        let aligned = layout.aligned_path("gene_N", &run_id).unwrap();
        fs::create_dir_all(aligned.parent().unwrap()).unwrap();
        fs::write(&aligned, ALIGNED).unwrap();

        let report = select_genomes_for_run(&layout, "gene_N", &run_id, 1).unwrap();
        assert_eq!(
            report.destination,
            td.path()
                .join("tree")
                .join("gene_N_20200501000000")
                .join("gene_N_20200501000000.fasta")
        );
        assert_eq!(report.selected_ids, vec!["b"]);
    }

    #[test]
    fn test_treefile_path_appends_suffix() {
        assert_eq!(
            IqTree::treefile_path(Path::new("/t/sel_1/sel_1.fasta")),
            PathBuf::from("/t/sel_1/sel_1.fasta.treefile")
        );
    }

    #[test]
    fn test_missing_tree_builder_is_unavailable() {
        let td = tempdir().unwrap();
        let input = td.path().join("in.fasta");
        fs::write(&input, ">a\nACGT\n").unwrap();
        let err = IqTree::new(td.path().join("no-such-iqtree").to_string_lossy())
            .infer(&input)
            .unwrap_err();
        assert!(matches!(err, AlignError::TreeBuilderUnavailable { .. }), "{err:?}");
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;

        /// A stand-in iqtree: `sh <script> -s <alignment>`.
        fn script(dir: &Path, body: &str) -> IqTree {
            let path = dir.join("fake-iqtree");
            fs::write(&path, format!("{body}\n")).unwrap();
            IqTree::new("sh").with_extra_args(vec![path.to_string_lossy().into_owned()])
        }

        #[test]
        fn test_tree_written_next_to_input() {
            let td = tempdir().unwrap();
            let input = td.path().join("sel.fasta");
            fs::write(&input, ">a\nACGT\n>b\nACGA\n").unwrap();
            let iqtree = script(td.path(), "echo '(a,b);' > \"$2.treefile\"");

            let report = iqtree.infer(&input).unwrap();
            assert_eq!(report.treefile, IqTree::treefile_path(&input));
            assert_eq!(fs::read_to_string(&report.treefile).unwrap(), "(a,b);\n");
            assert_eq!(&report.command[1..], ["-s", &path_arg(&input)]);
        }

        #[test]
        fn test_failures_are_typed() {
            let td = tempdir().unwrap();
            let input = td.path().join("sel.fasta");
            fs::write(&input, ">a\nACGT\n").unwrap();

            let err = script(td.path(), "echo 'too few taxa' >&2; exit 2")
                .infer(&input)
                .unwrap_err();
            match err {
                AlignError::TreeBuilderFailed { status, reason, .. } => {
                    assert_eq!(status, Some(2));
                    assert!(reason.contains("too few taxa"));
                }
                other => panic!("unexpected {other:?}"),
            }

            let err = script(td.path(), "exit 0").infer(&input).unwrap_err();
            assert!(matches!(err, AlignError::TreeBuilderFailed { .. }));
        }
    }
}
