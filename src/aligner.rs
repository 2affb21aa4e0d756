use crate::artifacts::part_path;
use crate::config::PipelineConfig;
use crate::error::{AlignError, Result};
use crate::external::{ExternalError, path_arg, run_external, stderr_tail};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// What an aligner reports back after producing `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignerRun {
    pub executable: String,
    pub command: Vec<String>,
    pub duration_ms: u128,
}

/// The multiple sequence aligner, seen as a file-in/file-out black box.
///
/// Implementations must leave `output` absent on failure and must never
/// modify `existing_aligned`.
pub trait Aligner: Send + Sync {
    fn align(&self, unaligned: &Path, output: &Path) -> Result<AlignerRun>;

    fn align_add(
        &self,
        new_unaligned: &Path,
        existing_aligned: &Path,
        output: &Path,
    ) -> Result<AlignerRun>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MafftAligner {
    executable: String,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl MafftAligner {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            extra_args: vec![],
            timeout: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            executable: config.mafft_executable(),
            extra_args: config.mafft_extra_args.clone(),
            timeout: config.aligner_timeout(),
        }
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

    fn scratch_args(&self, unaligned: &Path) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push(path_arg(unaligned));
        args
    }

    fn add_args(&self, new_unaligned: &Path, existing_aligned: &Path) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("--add".to_string());
        args.push(path_arg(new_unaligned));
        args.push("--reorder".to_string());
        args.push(path_arg(existing_aligned));
        args
    }

    fn failed(&self, status: Option<i32>, reason: String) -> AlignError {
        AlignError::AlignerFailed {
            executable: self.executable.clone(),
            status,
            reason,
        }
    }

    /// Runs mafft with stdout captured into `<output>.part`, then renames the
    /// part file into place once the exit status and content check out.
    fn invoke(&self, args: Vec<String>, output: &Path) -> Result<AlignerRun> {
        let tmp_path = part_path(output);
        tracing::info!(
            executable = %self.executable,
            args = ?args,
            output = %output.display(),
            "Executing sequence alignment"
        );

        let result = run_external(&self.executable, &args, Some(&tmp_path), self.timeout)
            .map_err(|e| match e {
                ExternalError::Unavailable(message) => AlignError::AlignerUnavailable {
                    executable: self.executable.clone(),
                    message,
                },
                ExternalError::TimedOut(limit) => {
                    self.failed(None, format!("timed out after {}s", limit.as_secs_f64()))
                }
                ExternalError::Io(message) => AlignError::artifact_io(&tmp_path, message),
            })
            .and_then(|out| {
                if !out.status.success() {
                    return Err(self.failed(
                        out.status.code(),
                        format!("exited with {}: {}", out.status, stderr_tail(&out.stderr)),
                    ));
                }
                let produced = fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
                if produced == 0 {
                    return Err(self.failed(
                        out.status.code(),
                        format!(
                            "produced no alignment output: {}",
                            stderr_tail(&out.stderr)
                        ),
                    ));
                }
                Ok(out)
            });

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                tracing::warn!(executable = %self.executable, "Alignment failed: {e}");
                return Err(e);
            }
        };

        fs::rename(&tmp_path, output).map_err(|e| AlignError::artifact_io(output, e))?;
        tracing::info!(
            output = %output.display(),
            duration_ms = out.duration.as_millis() as u64,
            "Alignment completed"
        );
        Ok(AlignerRun {
            executable: self.executable.clone(),
            command: args,
            duration_ms: out.duration.as_millis(),
        })
    }
}

impl Aligner for MafftAligner {
    fn align(&self, unaligned: &Path, output: &Path) -> Result<AlignerRun> {
        self.invoke(self.scratch_args(unaligned), output)
    }

    fn align_add(
        &self,
        new_unaligned: &Path,
        existing_aligned: &Path,
        output: &Path,
    ) -> Result<AlignerRun> {
        if existing_aligned == output {
            return Err(AlignError::InvalidInput(format!(
                "Refusing to overwrite existing alignment '{}'",
                existing_aligned.display()
            )));
        }
        self.invoke(self.add_args(new_unaligned, existing_aligned), output)
    }
}
