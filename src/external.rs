//! Blocking invocation of external command line tools.
//!
//! Arguments are passed as an argv list, never through a shell. stdout can be
//! streamed into a file; stderr is buffered in an anonymous temp file so a
//! chatty tool cannot block on a full pipe.

use std::{
    fs::File,
    io::{ErrorKind, Read, Seek, SeekFrom},
    path::Path,
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub(crate) struct ExternalOutput {
    pub status: ExitStatus,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug)]
pub(crate) enum ExternalError {
    /// The executable could not be started at all.
    Unavailable(String),
    TimedOut(Duration),
    Io(String),
}

pub(crate) fn run_external(
    executable: &str,
    args: &[String],
    stdout_path: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<ExternalOutput, ExternalError> {
    let stdout = match stdout_path {
        Some(path) => Stdio::from(File::create(path).map_err(|e| {
            ExternalError::Io(format!("Could not create '{}': {e}", path.display()))
        })?),
        None => Stdio::null(),
    };
    let mut stderr_file = tempfile::tempfile()
        .map_err(|e| ExternalError::Io(format!("Could not create stderr buffer: {e}")))?;
    let stderr = stderr_file
        .try_clone()
        .map_err(|e| ExternalError::Io(format!("Could not share stderr buffer: {e}")))?;

    let start = Instant::now();
    let mut child = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                ExternalError::Unavailable(e.to_string())
            }
            _ => ExternalError::Io(format!(
                "Could not start '{}' with args [{}]: {e}",
                executable,
                args.join(" ")
            )),
        })?;

    let status = match timeout {
        None => child
            .wait()
            .map_err(|e| ExternalError::Io(format!("Could not wait for '{executable}': {e}")))?,
        Some(limit) => loop {
            let polled = child
                .try_wait()
                .map_err(|e| ExternalError::Io(format!("Could not poll '{executable}': {e}")))?;
            if let Some(status) = polled {
                break status;
            }
            if start.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExternalError::TimedOut(limit));
            }
            thread::sleep(POLL_INTERVAL.min(limit));
        },
    };

    let mut raw = Vec::new();
    stderr_file
        .seek(SeekFrom::Start(0))
        .and_then(|_| stderr_file.read_to_end(&mut raw))
        .map_err(|e| ExternalError::Io(format!("Could not read stderr of '{executable}': {e}")))?;

    Ok(ExternalOutput {
        status,
        stderr: String::from_utf8_lossy(&raw).into_owned(),
        duration: start.elapsed(),
    })
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Last few lines of a tool's stderr, enough to diagnose a failure in a log
/// line without dumping a full progress transcript.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 8;
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join("\n")
}
