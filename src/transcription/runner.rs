//! # Process Runner
//!
//! Runs the external transcriber as a child process with a hard wall-clock
//! timeout and turns the result into a typed outcome.
//!
//! ## Outcome classification:
//! - exit 0 and nothing on stderr: success
//! - anything on stderr, or a non-zero exit: [`RunError::Transcribe`], a
//!   domain failure whose message can be shown to the caller as is
//! - launch failure, wait failure, timeout: system errors, logged but never
//!   shown to the caller
//!
//! The transcriber reports problems like unsupported audio as stderr text, so
//! stderr takes priority over the exit status when building the message.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to keep draining pipes once the child is gone. A grandchild that
/// inherited the pipes must not hold the request past this.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The tool rejected the input. The message is safe to return to the caller.
    #[error("{0}")]
    Transcribe(String),

    #[error("empty command line")]
    EmptyCommand,

    #[error("can't start '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}. Out: {stdout}\nErr: {stderr}")]
    Timeout {
        program: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

/// Something that can execute an argument vector under a deadline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<(), RunError>;
}

/// Runs commands as real OS processes.
///
/// On unix every run gets its own process group, and whatever is left of that
/// group is killed on timeout or when it keeps the output pipes open after the
/// main process exited.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<(), RunError> {
        let (program, args) = argv.split_first().ok_or(RunError::EmptyCommand)?;

        info!(command = %argv.join(" "), "Starting transcriber");
        let started = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunError::Launch {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        let mut stdout = Captured::spawn(child.stdout.take());
        let mut stderr = Captured::spawn(child.stderr.take());

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(timeout) => None,
        };

        let status = match waited {
            Some(Ok(status)) => status,
            Some(Err(source)) => {
                kill_group(pid);
                return Err(RunError::Wait {
                    program: program.clone(),
                    source,
                });
            }
            None => {
                kill_group(pid);
                if let Err(e) = child.kill().await {
                    error!(program = %program, error = %e, "Failed to kill timed out transcriber");
                }
                drain(&mut stdout, &mut stderr).await;
                warn!(
                    program = %program,
                    timeout_ms = %timeout.as_millis(),
                    "Transcriber timed out and was killed"
                );
                return Err(RunError::Timeout {
                    program: program.clone(),
                    timeout,
                    stdout: stdout.text(),
                    stderr: stderr.text(),
                });
            }
        };

        if !drain(&mut stdout, &mut stderr).await {
            // Something the transcriber started still holds its pipes.
            kill_group(pid);
        }
        debug!(
            program = %program,
            status = %status,
            elapsed_ms = %started.elapsed().as_millis(),
            "Transcriber finished"
        );

        classify(status, &stdout.text(), &stderr.text())
    }
}

/// Map a finished process to an outcome.
fn classify(status: ExitStatus, stdout: &str, stderr: &str) -> Result<(), RunError> {
    if status.success() && stderr.is_empty() {
        return Ok(());
    }

    error!(status = %status, stderr = %stderr, stdout = %stdout, "Transcriber failed");

    let message = stderr.trim_end();
    if !message.is_empty() {
        return Err(RunError::Transcribe(message.to_string()));
    }
    if status.success() {
        return Err(RunError::Transcribe(
            "transcriber wrote blank output to stderr".to_string(),
        ));
    }
    Err(RunError::Transcribe(format!("transcriber exited with {status}")))
}

type OutputBuf = Arc<Mutex<Vec<u8>>>;

/// One output pipe, read in the background into a buffer that stays readable
/// even if the reader never reaches EOF.
struct Captured {
    buf: OutputBuf,
    reader: JoinHandle<()>,
}

impl Captured {
    fn spawn<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = OutputBuf::default();
        let reader = tokio::spawn(read_stream(stream, buf.clone()));
        Self { buf, reader }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buf)).into_owned()
    }
}

fn lock(buf: &OutputBuf) -> MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_stream<R>(stream: Option<R>, buf: OutputBuf)
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return;
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => lock(&buf).extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!(error = %e, "Failed reading transcriber output");
                break;
            }
        }
    }
}

/// Wait for both pipes to close, at most [`OUTPUT_DRAIN_GRACE`].
///
/// Returns `false` if they are still open after that; the readers are aborted
/// and whatever was read so far stays in the buffers.
async fn drain(stdout: &mut Captured, stderr: &mut Captured) -> bool {
    let both = async {
        join_reader(&mut stdout.reader).await;
        join_reader(&mut stderr.reader).await;
    };
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, both).await.is_ok() {
        return true;
    }

    warn!("Transcriber output still open after exit, keeping what was read");
    stdout.reader.abort();
    stderr.reader.abort();
    false
}

async fn join_reader(reader: &mut JoinHandle<()>) {
    if let Err(e) = reader.await {
        warn!(error = %e, "Output reader task failed");
    }
}

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg takes plain integers and only sends a signal.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid = pgid, error = %e, "Can't kill transcriber process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
