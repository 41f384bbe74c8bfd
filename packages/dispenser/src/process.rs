//! External toolchain invocation with a per-call timeout

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::ExecutionError;

/// Timeout applied to each invocation unless configured otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Runs toolchain commands, one child process per call.
///
/// A zero exit status is success. Anything else, including a spawn failure or
/// an elapsed timeout, becomes an [`ExecutionError`] and is logged together
/// with whatever the child wrote before it is returned. The child is killed
/// if the call is abandoned.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ProcessRunner {
    /// Runner with a custom per-invocation timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-invocation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `executable` with `args` and wait for it to exit
    pub async fn run<I, S>(&self, executable: &Path, args: I) -> Result<ProcessOutput, ExecutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = executable.display().to_string();
        let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
        debug!(
            "Running `{program} {}`",
            args.iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = Command::new(executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                error!("Failed to spawn `{program}`: {source}");
                ExecutionError::Io {
                    program: program.clone(),
                    source,
                }
            })?;

        let mut stdout = CapturedStream::spawn(child.stdout.take());
        let mut stderr = CapturedStream::spawn(child.stderr.take());

        let finished = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await?;
            stdout.finish().await;
            stderr.finish().await;
            Ok::<_, std::io::Error>(status)
        })
        .await;

        let status = match finished {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                error!("Failed to collect output of `{program}`: {source}");
                return Err(ExecutionError::Io { program, source });
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill `{program}` after timeout: {e}");
                }
                let stdout = stdout.contents().await;
                let stderr = stderr.contents().await;
                error!(
                    "Command timed out.\nprogram: {program}\ntimeout: {:?}\nstderr: {stderr}\nstdout: {stdout}",
                    self.timeout
                );
                return Err(ExecutionError::TimedOut {
                    program,
                    timeout: self.timeout,
                    stdout,
                    stderr,
                });
            }
        };

        let stdout = stdout.contents().await;
        let stderr = stderr.contents().await;

        if status.success() {
            return Ok(ProcessOutput { stdout, stderr });
        }

        let exit_code = status.code();
        error!(
            "Command failed.\nprogram: {program}\nexit code: {exit_code:?}\nstderr: {stderr}\nstdout: {stdout}"
        );
        Err(ExecutionError::NonZeroExit {
            program,
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// One child pipe drained into a shared buffer, so the bytes read so far
/// survive a timeout
struct CapturedStream {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl CapturedStream {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|pipe| tokio::spawn(drain(pipe, Arc::clone(&buffer))));
        Self { buffer, reader }
    }

    /// Wait for the pipe to reach EOF
    async fn finish(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }

    async fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().await).into_owned()
    }
}

impl Drop for CapturedStream {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R, buffer: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
        }
    }
}
