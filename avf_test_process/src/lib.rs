//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Runs a single external command to completion with a bounded wall-clock timeout, capturing its
//! output as text.
//!
//! A command that outlives its timeout is killed with `SIGKILL`, after which whatever it had
//! already written is still collected and returned along with the return code of the killed
//! process. The return code follows the usual host convention: the exit code for a process that
//! exited on its own, or the negated signal number for a process that was terminated by a signal.

use std::{
    fmt,
    io,
    os::unix::process::ExitStatusExt,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    task::JoinHandle,
};

mod error;

pub use error::Error;

/// A single command: an executable and its arguments, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cmd {
    executable: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new<I, S>(executable: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Cmd {
            executable: executable.to_string(),
            args: args.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The full argument vector, starting with the executable.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Returns the command line as it would be typed in a shell, e.g. for logging.
    pub fn description(&self) -> String {
        self.argv().join(" ")
    }
}

/// Formats the command as a list of quoted arguments, so that arguments containing spaces stay
/// unambiguous in failure messages.
impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.argv())
    }
}

/// What a finished (or killed) command left behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }

    /// Both captured streams, each under its own banner. Empty streams are omitted.
    pub fn logs(&self) -> String {
        let mut logs = String::new();
        if !self.stdout.is_empty() {
            logs += &format!("════╡ stdout ╞════\n{}", self.stdout);
        }
        if !self.stderr.is_empty() {
            logs += &format!("════╡ stderr ╞════\n{}", self.stderr);
        }
        logs
    }
}

/// Something that can run a [`Cmd`] to completion within a timeout.
///
/// [`ProcessRunner`] is the real implementation; tests substitute their own to observe which
/// commands would have been spawned.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &Cmd, timeout: Duration) -> Result<ExecutionResult, Error>;
}

/// Runs commands as child processes of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cmd: &Cmd, timeout: Duration) -> Result<ExecutionResult, Error> {
        run_command(cmd, timeout).await
    }
}

/// Spawns `cmd` with stdin closed and both output streams captured, and waits for it to exit for
/// at most `timeout`.
///
/// If the timeout elapses the child is killed, reaped, and its output drained before returning.
/// Only failures of the runner itself are reported as errors; the caller decides what the return
/// code means.
pub async fn run_command(cmd: &Cmd, timeout: Duration) -> Result<ExecutionResult, Error> {
    let mut command = tokio::process::Command::new(cmd.executable());
    command
        .args(cmd.args())
        // Ensure that the child process is killed when it goes out of scope, whichever way this
        // function returns (including on panic).
        .kill_on_drop(true)
        // Close stdin to avoid hanging.
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    log::debug!("command line: {}", cmd.description());

    let mut child = command
        .spawn()
        .map_err(|source| Error::Spawn { command: cmd.description(), source })?;

    // Start reading both pipes right away, so that a child writing more than the pipe buffer
    // doesn't block forever while we are waiting for it to exit.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            status.map_err(|source| Error::Wait { command: cmd.description(), source })?
        }
        Err(_) => {
            log::warn!(
                "command did not finish within {:?}, killing it: {}",
                timeout,
                cmd.description()
            );
            child
                .start_kill()
                .map_err(|source| Error::Kill { command: cmd.description(), source })?;
            child
                .wait()
                .await
                .map_err(|source| Error::Wait { command: cmd.description(), source })?
        }
    };

    let stdout = collect(stdout)
        .await
        .map_err(|source| Error::Read { command: cmd.description(), stream: "stdout", source })?;
    let stderr = collect(stderr)
        .await
        .map_err(|source| Error::Read { command: cmd.description(), stream: "stderr", source })?;

    Ok(ExecutionResult { stdout, stderr, returncode: returncode(status) })
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(handle: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<String> {
    let bytes = handle.await.map_err(io::Error::other)??;
    Ok(decode_text(&bytes))
}

/// Decodes captured output as text, normalising `\r\n` and lone `\r` line endings to `\n`.
fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace("\r\n", "\n").replace('\r', "\n")
}

fn returncode(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => -signal,
        // Neither exited nor signalled; not something `wait` reports for a terminated child.
        (None, None) => -1,
    }
}
