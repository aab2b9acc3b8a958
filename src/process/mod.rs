//! Child-process execution with concurrent output fan-out
//!
//! A [`CommandExecutor`] runs one command exactly once. Both output pipes are
//! drained line by line on their own tasks, each line is delivered to every
//! sink, and the exit code is recorded only after both drains have finished.

pub mod error;
pub mod sink;

pub use error::{ExecError, FanOutError};
pub use sink::{BufferSink, FanOut, OutputSink, StdStreamSink};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

/// One command execution session.
#[async_trait]
pub trait CommandExecutor: Send {
    /// Bind the program and its arguments. Must precede [`stream`](Self::stream).
    fn configure(&mut self, program: &str, args: &[String]);

    fn set_working_directory(&mut self, dir: &Path);

    /// Run the command to completion, delivering each output line to every
    /// sink. With no sinks, output goes to this process's stdout.
    async fn stream(&mut self, sinks: Vec<Arc<dyn OutputSink>>) -> Result<(), ExecError>;

    /// Exit code of the finished command.
    fn exit_code(&self) -> Result<i32, ExecError>;
}

/// Produces a fresh executor per invocation.
pub type ExecutorProvider = Arc<dyn Fn() -> Box<dyn CommandExecutor> + Send + Sync>;

/// Provider backed by [`ProcessExecutor`].
pub fn process_provider() -> ExecutorProvider {
    Arc::new(|| Box::new(ProcessExecutor::new()))
}

/// Executor that spawns a real child process via `tokio::process`.
#[derive(Debug, Default)]
pub struct ProcessExecutor {
    program: Option<String>,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    started: bool,
    exit_code: OnceLock<i32>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    fn configure(&mut self, program: &str, args: &[String]) {
        self.program = Some(program.to_string());
        self.args = args.to_vec();
    }

    fn set_working_directory(&mut self, dir: &Path) {
        self.working_directory = Some(dir.to_path_buf());
    }

    async fn stream(&mut self, sinks: Vec<Arc<dyn OutputSink>>) -> Result<(), ExecError> {
        let program = self.program.clone().ok_or(ExecError::NotConfigured)?;
        if self.started {
            return Err(ExecError::AlreadyStreamed);
        }
        self.started = true;

        let sinks: Vec<Arc<dyn OutputSink>> = if sinks.is_empty() {
            vec![Arc::new(StdStreamSink::stdout())]
        } else {
            sinks
        };
        let fanout = FanOut::new(sinks);

        let mut command = Command::new(&program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        debug!(program = %program, args = ?self.args, "spawning command");
        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(ExecError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ExecError::MissingPipe("stderr"))?;

        let stdout_task = tokio::spawn(drain(stdout, fanout.clone()));
        let stderr_task = tokio::spawn(drain(stderr, fanout.clone()));
        let (stdout_result, stderr_result) = tokio::join!(stdout_task, stderr_task);

        let status = child.wait().await?;
        // Killed by a signal leaves no code.
        let code = status.code().unwrap_or(-1);
        let _ = self.exit_code.set(code);
        trace!(program = %program, code, "command finished");

        flatten(stdout_result)?;
        flatten(stderr_result)?;
        fanout.close().await?;

        if code != 0 {
            return Err(ExecError::Exit { code });
        }
        Ok(())
    }

    fn exit_code(&self) -> Result<i32, ExecError> {
        self.exit_code.get().copied().ok_or(ExecError::NotFinished)
    }
}

fn flatten(joined: Result<Result<(), ExecError>, tokio::task::JoinError>) -> Result<(), ExecError> {
    joined.map_err(|e| ExecError::Io(std::io::Error::other(e)))?
}

/// Read `reader` to EOF, forwarding newline-terminated lines. A sink failure
/// is remembered but reading continues so the child never blocks on a full
/// pipe.
async fn drain<R>(reader: R, fanout: FanOut) -> Result<(), ExecError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut sink_error = None;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        if let Err(e) = fanout.write(&line).await {
            sink_error.get_or_insert(e);
        }
    }

    match sink_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
