use std::io;
use thiserror::Error;

/// Errors raised by a command execution session
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no command configured; call configure() before stream()")]
    NotConfigured,

    #[error("command already ran; an executor streams exactly once")]
    AlreadyStreamed,

    #[error("exit_code() called before the command finished")]
    NotFinished,

    #[error("failed to start {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("child process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("exit status {code}")]
    Exit { code: i32 },

    #[error("output sink failed: {0}")]
    Sink(#[from] FanOutError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ExecError {
    /// Exit code carried by a non-zero exit, if that is what this error is.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Exit { code } => Some(*code),
            _ => None,
        }
    }
}

/// Aggregated failures from one fan-out write.
#[derive(Debug, Error)]
#[error("{} of {total} sinks failed: {}", .failures.len(), first_message(.failures))]
pub struct FanOutError {
    pub total: usize,
    pub failures: Vec<io::Error>,
}

fn first_message(failures: &[io::Error]) -> String {
    failures
        .first()
        .map(|e| e.to_string())
        .unwrap_or_default()
}
