//! exec - runs a command and captures its combined output

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tracing::warn;

use crate::modules::{
    args::BoundArgs,
    descriptor::{ArgType, Descriptor},
    error::ActionError,
    interface::{Action, Invocation, OpResult},
    runtime::Module,
};
use crate::process::{BufferSink, ExecError, ExecutorProvider, OutputSink};

pub fn descriptor() -> Descriptor {
    Descriptor::new(
        "exec",
        &[
            ("cmd", ArgType::Str),
            ("args??", ArgType::List),
            ("expected_exit_code??", ArgType::Int),
            ("live_output??", ArgType::Bool),
        ],
    )
}

pub fn module(executors: ExecutorProvider, live: Arc<dyn OutputSink>) -> Module {
    Module::new(descriptor(), CommandAction { executors, live })
}

/// Arguments of one `exec` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    pub program: String,
    pub args: Vec<String>,
    pub expected_exit_code: i32,
    pub live_output: bool,
}

impl CommandArgs {
    /// With no `args`, `cmd` is split using shell-word rules; otherwise it is
    /// the program and `args` are passed verbatim.
    pub fn from_bound(bound: &BoundArgs) -> Result<Self, ActionError> {
        let cmd: String = bound.require("cmd")?;
        let (program, args) = match bound.optional::<Vec<String>>("args")? {
            Some(args) => (cmd, args),
            None => {
                let mut words =
                    shell_words::split(&cmd).map_err(|e| ActionError::CommandLine {
                        cmd: cmd.clone(),
                        message: e.to_string(),
                    })?;
                if words.is_empty() {
                    return Err(ActionError::EmptyCommand);
                }
                let program = words.remove(0);
                (program, words)
            }
        };
        if program.is_empty() {
            return Err(ActionError::EmptyCommand);
        }

        Ok(Self {
            program,
            args,
            expected_exit_code: bound.find_or("expected_exit_code", 0)?,
            live_output: bound.find_or("live_output", false)?,
        })
    }
}

pub struct CommandAction {
    executors: ExecutorProvider,
    live: Arc<dyn OutputSink>,
}

#[async_trait]
impl Action for CommandAction {
    async fn run(&self, invocation: Invocation) -> Result<Option<OpResult>, ActionError> {
        let spec = CommandArgs::from_bound(&invocation.args)?;
        let name = invocation.name;

        // The child runs on the host, so the directory must exist there.
        let dir = &invocation.working_directory;
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ActionError::io(
                    dir,
                    io::Error::new(io::ErrorKind::InvalidInput, "working directory is not a directory"),
                ))
            }
            Err(e) => return Err(ActionError::io(dir, e)),
        }

        let mut executor = (self.executors)();
        executor.configure(&spec.program, &spec.args);
        executor.set_working_directory(dir);

        let buffer = BufferSink::new();
        let mut sinks: Vec<Arc<dyn OutputSink>> = vec![Arc::new(buffer.clone())];
        if spec.live_output {
            sinks.push(Arc::clone(&self.live));
        }

        // Dropping the streaming future kills the child.
        let streaming = async {
            let streamed = executor.stream(sinks).await;
            (streamed, executor.exit_code().ok())
        };

        tokio::select! {
            biased;
            (streamed, code) = streaming => {
                Ok(Some(finish(name, &spec, buffer.contents(), streamed, code)))
            }
            _ = invocation.context.cancelled() => {
                warn!(module = %name, program = %spec.program, "command interrupted");
                Ok(Some(
                    OpResult::failed(name, buffer.contents(), ActionError::Cancelled)
                        .with_changed(true),
                ))
            }
        }
    }
}

fn finish(
    name: String,
    spec: &CommandArgs,
    output: String,
    streamed: Result<(), ExecError>,
    code: Option<i32>,
) -> OpResult {
    match (streamed, code) {
        (Ok(()), Some(code)) | (Err(ExecError::Exit { .. }), Some(code)) => {
            let expected = spec.expected_exit_code;
            let mut result = OpResult::succeeded(name, output).with_changed(true);
            if code != expected {
                result.success = false;
                result.comment = format!("expected exit code {expected}, got {code}");
            }
            result
        }
        (Err(e @ ExecError::Spawn { .. }), _) => OpResult::failed(name, output, e),
        (Err(e), _) => OpResult::failed(name, output, e).with_changed(true),
        (Ok(()), None) => OpResult::failed(name, output, ExecError::NotFinished).with_changed(true),
    }
}
