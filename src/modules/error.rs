use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::duration::DurationError;
use crate::process::ExecError;

/// Errors raised while binding call arguments to an operation's parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("{kind}: missing argument for {key}")]
    Missing { kind: String, key: String },

    #[error("{kind}: got {given} positional arguments, want at most {max}")]
    TooMany {
        kind: String,
        given: usize,
        max: usize,
    },

    #[error("{kind}: got multiple values for argument {key}")]
    Duplicate { kind: String, key: String },

    #[error("{kind}: unexpected keyword argument {key}")]
    Unexpected { kind: String, key: String },

    #[error("{kind}: for parameter {key}: got {got}, want {want}")]
    Type {
        kind: String,
        key: String,
        got: String,
        want: &'static str,
    },

    #[error("{kind}: argument {key}: {message}")]
    Convert {
        kind: String,
        key: String,
        message: String,
    },
}

/// Failures converting interpreter values into native values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("{0} values cannot be passed to operations")]
    Unsupported(&'static str),

    #[error("number {0} is not finite")]
    NonFinite(f64),

    #[error("table keys of type {0} are not supported")]
    BadKey(&'static str),

    #[error("tables nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("{0}")]
    Lua(String),
}

/// Errors returned by an operation's action
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request to {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("sha256 mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("template error in {path}: {message}")]
    Template { path: PathBuf, message: String },

    #[error("destination {0} is a directory")]
    DestinationIsDirectory(PathBuf),

    #[error("shard_size must be at least 10, got {0}")]
    ShardSize(i64),

    #[error("cannot split command line {cmd:?}: {message}")]
    CommandLine { cmd: String, message: String },

    #[error("empty command")]
    EmptyCommand,

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing output: {0}")]
    Output(#[source] io::Error),

    #[error("cannot determine host name: {0}")]
    Hostname(#[source] io::Error),

    #[error("command failed: {0}")]
    Exec(#[from] ExecError),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Bind(#[from] BindError),
}

impl ActionError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ActionError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced to scripts by the module runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("error parsing timeout [{value}]: {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("{kind}(name={name:?}): timeout {timeout} exceeded")]
    Timeout {
        kind: String,
        name: String,
        timeout: String,
    },

    #[error("{kind}(name={name:?}) was cancelled")]
    Cancelled { kind: String, name: String },

    #[error("no result returned from module {0}")]
    NoResult(String),

    #[error("{kind}(name={name:?}): {source}")]
    Action {
        kind: String,
        name: String,
        #[source]
        source: ActionError,
    },

    #[error("{kind}(name={name:?}) aborted: {message}")]
    Aborted {
        kind: String,
        name: String,
        message: String,
    },
}
