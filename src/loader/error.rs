use thiserror::Error;

/// Errors raised while resolving or executing a script module. Every variant
/// carries the module it concerns; values are cloneable so the cache can hand
/// the same failure to every later importer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("cycle in load graph \"{path}\"")]
    Cycle { path: String },

    #[error("cannot load {reference:?}: expected a .{extension} file or a built-in module")]
    BadExtension {
        reference: String,
        extension: String,
    },

    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("syntax error in {path}: {message}")]
    Syntax { path: String, message: String },

    #[error("error evaluating {path}: {message}")]
    Evaluation {
        path: String,
        message: String,
        backtrace: String,
    },

    #[error("error loading {path}: {message}")]
    Other { path: String, message: String },
}

impl LoadError {
    pub fn path(&self) -> &str {
        match self {
            LoadError::Cycle { path }
            | LoadError::Io { path, .. }
            | LoadError::Syntax { path, .. }
            | LoadError::Evaluation { path, .. }
            | LoadError::Other { path, .. } => path,
            LoadError::BadExtension { reference, .. } => reference,
        }
    }

    /// Lua stack traceback captured for evaluation errors.
    pub fn backtrace(&self) -> Option<&str> {
        match self {
            LoadError::Evaluation { backtrace, .. } if !backtrace.is_empty() => Some(backtrace),
            _ => None,
        }
    }

    pub(crate) fn interpreter(path: impl Into<String>, err: mlua::Error) -> Self {
        LoadError::Other {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
