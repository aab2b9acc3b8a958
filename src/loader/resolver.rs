//! Maps `load` references to built-in modules or script paths

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::error::LoadError;
use crate::fs::normalize_path;

/// Prefix marking a workspace-relative reference.
pub const WORKSPACE_PREFIX: &str = "//";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Builtin(String),
    File(PathBuf),
}

impl Resolved {
    /// Key under which the loader caches this module.
    pub fn cache_key(&self) -> String {
        match self {
            Resolved::Builtin(name) => name.clone(),
            Resolved::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    workspace: PathBuf,
    extension: String,
    builtins: BTreeSet<String>,
}

impl Resolver {
    pub fn new(
        workspace: impl Into<PathBuf>,
        extension: impl Into<String>,
        builtins: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            extension: extension.into(),
            builtins: builtins.into_iter().collect(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolve `reference`, first match wins: built-in name, absolute path,
    /// `//` workspace path, path relative to the calling script when a script
    /// is calling, then path relative to the workspace. Only the extension is
    /// checked here; a missing file surfaces when it is read.
    pub fn resolve(&self, reference: &str, caller_dir: Option<&Path>) -> Result<Resolved, LoadError> {
        if self.builtins.contains(reference) {
            return Ok(Resolved::Builtin(reference.to_string()));
        }

        let has_extension = Path::new(reference)
            .extension()
            .is_some_and(|ext| ext == self.extension.as_str());
        if !has_extension {
            return Err(LoadError::BadExtension {
                reference: reference.to_string(),
                extension: self.extension.clone(),
            });
        }

        let path = Path::new(reference);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(rest) = reference.strip_prefix(WORKSPACE_PREFIX) {
            self.workspace.join(rest)
        } else {
            match caller_dir {
                Some(dir) => dir.join(path),
                None => self.workspace.join(path),
            }
        };

        Ok(Resolved::File(normalize_path(&resolved)))
    }
}
