//! Script loading
//!
//! The [`Loader`] owns the Lua state. Every script runs in its own
//! environment table that falls back to the shared globals; the names it
//! defines at top level become its bindings, which `load(reference)` returns.
//! Each resolved module executes at most once per run.

pub mod cache;
pub mod error;
pub mod resolver;

pub use cache::{CacheEntry, ModuleCache};
pub use error::LoadError;
pub use resolver::{Resolved, Resolver};

use mlua::{Function, Lua, LuaOptions, StdLib, Table};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fs::{normalize_path, FileSystem};
use crate::modules::runtime::calling_script;
use crate::modules::{ModuleRegistry, ModuleRuntime, ScriptStack};
use cache::Begin;

pub const DEFAULT_EXTENSION: &str = "lua";

/// Globals removed from the interpreter: filesystem access outside the
/// loader and non-deterministic randomness.
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile"];
const REMOVED_MATH: &[&str] = &["random", "randomseed"];

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Root for `//` references and the fallback for relative ones
    pub workspace: PathBuf,
    pub extension: String,
}

impl LoaderConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

struct LoaderInner {
    fs: Arc<dyn FileSystem>,
    resolver: Resolver,
    registry: ModuleRegistry,
    runtime: ModuleRuntime,
    scripts: ScriptStack,
    cache: RefCell<ModuleCache>,
}

pub struct Loader {
    lua: Lua,
    inner: Rc<LoaderInner>,
}

impl Loader {
    /// `fs` is the filesystem scripts are read from; operations carry their
    /// own handles inside `registry`.
    pub fn new(
        config: LoaderConfig,
        fs: Arc<dyn FileSystem>,
        registry: ModuleRegistry,
        handle: Handle,
        cancel: CancellationToken,
    ) -> Result<Self, LoadError> {
        let setup_error = |e| LoadError::interpreter("<setup>", e);

        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::new(),
        )
        .map_err(setup_error)?;

        let scripts = ScriptStack::new();
        let runtime = ModuleRuntime::new(handle, cancel, scripts.clone())
            .with_fallback_dir(config.workspace.clone());
        let resolver = Resolver::new(
            config.workspace.clone(),
            config.extension.clone(),
            registry.list_modules().into_iter().map(str::to_string),
        );

        let inner = Rc::new(LoaderInner {
            fs,
            resolver,
            registry,
            runtime,
            scripts,
            cache: RefCell::new(ModuleCache::new()),
        });

        install_globals(&lua, Rc::downgrade(&inner)).map_err(setup_error)?;

        Ok(Self { lua, inner })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn workspace(&self) -> &Path {
        self.inner.resolver.workspace()
    }

    /// Execute the entry script. It goes through the same cache as every
    /// other module, so a module that loads the root script is a cycle.
    pub fn exec_root(&self, path: &Path) -> Result<Table, LoadError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| LoadError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
                .join(path)
        };
        self.inner
            .load_resolved(&self.lua, Resolved::File(normalize_path(&absolute)))
    }

    /// Resolve and load `reference` as if called from the currently
    /// executing script, or from the workspace when none is.
    pub fn load(&self, reference: &str) -> Result<Table, LoadError> {
        self.inner.load(&self.lua, reference)
    }

    pub fn cache_entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.cache.borrow().get(key).cloned()
    }
}

fn install_globals(lua: &Lua, inner: Weak<LoaderInner>) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.raw_remove(*name)?;
    }
    let math: Table = globals.get("math")?;
    for name in REMOVED_MATH {
        math.raw_remove(*name)?;
    }

    let load = lua.create_function(move |lua, reference: String| {
        let inner = inner
            .upgrade()
            .ok_or_else(|| mlua::Error::runtime("loader has been dropped"))?;
        inner.load(lua, &reference).map_err(mlua::Error::external)
    })?;
    globals.set("load", load)
}

impl LoaderInner {
    fn load(&self, lua: &Lua, reference: &str) -> Result<Table, LoadError> {
        let caller_dir = calling_script(lua)
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .or_else(|| self.scripts.current_dir());
        let resolved = self.resolver.resolve(reference, caller_dir.as_deref())?;
        debug!(reference, resolved = %resolved.cache_key(), "resolved load");
        self.load_resolved(lua, resolved)
    }

    fn load_resolved(&self, lua: &Lua, resolved: Resolved) -> Result<Table, LoadError> {
        let key = resolved.cache_key();
        // The borrow ends before any nested load starts.
        let begun = self.cache.borrow_mut().begin(&key)?;
        if let Begin::Cached(bindings) = begun {
            return Ok(bindings);
        }

        let outcome = match &resolved {
            Resolved::Builtin(name) => self.builtin(lua, name),
            Resolved::File(path) => self.execute(lua, path),
        };
        self.cache.borrow_mut().complete(&key, &outcome);
        outcome
    }

    fn builtin(&self, lua: &Lua, name: &str) -> Result<Table, LoadError> {
        let bindings = self
            .registry
            .bindings(lua, &self.runtime, name)
            .map_err(|e| LoadError::interpreter(name, e))?
            .ok_or_else(|| LoadError::Other {
                path: name.to_string(),
                message: "no such built-in module".to_string(),
            })?;
        read_only(lua, bindings).map_err(|e| LoadError::interpreter(name, e))
    }

    fn execute(&self, lua: &Lua, path: &Path) -> Result<Table, LoadError> {
        let shown = path.display().to_string();
        let source = self.fs.read(path).map_err(|e| LoadError::Io {
            path: shown.clone(),
            message: e.to_string(),
        })?;

        let env = module_env(lua).map_err(|e| LoadError::interpreter(&shown, e))?;

        let _frame = self.scripts.enter(path);
        info!(path = %shown, "executing script");
        lua.load(source.as_slice())
            .set_name(format!("@{shown}"))
            .set_environment(env.clone())
            .exec()
            .map_err(|e| classify(&shown, e))?;

        read_only(lua, env).map_err(|e| LoadError::interpreter(&shown, e))
    }
}

const READ_ONLY_PROXY: &str = r#"
local bindings = ...
return setmetatable({}, {
    __index = function(_, key) return rawget(bindings, key) end,
    __newindex = function(_, key)
        error("cannot assign to " .. tostring(key) .. ": module bindings are read-only", 2)
    end,
    __pairs = function() return next, bindings, nil end,
    __len = function() return rawlen(bindings) end,
    __metatable = false,
})
"#;

/// Proxy exposing exactly the raw entries of `bindings`; assignments through
/// it raise an error.
fn read_only(lua: &Lua, bindings: Table) -> mlua::Result<Table> {
    lua.load(READ_ONLY_PROXY)
        .set_name("=read_only")
        .call(bindings)
}

/// Fresh environment whose lookups fall back to the globals.
fn module_env(lua: &Lua) -> mlua::Result<Table> {
    let meta = lua.create_table()?;
    meta.set("__index", lua.globals())?;
    let setmetatable: Function = lua.globals().get("setmetatable")?;
    setmetatable.call((lua.create_table()?, meta))
}

/// Map an interpreter error to a [`LoadError`] for `path`. A failure that
/// originated in a nested load is passed through unchanged.
fn classify(path: &str, err: mlua::Error) -> LoadError {
    if let Some(nested) = nested_load_error(&err) {
        return nested;
    }
    match err {
        mlua::Error::SyntaxError { message, .. } => LoadError::Syntax {
            path: path.to_string(),
            message,
        },
        mlua::Error::RuntimeError(text) => {
            let (message, backtrace) = split_traceback(&text);
            LoadError::Evaluation {
                path: path.to_string(),
                message,
                backtrace,
            }
        }
        mlua::Error::CallbackError { traceback, cause } => LoadError::Evaluation {
            path: path.to_string(),
            message: root_cause(&cause),
            backtrace: traceback,
        },
        other => LoadError::Other {
            path: path.to_string(),
            message: other.to_string(),
        },
    }
}

fn nested_load_error(err: &mlua::Error) -> Option<LoadError> {
    match err {
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            nested_load_error(cause)
        }
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<LoadError>().cloned(),
        _ => None,
    }
}

fn root_cause(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_cause(cause),
        other => other.to_string(),
    }
}

fn split_traceback(text: &str) -> (String, String) {
    match text.split_once("\nstack traceback:") {
        Some((message, rest)) => (
            message.to_string(),
            format!("stack traceback:{rest}"),
        ),
        None => (text.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_traceback() {
        let (message, backtrace) =
            split_traceback("main.lua:3: boom\nstack traceback:\n\t[C]: in ?");
        assert_eq!(message, "main.lua:3: boom");
        assert_eq!(backtrace, "stack traceback:\n\t[C]: in ?");

        let (message, backtrace) = split_traceback("plain");
        assert_eq!(message, "plain");
        assert!(backtrace.is_empty());
    }

    #[test]
    fn test_nested_load_error_passes_through() {
        let cycle = LoadError::Cycle {
            path: "/ws/a.lua".into(),
        };
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback:".into(),
            cause: Arc::new(mlua::Error::external(cycle.clone())),
        };
        assert_eq!(classify("/ws/b.lua", wrapped), cycle);
    }
}
