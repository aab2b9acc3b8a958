//! Uniform call semantics wrapped around every operation
//!
//! The runtime binds arguments, evaluates `not_if` / `only_if`, resolves the
//! working directory from the calling script, applies `timeout`, and turns
//! the action's outcome into a script-visible record. Scripts run on a plain
//! thread; actions run on the tokio runtime through [`Handle::block_on`].

use mlua::{Function, Lua, MultiValue};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::args::BoundArgs;
use super::bridge::{bind, result_to_lua};
use super::descriptor::Descriptor;
use super::error::RuntimeError;
use super::interface::{Action, Invocation, InvocationContext, OpResult};
use crate::duration::parse_duration;
use crate::fs::resolve_against;

const MAX_CALLER_DEPTH: usize = 64;

/// An operation: its descriptor and the action behind it.
pub struct Module {
    descriptor: Descriptor,
    action: Arc<dyn Action>,
}

impl Module {
    pub fn new(descriptor: Descriptor, action: impl Action + 'static) -> Self {
        Self {
            descriptor,
            action: Arc::new(action),
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> &'static str {
        self.descriptor.kind()
    }
}

/// Paths of the scripts currently executing, innermost last. Shared between
/// the loader, which pushes and pops, and the runtime, which reads the top.
#[derive(Debug, Clone, Default)]
pub struct ScriptStack {
    paths: Rc<RefCell<Vec<PathBuf>>>,
}

impl ScriptStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `path` for as long as the returned guard lives.
    pub fn enter(&self, path: &Path) -> ScriptGuard {
        self.paths.borrow_mut().push(path.to_path_buf());
        ScriptGuard {
            paths: Rc::clone(&self.paths),
        }
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.paths.borrow().last().cloned()
    }

    pub fn current_dir(&self) -> Option<PathBuf> {
        self.current()
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }

    pub fn depth(&self) -> usize {
        self.paths.borrow().len()
    }
}

pub struct ScriptGuard {
    paths: Rc<RefCell<Vec<PathBuf>>>,
}

impl Drop for ScriptGuard {
    fn drop(&mut self) {
        self.paths.borrow_mut().pop();
    }
}

/// Turns [`Module`]s into Lua functions sharing one tokio handle, one root
/// cancellation token and the loader's script stack.
#[derive(Clone)]
pub struct ModuleRuntime {
    handle: Handle,
    root: CancellationToken,
    scripts: ScriptStack,
    fallback_dir: PathBuf,
}

impl ModuleRuntime {
    pub fn new(handle: Handle, root: CancellationToken, scripts: ScriptStack) -> Self {
        Self {
            handle,
            root,
            scripts,
            fallback_dir: PathBuf::from("."),
        }
    }

    /// Directory used when no script is executing.
    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    pub fn scripts(&self) -> &ScriptStack {
        &self.scripts
    }

    pub fn create_function(&self, lua: &Lua, module: Arc<Module>) -> mlua::Result<Function> {
        let runtime = self.clone();
        lua.create_function(move |lua, args: MultiValue| {
            let caller = calling_script(lua);
            let result = runtime
                .invoke(&module, args, caller.as_deref())
                .map_err(mlua::Error::external)?;
            result_to_lua(lua, &result)
        })
    }

    /// Bind `args` and dispatch. `caller` is the script whose code made the
    /// call; without one the executing script is used.
    pub fn invoke(
        &self,
        module: &Module,
        args: MultiValue,
        caller: Option<&Path>,
    ) -> Result<OpResult, RuntimeError> {
        let bound = bind(module.descriptor(), args)?;
        self.dispatch_from(module, bound, caller)
    }

    pub fn dispatch(&self, module: &Module, args: BoundArgs) -> Result<OpResult, RuntimeError> {
        self.dispatch_from(module, args, None)
    }

    /// Directory relative paths are resolved against for a call made from
    /// `caller`.
    pub fn base_dir(&self, caller: Option<&Path>) -> PathBuf {
        caller
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .or_else(|| self.scripts.current_dir())
            .unwrap_or_else(|| self.fallback_dir.clone())
    }

    /// Apply the common semantics to already-bound arguments and run the
    /// action. Must not be called from inside an async context.
    pub fn dispatch_from(
        &self,
        module: &Module,
        args: BoundArgs,
        caller: Option<&Path>,
    ) -> Result<OpResult, RuntimeError> {
        let kind = module.kind();
        let name: String = args.require("name")?;

        if args.find_or("not_if", false)? {
            info!(module = %name, kind, "skipping because not_if was true");
            return Ok(OpResult::skipped(name));
        }
        if !args.find_or("only_if", true)? {
            info!(module = %name, kind, "skipping because only_if was false");
            return Ok(OpResult::skipped(name));
        }

        let base = self.base_dir(caller);
        let working_directory = match args.optional::<String>("working_directory")? {
            Some(dir) => resolve_against(&base, dir),
            None => base,
        };

        let timeout = match args.optional::<String>("timeout")? {
            Some(raw) => {
                let duration = parse_duration(&raw).map_err(|source| {
                    RuntimeError::InvalidTimeout {
                        value: raw.clone(),
                        source,
                    }
                })?;
                Some((raw, duration))
            }
            None => None,
        };

        if args.find_or("what_if", false)? {
            debug!(module = %name, kind, "what_if has no effect; running normally");
        }

        if self.root.is_cancelled() {
            return Err(RuntimeError::Cancelled {
                kind: kind.to_string(),
                name,
            });
        }

        let token = self.root.child_token();
        let _guard = token.clone().drop_guard();
        let deadline = timeout.as_ref().map(|(_, d)| Instant::now() + *d);

        info!(module = %name, kind, dir = %working_directory.display(), "starting");
        let invocation = Invocation {
            context: InvocationContext::new(token, deadline),
            working_directory,
            name: name.clone(),
            args,
        };

        let outcome = match (timeout, deadline) {
            (Some((raw, _)), Some(deadline)) => {
                let action = Arc::clone(&module.action);
                let raced = self.handle.block_on(async move {
                    let mut task = tokio::spawn(async move { action.run(invocation).await });
                    match tokio::time::timeout_at(deadline, &mut task).await {
                        Ok(joined) => Some(joined),
                        Err(_) => {
                            task.abort();
                            None
                        }
                    }
                });
                match raced {
                    Some(Ok(outcome)) => outcome,
                    Some(Err(join_error)) => {
                        return Err(RuntimeError::Aborted {
                            kind: kind.to_string(),
                            name,
                            message: join_error.to_string(),
                        })
                    }
                    None => {
                        warn!(module = %name, kind, timeout = %raw, "timed out");
                        return Err(RuntimeError::Timeout {
                            kind: kind.to_string(),
                            name,
                            timeout: raw,
                        });
                    }
                }
            }
            _ => self.handle.block_on(module.action.run(invocation)),
        };

        match outcome {
            Ok(Some(result)) => {
                let result = result.normalized(&name);
                debug!(module = %name, kind, success = result.success, changed = result.changed, "finished");
                Ok(result)
            }
            Ok(None) => Err(RuntimeError::NoResult(name)),
            Err(source) => Err(RuntimeError::Action {
                kind: kind.to_string(),
                name,
                source,
            }),
        }
    }
}

/// Path of the innermost script on the Lua call stack, read from the
/// `@path` chunk name the loader assigns. Level 0 is the native function
/// itself; frames without a script source (`pcall`, other natives) are
/// skipped.
pub fn calling_script(lua: &Lua) -> Option<PathBuf> {
    (1..MAX_CALLER_DEPTH)
        .map_while(|level| lua.inspect_stack(level))
        .find_map(|frame| {
            let source = frame.source();
            source
                .source
                .as_deref()
                .and_then(|s| s.strip_prefix('@'))
                .map(PathBuf::from)
        })
}
