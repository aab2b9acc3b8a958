//! Named sets of operations exposed to scripts as built-in modules

use mlua::{Lua, Table};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::fs::{FileSystem, OsFileSystem};
use crate::modules::runtime::{Module, ModuleRuntime};
use crate::modules::{core, files, net};
use crate::process::{process_provider, ExecutorProvider, OutputSink, StdStreamSink};

/// Name under which the core operations are loadable.
pub const CORE_MODULE: &str = "luacm";

/// Collaborators handed to the core operations.
#[derive(Clone)]
pub struct CoreServices {
    /// Filesystem that file-producing operations write through
    pub fs: Arc<dyn FileSystem>,
    pub executors: ExecutorProvider,
    /// Destination of `write` and of `exec` live output
    pub output: Arc<dyn OutputSink>,
    /// Destination of download progress
    pub progress: Arc<dyn OutputSink>,
    pub http: reqwest::Client,
}

impl Default for CoreServices {
    fn default() -> Self {
        Self {
            fs: Arc::new(OsFileSystem),
            executors: process_provider(),
            output: Arc::new(StdStreamSink::stdout()),
            progress: Arc::new(StdStreamSink::stderr()),
            http: reqwest::Client::new(),
        }
    }
}

/// Built-in modules keyed by the name scripts pass to `load`.
#[derive(Default)]
pub struct ModuleRegistry {
    sets: BTreeMap<String, Vec<Arc<Module>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the core operations under [`CORE_MODULE`].
    pub fn with_core_modules(services: CoreServices) -> Self {
        let mut registry = Self::new();

        registry.register(
            CORE_MODULE,
            core::command::module(services.executors.clone(), Arc::clone(&services.output)),
        );
        registry.register(
            CORE_MODULE,
            net::download::module(
                services.http.clone(),
                Arc::clone(&services.fs),
                Arc::clone(&services.progress),
            ),
        );
        registry.register(CORE_MODULE, files::template::module(Arc::clone(&services.fs)));
        registry.register(CORE_MODULE, core::write::module(Arc::clone(&services.output)));
        registry.register(CORE_MODULE, core::shard::module());

        registry
    }

    pub fn register(&mut self, set: &str, module: Module) {
        self.sets
            .entry(set.to_string())
            .or_default()
            .push(Arc::new(module));
    }

    pub fn contains(&self, set: &str) -> bool {
        self.sets.contains_key(set)
    }

    pub fn list_modules(&self) -> Vec<&str> {
        self.sets.keys().map(String::as_str).collect()
    }

    pub fn operations(&self, set: &str) -> Vec<&'static str> {
        self.sets
            .get(set)
            .map(|ops| ops.iter().map(|m| m.kind()).collect())
            .unwrap_or_default()
    }

    /// Build the bindings table of `set`, one function per operation.
    pub fn bindings(
        &self,
        lua: &Lua,
        runtime: &ModuleRuntime,
        set: &str,
    ) -> mlua::Result<Option<Table>> {
        let Some(modules) = self.sets.get(set) else {
            return Ok(None);
        };
        let table = lua.create_table()?;
        for module in modules {
            let function = runtime.create_function(lua, Arc::clone(module))?;
            table.set(module.kind(), function)?;
        }
        Ok(Some(table))
    }
}
