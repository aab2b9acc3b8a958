#![allow(dead_code)]

use luacm::fs::MemoryFileSystem;
use luacm::loader::{Loader, LoaderConfig};
use luacm::modules::{CoreServices, Module, ModuleRegistry, CORE_MODULE};
use luacm::process::BufferSink;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

pub const WORKSPACE: &str = "/ws";

/// Loader over an in-memory workspace with `write` and live output captured.
/// Field order matters: the loader must drop before the runtime.
pub struct Harness {
    pub loader: Loader,
    pub fs: MemoryFileSystem,
    pub output: BufferSink,
    pub progress: BufferSink,
    pub cancel: CancellationToken,
    pub runtime: Runtime,
}

impl Harness {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self::with_extra(files, Vec::new())
    }

    /// Like [`Harness::new`], with additional operations registered under
    /// the `test` built-in module.
    pub fn with_extra(files: &[(&str, &str)], extra: Vec<Module>) -> Self {
        Self::build(files, extra, reqwest::Client::new())
    }

    /// Harness whose downloads go through `http`.
    pub fn with_http(files: &[(&str, &str)], http: reqwest::Client) -> Self {
        Self::build(files, Vec::new(), http)
    }

    fn build(files: &[(&str, &str)], extra: Vec<Module>, http: reqwest::Client) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let fs = MemoryFileSystem::new();
        for (path, contents) in files {
            fs.add_file(format!("{WORKSPACE}/{path}"), *contents);
        }

        let output = BufferSink::new();
        let progress = BufferSink::new();
        let mut registry = ModuleRegistry::with_core_modules(CoreServices {
            fs: Arc::new(fs.clone()),
            output: Arc::new(output.clone()),
            progress: Arc::new(progress.clone()),
            http,
            ..CoreServices::default()
        });
        for module in extra {
            registry.register("test", module);
        }
        assert!(registry.contains(CORE_MODULE));

        let cancel = CancellationToken::new();
        let loader = Loader::new(
            LoaderConfig::new(WORKSPACE),
            Arc::new(fs.clone()),
            registry,
            runtime.handle().clone(),
            cancel.clone(),
        )
        .unwrap();

        Self {
            loader,
            fs,
            output,
            progress,
            cancel,
            runtime,
        }
    }

    pub fn run(&self, script: &str) -> Result<mlua::Table, luacm::LoadError> {
        self.loader
            .exec_root(std::path::Path::new(&format!("{WORKSPACE}/{script}")))
    }

    pub fn output(&self) -> String {
        self.output.contents()
    }
}
