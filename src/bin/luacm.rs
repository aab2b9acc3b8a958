use anyhow::{anyhow, Context, Result};
use clap::Parser;
use luacm::cli::{init_logging, LuacmCli};
use luacm::fs::{FileSystem, OsFileSystem, OverlayFileSystem};
use luacm::loader::{LoadError, Loader, LoaderConfig};
use luacm::modules::{CoreServices, ModuleRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LuacmCli::parse();
    init_logging(cli.verbosity, cli.timestamps)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; cancelling running operations");
                cancel.cancel();
            }
        }
    });

    // The interpreter is not Send, so scripts run on a dedicated blocking
    // thread that drives operations back through the runtime handle.
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || run_script(&cli, handle, cancel))
        .await
        .context("script thread panicked")?
}

fn run_script(cli: &LuacmCli, handle: Handle, cancel: CancellationToken) -> Result<()> {
    let root = absolute(&cli.root_file)?;
    let workspace = root
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("root file {} has no parent directory", root.display()))?;

    let op_fs: Arc<dyn FileSystem> = if cli.in_memory_fs {
        info!("operations write to an in-memory overlay of the disk");
        Arc::new(OverlayFileSystem::new(Arc::new(OsFileSystem)))
    } else {
        Arc::new(OsFileSystem)
    };
    let registry = ModuleRegistry::with_core_modules(CoreServices {
        fs: op_fs,
        ..CoreServices::default()
    });

    let loader = Loader::new(
        LoaderConfig::new(&workspace),
        Arc::new(OsFileSystem),
        registry,
        handle,
        cancel,
    )?;

    info!(root = %root.display(), workspace = %workspace.display(), "running");
    if let Err(e) = loader.exec_root(&root) {
        return Err(report(e));
    }
    Ok(())
}

fn report(err: LoadError) -> anyhow::Error {
    match err.backtrace() {
        Some(backtrace) => anyhow!("{err}\n{backtrace}"),
        None => anyhow!(err),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    Ok(cwd.join(path))
}
