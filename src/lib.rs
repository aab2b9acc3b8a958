//! luacm runs declarative automation scripts written in sandboxed Lua.
//!
//! Scripts call side-effecting operations (`exec`, `download`, `template`,
//! `write`, `shard`) through the built-in `luacm` module and compose each
//! other with `load`.

pub mod cli;
pub mod duration;
pub mod fs;
pub mod loader;
pub mod modules;
pub mod process;

pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem, OverlayFileSystem};
pub use loader::{LoadError, Loader, LoaderConfig};
pub use modules::{CoreServices, ModuleRegistry, OpResult, CORE_MODULE};
