use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Command-line interface of the `luacm` binary
#[derive(Parser, Debug, Clone)]
#[command(name = "luacm")]
#[command(about = "Run declarative automation scripts written in sandboxed Lua")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct LuacmCli {
    /// Entry script; its directory becomes the workspace root
    #[arg(long = "root-file", value_name = "PATH")]
    pub root_file: PathBuf,

    /// Log verbosity: 0 warnings, 1 info, 2 debug, 3 or more trace
    #[arg(short, long, default_value_t = 1)]
    pub verbosity: u8,

    /// Prefix log lines with timestamps
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub timestamps: bool,

    /// Direct file writes made by operations to memory; scripts are still
    /// read from disk
    #[arg(long)]
    pub in_memory_fs: bool,
}
