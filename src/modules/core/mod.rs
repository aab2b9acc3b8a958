//! Operations that run commands or compute values

pub mod command;
pub mod shard;
pub mod write;
