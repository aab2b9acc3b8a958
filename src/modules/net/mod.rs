//! Network operations

pub mod download;
