//! File-producing operations and their helpers

pub mod checksum;
pub mod template;

pub use template::TemplateProcessor;
