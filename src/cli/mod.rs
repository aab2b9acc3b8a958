pub mod logging;
pub mod options;

pub use logging::init_logging;
pub use options::LuacmCli;
