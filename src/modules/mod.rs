//! Operations and the uniform call semantics around them

pub mod args;
pub mod bridge;
pub mod core;
pub mod descriptor;
pub mod error;
pub mod files;
pub mod interface;
pub mod net;
pub mod registry;
pub mod runtime;

pub use args::BoundArgs;
pub use descriptor::{ArgType, Descriptor, ParamSpec, Presence};
pub use error::{ActionError, BindError, ConvertError, RuntimeError};
pub use interface::{Action, Invocation, InvocationContext, OpResult};
pub use registry::{CoreServices, ModuleRegistry, CORE_MODULE};
pub use runtime::{Module, ModuleRuntime, ScriptStack};
