//! write - prints a string to the configured output

use async_trait::async_trait;
use std::sync::Arc;

use crate::modules::{
    descriptor::{ArgType, Descriptor},
    error::ActionError,
    interface::{Action, Invocation, OpResult},
    runtime::Module,
};
use crate::process::OutputSink;

pub fn descriptor() -> Descriptor {
    Descriptor::new("write", &[("str", ArgType::Str), ("end??", ArgType::Str)])
}

pub fn module(sink: Arc<dyn OutputSink>) -> Module {
    Module::new(descriptor(), WriteAction { sink })
}

/// Writing never counts as a change to the host.
pub struct WriteAction {
    sink: Arc<dyn OutputSink>,
}

#[async_trait]
impl Action for WriteAction {
    async fn run(&self, invocation: Invocation) -> Result<Option<OpResult>, ActionError> {
        let text: String = invocation.args.require("str")?;
        let end: String = invocation.args.find_or("end", "\n".to_string())?;

        self.sink
            .write_chunk(format!("{text}{end}").as_bytes())
            .await
            .map_err(ActionError::Output)?;

        Ok(Some(OpResult::succeeded(invocation.name, text)))
    }
}
