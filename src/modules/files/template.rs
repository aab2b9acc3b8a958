//! template - renders a Handlebars template to a destination file

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::Value;
use similar::TextDiff;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::fs::{resolve_against, FileSystem};
use crate::modules::{
    args::BoundArgs,
    descriptor::{ArgType, Descriptor},
    error::ActionError,
    interface::{Action, Invocation, OpResult},
    runtime::Module,
};

pub fn descriptor() -> Descriptor {
    Descriptor::new(
        "template",
        &[
            ("template", ArgType::Str),
            ("data", ArgType::Dict),
            ("destination", ArgType::Str),
        ],
    )
}

pub fn module(fs: Arc<dyn FileSystem>) -> Module {
    Module::new(descriptor(), TemplateAction { fs })
}

/// Template arguments with paths resolved against the working directory
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateArgs {
    pub template: PathBuf,
    pub data: Value,
    pub destination: PathBuf,
}

impl TemplateArgs {
    pub fn from_bound(bound: &BoundArgs, working_directory: &Path) -> Result<Self, ActionError> {
        let template: String = bound.require("template")?;
        let destination: String = bound.require("destination")?;
        Ok(Self {
            template: resolve_against(working_directory, template),
            data: bound.require("data")?,
            destination: resolve_against(working_directory, destination),
        })
    }
}

/// Handlebars in strict mode with HTML escaping disabled; rendered files are
/// configuration, not markup.
pub struct TemplateProcessor {
    handlebars: Handlebars<'static>,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    pub fn render(
        &self,
        template: &str,
        data: &Value,
    ) -> Result<String, handlebars::RenderError> {
        self.handlebars.render_template(template, data)
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified line diff between the previous and new file contents.
pub fn line_diff(before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header("before", "after")
        .to_string()
}

pub struct TemplateAction {
    fs: Arc<dyn FileSystem>,
}

impl TemplateAction {
    fn write_rendered(&self, path: &Path, contents: &[u8]) -> Result<(), ActionError> {
        if let Some(parent) = path.parent() {
            self.fs
                .create_dir_all(parent)
                .map_err(|e| ActionError::io(parent, e))?;
        }
        self.fs
            .write_synced(path, contents)
            .map_err(|e| ActionError::io(path, e))
    }
}

#[async_trait]
impl Action for TemplateAction {
    async fn run(&self, invocation: Invocation) -> Result<Option<OpResult>, ActionError> {
        let args = TemplateArgs::from_bound(&invocation.args, &invocation.working_directory)?;
        let name = invocation.name;

        if self.fs.is_dir(&args.destination) {
            return Err(ActionError::DestinationIsDirectory(args.destination));
        }

        let source = self
            .fs
            .read_to_string(&args.template)
            .map_err(|e| ActionError::io(&args.template, e))?;
        debug!(module = %name, template = %args.template.display(), data = %args.data, "rendering");

        let rendered = TemplateProcessor::new()
            .render(&source, &args.data)
            .map_err(|e| ActionError::Template {
                path: args.template.clone(),
                message: e.to_string(),
            })?;

        let previous = match self.fs.read(&args.destination) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(ActionError::io(&args.destination, e)),
        };

        if previous.as_deref() == Some(rendered.as_bytes()) {
            debug!(module = %name, destination = %args.destination.display(), "already up to date");
            return Ok(Some(OpResult::succeeded(name, rendered)));
        }

        if let Err(e) = self.write_rendered(&args.destination, rendered.as_bytes()) {
            return Ok(Some(OpResult::failed(name, "", e)));
        }

        let diff = match previous {
            None => rendered.clone(),
            Some(before) => line_diff(&String::from_utf8_lossy(&before), &rendered),
        };
        info!(module = %name, destination = %args.destination.display(), "wrote template");

        Ok(Some(
            OpResult::succeeded(name, rendered)
                .with_changed(true)
                .with_diff(Some(diff)),
        ))
    }
}
