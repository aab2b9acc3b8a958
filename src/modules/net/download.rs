//! download - fetches a URL into a file, optionally verifying its SHA-256

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use crate::fs::{resolve_against, FileSystem};
use crate::modules::{
    descriptor::{ArgType, Descriptor},
    error::ActionError,
    files::checksum::{digest_matches, sha256_hex},
    interface::{Action, Invocation, OpResult},
    runtime::Module,
};
use crate::process::OutputSink;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub fn descriptor() -> Descriptor {
    Descriptor::new(
        "download",
        &[
            ("url", ArgType::Str),
            ("save_to", ArgType::Str),
            ("sha256??", ArgType::Str),
            ("live_progress??", ArgType::Bool),
        ],
    )
}

pub fn module(
    client: reqwest::Client,
    fs: Arc<dyn FileSystem>,
    progress: Arc<dyn OutputSink>,
) -> Module {
    Module::new(
        descriptor(),
        DownloadAction {
            client,
            fs,
            progress,
        },
    )
}

/// Throttled progress line for one transfer.
#[derive(Debug)]
pub struct Progress {
    label: String,
    total: Option<u64>,
    written: u64,
    last_report: Option<Instant>,
}

impl Progress {
    pub fn new(label: impl Into<String>, total: Option<u64>) -> Self {
        Self {
            label: label.into(),
            total,
            written: 0,
            last_report: None,
        }
    }

    /// Record `bytes` more and return a line to print when one is due.
    pub fn advance(&mut self, bytes: usize, now: Instant) -> Option<String> {
        self.written += bytes as u64;
        let complete = self.total == Some(self.written);
        let due = self
            .last_report
            .map_or(true, |last| now.duration_since(last) > PROGRESS_INTERVAL);
        if !(due || complete) {
            return None;
        }
        self.last_report = Some(now);

        Some(match self.total {
            Some(total) if total > 0 => format!(
                "\rDownloading {}... {}%",
                self.label,
                self.written.saturating_mul(100) / total
            ),
            _ => format!("\rDownloading {}... {} bytes", self.label, self.written),
        })
    }
}

pub struct DownloadAction {
    client: reqwest::Client,
    fs: Arc<dyn FileSystem>,
    progress: Arc<dyn OutputSink>,
}

impl DownloadAction {
    async fn fetch(&self, url: &Url, live_progress: bool) -> Result<Vec<u8>, ActionError> {
        let http_error = |source| ActionError::Http {
            url: url.to_string(),
            source,
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut progress = live_progress.then(|| Progress::new(url.as_str(), total));
        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await.map_err(http_error)? {
            body.extend_from_slice(&chunk);
            if let Some(line) = progress
                .as_mut()
                .and_then(|p| p.advance(chunk.len(), Instant::now()))
            {
                self.report(line.as_bytes()).await;
            }
        }
        if progress.is_some() {
            self.report(b"\n").await;
        }

        Ok(body)
    }

    async fn report(&self, bytes: &[u8]) {
        if let Err(e) = self.progress.write_chunk(bytes).await {
            debug!(error = %e, "progress output failed");
        }
    }
}

#[async_trait]
impl Action for DownloadAction {
    async fn run(&self, invocation: Invocation) -> Result<Option<OpResult>, ActionError> {
        let args = &invocation.args;
        let raw_url: String = args.require("url")?;
        let save_to: String = args.require("save_to")?;
        let expected_sha256: Option<String> = args.optional("sha256")?;
        let live_progress = args.find_or("live_progress", false)?;

        let url = Url::parse(&raw_url).map_err(|source| ActionError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;
        let destination: PathBuf = resolve_against(&invocation.working_directory, &save_to);

        info!(module = %invocation.name, url = %url, destination = %destination.display(), "downloading");
        let body = tokio::select! {
            biased;
            _ = invocation.context.cancelled() => return Err(ActionError::Cancelled),
            body = self.fetch(&url, live_progress) => body?,
        };

        if let Some(expected) = expected_sha256 {
            let actual = sha256_hex(&body);
            if !digest_matches(&expected, &actual) {
                return Err(ActionError::HashMismatch {
                    url: url.to_string(),
                    expected,
                    actual,
                });
            }
        }

        if let Some(parent) = destination.parent() {
            self.fs
                .create_dir_all(parent)
                .map_err(|e| ActionError::io(parent, e))?;
        }
        self.fs
            .write_synced(&destination, &body)
            .map_err(|e| ActionError::io(&destination, e))?;

        Ok(Some(
            OpResult::succeeded(
                invocation.name,
                format!("downloaded file to {}", destination.display()),
            )
            .with_changed(true),
        ))
    }
}
