//! Action interface and the types passed across it

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::args::BoundArgs;
use super::error::ActionError;

/// Side-effecting behaviour behind one operation.
///
/// An action that has both a partial result and a failure reports it as
/// `Ok(Some(result))` with `result.error` set.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<Option<OpResult>, ActionError>;
}

/// Everything an action receives for one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub context: InvocationContext,
    pub working_directory: PathBuf,
    pub name: String,
    pub args: BoundArgs,
}

/// Cancellation scope of one invocation. The deadline is informational:
/// the runtime enforces it by aborting the action, so actions only watch
/// the token.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl InvocationContext {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Structured outcome of an operation, handed back to scripts as a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    pub name: String,
    pub output: String,
    pub error: Option<String>,
    pub success: bool,
    pub changed: bool,
    pub diff: Option<String>,
    pub comment: String,
}

impl OpResult {
    /// Result of an invocation skipped by `only_if` / `not_if`.
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn succeeded(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(
        name: impl Into<String>,
        output: impl Into<String>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            error: Some(error.to_string()),
            success: false,
            ..Default::default()
        }
    }

    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn with_diff(mut self, diff: Option<String>) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Fill in a missing name and force `success = false` when an error is
    /// present.
    pub fn normalized(mut self, name: &str) -> Self {
        if self.name.is_empty() {
            self.name = name.to_string();
        }
        if self.error.is_some() {
            self.success = false;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_normalized_enforces_error_invariant() {
        let r = OpResult {
            error: Some("boom".into()),
            success: true,
            ..Default::default()
        }
        .normalized("step");

        assert_eq!(r.name, "step");
        assert!(!r.success);
    }

    #[test]
    fn test_skipped_is_well_formed() {
        let r = OpResult::skipped("maybe");
        assert!(r.success);
        assert!(!r.changed);
        assert_eq!(r.error, None);
        assert_eq!(r.output, "");
    }

    #[tokio::test]
    async fn test_deadline_alone_does_not_cancel() {
        let ctx = InvocationContext::new(
            CancellationToken::new(),
            Some(Instant::now() + Duration::from_millis(5)),
        );
        let waited = tokio::time::timeout(Duration::from_millis(50), ctx.cancelled()).await;

        assert!(waited.is_err());
        assert!(ctx.deadline_passed());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_resolves_cancelled() {
        let token = CancellationToken::new();
        let ctx = InvocationContext::new(token.clone(), None);
        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
