//! Diff, apply, and wait: one reconciliation of a remote resource.

use crate::cancel::CancelToken;
use crate::error::{BoxError, ProbeError, ReconcileError};
use crate::probe::Probe;
use crate::waiter::{WaitOutcome, Waiter};
use async_trait::async_trait;
use converge_engine::{
    ConfigTree, DiffOptions, DiffSummary, Differ, Error, PatchOp, PatchPath, WaiterSpec,
};
use std::future::Future;

/// What the remote API said about an applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutateAck {
    /// The change completes asynchronously and must be waited on
    pub wait: bool,
}

impl MutateAck {
    pub fn done() -> Self {
        Self { wait: false }
    }

    pub fn in_progress() -> Self {
        Self { wait: true }
    }
}

/// Applies patch operations to the remote resource.
#[async_trait]
pub trait Mutate: Send + Sync {
    async fn apply(&self, ops: &[PatchOp]) -> Result<MutateAck, BoxError>;
}

/// Result of a reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileReport<T> {
    /// Operations sent to the remote API. Empty when nothing changed.
    pub ops: Vec<PatchOp>,
    pub summary: DiffSummary,
    /// Set when a wait was run and completed
    pub outcome: Option<WaitOutcome<T>>,
}

impl<T> ReconcileReport<T> {
    pub fn waited(&self) -> bool {
        self.outcome.is_some()
    }

    /// Value of the final wait observation, if a wait ran and saw one.
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().and_then(|outcome| outcome.value.as_ref())
    }
}

/// Drives updates and deletes of one remote resource.
#[derive(Debug)]
pub struct Reconciler<'a, R> {
    resource: &'a R,
    differ: Differ,
    cancel: CancelToken,
}

impl<'a, R> Reconciler<'a, R>
where
    R: Probe + Mutate,
{
    pub fn new(resource: &'a R) -> Self {
        Self {
            resource,
            differ: Differ::default(),
            cancel: CancelToken::never(),
        }
    }

    pub fn with_options(mut self, options: DiffOptions) -> Self {
        self.differ = Differ::new(options);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Move the resource from `old` to `new`.
    ///
    /// Nothing is sent when the trees are equal. When the API acknowledges
    /// an asynchronous change and a waiter is given, waits for it to settle.
    pub async fn update(
        &self,
        old: &ConfigTree,
        new: &ConfigTree,
        base: &PatchPath,
        wait: Option<&WaiterSpec>,
    ) -> Result<ReconcileReport<R::Value>, ReconcileError<R::Value>> {
        let ops = self.differ.diff(old, new, base)?;
        let summary = DiffSummary::from_ops(&ops);

        if ops.is_empty() {
            tracing::debug!(%base, "no changes");
            return Ok(ReconcileReport {
                ops,
                summary,
                outcome: None,
            });
        }

        tracing::info!(
            %base,
            adds = summary.adds,
            replaces = summary.replaces,
            removes = summary.removes,
            "applying patch"
        );
        let ack = self
            .resource
            .apply(&ops)
            .await
            .map_err(ReconcileError::Mutate)?;

        let outcome = match wait {
            Some(spec) if ack.wait => Some(
                Waiter::new(spec.clone())
                    .wait(self.resource, &self.cancel)
                    .await?,
            ),
            _ => None,
        };

        Ok(ReconcileReport {
            ops,
            summary,
            outcome,
        })
    }

    /// Delete the resource with `delete`, then wait until it is gone.
    ///
    /// `wait` must have an empty target set. A resource that is already gone
    /// counts as deleted and is not waited on.
    pub async fn delete<F, Fut>(
        &self,
        delete: F,
        wait: &WaiterSpec,
    ) -> Result<ReconcileReport<R::Value>, ReconcileError<R::Value>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<(), ProbeError>> + Send,
    {
        if !wait.waits_for_absence() {
            return Err(Error::InvalidWaiterSpec(
                "a delete must wait for absence (empty target set)".into(),
            )
            .into());
        }

        let report = |outcome| ReconcileReport {
            ops: Vec::new(),
            summary: DiffSummary::default(),
            outcome,
        };

        match delete().await {
            Ok(()) => {}
            Err(ProbeError::NotFound) => {
                tracing::info!("resource already deleted");
                return Ok(report(None));
            }
            Err(ProbeError::Other(err)) => return Err(ReconcileError::Delete(err)),
        }

        tracing::info!("delete requested, waiting for removal");
        let outcome = Waiter::new(wait.clone())
            .wait(self.resource, &self.cancel)
            .await?;
        Ok(report(Some(outcome)))
    }
}
