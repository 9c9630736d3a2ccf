//! Error types for probing, waiting and reconciling.

use converge_engine::Observed;
use std::fmt;
use std::time::Duration;

/// Boxed error returned by caller-supplied probes and mutations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by a [`Probe`](crate::Probe).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The resource does not exist (yet, or any more)
    #[error("resource not found")]
    NotFound,

    #[error(transparent)]
    Other(BoxError),
}

impl ProbeError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        ProbeError::Other(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProbeError::NotFound)
    }
}

/// Terminal failure of a wait.
///
/// Ephemeral not-found and pending observations never surface here; every
/// variant ends the wait.
#[derive(Debug, thiserror::Error)]
pub enum WaitError<T: fmt::Debug> {
    #[error("couldn't find resource ({checks} consecutive not-found checks)")]
    NotFoundExceeded { checks: u32 },

    #[error(
        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
        .target.join(", "),
        last_label(.last),
        .timeout
    )]
    TimedOut {
        timeout: Duration,
        target: Vec<String>,
        last: Option<Observed<T>>,
    },

    #[error("unexpected state '{label}', wanted target '{}'", .target.join(", "))]
    UnexpectedState {
        label: String,
        pending: Vec<String>,
        target: Vec<String>,
    },

    #[error("wait cancelled")]
    Cancelled,

    #[error("probe failed: {0}")]
    Probe(#[source] BoxError),
}

fn last_label<T>(last: &Option<Observed<T>>) -> &str {
    last.as_ref().map_or("", |observed| observed.label.as_str())
}

impl<T: fmt::Debug> WaitError<T> {
    /// The last found observation, when the wait timed out.
    pub fn last_observed(&self) -> Option<&Observed<T>> {
        match self {
            WaitError::TimedOut { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitError::Cancelled)
    }
}

/// Error from a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError<T: fmt::Debug + 'static> {
    #[error(transparent)]
    Engine(#[from] converge_engine::Error),

    #[error("updating remote resource: {0}")]
    Mutate(#[source] BoxError),

    #[error("deleting remote resource: {0}")]
    Delete(#[source] BoxError),

    #[error(transparent)]
    Wait(#[from] WaitError<T>),
}
