//! Probes read the current state of a remote resource.

use crate::error::ProbeError;
use async_trait::async_trait;
use converge_engine::Observation;
use std::fmt;
use std::future::Future;

/// Reads the remote resource once.
///
/// Return `Ok(Observation::NotFound)` or `Err(ProbeError::NotFound)` when the
/// resource does not exist; both are treated the same by the waiter. Any
/// other error ends the wait and is passed through to the caller.
#[async_trait]
pub trait Probe: Send + Sync {
    type Value: fmt::Debug + Send + 'static;

    async fn probe(&self) -> Result<Observation<Self::Value>, ProbeError>;
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for &P {
    type Value = P::Value;

    async fn probe(&self) -> Result<Observation<Self::Value>, ProbeError> {
        (**self).probe().await
    }
}

/// A [`Probe`] backed by a closure. See [`probe_fn`].
pub struct ProbeFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Probe`].
///
/// ```
/// use converge_engine::Observation;
/// use converge_runtime::{probe_fn, ProbeError};
///
/// let probe = probe_fn(|| async { Ok::<_, ProbeError>(Observation::found(7, "Available")) });
/// # let _ = probe;
/// ```
pub fn probe_fn<F, Fut, T>(f: F) -> ProbeFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Observation<T>, ProbeError>> + Send + 'static,
    T: fmt::Debug + Send + 'static,
{
    ProbeFn { f }
}

#[async_trait]
impl<F, Fut, T> Probe for ProbeFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Observation<T>, ProbeError>> + Send + 'static,
    T: fmt::Debug + Send + 'static,
{
    type Value = T;

    async fn probe(&self) -> Result<Observation<T>, ProbeError> {
        (self.f)().await
    }
}

impl<F> fmt::Debug for ProbeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeFn").finish_non_exhaustive()
    }
}
