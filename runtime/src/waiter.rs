//! Async driver for [`WaitMachine`].
//!
//! The waiter owns the clock. It probes once per poll interval, feeds each
//! observation to the machine and stops on the first terminal step, on the
//! deadline, or on cancellation. Sleeps are cut short at the deadline so a
//! long poll interval never overshoots the timeout. A tick falling exactly
//! on the deadline is still probed; the wait times out only when the time
//! spent would exceed the timeout.

use crate::cancel::CancelToken;
use crate::error::{ProbeError, WaitError};
use crate::probe::Probe;
use converge_engine::{Observation, Step, Verdict, WaitMachine, WaiterSpec};
use std::time::Duration;
use tokio::time::Instant;

/// A successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome<T> {
    /// Value of the final observation. `None` when waiting for absence.
    pub value: Option<T>,
    /// Number of probes issued
    pub ticks: u64,
    pub elapsed: Duration,
}

impl<T> WaitOutcome<T> {
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

/// Polls a [`Probe`] until the target state is reached.
#[derive(Debug, Clone)]
pub struct Waiter {
    spec: WaiterSpec,
}

enum Pause {
    Elapsed,
    Deadline,
    Cancelled,
}

impl Waiter {
    pub fn new(spec: WaiterSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &WaiterSpec {
        &self.spec
    }

    /// Wait for the probed resource to reach a target label.
    ///
    /// Each call runs an independent wait; a `Waiter` may be shared by
    /// concurrent tasks.
    pub async fn wait<P>(
        &self,
        probe: &P,
        cancel: &CancelToken,
    ) -> Result<WaitOutcome<P::Value>, WaitError<P::Value>>
    where
        P: Probe + ?Sized,
    {
        let start = Instant::now();
        let deadline = start + self.spec.timeout();
        let mut machine = WaitMachine::new(self.spec.clone());

        tracing::debug!(
            pending = ?self.spec.pending_labels(),
            target = ?self.spec.target_labels(),
            timeout = ?self.spec.timeout(),
            "waiting for state change"
        );

        if !self.spec.delay().is_zero() {
            match pause(start + self.spec.delay(), deadline, cancel).await {
                Pause::Elapsed => {}
                Pause::Deadline => return Err(self.timed_out(machine)),
                Pause::Cancelled => return Err(cancelled(machine)),
            }
        }

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(machine));
            }

            let observation = match probe.probe().await {
                Ok(observation) => observation,
                Err(ProbeError::NotFound) => Observation::NotFound,
                Err(ProbeError::Other(err)) => {
                    machine.fail();
                    tracing::warn!(tick = machine.ticks() + 1, error = %err, "probe failed");
                    return Err(WaitError::Probe(err));
                }
            };

            if let Observation::Found { label, .. } = &observation {
                tracing::debug!(tick = machine.ticks() + 1, %label, "observed");
            } else {
                tracing::debug!(tick = machine.ticks() + 1, "resource not found");
            }

            match machine.observe(observation) {
                Step::Continue | Step::Ignored => {}
                Step::Succeeded(value) => {
                    let elapsed = start.elapsed();
                    tracing::info!(ticks = machine.ticks(), ?elapsed, "target state reached");
                    return Ok(WaitOutcome {
                        value,
                        ticks: machine.ticks(),
                        elapsed,
                    });
                }
                Step::Failed(Verdict::NotFoundExceeded { checks }) => {
                    tracing::warn!(checks, "resource not found");
                    return Err(WaitError::NotFoundExceeded { checks });
                }
                Step::Failed(Verdict::UnexpectedState { label }) => {
                    tracing::warn!(%label, "unexpected state");
                    return Err(WaitError::UnexpectedState {
                        label,
                        pending: self.spec.pending_labels().iter().cloned().collect(),
                        target: self.spec.target_labels().iter().cloned().collect(),
                    });
                }
            }

            match pause(Instant::now() + self.spec.poll_interval(), deadline, cancel).await {
                Pause::Elapsed => {}
                Pause::Deadline => return Err(self.timed_out(machine)),
                Pause::Cancelled => return Err(cancelled(machine)),
            }
        }
    }

    fn timed_out<T: std::fmt::Debug>(&self, mut machine: WaitMachine<T>) -> WaitError<T> {
        machine.time_out();
        tracing::warn!(
            timeout = ?self.spec.timeout(),
            ticks = machine.ticks(),
            "timed out waiting for state change"
        );
        WaitError::TimedOut {
            timeout: self.spec.timeout(),
            target: self.spec.target_labels().iter().cloned().collect(),
            last: machine.into_last(),
        }
    }
}

fn cancelled<T: std::fmt::Debug>(mut machine: WaitMachine<T>) -> WaitError<T> {
    machine.cancel();
    tracing::info!(ticks = machine.ticks(), "wait cancelled");
    WaitError::Cancelled
}

/// Sleep until `until`, but no later than `deadline`.
///
/// A wake-up landing exactly on the deadline still counts as elapsed, so a
/// probe is issued at `elapsed == timeout`. The wait only times out once the
/// next wake-up would be past the deadline.
async fn pause(until: Instant, deadline: Instant, cancel: &CancelToken) -> Pause {
    let wake = until.min(deadline);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Pause::Cancelled,
        _ = tokio::time::sleep_until(wake) => {}
    }
    if until > deadline {
        Pause::Deadline
    } else {
        Pause::Elapsed
    }
}
