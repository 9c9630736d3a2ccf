//! Waiter parameters and the wait state machine.
//!
//! The machine implements the per-tick transition rules of a state-change
//! wait and nothing else: it never sleeps, never reads a clock and never
//! talks to the remote API. The async driver in `converge-runtime` feeds it
//! one [`Observation`] per poll and owns timing and cancellation.
//!
//! # Transitions
//!
//! - not found: counted; fails once the count exceeds the tolerance, unless
//!   the target set is empty, in which case disappearance is the target
//! - found, pending label: resets the consecutive-target streak
//! - found, target label: extends the streak; succeeds once it reaches the
//!   required continuous occurrence
//! - found, any other label: fails immediately
//!
//! Any found observation resets the not-found count.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Parameters of a single wait. Immutable once built.
///
/// The serialized form uses millisecond durations and is validated on the
/// way in, exactly like [`WaiterSpecBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWaiterSpec", into = "RawWaiterSpec")]
pub struct WaiterSpec {
    pending_labels: BTreeSet<String>,
    target_labels: BTreeSet<String>,
    timeout: Duration,
    poll_interval: Duration,
    not_found_tolerance: u32,
    continuous_target_occurrence: u32,
    delay: Duration,
}

impl WaiterSpec {
    pub fn builder() -> WaiterSpecBuilder {
        WaiterSpecBuilder::default()
    }

    pub fn pending_labels(&self) -> &BTreeSet<String> {
        &self.pending_labels
    }

    pub fn target_labels(&self) -> &BTreeSet<String> {
        &self.target_labels
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn not_found_tolerance(&self) -> u32 {
        self.not_found_tolerance
    }

    pub fn continuous_target_occurrence(&self) -> u32 {
        self.continuous_target_occurrence
    }

    /// Time to wait before the first probe.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// An empty target set means the wait succeeds when the resource is gone.
    pub fn waits_for_absence(&self) -> bool {
        self.target_labels.is_empty()
    }

    pub fn is_pending(&self, label: &str) -> bool {
        self.pending_labels.contains(label)
    }

    pub fn is_target(&self, label: &str) -> bool {
        self.target_labels.contains(label)
    }
}

/// Builder for [`WaiterSpec`].
///
/// Nothing is defaulted except the initial delay: timeout, poll interval,
/// not-found tolerance and continuous target occurrence must all be given.
#[derive(Debug, Clone, Default)]
pub struct WaiterSpecBuilder {
    pending_labels: BTreeSet<String>,
    target_labels: BTreeSet<String>,
    timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    not_found_tolerance: Option<u32>,
    continuous_target_occurrence: Option<u32>,
    delay: Duration,
}

impl WaiterSpecBuilder {
    pub fn pending<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn target<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn not_found_tolerance(mut self, checks: u32) -> Self {
        self.not_found_tolerance = Some(checks);
        self
    }

    pub fn continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = Some(occurrences);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> Result<WaiterSpec> {
        let timeout = required(self.timeout, "timeout")?;
        let poll_interval = required(self.poll_interval, "poll interval")?;
        let not_found_tolerance = required(self.not_found_tolerance, "not-found tolerance")?;
        let continuous_target_occurrence =
            required(self.continuous_target_occurrence, "continuous target occurrence")?;

        if timeout.is_zero() {
            return Err(Error::InvalidWaiterSpec("timeout must be positive".into()));
        }
        if poll_interval.is_zero() {
            return Err(Error::InvalidWaiterSpec("poll interval must be positive".into()));
        }
        if continuous_target_occurrence == 0 {
            return Err(Error::InvalidWaiterSpec(
                "continuous target occurrence must be at least 1".into(),
            ));
        }
        if let Some(label) = self.pending_labels.intersection(&self.target_labels).next() {
            return Err(Error::InvalidWaiterSpec(format!(
                "label '{}' is both pending and target",
                label
            )));
        }

        Ok(WaiterSpec {
            pending_labels: self.pending_labels,
            target_labels: self.target_labels,
            timeout,
            poll_interval,
            not_found_tolerance,
            continuous_target_occurrence,
            delay: self.delay,
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::InvalidWaiterSpec(format!("{} is required", name)))
}

/// Wire shape of [`WaiterSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWaiterSpec {
    #[serde(default)]
    pending_labels: BTreeSet<String>,
    #[serde(default)]
    target_labels: BTreeSet<String>,
    timeout_ms: u64,
    poll_interval_ms: u64,
    not_found_tolerance: u32,
    continuous_target_occurrence: u32,
    #[serde(default)]
    delay_ms: u64,
}

impl TryFrom<RawWaiterSpec> for WaiterSpec {
    type Error = Error;

    fn try_from(raw: RawWaiterSpec) -> Result<Self> {
        WaiterSpec::builder()
            .pending(raw.pending_labels)
            .target(raw.target_labels)
            .timeout(Duration::from_millis(raw.timeout_ms))
            .poll_interval(Duration::from_millis(raw.poll_interval_ms))
            .not_found_tolerance(raw.not_found_tolerance)
            .continuous_target_occurrence(raw.continuous_target_occurrence)
            .delay(Duration::from_millis(raw.delay_ms))
            .build()
    }
}

impl From<WaiterSpec> for RawWaiterSpec {
    fn from(spec: WaiterSpec) -> Self {
        Self {
            pending_labels: spec.pending_labels,
            target_labels: spec.target_labels,
            timeout_ms: millis(spec.timeout),
            poll_interval_ms: millis(spec.poll_interval),
            not_found_tolerance: spec.not_found_tolerance,
            continuous_target_occurrence: spec.continuous_target_occurrence,
            delay_ms: millis(spec.delay),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// What one probe saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    Found { value: T, label: String },
    NotFound,
}

impl<T> Observation<T> {
    pub fn found(value: T, label: impl Into<String>) -> Self {
        Observation::Found {
            value,
            label: label.into(),
        }
    }
}

/// The last found observation, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed<T> {
    pub value: T,
    pub label: String,
}

/// Lifecycle of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitState {
    Polling,
    Succeeded,
    TimedOut,
    Failed,
    Cancelled,
}

impl WaitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WaitState::Polling)
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitState::Polling => write!(f, "polling"),
            WaitState::Succeeded => write!(f, "succeeded"),
            WaitState::TimedOut => write!(f, "timed out"),
            WaitState::Failed => write!(f, "failed"),
            WaitState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why the machine failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not found more times in a row than tolerated
    NotFoundExceeded { checks: u32 },
    /// Found with a label in neither the pending nor the target set
    UnexpectedState { label: String },
}

/// Result of feeding one observation to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// Keep polling
    Continue,
    /// Target reached. `None` when the target was the resource's absence.
    Succeeded(Option<T>),
    Failed(Verdict),
    /// The machine was already terminal; the observation was dropped
    Ignored,
}

/// Per-wait counters and transition rules.
#[derive(Debug)]
pub struct WaitMachine<T> {
    spec: WaiterSpec,
    state: WaitState,
    ticks: u64,
    not_found: u32,
    target_streak: u32,
    last: Option<Observed<T>>,
}

impl<T> WaitMachine<T> {
    pub fn new(spec: WaiterSpec) -> Self {
        Self {
            spec,
            state: WaitState::Polling,
            ticks: 0,
            not_found: 0,
            target_streak: 0,
            last: None,
        }
    }

    pub fn spec(&self) -> &WaiterSpec {
        &self.spec
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Observations fed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Consecutive not-found observations.
    pub fn not_found_count(&self) -> u32 {
        self.not_found
    }

    /// Consecutive target observations.
    pub fn target_streak(&self) -> u32 {
        self.target_streak
    }

    pub fn last(&self) -> Option<&Observed<T>> {
        self.last.as_ref()
    }

    pub fn into_last(self) -> Option<Observed<T>> {
        self.last
    }

    /// Feed one observation.
    pub fn observe(&mut self, observation: Observation<T>) -> Step<T> {
        if self.state.is_terminal() {
            return Step::Ignored;
        }
        self.ticks += 1;

        match observation {
            Observation::NotFound => self.observe_not_found(),
            Observation::Found { value, label } => self.observe_found(value, label),
        }
    }

    /// Mark the wait as timed out. No-op when already terminal.
    pub fn time_out(&mut self) {
        if !self.state.is_terminal() {
            self.state = WaitState::TimedOut;
        }
    }

    /// Mark the wait as cancelled. No-op when already terminal.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = WaitState::Cancelled;
        }
    }

    /// Mark the wait as failed for a reason outside the machine, such as a
    /// probe error. No-op when already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = WaitState::Failed;
        }
    }

    fn observe_not_found(&mut self) -> Step<T> {
        if self.spec.waits_for_absence() {
            self.target_streak += 1;
            if self.target_streak >= self.spec.continuous_target_occurrence {
                self.state = WaitState::Succeeded;
                return Step::Succeeded(None);
            }
            return Step::Continue;
        }

        // Within tolerance a miss counts as a pending observation
        self.target_streak = 0;
        self.not_found += 1;
        if self.not_found > self.spec.not_found_tolerance {
            self.state = WaitState::Failed;
            return Step::Failed(Verdict::NotFoundExceeded {
                checks: self.not_found,
            });
        }
        Step::Continue
    }

    fn observe_found(&mut self, value: T, label: String) -> Step<T> {
        self.not_found = 0;

        if self.spec.is_target(&label) {
            self.target_streak += 1;
            if self.target_streak >= self.spec.continuous_target_occurrence {
                self.state = WaitState::Succeeded;
                return Step::Succeeded(Some(value));
            }
            self.last = Some(Observed { value, label });
            return Step::Continue;
        }

        if self.spec.is_pending(&label) {
            self.target_streak = 0;
            self.last = Some(Observed { value, label });
            return Step::Continue;
        }

        self.state = WaitState::Failed;
        let verdict = Verdict::UnexpectedState {
            label: label.clone(),
        };
        self.last = Some(Observed { value, label });
        Step::Failed(verdict)
    }
}
