//! # Converge Runtime
//!
//! Async side of converge: polls a remote resource until a state change
//! settles and drives diff/apply/wait reconciliations.
//!
//! The transition rules live in [`converge_engine::WaitMachine`]; this crate
//! adds the clock, cancellation and the seams to the remote API:
//!
//! - [`Probe`] reads the current status label of the resource
//! - [`Mutate`] applies patch operations
//! - [`Waiter`] polls a probe until a target label is seen often enough
//! - [`Reconciler`] diffs two trees, applies the patch and waits
//!
//! ## Example
//!
//! ```rust
//! use converge_engine::{Observation, WaiterSpec};
//! use converge_runtime::{probe_fn, CancelToken, ProbeError, Waiter};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = WaiterSpec::builder()
//!     .pending(["Pending"])
//!     .target(["Available"])
//!     .timeout(Duration::from_secs(5))
//!     .poll_interval(Duration::from_millis(1))
//!     .not_found_tolerance(0)
//!     .continuous_target_occurrence(2)
//!     .build()?;
//!
//! let polls = Arc::new(AtomicU32::new(0));
//! let probe = probe_fn(move || {
//!     let polls = polls.clone();
//!     async move {
//!         let n = polls.fetch_add(1, Ordering::SeqCst);
//!         let label = if n < 2 { "Pending" } else { "Available" };
//!         Ok::<_, ProbeError>(Observation::found(n, label))
//!     }
//! });
//!
//! let outcome = Waiter::new(spec).wait(&probe, &CancelToken::never()).await?;
//! assert_eq!(outcome.value, Some(3));
//! assert_eq!(outcome.ticks, 4);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod probe;
pub mod reconcile;
pub mod waiter;

pub use cancel::CancelToken;
pub use command::{CommandError, CommandProbe};
pub use config::{Config, ConfigError};
pub use error::{BoxError, ProbeError, ReconcileError, WaitError};
pub use probe::{probe_fn, Probe, ProbeFn};
pub use reconcile::{Mutate, MutateAck, ReconcileReport, Reconciler};
pub use waiter::{WaitOutcome, Waiter};
