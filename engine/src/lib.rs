//! # Converge Engine
//!
//! Deterministic building blocks for reconciling declarative configuration
//! against an eventually-consistent control-plane API.
//!
//! This crate computes the minimal set of patch operations between two
//! configuration snapshots and holds the transition rules for waiting on an
//! asynchronous state change. The same inputs always produce the same outputs.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of networks, clocks or the remote API
//! - **Deterministic**: Patch output is ordered alphabetically by path segment
//! - **Testable**: Pure logic, no mocks needed
//! - **Portable**: Runs anywhere Rust runs, and behind a C ABI via [`ffi`]
//!
//! ## Core Concepts
//!
//! ### Configuration Trees
//!
//! A [`ConfigTree`] is a scalar, a map, or an optional nested block
//! (0-or-1 cardinality). Maps are ordered, so equality ignores key order.
//!
//! ### Patch Operations
//!
//! Changes are expressed as [`PatchOp`]s addressed by a [`PatchPath`]:
//! - `add` / `replace` carry a value, already in its wire form
//! - `remove` never carries a value
//!
//! ### Diffing
//!
//! [`diff`] walks two trees structurally. Removed keys become `remove`,
//! new or changed leaves become `replace` (or `add`, see [`NewKeyPolicy`]),
//! and a removed block is removed with a single operation.
//!
//! ### Waiting
//!
//! A [`WaiterSpec`] names the pending and target status labels, the timeout,
//! the poll interval, the not-found tolerance and the number of consecutive
//! target observations required. [`WaitMachine`] applies those rules one
//! observation at a time; the async polling loop lives in `converge-runtime`.
//!
//! ## Quick Start
//!
//! ```rust
//! use converge_engine::{diff, ConfigTree, PatchOp, PatchPath};
//!
//! let old = ConfigTree::map([
//!     ("a", ConfigTree::string("1")),
//!     ("b", ConfigTree::string("2")),
//! ]);
//! let new = ConfigTree::map([
//!     ("a", ConfigTree::string("1")),
//!     ("c", ConfigTree::string("3")),
//! ]);
//!
//! let ops = diff(&old, &new, &PatchPath::root()).unwrap();
//! assert_eq!(
//!     ops,
//!     vec![
//!         PatchOp::remove(PatchPath::parse("/b").unwrap()),
//!         PatchOp::replace(PatchPath::parse("/c").unwrap(), "3"),
//!     ]
//! );
//!
//! // Equal trees never produce operations
//! assert!(diff(&new, &new, &PatchPath::root()).unwrap().is_empty());
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for use from other
//! languages. All data is exchanged as JSON strings.

pub mod diff;
pub mod error;
pub mod ffi;
pub mod patch;
pub mod path;
pub mod tree;
pub mod wait;

// Re-export main types at crate root
pub use diff::{diff, DiffOptions, DiffSummary, Differ, NewKeyPolicy};
pub use error::{Error, Result};
pub use patch::{OpKind, PatchOp};
pub use path::PatchPath;
pub use tree::{ConfigTree, Fields, Scalar};
pub use wait::{
    Observation, Observed, Step, Verdict, WaitMachine, WaitState, WaiterSpec, WaiterSpecBuilder,
};
