//! FFI layer for embedding the engine in other runtimes.
//!
//! This module provides C-compatible functions for diffing configuration
//! trees and for driving the wait state machine from a foreign event loop.
//! All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `converge_*` functions are allocated by Rust
//! - Caller must free them with `converge_string_free`
//! - Waiter pointers must be freed with `converge_waiter_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    ConfigTree, DiffOptions, Differ, Observation, PatchPath, Step, Verdict, WaitMachine,
    WaiterSpec,
};
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Result wrapper for FFI responses.
#[derive(Serialize)]
#[serde(untagged)]
enum FfiResult<T: Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `converge_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            // Static literal without interior nul bytes
            let error = c"{\"error\":\"string contained null bytes\"}";
            error.to_owned().into_raw()
        }
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn error_json(message: impl Into<String>) -> *mut c_char {
    to_c_string(FfiResult::<()>::err(message).to_json())
}

/// Observation as sent by the caller.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FfiObservation {
    found: bool,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: serde_json::Value,
}

/// Step as returned to the caller.
#[derive(Serialize)]
#[serde(tag = "step", rename_all = "camelCase")]
enum FfiStep {
    Continue,
    Succeeded {
        value: Option<serde_json::Value>,
    },
    Failed {
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        checks: Option<u32>,
    },
    Ignored,
}

impl From<Step<serde_json::Value>> for FfiStep {
    fn from(step: Step<serde_json::Value>) -> Self {
        match step {
            Step::Continue => FfiStep::Continue,
            Step::Succeeded(value) => FfiStep::Succeeded { value },
            Step::Failed(Verdict::NotFoundExceeded { checks }) => FfiStep::Failed {
                reason: "notFoundExceeded",
                label: None,
                checks: Some(checks),
            },
            Step::Failed(Verdict::UnexpectedState { label }) => FfiStep::Failed {
                reason: "unexpectedState",
                label: Some(label),
                checks: None,
            },
            Step::Ignored => FfiStep::Ignored,
        }
    }
}

/// Wait state machine handed out to foreign callers.
pub struct FfiWaiter {
    machine: WaitMachine<serde_json::Value>,
}

// ============================================================================
// Diff
// ============================================================================

/// Compute patch operations between two configuration documents.
///
/// # Arguments
/// - `old_json`, `new_json`: JSON configuration documents
/// - `base_path`: escaped base path (e.g. `/variables`), or null for the root
/// - `options_json`: JSON `DiffOptions`, or null for the defaults
///
/// # Returns
/// JSON string: `{"ok": [PatchOp, ...]}` or `{"error": "message"}`
///
/// # Safety
/// - All pointers must be valid null-terminated C strings or null
/// - Caller must free the returned string with `converge_string_free`
#[no_mangle]
pub unsafe extern "C" fn converge_diff(
    old_json: *const c_char,
    new_json: *const c_char,
    base_path: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    let (old_str, new_str) = match (from_c_string(old_json), from_c_string(new_json)) {
        (Some(o), Some(n)) => (o, n),
        _ => return error_json("invalid configuration JSON"),
    };

    let old: ConfigTree = match serde_json::from_str(&old_str) {
        Ok(t) => t,
        Err(e) => return error_json(format!("parse error in old: {}", e)),
    };
    let new: ConfigTree = match serde_json::from_str(&new_str) {
        Ok(t) => t,
        Err(e) => return error_json(format!("parse error in new: {}", e)),
    };

    let base = match from_c_string(base_path) {
        Some(raw) => match PatchPath::parse(&raw) {
            Ok(p) => p,
            Err(e) => return error_json(e.to_string()),
        },
        None => PatchPath::root(),
    };

    let options: DiffOptions = match from_c_string(options_json) {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(o) => o,
            Err(e) => return error_json(format!("parse error in options: {}", e)),
        },
        None => DiffOptions::default(),
    };

    match Differ::new(options).diff(&old, &new, &base) {
        Ok(ops) => to_c_string(FfiResult::ok(ops).to_json()),
        Err(e) => error_json(e.to_string()),
    }
}

// ============================================================================
// Waiter Lifecycle
// ============================================================================

/// Create a wait state machine.
///
/// # Arguments
/// - `spec_json`: JSON `WaiterSpec` (millisecond durations)
///
/// # Returns
/// Pointer to the waiter, or null on failure.
///
/// # Safety
/// - `spec_json` must be a valid null-terminated C string or null
/// - Caller must free the returned pointer with `converge_waiter_free`
#[no_mangle]
pub unsafe extern "C" fn converge_waiter_new(spec_json: *const c_char) -> *mut FfiWaiter {
    let spec_str = match from_c_string(spec_json) {
        Some(s) => s,
        None => return ptr::null_mut(),
    };

    let spec: WaiterSpec = match serde_json::from_str(&spec_str) {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    Box::into_raw(Box::new(FfiWaiter {
        machine: WaitMachine::new(spec),
    }))
}

/// Free a waiter.
///
/// # Safety
/// - `waiter` must be a valid pointer from `converge_waiter_new`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn converge_waiter_free(waiter: *mut FfiWaiter) {
    if !waiter.is_null() {
        drop(Box::from_raw(waiter));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `converge_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn converge_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Waiter Operations
// ============================================================================

/// Feed one probe observation to the waiter.
///
/// # Arguments
/// - `observation_json`: `{"found": true, "label": "...", "value": ...}` or
///   `{"found": false}`
///
/// # Returns
/// JSON string: `{"ok": {"step": "continue" | "succeeded" | "failed" | "ignored", ...}}`
/// or `{"error": "message"}`
///
/// # Safety
/// - `waiter` must be a valid pointer from `converge_waiter_new` or null
/// - `observation_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `converge_string_free`
#[no_mangle]
pub unsafe extern "C" fn converge_waiter_observe(
    waiter: *mut FfiWaiter,
    observation_json: *const c_char,
) -> *mut c_char {
    let waiter = match waiter.as_mut() {
        Some(w) => w,
        None => return error_json("null waiter pointer"),
    };

    let raw = match from_c_string(observation_json) {
        Some(s) => s,
        None => return error_json("invalid observation JSON"),
    };

    let observation: FfiObservation = match serde_json::from_str(&raw) {
        Ok(o) => o,
        Err(e) => return error_json(format!("parse error: {}", e)),
    };

    let observation = match (observation.found, observation.label) {
        (false, _) => Observation::NotFound,
        (true, Some(label)) => Observation::found(observation.value, label),
        (true, None) => return error_json("found observation requires a label"),
    };

    let step = FfiStep::from(waiter.machine.observe(observation));
    to_c_string(FfiResult::ok(step).to_json())
}

/// Report the waiter's state (`polling`, `succeeded`, `failed`, ...).
///
/// # Safety
/// - `waiter` must be a valid pointer from `converge_waiter_new` or null
/// - Caller must free the returned string with `converge_string_free`
#[no_mangle]
pub unsafe extern "C" fn converge_waiter_state(waiter: *const FfiWaiter) -> *mut c_char {
    match waiter.as_ref() {
        Some(w) => to_c_string(FfiResult::ok(w.machine.state()).to_json()),
        None => error_json("null waiter pointer"),
    }
}

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn converge_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
