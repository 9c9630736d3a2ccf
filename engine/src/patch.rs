//! Patch operations.
//!
//! A [`PatchOp`] is one add/replace/remove instruction against a remote
//! resource. Values are always pre-serialized to their wire form, so the
//! representation is textual regardless of the scalar type that produced it.

use crate::{Error, PatchPath, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Replace,
    Remove,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Replace => "replace",
            OpKind::Remove => "remove",
        }
    }

    /// Whether operations of this kind carry a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, OpKind::Remove)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single patch operation.
///
/// `value` is present iff the kind is `add` or `replace`. The constructors
/// are the only way to build one, and deserialization re-checks the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPatchOp")]
pub struct PatchOp {
    op: OpKind,
    path: PatchPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl PatchOp {
    pub fn add(path: PatchPath, value: impl Into<String>) -> Self {
        Self {
            op: OpKind::Add,
            path,
            value: Some(value.into()),
        }
    }

    pub fn replace(path: PatchPath, value: impl Into<String>) -> Self {
        Self {
            op: OpKind::Replace,
            path,
            value: Some(value.into()),
        }
    }

    pub fn remove(path: PatchPath) -> Self {
        Self {
            op: OpKind::Remove,
            path,
            value: None,
        }
    }

    /// Build an operation from its parts, enforcing the value rule.
    pub fn new(op: OpKind, path: PatchPath, value: Option<String>) -> Result<Self> {
        match (op.takes_value(), value.is_some()) {
            (true, false) => Err(Error::InvalidOperation {
                op: op.as_str(),
                path: path.to_string(),
                reason: "requires a value",
            }),
            (false, true) => Err(Error::InvalidOperation {
                op: op.as_str(),
                path: path.to_string(),
                reason: "must not carry a value",
            }),
            _ => Ok(Self { op, path, value }),
        }
    }

    pub fn kind(&self) -> OpKind {
        self.op
    }

    pub fn path(&self) -> &PatchPath {
        &self.path
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} = {:?}", self.op, self.path, value),
            None => write!(f, "{} {}", self.op, self.path),
        }
    }
}

/// Wire shape before validation.
#[derive(Deserialize)]
struct RawPatchOp {
    op: OpKind,
    path: PatchPath,
    #[serde(default)]
    value: Option<String>,
}

impl TryFrom<RawPatchOp> for PatchOp {
    type Error = Error;

    fn try_from(raw: RawPatchOp) -> Result<Self> {
        PatchOp::new(raw.op, raw.path, raw.value)
    }
}

/// Serialize a list of operations as a JSON-Patch-shaped document.
pub fn to_document(ops: &[PatchOp]) -> Result<String> {
    serde_json::to_string(ops).map_err(|e| Error::InvalidPayload(e.to_string()))
}

/// Parse a JSON-Patch-shaped document.
pub fn from_document(json: &str) -> Result<Vec<PatchOp>> {
    serde_json::from_str(json).map_err(|e| Error::InvalidPayload(e.to_string()))
}
