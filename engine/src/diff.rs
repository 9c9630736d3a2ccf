//! Diff engine: compute patch operations between two configuration trees.
//!
//! # Algorithm
//!
//! A recursive structural walk over `(old, new)`:
//!
//! 1. Scalar vs scalar: one `replace` when the wire forms differ (an
//!    integer equals a float holding the same number)
//! 2. Map vs map: `remove` for keys only in old, a value op for keys that are
//!    new or changed, recursing into nested containers
//! 3. Block vs block: a single `remove` at the block's own path when it
//!    disappears, otherwise a field-by-field walk so remote-computed fields
//!    outside the configuration are left alone
//! 4. An absent block opposite a scalar or map reads as a missing key, so
//!    JSON `null` clears a field instead of failing as a type mismatch
//!
//! A container that did not exist before and yields no field operations is
//! created with a single `{}` value at its own path.
//!
//! Keys are visited in alphabetical order at every level, so the output is
//! deterministic and `diff(x, x)` is always empty.

use crate::tree::Fields;
use crate::{ConfigTree, Error, OpKind, PatchOp, PatchPath, Result, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which operation to emit for a key that did not exist in the old tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NewKeyPolicy {
    /// Always `replace`, even for brand-new keys (default)
    #[default]
    AlwaysReplace,
    /// `add` when the key is absent in old, `replace` when present
    AddWhenAbsent,
}

/// Options controlling the diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOptions {
    pub new_key_policy: NewKeyPolicy,
}

/// Computes patch operations with a fixed set of options.
///
/// Stateless; a single `Differ` can be shared freely across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Differ {
    options: DiffOptions,
}

/// Compute the operations turning `old` into `new`, addressed under `base`,
/// using the default options.
pub fn diff(old: &ConfigTree, new: &ConfigTree, base: &PatchPath) -> Result<Vec<PatchOp>> {
    Differ::default().diff(old, new, base)
}

impl Differ {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DiffOptions {
        self.options
    }

    /// Compute the ordered operations turning `old` into `new`.
    pub fn diff(
        &self,
        old: &ConfigTree,
        new: &ConfigTree,
        base: &PatchPath,
    ) -> Result<Vec<PatchOp>> {
        let mut ops = Vec::new();
        self.walk(Some(old), new, base, &mut ops)?;
        Ok(ops)
    }

    /// Diff `new` against `old`, where `None` means the old value did not exist.
    fn walk(
        &self,
        old: Option<&ConfigTree>,
        new: &ConfigTree,
        path: &PatchPath,
        ops: &mut Vec<PatchOp>,
    ) -> Result<()> {
        match (old, new) {
            // An absent block opposite a scalar or map stands for a missing key
            (Some(ConfigTree::Block(None)), n) if !is_block(n) => self.walk(None, n, path, ops)?,
            (Some(o), ConfigTree::Block(None)) if !is_block(o) => {
                ops.push(PatchOp::remove(path.clone()))
            }
            (None, ConfigTree::Scalar(n)) => {
                let value = n.to_wire(path)?;
                ops.push(self.new_value_op(path.clone(), value));
            }
            (Some(ConfigTree::Scalar(o)), ConfigTree::Scalar(n)) => {
                self.diff_scalar(o, n, path, ops)?;
            }
            (None, ConfigTree::Map(n)) => self.diff_new_container(n, path, ops)?,
            (Some(ConfigTree::Map(o)), ConfigTree::Map(n)) => {
                self.diff_fields(Some(o), n, path, ops)?
            }
            (None, ConfigTree::Block(None)) => {}
            (None, ConfigTree::Block(Some(n))) => self.diff_new_container(n, path, ops)?,
            (Some(ConfigTree::Block(o)), ConfigTree::Block(n)) => {
                self.diff_block(o.as_ref(), n.as_ref(), path, ops)?
            }
            (Some(o), n) => {
                return Err(Error::TypeMismatch {
                    path: path.to_string(),
                    old: o.kind(),
                    new: n.kind(),
                })
            }
        }
        Ok(())
    }

    /// A container that did not exist before. When none of its fields
    /// yield an operation it is created empty with a `{}` value.
    fn diff_new_container(
        &self,
        new: &Fields,
        path: &PatchPath,
        ops: &mut Vec<PatchOp>,
    ) -> Result<()> {
        let before = ops.len();
        self.diff_fields(None, new, path, ops)?;
        if ops.len() == before {
            ops.push(self.new_value_op(path.clone(), EMPTY_CONTAINER.to_string()));
        }
        Ok(())
    }

    fn diff_scalar(
        &self,
        old: &Scalar,
        new: &Scalar,
        path: &PatchPath,
        ops: &mut Vec<PatchOp>,
    ) -> Result<()> {
        let new_wire = new.to_wire(path)?;
        let old_wire = old.to_wire(path)?;
        if old_wire != new_wire && !same_number(old, new) {
            ops.push(PatchOp::replace(path.clone(), new_wire));
        }
        Ok(())
    }

    fn diff_block(
        &self,
        old: Option<&Fields>,
        new: Option<&Fields>,
        path: &PatchPath,
        ops: &mut Vec<PatchOp>,
    ) -> Result<()> {
        match (old, new) {
            // The whole sub-resource goes; its fields go with it
            (Some(_), None) => ops.push(PatchOp::remove(path.clone())),
            (None, None) => {}
            (None, Some(new)) => self.diff_new_container(new, path, ops)?,
            (Some(old), Some(new)) => self.diff_fields(Some(old), new, path, ops)?,
        }
        Ok(())
    }

    /// Walk the union of keys in alphabetical order.
    fn diff_fields(
        &self,
        old: Option<&Fields>,
        new: &Fields,
        path: &PatchPath,
        ops: &mut Vec<PatchOp>,
    ) -> Result<()> {
        let keys: BTreeSet<&String> = old
            .into_iter()
            .flat_map(|fields| fields.keys())
            .chain(new.keys())
            .collect();

        for key in keys {
            let child = path.child(key.as_str());
            let old_value = old.and_then(|fields| fields.get(key));

            match new.get(key) {
                Some(n) => self.walk(old_value, n, &child, ops)?,
                None => {
                    if old_value.is_some_and(is_present) {
                        ops.push(PatchOp::remove(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn new_value_op(&self, path: PatchPath, value: String) -> PatchOp {
        match self.options.new_key_policy {
            NewKeyPolicy::AlwaysReplace => PatchOp::replace(path, value),
            NewKeyPolicy::AddWhenAbsent => PatchOp::add(path, value),
        }
    }
}

/// Wire value of a container created without fields.
const EMPTY_CONTAINER: &str = "{}";

/// An absent block has nothing to remove remotely.
fn is_present(tree: &ConfigTree) -> bool {
    !matches!(tree, ConfigTree::Block(None))
}

fn is_block(tree: &ConfigTree) -> bool {
    matches!(tree, ConfigTree::Block(_))
}

/// An integer and a float holding the same number, such as JSON `1` and `1.0`.
/// Floats compare at wire precision.
fn same_number(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Int(i), Scalar::Float(f)) | (Scalar::Float(f), Scalar::Int(i)) => {
            f.is_finite() && format!("{:.6}", *i as f64) == format!("{:.6}", f)
        }
        _ => false,
    }
}

/// Counts of operations by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub adds: usize,
    pub replaces: usize,
    pub removes: usize,
}

impl DiffSummary {
    pub fn from_ops(ops: &[PatchOp]) -> Self {
        let mut summary = Self::default();
        for op in ops {
            match op.kind() {
                OpKind::Add => summary.adds += 1,
                OpKind::Replace => summary.replaces += 1,
                OpKind::Remove => summary.removes += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.adds + self.replaces + self.removes
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
