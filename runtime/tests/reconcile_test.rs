//! Integration tests for diff/apply/wait reconciliation against a fake API.

use async_trait::async_trait;
use converge_engine::{
    ConfigTree, DiffOptions, NewKeyPolicy, Observation, OpKind, PatchOp, PatchPath, WaiterSpec,
};
use converge_runtime::{
    BoxError, Mutate, MutateAck, Probe, ProbeError, ReconcileError, Reconciler, WaitError,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A fake stage API. Each patch queues the statuses the stage reports next;
/// once the queue drains it reports `final_status`.
struct FakeStage {
    applied: Mutex<Vec<Vec<PatchOp>>>,
    statuses: Mutex<VecDeque<Option<&'static str>>>,
    final_status: Option<&'static str>,
    asynchronous: bool,
    reject: bool,
}

impl FakeStage {
    fn new(statuses: &[Option<&'static str>], final_status: Option<&'static str>) -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.iter().copied().collect()),
            final_status,
            asynchronous: true,
            reject: false,
        }
    }

    fn applied(&self) -> Vec<Vec<PatchOp>> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for FakeStage {
    type Value = String;

    async fn probe(&self) -> Result<Observation<String>, ProbeError> {
        let next = self.statuses.lock().unwrap().pop_front();
        match next.unwrap_or(self.final_status) {
            Some(status) => Ok(Observation::found(format!("stage is {status}"), status)),
            None => Err(ProbeError::NotFound),
        }
    }
}

#[async_trait]
impl Mutate for FakeStage {
    async fn apply(&self, ops: &[PatchOp]) -> Result<MutateAck, BoxError> {
        if self.reject {
            return Err("BadRequestException: invalid patch path".into());
        }
        self.applied.lock().unwrap().push(ops.to_vec());
        Ok(MutateAck {
            wait: self.asynchronous,
        })
    }
}

fn tree(value: serde_json::Value) -> ConfigTree {
    ConfigTree::from_json(&value).unwrap()
}

fn update_waiter() -> WaiterSpec {
    WaiterSpec::builder()
        .pending(["UPDATE_IN_PROGRESS"])
        .target(["AVAILABLE"])
        .timeout(Duration::from_secs(60))
        .poll_interval(Duration::from_secs(1))
        .not_found_tolerance(0)
        .continuous_target_occurrence(2)
        .build()
        .unwrap()
}

fn delete_waiter() -> WaiterSpec {
    WaiterSpec::builder()
        .pending(["DELETE_IN_PROGRESS", "AVAILABLE"])
        .timeout(Duration::from_secs(60))
        .poll_interval(Duration::from_secs(1))
        .not_found_tolerance(0)
        .continuous_target_occurrence(1)
        .build()
        .unwrap()
}

#[cfg(test)]
mod update_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_update_applies_patch_and_waits() {
        let stage = FakeStage::new(
            &[Some("UPDATE_IN_PROGRESS"), Some("AVAILABLE")],
            Some("AVAILABLE"),
        );
        let old = tree(json!({"description": "v1", "variables": {"a": "1", "b": "2"}}));
        let new = tree(json!({"description": "v2", "variables": {"a": "1", "c": "3"}}));

        let report = Reconciler::new(&stage)
            .update(&old, &new, &PatchPath::root(), Some(&update_waiter()))
            .await
            .unwrap();

        let rendered: Vec<String> = report.ops.iter().map(|op| op.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "replace /description = \"v2\"",
                "remove /variables/b",
                "replace /variables/c = \"3\"",
            ]
        );
        assert_eq!(stage.applied(), vec![report.ops.clone()]);
        assert_eq!(report.summary.total(), 3);
        assert!(report.waited());
        assert_eq!(report.outcome.as_ref().unwrap().ticks, 3);
        assert_eq!(report.value().map(String::as_str), Some("stage is AVAILABLE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_trees_send_nothing() {
        let stage = FakeStage::new(&[], Some("AVAILABLE"));
        let config = tree(json!({"variables": {"a": "1"}}));

        let report = Reconciler::new(&stage)
            .update(&config, &config, &PatchPath::root(), Some(&update_waiter()))
            .await
            .unwrap();

        assert!(report.ops.is_empty());
        assert!(!report.waited());
        assert!(stage.applied().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronous_change_skips_wait() {
        let mut stage = FakeStage::new(&[], Some("UPDATE_IN_PROGRESS"));
        stage.asynchronous = false;

        let report = Reconciler::new(&stage)
            .update(
                &tree(json!({"a": "1"})),
                &tree(json!({"a": "2"})),
                &PatchPath::root(),
                Some(&update_waiter()),
            )
            .await
            .unwrap();

        assert_eq!(report.ops.len(), 1);
        assert!(!report.waited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_base_path_and_add_policy() {
        let stage = FakeStage::new(&[], Some("AVAILABLE"));
        let old = tree(json!({"a": "1"}));
        let new = tree(json!({"a": "1", "b": "2"}));
        let base = PatchPath::parse("/variables").unwrap();

        let report = Reconciler::new(&stage)
            .with_options(DiffOptions {
                new_key_policy: NewKeyPolicy::AddWhenAbsent,
            })
            .update(&old, &new, &base, None)
            .await
            .unwrap();

        assert_eq!(report.ops.len(), 1);
        assert_eq!(report.ops[0].kind(), OpKind::Add);
        assert_eq!(report.ops[0].path().to_string(), "/variables/b");
        assert!(!report.waited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_patch_is_a_mutate_error() {
        let mut stage = FakeStage::new(&[], Some("AVAILABLE"));
        stage.reject = true;

        let err = Reconciler::new(&stage)
            .update(
                &tree(json!({"a": "1"})),
                &tree(json!({"a": "2"})),
                &PatchPath::root(),
                Some(&update_waiter()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Mutate(_)));
        assert_eq!(
            err.to_string(),
            "updating remote resource: BadRequestException: invalid patch path"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_fails_before_any_call() {
        let stage = FakeStage::new(&[], Some("AVAILABLE"));

        let err = Reconciler::new(&stage)
            .update(
                &tree(json!({"a": "1"})),
                &tree(json!({"a": {"nested": "1"}})),
                &PatchPath::root(),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Engine(_)));
        assert!(stage.applied().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_update_surfaces_unexpected_state() {
        let stage = FakeStage::new(&[Some("UPDATE_IN_PROGRESS")], Some("UPDATE_FAILED"));

        let err = Reconciler::new(&stage)
            .update(
                &tree(json!({"a": "1"})),
                &tree(json!({"a": "2"})),
                &PatchPath::root(),
                Some(&update_waiter()),
            )
            .await
            .unwrap_err();

        match err {
            ReconcileError::Wait(WaitError::UnexpectedState { label, .. }) => {
                assert_eq!(label, "UPDATE_FAILED")
            }
            other => panic!("expected unexpected state, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod delete_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_absence() {
        let stage = FakeStage::new(&[Some("DELETE_IN_PROGRESS"), Some("DELETE_IN_PROGRESS")], None);

        let report = Reconciler::new(&stage)
            .delete(|| async { Ok::<(), ProbeError>(()) }, &delete_waiter())
            .await
            .unwrap();

        let outcome = report.outcome.unwrap();
        assert_eq!(outcome.value, None);
        assert_eq!(outcome.ticks, 3);
        assert!(report.ops.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_of_missing_resource_succeeds() {
        let stage = FakeStage::new(&[], None);

        let report = Reconciler::new(&stage)
            .delete(|| async { Err::<(), _>(ProbeError::NotFound) }, &delete_waiter())
            .await
            .unwrap();

        assert!(!report.waited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_error_is_reported() {
        let stage = FakeStage::new(&[], None);

        let err = Reconciler::new(&stage)
            .delete(
                || async { Err::<(), _>(ProbeError::other("ConflictException: stage in use")) },
                &delete_waiter(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Delete(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_requires_absence_waiter() {
        let stage = FakeStage::new(&[], None);

        let err = Reconciler::new(&stage)
            .delete(|| async { Ok::<(), ProbeError>(()) }, &update_waiter())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Engine(_)));
    }
}
