//! End-to-end automation lifecycle scenarios.

use std::sync::Arc;

use hearth_core::lifecycle::{
    ApprovalError, ApprovalService, AutomationManagement, AutomationStore, ExecutionMetrics,
    InMemoryAutomationStore, LifecycleError, LifecycleState, WorkflowStatus, WorkflowType,
};

fn service_with_store() -> (ApprovalService, Arc<InMemoryAutomationStore>) {
    let store = Arc::new(InMemoryAutomationStore::new());
    let service = ApprovalService::new(
        Arc::clone(&store) as Arc<dyn AutomationStore>,
        true,
        chrono::Duration::days(30),
    );
    (service, store)
}

#[tokio::test]
async fn test_full_creation_flow() {
    let (svc, store) = service_with_store();

    // With the approval gate on, registration lands in pending.
    let automation = svc
        .register_automation("automation.evening", "Evening scene", "suggestion-engine")
        .await
        .unwrap();
    assert_eq!(automation.state, LifecycleState::Pending);

    let workflow = svc
        .request_change(
            automation.id,
            WorkflowType::Creation,
            "suggestion-engine",
            Some("learned evening pattern".into()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Pending);

    let resolved = svc.approve(workflow.id, "alice", None).await.unwrap();
    assert_eq!(resolved.status, WorkflowStatus::Approved);

    let stored = store.get(automation.id).await.unwrap().unwrap();
    assert_eq!(stored.state, LifecycleState::Active);
    assert!(stored.active);
    // Registration write plus the approval transition.
    assert!(stored.version >= 1);
}

#[tokio::test]
async fn test_single_flight_across_workflow_types() {
    let (svc, _store) = service_with_store();
    let automation = svc
        .register_automation("automation.evening", "Evening scene", "engine")
        .await
        .unwrap();

    let first = svc
        .request_change(automation.id, WorkflowType::Creation, "engine", None, None)
        .await
        .unwrap();

    for wf_type in [
        WorkflowType::Creation,
        WorkflowType::Modification,
        WorkflowType::Retirement,
    ] {
        let err = svc
            .request_change(automation.id, wf_type, "bob", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::Conflict(id) if id == automation.id));
    }

    svc.reject(first.id, "alice", Some("not yet".into()))
        .await
        .unwrap();
    assert!(
        svc.request_change(automation.id, WorkflowType::Creation, "engine", None, None)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_emergency_stop_halts_approved_change() {
    let (svc, store) = service_with_store();
    let automation = svc
        .register_automation("automation.heater", "Heater boost", "engine")
        .await
        .unwrap();

    let workflow = svc
        .request_change(automation.id, WorkflowType::Creation, "engine", None, None)
        .await
        .unwrap();
    svc.approve(workflow.id, "alice", None).await.unwrap();
    assert_eq!(
        store.get(automation.id).await.unwrap().unwrap().state,
        LifecycleState::Active
    );

    // Stop overrides the already-approved workflow and halts the automation.
    let stopped = svc
        .trigger_emergency_stop(workflow.id, "operator", Some("overheating".into()))
        .await
        .unwrap();
    assert_eq!(stopped.status, WorkflowStatus::Cancelled);
    assert!(stopped.emergency_stop);
    let stop_meta = stopped.metadata.get("emergency_stop").unwrap();
    assert_eq!(stop_meta["operator"], "operator");
    assert_eq!(stop_meta["reason"], "overheating");

    let halted = store.get(automation.id).await.unwrap().unwrap();
    assert_eq!(halted.state, LifecycleState::Inactive);
    assert!(!halted.active);
}

#[tokio::test]
async fn test_retired_automation_rejects_new_requests() {
    let (svc, _store) = service_with_store();
    let automation = svc
        .register_automation("automation.old", "Old routine", "engine")
        .await
        .unwrap();

    let workflow = svc
        .request_change(automation.id, WorkflowType::Retirement, "engine", None, None)
        .await
        .unwrap();
    svc.approve(workflow.id, "alice", None).await.unwrap();

    let err = svc
        .request_change(automation.id, WorkflowType::Modification, "bob", None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApprovalError::Lifecycle(LifecycleError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_writers_do_not_lose_updates() {
    let (svc, store) = service_with_store();
    let automation = svc
        .register_automation("automation.lights", "Lights", "engine")
        .await
        .unwrap();

    // A raw stale write against the store is rejected.
    let fresh = store.get(automation.id).await.unwrap().unwrap();
    let stale = fresh.clone();

    let mut winner = fresh;
    winner.name = "Lights v2".into();
    store.update(winner).await.unwrap();

    let err = store.update(stale).await.unwrap_err();
    assert!(matches!(err, LifecycleError::StaleVersion { .. }));

    // The service-level metric writer retries around such conflicts.
    let updated = svc
        .record_execution(
            automation.id,
            &ExecutionMetrics {
                execution_count: 3,
                success_rate: 1.0,
                average_execution_time_ms: 25.0,
                performance_score: 0.9,
                last_executed_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.execution_count, 3);
    assert_eq!(updated.name, "Lights v2");
}

#[tokio::test]
async fn test_workflow_history_is_append_only_audit() {
    let (svc, _store) = service_with_store();
    let automation = svc
        .register_automation("automation.blinds", "Blinds", "engine")
        .await
        .unwrap();

    let first = svc
        .request_change(
            automation.id,
            WorkflowType::Creation,
            "engine",
            Some("initial".into()),
            None,
        )
        .await
        .unwrap();
    svc.reject(first.id, "alice", Some("too aggressive".into()))
        .await
        .unwrap();

    let second = svc
        .request_change(automation.id, WorkflowType::Creation, "engine", None, None)
        .await
        .unwrap();
    svc.approve(second.id, "alice", None).await.unwrap();

    let history = svc.workflow_history(automation.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, WorkflowStatus::Rejected);
    assert_eq!(history[0].rejected_by.as_deref(), Some("alice"));
    assert_eq!(
        history[0].metadata["rejection_reason"],
        "too aggressive"
    );
    assert_eq!(history[1].status, WorkflowStatus::Approved);
    assert!(history[1].resolved_at.is_some());
}

#[tokio::test]
async fn test_sweep_and_reactivation() {
    let store = Arc::new(InMemoryAutomationStore::new());
    let svc = ApprovalService::new(
        Arc::clone(&store) as Arc<dyn AutomationStore>,
        false,
        chrono::Duration::days(7),
    );

    let mut idle = AutomationManagement::new(
        "automation.idle",
        "Idle routine",
        LifecycleState::Active,
        "engine",
    );
    idle.created_at = chrono::Utc::now() - chrono::Duration::days(14);
    store.insert(idle.clone()).await.unwrap();

    assert_eq!(svc.sweep_inactive("sweeper").await.unwrap(), 1);
    assert_eq!(
        store.get(idle.id).await.unwrap().unwrap().state,
        LifecycleState::Inactive
    );

    // Explicit re-enable flips it back without a workflow.
    let reactivated = svc.set_enabled(idle.id, true, "alice").await.unwrap();
    assert_eq!(reactivated.state, LifecycleState::Active);

    // A fresh execution keeps it out of the next sweep.
    svc.record_execution(
        idle.id,
        &ExecutionMetrics {
            execution_count: 1,
            success_rate: 1.0,
            average_execution_time_ms: 10.0,
            performance_score: 1.0,
            last_executed_at: chrono::Utc::now(),
        },
    )
    .await
    .unwrap();
    assert_eq!(svc.sweep_inactive("sweeper").await.unwrap(), 0);
}
