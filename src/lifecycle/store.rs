//! Persistence traits for automations and approval workflows.
//!
//! Backends enforce the two data-integrity invariants: optimistic version
//! checks on automation writes, and at most one non-terminal workflow per
//! automation (checked and created under one transaction). The in-memory
//! implementation keeps both maps under a single async mutex, which gives
//! the same atomicity a unique constraint provides in a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::lifecycle::approval::{ApprovalError, ApprovalWorkflow};
use crate::lifecycle::{AutomationManagement, LifecycleError};

/// Storage for automation records and their approval workflows.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    /// Insert a newly registered automation.
    async fn insert(
        &self,
        automation: AutomationManagement,
    ) -> Result<AutomationManagement, LifecycleError>;

    /// Fetch an automation by id.
    async fn get(&self, id: Uuid) -> Result<Option<AutomationManagement>, LifecycleError>;

    /// Write an automation read at `automation.version`.
    ///
    /// Rejects the write with [`LifecycleError::StaleVersion`] when the
    /// stored version differs; on success the stored version is incremented
    /// by exactly one and the updated record returned.
    async fn update(
        &self,
        automation: AutomationManagement,
    ) -> Result<AutomationManagement, LifecycleError>;

    /// All automations.
    async fn list(&self) -> Result<Vec<AutomationManagement>, LifecycleError>;

    /// Create a workflow, enforcing single-flight per automation.
    ///
    /// Fails with [`ApprovalError::Conflict`] when the automation already
    /// has a workflow in a non-terminal status.
    async fn create_workflow(
        &self,
        workflow: ApprovalWorkflow,
    ) -> Result<ApprovalWorkflow, ApprovalError>;

    /// Fetch a workflow by id.
    async fn get_workflow(&self, id: Uuid) -> Result<Option<ApprovalWorkflow>, ApprovalError>;

    /// Overwrite a workflow row. Workflow rows are the audit record; callers
    /// only append to them, never erase fields.
    async fn update_workflow(
        &self,
        workflow: ApprovalWorkflow,
    ) -> Result<ApprovalWorkflow, ApprovalError>;

    /// Historical workflows for one automation, oldest first.
    async fn workflows_for(
        &self,
        automation_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ApprovalError>;
}

#[derive(Debug, Default)]
struct Inner {
    automations: HashMap<Uuid, AutomationManagement>,
    workflows: HashMap<Uuid, ApprovalWorkflow>,
}

/// In-memory store used by tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryAutomationStore {
    inner: Mutex<Inner>,
}

impl InMemoryAutomationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AutomationStore for InMemoryAutomationStore {
    async fn insert(
        &self,
        automation: AutomationManagement,
    ) -> Result<AutomationManagement, LifecycleError> {
        let mut inner = self.inner.lock().await;
        inner.automations.insert(automation.id, automation.clone());
        Ok(automation)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AutomationManagement>, LifecycleError> {
        Ok(self.inner.lock().await.automations.get(&id).cloned())
    }

    async fn update(
        &self,
        mut automation: AutomationManagement,
    ) -> Result<AutomationManagement, LifecycleError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .automations
            .get(&automation.id)
            .ok_or(LifecycleError::NotFound(automation.id))?;

        if stored.version != automation.version {
            return Err(LifecycleError::StaleVersion {
                id: automation.id,
                expected: automation.version,
                actual: stored.version,
            });
        }

        automation.version += 1;
        inner.automations.insert(automation.id, automation.clone());
        Ok(automation)
    }

    async fn list(&self) -> Result<Vec<AutomationManagement>, LifecycleError> {
        Ok(self.inner.lock().await.automations.values().cloned().collect())
    }

    async fn create_workflow(
        &self,
        workflow: ApprovalWorkflow,
    ) -> Result<ApprovalWorkflow, ApprovalError> {
        let mut inner = self.inner.lock().await;

        let in_flight = inner.workflows.values().any(|w| {
            w.automation_id == workflow.automation_id && !w.status.is_terminal()
        });
        if in_flight {
            return Err(ApprovalError::Conflict(workflow.automation_id));
        }

        inner.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<ApprovalWorkflow>, ApprovalError> {
        Ok(self.inner.lock().await.workflows.get(&id).cloned())
    }

    async fn update_workflow(
        &self,
        workflow: ApprovalWorkflow,
    ) -> Result<ApprovalWorkflow, ApprovalError> {
        let mut inner = self.inner.lock().await;
        if !inner.workflows.contains_key(&workflow.id) {
            return Err(ApprovalError::WorkflowNotFound(workflow.id));
        }
        inner.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn workflows_for(
        &self,
        automation_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ApprovalError> {
        let inner = self.inner.lock().await;
        let mut workflows: Vec<_> = inner
            .workflows
            .values()
            .filter(|w| w.automation_id == automation_id)
            .cloned()
            .collect();
        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use crate::lifecycle::approval::{WorkflowStatus, WorkflowType};

    fn automation() -> AutomationManagement {
        AutomationManagement::new(
            "automation.morning",
            "Morning lights",
            LifecycleState::Active,
            "admin",
        )
    }

    #[tokio::test]
    async fn test_update_with_current_version_increments_by_one() {
        let store = InMemoryAutomationStore::new();
        let stored = store.insert(automation()).await.unwrap();
        assert_eq!(stored.version, 0);

        let mut read = store.get(stored.id).await.unwrap().unwrap();
        read.name = "Renamed".into();
        let updated = store.update(read).await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(
            store.get(stored.id).await.unwrap().unwrap().name,
            "Renamed"
        );
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let store = InMemoryAutomationStore::new();
        let stored = store.insert(automation()).await.unwrap();

        let stale = store.get(stored.id).await.unwrap().unwrap();
        let mut fresh = stale.clone();
        fresh.name = "First writer".into();
        store.update(fresh).await.unwrap();

        let err = store.update(stale).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StaleVersion { .. }));
    }

    #[tokio::test]
    async fn test_second_non_terminal_workflow_conflicts() {
        let store = InMemoryAutomationStore::new();
        let stored = store.insert(automation()).await.unwrap();

        let first = ApprovalWorkflow::new(
            stored.id,
            WorkflowType::Modification,
            "alice",
            Some("tune schedule".into()),
            None,
        );
        store.create_workflow(first.clone()).await.unwrap();

        for wf_type in [
            WorkflowType::Creation,
            WorkflowType::Modification,
            WorkflowType::Retirement,
        ] {
            let second =
                ApprovalWorkflow::new(stored.id, wf_type, "bob", None, None);
            let err = store.create_workflow(second).await.unwrap_err();
            assert!(matches!(err, ApprovalError::Conflict(id) if id == stored.id));
        }

        // Resolving the first allows a new one.
        let mut resolved = first;
        resolved.status = WorkflowStatus::Rejected;
        store.update_workflow(resolved).await.unwrap();

        let third = ApprovalWorkflow::new(
            stored.id,
            WorkflowType::Retirement,
            "bob",
            None,
            None,
        );
        assert!(store.create_workflow(third).await.is_ok());
    }

    #[tokio::test]
    async fn test_workflows_for_sorted_by_creation() {
        let store = InMemoryAutomationStore::new();
        let stored = store.insert(automation()).await.unwrap();

        let mut first = ApprovalWorkflow::new(
            stored.id,
            WorkflowType::Modification,
            "alice",
            None,
            None,
        );
        store.create_workflow(first.clone()).await.unwrap();
        first.status = WorkflowStatus::Approved;
        store.update_workflow(first.clone()).await.unwrap();

        let second = ApprovalWorkflow::new(
            stored.id,
            WorkflowType::Retirement,
            "bob",
            None,
            None,
        );
        store.create_workflow(second.clone()).await.unwrap();

        let history = store.workflows_for(stored.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[1].id, second.id);
    }
}
