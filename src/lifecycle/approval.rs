//! Approval workflow orchestration.
//!
//! Every change to a managed automation flows through an
//! [`ApprovalWorkflow`]: proposed as pending, resolved by approval or
//! rejection, and interruptible at any point by an emergency stop. The
//! workflow row itself is the audit record; transitions append to it and
//! never erase who did what.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::store::AutomationStore;
use crate::lifecycle::{
    AutomationManagement, ExecutionMetrics, LifecycleError, LifecycleState,
};

/// Kind of change a workflow proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    /// Activate a newly registered automation.
    Creation,
    /// Modify an existing automation.
    Modification,
    /// Retire an automation.
    Retirement,
}

impl WorkflowType {
    /// String form for logs and persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Modification => "modification",
            Self::Retirement => "retirement",
        }
    }
}

/// Status of a workflow. Approved, rejected, and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved and applied.
    Approved,
    /// Rejected; no change applied.
    Rejected,
    /// Cancelled, including by emergency stop.
    Cancelled,
}

impl WorkflowStatus {
    /// Whether this status ends the workflow.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// String form for logs and persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One change request against a managed automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    /// Workflow identifier.
    pub id: Uuid,
    /// The automation this workflow targets.
    pub automation_id: Uuid,
    /// Kind of change proposed.
    pub workflow_type: WorkflowType,
    /// Current status.
    pub status: WorkflowStatus,
    /// Who proposed the change.
    pub requested_by: String,
    /// Why it was proposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Who approved it, once approved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Who rejected it, once rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// Set when an emergency stop forced this workflow to a halt.
    pub emergency_stop: bool,
    /// Proposed change payload for modification workflows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_change: Option<serde_json::Value>,
    /// Free-form append-only metadata (resolution reasons, stop notes).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// When the workflow was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the workflow was last touched.
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// When the workflow reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ApprovalWorkflow {
    /// Create a pending workflow.
    #[must_use]
    pub fn new(
        automation_id: Uuid,
        workflow_type: WorkflowType,
        requested_by: impl Into<String>,
        reason: Option<String>,
        proposed_change: Option<serde_json::Value>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            automation_id,
            workflow_type,
            status: WorkflowStatus::Pending,
            requested_by: requested_by.into(),
            reason,
            approved_by: None,
            rejected_by: None,
            emergency_stop: false,
            proposed_change,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    fn resolve(&mut self, status: WorkflowStatus) {
        let now = chrono::Utc::now();
        self.status = status;
        self.updated_at = now;
        self.resolved_at = Some(now);
    }
}

/// Approval workflow failure.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// A pending request already exists for this automation.
    #[error("a pending request already exists for automation {0}")]
    Conflict(Uuid),
    /// No workflow with that id.
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),
    /// The workflow already reached a terminal status.
    #[error("workflow {id} already resolved as {status}", status = status.as_str())]
    AlreadyResolved {
        /// Workflow id.
        id: Uuid,
        /// Its terminal status.
        status: WorkflowStatus,
    },
    /// Underlying lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Attempts for optimistic writes that race with metric updates.
const OPTIMISTIC_RETRIES: u32 = 3;

/// Orchestrates change requests against the lifecycle state machine.
pub struct ApprovalService {
    store: Arc<dyn AutomationStore>,
    require_approval: bool,
    inactivity_window: chrono::Duration,
}

impl std::fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalService")
            .field("require_approval", &self.require_approval)
            .field("inactivity_window", &self.inactivity_window)
            .finish()
    }
}

impl ApprovalService {
    /// Create a service over a store.
    ///
    /// `require_approval` makes newly registered automations start pending
    /// instead of active; `inactivity_window` drives the inactivity sweep.
    #[must_use]
    pub fn new(
        store: Arc<dyn AutomationStore>,
        require_approval: bool,
        inactivity_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            require_approval,
            inactivity_window,
        }
    }

    /// Register an automation under management.
    pub async fn register_automation(
        &self,
        external_id: impl Into<String>,
        name: impl Into<String>,
        requested_by: &str,
    ) -> Result<AutomationManagement, ApprovalError> {
        let state = if self.require_approval {
            LifecycleState::Pending
        } else {
            LifecycleState::Active
        };

        let automation =
            AutomationManagement::new(external_id, name, state, requested_by);
        tracing::info!(
            automation_id = %automation.id,
            external_id = %automation.external_id,
            state = state.as_str(),
            "Automation registered"
        );
        Ok(self.store.insert(automation).await?)
    }

    /// Propose a change. Fails with a conflict when the automation already
    /// has a workflow in flight.
    pub async fn request_change(
        &self,
        automation_id: Uuid,
        workflow_type: WorkflowType,
        requested_by: &str,
        reason: Option<String>,
        proposed_change: Option<serde_json::Value>,
    ) -> Result<ApprovalWorkflow, ApprovalError> {
        let automation = self
            .store
            .get(automation_id)
            .await?
            .ok_or(LifecycleError::NotFound(automation_id))?;

        if automation.state == LifecycleState::Retired {
            return Err(LifecycleError::InvalidTransition {
                id: automation_id,
                from: LifecycleState::Retired,
                to: LifecycleState::Retired,
            }
            .into());
        }

        let workflow = ApprovalWorkflow::new(
            automation_id,
            workflow_type,
            requested_by,
            reason,
            proposed_change,
        );
        let workflow = self.store.create_workflow(workflow).await?;
        tracing::info!(
            workflow_id = %workflow.id,
            automation_id = %automation_id,
            workflow_type = workflow_type.as_str(),
            requested_by,
            "Change requested"
        );
        Ok(workflow)
    }

    /// Approve a pending workflow and apply the proposed change.
    pub async fn approve(
        &self,
        workflow_id: Uuid,
        approver: &str,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, ApprovalError> {
        let mut workflow = self.load_pending(workflow_id).await?;

        self.apply_change(&workflow, approver).await?;

        workflow.approved_by = Some(approver.to_string());
        if let Some(reason) = reason {
            workflow
                .metadata
                .insert("approval_reason".to_string(), reason.into());
        }
        workflow.resolve(WorkflowStatus::Approved);

        tracing::info!(
            workflow_id = %workflow.id,
            automation_id = %workflow.automation_id,
            approver,
            "Workflow approved"
        );
        self.store.update_workflow(workflow).await
    }

    /// Reject a pending workflow. No change is applied.
    pub async fn reject(
        &self,
        workflow_id: Uuid,
        rejecter: &str,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, ApprovalError> {
        let mut workflow = self.load_pending(workflow_id).await?;

        workflow.rejected_by = Some(rejecter.to_string());
        if let Some(reason) = reason {
            workflow
                .metadata
                .insert("rejection_reason".to_string(), reason.into());
        }
        workflow.resolve(WorkflowStatus::Rejected);

        tracing::info!(
            workflow_id = %workflow.id,
            automation_id = %workflow.automation_id,
            rejecter,
            "Workflow rejected"
        );
        self.store.update_workflow(workflow).await
    }

    /// Emergency stop: force the workflow to a terminal, non-approved
    /// outcome from any status and halt the automation it targets.
    ///
    /// This is the one transition allowed from every status, including an
    /// approval already in flight. Already-cancelled or rejected workflows
    /// only gain the stop flag and note.
    pub async fn trigger_emergency_stop(
        &self,
        workflow_id: Uuid,
        operator: &str,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, ApprovalError> {
        let mut workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(ApprovalError::WorkflowNotFound(workflow_id))?;

        workflow.emergency_stop = true;
        workflow.metadata.insert(
            "emergency_stop".to_string(),
            serde_json::json!({
                "operator": operator,
                "reason": reason,
                "at": chrono::Utc::now(),
                "status_before": workflow.status.as_str(),
            }),
        );

        if !matches!(
            workflow.status,
            WorkflowStatus::Rejected | WorkflowStatus::Cancelled
        ) {
            workflow.resolve(WorkflowStatus::Cancelled);
        } else {
            workflow.updated_at = chrono::Utc::now();
        }

        // Halt the automation itself; an approved change may already be live.
        if let Err(e) = self.halt_automation(workflow.automation_id, operator).await {
            tracing::warn!(
                automation_id = %workflow.automation_id,
                error = %e,
                "Emergency stop could not halt automation"
            );
        }

        tracing::warn!(
            workflow_id = %workflow.id,
            automation_id = %workflow.automation_id,
            operator,
            "Emergency stop triggered"
        );
        self.store.update_workflow(workflow).await
    }

    /// Explicit enable/disable outside the approval flow.
    pub async fn set_enabled(
        &self,
        automation_id: Uuid,
        enabled: bool,
        modified_by: &str,
    ) -> Result<AutomationManagement, ApprovalError> {
        let target = if enabled {
            LifecycleState::Active
        } else {
            LifecycleState::Inactive
        };

        self.transition_with_retry(automation_id, target, modified_by)
            .await
    }

    /// Store execution metrics computed by the external execution engine.
    pub async fn record_execution(
        &self,
        automation_id: Uuid,
        metrics: &ExecutionMetrics,
    ) -> Result<AutomationManagement, ApprovalError> {
        let mut last_err = None;
        for _ in 0..OPTIMISTIC_RETRIES {
            let mut automation = self
                .store
                .get(automation_id)
                .await?
                .ok_or(LifecycleError::NotFound(automation_id))?;

            automation.apply_execution_metrics(metrics, "execution-engine");
            match self.store.update(automation).await {
                Ok(updated) => return Ok(updated),
                Err(e @ LifecycleError::StaleVersion { .. }) => {
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or(LifecycleError::NotFound(automation_id))
            .into())
    }

    /// Move active automations with no execution inside the inactivity
    /// window to inactive. Returns how many were transitioned.
    pub async fn sweep_inactive(&self, swept_by: &str) -> Result<usize, ApprovalError> {
        let cutoff = chrono::Utc::now() - self.inactivity_window;
        let mut swept = 0;

        for automation in self.store.list().await? {
            if automation.state != LifecycleState::Active {
                continue;
            }
            let last_activity = automation
                .last_executed_at
                .unwrap_or(automation.created_at);
            if last_activity >= cutoff {
                continue;
            }

            match self
                .transition_with_retry(automation.id, LifecycleState::Inactive, swept_by)
                .await
            {
                Ok(_) => {
                    swept += 1;
                    tracing::info!(
                        automation_id = %automation.id,
                        last_activity = %last_activity,
                        "Automation marked inactive by sweep"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        automation_id = %automation.id,
                        error = %e,
                        "Inactivity sweep skipped automation"
                    );
                }
            }
        }

        Ok(swept)
    }

    /// Full workflow history for an automation.
    pub async fn workflow_history(
        &self,
        automation_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ApprovalError> {
        self.store.workflows_for(automation_id).await
    }

    async fn load_pending(&self, workflow_id: Uuid) -> Result<ApprovalWorkflow, ApprovalError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(ApprovalError::WorkflowNotFound(workflow_id))?;

        if workflow.status.is_terminal() {
            return Err(ApprovalError::AlreadyResolved {
                id: workflow_id,
                status: workflow.status,
            });
        }
        Ok(workflow)
    }

    /// Apply an approved workflow's change to the automation record.
    async fn apply_change(
        &self,
        workflow: &ApprovalWorkflow,
        approver: &str,
    ) -> Result<(), ApprovalError> {
        match workflow.workflow_type {
            WorkflowType::Creation => {
                self.transition_with_retry(
                    workflow.automation_id,
                    LifecycleState::Active,
                    approver,
                )
                .await?;
            }
            WorkflowType::Retirement => {
                self.transition_with_retry(
                    workflow.automation_id,
                    LifecycleState::Retired,
                    approver,
                )
                .await?;
            }
            WorkflowType::Modification => {
                self.apply_modification(workflow, approver).await?;
            }
        }
        Ok(())
    }

    async fn apply_modification(
        &self,
        workflow: &ApprovalWorkflow,
        approver: &str,
    ) -> Result<(), ApprovalError> {
        let mut last_err = None;
        for _ in 0..OPTIMISTIC_RETRIES {
            let mut automation = self
                .store
                .get(workflow.automation_id)
                .await?
                .ok_or(LifecycleError::NotFound(workflow.automation_id))?;

            if let Some(change) = &workflow.proposed_change {
                if let Some(name) = change.get("name").and_then(serde_json::Value::as_str) {
                    automation.name = name.to_string();
                }
                if let Some(enabled) = change.get("enabled").and_then(serde_json::Value::as_bool)
                {
                    let target = if enabled {
                        LifecycleState::Active
                    } else {
                        LifecycleState::Inactive
                    };
                    if automation.state != target {
                        automation.transition_to(target, approver)?;
                    }
                }
            }
            automation.modified_by = approver.to_string();
            automation.modified_at = chrono::Utc::now();

            match self.store.update(automation).await {
                Ok(_) => return Ok(()),
                Err(e @ LifecycleError::StaleVersion { .. }) => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or(LifecycleError::NotFound(workflow.automation_id))
            .into())
    }

    async fn halt_automation(
        &self,
        automation_id: Uuid,
        modified_by: &str,
    ) -> Result<(), ApprovalError> {
        let automation = self
            .store
            .get(automation_id)
            .await?
            .ok_or(LifecycleError::NotFound(automation_id))?;

        // Only a live automation needs halting.
        if automation.state == LifecycleState::Active {
            self.transition_with_retry(automation_id, LifecycleState::Inactive, modified_by)
                .await?;
        }
        Ok(())
    }

    async fn transition_with_retry(
        &self,
        automation_id: Uuid,
        target: LifecycleState,
        modified_by: &str,
    ) -> Result<AutomationManagement, ApprovalError> {
        let mut last_err = None;
        for _ in 0..OPTIMISTIC_RETRIES {
            let mut automation = self
                .store
                .get(automation_id)
                .await?
                .ok_or(LifecycleError::NotFound(automation_id))?;

            automation.transition_to(target, modified_by)?;
            match self.store.update(automation).await {
                Ok(updated) => return Ok(updated),
                Err(e @ LifecycleError::StaleVersion { .. }) => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or(LifecycleError::NotFound(automation_id))
            .into())
    }
}
