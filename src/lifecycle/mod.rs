//! Automation lifecycle management.
//!
//! Owns the lifecycle state of every managed automation and the approval
//! workflow that gates changes to it. Records are versioned with an
//! optimistic-lock counter; stale writes are rejected, never silently
//! overwritten. Retirement is a state, not a deletion.

pub mod approval;
pub mod store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use approval::{
    ApprovalError, ApprovalService, ApprovalWorkflow, WorkflowStatus, WorkflowType,
};
pub use store::{AutomationStore, InMemoryAutomationStore};

/// Lifecycle state of a managed automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Running on the platform.
    Active,
    /// Awaiting approval before activation.
    Pending,
    /// Disabled, either explicitly or by the inactivity detector.
    Inactive,
    /// Permanently retired. Terminal.
    Retired,
}

impl LifecycleState {
    /// String form for logs and persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Inactive => "inactive",
            Self::Retired => "retired",
        }
    }

    /// Whether a transition to `target` is legal.
    ///
    /// Any state may retire; retired never transitions out; active and
    /// inactive toggle freely; pending resolves to active or inactive.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Retired, _) => false,
            (_, Self::Retired) => true,
            (Self::Active, Self::Inactive) | (Self::Inactive, Self::Active) => true,
            (Self::Pending, Self::Active | Self::Inactive) => true,
            (a, b) => a == b,
        }
    }
}

/// Lifecycle operation failure.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// No automation with that id.
    #[error("automation {0} not found")]
    NotFound(Uuid),
    /// Optimistic-lock conflict: the record changed since it was read.
    #[error("stale version for automation {id}: expected {expected}, found {actual}")]
    StaleVersion {
        /// Id of the automation.
        id: Uuid,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },
    /// Transition not permitted by the state machine.
    #[error("automation {id} cannot transition from {from} to {to}", from = from.as_str(), to = to.as_str())]
    InvalidTransition {
        /// Id of the automation.
        id: Uuid,
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },
}

/// Externally computed performance metrics for one automation.
///
/// The execution engine computes these; this core only stores and exposes
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Total executions observed.
    pub execution_count: u64,
    /// Fraction of successful executions in `[0, 1]`.
    pub success_rate: f64,
    /// Average execution wall time in milliseconds.
    pub average_execution_time_ms: f64,
    /// Composite performance score in `[0, 1]`.
    pub performance_score: f64,
    /// When the most recent execution finished.
    pub last_executed_at: chrono::DateTime<chrono::Utc>,
}

/// One managed automation: lifecycle state, performance counters, audit
/// fields, and the optimistic-lock version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationManagement {
    /// Internal identifier.
    pub id: Uuid,
    /// Identifier of the automation on the platform.
    pub external_id: String,
    /// Human-readable name.
    pub name: String,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Composite performance score in `[0, 1]`.
    pub performance_score: f64,
    /// Fraction of successful executions in `[0, 1]`.
    pub success_rate: f64,
    /// Total executions observed.
    pub execution_count: u64,
    /// Average execution wall time in milliseconds.
    pub average_execution_time_ms: f64,
    /// Optimistic-lock counter, incremented on every mutation.
    pub version: u64,
    /// Who registered the automation.
    pub created_by: String,
    /// When it was registered.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Who last mutated it.
    pub modified_by: String,
    /// When it was last mutated.
    pub modified_at: chrono::DateTime<chrono::Utc>,
    /// When it last executed, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Whether the automation is live on the platform.
    pub active: bool,
}

impl AutomationManagement {
    /// Register a new automation.
    ///
    /// Starts in the given state with version 0 and zeroed metrics.
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        state: LifecycleState,
        created_by: impl Into<String>,
    ) -> Self {
        let created_by = created_by.into();
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            name: name.into(),
            state,
            performance_score: 0.0,
            success_rate: 0.0,
            execution_count: 0,
            average_execution_time_ms: 0.0,
            version: 0,
            created_by: created_by.clone(),
            created_at: now,
            modified_by: created_by,
            modified_at: now,
            last_executed_at: None,
            active: state == LifecycleState::Active,
        }
    }

    /// Request a state transition, checking legality.
    ///
    /// Does not touch the version; the store's compare-and-set does that on
    /// write.
    pub fn transition_to(
        &mut self,
        target: LifecycleState,
        modified_by: &str,
    ) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: target,
            });
        }

        self.state = target;
        self.active = target == LifecycleState::Active;
        self.modified_by = modified_by.to_string();
        self.modified_at = chrono::Utc::now();
        Ok(())
    }

    /// Store externally computed execution metrics.
    pub fn apply_execution_metrics(&mut self, metrics: &ExecutionMetrics, modified_by: &str) {
        self.execution_count = metrics.execution_count;
        self.success_rate = metrics.success_rate.clamp(0.0, 1.0);
        self.average_execution_time_ms = metrics.average_execution_time_ms;
        self.performance_score = metrics.performance_score.clamp(0.0, 1.0);
        self.last_executed_at = Some(metrics.last_executed_at);
        self.modified_by = modified_by.to_string();
        self.modified_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retired_is_terminal() {
        for target in [
            LifecycleState::Active,
            LifecycleState::Pending,
            LifecycleState::Inactive,
            LifecycleState::Retired,
        ] {
            assert!(!LifecycleState::Retired.can_transition_to(target));
        }
    }

    #[test]
    fn test_any_state_can_retire() {
        for from in [
            LifecycleState::Active,
            LifecycleState::Pending,
            LifecycleState::Inactive,
        ] {
            assert!(from.can_transition_to(LifecycleState::Retired));
        }
    }

    #[test]
    fn test_active_inactive_toggle() {
        assert!(LifecycleState::Active.can_transition_to(LifecycleState::Inactive));
        assert!(LifecycleState::Inactive.can_transition_to(LifecycleState::Active));
        assert!(!LifecycleState::Active.can_transition_to(LifecycleState::Pending));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut automation = AutomationManagement::new(
            "automation.morning",
            "Morning lights",
            LifecycleState::Retired,
            "admin",
        );

        let err = automation
            .transition_to(LifecycleState::Active, "admin")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_transition_updates_audit_fields() {
        let mut automation = AutomationManagement::new(
            "automation.morning",
            "Morning lights",
            LifecycleState::Active,
            "admin",
        );

        automation
            .transition_to(LifecycleState::Inactive, "operator")
            .unwrap();
        assert_eq!(automation.state, LifecycleState::Inactive);
        assert!(!automation.active);
        assert_eq!(automation.modified_by, "operator");
    }

    #[test]
    fn test_execution_metrics_stored_verbatim_with_clamping() {
        let mut automation = AutomationManagement::new(
            "automation.morning",
            "Morning lights",
            LifecycleState::Active,
            "admin",
        );

        automation.apply_execution_metrics(
            &ExecutionMetrics {
                execution_count: 42,
                success_rate: 1.5,
                average_execution_time_ms: 120.0,
                performance_score: 0.87,
                last_executed_at: chrono::Utc::now(),
            },
            "engine",
        );

        assert_eq!(automation.execution_count, 42);
        assert!((automation.success_rate - 1.0).abs() < f64::EPSILON);
        assert!((automation.performance_score - 0.87).abs() < f64::EPSILON);
        assert!(automation.last_executed_at.is_some());
    }
}
