//! Lifecycle and instrumentation events published by the engine

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::entity::{ExperimentId, GuardrailAction, VariantId};
use super::result::BiasType;

// ============================================================================
// EventKind
// ============================================================================

/// The kind of an [`ExperimentEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ExperimentCreated,
    ExperimentStarted,
    UserAssigned,
    ConversionTracked,
    GuardrailAlert,
    ExperimentPaused,
    ExperimentStopped,
    BiasDetected,
}

impl EventKind {
    /// All event kinds
    pub fn all() -> Vec<EventKind> {
        vec![
            EventKind::ExperimentCreated,
            EventKind::ExperimentStarted,
            EventKind::UserAssigned,
            EventKind::ConversionTracked,
            EventKind::GuardrailAlert,
            EventKind::ExperimentPaused,
            EventKind::ExperimentStopped,
            EventKind::BiasDetected,
        ]
    }

    /// The kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ExperimentCreated => "experiment_created",
            EventKind::ExperimentStarted => "experiment_started",
            EventKind::UserAssigned => "user_assigned",
            EventKind::ConversionTracked => "conversion_tracked",
            EventKind::GuardrailAlert => "guardrail_alert",
            EventKind::ExperimentPaused => "experiment_paused",
            EventKind::ExperimentStopped => "experiment_stopped",
            EventKind::BiasDetected => "bias_detected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Transition reasons
// ============================================================================

/// Why an experiment was paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// An operator paused it
    Operator,
    /// A guardrail breach paused it
    Guardrail { metric_id: String },
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => write!(f, "operator"),
            Self::Guardrail { metric_id } => write!(f, "guardrail({metric_id})"),
        }
    }
}

/// Why an experiment was stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// An operator stopped it
    Operator,
    /// A guardrail breach stopped it
    Guardrail { metric_id: String },
    /// The schedule expired
    ScheduleExpired,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => write!(f, "operator"),
            Self::Guardrail { metric_id } => write!(f, "guardrail({metric_id})"),
            Self::ScheduleExpired => write!(f, "schedule_expired"),
        }
    }
}

// ============================================================================
// ExperimentEvent
// ============================================================================

/// An event published on the engine's event channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExperimentEvent {
    /// A new experiment entered draft
    ExperimentCreated {
        experiment_id: ExperimentId,
        name: String,
    },
    /// An experiment started running
    ExperimentStarted {
        experiment_id: ExperimentId,
        required_sample_size: u64,
    },
    /// A participant received a variant
    UserAssigned {
        experiment_id: ExperimentId,
        user_id: String,
        variant_id: VariantId,
    },
    /// An outcome event was folded into the aggregates
    ConversionTracked {
        experiment_id: ExperimentId,
        user_id: String,
        metric_id: String,
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    /// A guardrail threshold was breached
    GuardrailAlert {
        experiment_id: ExperimentId,
        variant_id: VariantId,
        metric_id: String,
        observed: f64,
        threshold: f64,
        action: GuardrailAction,
    },
    /// An experiment was paused
    ExperimentPaused {
        experiment_id: ExperimentId,
        reason: PauseReason,
    },
    /// An experiment reached a terminal state
    ExperimentStopped {
        experiment_id: ExperimentId,
        reason: StopReason,
    },
    /// The bias detector flagged the experiment
    BiasDetected {
        experiment_id: ExperimentId,
        bias_types: Vec<BiasType>,
        bias_score: f64,
    },
}

impl ExperimentEvent {
    /// The kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ExperimentCreated { .. } => EventKind::ExperimentCreated,
            Self::ExperimentStarted { .. } => EventKind::ExperimentStarted,
            Self::UserAssigned { .. } => EventKind::UserAssigned,
            Self::ConversionTracked { .. } => EventKind::ConversionTracked,
            Self::GuardrailAlert { .. } => EventKind::GuardrailAlert,
            Self::ExperimentPaused { .. } => EventKind::ExperimentPaused,
            Self::ExperimentStopped { .. } => EventKind::ExperimentStopped,
            Self::BiasDetected { .. } => EventKind::BiasDetected,
        }
    }

    /// The experiment this event belongs to
    pub fn experiment_id(&self) -> &ExperimentId {
        match self {
            Self::ExperimentCreated { experiment_id, .. }
            | Self::ExperimentStarted { experiment_id, .. }
            | Self::UserAssigned { experiment_id, .. }
            | Self::ConversionTracked { experiment_id, .. }
            | Self::GuardrailAlert { experiment_id, .. }
            | Self::ExperimentPaused { experiment_id, .. }
            | Self::ExperimentStopped { experiment_id, .. }
            | Self::BiasDetected { experiment_id, .. } => experiment_id,
        }
    }
}
