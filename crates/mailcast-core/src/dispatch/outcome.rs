//! Per-task outcomes

use crate::transport::EnvelopeSummary;
use mailcast_common::Recipient;
use serde::Serialize;
use std::fmt;

/// One unit of work: a recipient and its position in the recipient list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTask {
    pub recipient: Recipient,
    pub sequence_index: usize,
}

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
    /// Blocked by the content policy
    Skipped,
    /// Test mode: everything but the transmission
    SimulatedTestSend,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Error => "error",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::SimulatedTestSend => "simulated_test_send",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub status: OutcomeStatus,
    /// Error cause or skip reason
    pub detail: Option<String>,
    pub endpoint_used: Option<String>,
    pub message_id: Option<String>,
    /// The would-be envelope of a simulated send
    pub envelope: Option<EnvelopeSummary>,
}

impl DispatchOutcome {
    fn with_status(status: OutcomeStatus) -> Self {
        Self {
            status,
            detail: None,
            endpoint_used: None,
            message_id: None,
            envelope: None,
        }
    }

    pub fn success(endpoint: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            endpoint_used: Some(endpoint.into()),
            message_id: Some(message_id.into()),
            ..Self::with_status(OutcomeStatus::Success)
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::with_status(OutcomeStatus::Error)
        }
    }

    /// A failure after an endpoint was chosen
    pub fn error_at(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            endpoint_used: Some(endpoint.into()),
            ..Self::error(detail)
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::with_status(OutcomeStatus::Skipped)
        }
    }

    pub fn simulated(endpoint: impl Into<String>, envelope: EnvelopeSummary) -> Self {
        Self {
            endpoint_used: Some(endpoint.into()),
            envelope: Some(envelope),
            ..Self::with_status(OutcomeStatus::SimulatedTestSend)
        }
    }
}
