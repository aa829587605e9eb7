use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a submission record.
///
/// `Queued` is the only state in which more than one record per queue
/// coexists; `Requesting` is exclusive per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Created in memory, not yet on a queue.
    Pending,
    /// On its queue, waiting to reach the head.
    Queued,
    /// At the head of its queue with a request in flight.
    Requesting,
    /// Waiting out a backoff delay before the next attempt.
    RetryWaiting,
    /// Resolved successfully and popped.
    Succeeded,
    /// Retries exhausted or a non-retryable failure; fallbacks ran.
    FailedTerminal,
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Requesting | Self::RetryWaiting)
    }
}

impl Default for RecordState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Queued => write!(f, "queued"),
            Self::Requesting => write!(f, "requesting"),
            Self::RetryWaiting => write!(f, "retry_waiting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedTerminal => write!(f, "failed_terminal"),
        }
    }
}

impl std::str::FromStr for RecordState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "requesting" => Ok(Self::Requesting),
            "retry_waiting" => Ok(Self::RetryWaiting),
            "succeeded" => Ok(Self::Succeeded),
            "failed_terminal" => Ok(Self::FailedTerminal),
            _ => Err(format!("Invalid record state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(RecordState::Succeeded.is_terminal());
        assert!(RecordState::FailedTerminal.is_terminal());
        assert!(!RecordState::Requesting.is_terminal());
        assert!(!RecordState::RetryWaiting.is_terminal());
    }

    #[test]
    fn string_conversion() {
        assert_eq!(RecordState::RetryWaiting.to_string(), "retry_waiting");
        assert_eq!(
            "requesting".parse::<RecordState>().unwrap(),
            RecordState::Requesting
        );
        assert!("nonsense".parse::<RecordState>().is_err());
    }
}
