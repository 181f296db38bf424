//! Generation state machine
//!
//! Status only ever progresses `pending -> processing -> {completed, failed}`.
//! The state machine is the single arbiter of transitions; entity methods and
//! repository status guards both defer to it.

use thiserror::Error;

/// Errors that can occur during state transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Invalid transition: cannot transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Terminal state: {0} is a terminal state and cannot transition")]
    TerminalState(String),
}

/// Generation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [GenerationState] {
        match self {
            Self::Pending => &[Self::Processing, Self::Failed],
            Self::Processing => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Events that trigger generation state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Worker picks up the job for processing
    WorkerPicksUp,
    /// Variants persisted and ledger written
    Success,
    /// Permanent failure (including a pending job that can never run)
    Failure,
}

impl std::fmt::Display for GenerationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkerPicksUp => write!(f, "worker_picks_up"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Generation state machine
pub struct GenerationStateMachine;

impl GenerationStateMachine {
    /// Attempt a state transition
    ///
    /// Returns the new state if the transition is valid, or an error otherwise.
    pub fn transition(
        current: GenerationState,
        event: GenerationEvent,
    ) -> Result<GenerationState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (&current, &event) {
            (GenerationState::Pending, GenerationEvent::WorkerPicksUp) => {
                GenerationState::Processing
            }
            // A pending job can fail terminally without ever running
            // (dispatch failure, retry cap, exhausted quota re-check)
            (GenerationState::Pending, GenerationEvent::Failure) => GenerationState::Failed,

            (GenerationState::Processing, GenerationEvent::Success) => GenerationState::Completed,
            (GenerationState::Processing, GenerationEvent::Failure) => GenerationState::Failed,

            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(current: GenerationState, event: &GenerationEvent) -> bool {
        Self::transition(current, event.clone()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pending_to_processing() {
        let result =
            GenerationStateMachine::transition(GenerationState::Pending, GenerationEvent::WorkerPicksUp);
        assert_eq!(result, Ok(GenerationState::Processing));
    }

    #[test]
    fn test_valid_pending_to_failed() {
        let result =
            GenerationStateMachine::transition(GenerationState::Pending, GenerationEvent::Failure);
        assert_eq!(result, Ok(GenerationState::Failed));
    }

    #[test]
    fn test_valid_processing_to_completed() {
        let result =
            GenerationStateMachine::transition(GenerationState::Processing, GenerationEvent::Success);
        assert_eq!(result, Ok(GenerationState::Completed));
    }

    #[test]
    fn test_valid_processing_to_failed() {
        let result =
            GenerationStateMachine::transition(GenerationState::Processing, GenerationEvent::Failure);
        assert_eq!(result, Ok(GenerationState::Failed));
    }

    #[test]
    fn test_invalid_pending_to_completed() {
        let result =
            GenerationStateMachine::transition(GenerationState::Pending, GenerationEvent::Success);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_terminal_states_cannot_transition() {
        let completed = GenerationStateMachine::transition(
            GenerationState::Completed,
            GenerationEvent::Failure,
        );
        assert!(matches!(completed, Err(StateError::TerminalState(_))));

        let failed = GenerationStateMachine::transition(
            GenerationState::Failed,
            GenerationEvent::WorkerPicksUp,
        );
        assert!(matches!(failed, Err(StateError::TerminalState(_))));
    }

    #[test]
    fn test_is_terminal() {
        assert!(!GenerationState::Pending.is_terminal());
        assert!(!GenerationState::Processing.is_terminal());
        assert!(GenerationState::Completed.is_terminal());
        assert!(GenerationState::Failed.is_terminal());
    }

    #[test]
    fn test_can_transition() {
        assert!(GenerationStateMachine::can_transition(
            GenerationState::Pending,
            &GenerationEvent::WorkerPicksUp
        ));
        assert!(!GenerationStateMachine::can_transition(
            GenerationState::Pending,
            &GenerationEvent::Success
        ));
        assert!(!GenerationStateMachine::can_transition(
            GenerationState::Completed,
            &GenerationEvent::Failure
        ));
    }

    #[test]
    fn test_terminal_states_have_no_transitions() {
        assert!(GenerationState::Completed.valid_transitions().is_empty());
        assert!(GenerationState::Failed.valid_transitions().is_empty());
        assert_eq!(GenerationState::Pending.valid_transitions().len(), 2);
        assert_eq!(GenerationState::Processing.valid_transitions().len(), 2);
    }
}
