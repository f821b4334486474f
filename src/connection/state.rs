//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, nothing read yet
    Initial,

    /// Waiting for the server greeting
    AwaitingHandshake,

    /// SSL request sent, TLS handshake in progress
    NegotiatingTls,

    /// Handshake response sent, waiting for OK / auth switch
    Authenticating,

    /// Ready for a command
    Idle,

    /// Command being written
    QueryInProgress,

    /// Response outstanding (possibly abandoned by a timeout)
    ReadingResults,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, AwaitingHandshake)
                | (AwaitingHandshake, NegotiatingTls)
                | (AwaitingHandshake, Authenticating)
                | (NegotiatingTls, Authenticating)
                | (Authenticating, Idle)
                | (Idle, QueryInProgress)
                | (QueryInProgress, ReadingResults)
                | (QueryInProgress, Idle)
                | (ReadingResults, Idle)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::AwaitingHandshake => write!(f, "awaiting_handshake"),
            Self::NegotiatingTls => write!(f, "negotiating_tls"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Idle => write!(f, "idle"),
            Self::QueryInProgress => write!(f, "query_in_progress"),
            Self::ReadingResults => write!(f, "reading_results"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::AwaitingHandshake).is_ok());
        assert!(state.transition(ConnectionState::Authenticating).is_ok());
        assert!(state.transition(ConnectionState::Idle).is_ok());
        assert!(state.transition(ConnectionState::QueryInProgress).is_ok());
        assert!(state.transition(ConnectionState::ReadingResults).is_ok());
        assert!(state.transition(ConnectionState::Idle).is_ok());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = ConnectionState::Initial;
        let err = state.transition(ConnectionState::Idle).unwrap_err();
        assert!(err.to_string().contains("from initial"));
        assert_eq!(state, ConnectionState::Initial);
    }

    #[test]
    fn test_close_from_any_state() {
        let mut state = ConnectionState::ReadingResults;
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_tls_negotiation_transitions() {
        let mut state = ConnectionState::AwaitingHandshake;
        assert!(state.transition(ConnectionState::NegotiatingTls).is_ok());
        assert!(state.transition(ConnectionState::Authenticating).is_ok());
    }

    #[test]
    fn test_no_command_while_response_outstanding() {
        let mut state = ConnectionState::ReadingResults;
        assert!(state.transition(ConnectionState::QueryInProgress).is_err());
    }

    #[test]
    fn test_fire_and_forget_command_returns_to_idle() {
        let mut state = ConnectionState::Idle;
        assert!(state.transition(ConnectionState::QueryInProgress).is_ok());
        assert!(state.transition(ConnectionState::Idle).is_ok());
    }
}
