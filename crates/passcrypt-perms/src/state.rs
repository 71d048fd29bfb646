//! Cascade state machine.
//!
//! ```text
//! Idle -> FetchingPermission -> AuthorizingKey -> Reencrypting -> Persisting -> Done
//!                 |                                                      
//!                 +-> Done (nothing to change)
//! any non-terminal state -> Failed
//! ```

use std::fmt;

use tracing::debug;

/// Where a cascade is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeState {
    Idle,
    FetchingPermission,
    AuthorizingKey,
    Reencrypting,
    Persisting,
    Done,
    Failed,
}

impl CascadeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CascadeState::Done | CascadeState::Failed)
    }

    /// Whether `next` may follow `self`.
    pub fn can_transition_to(&self, next: CascadeState) -> bool {
        use CascadeState::*;
        match (*self, next) {
            (s, Failed) => !s.is_terminal(),
            (Idle, FetchingPermission)
            | (FetchingPermission, AuthorizingKey)
            | (FetchingPermission, Done)
            | (AuthorizingKey, Reencrypting)
            | (Reencrypting, Persisting)
            | (Persisting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Current state plus every state visited so far.
#[derive(Debug, Clone)]
pub struct StateLog {
    history: Vec<CascadeState>,
}

impl StateLog {
    pub fn new() -> Self {
        Self {
            history: vec![CascadeState::Idle],
        }
    }

    pub fn current(&self) -> CascadeState {
        self.history
            .last()
            .copied()
            .unwrap_or(CascadeState::Idle)
    }

    /// Move to `next`. Returns false, and stays put, for an illegal move.
    pub fn advance(&mut self, next: CascadeState) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            debug!(from = %current, to = %next, "illegal cascade transition");
            return false;
        }
        debug!(from = %current, to = %next, "cascade transition");
        self.history.push(next);
        true
    }

    pub fn history(&self) -> &[CascadeState] {
        &self.history
    }
}

impl Default for StateLog {
    fn default() -> Self {
        Self::new()
    }
}
