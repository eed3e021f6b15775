//! Lifecycle of one ingest unit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `pending → validated → contoured → clipped → loaded`, with `failed`
/// reachable from every state. A retry starts over from `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Pending,
    Validated,
    Contoured,
    Clipped,
    Loaded,
    Failed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Validated => "validated",
            UnitState::Contoured => "contoured",
            UnitState::Clipped => "clipped",
            UnitState::Loaded => "loaded",
            UnitState::Failed => "failed",
        }
    }

    /// The state after a successful step, if any.
    pub fn next(&self) -> Option<UnitState> {
        match self {
            UnitState::Pending => Some(UnitState::Validated),
            UnitState::Validated => Some(UnitState::Contoured),
            UnitState::Contoured => Some(UnitState::Clipped),
            UnitState::Clipped => Some(UnitState::Loaded),
            UnitState::Loaded | UnitState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: UnitState) -> bool {
        match to {
            UnitState::Failed => *self != UnitState::Failed,
            UnitState::Pending => *self == UnitState::Failed,
            _ => self.next() == Some(to),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Loaded | UnitState::Failed)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of a unit while it runs.
#[derive(Debug, Clone)]
pub struct UnitProgress {
    state: UnitState,
    history: Vec<UnitState>,
}

impl Default for UnitProgress {
    fn default() -> Self {
        Self {
            state: UnitState::Pending,
            history: vec![UnitState::Pending],
        }
    }
}

impl UnitProgress {
    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn history(&self) -> &[UnitState] {
        &self.history
    }

    /// Move to `to`; illegal transitions are ignored and reported as `false`.
    pub fn advance(&mut self, to: UnitState) -> bool {
        if !self.state.can_transition_to(to) {
            return false;
        }
        self.state = to;
        self.history.push(to);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut progress = UnitProgress::default();
        for to in [
            UnitState::Validated,
            UnitState::Contoured,
            UnitState::Clipped,
            UnitState::Loaded,
        ] {
            assert!(progress.advance(to));
        }
        assert!(progress.state().is_terminal());
        assert_eq!(progress.history().len(), 5);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut progress = UnitProgress::default();
        assert!(!progress.advance(UnitState::Clipped));
        assert!(!progress.advance(UnitState::Pending));
        assert_eq!(progress.state(), UnitState::Pending);
    }

    #[test]
    fn test_failed_and_retry() {
        let mut progress = UnitProgress::default();
        progress.advance(UnitState::Validated);
        assert!(progress.advance(UnitState::Failed));
        assert!(!progress.advance(UnitState::Failed));
        assert!(progress.advance(UnitState::Pending));
        assert_eq!(progress.state().as_str(), "pending");
    }
}
