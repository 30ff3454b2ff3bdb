//! Worker lifecycle state machine

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Running,
    Retrying,
    Faulted,
    Stopped,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Running => "running",
            CaptureState::Retrying => "retrying",
            CaptureState::Faulted => "faulted",
            CaptureState::Stopped => "stopped",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, next),
            (Idle, Running | Stopped)
                | (Running, Retrying | Faulted | Stopped)
                | (Retrying, Running | Faulted | Stopped)
                | (Faulted, Stopped)
                | (Stopped, Idle | Running)
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Observer = Box<dyn Fn(CaptureState, Option<&str>) + Send + Sync>;

/// Tracks the worker's state and notifies observers of transitions
///
/// Rejected transitions are logged and leave the state unchanged; a
/// transition to the current state is a silent no-op.
pub struct CaptureStateMachine {
    state: CaptureState,
    observers: Vec<Observer>,
}

impl CaptureStateMachine {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Register an observer for accepted transitions
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(CaptureState, Option<&str>) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Move to `next`, returning whether the state changed
    pub fn transition(&mut self, next: CaptureState, message: Option<&str>) -> bool {
        if next == self.state {
            return false;
        }
        if !self.state.can_transition_to(next) {
            warn!("Ignoring invalid capture transition {} -> {}", self.state, next);
            return false;
        }

        debug!("Capture state {} -> {}", self.state, next);
        self.state = next;
        for observer in &self.observers {
            observer(next, message);
        }
        true
    }
}

impl Default for CaptureStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CaptureStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureStateMachine")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const ALL: [CaptureState; 5] = [
        CaptureState::Idle,
        CaptureState::Running,
        CaptureState::Retrying,
        CaptureState::Faulted,
        CaptureState::Stopped,
    ];

    fn machine_in(state: CaptureState) -> CaptureStateMachine {
        CaptureStateMachine {
            state,
            observers: Vec::new(),
        }
    }

    #[test]
    fn test_starts_idle() {
        assert_eq!(CaptureStateMachine::new().state(), CaptureState::Idle);
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut m = CaptureStateMachine::new();
        assert!(m.transition(CaptureState::Running, None));
        assert!(m.transition(CaptureState::Retrying, Some("fetch failed")));
        assert!(m.transition(CaptureState::Running, None));
        assert!(m.transition(CaptureState::Stopped, None));
        assert!(m.transition(CaptureState::Running, None));
        assert!(m.transition(CaptureState::Stopped, None));
        assert!(m.transition(CaptureState::Idle, None));
    }

    #[test]
    fn test_faulted_only_allows_stopped() {
        for next in ALL {
            let mut m = machine_in(CaptureState::Faulted);
            let changed = m.transition(next, None);
            assert_eq!(changed, next == CaptureState::Stopped, "faulted -> {}", next);
        }
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut m = CaptureStateMachine::new();
        assert!(!m.transition(CaptureState::Retrying, None));
        assert!(!m.transition(CaptureState::Faulted, None));
        assert_eq!(m.state(), CaptureState::Idle);
    }

    #[test]
    fn test_self_transition_is_noop() {
        let seen = Arc::new(Mutex::new(0));
        let mut m = machine_in(CaptureState::Running);
        let counter = seen.clone();
        m.subscribe(move |_, _| *counter.lock().unwrap() += 1);

        assert!(!m.transition(CaptureState::Running, None));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_observers_see_accepted_transitions_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut m = CaptureStateMachine::new();
        let log = seen.clone();
        m.subscribe(move |state, msg| {
            log.lock()
                .unwrap()
                .push((state, msg.map(str::to_string)));
        });

        m.transition(CaptureState::Running, Some("started"));
        m.transition(CaptureState::Idle, Some("rejected"));
        m.transition(CaptureState::Faulted, Some("boom"));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (CaptureState::Running, Some("started".to_string())),
                (CaptureState::Faulted, Some("boom".to_string())),
            ]
        );
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CaptureState::Retrying).unwrap(),
            "\"retrying\""
        );
    }
}
