//! Lazy initialisation state machine for external stores.
//!
//! The replicated store is opened on first use rather than at startup. The
//! adapter in `board-client` drives this machine; concurrent callers that
//! find it `Initializing` wait for the in-flight attempt instead of starting
//! another one.

/// Initialisation phase of an external store connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitState {
    /// Never opened, or closed.
    #[default]
    Uninitialized,
    /// An open attempt is in flight.
    Initializing,
    /// Open and usable.
    Ready,
    /// The last open attempt failed; the next caller retries.
    Failed {
        /// Why the attempt failed.
        reason: String,
    },
}

/// Inputs to the initialisation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitEvent {
    /// A caller started an open attempt.
    Started,
    /// The open attempt completed.
    Succeeded,
    /// The open attempt failed.
    Failed(String),
    /// The store reported itself unavailable after being ready.
    Lost,
    /// The connection was closed on purpose.
    Closed,
}

impl InitState {
    /// Apply an event, returning the next state.
    pub fn on_event(self, event: InitEvent) -> Self {
        match (self, event) {
            (_, InitEvent::Closed) => Self::Uninitialized,
            (Self::Ready, InitEvent::Started) => Self::Ready,
            (_, InitEvent::Started) => Self::Initializing,
            (Self::Initializing, InitEvent::Succeeded) => Self::Ready,
            (Self::Initializing, InitEvent::Failed(reason)) => Self::Failed { reason },
            (Self::Ready, InitEvent::Lost) => Self::Uninitialized,
            (state, _) => state,
        }
    }

    /// Whether the store can be used right now.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether a caller must start an open attempt.
    pub fn needs_init(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let state = InitState::default();
        assert!(state.needs_init());

        let state = state.on_event(InitEvent::Started);
        assert_eq!(state, InitState::Initializing);
        assert!(!state.needs_init());

        let state = state.on_event(InitEvent::Succeeded);
        assert!(state.is_ready());
    }

    #[test]
    fn failure_allows_retry() {
        let state = InitState::default()
            .on_event(InitEvent::Started)
            .on_event(InitEvent::Failed("connection refused".into()));
        assert_eq!(
            state,
            InitState::Failed {
                reason: "connection refused".into()
            }
        );
        assert!(state.needs_init());
        assert_eq!(state.on_event(InitEvent::Started), InitState::Initializing);
    }

    #[test]
    fn ready_ignores_restart() {
        let state = InitState::Ready.on_event(InitEvent::Started);
        assert!(state.is_ready());
    }

    #[test]
    fn lost_returns_to_uninitialized() {
        let state = InitState::Ready.on_event(InitEvent::Lost);
        assert!(state.needs_init());
    }

    #[test]
    fn close_from_any_state() {
        for state in [
            InitState::Uninitialized,
            InitState::Initializing,
            InitState::Ready,
            InitState::Failed { reason: "x".into() },
        ] {
            assert_eq!(state.on_event(InitEvent::Closed), InitState::Uninitialized);
        }
    }

    #[test]
    fn stray_completion_is_ignored() {
        assert_eq!(
            InitState::Uninitialized.on_event(InitEvent::Succeeded),
            InitState::Uninitialized
        );
    }
}
