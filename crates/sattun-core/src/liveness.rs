//! The tri-state flag both pipelines consult to decide whether to keep running.
//!
//! A [`Liveness`] is cheap to clone and every clone observes the same state. Stop is
//! requested either explicitly through [`Liveness::request_stop`] or by an optional
//! stop probe, usually installed by the signal handling layer, which is polled each
//! time the state is read. An unrecoverable failure moves the flag to
//! [`LoopState::ErrorStop`], which no later stop request overrides.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

/// State of a processing loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// The loop keeps processing events.
    Running = 0,
    /// A termination request was received; the loop winds down cleanly.
    StopRequested = 1,
    /// An unrecoverable failure occurred; the loop winds down with an error.
    ErrorStop = 2,
}

impl LoopState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => LoopState::Running,
            1 => LoopState::StopRequested,
            _ => LoopState::ErrorStop,
        }
    }
}

/// Shared liveness flag.
#[derive(Clone, Debug)]
pub struct Liveness {
    state: Arc<AtomicU8>,
    stop_probe: Option<fn() -> bool>,
}

impl Liveness {
    /// Creates a flag in the [`LoopState::Running`] state, without stop probe.
    pub fn new() -> Self {
        Self { state: Arc::new(AtomicU8::new(LoopState::Running as u8)), stop_probe: None }
    }

    /// Creates a running flag that also reports a stop request whenever `probe` returns true.
    pub fn with_stop_probe(probe: fn() -> bool) -> Self {
        Self { stop_probe: Some(probe), ..Self::new() }
    }

    /// Returns the current state, polling the stop probe while running.
    pub fn state(&self) -> LoopState {
        let state = LoopState::from_raw(self.state.load(Ordering::Acquire));
        if state == LoopState::Running && self.stop_probe.map_or(false, |probe| probe()) {
            self.request_stop();
            return LoopState::from_raw(self.state.load(Ordering::Acquire));
        }
        state
    }

    /// Returns true while no stop was requested and no failure occurred.
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Requests a clean stop. Has no effect once the flag left the running state.
    pub fn request_stop(&self) {
        let _ = self.state.compare_exchange(
            LoopState::Running as u8,
            LoopState::StopRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Records an unrecoverable failure.
    pub fn fail(&self) {
        self.state.store(LoopState::ErrorStop as u8, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn test_new_flag_is_running() {
        let liveness = Liveness::new();
        assert!(liveness.is_running());
        assert_eq!(liveness.state(), LoopState::Running);
    }

    #[test]
    fn test_clones_share_state() {
        let liveness = Liveness::new();
        let observer = liveness.clone();
        liveness.request_stop();
        assert_eq!(observer.state(), LoopState::StopRequested);
    }

    #[test]
    fn test_error_stop_is_not_overridden() {
        let liveness = Liveness::new();
        liveness.fail();
        liveness.request_stop();
        assert_eq!(liveness.state(), LoopState::ErrorStop);
    }

    #[test]
    fn test_failure_overrides_stop_request() {
        let liveness = Liveness::new();
        liveness.request_stop();
        liveness.fail();
        assert_eq!(liveness.state(), LoopState::ErrorStop);
    }

    static PROBE_FIRED: AtomicBool = AtomicBool::new(false);

    fn probe() -> bool {
        PROBE_FIRED.load(Ordering::SeqCst)
    }

    #[test]
    fn test_stop_probe_requests_stop() {
        let liveness = Liveness::with_stop_probe(probe);
        assert!(liveness.is_running());

        PROBE_FIRED.store(true, Ordering::SeqCst);
        assert_eq!(liveness.state(), LoopState::StopRequested);

        PROBE_FIRED.store(false, Ordering::SeqCst);
        assert_eq!(liveness.state(), LoopState::StopRequested);
    }
}
