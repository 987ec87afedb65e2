use tracing::{debug, error, info};

use sattun_core::{ErrorKind, Liveness, LoopState};
use sattun_io::{Readiness, WaitOutcome};

/// Single-descriptor event loop shared by both directions.
///
/// Each iteration blocks on the readiness source, then hands control to the
/// direction's callback for one bounded unit of work. The loop runs as long as the
/// liveness flag says so; a wait failure other than signal delivery is fatal.
pub struct EventLoop<R: Readiness> {
    readiness: R,
    liveness: Liveness,
}

impl<R: Readiness> EventLoop<R> {
    /// Creates a loop waiting on `readiness` and stopping on `liveness`.
    pub fn new(readiness: R, liveness: Liveness) -> Self {
        Self { readiness, liveness }
    }

    /// Runs until stop is requested or a fatal error occurs, and returns the final state.
    pub fn run<F: FnMut()>(&mut self, mut on_ready: F) -> LoopState {
        while self.liveness.is_running() {
            match self.readiness.wait() {
                Ok(WaitOutcome::Ready) => on_ready(),
                Ok(WaitOutcome::Timeout) => {}
                Ok(WaitOutcome::Interrupted) => debug!("Readiness wait interrupted by a signal"),
                Err(err) => {
                    error!("{}", ErrorKind::PollFailed(err));
                    self.liveness.fail();
                }
            }
        }

        let state = self.liveness.state();
        match state {
            LoopState::StopRequested => info!("Termination requested, leaving the processing loop"),
            LoopState::ErrorStop => error!("Leaving the processing loop on an unrecoverable error"),
            LoopState::Running => {}
        }
        state
    }

    /// Returns the readiness source, consuming the loop.
    pub fn into_inner(self) -> R {
        self.readiness
    }
}
