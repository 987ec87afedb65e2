//! Termination signal handling.
//!
//! [`install`] routes SIGINT and SIGTERM to a handler that records the request, and
//! blocks both signals on the calling thread. They are then only delivered while a
//! [`crate::Poller`] waits; in between, a signal stays pending and [`stop_requested`]
//! still sees it through `sigpending(2)`. This lets a long multi-frame operation
//! notice a termination request without waiting for the next readiness wait.

use std::{
    io, mem, ptr,
    sync::atomic::{AtomicBool, Ordering},
};

use libc::{c_int, sigset_t, SIGINT, SIGTERM};
use tracing::debug;

use sattun_core::Liveness;

/// Signals requesting a clean shutdown.
pub const TERMINATION_SIGNALS: [c_int; 2] = [SIGINT, SIGTERM];

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_termination(_signal: c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Restores the signal mask and dispositions in place before [`install`].
pub struct SignalGuard {
    previous_mask: sigset_t,
    previous_actions: Vec<(c_int, libc::sigaction)>,
}

fn termination_set() -> io::Result<sigset_t> {
    let mut set: sigset_t = unsafe { mem::zeroed() };
    if unsafe { libc::sigemptyset(&mut set) } != 0 {
        return Err(io::Error::last_os_error());
    }
    for &signal in &TERMINATION_SIGNALS {
        if unsafe { libc::sigaddset(&mut set, signal) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(set)
}

/// Installs the termination handler and blocks the termination signals on the
/// calling thread until the returned guard is dropped.
pub fn install() -> io::Result<SignalGuard> {
    let mut previous_actions = Vec::with_capacity(TERMINATION_SIGNALS.len());
    for &signal in &TERMINATION_SIGNALS {
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = handle_termination as extern "C" fn(c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        let mut previous: libc::sigaction = unsafe { mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(signal, &action, &mut previous) != 0 {
                let err = io::Error::last_os_error();
                restore_actions(&previous_actions);
                return Err(err);
            }
        }
        previous_actions.push((signal, previous));
    }

    let set = match termination_set() {
        Ok(set) => set,
        Err(err) => {
            restore_actions(&previous_actions);
            return Err(err);
        }
    };
    let mut previous_mask: sigset_t = unsafe { mem::zeroed() };
    let ret = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous_mask) };
    if ret != 0 {
        restore_actions(&previous_actions);
        return Err(io::Error::from_raw_os_error(ret));
    }

    debug!("Termination signals handled and blocked outside of readiness waits");
    Ok(SignalGuard { previous_mask, previous_actions })
}

fn restore_actions(actions: &[(c_int, libc::sigaction)]) {
    for (signal, action) in actions {
        unsafe {
            libc::sigaction(*signal, action, ptr::null_mut());
        }
    }
}

/// Returns true once a termination signal was delivered or is pending.
pub fn stop_requested() -> bool {
    if STOP_REQUESTED.load(Ordering::SeqCst) {
        return true;
    }
    let mut pending: sigset_t = unsafe { mem::zeroed() };
    if unsafe { libc::sigpending(&mut pending) } != 0 {
        return false;
    }
    TERMINATION_SIGNALS.iter().any(|&signal| unsafe { libc::sigismember(&pending, signal) } == 1)
}

/// Returns a liveness flag that turns to stop-requested on termination signals.
pub fn liveness() -> Liveness {
    Liveness::with_stop_probe(stop_requested)
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        // Pending signals reach the handler once unblocked, before the old
        // dispositions come back.
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous_mask, ptr::null_mut());
        }
        restore_actions(&self.previous_actions);
    }
}
