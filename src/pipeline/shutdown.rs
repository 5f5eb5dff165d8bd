//! Shutdown coordination.
//!
//! Quit keys, fatal capture errors and termination signals all funnel into
//! one [`ShutdownController`]. The first trigger decides the reason, and the
//! controller hands out the right to tear the pipeline down exactly once.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Why the relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A preview reported a quit key or its window was closed.
    QuitKey,
    /// The process was asked to terminate.
    Terminated,
    /// The capture device reported an unrecoverable error.
    CaptureFailed(String),
    /// Every sink has failed.
    SinksExhausted,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::QuitKey | Self::Terminated => 0,
            Self::CaptureFailed(_) | Self::SinksExhausted => 1,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuitKey => f.write_str("quit requested"),
            Self::Terminated => f.write_str("terminated"),
            Self::CaptureFailed(msg) => write!(f, "capture failed: {msg}"),
            Self::SinksExhausted => f.write_str("all sinks failed"),
        }
    }
}

/// Single teardown trigger shared by every shutdown path.
///
/// One controller belongs to one pipeline.
#[derive(Debug, Default)]
pub struct ShutdownController {
    reason: Mutex<Option<ShutdownReason>>,
    requested: AtomicBool,
    teardown_claimed: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns true if this call set the reason.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut slot = self.reason.lock();
        if let Some(existing) = slot.as_ref() {
            debug!("shutdown already requested ({existing}), ignoring {reason}");
            return false;
        }
        info!("shutdown requested: {reason}");
        *slot = Some(reason);
        self.requested.store(true, Ordering::Release);
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// The reason recorded by the first trigger.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    /// Claim the right to run teardown. Only the first caller gets true.
    pub fn claim_teardown(&self) -> bool {
        self.teardown_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn teardown_claimed(&self) -> bool {
        self.teardown_claimed.load(Ordering::Acquire)
    }
}

/// Exit status when a repeated signal abandons teardown (128 + SIGINT).
pub const EXIT_FORCED: i32 = 130;

/// What the listener does with a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Ask the pipeline to drain and tear down.
    Shutdown,
    /// Teardown is already under way; leave immediately.
    ForceExit,
}

/// Record one received signal. The first requests shutdown; any later one
/// escalates to [`SignalAction::ForceExit`].
pub fn on_signal(controller: &ShutdownController, received: &mut u32) -> SignalAction {
    *received += 1;
    if *received == 1 {
        controller.trigger(ShutdownReason::Terminated);
        SignalAction::Shutdown
    } else {
        SignalAction::ForceExit
    }
}

/// Trigger `controller` with [`ShutdownReason::Terminated`] on SIGINT or
/// SIGTERM (Ctrl+C on other platforms).
///
/// The listener runs on its own thread with a current-thread tokio runtime
/// for the life of the process. A second signal exits with [`EXIT_FORCED`]
/// without waiting for teardown, so a device that blocks while opening can
/// still be interrupted.
pub fn listen_for_termination(controller: Arc<ShutdownController>) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || runtime.block_on(relay_signals(controller)))
}

async fn relay_signals(controller: Arc<ShutdownController>) {
    let mut signals = TerminationSignals::new();
    let mut received = 0;
    loop {
        signals.recv().await;
        if on_signal(&controller, &mut received) == SignalAction::ForceExit {
            warn!("second termination signal, exiting without teardown");
            std::process::exit(EXIT_FORCED);
        }
    }
}

struct TerminationSignals {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl TerminationSignals {
    #[cfg(unix)]
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                None
            }
        };
        Self { terminate }
    }

    #[cfg(not(unix))]
    fn new() -> Self {
        Self {}
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        match self.terminate.as_mut() {
            Some(terminate) => {
                tokio::select! {
                    _ = ctrl_c() => debug!("received SIGINT"),
                    _ = terminate.recv() => debug!("received SIGTERM"),
                }
            }
            None => ctrl_c().await,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_wins() {
        let controller = ShutdownController::new();
        assert!(!controller.is_requested());
        assert!(controller.trigger(ShutdownReason::QuitKey));
        assert!(!controller.trigger(ShutdownReason::CaptureFailed("unplugged".to_string())));
        assert!(controller.is_requested());
        assert_eq!(controller.reason(), Some(ShutdownReason::QuitKey));
    }

    #[test]
    fn teardown_is_claimed_once() {
        let controller = ShutdownController::new();
        assert!(controller.claim_teardown());
        assert!(!controller.claim_teardown());
        assert!(controller.teardown_claimed());
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let controller = Arc::new(ShutdownController::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    let reason = if i % 2 == 0 {
                        ShutdownReason::QuitKey
                    } else {
                        ShutdownReason::Terminated
                    };
                    controller.trigger(reason);
                    controller.claim_teardown()
                })
            })
            .collect();
        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(controller.reason().is_some());
    }

    #[test]
    fn second_signal_forces_exit() {
        let controller = ShutdownController::new();
        let mut received = 0;
        assert_eq!(on_signal(&controller, &mut received), SignalAction::Shutdown);
        assert_eq!(controller.reason(), Some(ShutdownReason::Terminated));
        assert_eq!(on_signal(&controller, &mut received), SignalAction::ForceExit);
        assert_eq!(on_signal(&controller, &mut received), SignalAction::ForceExit);
        assert_eq!(controller.reason(), Some(ShutdownReason::Terminated));
    }

    #[test]
    fn signal_after_quit_key_keeps_the_quit_reason() {
        let controller = ShutdownController::new();
        controller.trigger(ShutdownReason::QuitKey);
        let mut received = 0;
        assert_eq!(on_signal(&controller, &mut received), SignalAction::Shutdown);
        assert_eq!(controller.reason(), Some(ShutdownReason::QuitKey));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ShutdownReason::QuitKey.exit_code(), 0);
        assert_eq!(ShutdownReason::Terminated.exit_code(), 0);
        assert_eq!(ShutdownReason::CaptureFailed("x".to_string()).exit_code(), 1);
        assert_eq!(ShutdownReason::SinksExhausted.exit_code(), 1);
    }
}
