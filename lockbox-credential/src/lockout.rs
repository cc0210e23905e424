//! Sliding-window rate limiter for credential verification attempts.

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// The attempt was rejected because the policy is (now) locked out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("too many attempts; wait a few moments before trying again")]
pub struct LockoutError;

/// Counts verification attempts in a sliding window and locks entry out
/// after too many. Attempts arriving while locked out keep pushing the
/// unlock time further; spamming never shortens the wait.
///
/// User cancellations are not attempts; callers only register submissions
/// that would otherwise reach verification.
#[derive(Debug, Default)]
pub struct LockoutPolicy {
    tries_in_window: u32,
    window_start: Option<Instant>,
    locked_until: Option<Instant>,
}

impl LockoutPolicy {
    /// Attempts allowed inside one window before lockout.
    pub const MAX_TRIES_PER_WINDOW: u32 = 5;
    /// Length of the counting window.
    pub const WINDOW: Duration = Duration::from_secs(30);
    /// Length of a lockout (also the extension granted per rejected attempt).
    pub const LOCKOUT: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self::default()
    }

    /// Whether attempts are currently rejected.
    pub fn is_locked_out(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Registers one verification attempt. `Ok(())` means the attempt may
    /// proceed to verification; `Err` means it is rejected outright.
    pub fn register_attempt(&mut self, now: Instant) -> Result<(), LockoutError> {
        if let Some(until) = self.locked_until {
            if now < until {
                // still locked: reject and extend
                self.locked_until = Some(now + Self::LOCKOUT);
                debug!("attempt during lockout; extending");
                return Err(LockoutError);
            }
            self.locked_until = None;
            info!("lockout elapsed; entry unlocked");
        }

        if self.tries_in_window == 0 {
            self.window_start = Some(now);
        }
        self.tries_in_window += 1;

        if self.tries_in_window > Self::MAX_TRIES_PER_WINDOW {
            // reset for the next window no matter what
            self.tries_in_window = 0;
            let window_age = now - self.window_start.take().expect("window started above");
            if window_age <= Self::WINDOW {
                info!(
                    "more than {} attempts within {:?}; locking out",
                    Self::MAX_TRIES_PER_WINDOW,
                    Self::WINDOW
                );
                self.locked_until = Some(now + Self::LOCKOUT);
                return Err(LockoutError);
            }
            // burst was spread over a stale window; let this attempt through
            debug!("attempt count exceeded but window is stale; letting it pass");
        }
        Ok(())
    }
}
