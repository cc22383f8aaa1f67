use crate::config::ReconnectPolicy;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Scheduled { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Viewer-side retry bookkeeping: attempt counter plus at most one pending
/// deadline. The owning actor sleeps until `deadline()` and then calls
/// `take_due`.
#[derive(Debug)]
pub struct ReconnectionController {
    policy: ReconnectPolicy,
    attempts: u32,
    deadline: Option<Instant>,
}

impl ReconnectionController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            deadline: None,
        }
    }

    /// Counts a `failed`/`disconnected` transition and schedules the next
    /// attempt, replacing any pending one.
    pub fn on_connection_lost(&mut self, now: Instant) -> RetryDecision {
        self.attempts += 1;

        if self.attempts > self.policy.max_attempts {
            self.deadline = None;
            warn!(attempts = self.attempts, "Reconnection attempts exhausted");
            return RetryDecision::Exhausted {
                attempts: self.attempts,
            };
        }

        let delay = self.policy.delay_for(self.attempts);
        self.deadline = Some(now + delay);
        info!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        RetryDecision::Scheduled {
            attempt: self.attempts,
            delay,
        }
    }

    /// Back to attempt 1 for the next loss, and no pending timer.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.deadline = None;
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Clears the deadline if it has passed. Returns whether it had.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.policy.max_attempts
    }
}

/// Sleeps until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
