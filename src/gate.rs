//! Send gate: outbound rate limiting.
//!
//! Two independent limits guard the outbound path:
//!
//! 1. A rolling-window budget for privileged chat sends. [`SendGate::try_reserve`]
//!    atomically checks and counts a send against the window cap; the
//!    connection manager schedules the matching [`SendGate::release`] one
//!    second after the window would have aged the send out, so slots free up
//!    one at a time.
//! 2. A minimum interval between connection-affecting calls (connect, join),
//!    enforced with a governor token bucket. Denial here propagates to the
//!    caller; those calls pace themselves rather than being silently retried.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Accounting for the rolling-window chat budget.
#[derive(Debug)]
struct SendBudget {
    /// Sends currently counted against the window. Always in
    /// `[0, max_per_window]`.
    in_flight: u32,
}

/// Thread-safe outbound rate limiter.
///
/// Mutated from both the foreground dispatch loop and scheduled background
/// callbacks, so all accounting sits behind a mutex.
pub struct SendGate {
    budget: Mutex<SendBudget>,
    max_per_window: u32,
    control: DirectRateLimiter,
}

impl SendGate {
    /// Create a gate with the given window cap and control-call interval.
    pub fn new(max_per_window: u32, control_interval: Duration) -> Self {
        let quota = Quota::with_period(control_interval)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)));
        Self {
            budget: Mutex::new(SendBudget { in_flight: 0 }),
            max_per_window,
            control: RateLimiter::direct(quota),
        }
    }

    /// Reserve one slot of the chat budget.
    ///
    /// Returns `false` when the window is full; the caller defers the
    /// message and retries, it is never dropped. On `true` the caller owes
    /// exactly one [`release`](Self::release) once the send ages out.
    pub fn try_reserve(&self) -> bool {
        let mut budget = self.budget.lock();
        if budget.in_flight >= self.max_per_window {
            debug!(in_flight = budget.in_flight, "chat send budget exhausted");
            return false;
        }
        budget.in_flight += 1;
        true
    }

    /// Return one previously reserved slot to the budget.
    pub fn release(&self) {
        let mut budget = self.budget.lock();
        if budget.in_flight == 0 {
            debug!("budget release with nothing in flight");
            return;
        }
        budget.in_flight -= 1;
    }

    /// Reserve a connection-affecting call (connect, join).
    ///
    /// Returns `false` when the minimum interval has not elapsed.
    pub fn try_reserve_control(&self) -> bool {
        let allowed = self.control.check().is_ok();
        if !allowed {
            debug!("control call rate limit exceeded");
        }
        allowed
    }

    /// Number of sends currently counted against the window.
    #[allow(dead_code)] // diagnostics surface
    pub fn in_flight(&self) -> u32 {
        self.budget.lock().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(max: u32) -> SendGate {
        SendGate::new(max, Duration::from_secs(2))
    }

    #[test]
    fn denies_the_send_past_the_cap() {
        let gate = gate(90);

        for _ in 0..90 {
            assert!(gate.try_reserve());
        }
        assert!(!gate.try_reserve());
        assert_eq!(gate.in_flight(), 90);
    }

    #[test]
    fn budget_frees_one_slot_at_a_time() {
        let gate = gate(2);

        assert!(gate.try_reserve());
        assert!(gate.try_reserve());
        assert!(!gate.try_reserve());

        gate.release();
        assert!(gate.try_reserve());
        assert!(!gate.try_reserve());
    }

    #[test]
    fn release_never_underflows() {
        let gate = gate(5);

        gate.release();
        assert_eq!(gate.in_flight(), 0);

        assert!(gate.try_reserve());
        gate.release();
        gate.release();
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn control_calls_are_interval_limited() {
        let gate = gate(90);

        assert!(gate.try_reserve_control());
        // Immediately again: the 2-second interval has not elapsed.
        assert!(!gate.try_reserve_control());
    }

    #[test]
    fn control_gate_is_independent_of_the_chat_budget() {
        let gate = gate(1);

        assert!(gate.try_reserve());
        assert!(!gate.try_reserve());
        // Chat exhaustion does not consume the control budget.
        assert!(gate.try_reserve_control());
    }
}
