//! Response Deadlines
//!
//! The GGP protocol gives a player a start or play clock in which to
//! respond. A [`Deadline`] pins that clock to the instant the local
//! process first observed the message.
//!
//! The protocol carries no timestamp from the game master, so there is no
//! way to account for network lag: the deadline starts when the handler
//! receives the request and therefore overestimates the time remaining
//! from the master's perspective. Callbacks are expected to call
//! [`Deadline::reduce`] to build in a healthy response margin.

use std::time::{Duration, Instant};

/// A mutable point-in-time deadline derived from an arrival timestamp
/// plus a clock duration.
///
/// The state machine creates one per message and hands an independent
/// clone to the user callback, so user mutation cannot corrupt the value
/// used for post-callback latency logging.
#[derive(Debug, Clone)]
pub struct Deadline {
    decision_instant: Instant,
}

impl Deadline {
    /// Build a deadline `clock_secs` after the given arrival instant.
    pub fn new(arrived_at: Instant, clock_secs: u64) -> Self {
        Self {
            decision_instant: arrived_at + Duration::from_secs(clock_secs),
        }
    }

    /// Time left before the decision instant, clamped at zero.
    pub fn remaining(&self) -> Duration {
        self.decision_instant.saturating_duration_since(Instant::now())
    }

    /// Whether the decision instant has passed.
    pub fn has_expired(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Push the decision instant later.
    pub fn extend(&mut self, duration: Duration) {
        self.decision_instant += duration;
    }

    /// Pull the decision instant earlier, e.g. to reserve a response
    /// margin. Saturates if the platform cannot represent the result.
    pub fn reduce(&mut self, duration: Duration) {
        if let Some(earlier) = self.decision_instant.checked_sub(duration) {
            self.decision_instant = earlier;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_has_time_remaining() {
        let deadline = Deadline::new(Instant::now(), 10);
        assert!(!deadline.has_expired());
        assert!(deadline.remaining() > Duration::from_secs(9));
        assert!(deadline.remaining() <= Duration::from_secs(10));
    }

    #[test]
    fn test_expired_deadline_clamps_to_zero() {
        let deadline = Deadline::new(Instant::now() - Duration::from_secs(5), 1);
        assert!(deadline.has_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_extend_and_reduce() {
        let mut deadline = Deadline::new(Instant::now(), 10);
        deadline.extend(Duration::from_secs(10));
        assert!(deadline.remaining() > Duration::from_secs(19));

        deadline.reduce(Duration::from_secs(15));
        let remaining = deadline.remaining();
        assert!(remaining > Duration::from_secs(4));
        assert!(remaining <= Duration::from_secs(5));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Deadline::new(Instant::now(), 10);
        let mut user_copy = original.clone();
        user_copy.reduce(Duration::from_secs(8));
        assert!(original.remaining() > Duration::from_secs(9));
        assert!(user_copy.remaining() <= Duration::from_secs(2));
    }
}
