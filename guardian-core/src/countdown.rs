use jiff::{SignedDuration, Timestamp};

/// Delay between "no motion observed" and the automatic power cut.
///
/// The countdown only records when it started and how long it lasts; the
/// elapsed and remaining time are always derived from a caller-provided
/// `now`, so the same value can be evaluated lazily on reads and eagerly by
/// the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub active: bool,
    pub start: Timestamp,
    pub duration: SignedDuration,
}

impl Countdown {
    pub fn new(duration: SignedDuration) -> Self {
        Self {
            active: false,
            start: Timestamp::UNIX_EPOCH,
            duration,
        }
    }

    pub fn start(&mut self, now: Timestamp) {
        self.active = true;
        self.start = now;
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn elapsed(&self, now: Timestamp) -> SignedDuration {
        now.duration_since(self.start)
    }

    /// Time left before expiry, clamped at zero. Zero when inactive.
    pub fn remaining(&self, now: Timestamp) -> SignedDuration {
        if !self.active {
            return SignedDuration::ZERO;
        }

        remaining(self.start, self.duration, now)
    }

    pub fn expired(&self, now: Timestamp) -> bool {
        self.active && self.elapsed(now) >= self.duration
    }
}

/// `max(0, duration - (now - start))`
pub fn remaining(start: Timestamp, duration: SignedDuration, now: Timestamp) -> SignedDuration {
    duration
        .saturating_sub(now.duration_since(start))
        .max(SignedDuration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_second(secs).unwrap()
    }

    #[test]
    fn remaining_counts_down_and_clamps() {
        let duration = SignedDuration::from_secs(180);

        assert_eq!(remaining(at(10), duration, at(10)), duration);
        assert_eq!(
            remaining(at(10), duration, at(70)),
            SignedDuration::from_secs(120)
        );
        assert_eq!(remaining(at(10), duration, at(500)), SignedDuration::ZERO);
    }

    #[test]
    fn inactive_countdown_never_expires() {
        let countdown = Countdown::new(SignedDuration::from_secs(5));

        assert!(!countdown.expired(at(1_000_000)));
        assert_eq!(countdown.remaining(at(1_000_000)), SignedDuration::ZERO);
    }

    #[test]
    fn expires_exactly_at_duration() {
        let mut countdown = Countdown::new(SignedDuration::from_secs(180));
        countdown.start(at(10));

        let just_before = at(190).checked_sub(SignedDuration::from_millis(1)).unwrap();
        assert!(!countdown.expired(just_before));
        assert!(countdown.expired(at(190)));
        assert!(countdown.expired(at(191)));
    }

    #[test]
    fn cancel_stops_expiry() {
        let mut countdown = Countdown::new(SignedDuration::from_secs(1));
        countdown.start(at(0));
        countdown.cancel();

        assert!(!countdown.active);
        assert!(!countdown.expired(at(60)));
    }
}
