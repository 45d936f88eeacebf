//! Exponential backoff for transient transport errors.

use std::thread;
use std::time::Duration;

pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Backoff {
            floor,
            cap,
            current: floor,
        }
    }

    /// Sleeps for the current delay, then doubles it (capped).
    pub fn sleep(&mut self) {
        thread::sleep(self.current);
        self.current = (self.current * 2).min(self.cap);
    }

    /// Called after a successful operation so the next failure starts back
    /// at the floor instead of continuing to climb.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(4));
        assert_eq!(backoff.current, Duration::from_millis(1));
        backoff.sleep();
        assert_eq!(backoff.current, Duration::from_millis(2));
        backoff.sleep();
        assert_eq!(backoff.current, Duration::from_millis(4));
        backoff.sleep();
        assert_eq!(backoff.current, Duration::from_millis(4));
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(100));
        backoff.sleep();
        backoff.sleep();
        backoff.reset();
        assert_eq!(backoff.current, Duration::from_millis(1));
    }
}
