//! Faucet cooldown countdown.
//!
//! The contract is the authority on the remaining cooldown; between refreshes
//! the client counts down locally once per second.

/// Seconds left before the next faucet claim. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    remaining: u64,
}

impl Countdown {
    pub fn new(remaining: u64) -> Self {
        Self { remaining }
    }

    /// Replace the local value with an authoritative reading.
    pub fn reset(&mut self, authoritative: u64) {
        self.remaining = authoritative;
    }

    /// Advance by one second. Returns the new value.
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_ready(&self) -> bool {
        self.remaining == 0
    }

    pub fn display(&self) -> String {
        format_hms(self.remaining)
    }
}

/// Format seconds as `HH:MM:SS`.
pub fn format_hms(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_saturates_at_zero() {
        let mut c = Countdown::new(2);
        assert!(!c.is_ready());
        assert_eq!(c.tick(), 1);
        assert_eq!(c.tick(), 0);
        assert!(c.is_ready());
        assert_eq!(c.tick(), 0);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_reset_overrides_local_value() {
        let mut c = Countdown::new(10);
        c.tick();
        c.reset(100);
        assert_eq!(c.remaining(), 100);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(59), "00:00:59");
        assert_eq!(format_hms(3661), "01:01:01");
        assert_eq!(format_hms(86_400), "24:00:00");
    }
}
