//! Timestamp utilities shared by every protocol codec.
//!
//! Frame timestamps are carried as 100 ns ticks since the Unix epoch.
//! Protocols transmit second-of-century plus a fractional-second count at a
//! per-stream resolution (`time_base` counts per second); the conversions
//! here are exact in both directions for any time base the protocols use.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of 100 ns ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// A timestamp in 100 ns ticks since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ticks(pub i64);

impl Ticks {
    /// Captures the current system time.
    pub fn now() -> Self {
        let now = Utc::now();
        Ticks(now.timestamp() * TICKS_PER_SECOND + (now.timestamp_subsec_nanos() as i64) / 100)
    }

    /// Builds a timestamp from a second-of-century word and a fractional
    /// second expressed in `time_base` counts per second.
    pub fn from_soc_fracsec(soc: u32, fracsec: u32, time_base: u32) -> Self {
        let time_base = time_base.max(1) as i64;
        let whole = soc as i64 * TICKS_PER_SECOND;
        let fraction = (fracsec as i64 * TICKS_PER_SECOND) / time_base;
        Ticks(whole + fraction)
    }

    /// Splits the timestamp back into a second-of-century word and a
    /// fractional second in `time_base` counts per second.
    pub fn to_soc_fracsec(&self, time_base: u32) -> (u32, u32) {
        let time_base = time_base.max(1) as i64;
        let soc = self.0.div_euclid(TICKS_PER_SECOND);
        let remainder = self.0.rem_euclid(TICKS_PER_SECOND);
        let fracsec = (remainder * time_base) / TICKS_PER_SECOND;
        (soc as u32, fracsec as u32)
    }

    /// Whole seconds since the Unix epoch.
    pub fn seconds(&self) -> i64 {
        self.0.div_euclid(TICKS_PER_SECOND)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.0.div_euclid(TICKS_PER_SECOND);
        let nanos = (self.0.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soc_fracsec_roundtrip() {
        // Microsecond time base, the common C37.118 configuration
        let time_base = 1_000_000;
        let ticks = Ticks::from_soc_fracsec(1_149_580_800, 16_817, time_base);
        assert_eq!(
            ticks.0,
            1_149_580_800 * TICKS_PER_SECOND + 16_817 * (TICKS_PER_SECOND / 1_000_000)
        );

        let (soc, fracsec) = ticks.to_soc_fracsec(time_base);
        assert_eq!(soc, 1_149_580_800);
        assert_eq!(fracsec, 16_817);
    }

    #[test]
    fn test_roundtrip_across_time_bases() {
        for time_base in [1u32, 1_000, 16_777_215, 1_000_000] {
            for fracsec in [0u32, 1, time_base / 2, time_base.saturating_sub(1)] {
                let ticks = Ticks::from_soc_fracsec(1_672_531_200, fracsec, time_base);
                let (soc, back) = ticks.to_soc_fracsec(time_base);
                assert_eq!(soc, 1_672_531_200);
                assert_eq!(back, fracsec, "fracsec {} at time base {}", fracsec, time_base);
            }
        }
    }

    #[test]
    fn test_datetime_conversion() {
        let ticks = Ticks(1_672_531_200 * TICKS_PER_SECOND + 5_000_000);
        let datetime = ticks.to_datetime();
        assert_eq!(datetime.timestamp(), 1_672_531_200);
        assert_eq!(datetime.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_now_is_reasonable() {
        let ticks = Ticks::now();
        // After 2020-01-01 and before 2100-01-01
        assert!(ticks.seconds() > 1_577_836_800);
        assert!(ticks.seconds() < 4_102_444_800);
    }
}
