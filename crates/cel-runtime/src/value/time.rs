//! Duration and timestamp payloads.

use chrono::SecondsFormat;

/// A signed nanosecond-resolution interval, bounded to ±10,000 years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    /// Seconds component.
    pub seconds: i64,
    /// Nanoseconds component; same sign as `seconds`, magnitude below one
    /// second.
    pub nanos: i32,
}

impl Duration {
    /// Upper bound in seconds (10,000 Julian years).
    pub const MAX_SECONDS: i64 = 315_576_000_000;

    /// Lower bound in seconds.
    pub const MIN_SECONDS: i64 = -315_576_000_000;

    /// Create a duration without range checking. Prefer
    /// `ValueFactory::duration_value` for the checked path.
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Create a duration from whole seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Create a duration from nanoseconds.
    pub fn from_nanos(nanos: i128) -> Self {
        Self {
            seconds: (nanos / 1_000_000_000) as i64,
            nanos: (nanos % 1_000_000_000) as i32,
        }
    }

    /// Total nanoseconds; the valid range fits in i128 without overflow.
    pub fn to_nanos(&self) -> i128 {
        i128::from(self.seconds) * 1_000_000_000 + i128::from(self.nanos)
    }

    /// Returns true if the interval is negative.
    pub fn is_negative(&self) -> bool {
        self.seconds < 0 || (self.seconds == 0 && self.nanos < 0)
    }

    /// Returns true if the duration is the zero interval.
    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }

    /// Whether this duration lies within the ±10,000-year bound.
    pub fn is_in_range(&self) -> bool {
        let nanos = self.to_nanos();
        nanos >= i128::from(Self::MIN_SECONDS) * 1_000_000_000
            && nanos <= i128::from(Self::MAX_SECONDS) * 1_000_000_000
    }

    /// Decimal-seconds rendering with an `s` suffix, e.g. `3.5s` or `-2s`.
    pub fn format_seconds(&self) -> String {
        let mut seconds = self.seconds;
        let mut nanos = self.nanos;
        let negative = self.is_negative();
        if negative {
            seconds = -seconds;
            nanos = -nanos;
        }
        let sign = if negative { "-" } else { "" };
        if nanos == 0 {
            return format!("{}{}s", sign, seconds);
        }
        // Trim to the coarsest of milli/micro/nano precision, matching the
        // canonical protobuf JSON rendering.
        let frac = if nanos % 1_000_000 == 0 {
            format!("{:03}", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{:06}", nanos / 1_000)
        } else {
            format!("{:09}", nanos)
        };
        format!("{}{}.{}s", sign, seconds, frac)
    }
}

/// An absolute instant with nanosecond resolution, bounded to ±10,000 years
/// from the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Nanosecond offset, `0..=999_999_999`.
    pub nanos: i32,
}

impl Timestamp {
    /// Upper bound in seconds from the epoch.
    pub const MAX_SECONDS: i64 = 315_576_000_000;

    /// Lower bound in seconds from the epoch.
    pub const MIN_SECONDS: i64 = -315_576_000_000;

    /// Create a timestamp without range checking. Prefer
    /// `ValueFactory::timestamp_value` for the checked path.
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Create a timestamp at a whole second since the epoch.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// The Unix epoch.
    pub fn epoch() -> Self {
        Self::new(0, 0)
    }

    /// Total nanoseconds since the epoch.
    pub fn to_nanos(&self) -> i128 {
        i128::from(self.seconds) * 1_000_000_000 + i128::from(self.nanos)
    }

    /// Whether this instant lies within the ±10,000-year bound.
    pub fn is_in_range(&self) -> bool {
        let nanos = self.to_nanos();
        nanos >= i128::from(Self::MIN_SECONDS) * 1_000_000_000
            && nanos <= i128::from(Self::MAX_SECONDS) * 1_000_000_000
    }

    /// RFC 3339 rendering in UTC, e.g. `2021-01-01T00:00:00Z`. Returns
    /// `None` outside chrono's representable window.
    pub fn to_rfc3339(&self) -> Option<String> {
        let datetime = chrono::DateTime::from_timestamp(self.seconds, self.nanos as u32)?;
        Some(datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_bounds() {
        assert!(Duration::from_seconds(Duration::MAX_SECONDS).is_in_range());
        assert!(Duration::from_seconds(Duration::MIN_SECONDS).is_in_range());
        assert!(!Duration::new(Duration::MAX_SECONDS, 1).is_in_range());
        assert!(!Duration::new(Duration::MIN_SECONDS, -1).is_in_range());
        assert!(!Duration::from_seconds(Duration::MAX_SECONDS + 1).is_in_range());
    }

    #[test]
    fn test_timestamp_bounds() {
        assert!(Timestamp::from_seconds(Timestamp::MAX_SECONDS).is_in_range());
        assert!(Timestamp::from_seconds(Timestamp::MIN_SECONDS).is_in_range());
        assert!(!Timestamp::new(Timestamp::MAX_SECONDS, 1).is_in_range());
        assert!(!Timestamp::from_seconds(Timestamp::MIN_SECONDS - 1).is_in_range());
    }

    #[test]
    fn test_duration_nanos_round_trip() {
        let d = Duration::from_nanos(1_500_000_000);
        assert_eq!(d.seconds, 1);
        assert_eq!(d.nanos, 500_000_000);
        assert_eq!(d.to_nanos(), 1_500_000_000);

        let d = Duration::from_nanos(-1_500_000_000);
        assert_eq!(d.seconds, -1);
        assert_eq!(d.nanos, -500_000_000);
        assert!(d.is_negative());
    }

    #[test]
    fn test_duration_format_seconds() {
        assert_eq!(Duration::from_seconds(3).format_seconds(), "3s");
        assert_eq!(Duration::new(3, 500_000_000).format_seconds(), "3.500s");
        assert_eq!(Duration::new(0, 1).format_seconds(), "0.000000001s");
        assert_eq!(Duration::new(-2, -500_000).format_seconds(), "-2.000500s");
        assert_eq!(Duration::from_seconds(0).format_seconds(), "0s");
    }

    #[test]
    fn test_timestamp_rfc3339() {
        assert_eq!(
            Timestamp::epoch().to_rfc3339().unwrap(),
            "1970-01-01T00:00:00Z"
        );
        assert_eq!(
            Timestamp::new(1_609_459_200, 0).to_rfc3339().unwrap(),
            "2021-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_timestamp_ordering() {
        let early = Timestamp::new(100, 0);
        let late = Timestamp::new(100, 500);
        assert!(early < late);
        assert!(Timestamp::new(99, 999_999_999) < early);
    }
}
