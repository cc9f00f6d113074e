use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

pub use media_ffmpeg::{Rational, rescale};

/// Tick rate of all content times: `1 / 90_000` seconds.
///
/// Frame durations at 24, 25, 30, 60 fps, NTSC `1001/30000` and the 1/600
/// capture timescale are all whole tick counts.
pub const CONTENT_TIME_BASE: Rational = Rational {
    num: 1,
    den: 90_000,
};

const TICKS_PER_SECOND: i64 = CONTENT_TIME_BASE.den as i64;
const NANOS_TIME_BASE: Rational = Rational {
    num: 1,
    den: 1_000_000_000,
};

/// Exact content time, stored as ticks of [`CONTENT_TIME_BASE`].
///
/// Addition and comparison are integer operations, so summing thousands of
/// segment durations never drifts.
///
/// # Example
/// ```
/// use replay_engine::MediaTime;
///
/// let mut total = MediaTime::ZERO;
/// for _ in 0..30_000 {
///     total += MediaTime::from_millis(33) + MediaTime::from_ticks(30);
/// }
/// assert_eq!(total, MediaTime::from_seconds(1_000));
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: Self = Self(0);

    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub const fn from_seconds(seconds: i64) -> Self {
        Self(seconds * TICKS_PER_SECOND)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * (TICKS_PER_SECOND / 1_000))
    }

    /// Converts `value` expressed in `time_base` with nearest rounding.
    pub fn from_rational(value: i64, time_base: Rational) -> Self {
        Self(rescale(value, time_base, CONTENT_TIME_BASE))
    }

    /// Converts a device clock reading.
    pub fn from_duration(duration: std::time::Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self(rescale(nanos, NANOS_TIME_BASE, CONTENT_TIME_BASE))
    }

    /// Lossy conversion for display and logging only.
    pub fn as_seconds_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add for MediaTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for MediaTime {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for MediaTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for MediaTime {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for MediaTime {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Display for MediaTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_second = TICKS_PER_SECOND.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:05}s",
            abs / per_second,
            abs % per_second * 100_000 / per_second
        )
    }
}
