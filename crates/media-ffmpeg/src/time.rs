use crate::error::{MediaFfmpegError, Result};

/// Fraction digits honoured when parsing `ffprobe` decimal seconds.
const MAX_FRACTION_DIGITS: usize = 12;

/// Rational value used as FFmpeg-like time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Microsecond time base `(1 / 1_000_000)`.
    pub const MICROS: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// Creates a validated time base. Both terms must be positive.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::Rational;
    ///
    /// let tb = Rational::new(1, 15_360).expect("valid");
    /// assert_eq!(tb.den, 15_360);
    /// assert!(Rational::new(1, 0).is_err());
    /// ```
    pub fn new(num: i32, den: i32) -> Result<Self> {
        if num <= 0 || den <= 0 {
            return Err(MediaFfmpegError::InvalidRational { num, den });
        }

        Ok(Self { num, den })
    }

    /// Parses a `num/den` text into a rational.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::Rational;
    ///
    /// let tb = Rational::parse("1/90000").expect("valid");
    /// assert_eq!(tb.den, 90_000);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let (num, den) = input
            .split_once('/')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "rational",
                value: input.to_string(),
            })?;
        let num = parse_i32(num, "rational num")?;
        let den = parse_i32(den, "rational den")?;
        Self::new(num, den)
    }
}

/// Rescales `ts` from one time base to another with nearest rounding.
///
/// # Example
/// ```
/// use media_ffmpeg::{rescale, Rational};
///
/// let src = Rational::new(1, 600).expect("valid");
/// let dst = Rational::new(1, 90_000).expect("valid");
/// assert_eq!(rescale(20, src, dst), 3_000);
/// ```
pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
    let numerator = i128::from(ts) * i128::from(from.num) * i128::from(to.den);
    let denominator = i128::from(from.den) * i128::from(to.num);
    let rounded = div_round_nearest(numerator, denominator);
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Converts decimal seconds as printed by `ffprobe` (e.g. `"2.002000"`) into
/// ticks of `to` without going through floating point.
///
/// # Example
/// ```
/// use media_ffmpeg::{Rational, decimal_seconds_to_ticks};
///
/// let tb = Rational::new(1, 90_000).expect("valid");
/// assert_eq!(decimal_seconds_to_ticks("1.001000", tb).expect("valid"), 90_090);
/// ```
pub fn decimal_seconds_to_ticks(text: &str, to: Rational) -> Result<i64> {
    let raw = text.trim();
    let parse_error = || MediaFfmpegError::Parse {
        context: "decimal seconds",
        value: raw.to_string(),
    };

    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(parse_error());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(parse_error());
    }

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    let scale = 10_i128.pow(fraction.len() as u32);
    let whole_value = parse_digits(whole).ok_or_else(parse_error)?;
    let fraction_value = parse_digits(fraction).ok_or_else(parse_error)?;

    let numerator = whole_value
        .checked_mul(scale)
        .and_then(|value| value.checked_add(fraction_value))
        .and_then(|value| value.checked_mul(i128::from(to.den)))
        .ok_or_else(parse_error)?;
    let denominator = scale * i128::from(to.num);
    let ticks = i64::try_from(div_round_nearest(numerator, denominator)).map_err(|_| parse_error())?;

    Ok(if negative { -ticks } else { ticks })
}

fn parse_digits(digits: &str) -> Option<i128> {
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse::<i128>().ok()
}

fn div_round_nearest(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);

    let abs_num = num.abs();
    let mut out = abs_num / den;
    let remainder = abs_num % den;
    if remainder.saturating_mul(2) >= den {
        out += 1;
    }

    if num < 0 { -out } else { out }
}

fn parse_i32(value: &str, context: &'static str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{Rational, decimal_seconds_to_ticks, rescale};

    fn content_base() -> Rational {
        Rational::new(1, 90_000).expect("valid rational")
    }

    #[test]
    fn new_rejects_zero_and_negative_terms() {
        assert!(Rational::new(0, 600).is_err());
        assert!(Rational::new(-1, 600).is_err());
        assert!(Rational::new(1, 0).is_err());
    }

    #[test]
    fn rescale_is_exact_for_ntsc_frame_duration() {
        let ntsc = Rational::new(1_001, 30_000).expect("valid rational");
        assert_eq!(rescale(1, ntsc, content_base()), 3_003);
    }

    #[test]
    fn decimal_seconds_accepts_integer_and_fraction_forms() {
        assert_eq!(
            decimal_seconds_to_ticks("2", content_base()).expect("integer"),
            180_000
        );
        assert_eq!(
            decimal_seconds_to_ticks(".5", content_base()).expect("fraction only"),
            45_000
        );
        assert_eq!(
            decimal_seconds_to_ticks("-0.25", content_base()).expect("negative"),
            -22_500
        );
    }

    #[test]
    fn decimal_seconds_rejects_garbage() {
        assert!(decimal_seconds_to_ticks("N/A", content_base()).is_err());
        assert!(decimal_seconds_to_ticks("", content_base()).is_err());
        assert!(decimal_seconds_to_ticks("1.2.3", content_base()).is_err());
    }
}
