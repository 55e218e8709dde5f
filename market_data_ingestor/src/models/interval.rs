//! Bar intervals shared by the candle and open-interest endpoints.
//!
//! An [`Interval`] pairs a non-zero amount with an [`IntervalUnit`]. Only fixed-width
//! units are modelled (minute, hour, day), so every interval has an exact length in
//! milliseconds and bucket math stays plain integer arithmetic.
//!
//! ```
//! use market_data_ingestor::models::interval::{Interval, IntervalUnit};
//!
//! let tf: Interval = "4H".parse().unwrap();
//! assert_eq!(tf.unit(), IntervalUnit::Hour);
//! assert_eq!(tf.length_ms(), 4 * 60 * 60 * 1000);
//! assert_eq!(tf.to_string(), "4H");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use thiserror::Error;

/// Milliseconds in one minute.
pub const MS_PER_MINUTE: i64 = 60_000;
/// Milliseconds in one hour.
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
/// Milliseconds in one UTC day.
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,

    #[error("invalid interval amount in {input:?}")]
    InvalidAmount { input: String },

    #[error("unknown interval unit {unit:?} in {input:?}")]
    UnknownUnit { input: String, unit: String },
}

/// Interval granularity. All units are UTC and fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
}

impl IntervalUnit {
    const fn unit_ms(self) -> i64 {
        match self {
            IntervalUnit::Minute => MS_PER_MINUTE,
            IntervalUnit::Hour => MS_PER_HOUR,
            IntervalUnit::Day => MS_PER_DAY,
        }
    }
}

/// An interval = amount × unit (e.g. 5-Minute, 4-Hour, 1-Day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    amount: NonZeroU32,
    unit: IntervalUnit,
}

impl Interval {
    pub const fn new(amount: NonZeroU32, unit: IntervalUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }

    pub const fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// Width of one bucket in milliseconds.
    pub const fn length_ms(&self) -> i64 {
        self.amount.get() as i64 * self.unit.unit_ms()
    }

    /// Width of one bucket as a [`std::time::Duration`].
    pub const fn length(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.length_ms() as u64)
    }
}

/// Exchange-style rendering: `5m`, `1H`, `1D`.
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = match self.unit {
            IntervalUnit::Minute => "m",
            IntervalUnit::Hour => "H",
            IntervalUnit::Day => "D",
        };
        write!(f, "{}{u}", self.amount)
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    /// Accepts `5m`, `1h`/`1H`, `1d`/`1D`. `M` is rejected so it is never mistaken for a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(unit_char) = s.chars().last() else {
            return Err(IntervalError::Empty);
        };
        let (digits, unit) = s.split_at(s.len() - unit_char.len_utf8());
        let unit = match unit {
            "m" => IntervalUnit::Minute,
            "h" | "H" => IntervalUnit::Hour,
            "d" | "D" => IntervalUnit::Day,
            _ => {
                return Err(IntervalError::UnknownUnit {
                    input: s.to_string(),
                    unit: unit.to_string(),
                });
            }
        };
        let amount = digits
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| IntervalError::InvalidAmount {
                input: s.to_string(),
            })?;
        Ok(Interval::new(amount, unit))
    }
}
