//! Fixed-point percentage rates.
//!
//! Every rate in the core is a `Rate`: an integer count of ten-thousandths
//! of a percentage point. Arithmetic never touches floating point, so the
//! tier decomposition of an override adds up exactly.
//!
//! RULE: user-facing input goes through `Rate::parse`, which accepts both
//! `,` and `.` as the decimal separator.

use crate::error::{MarginError, MarginResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Internal precision: 4 decimal places.
pub const SCALE: i64 = 10_000;

/// Display / comparison precision step (2 decimal places).
const DISPLAY_STEP: i64 = 100;

/// Largest magnitude, in whole percentage points, any single rate may hold.
/// Sums of a handful of bounded rates stay far inside `i64`.
pub const MAX_POINTS: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rate(i64);

impl Rate {
    pub const ZERO: Rate = Rate(0);
    pub const MAX: Rate = Rate(MAX_POINTS * SCALE);

    /// Build from raw ten-thousandths, as stored in the database.
    pub const fn from_units(units: i64) -> Self {
        Rate(units)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    /// Whole percentage points, e.g. `Rate::whole(2)` is 2.0000.
    pub const fn whole(points: i64) -> Self {
        Rate(points * SCALE)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Reject rates outside `-MAX..=MAX`. `what` names the field in the error.
    pub fn bounded(self, what: &str) -> MarginResult<Self> {
        if self.0.unsigned_abs() > Rate::MAX.0.unsigned_abs() {
            return Err(MarginError::invalid(format!(
                "{what} {} exceeds the limit of {MAX_POINTS} points",
                self.to_plain()
            )));
        }
        Ok(self)
    }

    /// Parse user input such as `"2,5"`, `"2.50"`, `" 1.25% "` or `"-0,1"`.
    /// Digits past the fourth decimal are rounded half away from zero.
    pub fn parse(input: &str) -> MarginResult<Self> {
        let malformed = || MarginError::invalid(format!("malformed rate '{input}'"));

        let trimmed = input.trim();
        let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let normalized = digits.replace(',', ".");
        let (whole, frac) = match normalized.split_once('.') {
            Some((w, f)) => (w, f),
            None => (normalized.as_str(), ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(malformed());
        }

        let whole_units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| malformed())?
        };
        let kept = &frac[..frac.len().min(4)];
        let frac_units: i64 = format!("{kept:0<4}").parse().map_err(|_| malformed())?;
        let round_up = frac.as_bytes().get(4).is_some_and(|d| *d >= b'5');

        let units = whole_units
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_units + i64::from(round_up)))
            .ok_or_else(malformed)?;

        Rate(if negative { -units } else { units }).bounded("rate")
    }

    /// Round to 2 decimal places, half away from zero.
    pub fn round2(self) -> Self {
        Rate(div_round(i128::from(self.0), i128::from(DISPLAY_STEP)) as i64 * DISPLAY_STEP)
    }

    /// `self * part / whole`, rounded half away from zero.
    /// Callers must ensure `whole` is non-zero.
    pub fn share(self, part: Rate, whole: Rate) -> Rate {
        debug_assert!(!whole.is_zero(), "share() with zero denominator");
        let n = i128::from(self.0) * i128::from(part.0);
        Rate(div_round(n, i128::from(whole.0)) as i64)
    }

    /// Four-decimal text form, e.g. `"2.5000"`.
    pub fn to_plain(self) -> String {
        let abs = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        let scale = SCALE as u64;
        format!("{sign}{}.{:04}", abs / scale, abs % scale)
    }
}

fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d.abs() {
        if (n < 0) == (d < 0) { q + 1 } else { q - 1 }
    } else {
        q
    }
}

impl fmt::Display for Rate {
    /// Two-decimal display form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.round2().0;
        let abs = r.unsigned_abs();
        let sign = if r < 0 { "-" } else { "" };
        let scale = SCALE as u64;
        write!(f, "{sign}{}.{:02}", abs / scale, (abs % scale) / DISPLAY_STEP as u64)
    }
}

impl FromStr for Rate {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rate::parse(s)
    }
}

impl Add for Rate {
    type Output = Rate;
    fn add(self, rhs: Rate) -> Rate { Rate(self.0 + rhs.0) }
}

impl Sub for Rate {
    type Output = Rate;
    fn sub(self, rhs: Rate) -> Rate { Rate(self.0 - rhs.0) }
}

impl Neg for Rate {
    type Output = Rate;
    fn neg(self) -> Rate { Rate(-self.0) }
}

impl AddAssign for Rate {
    fn add_assign(&mut self, rhs: Rate) { self.0 += rhs.0; }
}

impl Sum for Rate {
    fn sum<I: Iterator<Item = Rate>>(iter: I) -> Rate {
        iter.fold(Rate::ZERO, Add::add)
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_plain())
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Number(f64),
        }

        let text = match Wire::deserialize(deserializer)? {
            Wire::Text(s) => s,
            Wire::Number(n) => n.to_string(),
        };
        Rate::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_and_dot_parse_identically() {
        assert_eq!(Rate::parse("2,5").unwrap(), Rate::parse("2.5").unwrap());
        assert_eq!(Rate::parse(" 2,50 ").unwrap().units(), 25_000);
        assert_eq!(Rate::parse("1.25%").unwrap().units(), 12_500);
        assert_eq!(Rate::parse(",75").unwrap().units(), 7_500);
        assert_eq!(Rate::parse("-0,1").unwrap().units(), -1_000);
    }

    #[test]
    fn extra_decimals_round_half_away_from_zero() {
        assert_eq!(Rate::parse("0.12345").unwrap().units(), 1_235);
        assert_eq!(Rate::parse("0.12344").unwrap().units(), 1_234);
        assert_eq!(Rate::parse("-0.12345").unwrap().units(), -1_235);
    }

    #[test]
    fn malformed_input_rejected() {
        for bad in ["", "  ", "abc", "1.2.3", "1,234.5", "--1", "1e3", ".", "%"] {
            assert!(
                matches!(Rate::parse(bad), Err(MarginError::Validation { .. })),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn out_of_range_input_rejected() {
        assert_eq!(Rate::parse("1000000").unwrap(), Rate::MAX);
        assert_eq!(Rate::parse("-1000000").unwrap(), -Rate::MAX);
        for huge in ["1000000.0001", "-922337203685477.5807", "922337203685477"] {
            assert!(
                matches!(Rate::parse(huge), Err(MarginError::Validation { .. })),
                "'{huge}' should be out of range"
            );
        }
        assert!(Rate::from_units(i64::MIN).bounded("requested rate").is_err());
    }

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Rate::parse("2.345").unwrap().to_string(), "2.35");
        assert_eq!(Rate::parse("-2.345").unwrap().to_string(), "-2.35");
        assert_eq!(Rate::whole(14).to_string(), "14.00");
        assert_eq!(Rate::parse("0.0049").unwrap().round2(), Rate::ZERO);
        assert_eq!(Rate::parse("3.1").unwrap().to_plain(), "3.1000");
    }

    #[test]
    fn share_rounds_to_nearest_unit() {
        // 1.0000 * 1 / 3 = 0.3333
        let third = Rate::whole(1).share(Rate::whole(1), Rate::whole(3));
        assert_eq!(third.units(), 3_333);
        // 2.0000 * 1 / 3 = 0.6667
        let two_thirds = Rate::whole(2).share(Rate::whole(1), Rate::whole(3));
        assert_eq!(two_thirds.units(), 6_667);
        let negative = Rate::whole(-2).share(Rate::whole(1), Rate::whole(3));
        assert_eq!(negative.units(), -6_667);
    }

    #[test]
    fn json_accepts_strings_and_numbers() {
        let from_text: Rate = serde_json::from_str("\"1,5\"").unwrap();
        let from_num: Rate = serde_json::from_str("1.5").unwrap();
        assert_eq!(from_text, from_num);
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"1.5000\"");
    }
}
