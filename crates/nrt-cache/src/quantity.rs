//! Exact resource quantities
//!
//! Quantities are stored as signed milli-units so CPU ("500m"), memory
//! ("32Gi") and device counts ("8") share one exact representation. Overlay
//! subtraction may legitimately drive a quantity below zero, so the type is
//! signed and never clamps.

use crate::error::{CacheError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

const MILLIS_PER_UNIT: i128 = 1000;

/// Longest fractional part accepted when parsing
const MAX_FRACTION_DIGITS: u32 = 18;

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

const DECIMAL_SUFFIXES: &[(&str, u32)] = &[
    ("k", 1),
    ("M", 2),
    ("G", 3),
    ("T", 4),
    ("P", 5),
    ("E", 6),
];

/// How a quantity prefers to be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityFormat {
    /// Powers of 1024 ("Ki", "Mi", "Gi", ...)
    BinarySI,
    /// Powers of 1000 ("k", "M", "G", ...) and milli-units
    #[default]
    DecimalSI,
}

/// An exact, signed resource quantity
///
/// Equality and ordering compare the numeric value only; the format is a
/// rendering hint carried over from parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    millis: i128,
    format: QuantityFormat,
}

impl Quantity {
    /// The zero quantity
    pub const fn zero() -> Self {
        Self {
            millis: 0,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Build a quantity from whole units
    pub fn from_units(units: i64) -> Self {
        Self {
            millis: units as i128 * MILLIS_PER_UNIT,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Build a quantity from milli-units
    pub fn from_millis(millis: i64) -> Self {
        Self {
            millis: millis as i128,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Build a quantity from a byte count, rendered with binary suffixes
    pub fn from_bytes(bytes: u64) -> Self {
        Self {
            millis: bytes as i128 * MILLIS_PER_UNIT,
            format: QuantityFormat::BinarySI,
        }
    }

    /// Parse a Kubernetes-style quantity string
    pub fn parse(input: &str) -> Result<Self> {
        parse_quantity(input)
    }

    /// Value in milli-units
    pub fn millis(&self) -> i128 {
        self.millis
    }

    /// Value in whole units, rounded up
    pub fn units_ceil(&self) -> i128 {
        let units = self.millis.div_euclid(MILLIS_PER_UNIT);
        if self.millis.rem_euclid(MILLIS_PER_UNIT) == 0 {
            units
        } else {
            units + 1
        }
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    pub fn is_negative(&self) -> bool {
        self.millis < 0
    }
}

fn invalid(input: &str, reason: &'static str) -> CacheError {
    CacheError::InvalidQuantity {
        input: input.to_string(),
        reason,
    }
}

fn parse_quantity(input: &str) -> Result<Quantity> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "empty string"));
    }

    let (negative, rest) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let number_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_end);
    if number.is_empty() || number == "." {
        return Err(invalid(input, "missing numeric part"));
    }

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if fraction.contains('.') {
        return Err(invalid(input, "more than one decimal point"));
    }
    if fraction.len() as u32 > MAX_FRACTION_DIGITS {
        return Err(invalid(input, "too many fractional digits"));
    }

    let (multiplier_millis, format) = suffix_multiplier(suffix)
        .ok_or_else(|| invalid(input, "unknown suffix"))?;

    let overflow = || CacheError::QuantityOverflow(input.to_string());

    // mantissa = whole.fraction scaled by 10^fraction_len
    let digits = format!("{whole}{fraction}");
    let mantissa: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().map_err(|_| overflow())?
    };
    let scale = 10i128.pow(fraction.len() as u32);

    let scaled = mantissa.checked_mul(multiplier_millis).ok_or_else(overflow)?;
    // Sub-milli precision rounds up, as the API server does.
    let mut millis = scaled / scale;
    if scaled % scale != 0 {
        millis += 1;
    }

    Ok(Quantity {
        millis: if negative { -millis } else { millis },
        format,
    })
}

fn suffix_multiplier(suffix: &str) -> Option<(i128, QuantityFormat)> {
    match suffix {
        "" => return Some((MILLIS_PER_UNIT, QuantityFormat::DecimalSI)),
        "m" => return Some((1, QuantityFormat::DecimalSI)),
        _ => {}
    }
    if let Some((_, exp)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((1024i128.pow(*exp) * MILLIS_PER_UNIT, QuantityFormat::BinarySI));
    }
    DECIMAL_SUFFIXES
        .iter()
        .find(|(s, _)| *s == suffix)
        .map(|(_, exp)| (1000i128.pow(*exp) * MILLIS_PER_UNIT, QuantityFormat::DecimalSI))
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis == 0 {
            return f.write_str("0");
        }
        let sign = if self.millis < 0 { "-" } else { "" };
        let magnitude = self.millis.unsigned_abs();
        let per_unit = MILLIS_PER_UNIT.unsigned_abs();

        if magnitude % per_unit != 0 {
            return write!(f, "{sign}{magnitude}m");
        }
        let units = magnitude / per_unit;

        let (base, suffixes) = match self.format {
            QuantityFormat::BinarySI => (1024u128, BINARY_SUFFIXES),
            QuantityFormat::DecimalSI => (1000u128, DECIMAL_SUFFIXES),
        };
        for (suffix, exp) in suffixes.iter().rev() {
            let factor = base.pow(*exp);
            if units % factor == 0 {
                return write!(f, "{sign}{}{suffix}", units / factor);
            }
        }
        write!(f, "{sign}{units}")
    }
}

impl FromStr for Quantity {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        parse_quantity(s)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl std::hash::Hash for Quantity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.millis.hash(state);
    }
}

// Arithmetic keeps the left-hand side's rendering format, so "32Gi" - "6Gi"
// still prints as "26Gi".
impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        let format = if self.is_zero() { rhs.format } else { self.format };
        Quantity {
            millis: self.millis.saturating_add(rhs.millis),
            format,
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        let format = if self.is_zero() { rhs.format } else { self.format };
        Quantity {
            millis: self.millis.saturating_sub(rhs.millis),
            format,
        }
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        *self = *self - rhs;
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity {
            millis: self.millis.saturating_neg(),
            format: self.format,
        }
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a resource quantity string such as \"500m\" or \"32Gi\", or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Quantity, E> {
        Quantity::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Quantity, E> {
        i64::try_from(v)
            .map(Quantity::from_units)
            .map_err(|_| E::custom(format!("quantity {v} is out of range")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Quantity, E> {
        Ok(Quantity::from_units(v))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Quantity, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}
