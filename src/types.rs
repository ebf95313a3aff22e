// 1.0: all the primitives live here. nothing in the engine works without these types.
// ids, probabilities, quote amounts, leverage, timestamps. each is a newtype so the compiler catches mixups.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl PositionId {
    // market id + open time, plus a sequence number so two opens in the same millisecond differ
    pub fn generate(market_id: &MarketId, opened_at: Timestamp, sequence: u64) -> Self {
        Self(format!("{}-{}-{}", market_id, opened_at.as_millis(), sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Long = profit when probability goes up. Short = profit when it goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => dec!(1),
            Direction::Short => dec!(-1),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

// 1.1: probability in percent. strictly positive, at most 100. markets live in [1, 99].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Probability(Decimal);

impl Probability {
    pub const FLOOR: Decimal = dec!(1);
    pub const CEILING: Decimal = dec!(99);

    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO && value <= dec!(100) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO && value <= dec!(100));
        Self(value)
    }

    // clamp into [floor, ceiling]. floor must be positive
    pub fn clamped(value: Decimal, floor: Decimal, ceiling: Decimal) -> Self {
        debug_assert!(floor > Decimal::ZERO && floor <= ceiling);
        Self(value.max(floor).min(ceiling))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Probability {
    type Error = String;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Probability::new(value).ok_or_else(|| format!("probability {value} outside (0, 100]"))
    }
}

impl From<Probability> for Decimal {
    fn from(p: Probability) -> Self {
        p.0
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

// 1.2: virtual currency amount. balance, margin, pnl all use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quote(Decimal);

impl Quote {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn add(&self, other: Quote) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: Quote) -> Self {
        Self(self.0 - other.0)
    }

    pub fn mul(&self, factor: Decimal) -> Self {
        Self(self.0 * factor)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Quote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Quote {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(q))
    }
}

impl<'a> Sum<&'a Quote> for Quote {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(*q))
    }
}

// 1.3: integer leverage multiplier. must be >= 1x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Leverage(u32);

impl Leverage {
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value >= 1 {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl TryFrom<u32> for Leverage {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Leverage::new(value).ok_or_else(|| "leverage must be at least 1".to_string())
    }
}

impl From<Leverage> for u32 {
    fn from(l: Leverage) -> Self {
        l.0
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// 1.4: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}
