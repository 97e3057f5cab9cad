//! Venue, instrument class, and the precision table tying them together.
//!
//! Raw wire prices, internal book prices, and snapshot prices all use
//! different fixed-point scales depending on the venue and instrument.
//! Every factor is resolved once at construction and carried on the book
//! as a [`Scaling`] value; nothing downstream consults the table again.

use crate::error::BookError;
use crate::types::Price;

/// Security identifier source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Exchange {
    /// Shenzhen Stock Exchange (4 dp raw prices, 2 dp quantities).
    Szse,
    /// Shanghai Stock Exchange (3 dp raw prices, 3 dp quantities).
    Sse,
}

/// Instrument class, selecting the internal price precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instrument {
    /// Common stock: 2 dp internal prices.
    Stock,
    /// Fund/ETF: 3 dp internal prices.
    Fund,
    /// Convertible bond: 3 dp internal prices.
    Kzz,
    /// Exchange bond (SSE only): 3 dp internal prices.
    Bond,
}

/// ChiNext (GEM) orders beyond `prev_close × 9` during the opening call
/// are excluded from the visible ask-weight statistics.
pub(crate) const GEM_OPEN_CALL_VALUE_RATE: u64 = 9;

/// Fixed-point factors for one (exchange, instrument) combination.
///
/// All factors are exact integer ratios; combinations whose ratios would
/// not divide evenly do not exist in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scaling {
    /// Raw wire price → internal price (divide).
    pub raw_price_div: u64,
    /// Internal price → snapshot price field (multiply).
    pub snap_price_mul: u64,
    /// Snapshot prev-close field → internal price (divide), and back.
    pub preclose_div: u64,
    /// Snapshot up/down-limit field → internal price (divide).
    pub limit_div: u64,
    /// `qty × px` product → total-value-trade units (divide).
    pub value_div: u64,
}

impl Scaling {
    /// Resolve the factors for one instrument, or reject the combination.
    pub fn resolve(exchange: Exchange, instrument: Instrument) -> Result<Self, BookError> {
        let scaling = match (exchange, instrument) {
            // SZSE: raw 4 dp, snapshot 6 dp, prev-close 4 dp, value 4 dp
            (Exchange::Szse, Instrument::Stock) => Scaling {
                raw_price_div: 100,
                snap_price_mul: 10_000,
                preclose_div: 100,
                limit_div: 10_000,
                value_div: 1,
            },
            (Exchange::Szse, Instrument::Fund | Instrument::Kzz) => Scaling {
                raw_price_div: 10,
                snap_price_mul: 1_000,
                preclose_div: 10,
                limit_div: 1_000,
                value_div: 10,
            },
            // SSE: raw 3 dp, snapshot 3 dp, value 5 dp
            (Exchange::Sse, Instrument::Stock) => Scaling {
                raw_price_div: 10,
                snap_price_mul: 10,
                preclose_div: 10,
                limit_div: 10,
                value_div: 1,
            },
            (Exchange::Sse, Instrument::Fund | Instrument::Kzz | Instrument::Bond) => Scaling {
                raw_price_div: 1,
                snap_price_mul: 1,
                preclose_div: 1,
                limit_div: 1,
                value_div: 10,
            },
            (Exchange::Szse, Instrument::Bond) => {
                return Err(BookError::Unsupported {
                    exchange,
                    instrument,
                });
            }
        };
        Ok(scaling)
    }
}

/// True for SZSE ChiNext (GEM) securities, the 300000–309999 code block.
/// Only these instruments run the price cage.
pub(crate) fn is_gem(exchange: Exchange, security_id: u32) -> bool {
    exchange == Exchange::Szse && (300_000..=309_999).contains(&security_id)
}

/// Upper cage bound for bids: a bid is inside the cage iff
/// `price <= floor(ref_px * 1.02)`.
#[inline]
pub(crate) fn cage_upper(ref_px: Price) -> Price {
    Price((u64::from(ref_px.0) * 102 / 100) as u32)
}

/// Lower cage bound for asks: an ask is inside the cage iff
/// `price >= ceil(ref_px * 0.98)`.
#[inline]
pub(crate) fn cage_lower(ref_px: Price) -> Price {
    Price(((u64::from(ref_px.0) * 98).div_ceil(100)) as u32)
}

/// Upper edge of the ±10% valid-auction band around the last price
/// (GEM instruments with no up/down limit).
#[inline]
pub(crate) fn band_upper(last_px: Price) -> Price {
    Price((u64::from(last_px.0) * 110 / 100) as u32)
}

/// Lower edge of the ±10% valid-auction band.
#[inline]
pub(crate) fn band_lower(last_px: Price) -> Price {
    Price(((u64::from(last_px.0) * 90).div_ceil(100)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn szse_stock_factors() {
        let s = Scaling::resolve(Exchange::Szse, Instrument::Stock).unwrap();
        // ¥10.00: raw 100000, internal 1000, snapshot 10000000
        assert_eq!(100_000 / s.raw_price_div, 1_000);
        assert_eq!(1_000 * s.snap_price_mul, 10_000_000);
        // prev-close ¥10.00 arrives as 100000 (4 dp)
        assert_eq!(100_000 / s.preclose_div, 1_000);
        assert_eq!(s.value_div, 1);
    }

    #[test]
    fn szse_fund_factors() {
        let s = Scaling::resolve(Exchange::Szse, Instrument::Fund).unwrap();
        // ¥1.234: raw 12340, internal 1234 (3 dp)
        assert_eq!(12_340 / s.raw_price_div, 1_234);
        assert_eq!(1_234 * s.snap_price_mul, 1_234_000);
        assert_eq!(s.value_div, 10);
    }

    #[test]
    fn sse_stock_factors() {
        let s = Scaling::resolve(Exchange::Sse, Instrument::Stock).unwrap();
        // ¥10.00: raw 10000 (3 dp), internal 1000 (2 dp), snapshot 10000
        assert_eq!(10_000 / s.raw_price_div, 1_000);
        assert_eq!(1_000 * s.snap_price_mul, 10_000);
    }

    #[test]
    fn sse_bond_passthrough() {
        let s = Scaling::resolve(Exchange::Sse, Instrument::Bond).unwrap();
        assert_eq!(s.raw_price_div, 1);
        assert_eq!(s.snap_price_mul, 1);
    }

    #[test]
    fn szse_bond_unsupported() {
        assert!(matches!(
            Scaling::resolve(Exchange::Szse, Instrument::Bond),
            Err(BookError::Unsupported { .. })
        ));
    }

    #[test]
    fn gem_code_block() {
        assert!(is_gem(Exchange::Szse, 300_001));
        assert!(is_gem(Exchange::Szse, 301_234));
        assert!(!is_gem(Exchange::Szse, 000_001));
        assert!(!is_gem(Exchange::Szse, 310_000));
        assert!(!is_gem(Exchange::Sse, 300_001));
    }

    #[test]
    fn cage_bounds_round_away_from_ref() {
        // 20.00 → upper 20.40, lower 19.60
        assert_eq!(cage_upper(Price(2_000)), Price(2_040));
        assert_eq!(cage_lower(Price(2_000)), Price(1_960));
        // 20.30 → upper floor(20.706) = 20.70, lower ceil(19.894) = 19.90
        assert_eq!(cage_upper(Price(2_030)), Price(2_070));
        assert_eq!(cage_lower(Price(2_030)), Price(1_990));
    }

    #[test]
    fn auction_band() {
        assert_eq!(band_upper(Price(2_000)), Price(2_200));
        assert_eq!(band_lower(Price(2_000)), Price(1_800));
        // ceil rounding on an odd last price
        assert_eq!(band_lower(Price(1_999)), Price(1_800)); // ceil(1799.1)
        assert_eq!(band_upper(Price(1_999)), Price(2_198)); // floor(2198.9)
    }
}
