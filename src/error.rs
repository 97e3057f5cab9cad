//! Error taxonomy for the reconstructor.
//!
//! Most ingress anomalies are logged and absorbed so the book keeps
//! rebuilding; only [`BookError::Unsupported`] and the not-found variants
//! escape [`crate::OrderBook::on_message`].

use thiserror::Error;

use crate::{Instrument, Exchange, SeqNum};

/// Errors surfaced by book construction and message application.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BookError {
    /// A field exceeded its width budget on ingress. Prices are clamped,
    /// quantities proceed as-is; the error is informational unless the
    /// caller chooses otherwise.
    #[error("width overflow: {what}={value} exceeds {bits} bits")]
    Overflow {
        /// Which field overflowed
        what: &'static str,
        /// The offending raw value
        value: u64,
        /// The width budget it violated
        bits: u32,
    },

    /// A raw limit price was not divisible by the internal precision
    /// unit; the truncated value was used.
    #[error("price {raw} leaves a remainder at divisor {divisor}")]
    PrecisionRemainder {
        /// Raw wire price
        raw: u64,
        /// raw → internal divisor for this instrument
        divisor: u64,
    },

    /// A session-ordering rule was violated (non-monotonic SZSE sequence,
    /// held market order flushed without a trade, message before the
    /// day's constants arrived). Logged; the book continues.
    #[error("phase invariant violated: {0}")]
    PhaseInvariant(&'static str),

    /// A trade or cancel referenced a sequence number the directory has
    /// never seen (cancels against the illegal-order set are absorbed
    /// before this is raised).
    #[error("order {0} not found")]
    OrderNotFound(SeqNum),

    /// The exchange/instrument combination has no entry in the precision
    /// table. Raised at construction; the instrument is aborted.
    #[error("unsupported instrument: {exchange:?}/{instrument:?}")]
    Unsupported {
        /// Venue of the rejected combination
        exchange: Exchange,
        /// Instrument class of the rejected combination
        instrument: Instrument,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = BookError::OrderNotFound(42);
        assert_eq!(err.to_string(), "order 42 not found");

        let err = BookError::Overflow {
            what: "qty",
            value: 1 << 31,
            bits: 30,
        };
        assert!(err.to_string().contains("qty"));
        assert!(err.to_string().contains("30 bits"));
    }

    #[test]
    fn is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(BookError::PhaseInvariant("test"));
        assert!(err.to_string().contains("phase invariant"));
    }
}
