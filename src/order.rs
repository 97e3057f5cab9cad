//! Resting-order representation and ingress normalization.

use tracing::{error, warn};

use crate::market::Scaling;
use crate::message::{AddOrder, OrderKind};
use crate::side::Side;
use crate::types::{
    PRICE_BITS, PRICE_MAX, PRICE_OVERFLOW_SENTINEL, Price, QTY_BITS, Qty, SEQ_BITS, SeqNum,
    Timestamp,
};

/// An order as the book stores it: internal price units, checked widths.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RestingOrder {
    pub seq: SeqNum,
    pub price: Price,
    pub qty: Qty,
    pub side: Side,
    pub kind: OrderKind,
    /// Set once a held market order takes its first fill; the fill price
    /// becomes the order's resting price.
    pub traded: bool,
    /// Carried so a deferred book insertion can stamp its pre-snapshot
    /// with the order's own time.
    pub transact_time: Timestamp,
}

impl RestingOrder {
    /// Normalize a wire order into internal units.
    ///
    /// Width violations and precision remainders are logged and the value
    /// clamped or truncated; the order is always produced so the replay
    /// can continue.
    pub fn normalize(msg: &AddOrder, scaling: &Scaling) -> Self {
        let security_id = msg.security_id;

        if msg.appl_seq_num >= (1 << SEQ_BITS) && msg.appl_seq_num != u64::MAX {
            error!(
                "{security_id:06} order seq {} exceeds {SEQ_BITS} bits",
                msg.appl_seq_num
            );
        }

        let price = if msg.price == PRICE_OVERFLOW_SENTINEL {
            // Out-of-range price; only the sell-side weighted average is
            // affected once it rests. A priced buy must never carry it.
            warn!(
                "{security_id:06} order {} price over the maximum",
                msg.appl_seq_num
            );
            if msg.side == Side::Bid && msg.kind == OrderKind::Limit {
                error!(
                    "{security_id:06} bid limit order {} with overflowed price",
                    msg.appl_seq_num
                );
            }
            PRICE_MAX
        } else {
            if msg.kind == OrderKind::Limit && msg.price % scaling.raw_price_div != 0 {
                error!(
                    "{security_id:06} order {} price {} leaves a remainder at divisor {}",
                    msg.appl_seq_num, msg.price, scaling.raw_price_div
                );
            }
            let scaled = msg.price / scaling.raw_price_div;
            if scaled >= (1 << PRICE_BITS) {
                error!(
                    "{security_id:06} order {} price {} exceeds {PRICE_BITS} bits",
                    msg.appl_seq_num, msg.price
                );
                PRICE_MAX
            } else {
                Price(scaled as u32)
            }
        };

        if msg.qty >= (1 << QTY_BITS) {
            error!(
                "{security_id:06} order {} qty {} exceeds {QTY_BITS} bits",
                msg.appl_seq_num, msg.qty
            );
        }

        RestingOrder {
            seq: msg.appl_seq_num as SeqNum,
            price,
            qty: msg.qty,
            side: msg.side,
            kind: msg.kind,
            traded: false,
            transact_time: msg.transact_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Exchange, Instrument};
    use crate::phase::Phase;

    fn wire_order(price: u64, kind: OrderKind, side: Side) -> AddOrder {
        AddOrder {
            exchange: Exchange::Szse,
            security_id: 1,
            appl_seq_num: 7,
            side,
            kind,
            price,
            qty: 100,
            transact_time: 20230601_093000_000,
            phase: Phase::AmTrading,
        }
    }

    fn szse_stock() -> Scaling {
        Scaling::resolve(Exchange::Szse, Instrument::Stock).unwrap()
    }

    #[test]
    fn normalizes_raw_price() {
        let order = wire_order(100_000, OrderKind::Limit, Side::Bid);
        let resting = RestingOrder::normalize(&order, &szse_stock());
        assert_eq!(resting.price, Price(1_000)); // ¥10.00 at 2 dp
        assert_eq!(resting.seq, 7);
        assert_eq!(resting.qty, 100);
        assert!(!resting.traded);
    }

    #[test]
    fn overflow_sentinel_clamps_to_max() {
        let order = wire_order(PRICE_OVERFLOW_SENTINEL, OrderKind::Limit, Side::Ask);
        let resting = RestingOrder::normalize(&order, &szse_stock());
        assert_eq!(resting.price, PRICE_MAX);
    }

    #[test]
    fn wide_price_clamps_to_max() {
        // 2^25 * 100 raw units, divides clean but exceeds the width budget
        let order = wire_order((1u64 << 25) * 100, OrderKind::Limit, Side::Ask);
        let resting = RestingOrder::normalize(&order, &szse_stock());
        assert_eq!(resting.price, PRICE_MAX);
    }

    #[test]
    fn remainder_truncates() {
        // 100050 raw = ¥10.005, not representable at 2 dp
        let order = wire_order(100_050, OrderKind::Limit, Side::Bid);
        let resting = RestingOrder::normalize(&order, &szse_stock());
        assert_eq!(resting.price, Price(1_000));
    }
}
