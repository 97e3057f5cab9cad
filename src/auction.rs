//! Call-auction uniform-price computation.
//!
//! A virtual cross-match over the current ladders: nothing is dequeued,
//! the loop only walks level cursors to find the single price and volume
//! the auction would clear at. The real clearing arrives later as
//! ordinary execution ticks.

use crate::ladder::Ladder;
use crate::types::{Price, Qty};

/// Result of a virtual match. `price` is display-only when `volume` is
/// zero (an uncrossed book reveals empty levels regardless).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CallMatch {
    pub price: Price,
    pub volume: Qty,
    /// Unmatched remainder on the last bid level that traded.
    pub bid_leftover: Qty,
    /// Unmatched remainder on the last ask level that traded.
    pub ask_leftover: Qty,
}

/// Match the crossed region of the two ladders at a single price.
///
/// Tie rules when both sides clear exactly:
/// - a reference price (prev-close before the first trade, last price
///   after) inside the cleared spread wins,
/// - otherwise the cleared level closer to the reference,
/// - at one-tick spreads against the next levels, the side with the
///   smaller next-level quantity absorbs (ask wins a quantity tie).
///
/// When one side exhausts with remainder on the other, the price is the
/// last taker's level.
pub(crate) fn uniform_match(bids: &Ladder, asks: &Ladder, reference: Price) -> CallMatch {
    let mut bid_p = bids.best_price();
    let mut bid_q = bids.best_qty();
    let mut ask_p = asks.best_price();
    let mut ask_q = asks.best_qty();

    let mut price = if bid_q == 0 && ask_q == 0 {
        Price::ZERO
    } else if bid_q == 0 {
        ask_p
    } else if ask_q == 0 {
        bid_p
    } else {
        Price::ZERO
    };

    let mut volume: Qty = 0;
    let mut bid_rem: Qty = 0;
    let mut ask_rem: Qty = 0;

    loop {
        if bid_q != 0 && ask_q != 0 && bid_p >= ask_p {
            if bid_rem == 0 {
                bid_rem = bid_q;
            }
            if ask_rem == 0 {
                ask_rem = ask_q;
            }
            if bid_rem >= ask_rem {
                volume += ask_rem;
                bid_rem -= ask_rem;
                ask_rem = 0;
            } else {
                volume += bid_rem;
                ask_rem -= bid_rem;
                bid_rem = 0;
            }

            if bid_rem == 0 && ask_rem == 0 {
                // Both levels cleared together: pick by the reference.
                if bid_p >= reference && ask_p <= reference {
                    price = reference;
                } else if bid_p.0.abs_diff(reference.0) < ask_p.0.abs_diff(reference.0) {
                    price = bid_p;
                } else {
                    price = ask_p;
                }
            }
            if bid_rem == 0 {
                if ask_rem != 0 {
                    price = ask_p;
                }
                bid_q = 0;
                if let Some((p, q)) = bids.next_worse(bid_p) {
                    bid_p = p;
                    bid_q = q;
                }
            }
            if ask_rem == 0 {
                if bid_rem != 0 {
                    price = bid_p;
                }
                ask_q = 0;
                if let Some((p, q)) = asks.next_worse(ask_p) {
                    ask_p = p;
                    ask_q = q;
                }
            }
        } else {
            if ask_rem == 0 && bid_rem == 0 {
                // Exact clear: the uniform price must not cross the next
                // resting level on either side.
                if ask_q != 0 && price >= ask_p {
                    if bid_q == 0 || Price(bid_p.0 + 1) < ask_p {
                        price = Price(ask_p.0.saturating_sub(1));
                    } else if ask_q <= bid_q {
                        price = ask_p;
                        ask_rem = ask_q;
                    } else {
                        price = bid_p;
                        bid_rem = bid_q;
                    }
                } else if bid_q != 0 && price <= bid_p {
                    if ask_p > Price(bid_p.0 + 1) {
                        price = Price(bid_p.0 + 1);
                    } else if bid_q <= ask_q {
                        price = bid_p;
                        bid_rem = bid_q;
                    } else {
                        price = ask_p;
                        ask_rem = ask_q;
                    }
                }
            }
            break;
        }
    }

    CallMatch {
        price,
        volume,
        bid_leftover: bid_rem,
        ask_leftover: ask_rem,
    }
}
