//! ChiNext (GEM) price-cage state and transitions.
//!
//! A GEM limit order priced outside ±2% of its side's reference price is
//! accepted into the ladder but *hidden*: it takes no part in the cached
//! best, the weighted statistics, or displayed levels. Only the hidden
//! price closest to the cage edge is tracked per side; deeper ones are
//! recovered by rescanning the ladder when the boundary drains.

use tracing::debug;

use crate::book::OrderBook;
use crate::market::{cage_lower, cage_upper};
use crate::phase::Phase;
use crate::types::{Price, Qty};

/// Cage bookkeeping for both sides.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CageState {
    /// Reference price for the bid-side cage test. Precedence when it
    /// moves: ask best → bid best → last trade → prev close.
    pub bid_ref_px: Price,
    /// Reference price for the ask-side cage test (mirrored precedence).
    pub ask_ref_px: Price,
    /// Lowest hidden bid above the cage; qty 0 means no hidden bids.
    pub bid_hidden_price: Price,
    pub bid_hidden_qty: Qty,
    /// Highest hidden ask below the cage; qty 0 means no hidden asks.
    pub ask_hidden_price: Price,
    pub ask_hidden_qty: Qty,
    /// A best-price move may have made a hidden bid eligible; an
    /// execution must arrive before it can be promoted.
    pub bid_waiting: bool,
    pub ask_waiting: bool,
}

impl OrderBook {
    /// Promote hidden orders that the current reference prices admit.
    ///
    /// Runs after any best-price change. A hidden order that could cross
    /// the opposite best must wait for the execution tick instead of
    /// being promoted (except during a volatility break, when nothing
    /// crosses).
    pub(crate) fn enter_cage(&mut self) {
        loop {
            if self.cage.bid_hidden_qty != 0
                && self.cage.bid_hidden_price <= cage_upper(self.cage.bid_ref_px)
            {
                if self.asks.best_qty() != 0
                    && self.cage.bid_hidden_price >= self.asks.best_price()
                    && self.phase != Phase::VolatilityBreaking
                {
                    debug!(
                        "hidden bid {}x{} entering cage would cross; waiting for exec",
                        self.cage.bid_hidden_price, self.cage.bid_hidden_qty
                    );
                    break;
                }
                let (p, q) = (self.cage.bid_hidden_price, self.cage.bid_hidden_qty);
                self.bids.set_best(p, q);
                self.bid_weights.add(p, q);
                debug!("hidden bid {p}x{q} entered cage as best");

                self.cage.ask_ref_px = p;
                if self.asks.best_qty() == 0 {
                    self.cage.bid_ref_px = p;
                }
                self.cage.ask_waiting = self.gem;

                self.cage.bid_hidden_qty = 0;
                if let Some((np, nq)) = self.bids.next_better(p) {
                    self.cage.bid_hidden_price = np;
                    self.cage.bid_hidden_qty = nq;
                }
            } else {
                self.cage.bid_waiting = false;
            }

            if self.cage.ask_hidden_qty != 0
                && self.cage.ask_hidden_price >= cage_lower(self.cage.ask_ref_px)
            {
                if self.bids.best_qty() != 0
                    && self.cage.ask_hidden_price <= self.bids.best_price()
                    && self.phase != Phase::VolatilityBreaking
                {
                    debug!(
                        "hidden ask {}x{} entering cage would cross; waiting for exec",
                        self.cage.ask_hidden_price, self.cage.ask_hidden_qty
                    );
                    break;
                }
                let (p, q) = (self.cage.ask_hidden_price, self.cage.ask_hidden_qty);
                self.asks.set_best(p, q);
                self.ask_weights.add(p, q);
                debug!("hidden ask {p}x{q} entered cage as best");

                self.cage.bid_ref_px = p;
                if self.bids.best_qty() == 0 {
                    self.cage.ask_ref_px = p;
                }
                self.cage.bid_waiting = self.gem;

                self.cage.ask_hidden_qty = 0;
                if let Some((np, nq)) = self.asks.next_better(p) {
                    self.cage.ask_hidden_price = np;
                    self.cage.ask_hidden_qty = nq;
                }
            } else {
                self.cage.ask_waiting = false;
            }

            if !self.cage.bid_waiting && !self.cage.ask_waiting {
                break;
            }
        }
    }

    /// Reveal every hidden order (close-call entry, and AM open on an
    /// IPO-day instrument with no price limits).
    ///
    /// Without an up/down limit the valid auction range narrows to ±10%
    /// of the last price, so out-of-band levels are purged outright
    /// before the reveal.
    pub(crate) fn open_cage(&mut self) {
        debug!("open cage");

        // The ±10% band hangs off the last trade; with no trade yet
        // there is no band to enforce.
        if self.up_limit_raw == crate::types::PRICE_OVERFLOW_SENTINEL && self.last_px != Price::ZERO
        {
            let lo = crate::market::band_lower(self.last_px);
            let hi = crate::market::band_upper(self.last_px);

            let victims: Vec<(Price, Qty)> = self
                .asks
                .iter_from_best()
                .filter(|&(p, _)| p > hi || p < lo)
                .collect();
            for (p, q) in victims {
                if self.cage.ask_hidden_qty == 0 || p > self.cage.ask_hidden_price {
                    self.ask_weights.sub(p, q);
                }
                self.asks.remove(p);
            }

            let victims: Vec<(Price, Qty)> = self
                .bids
                .iter_from_best()
                .filter(|&(p, _)| p > hi || p < lo)
                .collect();
            for (p, q) in victims {
                if self.cage.bid_hidden_qty == 0 || p < self.cage.bid_hidden_price {
                    self.bid_weights.sub(p, q);
                }
                self.bids.remove(p);
            }
        }

        if self.cage.ask_hidden_qty != 0 {
            let boundary = self.cage.ask_hidden_price;
            let hidden: Vec<(Price, Qty)> = self
                .asks
                .iter_from_best()
                .take_while(|&(p, _)| p <= boundary)
                .collect();
            for (p, q) in hidden {
                self.ask_weights.add(p, q);
            }
            self.cage.ask_hidden_qty = 0;
            self.asks.recompute_best();
        }

        if self.cage.bid_hidden_qty != 0 {
            let boundary = self.cage.bid_hidden_price;
            let hidden: Vec<(Price, Qty)> = self
                .bids
                .iter_from_best()
                .take_while(|&(p, _)| p >= boundary)
                .collect();
            for (p, q) in hidden {
                self.bid_weights.add(p, q);
            }
            self.cage.bid_hidden_qty = 0;
            self.bids.recompute_best();
        }
    }
}
