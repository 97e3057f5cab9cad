//! OrderBook: the per-instrument reconstruction core.
//!
//! One value owns everything for one security: the order directory, the
//! two ladders, cage state, weighted aggregates, session statistics, the
//! hold slot, and the snapshot reconciler. It is single-threaded and
//! fully synchronous: every effect of a message is applied before
//! `on_message` returns, so a dispatcher can pin one book per worker
//! with no shared state.

use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::cage::CageState;
use crate::error::BookError;
use crate::ladder::Ladder;
use crate::market::{self, Exchange, Instrument, Scaling};
use crate::order::RestingOrder;
use crate::phase::Phase;
use crate::reconcile::Reconciler;
use crate::side::Side;
use crate::snapshot::Snapshot;
use crate::types::{PRICE_MAX, Price, Qty, SeqNum};

/// Incrementally maintained Σqty / Σ(price·qty) over one side's visible
/// levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct Weights {
    pub qty: Qty,
    pub value: u128,
}

impl Weights {
    pub fn add(&mut self, price: Price, qty: Qty) {
        self.qty += qty;
        self.value += u128::from(price.0) * u128::from(qty);
    }

    pub fn sub(&mut self, price: Price, qty: Qty) {
        self.qty = self.qty.saturating_sub(qty);
        self.value = self
            .value
            .saturating_sub(u128::from(price.0) * u128::from(qty));
    }

    pub fn merge(&mut self, other: Weights) {
        self.qty += other.qty;
        self.value += other.value;
    }

    /// Round-half-up average price in internal units; zero when empty.
    pub fn avg_px(&self) -> u64 {
        if self.qty == 0 {
            0
        } else {
            ((((self.value << 1) / u128::from(self.qty)) + 1) >> 1) as u64
        }
    }
}

/// The limit-order-book reconstructor for a single instrument.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderBook {
    pub(crate) security_id: u32,
    pub(crate) exchange: Exchange,
    pub(crate) instrument: Instrument,
    pub(crate) scaling: Scaling,
    pub(crate) gem: bool,
    /// Reveal the true top-10 in an unmatched call snapshot instead of
    /// zeros (debug aid).
    pub(crate) call_depth_debug: bool,

    /// Resting orders by sequence number.
    #[cfg_attr(feature = "serde", serde(with = "serde_orders"))]
    pub(crate) orders: FxHashMap<SeqNum, RestingOrder>,
    /// GEM pre-IPO orders rejected from the book but remembered so their
    /// cancels resolve silently.
    #[cfg_attr(feature = "serde", serde(with = "serde_orders"))]
    pub(crate) illegal_orders: FxHashMap<SeqNum, RestingOrder>,
    pub(crate) bids: Ladder,
    pub(crate) asks: Ladder,
    pub(crate) cage: CageState,

    pub(crate) num_trades: u64,
    pub(crate) total_volume: u64,
    pub(crate) total_value: u64,
    pub(crate) last_px: Price,
    pub(crate) open_px: Price,
    pub(crate) high_px: Price,
    pub(crate) low_px: Price,
    /// SZSE: the close price arrives from the exchange's Ending snapshot
    /// when the close call cannot clear; Ending snapshots are suppressed
    /// until then.
    pub(crate) close_px_ready: bool,

    /// Set by the first Starting-phase reference snapshot.
    pub(crate) constants_ready: bool,
    pub(crate) channel_no: u16,
    pub(crate) prev_close: Price,
    /// Raw snapshot-precision limits, echoed into emitted snapshots.
    /// `PRICE_OVERFLOW_SENTINEL` means no limit (IPO ≤ 5 days).
    pub(crate) up_limit_raw: u64,
    pub(crate) dn_limit_raw: u64,
    pub(crate) up_limit: Price,
    pub(crate) dn_limit: Price,
    /// YYYYMMDD from SZSE snapshots; zero for SSE.
    pub(crate) trade_date: u64,
    /// Intraday tick of the latest order/exec (SZSE 10 ms units).
    pub(crate) current_tick: u64,

    pub(crate) bid_weights: Weights,
    pub(crate) ask_weights: Weights,
    /// Opening-call sell orders beyond 9× prev-close are parked here and
    /// merged into the visible weights at AM open.
    pub(crate) ask_weights_ex: Weights,
    pub(crate) ask_weight_px_uncertain: bool,

    /// The at-most-one deferred order awaiting its trade or cancel.
    pub(crate) hold: Option<RestingOrder>,
    pub(crate) phase: Phase,
    /// Last accepted SZSE tick sequence, for the monotonicity guard.
    pub(crate) last_seq: SeqNum,

    pub(crate) reconciler: Reconciler,
    /// Snapshots produced since the last [`OrderBook::drain_snapshots`].
    pub(crate) emitted: Vec<Snapshot>,
}

impl OrderBook {
    /// Create a reconstructor for one instrument.
    ///
    /// Fails with [`BookError::Unsupported`] when the exchange/instrument
    /// combination has no precision-table entry.
    pub fn new(
        security_id: u32,
        exchange: Exchange,
        instrument: Instrument,
    ) -> Result<Self, BookError> {
        let scaling = Scaling::resolve(exchange, instrument)?;
        Ok(Self {
            security_id,
            exchange,
            instrument,
            scaling,
            gem: market::is_gem(exchange, security_id),
            call_depth_debug: false,
            orders: FxHashMap::default(),
            illegal_orders: FxHashMap::default(),
            bids: Ladder::new(Side::Bid),
            asks: Ladder::new(Side::Ask),
            cage: CageState::default(),
            num_trades: 0,
            total_volume: 0,
            total_value: 0,
            last_px: Price::ZERO,
            open_px: Price::ZERO,
            high_px: Price::ZERO,
            low_px: Price::ZERO,
            close_px_ready: false,
            constants_ready: false,
            channel_no: u16::MAX,
            prev_close: Price::ZERO,
            up_limit_raw: 0,
            dn_limit_raw: 0,
            up_limit: Price::ZERO,
            dn_limit: Price::ZERO,
            trade_date: 0,
            current_tick: 0,
            bid_weights: Weights::default(),
            ask_weights: Weights::default(),
            ask_weights_ex: Weights::default(),
            ask_weight_px_uncertain: false,
            hold: None,
            phase: Phase::Starting,
            last_seq: 0,
            reconciler: Reconciler::new(exchange),
            emitted: Vec::new(),
        })
    }

    /// Reveal true depth in unmatched call snapshots (debug aid).
    pub fn set_call_depth_debug(&mut self, on: bool) {
        self.call_depth_debug = on;
    }

    // === Accessors ===

    pub fn security_id(&self) -> u32 {
        self.security_id
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bids(&self) -> &Ladder {
        &self.bids
    }

    pub fn asks(&self) -> &Ladder {
        &self.asks
    }

    /// Cage bookkeeping (reference prices, hidden boundaries).
    pub fn cage(&self) -> &CageState {
        &self.cage
    }

    pub fn num_trades(&self) -> u64 {
        self.num_trades
    }

    pub fn last_px(&self) -> Price {
        self.last_px
    }

    /// Live resting-order count.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// True while an order sits in the hold slot.
    pub fn holding(&self) -> bool {
        self.hold.is_some()
    }

    pub fn bid_weight_qty(&self) -> Qty {
        self.bid_weights.qty
    }

    pub fn bid_weight_value(&self) -> u128 {
        self.bid_weights.value
    }

    pub fn ask_weight_qty(&self) -> Qty {
        self.ask_weights.qty
    }

    pub fn ask_weight_value(&self) -> u128 {
        self.ask_weights.value
    }

    /// Take every snapshot emitted since the last call, oldest first.
    pub fn drain_snapshots(&mut self) -> Vec<Snapshot> {
        std::mem::take(&mut self.emitted)
    }

    /// Terminal check: true when every exchange snapshot found a rebuilt
    /// twin. Call after end-of-day input and `AllEnd`.
    pub fn reconciled(&self) -> bool {
        self.reconciler.is_drained(self.security_id)
    }

    // === Ladder mutations ===

    /// Enqueue an order into the directory and its ladder, maintaining
    /// cached bests, cage boundaries, reference prices, and weights.
    ///
    /// `out_of_cage` inserts the order hidden: present in the ladder but
    /// invisible to the cached best and the weighted statistics.
    pub(crate) fn insert_order(&mut self, order: RestingOrder, out_of_cage: bool) {
        if out_of_cage {
            debug!("{:06} order {} rests outside the cage", self.security_id, order.seq);
        }
        let (seq, price, qty, side) = (order.seq, order.price, order.qty, order.side);
        self.orders.insert(seq, order);

        match side {
            Side::Bid => {
                let added = self.bids.insert_or_add(price, qty, !out_of_cage);
                if !added.created {
                    if self.cage.bid_hidden_qty != 0 && price == self.cage.bid_hidden_price {
                        self.cage.bid_hidden_qty += qty;
                    }
                } else if !out_of_cage {
                    if added.new_best {
                        self.cage.ask_ref_px = price;
                        if self.asks.best_qty() == 0 {
                            self.cage.bid_ref_px = price;
                        }
                        self.cage.ask_waiting = self.gem;
                    }
                } else if price > self.cage.bid_ref_px
                    && (self.cage.bid_hidden_qty == 0 || price < self.cage.bid_hidden_price)
                {
                    self.cage.bid_hidden_price = price;
                    self.cage.bid_hidden_qty = qty;
                }

                if !out_of_cage {
                    self.bid_weights.add(price, qty);
                }
            }
            Side::Ask => {
                let added = self.asks.insert_or_add(price, qty, !out_of_cage);
                if !added.created {
                    if self.cage.ask_hidden_qty != 0 && price == self.cage.ask_hidden_price {
                        self.cage.ask_hidden_qty += qty;
                    }
                } else {
                    if price == PRICE_MAX {
                        // An uncapped sell makes the weighted ask price
                        // meaningless until the level drains.
                        self.ask_weight_px_uncertain = true;
                    }
                    if !out_of_cage {
                        if added.new_best {
                            self.cage.bid_ref_px = price;
                            if self.bids.best_qty() == 0 {
                                self.cage.ask_ref_px = price;
                            }
                            self.cage.bid_waiting = self.gem;
                        }
                    } else if price < self.cage.ask_ref_px
                        && (self.cage.ask_hidden_qty == 0 || price > self.cage.ask_hidden_price)
                    {
                        self.cage.ask_hidden_price = price;
                        self.cage.ask_hidden_qty = qty;
                    }
                }

                if !out_of_cage {
                    if self.phase == Phase::OpenCall && self.beyond_open_call_value_band(price) {
                        self.ask_weights_ex.add(price, qty);
                    } else {
                        self.ask_weights.add(price, qty);
                    }
                }
            }
        }
    }

    /// Opening-call sells beyond 9× prev-close stay out of the published
    /// statistics until continuous trading starts.
    #[inline]
    pub(crate) fn beyond_open_call_value_band(&self, price: Price) -> bool {
        u64::from(price.0) > u64::from(self.prev_close.0) * market::GEM_OPEN_CALL_VALUE_RATE
    }

    /// Subtract traded or cancelled quantity from a price level,
    /// maintaining the cached best, the hidden boundary, the weights,
    /// and, when a best level drains, the opposite side's cage
    /// reference price (precedence: own next best → opposite same price
    /// → opposite best → last trade).
    pub(crate) fn level_dequeue(
        &mut self,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Result<(), BookError> {
        match side {
            Side::Bid => {
                let Some(drain) = self.bids.decrement(price, qty) else {
                    error!("{:06} bid level {} missing on dequeue", self.security_id, price);
                    return Err(BookError::PhaseInvariant("dequeue against a missing level"));
                };

                if self.cage.bid_hidden_qty == 0 || price < self.cage.bid_hidden_price {
                    self.bid_weights.sub(price, qty);
                } else if price == self.cage.bid_hidden_price {
                    self.cage.bid_hidden_qty = self.cage.bid_hidden_qty.saturating_sub(qty);
                    if self.cage.bid_hidden_qty == 0 {
                        if let Some((p, q)) = self.bids.next_better(price) {
                            self.cage.bid_hidden_price = p;
                            self.cage.bid_hidden_qty = q;
                        }
                    }
                }

                if drain.emptied && drain.was_best {
                    if self.bids.best_qty() != 0 {
                        self.cage.ask_ref_px = self.bids.best_price();
                    } else if self.asks.contains(price) {
                        self.cage.ask_ref_px = price;
                    } else if self.asks.best_qty() != 0 {
                        self.cage.ask_ref_px = self.asks.best_price();
                    } else {
                        self.cage.ask_ref_px = self.last_px;
                    }
                    self.cage.ask_waiting = self.gem && self.phase.is_continuous();
                }
            }
            Side::Ask => {
                let Some(drain) = self.asks.decrement(price, qty) else {
                    error!("{:06} ask level {} missing on dequeue", self.security_id, price);
                    return Err(BookError::PhaseInvariant("dequeue against a missing level"));
                };

                if self.cage.ask_hidden_qty == 0 || price > self.cage.ask_hidden_price {
                    if self.phase == Phase::OpenCall && self.beyond_open_call_value_band(price) {
                        self.ask_weights_ex.sub(price, qty);
                    } else {
                        self.ask_weights.sub(price, qty);
                    }
                } else if price == self.cage.ask_hidden_price {
                    self.cage.ask_hidden_qty = self.cage.ask_hidden_qty.saturating_sub(qty);
                    if self.cage.ask_hidden_qty == 0 {
                        if let Some((p, q)) = self.asks.next_better(price) {
                            self.cage.ask_hidden_price = p;
                            self.cage.ask_hidden_qty = q;
                        }
                    }
                }

                if drain.emptied {
                    if price == PRICE_MAX {
                        self.ask_weight_px_uncertain = false;
                    }
                    if drain.was_best {
                        if self.asks.best_qty() != 0 {
                            self.cage.bid_ref_px = self.asks.best_price();
                        } else if self.bids.contains(price) {
                            self.cage.bid_ref_px = price;
                        } else if self.bids.best_qty() != 0 {
                            self.cage.bid_ref_px = self.bids.best_price();
                        } else {
                            self.cage.bid_ref_px = self.last_px;
                        }
                        self.cage.bid_waiting = self.gem && self.phase.is_continuous();
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply one fill against a resting order: decrement its quantity
    /// (removing it when exhausted) and dequeue the level.
    pub(crate) fn trade_limit(&mut self, side: Side, qty: Qty, seq: SeqNum) -> Result<(), BookError> {
        let Some(order) = self.orders.get_mut(&seq) else {
            error!("{:06} traded order {} not found", self.security_id, seq);
            return Err(BookError::OrderNotFound(seq));
        };
        let price = order.price;
        if order.qty <= qty {
            self.orders.remove(&seq);
        } else {
            order.qty -= qty;
        }
        self.level_dequeue(side, price, qty)
    }

    // === Debug invariants ===

    /// Re-derive the cached state from the ladders and assert agreement.
    /// Runs after every message in debug builds.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_validate(&self) {
        use crate::types::LEVEL_QTY_BITS;

        if !self.asks.is_empty() {
            if self.gem && self.cage.ask_hidden_qty != 0 {
                assert!(
                    self.asks.best_price() > self.cage.ask_hidden_price,
                    "{:06} cached ask best not beyond the hidden boundary",
                    self.security_id
                );
            } else if self.asks.best_qty() != 0 {
                let (min_p, min_q) = self.asks.iter_from_best().next().unwrap();
                assert_eq!(self.asks.best_price(), min_p, "{:06} cached ask price", self.security_id);
                assert_eq!(self.asks.best_qty(), min_q, "{:06} cached ask qty", self.security_id);
            }
        }
        if !self.bids.is_empty() {
            if self.gem && self.cage.bid_hidden_qty != 0 {
                assert!(
                    self.bids.best_price() < self.cage.bid_hidden_price,
                    "{:06} cached bid best not beyond the hidden boundary",
                    self.security_id
                );
            } else if self.bids.best_qty() != 0 {
                let (max_p, max_q) = self.bids.iter_from_best().next().unwrap();
                assert_eq!(self.bids.best_price(), max_p, "{:06} cached bid price", self.security_id);
                assert_eq!(self.bids.best_qty(), max_q, "{:06} cached bid qty", self.security_id);
            }
        }

        if self.phase.is_continuous() && self.bids.best_qty() != 0 && self.asks.best_qty() != 0 {
            assert!(
                self.bids.best_price() < self.asks.best_price(),
                "{:06} crossed book in continuous trading: {} / {}",
                self.security_id,
                self.bids.best_price(),
                self.asks.best_price()
            );
        }

        let mut ask_static = Weights::default();
        for (p, q) in self.asks.iter_from_best() {
            assert!(q < (1 << LEVEL_QTY_BITS), "{:06} ask level qty overflow", self.security_id);
            if self.cage.ask_hidden_qty == 0 || p > self.cage.ask_hidden_price {
                ask_static.add(p, q);
            }
        }
        let mut expected = self.ask_weights;
        if self.phase < Phase::AmTrading {
            expected.merge(self.ask_weights_ex);
        }
        assert_eq!(
            ask_static, expected,
            "{:06} ask weights diverged from the ladder",
            self.security_id
        );

        let mut bid_static = Weights::default();
        for (p, q) in self.bids.iter_from_best() {
            assert!(q < (1 << LEVEL_QTY_BITS), "{:06} bid level qty overflow", self.security_id);
            if self.cage.bid_hidden_qty == 0 || p < self.cage.bid_hidden_price {
                bid_static.add(p, q);
            }
        }
        assert_eq!(
            bid_static, self.bid_weights,
            "{:06} bid weights diverged from the ladder",
            self.security_id
        );
    }
}

#[cfg(feature = "serde")]
mod serde_orders {
    //! `FxHashMap<SeqNum, RestingOrder>` as `Vec<(SeqNum, RestingOrder)>`
    //! (JSON maps cannot key on integers).
    use rustc_hash::FxHashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::order::RestingOrder;
    use crate::types::SeqNum;

    pub fn serialize<S: Serializer>(
        map: &FxHashMap<SeqNum, RestingOrder>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut pairs: Vec<(&SeqNum, &RestingOrder)> = map.iter().collect();
        pairs.sort_by_key(|&(&seq, _)| seq);
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<FxHashMap<SeqNum, RestingOrder>, D::Error> {
        let pairs = Vec::<(SeqNum, RestingOrder)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OrderKind;

    fn book() -> OrderBook {
        OrderBook::new(1, Exchange::Szse, Instrument::Stock).unwrap()
    }

    fn resting(seq: SeqNum, side: Side, price: u32, qty: Qty) -> RestingOrder {
        RestingOrder {
            seq,
            price: Price(price),
            qty,
            side,
            kind: OrderKind::Limit,
            traded: false,
            transact_time: 0,
        }
    }

    #[test]
    fn unsupported_combination_rejected() {
        assert!(matches!(
            OrderBook::new(1, Exchange::Szse, Instrument::Bond),
            Err(BookError::Unsupported { .. })
        ));
    }

    #[test]
    fn insert_maintains_weights_and_best() {
        let mut book = book();
        book.insert_order(resting(1, Side::Bid, 1_000, 100), false);
        book.insert_order(resting(2, Side::Bid, 990, 50), false);
        book.insert_order(resting(3, Side::Ask, 1_010, 70), false);

        assert_eq!(book.bids.best_price(), Price(1_000));
        assert_eq!(book.bid_weight_qty(), 150);
        assert_eq!(book.bid_weight_value(), 1_000 * 100 + 990 * 50);
        assert_eq!(book.ask_weight_qty(), 70);
        book.debug_validate();
    }

    #[test]
    fn trade_limit_decrements_and_removes() {
        let mut book = book();
        book.insert_order(resting(1, Side::Ask, 1_010, 100), false);

        book.trade_limit(Side::Ask, 30, 1).unwrap();
        assert_eq!(book.orders.get(&1).unwrap().qty, 70);
        assert_eq!(book.asks.best_qty(), 70);

        book.trade_limit(Side::Ask, 70, 1).unwrap();
        assert!(book.orders.is_empty());
        assert_eq!(book.asks.best_qty(), 0);
        book.debug_validate();
    }

    #[test]
    fn trade_against_unknown_seq_fails() {
        let mut book = book();
        assert_eq!(
            book.trade_limit(Side::Bid, 10, 99),
            Err(BookError::OrderNotFound(99))
        );
    }

    #[test]
    fn dequeue_best_updates_opposite_cage_ref() {
        let mut book = book();
        book.insert_order(resting(1, Side::Bid, 1_000, 100), false);
        book.insert_order(resting(2, Side::Bid, 990, 50), false);
        book.insert_order(resting(3, Side::Ask, 1_010, 70), false);

        // Draining the best bid promotes the next bid as the ask-side
        // cage reference.
        book.trade_limit(Side::Bid, 100, 1).unwrap();
        assert_eq!(book.bids.best_price(), Price(990));
        assert_eq!(book.cage.ask_ref_px, Price(990));
        book.debug_validate();
    }

    #[test]
    fn overflow_ask_sets_uncertain_flag() {
        let mut book = book();
        book.insert_order(resting(1, Side::Ask, PRICE_MAX.0, 10), false);
        assert!(book.ask_weight_px_uncertain);

        book.trade_limit(Side::Ask, 10, 1).unwrap();
        assert!(!book.ask_weight_px_uncertain);
        book.debug_validate();
    }

    #[test]
    fn weights_avg_rounds_half_up() {
        let mut w = Weights::default();
        w.add(Price(1_001), 1);
        w.add(Price(1_002), 1);
        // mean 1001.5 rounds up
        assert_eq!(w.avg_px(), 1_002);

        let mut w = Weights::default();
        w.add(Price(1_001), 2);
        w.add(Price(1_002), 1);
        // mean 1001.33 rounds down
        assert_eq!(w.avg_px(), 1_001);
    }

    #[test]
    fn hidden_insert_excluded_from_weights() {
        let mut book = book();
        book.gem = true;
        book.cage.bid_ref_px = Price(2_000);
        book.insert_order(resting(1, Side::Bid, 2_100, 100), true);

        assert_eq!(book.bid_weight_qty(), 0);
        assert_eq!(book.bids.best_qty(), 0);
        assert_eq!(book.cage.bid_hidden_price, Price(2_100));
        assert_eq!(book.cage.bid_hidden_qty, 100);
        book.debug_validate();
    }
}
