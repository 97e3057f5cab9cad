//! Replay handlers: classify and apply orders, executions, and cancels.
//!
//! The exchange already matched everything; these handlers re-derive the
//! book the matcher must have had. The one piece of genuine inference is
//! the *hold slot*: a market order (or a limit that crosses) cannot rest
//! where it arrived, so it is parked until the executions that consumed
//! it show up, or until the next event proves there were none.

use tracing::{debug, error, warn};

use crate::book::OrderBook;
use crate::error::BookError;
use crate::market::{Exchange, band_lower, band_upper, cage_lower, cage_upper};
use crate::message::{AddOrder, ExecKind, Execution, OrderKind};
use crate::order::RestingOrder;
use crate::phase::Phase;
use crate::side::Side;
use crate::types::{PRICE_OVERFLOW_SENTINEL, Price, Qty, SeqNum, Timestamp};

/// A cancel, from either wire shape (SZSE exec with one zero seq, SSE
/// delete order).
#[derive(Clone, Copy, Debug)]
pub(crate) struct CancelReq {
    pub seq: SeqNum,
    pub qty: Qty,
    pub side: Side,
    pub transact_time: Timestamp,
}

/// An execution in internal units.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TradeExec {
    pub bid_seq: SeqNum,
    pub offer_seq: SeqNum,
    pub px: Price,
    pub qty: Qty,
    pub transact_time: Timestamp,
    pub phase: Phase,
}

impl OrderBook {
    /// Route one order record: flush any held order first, split off SSE
    /// deletes, resolve own-side-best pricing, and hand the rest to the
    /// limit-order path.
    pub(crate) fn on_order(&mut self, msg: &AddOrder) -> Result<(), BookError> {
        debug!("{:06} order #{}", self.security_id, msg.appl_seq_num);

        if self.hold.is_some() {
            self.flush_hold(msg.transact_time);
        }

        if msg.kind == OrderKind::Cancel {
            return self.on_cancel(CancelReq {
                seq: msg.appl_seq_num as SeqNum,
                qty: msg.qty,
                side: msg.side,
                transact_time: msg.transact_time,
            });
        }

        let mut order = RestingOrder::normalize(msg, &self.scaling);
        match order.kind {
            OrderKind::Market => {
                // Market orders only make sense once the book has price
                // levels to take from.
                if self.bids.best_qty() == 0 && self.asks.best_qty() == 0 {
                    error!(
                        "{:06} market order {} before any price level",
                        self.security_id, order.seq
                    );
                }
            }
            OrderKind::OwnSideBest => match order.side {
                Side::Bid => {
                    if self.bids.best_price() != Price::ZERO && self.bids.best_qty() != 0 {
                        order.price = self.bids.best_price();
                    } else {
                        order.price = self.dn_limit;
                        warn!(
                            "{:06} own-side-best bid {} with an empty side",
                            self.security_id, order.seq
                        );
                    }
                }
                Side::Ask => {
                    if self.asks.best_price() != Price::ZERO && self.asks.best_qty() != 0 {
                        order.price = self.asks.best_price();
                    } else {
                        order.price = self.up_limit;
                        warn!(
                            "{:06} own-side-best ask {} with an empty side",
                            self.security_id, order.seq
                        );
                    }
                }
            },
            _ => {}
        }

        self.on_limit_order(order);
        Ok(())
    }

    /// Park-or-insert decision for a price-resolved order.
    pub(crate) fn on_limit_order(&mut self, order: RestingOrder) {
        if self.phase.is_call() {
            // Call auctions take everything directly, except GEM IPO-day
            // orders outside the valid range, which the matcher discards.
            let illegal = self.gem
                && self.up_limit_raw == PRICE_OVERFLOW_SENTINEL
                && ((self.phase == Phase::OpenCall
                    && order.side == Side::Bid
                    && self.beyond_open_call_value_band(order.price))
                    || (self.phase == Phase::CloseCall
                        && (order.price > band_upper(self.last_px)
                            || order.price < band_lower(self.last_px))));
            if illegal {
                self.illegal_orders.insert(order.seq, order);
            } else {
                self.insert_order(order, false);
                self.cage.bid_waiting = false;
                self.cage.ask_waiting = false;
            }
            self.gen_snap();
        } else if self.gem
            && order.kind == OrderKind::Limit
            && ((order.side == Side::Bid && order.price > cage_upper(self.cage.bid_ref_px))
                || (order.side == Side::Ask && order.price < cage_lower(self.cage.ask_ref_px)))
        {
            self.insert_order(order, true);
            self.gen_snap();
        } else if self.phase == Phase::VolatilityBreaking {
            // A new order during a break means the resumption auction is
            // forming; it rests immediately.
            self.insert_order(order, false);
            self.gen_snap();
        } else if order.kind == OrderKind::Market {
            debug!("{:06} holding market order {}", self.security_id, order.seq);
            self.hold = Some(order);
        } else if (order.side == Side::Bid
            && order.price >= self.asks.best_price()
            && self.asks.best_qty() > 0)
            || (order.side == Side::Ask
                && order.price <= self.bids.best_price()
                && self.bids.best_qty() > 0)
        {
            debug!("{:06} holding crossing limit order {}", self.security_id, order.seq);
            self.hold = Some(order);
            self.cage.bid_waiting = false;
            self.cage.ask_waiting = false;
        } else {
            self.insert_order(order, false);
            if self.gem {
                self.enter_cage();
            }
            self.gen_snap();
        }
    }

    /// Insert the held order and emit the pre-snapshot it owes, stamped
    /// with the held order's own time.
    pub(crate) fn flush_hold(&mut self, next_time: Timestamp) {
        let held = self.hold.take().expect("flush without a held order");
        if held.kind == OrderKind::Market && !held.traded {
            error!(
                "{:06} market order {} flushed without a trade",
                self.security_id, held.seq
            );
        }
        let held_time = held.transact_time;
        self.insert_order(held, false);
        self.use_timestamp(held_time);
        self.gen_snap();
        self.use_timestamp(next_time);
    }

    /// Route one execution record: SZSE cancels travel as executions
    /// with one zero sequence; everything else is a fill.
    pub(crate) fn on_exec(&mut self, msg: &Execution) -> Result<(), BookError> {
        debug!("{:06} exec #{}", self.security_id, msg.appl_seq_num);

        if msg.kind == ExecKind::Fill || self.exchange == Exchange::Sse {
            let exec = TradeExec {
                bid_seq: msg.bid_seq as SeqNum,
                offer_seq: msg.offer_seq as SeqNum,
                px: Price((msg.last_px / self.scaling.raw_price_div) as u32),
                qty: msg.last_qty,
                transact_time: msg.transact_time,
                phase: msg.phase,
            };
            self.on_trade(exec)
        } else {
            let (seq, side) = if msg.bid_seq != 0 {
                (msg.bid_seq, Side::Bid)
            } else {
                (msg.offer_seq, Side::Ask)
            };
            self.on_cancel(CancelReq {
                seq: seq as SeqNum,
                qty: msg.last_qty,
                side,
                transact_time: msg.transact_time,
            })
        }
    }

    /// Apply one fill: statistics, then the hold slot, then the ladders.
    pub(crate) fn on_trade(&mut self, exec: TradeExec) -> Result<(), BookError> {
        self.num_trades += 1;
        self.total_volume += exec.qty;
        self.total_value += u64::from(exec.px.0) * exec.qty / self.scaling.value_div;

        self.last_px = exec.px;
        if self.open_px == Price::ZERO {
            self.open_px = exec.px;
            self.high_px = exec.px;
            self.low_px = exec.px;
        } else {
            self.high_px = self.high_px.max(exec.px);
            self.low_px = self.low_px.min(exec.px);
        }

        // A partially-filled market order may be queuing while trades
        // between *other* orders arrive (its remainder entered the book
        // on the exchange side). Seeing an unrelated fill proves it is
        // done: insert it now.
        let unrelated_market = matches!(
            &self.hold,
            Some(held) if held.kind == OrderKind::Market
                && held.seq != exec.bid_seq
                && held.seq != exec.offer_seq
        );
        if unrelated_market {
            let held = self.hold.take().expect("checked above");
            warn!(
                "{:06} market order {} followed by an unrelated exec; treating as fully traded",
                self.security_id, held.seq
            );
            if !self.gem {
                error!(
                    "{:06} unrelated-exec market flush outside ChiNext",
                    self.security_id
                );
            }
            let held_time = held.transact_time;
            self.insert_order(held, false);
            self.use_timestamp(held_time);
            self.gen_snap();
            self.use_timestamp(exec.transact_time);
        }

        if let Some(mut held) = self.hold.take() {
            let (level_side, counter_seq) = if exec.bid_seq == held.seq {
                (Side::Ask, exec.offer_seq)
            } else {
                (Side::Bid, exec.bid_seq)
            };
            if held.qty < exec.qty {
                error!(
                    "{:06} held order {} qty {} below fill qty {}",
                    self.security_id, held.seq, held.qty, exec.qty
                );
            }
            if held.qty > exec.qty {
                held.qty -= exec.qty;
                if held.kind == OrderKind::Market {
                    // First fill prices the market order.
                    held.price = exec.px;
                    held.traded = true;
                }
                self.hold = Some(held);
            }
            self.trade_limit(level_side, exec.qty, counter_seq)?;

            let rest_now = match &self.hold {
                Some(held) if held.kind == OrderKind::Limit => match held.side {
                    Side::Bid => held.price < self.asks.best_price() || self.asks.best_qty() == 0,
                    Side::Ask => held.price > self.bids.best_price() || self.bids.best_qty() == 0,
                },
                _ => false,
            };
            if rest_now {
                // The opposite side no longer crosses; the remainder
                // rests instead of waiting for more fills.
                let held = self.hold.take().expect("checked above");
                self.insert_order(held, false);
            }

            if self.gem {
                self.enter_cage();
            }
            if self.hold.is_none() {
                self.gen_snap();
            }
        } else if self.cage.bid_waiting || self.cage.ask_waiting {
            debug!("{:06} caged order traded", self.security_id);
            self.trade_limit(Side::Ask, exec.qty, exec.offer_seq)?;
            self.trade_limit(Side::Bid, exec.qty, exec.bid_seq)?;
            if self.gem {
                self.enter_cage();
            }
            self.gen_snap();
        } else {
            // Trades with no held order belong to a call-auction batch
            // (9:25 / 15:00) or a resumption after a break. Anything
            // else is feed reordering; apply it anyway.
            if !self.call_batch_time(exec.transact_time)
                && self.phase != Phase::VolatilityBreaking
            {
                warn!(
                    "{:06} unexpected execution at {}",
                    self.security_id, exec.transact_time
                );
            }
            self.trade_limit(Side::Ask, exec.qty, exec.offer_seq)?;
            self.trade_limit(Side::Bid, exec.qty, exec.bid_seq)?;

            if self.asks.best_qty() == 0
                || self.bids.best_qty() == 0
                || self.asks.best_price() > self.bids.best_price()
            {
                debug!("{:06} batch trades applied; book uncrossed", self.security_id);
                if self.phase == Phase::VolatilityBreaking {
                    self.phase = exec.phase;
                }
                self.gen_snap();
            }
        }
        Ok(())
    }

    /// True at the two call-auction clearing instants.
    fn call_batch_time(&self, transact_time: Timestamp) -> bool {
        match self.exchange {
            Exchange::Szse => {
                let intraday = transact_time % 1_000_000_000;
                intraday == 92_500_000 || intraday == 150_000_000
            }
            Exchange::Sse => transact_time == 9_250_000 || transact_time == 15_000_000,
        }
    }

    /// Apply one cancel. The held order, if any, is inserted first and
    /// owes a pre-snapshot, unless it shares the cancel's timestamp,
    /// which marks a best-5-IOC remainder that never traded.
    pub(crate) fn on_cancel(&mut self, cancel: CancelReq) -> Result<(), BookError> {
        if self.hold.is_some() {
            let held = self.hold.take().expect("checked above");
            let held_time = held.transact_time;
            self.insert_order(held, false);
            if cancel.transact_time != held_time {
                self.use_timestamp(held_time);
                self.gen_snap();
                self.use_timestamp(cancel.transact_time);
            }
        }

        if let Some(order) = self.orders.remove(&cancel.seq) {
            self.level_dequeue(cancel.side, order.price, cancel.qty)?;
            if self.gem {
                self.enter_cage();
            }
            self.gen_snap();
            Ok(())
        } else if self.illegal_orders.remove(&cancel.seq).is_some() {
            // A discarded pre-IPO order; the cancel resolves silently.
            Ok(())
        } else {
            error!("{:06} cancel {} not found", self.security_id, cancel.seq);
            Err(BookError::OrderNotFound(cancel.seq))
        }
    }
}
