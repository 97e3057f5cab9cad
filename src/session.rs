//! Session control: the `on_message` entry point, phase transitions,
//! boundary signals, and the day's constants from reference snapshots.
//!
//! Phase tracking follows the ticks, not the snapshots: the rebuild is
//! tick-driven and snapshot cadence differs around transitions. The two
//! exceptions are phase boundaries with no accompanying tick (an opening
//! call that cannot match, the lunch break), which arrive as
//! [`Signal`]s from the dispatcher, and volatility breaks, which latch
//! until an execution un-crosses the resumption auction.

use tracing::{debug, error, info, warn};

use crate::book::OrderBook;
use crate::error::BookError;
use crate::market::{Exchange, Instrument};
use crate::message::{Message, RefSnapshot, Signal};
use crate::phase::Phase;
use crate::types::{PRICE_OVERFLOW_SENTINEL, Price, SeqNum, TIMESTAMP_BITS, Timestamp};

impl OrderBook {
    /// Apply one feed message or signal. Every effect is complete when
    /// this returns; emitted snapshots wait in
    /// [`OrderBook::drain_snapshots`].
    ///
    /// Only [`BookError::Unsupported`] and [`BookError::OrderNotFound`]
    /// propagate; all other anomalies are logged and absorbed.
    pub fn on_message(&mut self, msg: &Message) -> Result<(), BookError> {
        let result = match msg {
            Message::Order(order) => {
                if !self.admit_tick(
                    order.security_id,
                    order.appl_seq_num,
                    order.transact_time,
                    order.phase,
                ) {
                    return Ok(());
                }
                let result = self.on_order(order);
                self.record_seq(order.appl_seq_num);
                result
            }
            Message::Exec(exec) => {
                if !self.admit_tick(
                    exec.security_id,
                    exec.appl_seq_num,
                    exec.transact_time,
                    exec.phase,
                ) {
                    return Ok(());
                }
                let result = self.on_exec(exec);
                self.record_seq(exec.appl_seq_num);
                result
            }
            Message::Snap(snap) => self.on_ref_snap(snap),
            Message::Signal(signal) => {
                self.on_signal(*signal);
                Ok(())
            }
        };

        #[cfg(debug_assertions)]
        self.debug_validate();

        result
    }

    /// Common tick admission: instrument filter, SZSE sequence
    /// monotonicity, constants readiness, timestamp, and the phase latch.
    fn admit_tick(
        &mut self,
        security_id: u32,
        appl_seq_num: u64,
        transact_time: Timestamp,
        phase: Phase,
    ) -> bool {
        if security_id != self.security_id {
            return false;
        }
        // SZSE ticks are strictly ordered per channel; SSE unmerged
        // streams are not, so only SZSE is guarded.
        if self.exchange == Exchange::Szse && appl_seq_num as SeqNum <= self.last_seq {
            error!(
                "{:06} seq {} <= {} repeated or out of order",
                self.security_id, appl_seq_num, self.last_seq
            );
            return false;
        }
        if !self.constants_ready {
            error!(
                "{:06} tick before the day's constants arrived",
                self.security_id
            );
            return false;
        }

        self.use_timestamp(transact_time);
        if self.phase != Phase::VolatilityBreaking {
            self.phase = phase;
        }
        true
    }

    fn record_seq(&mut self, appl_seq_num: u64) {
        if self.exchange == Exchange::Szse {
            self.last_seq = appl_seq_num as SeqNum;
        }
    }

    /// Track the latest tick time at internal precision (SZSE 10 ms
    /// units with the date stripped; SSE as delivered).
    pub(crate) fn use_timestamp(&mut self, transact_time: Timestamp) {
        self.current_tick = match self.exchange {
            Exchange::Szse => (transact_time / 10) % 100_000_000,
            Exchange::Sse => transact_time,
        };
        if self.current_tick >= (1 << TIMESTAMP_BITS) {
            error!(
                "{:06} transact time {} overflows {TIMESTAMP_BITS} bits",
                self.security_id, transact_time
            );
        }
    }

    /// Dispatcher-injected phase boundaries.
    pub(crate) fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::OpenCallEnd => {
                // With no cross there are no 9:25 executions to advance
                // the phase; move on and emit the resting-book snapshot.
                if self.bids.best_price() < self.asks.best_price()
                    && self.phase == Phase::OpenCall
                {
                    self.phase = Phase::PreTradingBreaking;
                    self.gen_snap();
                }
            }
            Signal::AmBegin => {
                if self.phase == Phase::PreTradingBreaking {
                    self.phase = Phase::AmTrading;
                    let parked = std::mem::take(&mut self.ask_weights_ex);
                    self.ask_weights.merge(parked);
                    if self.gem && self.up_limit_raw == PRICE_OVERFLOW_SENTINEL {
                        // IPO-day instrument with no limits: the valid
                        // range narrows to ±10% of the last price.
                        self.open_cage();
                    }
                    self.gen_snap();
                }
            }
            Signal::AmEnd => {
                if self.phase == Phase::AmTrading {
                    if matches!(&self.hold, Some(h) if h.kind == crate::message::OrderKind::Market)
                    {
                        let held = self.hold.take().expect("checked above");
                        self.insert_order(held, false);
                    }
                    if self.hold.is_none() {
                        self.phase = Phase::Breaking;
                        self.gen_snap();
                    }
                }
            }
            Signal::PmEnd => {
                if self.phase == Phase::PmTrading {
                    if matches!(&self.hold, Some(h) if h.kind == crate::message::OrderKind::Market)
                    {
                        let held = self.hold.take().expect("checked above");
                        self.insert_order(held, false);
                    }
                    if self.hold.is_none() {
                        self.gen_snap();
                        self.phase = Phase::CloseCall;
                        self.open_cage();
                        self.gen_snap();
                    }
                }
            }
            Signal::AllEnd => match self.exchange {
                Exchange::Szse => {
                    if self.bids.best_price() < self.asks.best_price()
                        && self.phase == Phase::CloseCall
                    {
                        // The close call cannot clear: the close price is
                        // the exchange's trailing VWAP, which arrives in
                        // its Ending snapshot.
                        self.phase = Phase::Ending;
                        self.close_px_ready = false;
                    } else {
                        self.close_px_ready = true;
                        self.gen_snap();
                    }
                }
                Exchange::Sse => {
                    if self.bids.best_price() < self.asks.best_price()
                        && self.phase == Phase::CloseCall
                    {
                        self.phase = Phase::Ending;
                    }
                    self.close_px_ready = false;
                    warn!(
                        "{:06} SSE closing price derivation not implemented",
                        self.security_id
                    );
                }
            },
            // Informational boundaries; the ticks carry these phases.
            Signal::OpenCallBegin | Signal::PmBegin => {}
        }
    }

    /// Reference snapshots: the day's constants, the SZSE close price,
    /// volatility-break entry, and the cross-check.
    pub(crate) fn on_ref_snap(&mut self, reference: &RefSnapshot) -> Result<(), BookError> {
        let snap = &reference.snap;
        if snap.security_id != self.security_id {
            return Ok(());
        }
        debug!("{:06} reference snapshot @{}", self.security_id, snap.transact_time);

        if !reference.tradable {
            match self.exchange {
                // SZSE replay sets only contain instruments that trade
                // all day; a halt flag here is feed corruption.
                Exchange::Szse => {
                    error!(
                        "{:06} snapshot reports a non-tradable instrument",
                        self.security_id
                    );
                    return Ok(());
                }
                // SSE stocks report non-tradable until 9:14.
                Exchange::Sse => info!(
                    "{:06} snapshot reports a non-tradable instrument",
                    self.security_id
                ),
            }
        }

        if snap.phase == Phase::Starting {
            // The earliest snapshots (before ~7:30) carry no limit
            // prices yet, so the constants stay open for re-capture.
            self.constants_ready = true;
            if self.channel_no == u16::MAX {
                debug!(
                    "{:06} constants: channel={} prev_close={} up={} dn={}",
                    self.security_id, snap.channel_no, snap.prev_close, snap.up_limit, snap.dn_limit
                );
            }
            self.channel_no = snap.channel_no;
            self.prev_close =
                if self.exchange == Exchange::Sse && self.instrument == Instrument::Bond {
                    // SSE bond snapshots carry no previous close.
                    Price::ZERO
                } else {
                    Price((snap.prev_close / self.scaling.preclose_div) as u32)
                };

            if self.exchange == Exchange::Szse {
                self.cage.ask_ref_px = self.prev_close;
                self.cage.bid_ref_px = self.prev_close;
                self.up_limit_raw = snap.up_limit;
                self.dn_limit_raw = snap.dn_limit;
                self.up_limit = Price((snap.up_limit / self.scaling.limit_div) as u32);
                self.dn_limit = Price((snap.dn_limit / self.scaling.limit_div) as u32);
                self.trade_date = snap.transact_time / 1_000_000_000;
            }
        }

        if self.phase == Phase::Ending && snap.phase == Phase::Ending && !self.close_px_ready {
            match self.exchange {
                Exchange::Szse => {
                    // Close call did not clear: adopt the exchange's
                    // trailing-VWAP close and emit the deferred snapshot.
                    self.last_px = Price((snap.last_px / self.scaling.snap_price_mul) as u32);
                    self.close_px_ready = true;
                    self.gen_snap();
                }
                Exchange::Sse => error!(
                    "{:06} SSE close price adoption not implemented",
                    self.security_id
                ),
            }
        }

        if snap.phase == Phase::VolatilityBreaking && self.phase != Phase::VolatilityBreaking {
            warn!(
                "{:06} entering volatility break @{}",
                self.security_id, snap.transact_time
            );
            self.phase = Phase::VolatilityBreaking;
            self.gen_snap();
        }

        // SZSE snapshots become comparable from the opening call on;
        // SSE only after it (their call snapshots are not rebuilt 1:1).
        let comparable = match self.exchange {
            Exchange::Szse => snap.phase >= Phase::OpenCall,
            Exchange::Sse => snap.phase >= Phase::PreTradingBreaking,
        };
        if comparable {
            self.reconciler.on_market(snap);
        }
        Ok(())
    }
}
