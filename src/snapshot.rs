//! Level-10 snapshots: the value the book emits and the value the
//! exchange publishes, in one representation.
//!
//! Prices inside a snapshot are in *snapshot* precision (SZSE 6 dp,
//! SSE 3 dp; the SZSE prev-close alone is 4 dp), so a rebuilt snapshot
//! compares field-for-field against a decoded exchange snapshot.

use crate::book::OrderBook;
use crate::market::Exchange;
use crate::phase::Phase;
use crate::types::Price;

pub(crate) const SNAP_DEPTH: usize = 10;

/// One displayed price level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapLevel {
    /// Price in snapshot precision; zero on an empty or synthetic level.
    pub price: u64,
    pub qty: u64,
}

/// A Level-10 market-depth snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub exchange: Exchange,
    pub security_id: u32,
    pub channel_no: u16,
    pub phase: Phase,
    /// SZSE `YYYYMMDDHHMMSSmmm`; SSE intraday units.
    pub transact_time: u64,

    pub num_trades: u64,
    pub total_volume: u64,
    pub total_value: u64,

    pub prev_close: u64,
    pub last_px: u64,
    pub open_px: u64,
    pub high_px: u64,
    pub low_px: u64,

    pub bid_weight_px: u64,
    pub bid_weight_qty: u64,
    pub ask_weight_px: u64,
    pub ask_weight_qty: u64,

    pub up_limit: u64,
    pub dn_limit: u64,

    pub bid: [SnapLevel; SNAP_DEPTH],
    pub ask: [SnapLevel; SNAP_DEPTH],

    /// The sell-side weighted price contained an overflowed order and is
    /// not comparable. Treated as a wildcard by [`Snapshot::is_same`].
    pub ask_weight_px_uncertain: bool,
}

impl Snapshot {
    /// Field equality as the reconciler defines it: everything except
    /// the transact-time, with `ask_weight_px` skipped when either side
    /// flags it uncertain.
    pub fn is_same(&self, other: &Snapshot) -> bool {
        let ask_weight_px_same = if self.ask_weight_px_uncertain || other.ask_weight_px_uncertain {
            true
        } else {
            self.ask_weight_px == other.ask_weight_px
        };
        self.exchange == other.exchange
            && self.security_id == other.security_id
            && self.channel_no == other.channel_no
            && self.phase == other.phase
            && self.num_trades == other.num_trades
            && self.total_volume == other.total_volume
            && self.total_value == other.total_value
            && self.prev_close == other.prev_close
            && self.last_px == other.last_px
            && self.open_px == other.open_px
            && self.high_px == other.high_px
            && self.low_px == other.low_px
            && self.bid_weight_px == other.bid_weight_px
            && self.bid_weight_qty == other.bid_weight_qty
            && ask_weight_px_same
            && self.ask_weight_qty == other.ask_weight_qty
            && self.up_limit == other.up_limit
            && self.dn_limit == other.dn_limit
            && self.bid == other.bid
            && self.ask == other.ask
    }

    /// Lenient comparison for lossy feeds: levels, OHLC, and totals must
    /// agree; the weighted averages and phase are ignored.
    pub fn is_like(&self, other: &Snapshot) -> bool {
        self.exchange == other.exchange
            && self.security_id == other.security_id
            && self.channel_no == other.channel_no
            && self.num_trades == other.num_trades
            && self.total_volume == other.total_volume
            && self.total_value == other.total_value
            && self.prev_close == other.prev_close
            && self.last_px == other.last_px
            && self.open_px == other.open_px
            && self.high_px == other.high_px
            && self.low_px == other.low_px
            && self.up_limit == other.up_limit
            && self.dn_limit == other.dn_limit
            && self.bid == other.bid
            && self.ask == other.ask
    }
}

impl OrderBook {
    /// Emit at most one snapshot for the current state.
    ///
    /// Nothing is produced before the opening call or after close, nor
    /// in the `Ending` phase while the close price is still pending.
    pub(crate) fn gen_snap(&mut self) {
        debug_assert!(
            self.phase == Phase::VolatilityBreaking || self.hold.is_none(),
            "snapshot with an unresolved held order"
        );

        let snap = match self.phase {
            p if p < Phase::OpenCall || p > Phase::Ending => None,
            Phase::OpenCall | Phase::CloseCall => Some(self.build_call_snapshot()),
            Phase::VolatilityBreaking => Some(self.build_trading_snapshot(true)),
            Phase::Ending => self
                .close_px_ready
                .then(|| self.build_trading_snapshot(false)),
            _ => Some(self.build_trading_snapshot(false)),
        };
        let Some(mut snap) = snap else { return };

        snap.ask_weight_px_uncertain = self.ask_weight_px_uncertain;
        // An uncapped sell book can push the weighted price past any
        // sane field width; the exchange clips it the same way.
        snap.ask_weight_px = snap.ask_weight_px.min(i32::MAX as u64);

        if cfg!(debug_assertions)
            && snap.phase.is_continuous()
            && snap.ask[0].qty != 0
            && snap.bid[0].qty != 0
        {
            assert!(
                snap.ask[0].price > snap.bid[0].price,
                "{:06} crossed snapshot: bid {} / ask {}",
                self.security_id,
                snap.bid[0].price,
                snap.ask[0].price
            );
        }

        self.reconciler.on_rebuilt(snap.clone());
        self.emitted.push(snap);
    }

    /// Continuous-auction snapshot: top 10 visible levels per side and
    /// the running weighted averages. During a volatility break every
    /// level and weight reads zero.
    pub(crate) fn build_trading_snapshot(&self, breaking: bool) -> Snapshot {
        let mut bid = [SnapLevel::default(); SNAP_DEPTH];
        let mut ask = [SnapLevel::default(); SNAP_DEPTH];

        if !breaking {
            let mut lv = 0;
            for (p, q) in self.bids.iter_from_best() {
                if self.cage.bid_hidden_qty == 0 || p < self.cage.bid_hidden_price {
                    bid[lv] = SnapLevel {
                        price: self.scale_px(p),
                        qty: q,
                    };
                    lv += 1;
                    if lv >= SNAP_DEPTH {
                        break;
                    }
                }
            }
            let mut lv = 0;
            for (p, q) in self.asks.iter_from_best() {
                if self.cage.ask_hidden_qty == 0 || p > self.cage.ask_hidden_price {
                    ask[lv] = SnapLevel {
                        price: self.scale_px(p),
                        qty: q,
                    };
                    lv += 1;
                    if lv >= SNAP_DEPTH {
                        break;
                    }
                }
            }
        }

        let mut snap = self.snapshot_frame(bid, ask);
        if !breaking {
            snap.bid_weight_px = self.scale_px(Price(self.bid_weights.avg_px() as u32));
            snap.bid_weight_qty = self.bid_weights.qty;
            snap.ask_weight_px = self.scale_px(Price(self.ask_weights.avg_px() as u32));
            snap.ask_weight_qty = self.ask_weights.qty;
        }
        snap
    }

    /// Call-auction snapshot: a virtual uniform-price match over the
    /// current ladders, revealed as two levels per side (matched volume,
    /// then the unmatched residual at price zero).
    pub(crate) fn build_call_snapshot(&self) -> Snapshot {
        let reference = if self.num_trades == 0 {
            self.prev_close
        } else {
            self.last_px
        };
        let m = crate::auction::uniform_match(&self.bids, &self.asks, reference);

        let mut bid = [SnapLevel::default(); SNAP_DEPTH];
        let mut ask = [SnapLevel::default(); SNAP_DEPTH];
        if m.volume != 0 {
            let price = self.scale_px(m.price);
            ask[0] = SnapLevel {
                price,
                qty: m.volume,
            };
            ask[1] = SnapLevel {
                price: 0,
                qty: m.ask_leftover,
            };
            bid[0] = SnapLevel {
                price,
                qty: m.volume,
            };
            bid[1] = SnapLevel {
                price: 0,
                qty: m.bid_leftover,
            };
        } else if self.call_depth_debug {
            (bid, ask) = self.top_levels();
        }

        let mut snap = self.snapshot_frame(bid, ask);
        // SZSE publishes zero weights while a call auction is forming;
        // SSE reports them throughout.
        if self.exchange == Exchange::Sse {
            snap.bid_weight_px = self.scale_px(Price(self.bid_weights.avg_px() as u32));
            snap.bid_weight_qty = self.bid_weights.qty;
            snap.ask_weight_px = self.scale_px(Price(self.ask_weights.avg_px() as u32));
            snap.ask_weight_qty = self.ask_weights.qty;
        }
        snap
    }

    /// True top-N per side, for the debug reveal of an unmatched call.
    fn top_levels(&self) -> ([SnapLevel; SNAP_DEPTH], [SnapLevel; SNAP_DEPTH]) {
        let mut bid = [SnapLevel::default(); SNAP_DEPTH];
        let mut ask = [SnapLevel::default(); SNAP_DEPTH];
        for (slot, (p, q)) in bid.iter_mut().zip(self.bids.iter_from_best()) {
            *slot = SnapLevel {
                price: self.scale_px(p),
                qty: q,
            };
        }
        for (slot, (p, q)) in ask.iter_mut().zip(self.asks.iter_from_best()) {
            *slot = SnapLevel {
                price: self.scale_px(p),
                qty: q,
            };
        }
        (bid, ask)
    }

    /// Common frame: identity, constants, stats, and the timestamp.
    fn snapshot_frame(
        &self,
        bid: [SnapLevel; SNAP_DEPTH],
        ask: [SnapLevel; SNAP_DEPTH],
    ) -> Snapshot {
        Snapshot {
            exchange: self.exchange,
            security_id: self.security_id,
            channel_no: self.channel_no,
            phase: self.phase,
            transact_time: self.snap_transact_time(),
            num_trades: self.num_trades,
            total_volume: self.total_volume,
            total_value: self.total_value,
            prev_close: u64::from(self.prev_close.0) * self.scaling.preclose_div,
            last_px: self.scale_px(self.last_px),
            open_px: self.scale_px(self.open_px),
            high_px: self.scale_px(self.high_px),
            low_px: self.scale_px(self.low_px),
            bid_weight_px: 0,
            bid_weight_qty: 0,
            ask_weight_px: 0,
            ask_weight_qty: 0,
            up_limit: self.up_limit_raw,
            dn_limit: self.dn_limit_raw,
            bid,
            ask,
            ask_weight_px_uncertain: false,
        }
    }

    #[inline]
    pub(crate) fn scale_px(&self, price: Price) -> u64 {
        u64::from(price.0) * self.scaling.snap_price_mul
    }

    /// SZSE stamps date + intraday tick at 1 ms display precision; SSE
    /// stocks display seconds, SSE bonds milliseconds.
    fn snap_transact_time(&self) -> u64 {
        match self.exchange {
            Exchange::Szse => self.trade_date * 1_000_000_000 + self.current_tick * 10,
            Exchange::Sse => match self.instrument {
                crate::Instrument::Bond | crate::Instrument::Kzz => self.current_tick,
                _ => self.current_tick / 100,
            },
        }
    }
}
