//! Snapshot reconciliation: pairing rebuilt snapshots with the
//! exchange's own, keyed by cumulative trade count.
//!
//! The two streams drift freely in time (the exchange publishes on its
//! own cadence, the rebuild emits on every state change), so pairing is
//! by `num_trades`, with a one-second SZSE timestamp sanity check.
//! Either stream may arrive first; both sides keep buckets.

use std::collections::BTreeMap;

use tracing::{debug, error, warn};

use crate::market::Exchange;
use crate::phase::Phase;
use crate::snapshot::Snapshot;

/// Pairs rebuilt snapshots against exchange snapshots.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reconciler {
    exchange: Exchange,
    /// Rebuilt snapshots not yet claimed, by trade count. Kept even
    /// after a match: one rebuilt snapshot may pair with several
    /// exchange publications of the same state.
    #[cfg_attr(feature = "serde", serde(with = "serde_buckets"))]
    rebuilt: BTreeMap<u64, Vec<Snapshot>>,
    /// Exchange snapshots that found no rebuilt twin yet.
    #[cfg_attr(feature = "serde", serde(with = "serde_buckets"))]
    unmatched: BTreeMap<u64, Vec<Snapshot>>,
    /// Most recent rebuilt snapshot; matched without being consumed,
    /// since a tick-free stretch republishes the same state.
    last_rebuilt: Option<Snapshot>,
}

impl Reconciler {
    pub(crate) fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            rebuilt: BTreeMap::new(),
            unmatched: BTreeMap::new(),
            last_rebuilt: None,
        }
    }

    /// An exchange snapshot arrived: match it against the rebuilt
    /// stream, or park it for a rebuilt snapshot yet to come.
    pub(crate) fn on_market(&mut self, snap: &Snapshot) {
        if let Some(last) = &self.last_rebuilt {
            if snap.is_same(last) && ts_consistent(self.exchange, snap, last) {
                debug!(
                    "market snap @{} matches the last rebuilt snap @{}",
                    snap.transact_time, last.transact_time
                );
                self.drop_rebuilt_below(snap.num_trades);
                return;
            }
        }

        let matched = self
            .rebuilt
            .get(&snap.num_trades)
            .is_some_and(|bucket| {
                bucket
                    .iter()
                    .any(|twin| snap.is_same(twin) && ts_consistent(self.exchange, snap, twin))
            });
        if matched {
            debug!(
                "market snap @{} matches a history rebuilt snap",
                snap.transact_time
            );
            self.drop_rebuilt_below(snap.num_trades);
        } else {
            warn!(
                "market snap @{} (num_trades={}) not found among rebuilt snaps",
                snap.transact_time, snap.num_trades
            );
            self.unmatched
                .entry(snap.num_trades)
                .or_default()
                .push(snap.clone());
        }
    }

    /// A rebuilt snapshot was produced: claim any parked exchange
    /// snapshots it explains, then join the rebuilt bucket.
    pub(crate) fn on_rebuilt(&mut self, snap: Snapshot) {
        let exchange = self.exchange;
        if let Some(bucket) = self.unmatched.get_mut(&snap.num_trades) {
            let before = bucket.len();
            bucket.retain(|rcv| !(snap.is_same(rcv) && ts_consistent(exchange, rcv, &snap)));
            if bucket.len() != before {
                // The rebuild lagged the publication; worth noticing.
                warn!(
                    "rebuilt snap @{} matches {} earlier market snap(s)",
                    snap.transact_time,
                    before - bucket.len()
                );
            }
            if bucket.is_empty() {
                self.unmatched.remove(&snap.num_trades);
            }
        }

        self.rebuilt
            .entry(snap.num_trades)
            .or_default()
            .push(snap.clone());
        self.last_rebuilt = Some(snap);
    }

    /// Superseded rebuilt states can no longer match anything: every
    /// later exchange snapshot carries a higher trade count.
    fn drop_rebuilt_below(&mut self, num_trades: u64) {
        self.rebuilt = self.rebuilt.split_off(&num_trades);
    }

    /// Terminal check: every exchange snapshot found a rebuilt twin.
    pub(crate) fn is_drained(&self, security_id: u32) -> bool {
        if self.unmatched.is_empty() {
            return true;
        }
        error!(
            "{:06} {} unmatched market snapshot bucket(s):",
            security_id,
            self.unmatched.len()
        );
        for (num_trades, bucket) in self.unmatched.iter().take(3) {
            error!("  num_trades={num_trades}");
            for snap in bucket {
                error!("    @{}", snap.transact_time);
            }
        }
        if self.unmatched.len() > 3 {
            error!("  ......");
        }
        false
    }

    /// Number of parked exchange snapshots (diagnostics).
    pub fn unmatched_count(&self) -> usize {
        self.unmatched.values().map(Vec::len).sum()
    }
}

/// Timestamp sanity between an exchange snapshot and a rebuilt one.
/// Break phases republish stale times and are exempt. SZSE requires the
/// rebuilt second to be at most one past the exchange's; SSE carries
/// mixed time bases and is not checked.
fn ts_consistent(exchange: Exchange, market: &Snapshot, rebuilt: &Snapshot) -> bool {
    if market.phase == rebuilt.phase
        && (market.phase == Phase::PreTradingBreaking
            || market.phase == Phase::Breaking
            || market.phase >= Phase::Ending)
    {
        return true;
    }
    match exchange {
        Exchange::Szse => rebuilt.transact_time / 1_000 <= market.transact_time / 1_000 + 1,
        Exchange::Sse => true,
    }
}

#[cfg(feature = "serde")]
mod serde_buckets {
    //! `BTreeMap<u64, Vec<Snapshot>>` as ordered pairs (JSON maps
    //! cannot key on integers).
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::snapshot::Snapshot;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<u64, Vec<Snapshot>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&u64, &Vec<Snapshot>)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u64, Vec<Snapshot>>, D::Error> {
        let pairs = Vec::<(u64, Vec<Snapshot>)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{SNAP_DEPTH, SnapLevel};

    fn snap(num_trades: u64, transact_time: u64, last_px: u64) -> Snapshot {
        Snapshot {
            exchange: Exchange::Szse,
            security_id: 1,
            channel_no: 2013,
            phase: Phase::AmTrading,
            transact_time,
            num_trades,
            total_volume: 0,
            total_value: 0,
            prev_close: 0,
            last_px,
            open_px: 0,
            high_px: 0,
            low_px: 0,
            bid_weight_px: 0,
            bid_weight_qty: 0,
            ask_weight_px: 0,
            ask_weight_qty: 0,
            up_limit: 0,
            dn_limit: 0,
            bid: [SnapLevel::default(); SNAP_DEPTH],
            ask: [SnapLevel::default(); SNAP_DEPTH],
            ask_weight_px_uncertain: false,
        }
    }

    #[test]
    fn rebuilt_then_market_drains() {
        let mut rec = Reconciler::new(Exchange::Szse);
        rec.on_rebuilt(snap(7, 20230601_093000_000, 100));
        rec.on_market(&snap(7, 20230601_093001_500, 100));
        assert!(rec.is_drained(1));
    }

    #[test]
    fn market_then_rebuilt_drains() {
        let mut rec = Reconciler::new(Exchange::Szse);
        rec.on_market(&snap(7, 20230601_093001_500, 100));
        assert_eq!(rec.unmatched_count(), 1);
        rec.on_rebuilt(snap(7, 20230601_093000_000, 100));
        assert!(rec.is_drained(1));
        assert_eq!(rec.unmatched_count(), 0);
    }

    #[test]
    fn field_mismatch_stays_unmatched() {
        let mut rec = Reconciler::new(Exchange::Szse);
        rec.on_rebuilt(snap(7, 20230601_093000_000, 100));
        rec.on_market(&snap(7, 20230601_093001_500, 999));
        assert!(!rec.is_drained(1));
    }

    #[test]
    fn rebuilt_more_than_a_second_late_is_rejected() {
        let mut rec = Reconciler::new(Exchange::Szse);
        rec.on_rebuilt(snap(7, 20230601_093005_000, 100));
        rec.on_market(&snap(7, 20230601_093001_000, 100));
        assert!(!rec.is_drained(1));
    }

    #[test]
    fn last_rebuilt_matches_repeatedly() {
        // A tick-free stretch: the exchange republishes the same state
        // and the single rebuilt snapshot must satisfy each one.
        let mut rec = Reconciler::new(Exchange::Szse);
        rec.on_rebuilt(snap(7, 20230601_093000_000, 100));
        rec.on_market(&snap(7, 20230601_093001_000, 100));
        rec.on_market(&snap(7, 20230601_093004_000, 100));
        rec.on_market(&snap(7, 20230601_093007_000, 100));
        assert!(rec.is_drained(1));
    }

    #[test]
    fn older_rebuilt_buckets_dropped_on_match() {
        let mut rec = Reconciler::new(Exchange::Szse);
        rec.on_rebuilt(snap(3, 20230601_093000_000, 90));
        rec.on_rebuilt(snap(7, 20230601_093002_000, 100));
        rec.on_market(&snap(7, 20230601_093003_000, 100));
        assert!(rec.rebuilt.contains_key(&7));
        assert!(!rec.rebuilt.contains_key(&3));
    }

    #[test]
    fn break_phase_skips_timestamp_check() {
        let mut rec = Reconciler::new(Exchange::Szse);
        let mut rebuilt = snap(7, 20230601_113000_000, 100);
        rebuilt.phase = Phase::Breaking;
        let mut market = snap(7, 20230601_112000_000, 100);
        market.phase = Phase::Breaking;
        rec.on_rebuilt(rebuilt);
        rec.on_market(&market);
        assert!(rec.is_drained(1));
    }
}
