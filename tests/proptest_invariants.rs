// Allow our yuan.fen digit grouping convention (e.g., 10_0000 = ¥10.00 at 4 dp)
#![allow(clippy::inconsistent_digit_grouping)]

//! Property-based tests for reconstruction invariants.
//!
//! Random non-crossing order flow with interleaved cancels, checked
//! against the invariants the book promises at every call boundary.

use proptest::prelude::*;
use sinobook::{
    AddOrder, ExecKind, Exchange, Execution, Instrument, Message, OrderBook, OrderKind, Phase,
    RefSnapshot, Side, SnapLevel, Snapshot,
};

const SEC: u32 = 000_002;

/// One step of the generated flow.
#[derive(Clone, Debug)]
enum Step {
    /// Rest a bid in 9.00..=9.99 (never crosses the asks).
    Bid { price_off: u32, qty: u64 },
    /// Rest an ask in 10.01..=11.00.
    Ask { price_off: u32, qty: u64 },
    /// Cancel a live order, picked by index.
    Cancel { pick: usize },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u32..100, 1u64..=5_000).prop_map(|(price_off, qty)| Step::Bid { price_off, qty }),
        (0u32..100, 1u64..=5_000).prop_map(|(price_off, qty)| Step::Ask { price_off, qty }),
        (0usize..64).prop_map(|pick| Step::Cancel { pick }),
    ]
}

fn constants() -> Message {
    Message::Snap(RefSnapshot {
        snap: Snapshot {
            exchange: Exchange::Szse,
            security_id: SEC,
            channel_no: 2013,
            phase: Phase::Starting,
            transact_time: 20230601_080000_000,
            num_trades: 0,
            total_volume: 0,
            total_value: 0,
            prev_close: 10_0000,
            last_px: 0,
            open_px: 0,
            high_px: 0,
            low_px: 0,
            bid_weight_px: 0,
            bid_weight_qty: 0,
            ask_weight_px: 0,
            ask_weight_qty: 0,
            up_limit: 11_000000,
            dn_limit: 9_000000,
            bid: [SnapLevel::default(); 10],
            ask: [SnapLevel::default(); 10],
            ask_weight_px_uncertain: false,
        },
        tradable: true,
    })
}

/// Replay a generated flow; returns the book and the live (seq, side,
/// price, qty) records for cross-checking.
fn replay(steps: &[Step]) -> (OrderBook, Vec<(u64, Side, u64, u64)>) {
    let mut book = OrderBook::new(SEC, Exchange::Szse, Instrument::Stock).unwrap();
    book.on_message(&constants()).unwrap();

    let mut live: Vec<(u64, Side, u64, u64)> = Vec::new();
    let mut seq: u64 = 0;
    let mut time = 20230601_093000_000u64;

    for step in steps {
        seq += 1;
        time += 10;
        match step {
            Step::Bid { price_off, qty } => {
                let price = (9_0000 + price_off * 100) as u64;
                book.on_message(&Message::Order(AddOrder {
                    exchange: Exchange::Szse,
                    security_id: SEC,
                    appl_seq_num: seq,
                    side: Side::Bid,
                    kind: OrderKind::Limit,
                    price,
                    qty: *qty,
                    transact_time: time,
                    phase: Phase::AmTrading,
                }))
                .unwrap();
                live.push((seq, Side::Bid, price, *qty));
            }
            Step::Ask { price_off, qty } => {
                let price = (10_0100 + price_off * 100) as u64;
                book.on_message(&Message::Order(AddOrder {
                    exchange: Exchange::Szse,
                    security_id: SEC,
                    appl_seq_num: seq,
                    side: Side::Ask,
                    kind: OrderKind::Limit,
                    price,
                    qty: *qty,
                    transact_time: time,
                    phase: Phase::AmTrading,
                }))
                .unwrap();
                live.push((seq, Side::Ask, price, *qty));
            }
            Step::Cancel { pick } => {
                if live.is_empty() {
                    continue;
                }
                let (target, side, _, qty) = live.remove(pick % live.len());
                let (bid_seq, offer_seq) = match side {
                    Side::Bid => (target, 0),
                    Side::Ask => (0, target),
                };
                book.on_message(&Message::Exec(Execution {
                    exchange: Exchange::Szse,
                    security_id: SEC,
                    appl_seq_num: seq,
                    bid_seq,
                    offer_seq,
                    last_px: 0,
                    last_qty: qty,
                    kind: ExecKind::Cancel,
                    transact_time: time,
                    phase: Phase::AmTrading,
                }))
                .unwrap();
            }
        }
    }
    (book, live)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Cached best equals the ladder extremum, and its quantity the
    /// level aggregate, after any flow.
    #[test]
    fn cached_best_matches_ladder(steps in prop::collection::vec(step_strategy(), 1..80)) {
        let (book, _) = replay(&steps);

        if book.bids().best_qty() != 0 {
            let (p, q) = book.bids().iter_from_best().next().unwrap();
            prop_assert_eq!(book.bids().best_price(), p);
            prop_assert_eq!(book.bids().best_qty(), q);
        }
        if book.asks().best_qty() != 0 {
            let (p, q) = book.asks().iter_from_best().next().unwrap();
            prop_assert_eq!(book.asks().best_price(), p);
            prop_assert_eq!(book.asks().best_qty(), q);
        }
    }

    /// The incremental weight aggregates equal a fresh sum over levels.
    #[test]
    fn weights_match_static_sum(steps in prop::collection::vec(step_strategy(), 1..80)) {
        let (book, _) = replay(&steps);

        let bid_qty: u64 = book.bids().iter_from_best().map(|(_, q)| q).sum();
        let bid_value: u128 = book
            .bids()
            .iter_from_best()
            .map(|(p, q)| u128::from(p.0) * u128::from(q))
            .sum();
        prop_assert_eq!(book.bid_weight_qty(), bid_qty);
        prop_assert_eq!(book.bid_weight_value(), bid_value);

        let ask_qty: u64 = book.asks().iter_from_best().map(|(_, q)| q).sum();
        let ask_value: u128 = book
            .asks()
            .iter_from_best()
            .map(|(p, q)| u128::from(p.0) * u128::from(q))
            .sum();
        prop_assert_eq!(book.ask_weight_qty(), ask_qty);
        prop_assert_eq!(book.ask_weight_value(), ask_value);
    }

    /// The book never crosses during continuous trading, every level is
    /// strictly positive, and the hold slot stays empty for pure
    /// resting flow.
    #[test]
    fn book_shape_invariants(steps in prop::collection::vec(step_strategy(), 1..80)) {
        let (book, live) = replay(&steps);

        if book.bids().best_qty() != 0 && book.asks().best_qty() != 0 {
            prop_assert!(book.bids().best_price() < book.asks().best_price());
        }
        for (_, q) in book.bids().iter_from_best() {
            prop_assert!(q > 0);
        }
        for (_, q) in book.asks().iter_from_best() {
            prop_assert!(q > 0);
        }
        prop_assert!(!book.holding());
        prop_assert_eq!(book.order_count(), live.len());
    }

    /// Emitted trading snapshots mirror the top of the ladder exactly.
    #[test]
    fn snapshots_mirror_the_ladder(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let (mut book, _) = replay(&steps);

        let snaps = book.drain_snapshots();
        // A flow of cancels against an empty book emits nothing.
        let Some(snap) = snaps.last() else {
            return Ok(());
        };

        for (slot, (p, q)) in snap.bid.iter().zip(book.bids().iter_from_best()) {
            prop_assert_eq!(slot.price, u64::from(p.0) * 10_000);
            prop_assert_eq!(slot.qty, q);
        }
        for (slot, (p, q)) in snap.ask.iter().zip(book.asks().iter_from_best()) {
            prop_assert_eq!(slot.price, u64::from(p.0) * 10_000);
            prop_assert_eq!(slot.qty, q);
        }
    }

    /// A SZSE flow replayed against its own emitted snapshots as the
    /// "exchange" stream reconciles to a drained state.
    #[test]
    fn self_reconciliation_drains(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let (mut book, _) = replay(&steps);

        let snaps = book.drain_snapshots();
        for snap in &snaps {
            let mut market = snap.clone();
            market.transact_time += 1_000;
            book.on_message(&Message::Snap(RefSnapshot { snap: market, tradable: true }))
                .unwrap();
        }
        prop_assert!(book.reconciled());
    }
}
