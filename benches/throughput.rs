// Allow our yuan.fen digit grouping convention (e.g., 10_0000 = ¥10.00 at 4 dp)
#![allow(clippy::inconsistent_digit_grouping)]

//! Replay throughput benchmarks.
//!
//! Measures end-to-end message application: resting orders, cancels,
//! and a continuous-trading fill pattern, snapshots included.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sinobook::{
    AddOrder, ExecKind, Exchange, Execution, Instrument, Message, OrderBook, OrderKind, Phase,
    RefSnapshot, Side, SnapLevel, Snapshot,
};

const SEC: u32 = 000_001;

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

fn order(seq: u64, side: Side, price: u64, qty: u64, time: u64) -> Message {
    Message::Order(AddOrder {
        exchange: Exchange::Szse,
        security_id: SEC,
        appl_seq_num: seq,
        side,
        kind: OrderKind::Limit,
        price,
        qty,
        transact_time: time,
        phase: Phase::AmTrading,
    })
}

fn cancel(seq: u64, bid_seq: u64, offer_seq: u64, qty: u64, time: u64) -> Message {
    Message::Exec(Execution {
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
    })
}

/// A resting-order stream spread over `levels` prices per side, with
/// every order cancelled at the end.
fn add_cancel_stream(levels: u64, per_level: u64) -> Vec<Message> {
    let mut stream = vec![constants()];
    let mut seq = 0;
    let mut time = 20230601_093000_000u64;

    for round in 0..per_level {
        for i in 0..levels {
            seq += 1;
            time += 10;
            stream.push(order(seq, Side::Bid, 9_9000 - i * 100, 100 + round, time));
            seq += 1;
            time += 10;
            stream.push(order(seq, Side::Ask, 10_0100 + i * 100, 100 + round, time));
        }
    }
    let placed = seq;
    for target in 1..=placed {
        seq += 1;
        time += 10;
        let (bid_seq, offer_seq) = if target % 2 == 1 { (target, 0) } else { (0, target) };
        let qty = 100 + (target - 1) / (levels * 2);
        stream.push(cancel(seq, bid_seq, offer_seq, qty, time));
    }
    stream
}

fn replay(stream: &[Message]) -> usize {
    let mut book = OrderBook::new(SEC, Exchange::Szse, Instrument::Stock).unwrap();
    for msg in stream {
        book.on_message(msg).unwrap();
    }
    book.drain_snapshots().len()
}

fn bench_add_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_cancel");
    for levels in [10u64, 50, 200] {
        let stream = add_cancel_stream(levels, 4);
        group.throughput(Throughput::Elements(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(levels), &stream, |b, stream| {
            b.iter(|| black_box(replay(stream)));
        });
    }
    group.finish();
}

fn bench_crossing_fills(c: &mut Criterion) {
    // Ask stack consumed by repeated held-bid fills.
    let mut stream = vec![constants()];
    let mut seq = 0;
    let mut time = 20230601_093000_000u64;
    for i in 0..500u64 {
        seq += 1;
        time += 10;
        stream.push(order(seq, Side::Ask, 10_0100 + i * 100, 100, time));
    }
    for i in 0..500u64 {
        let offer = i + 1;
        seq += 1;
        time += 10;
        stream.push(order(seq, Side::Bid, 10_0100 + i * 100, 100, time));
        let bid = seq;
        seq += 1;
        time += 10;
        stream.push(Message::Exec(Execution {
            exchange: Exchange::Szse,
            security_id: SEC,
            appl_seq_num: seq,
            bid_seq: bid,
            offer_seq: offer,
            last_px: 10_0100 + i * 100,
            last_qty: 100,
            kind: ExecKind::Fill,
            transact_time: time,
            phase: Phase::AmTrading,
        }));
    }

    let mut group = c.benchmark_group("crossing_fills");
    group.throughput(Throughput::Elements(stream.len() as u64));
    group.bench_function("500_levels", |b| {
        b.iter(|| black_box(replay(&stream)));
    });
    group.finish();
}

criterion_group!(benches, bench_add_cancel, bench_crossing_fills);
criterion_main!(benches);
