// Allow our yuan.fen digit grouping convention (e.g., 10_00 = ¥10.00 at 2 dp)
#![allow(clippy::inconsistent_digit_grouping)]

//! # sinobook
//!
//! A deterministic Level-10 limit-order-book reconstructor for Chinese
//! equity markets (SZSE and SSE), covering stocks, funds, convertible
//! bonds, and exchange bonds.
//!
//! The book consumes the exchange's tick-by-tick feed (add-orders,
//! executions, cancels) plus reference snapshots, and re-derives the
//! matcher's internal state precisely enough that the snapshots it emits
//! are bit-identical to the exchange's own for the same trade count.
//!
//! ## What it handles
//!
//! - **Order types**: limit, market, own-side-best, best-5-IOC patterns
//! - **Sessions**: opening/closing call auctions with uniform-price
//!   virtual matching, continuous auctions, volatility breaks
//! - **ChiNext price cage**: hidden-order bookkeeping, promotion, and
//!   cage opening, including IPO-day instruments with no price limits
//! - **Precision**: per-venue fixed-point scaling, 25-bit internal
//!   prices with overflow clamping
//! - **Cross-checking**: a trade-count-keyed reconciler that pairs every
//!   exchange snapshot with a rebuilt twin
//!
//! ## Quick start
//!
//! ```
//! use sinobook::{
//!     AddOrder, Exchange, Instrument, Message, OrderBook, OrderKind, Phase, Side, SnapLevel,
//!     Snapshot,
//! };
//!
//! let mut book = OrderBook::new(000_001, Exchange::Szse, Instrument::Stock).unwrap();
//!
//! // The day's constants arrive in a pre-open reference snapshot.
//! let constants = Snapshot {
//!     exchange: Exchange::Szse,
//!     security_id: 000_001,
//!     channel_no: 2013,
//!     phase: Phase::Starting,
//!     transact_time: 20230601_080000_000,
//!     num_trades: 0,
//!     total_volume: 0,
//!     total_value: 0,
//!     prev_close: 10_0000,      // ¥10.00 at 4 dp
//!     last_px: 0,
//!     open_px: 0,
//!     high_px: 0,
//!     low_px: 0,
//!     bid_weight_px: 0,
//!     bid_weight_qty: 0,
//!     ask_weight_px: 0,
//!     ask_weight_qty: 0,
//!     up_limit: 11_000000,      // ¥11.00 at 6 dp
//!     dn_limit: 9_000000,
//!     bid: [SnapLevel::default(); 10],
//!     ask: [SnapLevel::default(); 10],
//!     ask_weight_px_uncertain: false,
//! };
//! book.on_message(&Message::Snap(sinobook::RefSnapshot {
//!     snap: constants,
//!     tradable: true,
//! }))
//! .unwrap();
//!
//! // A resting bid during continuous trading emits a Level-10 snapshot.
//! book.on_message(&Message::Order(AddOrder {
//!     exchange: Exchange::Szse,
//!     security_id: 000_001,
//!     appl_seq_num: 1,
//!     side: Side::Bid,
//!     kind: OrderKind::Limit,
//!     price: 10_0000,           // ¥10.00 at 4 dp
//!     qty: 100,
//!     transact_time: 20230601_093001_000,
//!     phase: Phase::AmTrading,
//! }))
//! .unwrap();
//!
//! let snaps = book.drain_snapshots();
//! assert_eq!(snaps.last().unwrap().bid[0].price, 10_000000); // 6 dp
//! assert_eq!(snaps.last().unwrap().bid[0].qty, 100);
//! ```
//!
//! ## Determinism and threading
//!
//! A book is a plain value: no locks, no atomics, no I/O. Every effect
//! of [`OrderBook::on_message`] completes before it returns. Run one
//! book per instrument and pin instruments to workers for parallelism.

mod auction;
mod book;
mod cage;
mod error;
mod ladder;
mod market;
mod matching;
mod message;
mod order;
#[cfg(feature = "persistence")]
mod persistence;
mod phase;
mod reconcile;
mod session;
mod side;
mod snapshot;
mod types;

// Re-export public API
pub use book::OrderBook;
pub use cage::CageState;
pub use error::BookError;
pub use ladder::Ladder;
pub use market::{Exchange, Instrument, Scaling};
pub use message::{AddOrder, ExecKind, Execution, Message, OrderKind, RefSnapshot, Signal};
pub use order::RestingOrder;
pub use phase::Phase;
pub use reconcile::Reconciler;
pub use side::Side;
pub use snapshot::{SnapLevel, Snapshot};
pub use types::{
    LEVEL_QTY_BITS, PRICE_BITS, PRICE_MAX, PRICE_OVERFLOW_SENTINEL, Price, QTY_BITS, Qty, SEQ_BITS,
    SeqNum, TIMESTAMP_BITS, Timestamp,
};
