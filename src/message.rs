//! Semantic feed messages consumed by the book.
//!
//! Raw wire decoding happens upstream; the core dispatches on one tagged
//! union of plain records. Only the fields the reconstruction reads are
//! carried.

use crate::market::Exchange;
use crate::phase::Phase;
use crate::snapshot::Snapshot;
use crate::side::Side;
use crate::types::{Qty, Timestamp};

/// Order sub-type as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrderKind {
    /// Priced order.
    Limit,
    /// Market order: price is assigned by the fills it takes.
    Market,
    /// Own-side-best: resolves to a limit at the submitter's side best.
    OwnSideBest,
    /// SSE delete record; routed to the cancel handler. SZSE cancels
    /// arrive as executions instead.
    Cancel,
}

/// SZSE execution sub-type (`F` = fill, `4` = cancel). SSE executions
/// are always fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecKind {
    Fill,
    Cancel,
}

/// One tick-by-tick order record.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddOrder {
    pub exchange: Exchange,
    pub security_id: u32,
    /// Channel-scoped sequence number (64-bit on the wire, 32-bit once
    /// inside the book).
    pub appl_seq_num: u64,
    pub side: Side,
    pub kind: OrderKind,
    /// Raw wire price (SZSE 4 dp, SSE 3 dp); normalized on ingress.
    pub price: u64,
    pub qty: Qty,
    pub transact_time: Timestamp,
    /// Phase the decoder stamped from the tick's timestamp.
    pub phase: Phase,
}

/// One tick-by-tick execution record.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Execution {
    pub exchange: Exchange,
    pub security_id: u32,
    pub appl_seq_num: u64,
    /// Sequence of the buy order (0 on an SZSE ask-cancel).
    pub bid_seq: u64,
    /// Sequence of the sell order (0 on an SZSE bid-cancel).
    pub offer_seq: u64,
    /// Raw wire price; zero for cancels.
    pub last_px: u64,
    pub last_qty: Qty,
    pub kind: ExecKind,
    pub transact_time: Timestamp,
    pub phase: Phase,
}

/// An exchange-published Level-10 snapshot, used for the day's constants
/// and for cross-checking the rebuilt stream.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefSnapshot {
    pub snap: Snapshot,
    /// Instrument trading status flag from the snapshot header. SZSE
    /// instruments in the replay set are always tradable; SSE reports
    /// non-tradable until 9:14.
    pub tradable: bool,
}

/// Session-boundary signals injected by the dispatcher where the feed
/// has no tick to mark the transition (open call with no match, lunch
/// break, close).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Signal {
    OpenCallBegin,
    OpenCallEnd,
    AmBegin,
    AmEnd,
    PmBegin,
    PmEnd,
    AllEnd,
}

/// Everything the book consumes, as one tagged union.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    Order(AddOrder),
    Exec(Execution),
    Snap(RefSnapshot),
    Signal(Signal),
}
