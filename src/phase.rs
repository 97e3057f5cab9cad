//! Market session phases.
//!
//! The numeric order matters: the session controller compares phases
//! (`phase < OpenCall` suppresses snapshots, `phase >= AmTrading` flips
//! the weight-accounting mode), so the enum derives `Ord` with the
//! exchange's own progression.

use std::fmt;

/// Trading phase of the market, as reported by ticks and snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Pre-open; reference snapshots carry the day's constants.
    Starting = 0,
    /// Opening call auction (9:15–9:25).
    OpenCall = 1,
    /// Gap between the opening call and continuous trading (9:25–9:30).
    PreTradingBreaking = 2,
    /// Morning continuous auction (9:30–11:30).
    AmTrading = 3,
    /// Lunch break (11:30–13:00).
    Breaking = 4,
    /// Afternoon continuous auction (13:00–14:57).
    PmTrading = 5,
    /// Closing call auction (14:57–15:00).
    CloseCall = 6,
    /// Temporary halt after an excessive price move; the book freezes
    /// display but keeps accepting resting orders.
    VolatilityBreaking = 7,
    /// Market closed, close price settled or pending.
    Ending = 8,
    /// Instrument suspended.
    HangingUp = 9,
}

impl Phase {
    /// Returns true for the two call-auction phases.
    #[inline]
    pub fn is_call(self) -> bool {
        matches!(self, Phase::OpenCall | Phase::CloseCall)
    }

    /// Returns true for the two continuous-auction phases.
    #[inline]
    pub fn is_continuous(self) -> bool {
        matches!(self, Phase::AmTrading | Phase::PmTrading)
    }

    /// Classify an intraday timestamp (HHMMSSmmm, milliseconds) the way
    /// the exchange stamps its ticks. Order timestamps never land exactly
    /// on 9:25:00 or 15:00:00; executions at those instants belong to the
    /// call auction that just ended, which this mapping reflects by
    /// keeping them in the call phase's successor.
    pub fn from_intraday_ms(hhmmssmmm: u64) -> Phase {
        match hhmmssmmm {
            t if t < 91_500_000 => Phase::Starting,
            t if t < 92_500_000 => Phase::OpenCall,
            t if t < 93_000_000 => Phase::PreTradingBreaking,
            t if t < 113_000_000 => Phase::AmTrading,
            t if t < 130_000_000 => Phase::Breaking,
            t if t < 145_700_000 => Phase::PmTrading,
            t if t < 150_000_000 => Phase::CloseCall,
            _ => Phase::Ending,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Starting => "starting",
            Phase::OpenCall => "open-call",
            Phase::PreTradingBreaking => "pre-trading-break",
            Phase::AmTrading => "am-trading",
            Phase::Breaking => "breaking",
            Phase::PmTrading => "pm-trading",
            Phase::CloseCall => "close-call",
            Phase::VolatilityBreaking => "volatility-breaking",
            Phase::Ending => "ending",
            Phase::HangingUp => "hanging-up",
        };
        f.write_str(s)
    }
}
