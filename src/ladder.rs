//! Ladder: one side of the book as an ordered map price → aggregate qty.
//!
//! The `BTreeMap` gives O(log n) insert/remove with ordered traversal in
//! both directions; the best price/qty pair is cached so the hot paths
//! never touch the tree. The cache deliberately keeps a *stale price*
//! when the side drains: `best_qty == 0` means empty, and the last best
//! price stays readable because the call-auction cursor and the cage
//! reference updates compare against it.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use crate::side::Side;
use crate::types::{Price, Qty};

/// Outcome of an insert, for the caller's cage bookkeeping.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LevelAdd {
    /// A new price level was created.
    pub created: bool,
    /// The new level became the cached best (visible inserts only).
    pub new_best: bool,
}

/// Outcome of a decrement.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LevelDrain {
    /// The level reached zero and was removed.
    pub emptied: bool,
    /// The touched price was the cached best on entry.
    pub was_best: bool,
}

/// One side of the order book: aggregate quantity per price level.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ladder {
    side: Side,
    #[cfg_attr(feature = "serde", serde(with = "serde_levels"))]
    levels: BTreeMap<Price, Qty>,
    /// Cached best price. Stale (but kept) while `best_qty == 0`.
    best_price: Price,
    /// Cached best quantity; zero means the visible side is empty.
    best_qty: Qty,
}

impl Ladder {
    /// Create an empty ladder for the given side.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            best_price: Price::ZERO,
            best_qty: 0,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// True if no price levels exist at all, hidden ones included.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of distinct price levels, hidden ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Cached best price. Meaningful only while [`Ladder::best_qty`] is
    /// non-zero; retains its last value afterwards.
    #[inline]
    pub fn best_price(&self) -> Price {
        self.best_price
    }

    /// Cached best quantity; zero when the visible side is empty.
    #[inline]
    pub fn best_qty(&self) -> Qty {
        self.best_qty
    }

    /// Aggregate quantity at a price, if the level exists.
    pub fn get(&self, price: Price) -> Option<Qty> {
        self.levels.get(&price).copied()
    }

    /// True if a level exists at this price.
    pub fn contains(&self, price: Price) -> bool {
        self.levels.contains_key(&price)
    }

    /// Sum of all level quantities, hidden ones included.
    pub fn total_qty(&self) -> Qty {
        self.levels.values().sum()
    }

    /// True if `a` is more aggressive than `b` on this side.
    #[inline]
    fn better(&self, a: Price, b: Price) -> bool {
        match self.side {
            Side::Bid => a > b,
            Side::Ask => a < b,
        }
    }

    /// Add quantity at a price, creating the level if absent.
    ///
    /// `visible` is false for cage-hidden orders: the level is stored but
    /// may not claim the cached best. Adding onto an *existing* level at
    /// the cached best price always bumps the cached quantity, since the
    /// level's visibility cannot change after creation.
    pub(crate) fn insert_or_add(&mut self, price: Price, qty: Qty, visible: bool) -> LevelAdd {
        if let Some(level) = self.levels.get_mut(&price) {
            *level += qty;
            if price == self.best_price {
                self.best_qty += qty;
            }
            LevelAdd {
                created: false,
                new_best: false,
            }
        } else {
            self.levels.insert(price, qty);
            let new_best = visible && (self.best_qty == 0 || self.better(price, self.best_price));
            if new_best {
                self.best_price = price;
                self.best_qty = qty;
            }
            LevelAdd {
                created: true,
                new_best,
            }
        }
    }

    /// Subtract quantity at a price; the level is removed the moment it
    /// reaches zero and the cached best refreshed from the next worse
    /// level (keeping a stale price when none remains).
    ///
    /// Returns `None` when no level exists at the price.
    pub(crate) fn decrement(&mut self, price: Price, qty: Qty) -> Option<LevelDrain> {
        let level = self.levels.get_mut(&price)?;
        let was_best = price == self.best_price;
        *level = level.saturating_sub(qty);
        if was_best {
            self.best_qty = self.best_qty.saturating_sub(qty);
        }
        let emptied = *level == 0;
        if emptied {
            self.levels.remove(&price);
            if was_best {
                self.best_qty = 0;
                if let Some((p, q)) = self.next_worse(price) {
                    self.best_price = p;
                    self.best_qty = q;
                }
            }
        }
        Some(LevelDrain { emptied, was_best })
    }

    /// Remove a whole level (valid-band purge). Keeps the cached best
    /// coherent when the removed level was it.
    pub(crate) fn remove(&mut self, price: Price) -> Option<Qty> {
        let qty = self.levels.remove(&price)?;
        if price == self.best_price && self.best_qty != 0 {
            self.recompute_best();
        }
        Some(qty)
    }

    /// Overwrite the cached best (cage promotion of a hidden level).
    pub(crate) fn set_best(&mut self, price: Price, qty: Qty) {
        self.best_price = price;
        self.best_qty = qty;
    }

    /// Re-derive the cached best from the tree extremum (cage opening).
    pub(crate) fn recompute_best(&mut self) {
        let extremum = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        match extremum {
            Some((&p, &q)) => {
                self.best_price = p;
                self.best_qty = q;
            }
            None => self.best_qty = 0,
        }
    }

    /// The closest level strictly less aggressive than `price`
    /// (next lower for bids, next higher for asks).
    pub fn next_worse(&self, price: Price) -> Option<(Price, Qty)> {
        let entry = match self.side {
            Side::Bid => self.levels.range(..price).next_back(),
            Side::Ask => self.levels.range((Excluded(price), Unbounded)).next(),
        };
        entry.map(|(&p, &q)| (p, q))
    }

    /// The closest level strictly more aggressive than `price`
    /// (next higher for bids, next lower for asks). Used to walk the
    /// cage-hidden region from its boundary inward.
    pub fn next_better(&self, price: Price) -> Option<(Price, Qty)> {
        let entry = match self.side {
            Side::Bid => self.levels.range((Excluded(price), Unbounded)).next(),
            Side::Ask => self.levels.range(..price).next_back(),
        };
        entry.map(|(&p, &q)| (p, q))
    }

    /// Iterate levels from most to least aggressive.
    pub fn iter_from_best(&self) -> impl Iterator<Item = (Price, Qty)> + '_ {
        let (fwd, rev) = match self.side {
            Side::Ask => (Some(self.levels.iter()), None),
            Side::Bid => (None, Some(self.levels.iter().rev())),
        };
        fwd.into_iter()
            .flatten()
            .chain(rev.into_iter().flatten())
            .map(|(&p, &q)| (p, q))
    }
}

#[cfg(feature = "serde")]
mod serde_levels {
    //! `BTreeMap<Price, Qty>` as `Vec<(Price, Qty)>`: JSON maps cannot
    //! key on integers.
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::{Price, Qty};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Price, Qty>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(Price, Qty)> = map.iter().map(|(&p, &q)| (p, q)).collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Price, Qty>, D::Error> {
        let pairs = Vec::<(Price, Qty)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
