//! Angular basis descriptors.
//!
//! The full state vector is split into disjoint, ordered angular blocks, one
//! per `(l, m)` pair; a wavefunction is stored as a 2D array indexed by
//! `[angular block, radial coordinate]`.

use std::collections::BTreeSet;

/// Orbital angular momentum `l` and its projection `m` labelling one angular
/// block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LmIndex {
    pub l: i32,
    pub m: i32,
}

impl LmIndex {
    pub fn new(l: i32, m: i32) -> Self { Self { l, m } }
}

/// Ordered list of angular blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AngularBasis {
    blocks: Vec<LmIndex>,
}

impl AngularBasis {
    /// Create from an explicit block list.
    pub fn new(blocks: Vec<LmIndex>) -> Self { Self { blocks } }

    /// All `l` in `0..=lmax` at a single fixed `m` (blocks with `l < |m|` are
    /// omitted).
    pub fn fixed_m(lmax: i32, m: i32) -> Self {
        let blocks
            = (m.abs()..=lmax)
            .map(|l| LmIndex::new(l, m))
            .collect();
        Self { blocks }
    }

    /// Every `(l, m)` with `l <= lmax`, ordered by `l` then `m`.
    pub fn full(lmax: i32) -> Self {
        let blocks
            = (0..=lmax)
            .flat_map(|l| (-l..=l).map(move |m| LmIndex::new(l, m)))
            .collect();
        Self { blocks }
    }

    /// Number of angular blocks.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize { self.blocks.len() }

    /// Get the label of block `ang_idx`.
    pub fn get(&self, ang_idx: usize) -> Option<LmIndex> {
        self.blocks.get(ang_idx).copied()
    }

    /// Iterate over `(ang_idx, label)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, LmIndex)> + '_ {
        self.blocks.iter().copied().enumerate()
    }

    /// Largest `l` present (`0` for an empty basis).
    pub fn lmax(&self) -> i32 {
        self.blocks.iter().map(|lm| lm.l).max().unwrap_or(0)
    }

    /// Sorted, deduplicated `l` values.
    pub fn l_values(&self) -> Vec<i32> {
        self.blocks.iter().map(|lm| lm.l)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted, deduplicated `m` values.
    pub fn m_values(&self) -> Vec<i32> {
        self.blocks.iter().map(|lm| lm.m)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
