//! Core affinity masks

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of worker cores a mask can describe.
pub const MAX_CORES: usize = 64;

/// Set of worker cores allowed to run an action or task.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Affinity(u64);

impl Affinity {
    /// Every core.
    #[inline]
    pub const fn all() -> Self {
        Affinity(u64::MAX)
    }

    /// No core.
    #[inline]
    pub const fn none() -> Self {
        Affinity(0)
    }

    /// Exactly one core.
    #[inline]
    pub fn single(core: usize) -> Self {
        Self::none().with(core, true)
    }

    /// Mask from raw bits, bit `n` standing for core `n`.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Affinity(bits)
    }

    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Set or clear one core.
    pub fn with(
        mut self,
        core: usize,
        enabled: bool,
    ) -> Self {
        if core < MAX_CORES {
            if enabled {
                self.0 |= 1 << core;
            } else {
                self.0 &= !(1 << core);
            }
        }
        self
    }

    #[inline]
    pub fn contains(
        &self,
        core: usize,
    ) -> bool {
        core < MAX_CORES && self.0 & (1 << core) != 0
    }

    #[inline]
    pub fn intersect(
        &self,
        other: Affinity,
    ) -> Affinity {
        Affinity(self.0 & other.0)
    }

    /// Restrict to the first `cores` cores.
    pub fn limit(
        &self,
        cores: usize,
    ) -> Affinity {
        if cores >= MAX_CORES {
            *self
        } else {
            Affinity(self.0 & ((1u64 << cores) - 1))
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// The core, if the mask names exactly one.
    pub fn single_core(&self) -> Option<usize> {
        (self.count() == 1).then(|| self.0.trailing_zeros() as usize)
    }

    /// The `n`-th allowed core, counting from the lowest.
    pub fn nth(
        &self,
        n: usize,
    ) -> Option<usize> {
        self.cores().nth(n)
    }

    /// Allowed cores, lowest first.
    pub fn cores(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_CORES).filter(move |&core| self.contains(core))
    }
}

impl Default for Affinity {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for Affinity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Affinity({:#x})", self.0)
    }
}
