// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scoped pool of pair-set buffers.

use std::collections::BTreeSet;

use crate::proxy::ProxyId;

/// Reuses the per-proxy candidate sets of the pending-pair buffer across passes.
///
/// Every set taken during a pass must be given back before the pass ends; the pair finder
/// checks this with [`assert_drained`](Self::assert_drained).
#[derive(Debug, Default)]
pub(crate) struct PairBufferPool {
    free: Vec<BTreeSet<ProxyId>>,
    outstanding: usize,
}

impl PairBufferPool {
    pub(crate) fn take(&mut self) -> BTreeSet<ProxyId> {
        self.outstanding += 1;
        self.free.pop().unwrap_or_default()
    }

    pub(crate) fn give(&mut self, mut set: BTreeSet<ProxyId>) {
        debug_assert!(self.outstanding > 0, "returned a pair set that was never taken");
        self.outstanding = self.outstanding.saturating_sub(1);
        set.clear();
        self.free.push(set);
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub(crate) fn assert_drained(&self) {
        debug_assert_eq!(
            self.outstanding, 0,
            "pair buffers must be returned before the pass ends"
        );
    }
}
