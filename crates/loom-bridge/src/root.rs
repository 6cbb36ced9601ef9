// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-root identity allocation.

use loom_bridge_proto::{WidgetId, HOST_ID_BASE};

use crate::BridgeError;

/// Allocator state for one mounted root tree.
///
/// Sole writer of `next_id`. Identities start at 1, only grow, and stay
/// below [`HOST_ID_BASE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootContext {
    next_id: WidgetId,
    torn_down: bool,
}

impl Default for RootContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RootContext {
    /// Fresh context for a newly mounted root.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            torn_down: false,
        }
    }

    /// Hand out the next identity.
    pub fn allocate_id(&mut self) -> Result<WidgetId, BridgeError> {
        if self.torn_down {
            return Err(BridgeError::RootTornDown);
        }
        let id = self.next_id;
        if id >= HOST_ID_BASE {
            return Err(BridgeError::IdsExhausted);
        }
        self.next_id = id + 1;
        Ok(id)
    }

    /// Identity the next allocation will return.
    pub fn next_id(&self) -> WidgetId {
        self.next_id
    }

    /// Mark the root as gone; later allocations fail.
    pub fn tear_down(&mut self) {
        self.torn_down = true;
    }

    /// Whether [`RootContext::tear_down`] was called.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_from_one() {
        let mut ctx = RootContext::new();
        let ids: Vec<_> = (0..4).map(|_| ctx.allocate_id().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(ctx.next_id(), 5);
    }

    #[test]
    fn allocation_after_teardown_fails() {
        let mut ctx = RootContext::new();
        ctx.allocate_id().unwrap();
        ctx.tear_down();
        assert_eq!(ctx.allocate_id(), Err(BridgeError::RootTornDown));
        assert!(ctx.is_torn_down());
    }

    #[test]
    fn allocation_stops_short_of_host_identities() {
        let mut ctx = RootContext {
            next_id: HOST_ID_BASE - 2,
            torn_down: false,
        };
        assert_eq!(ctx.allocate_id(), Ok(HOST_ID_BASE - 2));
        assert_eq!(ctx.allocate_id(), Ok(HOST_ID_BASE - 1));
        assert_eq!(ctx.allocate_id(), Err(BridgeError::IdsExhausted));
        assert_eq!(ctx.allocate_id(), Err(BridgeError::IdsExhausted));
        assert_eq!(ctx.next_id(), HOST_ID_BASE);
    }

    #[test]
    fn separate_roots_do_not_share_counters() {
        let mut a = RootContext::new();
        let mut b = RootContext::new();
        a.allocate_id().unwrap();
        a.allocate_id().unwrap();
        assert_eq!(b.allocate_id(), Ok(1));
    }
}
