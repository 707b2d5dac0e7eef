use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, RouteFsError};
use crate::routes::{ArbiterHold, OpKind, Route};

/// Ordered per-operation route lists. The lock here covers the table
/// structure only; each rule's arbiter lock is its own affair.
///
/// Handles are slot indexes. Revoked slots are tombstoned rather than
/// compacted, so live handles stay stable and slot order remains
/// registration order; `remove_all` clears the lists and starts handle
/// numbering over from an empty table.
pub(crate) struct RouteTable {
    lists: RwLock<Vec<Vec<Option<Arc<Route>>>>>,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Self {
            lists: RwLock::new((0..OpKind::COUNT).map(|_| Vec::new()).collect()),
        }
    }

    /// Install a route, returning its handle within the operation kind.
    pub(crate) fn insert(&self, route: Route) -> usize {
        let op = route.op();
        let mut lists = self.lists.write();
        let list = &mut lists[op.index()];
        list.push(Some(Arc::new(route)));
        list.len() - 1
    }

    /// Revoke a route. The slot is emptied under the table writer hold, so
    /// no later dispatch can select the rule; the rule's arbiter is then
    /// acquired in writer mode, which drains any handler still running
    /// under either acquisition mode before this call returns.
    pub(crate) fn remove(&self, op: OpKind, handle: usize) -> Result<()> {
        let route = {
            let mut lists = self.lists.write();
            lists[op.index()]
                .get_mut(handle)
                .and_then(|slot| slot.take())
                .ok_or(RouteFsError::RouteNotFound(handle))?
        };
        drop(route.arbiter().write());
        debug!("unroute({:?}, handle={})", op, handle);
        Ok(())
    }

    /// Revoke every route, draining each in turn.
    pub(crate) fn remove_all(&self) {
        let drained: Vec<Arc<Route>> = {
            let mut lists = self.lists.write();
            lists
                .iter_mut()
                .flat_map(|list| list.drain(..).flatten())
                .collect()
        };
        for route in &drained {
            drop(route.arbiter().write());
        }
        debug!("unroute_all: {} routes revoked", drained.len());
    }

    /// First-registered route of `op` whose pattern matches `path`, with
    /// its captures and an arbiter hold in the rule's acquisition mode.
    /// The hold is taken while the table reader hold is still in place,
    /// so a revoker draining the rule cannot return between the match and
    /// the handler entering the arbiter; the Arc keeps the rule alive
    /// once the table hold is released.
    pub(crate) fn find_match(
        &self,
        op: OpKind,
        path: &str,
    ) -> Option<(Arc<Route>, Vec<String>, ArbiterHold)> {
        let lists = self.lists.read();
        for slot in &lists[op.index()] {
            if let Some(route) = slot {
                if let Some(captures) = route.pattern().captures(path) {
                    let hold = ArbiterHold::acquire(route);
                    return Some((route.clone(), captures, hold));
                }
            }
        }
        None
    }
}
