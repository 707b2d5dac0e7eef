use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::fs::entry::EntryRef;
use crate::routes::HandleData;

/// State for one open file or directory.
pub struct HandleState {
    /// The handle ID assigned at open/create.
    pub fh: u64,
    /// Absolute path the handle was opened at.
    pub path: String,
    /// The resolved entry.
    pub entry: EntryRef,
    /// Open flags.
    pub flags: i32,
    /// Payload installed by the create/open route, if any.
    pub handle_data: Option<HandleData>,
}

pub struct HandleTable {
    handles: DashMap<u64, HandleState>,
    next_fh: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn alloc(
        &self,
        path: String,
        entry: EntryRef,
        flags: i32,
        handle_data: Option<HandleData>,
    ) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        let state = HandleState {
            fh,
            path,
            entry,
            flags,
            handle_data,
        };
        self.handles.insert(fh, state);
        fh
    }

    pub fn get(&self, fh: u64) -> Option<dashmap::mapref::one::Ref<'_, u64, HandleState>> {
        self.handles.get(&fh)
    }

    pub fn remove(&self, fh: u64) -> Option<HandleState> {
        self.handles.remove(&fh).map(|(_, v)| v)
    }
}
