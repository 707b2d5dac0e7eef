//! Route dispatch engine.
//!
//! A route binds a regular expression over absolute paths to a handler for
//! one filesystem operation, under a consistency discipline. Dispatch scans
//! the routes of an operation in registration order and invokes the first
//! one whose pattern matches the whole path; when none matches, the caller
//! applies default in-memory behavior.
//!
//! The discipline is enforced with a per-rule reader-writer lock (the
//! arbiter): sequential handlers hold it as writer, concurrent handlers as
//! reader, and inode-sequential handlers hold it as reader plus the
//! entry's own write lock. Revocation acquires the arbiter as writer, so
//! `unroute` never returns while a handler of that rule is still running.
//!
//! Handlers must not re-enter the route system: dispatching, registering,
//! or revoking from inside a handler inverts the engine's lock order.

mod args;
mod metadata;
mod pattern;
mod table;

pub(crate) use args::{IoContinuation, OpArgs};
pub use metadata::RouteMetadata;
pub(crate) use table::RouteTable;

use std::any::Any;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use tracing::debug;

use self::pattern::PathPattern;
use crate::error::{Result, RouteFsError};
use crate::fs::entry::{DirEntry, Entry, EntryRef, FileStat};
use crate::fs::Core;

/// Pattern matching every absolute path with at least one component.
pub const ROUTE_ANY: &str = "/([^/]+[/]*)*";

/// The operation kinds a route can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Mknod,
    Mkdir,
    Open,
    Readdir,
    Read,
    Write,
    Trunc,
    Close,
    Detach,
    Stat,
    Sync,
    Rename,
}

impl OpKind {
    pub(crate) const COUNT: usize = 13;

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// The concurrency contract a route imposes on its handlers.
///
/// The discriminants are the stable numeric values of the registration
/// surface; [`TryFrom<i32>`] bridges hosts that configure routes
/// numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Discipline {
    /// At most one handler of the route runs at any moment, process-wide.
    Sequential = 1,
    /// Handlers of the route run in parallel without restriction.
    Concurrent = 2,
    /// Handlers run in parallel across distinct entries but are serialized
    /// per entry. The engine holds the entry's write lock for the handler
    /// span, so the handler must not lock the entry it is given.
    InodeSequential = 3,
}

impl TryFrom<i32> for Discipline {
    type Error = RouteFsError;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            1 => Ok(Discipline::Sequential),
            2 => Ok(Discipline::Concurrent),
            3 => Ok(Discipline::InodeSequential),
            other => Err(RouteFsError::BadDiscipline(other)),
        }
    }
}

/// User payload attached to an entry by create, mknod, and mkdir handlers.
pub type InodeData = Arc<dyn Any + Send + Sync>;

/// User payload attached to an open handle by create and open handlers.
pub type HandleData = Arc<dyn Any + Send + Sync>;

/// Stable identifier of a live route within its operation kind.
pub type RouteHandle = usize;

// Handler signatures. Every handler receives the core, the match
// metadata, and the resolved entry, then its operation's own arguments.
// Return contract: 0 or a positive result size on success, a negative
// errno on failure. A negative return suppresses the I/O continuation.
pub type CreateHandler = Box<
    dyn Fn(&Core, &RouteMetadata, &EntryRef, u32, &mut Option<InodeData>, &mut Option<HandleData>) -> i32
        + Send
        + Sync,
>;
pub type MknodHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, u32, u64, &mut Option<InodeData>) -> i32 + Send + Sync>;
pub type MkdirHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, u32, &mut Option<InodeData>) -> i32 + Send + Sync>;
pub type OpenHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, i32, &mut Option<HandleData>) -> i32 + Send + Sync>;
pub type CloseHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, Option<&HandleData>) -> i32 + Send + Sync>;
pub type ReaddirHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, &mut Vec<DirEntry>) -> i32 + Send + Sync>;
pub type ReadHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, &mut [u8], u64, Option<&HandleData>) -> i32 + Send + Sync>;
pub type WriteHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, &[u8], u64, Option<&HandleData>) -> i32 + Send + Sync>;
pub type TruncHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, u64, Option<&HandleData>) -> i32 + Send + Sync>;
pub type DetachHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, Option<&InodeData>) -> i32 + Send + Sync>;
pub type StatHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, &mut FileStat) -> i32 + Send + Sync>;
pub type SyncHandler = Box<dyn Fn(&Core, &RouteMetadata, &EntryRef) -> i32 + Send + Sync>;
pub type RenameHandler =
    Box<dyn Fn(&Core, &RouteMetadata, &EntryRef, &str, Option<&EntryRef>) -> i32 + Send + Sync>;

/// The registered callback, tagged by operation kind.
pub(crate) enum Handler {
    Create(CreateHandler),
    Mknod(MknodHandler),
    Mkdir(MkdirHandler),
    Open(OpenHandler),
    Close(CloseHandler),
    Readdir(ReaddirHandler),
    Read(ReadHandler),
    Write(WriteHandler),
    Trunc(TruncHandler),
    Detach(DetachHandler),
    Stat(StatHandler),
    Sync(SyncHandler),
    Rename(RenameHandler),
}

impl Handler {
    fn op(&self) -> OpKind {
        match self {
            Handler::Create(_) => OpKind::Create,
            Handler::Mknod(_) => OpKind::Mknod,
            Handler::Mkdir(_) => OpKind::Mkdir,
            Handler::Open(_) => OpKind::Open,
            Handler::Close(_) => OpKind::Close,
            Handler::Readdir(_) => OpKind::Readdir,
            Handler::Read(_) => OpKind::Read,
            Handler::Write(_) => OpKind::Write,
            Handler::Trunc(_) => OpKind::Trunc,
            Handler::Detach(_) => OpKind::Detach,
            Handler::Stat(_) => OpKind::Stat,
            Handler::Sync(_) => OpKind::Sync,
            Handler::Rename(_) => OpKind::Rename,
        }
    }
}

/// A registered rule: compiled pattern, handler, discipline, and the
/// arbiter lock that both enforces the discipline and serves as the drain
/// barrier for revocation. Pattern, handler, and discipline are immutable
/// for the life of the rule.
pub(crate) struct Route {
    pattern: PathPattern,
    discipline: Discipline,
    handler: Handler,
    arbiter: Arc<RwLock<()>>,
}

impl Route {
    fn new(pattern: PathPattern, handler: Handler, discipline: Discipline) -> Self {
        Self {
            pattern,
            discipline,
            handler,
            arbiter: Arc::new(RwLock::new(())),
        }
    }

    pub(crate) fn op(&self) -> OpKind {
        self.handler.op()
    }

    pub(crate) fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub(crate) fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub(crate) fn arbiter(&self) -> &Arc<RwLock<()>> {
        &self.arbiter
    }
}

/// Owned hold on a rule's arbiter, taken in the acquisition mode its
/// discipline dictates: exclusive for sequential, shared otherwise. The
/// shared hold still blocks revocation, which drains as a writer.
pub(crate) enum ArbiterHold {
    Shared {
        _guard: ArcRwLockReadGuard<RawRwLock, ()>,
    },
    Exclusive {
        _guard: ArcRwLockWriteGuard<RawRwLock, ()>,
    },
}

impl ArbiterHold {
    pub(crate) fn acquire(route: &Route) -> Self {
        match route.discipline {
            Discipline::Sequential => ArbiterHold::Exclusive {
                _guard: route.arbiter.write_arc(),
            },
            Discipline::Concurrent | Discipline::InodeSequential => ArbiterHold::Shared {
                _guard: route.arbiter.read_arc(),
            },
        }
    }
}

/// Outcome of a dispatch attempt.
pub(crate) enum Dispatch {
    /// A route matched; the handler returned this code.
    Handled(i32),
    /// No route matched; the caller applies default behavior.
    NoRoute,
}

/// Find the first matching route for the operation carried by `args` and
/// run its handler under the rule's discipline. For read, write, and
/// truncate, the I/O continuation runs inside the same critical section
/// when the handler reports success, so attribute bookkeeping is atomic
/// with the I/O.
///
/// Lock order is fixed here: table reader, then arbiter, then entry
/// writer. The arbiter hold is taken while the table hold is still in
/// place (revocation cannot slip between match and handler entry), and
/// the table hold is released before the handler runs so registration and
/// revocation stay concurrent with dispatch.
pub(crate) fn dispatch(core: &Core, path: &str, entry: &EntryRef, args: OpArgs<'_>) -> Dispatch {
    let op = args.op();
    let Some((route, captures, hold)) = core.routes().find_match(op, path) else {
        return Dispatch::NoRoute;
    };
    debug!(
        "dispatch({:?}, path={:?}): matched pattern {:?}",
        op,
        path,
        route.pattern().source()
    );

    let mut metadata = RouteMetadata::new(path, captures);
    match &args {
        OpArgs::Create { parent, .. }
        | OpArgs::Mknod { parent, .. }
        | OpArgs::Mkdir { parent, .. } => {
            metadata = metadata.with_parent(parent.clone());
        }
        OpArgs::Rename {
            parent,
            new_parent,
            new_path,
            ..
        } => {
            metadata = metadata
                .with_parent(parent.clone())
                .with_rename(new_parent.clone(), new_path);
        }
        _ => {}
    }

    let rc = match route.discipline {
        Discipline::Sequential | Discipline::Concurrent => {
            invoke(core, &route, &metadata, entry, args, None)
        }
        Discipline::InodeSequential => {
            let mut locked = entry.write();
            invoke(core, &route, &metadata, entry, args, Some(&mut *locked))
        }
    };
    drop(hold);
    Dispatch::Handled(rc)
}

/// Run the matched handler. `locked` carries the entry write guard when
/// the discipline already holds it, so the continuation reuses it instead
/// of deadlocking on a second acquisition.
fn invoke(
    core: &Core,
    route: &Route,
    metadata: &RouteMetadata,
    entry: &EntryRef,
    args: OpArgs<'_>,
    locked: Option<&mut Entry>,
) -> i32 {
    match (&route.handler, args) {
        (
            Handler::Create(cb),
            OpArgs::Create {
                mode,
                inode_data,
                handle_data,
                ..
            },
        ) => cb(core, metadata, entry, mode, inode_data, handle_data),
        (
            Handler::Mknod(cb),
            OpArgs::Mknod {
                mode,
                dev,
                inode_data,
                ..
            },
        ) => cb(core, metadata, entry, mode, dev, inode_data),
        (Handler::Mkdir(cb), OpArgs::Mkdir { mode, inode_data, .. }) => {
            cb(core, metadata, entry, mode, inode_data)
        }
        (Handler::Open(cb), OpArgs::Open { flags, handle_data }) => {
            cb(core, metadata, entry, flags, handle_data)
        }
        (Handler::Close(cb), OpArgs::Close { handle_data }) => {
            cb(core, metadata, entry, handle_data.as_ref())
        }
        (Handler::Readdir(cb), OpArgs::Readdir { dents }) => cb(core, metadata, entry, dents),
        (
            Handler::Read(cb),
            OpArgs::Read {
                buf,
                off,
                handle_data,
                io_cont,
            },
        ) => {
            let rc = cb(core, metadata, entry, buf, off, handle_data.as_ref());
            if rc >= 0 {
                run_continuation(core, entry, locked, off, rc as u64, io_cont);
            }
            rc
        }
        (
            Handler::Write(cb),
            OpArgs::Write {
                buf,
                off,
                handle_data,
                io_cont,
            },
        ) => {
            let rc = cb(core, metadata, entry, buf, off, handle_data.as_ref());
            if rc >= 0 {
                run_continuation(core, entry, locked, off, rc as u64, io_cont);
            }
            rc
        }
        (
            Handler::Trunc(cb),
            OpArgs::Trunc {
                new_size,
                handle_data,
                io_cont,
            },
        ) => {
            let rc = cb(core, metadata, entry, new_size, handle_data.as_ref());
            if rc >= 0 {
                run_continuation(core, entry, locked, new_size, 0, io_cont);
            }
            rc
        }
        (Handler::Detach(cb), OpArgs::Detach { inode_data }) => {
            cb(core, metadata, entry, inode_data.as_ref())
        }
        (Handler::Stat(cb), OpArgs::Stat { stat }) => cb(core, metadata, entry, stat),
        (Handler::Sync(cb), OpArgs::Sync) => cb(core, metadata, entry),
        (Handler::Rename(cb), OpArgs::Rename { new_path, dest, .. }) => {
            cb(core, metadata, entry, &new_path, dest.as_ref())
        }
        _ => unreachable!("route table returned a rule of the wrong operation kind"),
    }
}

fn run_continuation(
    core: &Core,
    entry: &EntryRef,
    locked: Option<&mut Entry>,
    off: u64,
    size: u64,
    io_cont: IoContinuation,
) {
    match locked {
        Some(ent) => io_cont(core, ent, off, size),
        None => io_cont(core, &mut entry.write(), off, size),
    }
}

// Registration and revocation surface. One pair per operation kind plus
// `unroute_all`; handles are only meaningful within their operation kind.
impl Core {
    fn install(&self, pattern: &str, handler: Handler, discipline: Discipline) -> Result<RouteHandle> {
        let compiled = PathPattern::compile(pattern)?;
        let op = handler.op();
        let handle = self.routes().insert(Route::new(compiled, handler, discipline));
        debug!(
            "route({:?}, pattern={:?}, discipline={:?}) -> handle {}",
            op, pattern, discipline, handle
        );
        Ok(handle)
    }

    /// Bind a handler to `create` calls on paths matching `pattern`.
    pub fn route_create<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, u32, &mut Option<InodeData>, &mut Option<HandleData>) -> i32
            + Send
            + Sync
            + 'static,
    {
        self.install(pattern, Handler::Create(Box::new(handler)), discipline)
    }

    /// Bind a handler to `mknod` calls on paths matching `pattern`.
    pub fn route_mknod<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, u32, u64, &mut Option<InodeData>) -> i32
            + Send
            + Sync
            + 'static,
    {
        self.install(pattern, Handler::Mknod(Box::new(handler)), discipline)
    }

    /// Bind a handler to `mkdir` calls on paths matching `pattern`.
    pub fn route_mkdir<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, u32, &mut Option<InodeData>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Mkdir(Box::new(handler)), discipline)
    }

    /// Bind a handler to `open` and `opendir` calls on paths matching
    /// `pattern`.
    pub fn route_open<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, i32, &mut Option<HandleData>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Open(Box::new(handler)), discipline)
    }

    /// Bind a handler to `close` and `closedir` calls on paths matching
    /// `pattern`.
    pub fn route_close<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, Option<&HandleData>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Close(Box::new(handler)), discipline)
    }

    /// Bind a handler to `readdir` calls on paths matching `pattern`.
    pub fn route_readdir<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, &mut Vec<DirEntry>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Readdir(Box::new(handler)), discipline)
    }

    /// Bind a handler to `read` calls on paths matching `pattern`. The
    /// handler fills the buffer and returns the byte count.
    pub fn route_read<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, &mut [u8], u64, Option<&HandleData>) -> i32
            + Send
            + Sync
            + 'static,
    {
        self.install(pattern, Handler::Read(Box::new(handler)), discipline)
    }

    /// Bind a handler to `write` calls on paths matching `pattern`. The
    /// handler consumes the buffer and returns the byte count.
    pub fn route_write<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, &[u8], u64, Option<&HandleData>) -> i32
            + Send
            + Sync
            + 'static,
    {
        self.install(pattern, Handler::Write(Box::new(handler)), discipline)
    }

    /// Bind a handler to `truncate` calls on paths matching `pattern`.
    pub fn route_trunc<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, u64, Option<&HandleData>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Trunc(Box::new(handler)), discipline)
    }

    /// Bind a handler to `unlink` and `rmdir` calls on paths matching
    /// `pattern`.
    pub fn route_detach<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, Option<&InodeData>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Detach(Box::new(handler)), discipline)
    }

    /// Bind a handler to `stat` calls on paths matching `pattern`. The
    /// handler may rewrite the prefilled attribute snapshot.
    pub fn route_stat<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, &mut FileStat) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Stat(Box::new(handler)), discipline)
    }

    /// Bind a handler to `fsync` calls on paths matching `pattern`.
    pub fn route_sync<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Sync(Box::new(handler)), discipline)
    }

    /// Bind a handler to `rename` calls on source paths matching
    /// `pattern`.
    pub fn route_rename<F>(&self, pattern: &str, handler: F, discipline: Discipline) -> Result<RouteHandle>
    where
        F: Fn(&Core, &RouteMetadata, &EntryRef, &str, Option<&EntryRef>) -> i32 + Send + Sync + 'static,
    {
        self.install(pattern, Handler::Rename(Box::new(handler)), discipline)
    }

    /// Revoke a `create` route.
    pub fn unroute_create(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Create, handle)
    }

    /// Revoke a `mknod` route.
    pub fn unroute_mknod(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Mknod, handle)
    }

    /// Revoke a `mkdir` route.
    pub fn unroute_mkdir(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Mkdir, handle)
    }

    /// Revoke an `open` route.
    pub fn unroute_open(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Open, handle)
    }

    /// Revoke a `close` route.
    pub fn unroute_close(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Close, handle)
    }

    /// Revoke a `readdir` route.
    pub fn unroute_readdir(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Readdir, handle)
    }

    /// Revoke a `read` route.
    pub fn unroute_read(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Read, handle)
    }

    /// Revoke a `write` route.
    pub fn unroute_write(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Write, handle)
    }

    /// Revoke a `truncate` route.
    pub fn unroute_trunc(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Trunc, handle)
    }

    /// Revoke a `detach` route.
    pub fn unroute_detach(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Detach, handle)
    }

    /// Revoke a `stat` route.
    pub fn unroute_stat(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Stat, handle)
    }

    /// Revoke a `sync` route.
    pub fn unroute_sync(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Sync, handle)
    }

    /// Revoke a `rename` route.
    pub fn unroute_rename(&self, handle: RouteHandle) -> Result<()> {
        self.routes().remove(OpKind::Rename, handle)
    }

    /// Revoke every route on this core, draining in-flight handlers.
    pub fn unroute_all(&self) {
        self.routes().remove_all();
    }
}
