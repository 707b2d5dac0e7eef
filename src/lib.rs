//! routefs: build multi-threaded in-memory filesystems whose behavior is
//! programmed by binding handlers to regular expressions over absolute
//! paths.
//!
//! A host embeds a [`Core`], registers routes with the `route_<op>`
//! methods, and drives the filesystem through the POSIX-style surface on
//! the core. Operations with no matching route fall back to plain
//! in-memory behavior, so a core works as a RAM filesystem out of the box
//! and routes override exactly the paths they claim.
//!
//! ```
//! use routefs::{Core, Discipline};
//!
//! let core = Core::new();
//! core.route_read(
//!     "/proc/([^/]+)",
//!     |_core, meta, _entry, buf, _off, _hd| {
//!         let msg = format!("hello, {}\n", meta.captures()[0]);
//!         let n = msg.len().min(buf.len());
//!         buf[..n].copy_from_slice(&msg.as_bytes()[..n]);
//!         n as i32
//!     },
//!     Discipline::Concurrent,
//! )
//! .unwrap();
//!
//! core.mkdir("/proc", 0o755).unwrap();
//! core.create("/proc/world", 0o644).unwrap();
//! let fh = core.open("/proc/world", 0).unwrap();
//! let mut buf = [0u8; 64];
//! let n = core.read(fh, &mut buf, 0).unwrap();
//! assert_eq!(&buf[..n], b"hello, world\n");
//! core.close(fh).unwrap();
//! ```

pub mod error;
pub mod fs;
pub mod routes;

pub use error::{Result, RouteFsError};
pub use fs::entry::{DirEntry, Entry, EntryKind, EntryRef, FileStat};
pub use fs::Core;
pub use routes::{
    Discipline, HandleData, InodeData, RouteHandle, RouteMetadata, ROUTE_ANY,
};
