//! The in-memory tree and its POSIX-style surface.
//!
//! Every operation resolves its path against the tree, hands the resolved
//! entry to the route dispatcher, and falls back to plain in-memory
//! behavior when no route matches. Parents are write-locked by the surface
//! before create, mknod, mkdir, detach, and rename dispatches, as the
//! route metadata promises handlers.

pub mod entry;
pub mod handles;
mod path;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use self::entry::{DirEntry, Entry, EntryRef, FileStat};
use self::handles::HandleTable;
use crate::error::{Result, RouteFsError};
use crate::routes::{self, Dispatch, HandleData, OpArgs, RouteTable};

/// File id of the root directory.
pub const ROOT_ID: u64 = 1;

/// One filesystem instance. The tree, the route table, and the open-handle
/// table all hang off this; independent cores share nothing.
pub struct Core {
    root: EntryRef,
    routes: RouteTable,
    handles: HandleTable,
    next_file_id: AtomicU64,
}

impl Core {
    /// Build an empty filesystem with a 0755 root directory.
    pub fn new() -> Self {
        info!("routefs core initialized");
        Self {
            root: Arc::new(RwLock::new(Entry::new_dir(ROOT_ID, "/", 0o755))),
            routes: RouteTable::new(),
            handles: HandleTable::new(),
            next_file_id: AtomicU64::new(ROOT_ID + 1),
        }
    }

    /// The root directory entry.
    pub fn root(&self) -> &EntryRef {
        &self.root
    }

    pub(crate) fn routes(&self) -> &RouteTable {
        &self.routes
    }

    fn alloc_file_id(&self) -> u64 {
        self.next_file_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Walk `path` from the root to its entry.
    pub fn resolve(&self, path: &str) -> Result<EntryRef> {
        let parts = path::split(path)?;
        self.walk(&parts, path)
    }

    fn walk(&self, parts: &[&str], path: &str) -> Result<EntryRef> {
        let mut cur = self.root.clone();
        for comp in parts {
            let next = {
                let ent = cur.read();
                if !ent.is_dir() {
                    return Err(RouteFsError::NotADirectory(path.to_string()));
                }
                ent.child(comp)
            };
            cur = next.ok_or_else(|| RouteFsError::NotFound(path.to_string()))?;
        }
        Ok(cur)
    }

    /// Resolve the parent directory of `path` and the leaf name the
    /// operation applies to.
    fn resolve_parent<'p>(&self, path: &'p str) -> Result<(EntryRef, &'p str)> {
        let (parts, leaf) = path::split_parent(path)?;
        let parent = self.walk(&parts, path)?;
        if !parent.read().is_dir() {
            return Err(RouteFsError::NotADirectory(path.to_string()));
        }
        Ok((parent, leaf))
    }

    fn handle_parts(&self, fh: u64) -> Result<(String, EntryRef, Option<HandleData>)> {
        let h = self.handles.get(fh).ok_or(RouteFsError::BadHandle(fh))?;
        Ok((h.path.clone(), h.entry.clone(), h.handle_data.clone()))
    }

    /// Create a regular file and open it. Returns the new handle.
    pub fn create(&self, path: &str, mode: u32) -> Result<u64> {
        debug!("create(path={:?}, mode={:o})", path, mode);
        let (parent, leaf) = self.resolve_parent(path)?;
        let child = Arc::new(RwLock::new(Entry::new_file(self.alloc_file_id(), leaf, mode)));

        let mut inode_data = None;
        let mut handle_data = None;
        {
            let mut dir = parent.write();
            if dir.child(leaf).is_some() {
                return Err(RouteFsError::Exists(path.to_string()));
            }
            let args = OpArgs::create(parent.clone(), mode, &mut inode_data, &mut handle_data);
            if let Dispatch::Handled(rc) = routes::dispatch(self, path, &child, args) {
                if rc < 0 {
                    return Err(RouteFsError::Handler(rc));
                }
            }
            child.write().set_inode_data(inode_data);
            dir.attach_child(leaf, child.clone());
            dir.touch_mtime();
        }
        Ok(self.handles.alloc(path.to_string(), child, libc::O_RDWR, handle_data))
    }

    /// Create a filesystem node of the kind encoded in `mode`.
    pub fn mknod(&self, path: &str, mode: u32, dev: u64) -> Result<()> {
        debug!("mknod(path={:?}, mode={:o}, dev={})", path, mode, dev);
        let (parent, leaf) = self.resolve_parent(path)?;
        let child = Arc::new(RwLock::new(Entry::new_node(
            self.alloc_file_id(),
            leaf,
            mode,
            dev,
        )));

        let mut inode_data = None;
        let mut dir = parent.write();
        if dir.child(leaf).is_some() {
            return Err(RouteFsError::Exists(path.to_string()));
        }
        let args = OpArgs::mknod(parent.clone(), mode, dev, &mut inode_data);
        if let Dispatch::Handled(rc) = routes::dispatch(self, path, &child, args) {
            if rc < 0 {
                return Err(RouteFsError::Handler(rc));
            }
        }
        child.write().set_inode_data(inode_data);
        dir.attach_child(leaf, child);
        dir.touch_mtime();
        Ok(())
    }

    /// Create an empty directory.
    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        debug!("mkdir(path={:?}, mode={:o})", path, mode);
        let (parent, leaf) = self.resolve_parent(path)?;
        let child = Arc::new(RwLock::new(Entry::new_dir(self.alloc_file_id(), leaf, mode)));

        let mut inode_data = None;
        let mut dir = parent.write();
        if dir.child(leaf).is_some() {
            return Err(RouteFsError::Exists(path.to_string()));
        }
        let args = OpArgs::mkdir(parent.clone(), mode, &mut inode_data);
        if let Dispatch::Handled(rc) = routes::dispatch(self, path, &child, args) {
            if rc < 0 {
                return Err(RouteFsError::Handler(rc));
            }
        }
        child.write().set_inode_data(inode_data);
        dir.attach_child(leaf, child);
        dir.touch_mtime();
        Ok(())
    }

    /// Open an existing regular file.
    pub fn open(&self, path: &str, flags: i32) -> Result<u64> {
        debug!("open(path={:?}, flags={:#x})", path, flags);
        let entry = self.resolve(path)?;
        if entry.read().is_dir() {
            return Err(RouteFsError::IsADirectory(path.to_string()));
        }
        let mut handle_data = None;
        let args = OpArgs::open(flags, &mut handle_data);
        if let Dispatch::Handled(rc) = routes::dispatch(self, path, &entry, args) {
            if rc < 0 {
                return Err(RouteFsError::Handler(rc));
            }
        }
        let fh = self
            .handles
            .alloc(path.to_string(), entry.clone(), flags, handle_data);
        if flags & libc::O_TRUNC != 0 {
            let handle_data = self.handles.get(fh).and_then(|h| h.handle_data.clone());
            if let Err(e) = self.do_trunc(path, &entry, 0, handle_data) {
                self.handles.remove(fh);
                return Err(e);
            }
        }
        Ok(fh)
    }

    /// Open a directory for listing.
    pub fn opendir(&self, path: &str) -> Result<u64> {
        debug!("opendir(path={:?})", path);
        let entry = self.resolve(path)?;
        if !entry.read().is_dir() {
            return Err(RouteFsError::NotADirectory(path.to_string()));
        }
        let mut handle_data = None;
        let args = OpArgs::open(libc::O_DIRECTORY, &mut handle_data);
        if let Dispatch::Handled(rc) = routes::dispatch(self, path, &entry, args) {
            if rc < 0 {
                return Err(RouteFsError::Handler(rc));
            }
        }
        Ok(self
            .handles
            .alloc(path.to_string(), entry, libc::O_DIRECTORY, handle_data))
    }

    /// Close an open handle, delivering the handle's payload to any close
    /// route. The handle is gone even if the route fails.
    pub fn close(&self, fh: u64) -> Result<()> {
        debug!("close(fh={})", fh);
        let state = self.handles.remove(fh).ok_or(RouteFsError::BadHandle(fh))?;
        let args = OpArgs::close(state.handle_data);
        match routes::dispatch(self, &state.path, &state.entry, args) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            _ => Ok(()),
        }
    }

    /// Close a directory handle.
    pub fn closedir(&self, fh: u64) -> Result<()> {
        self.close(fh)
    }

    /// Read from an open file at `off`. Returns the byte count.
    pub fn read(&self, fh: u64, buf: &mut [u8], off: u64) -> Result<usize> {
        debug!("read(fh={}, len={}, off={})", fh, buf.len(), off);
        let (path, entry, handle_data) = self.handle_parts(fh)?;
        let args = OpArgs::read(buf, off, handle_data, read_cont);
        match routes::dispatch(self, &path, &entry, args) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            Dispatch::Handled(rc) => Ok(rc as usize),
            Dispatch::NoRoute => {
                let mut ent = entry.write();
                let n = default_read(&ent, buf, off);
                ent.touch_atime();
                Ok(n)
            }
        }
    }

    /// Write to an open file at `off`. Returns the byte count.
    pub fn write(&self, fh: u64, buf: &[u8], off: u64) -> Result<usize> {
        debug!("write(fh={}, len={}, off={})", fh, buf.len(), off);
        let (path, entry, handle_data) = self.handle_parts(fh)?;
        let args = OpArgs::write(buf, off, handle_data, write_cont);
        match routes::dispatch(self, &path, &entry, args) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            Dispatch::Handled(rc) => Ok(rc as usize),
            Dispatch::NoRoute => {
                let mut ent = entry.write();
                let end = off as usize + buf.len();
                if ent.data().len() < end {
                    ent.data_mut().resize(end, 0);
                }
                ent.data_mut()[off as usize..end].copy_from_slice(buf);
                if end as u64 > ent.size() {
                    ent.set_size(end as u64);
                }
                ent.touch_mtime();
                Ok(buf.len())
            }
        }
    }

    /// Truncate an open file to `new_size`.
    pub fn ftruncate(&self, fh: u64, new_size: u64) -> Result<()> {
        debug!("ftruncate(fh={}, new_size={})", fh, new_size);
        let (path, entry, handle_data) = self.handle_parts(fh)?;
        self.do_trunc(&path, &entry, new_size, handle_data)
    }

    /// Truncate the file at `path` to `new_size`.
    pub fn truncate(&self, path: &str, new_size: u64) -> Result<()> {
        debug!("truncate(path={:?}, new_size={})", path, new_size);
        let entry = self.resolve(path)?;
        if entry.read().is_dir() {
            return Err(RouteFsError::IsADirectory(path.to_string()));
        }
        self.do_trunc(path, &entry, new_size, None)
    }

    fn do_trunc(
        &self,
        path: &str,
        entry: &EntryRef,
        new_size: u64,
        handle_data: Option<HandleData>,
    ) -> Result<()> {
        let args = OpArgs::trunc(new_size, handle_data, trunc_cont);
        match routes::dispatch(self, path, entry, args) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            Dispatch::Handled(_) => Ok(()),
            Dispatch::NoRoute => {
                let mut ent = entry.write();
                ent.data_mut().resize(new_size as usize, 0);
                ent.set_size(new_size);
                ent.touch_mtime();
                Ok(())
            }
        }
    }

    /// Attributes of the entry at `path`. A stat route may rewrite the
    /// prefilled snapshot before it is returned.
    pub fn stat(&self, path: &str) -> Result<FileStat> {
        debug!("stat(path={:?})", path);
        let entry = self.resolve(path)?;
        let mut st = entry.read().to_stat();
        match routes::dispatch(self, path, &entry, OpArgs::stat(&mut st)) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            _ => Ok(st),
        }
    }

    /// Flush an open file. A no-op unless a sync route is registered.
    pub fn fsync(&self, fh: u64) -> Result<()> {
        debug!("fsync(fh={})", fh);
        let (path, entry, _) = self.handle_parts(fh)?;
        match routes::dispatch(self, &path, &entry, OpArgs::sync()) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            _ => Ok(()),
        }
    }

    /// List a directory. A readdir route may filter or rewrite the
    /// listing.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!("readdir(path={:?})", path);
        let entry = self.resolve(path)?;
        let mut dents = {
            let ent = entry.read();
            if !ent.is_dir() {
                return Err(RouteFsError::NotADirectory(path.to_string()));
            }
            ent.list()
        };
        match routes::dispatch(self, path, &entry, OpArgs::readdir(&mut dents)) {
            Dispatch::Handled(rc) if rc < 0 => Err(RouteFsError::Handler(rc)),
            _ => Ok(dents),
        }
    }

    /// Remove a file.
    pub fn unlink(&self, path: &str) -> Result<()> {
        debug!("unlink(path={:?})", path);
        self.detach_entry(path, false)
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        debug!("rmdir(path={:?})", path);
        self.detach_entry(path, true)
    }

    fn detach_entry(&self, path: &str, want_dir: bool) -> Result<()> {
        let (parent, leaf) = self.resolve_parent(path)?;
        let mut dir = parent.write();
        let entry = dir
            .child(leaf)
            .ok_or_else(|| RouteFsError::NotFound(path.to_string()))?;
        {
            let ent = entry.read();
            match (want_dir, ent.is_dir()) {
                (true, false) => return Err(RouteFsError::NotADirectory(path.to_string())),
                (false, true) => return Err(RouteFsError::IsADirectory(path.to_string())),
                _ => {}
            }
            if want_dir && ent.has_children() {
                return Err(RouteFsError::NotEmpty(path.to_string()));
            }
        }
        let inode_data = entry.read().inode_data().cloned();
        let args = OpArgs::detach(inode_data);
        if let Dispatch::Handled(rc) = routes::dispatch(self, path, &entry, args) {
            if rc < 0 {
                return Err(RouteFsError::Handler(rc));
            }
        }
        dir.detach_child(leaf);
        dir.touch_mtime();
        Ok(())
    }

    /// Move `old_path` to `new_path`, replacing any existing destination.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        debug!("rename(old={:?}, new={:?})", old_path, new_path);
        // A directory cannot move into its own subtree.
        if new_path.starts_with(old_path) && new_path.as_bytes().get(old_path.len()) == Some(&b'/')
        {
            return Err(RouteFsError::InvalidPath(new_path.to_string()));
        }
        let (old_parent, old_leaf) = self.resolve_parent(old_path)?;
        let (new_parent, new_leaf) = self.resolve_parent(new_path)?;

        if Arc::ptr_eq(&old_parent, &new_parent) {
            let mut dir = old_parent.write();
            return self.rename_locked(
                old_path, new_path, &old_parent, &new_parent, &mut dir, None, old_leaf, new_leaf,
            );
        }

        // Both parents stay write-locked for the dispatch span; id order
        // keeps concurrent renames from deadlocking against each other.
        let old_id = old_parent.read().file_id();
        let new_id = new_parent.read().file_id();
        if old_id < new_id {
            let mut src = old_parent.write();
            let mut dst = new_parent.write();
            self.rename_locked(
                old_path,
                new_path,
                &old_parent,
                &new_parent,
                &mut src,
                Some(&mut *dst),
                old_leaf,
                new_leaf,
            )
        } else {
            let mut dst = new_parent.write();
            let mut src = old_parent.write();
            self.rename_locked(
                old_path,
                new_path,
                &old_parent,
                &new_parent,
                &mut src,
                Some(&mut *dst),
                old_leaf,
                new_leaf,
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename_locked(
        &self,
        old_path: &str,
        new_path: &str,
        old_parent: &EntryRef,
        new_parent: &EntryRef,
        src_dir: &mut Entry,
        dst_dir: Option<&mut Entry>,
        old_leaf: &str,
        new_leaf: &str,
    ) -> Result<()> {
        let entry = src_dir
            .child(old_leaf)
            .ok_or_else(|| RouteFsError::NotFound(old_path.to_string()))?;
        let dest = match dst_dir.as_deref() {
            Some(d) => d.child(new_leaf),
            None => src_dir.child(new_leaf),
        };
        let args = OpArgs::rename(
            old_parent.clone(),
            new_path.to_string(),
            new_parent.clone(),
            dest,
        );
        if let Dispatch::Handled(rc) = routes::dispatch(self, old_path, &entry, args) {
            if rc < 0 {
                return Err(RouteFsError::Handler(rc));
            }
        }
        src_dir.detach_child(old_leaf);
        entry.write().set_name(new_leaf);
        match dst_dir {
            Some(d) => {
                d.attach_child(new_leaf, entry);
                d.touch_mtime();
            }
            None => {
                src_dir.attach_child(new_leaf, entry);
            }
        }
        src_dir.touch_mtime();
        Ok(())
    }
}

/// Default read: copy what the blob holds and zero-fill up to the entry's
/// recorded size, which may exceed the blob when an I/O route maintains
/// the file's storage elsewhere.
fn default_read(ent: &Entry, buf: &mut [u8], off: u64) -> usize {
    let size = ent.size();
    if off >= size {
        return 0;
    }
    let n = std::cmp::min(buf.len() as u64, size - off) as usize;
    let data = ent.data();
    let start = std::cmp::min(off as usize, data.len());
    let avail = std::cmp::min(n, data.len() - start);
    buf[..avail].copy_from_slice(&data[start..start + avail]);
    for b in &mut buf[avail..n] {
        *b = 0;
    }
    n
}

// I/O continuations, run by the dispatcher inside the route's critical
// section with the entry write-locked.

fn read_cont(_core: &Core, ent: &mut Entry, _off: u64, _size: u64) {
    ent.touch_atime();
    ent.touch_mtime();
}

fn write_cont(_core: &Core, ent: &mut Entry, off: u64, size: u64) {
    let end = off + size;
    if end > ent.size() {
        ent.set_size(end);
    }
    ent.touch_mtime();
}

fn trunc_cont(_core: &Core, ent: &mut Entry, new_size: u64, _size: u64) {
    ent.set_size(new_size);
    ent.touch_mtime();
}
