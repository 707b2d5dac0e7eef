use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::routes::InodeData;

/// Shared, lockable reference to an entry. The per-entry lock is the one
/// the inode-sequential discipline borrows and the surface uses to
/// write-lock parents around create, detach, and rename dispatches.
pub type EntryRef = Arc<RwLock<Entry>>;

/// What kind of filesystem object an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Fifo,
    Socket,
    CharDevice,
    BlockDevice,
}

impl EntryKind {
    /// Map S_IFMT bits to a kind, defaulting to a regular file.
    pub fn from_mode(mode: u32) -> Self {
        let fmt = mode & (libc::S_IFMT as u32);
        match fmt {
            x if x == libc::S_IFDIR as u32 => EntryKind::Dir,
            x if x == libc::S_IFIFO as u32 => EntryKind::Fifo,
            x if x == libc::S_IFSOCK as u32 => EntryKind::Socket,
            x if x == libc::S_IFCHR as u32 => EntryKind::CharDevice,
            x if x == libc::S_IFBLK as u32 => EntryKind::BlockDevice,
            _ => EntryKind::File,
        }
    }
}

/// An inode in the in-memory tree.
pub struct Entry {
    file_id: u64,
    name: String,
    kind: EntryKind,
    mode: u32,
    uid: u32,
    gid: u32,
    dev: u64,
    size: u64,
    nlink: u32,
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
    data: Vec<u8>,
    children: BTreeMap<String, EntryRef>,
    inode_data: Option<InodeData>,
}

impl Entry {
    fn new(file_id: u64, name: &str, kind: EntryKind, mode: u32, dev: u64, nlink: u32) -> Self {
        let now = SystemTime::now();
        Self {
            file_id,
            name: name.to_string(),
            kind,
            mode: mode & 0o7777,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            dev,
            size: 0,
            nlink,
            atime: now,
            mtime: now,
            ctime: now,
            data: Vec::new(),
            children: BTreeMap::new(),
            inode_data: None,
        }
    }

    pub(crate) fn new_file(file_id: u64, name: &str, mode: u32) -> Self {
        Self::new(file_id, name, EntryKind::File, mode, 0, 1)
    }

    pub(crate) fn new_dir(file_id: u64, name: &str, mode: u32) -> Self {
        Self::new(file_id, name, EntryKind::Dir, mode, 0, 2)
    }

    /// Node of the kind encoded in the mode's format bits, for mknod().
    pub(crate) fn new_node(file_id: u64, name: &str, mode: u32, dev: u64) -> Self {
        Self::new(file_id, name, EntryKind::from_mode(mode), mode, dev, 1)
    }

    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn atime(&self) -> SystemTime {
        self.atime
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn touch_mtime(&mut self) {
        let now = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }

    pub fn touch_atime(&mut self) {
        self.atime = SystemTime::now();
    }

    /// Payload installed by a create, mknod, or mkdir route.
    pub fn inode_data(&self) -> Option<&InodeData> {
        self.inode_data.as_ref()
    }

    pub fn set_inode_data(&mut self, data: Option<InodeData>) {
        self.inode_data = data;
    }

    /// The in-memory blob backing a regular file. Only meaningful when no
    /// I/O route owns the file's storage.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub(crate) fn child(&self, name: &str) -> Option<EntryRef> {
        self.children.get(name).cloned()
    }

    pub(crate) fn attach_child(&mut self, name: &str, child: EntryRef) {
        self.children.insert(name.to_string(), child);
    }

    pub(crate) fn detach_child(&mut self, name: &str) -> Option<EntryRef> {
        self.children.remove(name)
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Directory listing in name order.
    pub(crate) fn list(&self) -> Vec<DirEntry> {
        self.children
            .iter()
            .map(|(name, child)| {
                let ent = child.read();
                DirEntry {
                    name: name.clone(),
                    file_id: ent.file_id,
                    kind: ent.kind,
                }
            })
            .collect()
    }

    /// Attribute snapshot for stat().
    pub fn to_stat(&self) -> FileStat {
        FileStat {
            file_id: self.file_id,
            kind: self.kind,
            mode: self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.dev,
            size: self.size,
            blocks: (self.size + 511) / 512,
            blksize: 512,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }
}

/// Point-in-time attributes of an entry, in the shape stat() reports and
/// stat routes may rewrite.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub file_id: u64,
    pub kind: EntryKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

/// A single readdir() record. Readdir routes may drop or rewrite records
/// before they reach the caller.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub file_id: u64,
    pub kind: EntryKind,
}
