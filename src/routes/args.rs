use crate::fs::entry::{DirEntry, Entry, EntryRef, FileStat};
use crate::fs::Core;
use crate::routes::{HandleData, InodeData, OpKind};

/// Bookkeeping hook run inside the dispatch critical section after a
/// read, write, or truncate handler reports success. Receives the entry
/// write-locked, the I/O offset, and the handler's result size, so no
/// observer can see the handler's effect without the attribute update.
pub(crate) type IoContinuation = fn(&Core, &mut Entry, u64, u64);

/// Per-operation dispatch arguments. Each variant carries exactly the
/// fields its operation consumes; buffers are aliased from the caller and
/// entries are borrowed for the call.
pub(crate) enum OpArgs<'a> {
    Create {
        parent: EntryRef,
        mode: u32,
        inode_data: &'a mut Option<InodeData>,
        handle_data: &'a mut Option<HandleData>,
    },
    Mknod {
        parent: EntryRef,
        mode: u32,
        dev: u64,
        inode_data: &'a mut Option<InodeData>,
    },
    Mkdir {
        parent: EntryRef,
        mode: u32,
        inode_data: &'a mut Option<InodeData>,
    },
    Open {
        flags: i32,
        handle_data: &'a mut Option<HandleData>,
    },
    Close {
        handle_data: Option<HandleData>,
    },
    Readdir {
        dents: &'a mut Vec<DirEntry>,
    },
    Read {
        buf: &'a mut [u8],
        off: u64,
        handle_data: Option<HandleData>,
        io_cont: IoContinuation,
    },
    Write {
        buf: &'a [u8],
        off: u64,
        handle_data: Option<HandleData>,
        io_cont: IoContinuation,
    },
    Trunc {
        new_size: u64,
        handle_data: Option<HandleData>,
        io_cont: IoContinuation,
    },
    Detach {
        inode_data: Option<InodeData>,
    },
    Stat {
        stat: &'a mut FileStat,
    },
    Sync,
    Rename {
        parent: EntryRef,
        new_path: String,
        new_parent: EntryRef,
        dest: Option<EntryRef>,
    },
}

impl<'a> OpArgs<'a> {
    pub(crate) fn create(
        parent: EntryRef,
        mode: u32,
        inode_data: &'a mut Option<InodeData>,
        handle_data: &'a mut Option<HandleData>,
    ) -> Self {
        OpArgs::Create {
            parent,
            mode,
            inode_data,
            handle_data,
        }
    }

    pub(crate) fn mknod(
        parent: EntryRef,
        mode: u32,
        dev: u64,
        inode_data: &'a mut Option<InodeData>,
    ) -> Self {
        OpArgs::Mknod {
            parent,
            mode,
            dev,
            inode_data,
        }
    }

    pub(crate) fn mkdir(
        parent: EntryRef,
        mode: u32,
        inode_data: &'a mut Option<InodeData>,
    ) -> Self {
        OpArgs::Mkdir {
            parent,
            mode,
            inode_data,
        }
    }

    pub(crate) fn open(flags: i32, handle_data: &'a mut Option<HandleData>) -> Self {
        OpArgs::Open { flags, handle_data }
    }

    pub(crate) fn close(handle_data: Option<HandleData>) -> Self {
        OpArgs::Close { handle_data }
    }

    pub(crate) fn readdir(dents: &'a mut Vec<DirEntry>) -> Self {
        OpArgs::Readdir { dents }
    }

    pub(crate) fn read(
        buf: &'a mut [u8],
        off: u64,
        handle_data: Option<HandleData>,
        io_cont: IoContinuation,
    ) -> Self {
        OpArgs::Read {
            buf,
            off,
            handle_data,
            io_cont,
        }
    }

    pub(crate) fn write(
        buf: &'a [u8],
        off: u64,
        handle_data: Option<HandleData>,
        io_cont: IoContinuation,
    ) -> Self {
        OpArgs::Write {
            buf,
            off,
            handle_data,
            io_cont,
        }
    }

    pub(crate) fn trunc(
        new_size: u64,
        handle_data: Option<HandleData>,
        io_cont: IoContinuation,
    ) -> Self {
        OpArgs::Trunc {
            new_size,
            handle_data,
            io_cont,
        }
    }

    pub(crate) fn detach(inode_data: Option<InodeData>) -> Self {
        OpArgs::Detach { inode_data }
    }

    pub(crate) fn stat(stat: &'a mut FileStat) -> Self {
        OpArgs::Stat { stat }
    }

    pub(crate) fn sync() -> Self {
        OpArgs::Sync
    }

    pub(crate) fn rename(
        parent: EntryRef,
        new_path: String,
        new_parent: EntryRef,
        dest: Option<EntryRef>,
    ) -> Self {
        OpArgs::Rename {
            parent,
            new_path,
            new_parent,
            dest,
        }
    }

    /// The operation kind these arguments belong to.
    pub(crate) fn op(&self) -> OpKind {
        match self {
            OpArgs::Create { .. } => OpKind::Create,
            OpArgs::Mknod { .. } => OpKind::Mknod,
            OpArgs::Mkdir { .. } => OpKind::Mkdir,
            OpArgs::Open { .. } => OpKind::Open,
            OpArgs::Close { .. } => OpKind::Close,
            OpArgs::Readdir { .. } => OpKind::Readdir,
            OpArgs::Read { .. } => OpKind::Read,
            OpArgs::Write { .. } => OpKind::Write,
            OpArgs::Trunc { .. } => OpKind::Trunc,
            OpArgs::Detach { .. } => OpKind::Detach,
            OpArgs::Stat { .. } => OpKind::Stat,
            OpArgs::Sync => OpKind::Sync,
            OpArgs::Rename { .. } => OpKind::Rename,
        }
    }
}
