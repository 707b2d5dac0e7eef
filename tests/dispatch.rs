//! Routing behavior driven through the POSIX-style surface: match
//! precedence, capture extraction, metadata, defaults, and revocation.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use helpers::seeded_core;
use routefs::{Discipline, EntryKind, RouteFsError, ROUTE_ANY};

#[test]
fn create_route_sees_captures_mode_and_locked_parent() {
    let core = seeded_core();

    let seen: Arc<Mutex<Option<(Vec<String>, u32, bool)>>> = Arc::new(Mutex::new(None));
    let seen_cb = seen.clone();
    core.route_create(
        "/foo/([^/]+)",
        move |_core, meta, _entry, mode, _inode_data, _handle_data| {
            let parent_locked = meta.parent().map(|p| p.is_locked_exclusive()).unwrap_or(false);
            *seen_cb.lock().unwrap() = Some((meta.captures().to_vec(), mode, parent_locked));
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let fh = core.create("/foo/bar", 0o644).unwrap();
    core.close(fh).unwrap();

    let (captures, mode, parent_locked) = seen.lock().unwrap().take().expect("handler ran");
    assert_eq!(captures, vec!["bar".to_string()]);
    assert_eq!(mode, 0o644);
    assert!(parent_locked, "parent must be write-locked during create dispatch");

    let st = core.stat("/foo/bar").unwrap();
    assert_eq!(st.kind, EntryKind::File);
    assert_eq!(st.mode, 0o644);
}

#[test]
fn first_registered_route_wins() {
    let core = seeded_core();

    let hits_broad = Arc::new(AtomicUsize::new(0));
    let hits_narrow = Arc::new(AtomicUsize::new(0));

    let h = hits_broad.clone();
    core.route_read(
        "/data/.*",
        move |_core, _meta, _entry, buf, _off, _hd| {
            h.fetch_add(1, Ordering::SeqCst);
            buf.fill(b'A');
            buf.len() as i32
        },
        Discipline::Concurrent,
    )
    .unwrap();

    let h = hits_narrow.clone();
    core.route_read(
        "/data/x",
        move |_core, _meta, _entry, buf, _off, _hd| {
            h.fetch_add(1, Ordering::SeqCst);
            buf.fill(b'B');
            buf.len() as i32
        },
        Discipline::Concurrent,
    )
    .unwrap();

    let fh = core.create("/data/x", 0o644).unwrap();
    let mut buf = [0u8; 4];
    let n = core.read(fh, &mut buf, 0).unwrap();
    core.close(fh).unwrap();

    assert_eq!(n, 4);
    assert_eq!(&buf, b"AAAA");
    assert_eq!(hits_broad.load(Ordering::SeqCst), 1);
    assert_eq!(hits_narrow.load(Ordering::SeqCst), 0);
}

#[test]
fn captures_cover_every_group_including_unmatched_ones() {
    let core = seeded_core();
    let fh = core.create("/data/by", 0o644).unwrap();
    core.close(fh).unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    core.route_stat(
        "/data/(a)x|/data/(b)y",
        move |_core, meta, _entry, _st| {
            *seen_cb.lock().unwrap() = meta.captures().to_vec();
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    core.stat("/data/by").unwrap();

    // Both groups are reported; the branch that did not participate in
    // the match comes back empty.
    let captures = seen.lock().unwrap().clone();
    assert_eq!(captures, vec![String::new(), "b".to_string()]);
}

#[test]
fn unrouted_open_falls_through_to_default() {
    let core = seeded_core();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let handle = core
        .route_open(
            "/x",
            move |_core, _meta, _entry, _flags, _hd| {
                h.fetch_add(1, Ordering::SeqCst);
                0
            },
            Discipline::Sequential,
        )
        .unwrap();

    let fh = core.create("/x", 0o600).unwrap();
    core.close(fh).unwrap();

    let fh = core.open("/x", 0).unwrap();
    core.close(fh).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    core.unroute_open(handle).unwrap();

    // Default open still works, handler stays quiet.
    let fh = core.open("/x", 0).unwrap();
    core.close(fh).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn unroute_rejects_unknown_and_cross_op_handles() {
    let core = seeded_core();

    let handle = core
        .route_read("/data/.*", |_c, _m, _e, _buf, _off, _hd| 0, Discipline::Concurrent)
        .unwrap();

    // A handle is only meaningful within its own operation kind.
    assert!(matches!(
        core.unroute_write(handle),
        Err(RouteFsError::RouteNotFound(_))
    ));

    core.unroute_read(handle).unwrap();
    assert!(matches!(
        core.unroute_read(handle),
        Err(RouteFsError::RouteNotFound(_))
    ));
}

#[test]
fn invalid_pattern_is_a_registration_error() {
    let core = seeded_core();

    let err = core
        .route_create("((bad", |_c, _m, _e, _mode, _i, _h| 0, Discipline::Sequential)
        .unwrap_err();
    assert!(matches!(err, RouteFsError::BadPattern { .. }));
    assert_eq!(err.errno(), -libc::EINVAL);

    // Nothing was installed; creates keep their default behavior.
    let fh = core.create("/foo/untouched", 0o644).unwrap();
    core.close(fh).unwrap();
    core.stat("/foo/untouched").unwrap();
}

#[test]
fn handler_failure_propagates_and_skips_bookkeeping() {
    let core = seeded_core();
    let fh = core.create("/data/f", 0o644).unwrap();

    core.route_write(
        "/data/f",
        |_core, _meta, _entry, _buf, _off, _hd| -libc::EACCES,
        Discipline::Sequential,
    )
    .unwrap();

    let before = core.stat("/data/f").unwrap();
    let err = core.write(fh, b"denied", 0).unwrap_err();
    assert!(matches!(err, RouteFsError::Handler(rc) if rc == -libc::EACCES));
    assert_eq!(err.errno(), -libc::EACCES);

    // The continuation never ran: size and mtime are untouched.
    let after = core.stat("/data/f").unwrap();
    assert_eq!(after.size, 0);
    assert_eq!(after.mtime, before.mtime);
    core.close(fh).unwrap();
}

#[test]
fn failed_create_route_leaves_no_entry_behind() {
    let core = seeded_core();

    core.route_create(
        "/foo/.*",
        |_core, _meta, _entry, _mode, _i, _h| -libc::EPERM,
        Discipline::Sequential,
    )
    .unwrap();

    let err = core.create("/foo/nope", 0o644).unwrap_err();
    assert!(matches!(err, RouteFsError::Handler(rc) if rc == -libc::EPERM));
    assert!(matches!(
        core.stat("/foo/nope"),
        Err(RouteFsError::NotFound(_))
    ));
}

#[test]
fn write_continuation_updates_size_and_mtime() {
    let core = seeded_core();
    let fh = core.create("/data/f", 0o644).unwrap();

    // Handler accepts the bytes without touching the entry; the
    // continuation is what makes the size visible.
    core.route_write(
        "/data/f",
        |_core, _meta, _entry, buf, _off, _hd| buf.len() as i32,
        Discipline::Sequential,
    )
    .unwrap();

    let before = core.stat("/data/f").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));

    let n = core.write(fh, b"hello", 3).unwrap();
    assert_eq!(n, 5);

    let after = core.stat("/data/f").unwrap();
    assert_eq!(after.size, 8);
    assert!(after.mtime > before.mtime);
    core.close(fh).unwrap();
}

#[test]
fn trunc_route_adopts_new_size_without_blob_storage() {
    let core = seeded_core();
    let fh = core.create("/data/rt", 0o644).unwrap();

    core.route_trunc(
        "/data/rt",
        |_core, _meta, _entry, _new_size, _hd| 0,
        Discipline::Sequential,
    )
    .unwrap();

    core.ftruncate(fh, 99).unwrap();
    assert_eq!(core.stat("/data/rt").unwrap().size, 99);

    // The blob never grew; default read zero-fills up to the recorded
    // size.
    let mut buf = [0xffu8; 32];
    let n = core.read(fh, &mut buf, 90).unwrap();
    assert_eq!(n, 9);
    assert_eq!(&buf[..n], &[0u8; 9]);
    core.close(fh).unwrap();
}

#[test]
fn default_write_truncate_read_round_trip() {
    let core = seeded_core();
    let fh = core.create("/data/plain", 0o644).unwrap();

    assert_eq!(core.write(fh, b"0123456789", 0).unwrap(), 10);
    core.truncate("/data/plain", 4).unwrap();
    assert_eq!(core.stat("/data/plain").unwrap().size, 4);

    let mut buf = [0u8; 16];
    let n = core.read(fh, &mut buf, 0).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf[..n], b"0123");
    core.close(fh).unwrap();
}

#[test]
fn stat_route_rewrites_attributes() {
    let core = seeded_core();
    let fh = core.create("/data/big", 0o644).unwrap();
    core.close(fh).unwrap();

    core.route_stat(
        "/data/big",
        |_core, _meta, _entry, st| {
            st.size = 4096;
            0
        },
        Discipline::Concurrent,
    )
    .unwrap();

    assert_eq!(core.stat("/data/big").unwrap().size, 4096);
}

#[test]
fn readdir_route_filters_listing() {
    let core = seeded_core();
    for name in ["/data/.hidden", "/data/visible"] {
        let fh = core.create(name, 0o644).unwrap();
        core.close(fh).unwrap();
    }

    core.route_readdir(
        "/data",
        |_core, _meta, _entry, dents| {
            dents.retain(|d| !d.name.starts_with('.'));
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let names: Vec<String> = core
        .readdir("/data")
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["visible".to_string()]);
}

#[test]
fn mknod_route_sees_mode_and_dev() {
    let core = seeded_core();

    let seen = Arc::new(Mutex::new(None));
    let seen_cb = seen.clone();
    core.route_mknod(
        "/data/fifo",
        move |_core, _meta, _entry, mode, dev, _inode_data| {
            *seen_cb.lock().unwrap() = Some((mode, dev));
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let mode = libc::S_IFIFO as u32 | 0o600;
    core.mknod("/data/fifo", mode, 5).unwrap();

    assert_eq!(*seen.lock().unwrap(), Some((mode, 5)));
    let st = core.stat("/data/fifo").unwrap();
    assert_eq!(st.kind, EntryKind::Fifo);
    assert_eq!(st.mode, 0o600);
    assert_eq!(st.rdev, 5);
}

#[test]
fn mkdir_route_sees_captures() {
    let core = seeded_core();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    core.route_mkdir(
        "/data/([^/]+)",
        move |_core, meta, _entry, _mode, _inode_data| {
            *seen_cb.lock().unwrap() = meta.captures().to_vec();
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    core.mkdir("/data/sub", 0o700).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["sub".to_string()]);
    assert_eq!(core.stat("/data/sub").unwrap().kind, EntryKind::Dir);
}

#[test]
fn rename_route_sees_both_paths_and_locked_parents() {
    let core = seeded_core();
    core.mkdir("/src", 0o755).unwrap();
    core.mkdir("/dst", 0o755).unwrap();
    let fh = core.create("/src/a", 0o644).unwrap();
    core.close(fh).unwrap();

    let seen = Arc::new(Mutex::new(None));
    let seen_cb = seen.clone();
    core.route_rename(
        "/src/.*",
        move |_core, meta, _entry, new_path, dest| {
            let parents_locked = meta.parent().map(|p| p.is_locked_exclusive()).unwrap_or(false)
                && meta
                    .new_parent()
                    .map(|p| p.is_locked_exclusive())
                    .unwrap_or(false);
            *seen_cb.lock().unwrap() = Some((
                meta.path().to_string(),
                new_path.to_string(),
                parents_locked,
                dest.is_some(),
            ));
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    core.rename("/src/a", "/dst/b").unwrap();

    let (path, new_path, parents_locked, dest_existed) =
        seen.lock().unwrap().take().expect("handler ran");
    assert_eq!(path, "/src/a");
    assert_eq!(new_path, "/dst/b");
    assert!(parents_locked);
    assert!(!dest_existed);

    core.stat("/dst/b").unwrap();
    assert!(matches!(core.stat("/src/a"), Err(RouteFsError::NotFound(_))));
}

#[test]
fn inode_payload_flows_from_create_to_detach() {
    let core = seeded_core();

    core.route_create(
        "/data/tracked",
        |_core, _meta, _entry, _mode, inode_data, _handle_data| {
            *inode_data = Some(Arc::new("payload".to_string()));
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let delivered = Arc::new(Mutex::new(None));
    let delivered_cb = delivered.clone();
    core.route_detach(
        "/data/tracked",
        move |_core, _meta, _entry, inode_data| {
            *delivered_cb.lock().unwrap() =
                inode_data.and_then(|d| d.downcast_ref::<String>().cloned());
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let fh = core.create("/data/tracked", 0o644).unwrap();
    core.close(fh).unwrap();
    core.unlink("/data/tracked").unwrap();

    assert_eq!(delivered.lock().unwrap().clone(), Some("payload".to_string()));
}

#[test]
fn handle_payload_flows_from_open_to_read_and_close() {
    let core = seeded_core();
    let fh = core.create("/data/h", 0o644).unwrap();
    core.close(fh).unwrap();

    core.route_open(
        "/data/h",
        |_core, _meta, _entry, _flags, handle_data| {
            *handle_data = Some(Arc::new(7u32));
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let read_saw = Arc::new(Mutex::new(None));
    let read_cb = read_saw.clone();
    core.route_read(
        "/data/h",
        move |_core, _meta, _entry, _buf, _off, handle_data| {
            *read_cb.lock().unwrap() = handle_data.and_then(|d| d.downcast_ref::<u32>().copied());
            0
        },
        Discipline::Concurrent,
    )
    .unwrap();

    let close_saw = Arc::new(Mutex::new(None));
    let close_cb = close_saw.clone();
    core.route_close(
        "/data/h",
        move |_core, _meta, _entry, handle_data| {
            *close_cb.lock().unwrap() = handle_data.and_then(|d| d.downcast_ref::<u32>().copied());
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let fh = core.open("/data/h", 0).unwrap();
    let mut buf = [0u8; 1];
    core.read(fh, &mut buf, 0).unwrap();
    core.close(fh).unwrap();

    assert_eq!(*read_saw.lock().unwrap(), Some(7));
    assert_eq!(*close_saw.lock().unwrap(), Some(7));
}

#[test]
fn catch_all_pattern_reaches_root_and_everything_else() {
    let core = seeded_core();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    core.route_stat(
        ROUTE_ANY,
        move |_core, _meta, _entry, _st| {
            h.fetch_add(1, Ordering::SeqCst);
            0
        },
        Discipline::Concurrent,
    )
    .unwrap();

    core.stat("/").unwrap();
    core.stat("/data").unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn sync_route_fires_on_fsync() {
    let core = seeded_core();
    let fh = core.create("/data/s", 0o644).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    core.route_sync(
        ROUTE_ANY,
        move |_core, _meta, _entry| {
            h.fetch_add(1, Ordering::SeqCst);
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    core.fsync(fh).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    core.close(fh).unwrap();
}

#[test]
fn open_with_o_trunc_runs_the_trunc_route() {
    let core = seeded_core();
    let fh = core.create("/data/t", 0o644).unwrap();
    core.write(fh, b"keep me", 0).unwrap();
    core.close(fh).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let h = seen.clone();
    core.route_trunc(
        "/data/t",
        move |_core, _meta, _entry, new_size, _hd| {
            assert_eq!(new_size, 0);
            h.fetch_add(1, Ordering::SeqCst);
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let fh = core.open("/data/t", libc::O_TRUNC).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(core.stat("/data/t").unwrap().size, 0);
    core.close(fh).unwrap();
}

#[test]
fn handles_stay_unique_within_an_op() {
    let core = seeded_core();

    let h0 = core
        .route_sync(ROUTE_ANY, |_c, _m, _e| 0, Discipline::Sequential)
        .unwrap();
    let h1 = core
        .route_sync(ROUTE_ANY, |_c, _m, _e| 0, Discipline::Sequential)
        .unwrap();
    assert_ne!(h0, h1);

    // A revoked slot is never handed to a later registration.
    core.unroute_sync(h0).unwrap();
    let h2 = core
        .route_sync(ROUTE_ANY, |_c, _m, _e| 0, Discipline::Sequential)
        .unwrap();
    assert_ne!(h2, h0);
    assert_ne!(h2, h1);

    core.unroute_sync(h1).unwrap();
    core.unroute_sync(h2).unwrap();
}

#[test]
fn opendir_dispatches_the_open_route() {
    let core = seeded_core();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    core.route_open(
        "/data",
        move |_core, _meta, _entry, flags, _hd| {
            assert!(flags & libc::O_DIRECTORY != 0);
            h.fetch_add(1, Ordering::SeqCst);
            0
        },
        Discipline::Sequential,
    )
    .unwrap();

    let fh = core.opendir("/data").unwrap();
    core.closedir(fh).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Plain open refuses directories before any route is consulted.
    assert!(matches!(
        core.open("/data", 0),
        Err(RouteFsError::IsADirectory(_))
    ));
}

#[test]
fn discipline_round_trips_through_raw_values() {
    assert_eq!(Discipline::try_from(1).unwrap(), Discipline::Sequential);
    assert_eq!(Discipline::try_from(2).unwrap(), Discipline::Concurrent);
    assert_eq!(Discipline::try_from(3).unwrap(), Discipline::InodeSequential);
    assert!(matches!(
        Discipline::try_from(0),
        Err(RouteFsError::BadDiscipline(0))
    ));
}
