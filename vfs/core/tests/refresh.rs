use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use vfs_core::{
    ArchiveFormat, ArchiveHandler, ArchiveSource, CancellationToken, FileAttributes, FileNode,
    FileSystemProvider, RefreshExecutor, Vfs, VfsConfig, VfsError, VfsErrorKind, VfsEvent,
    VfsResult,
};
use vfs_mem::{MemFs, MemFsConfig};

fn setup(executor: RefreshExecutor) -> (Vfs, MemFs) {
    let fs = MemFs::default();
    fs.write_file("/src/main.rs", b"fn main() {}").unwrap();
    fs.write_file("/src/util.rs", b"pub fn util() {}").unwrap();
    let vfs = Vfs::builder()
        .config(VfsConfig {
            refresh_executor: executor,
            ..VfsConfig::default()
        })
        .provider(Arc::new(fs.clone()))
        .build()
        .expect("vfs should build");
    (vfs, fs)
}

fn node(vfs: &Vfs, url: &str) -> FileNode {
    vfs.find_file_by_path(url).unwrap().expect("node resolves")
}

#[test]
fn external_content_change_is_picked_up() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let main = node(&vfs, "file:///src/main.rs");
    let stamp = main.mod_stamp();

    fs.write_file("/src/main.rs", b"fn main() { run() }").unwrap();
    assert_eq!(main.length(), 12);

    main.refresh(false, false).unwrap();
    assert_eq!(main.length(), 19);
    assert!(main.mod_stamp() > stamp);
    assert_eq!(main.as_cached().unwrap().modification_count(), 1);
}

#[test]
fn recursive_refresh_reports_created_and_deleted_children() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let src = node(&vfs, "file:///src");
    src.children().unwrap();
    let util = node(&vfs, "file:///src/util.rs");

    fs.write_file("/src/added.rs", b"").unwrap();
    fs.remove("/src/util.rs").unwrap();
    assert!(vfs.find_file_by_path("file:///src/added.rs").unwrap().is_none());

    vfs.refresh("file", false).unwrap();
    assert!(!util.exists());
    assert_eq!(
        src.children().unwrap().names(),
        ["added.rs".to_string(), "main.rs".to_string()]
    );
    assert!(vfs.find_file_by_path("file:///src/added.rs").unwrap().is_some());
}

#[test]
fn refresh_and_find_sees_new_files() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    node(&vfs, "file:///src").children().unwrap();
    fs.write_file("/src/late.rs", b"late").unwrap();

    assert!(vfs.find_file_by_path("file:///src/late.rs").unwrap().is_none());
    let found = vfs
        .refresh_and_find_file_by_path("file:///src/late.rs")
        .unwrap()
        .expect("refresh brings the file in");
    assert_eq!(found.read_bytes().unwrap(), b"late".to_vec());
}

#[test]
fn asynchronous_refresh_waits_for_the_executor() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let main = node(&vfs, "file:///src/main.rs");
    fs.write_file("/src/main.rs", b"changed").unwrap();

    main.refresh(true, false).unwrap();
    assert_eq!(vfs.refresh_queue().pending(), 1);
    assert_eq!(main.length(), 12);

    assert_eq!(vfs.refresh_queue().run_pending(), 1);
    assert_eq!(main.length(), 7);
}

#[test]
fn refresh_and_find_async_calls_back() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    node(&vfs, "file:///src").children().unwrap();
    fs.write_file("/src/later.rs", b"").unwrap();

    let (tx, rx) = crossbeam_channel::bounded(1);
    vfs.refresh_and_find_file_by_path_async("file:///src/later.rs", move |result| {
        tx.send(result.map(|found| found.map(|node| node.path().to_string())))
            .unwrap();
    });
    vfs.refresh_queue().run_pending();

    let found = rx.try_recv().expect("callback ran").unwrap();
    assert_eq!(found.as_deref(), Some("/src/later.rs"));
}

#[test]
fn background_executor_finishes_sessions() {
    let (vfs, fs) = setup(RefreshExecutor::Background);
    let util = node(&vfs, "file:///src/util.rs");
    fs.write_file("/src/util.rs", b"pub fn util2() {}").unwrap();

    let (tx, rx) = crossbeam_channel::bounded(1);
    let mut session = vfs.refresh_queue().create_session(
        true,
        false,
        Some(Box::new(move || {
            let _ = tx.send(());
        })),
    );
    session.add_file(util.clone());
    session.launch();

    rx.recv_timeout(Duration::from_secs(5))
        .expect("session should finish");
    assert_eq!(util.length(), 17);
    vfs.shutdown();
}

#[test]
fn cancelled_session_still_finishes() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let main = node(&vfs, "file:///src/main.rs");
    fs.write_file("/src/main.rs", b"edited").unwrap();

    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let mut session = vfs.refresh_queue().create_session(
        false,
        true,
        Some(Box::new(move || flag.store(true, Ordering::SeqCst))),
    );
    session.add_file(main.clone());
    session.add_event(VfsEvent::content_change("file", "/src/main.rs"));
    session.cancel();
    session.launch();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(main.length(), 12);
    assert_eq!(main.as_cached().unwrap().modification_count(), 0);
}

#[test]
fn vetoed_batches_change_nothing() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let main = node(&vfs, "file:///src/main.rs");
    fs.remove("/src/main.rs").unwrap();
    let events = vec![VfsEvent::delete("file", "/src/main.rs")];

    let mut seen = 0;
    assert!(!vfs.process_events_with(events.clone(), |batch| {
        seen = batch.len();
        false
    }));
    assert_eq!(seen, 1);
    assert!(main.exists());

    assert!(vfs.process_events_with(events, |_| true));
    assert!(!main.exists());
}

#[test]
fn forced_refresh_ignores_unchanged_metadata() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let main = node(&vfs, "file:///src/main.rs");
    let timestamp = main.timestamp();
    FileSystemProvider::write(&fs, "/src/main.rs", b"fn niam() {}", Some(timestamp)).unwrap();

    main.refresh(false, false).unwrap();
    assert_eq!(main.as_cached().unwrap().modification_count(), 0);

    vfs.force_sync_refresh(&main);
    assert_eq!(main.as_cached().unwrap().modification_count(), 1);
}

#[test]
fn moved_subtree_is_rediscovered_at_its_new_place() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    fs.create_dir_all("/dst").unwrap();
    let main = node(&vfs, "file:///src/main.rs");
    let dst = node(&vfs, "file:///dst");

    main.move_to(&dst).unwrap();
    assert!(!main.exists());
    assert!(vfs.find_file_by_path("file:///src/main.rs").unwrap().is_none());
    let moved = node(&vfs, "file:///dst/main.rs");
    assert_eq!(moved.read_bytes().unwrap(), b"fn main() {}".to_vec());
}

#[test]
fn copies_are_new_nodes() {
    let (vfs, _fs) = setup(RefreshExecutor::Deferred);
    let src = node(&vfs, "file:///src");
    let util = node(&vfs, "file:///src/util.rs");

    let copy = util.copy_to(&src, "util_copy.rs").unwrap();
    assert_ne!(copy, util);
    assert_eq!(copy.read_bytes().unwrap(), util.read_bytes().unwrap());
}

#[test]
fn unloading_a_provider_drops_its_roots() {
    let (vfs, _fs) = setup(RefreshExecutor::Deferred);
    let scratch = MemFs::new(MemFsConfig {
        protocol: "temp",
        ..MemFsConfig::default()
    });
    scratch.write_file("/t.txt", b"t").unwrap();
    vfs.register_provider(Arc::new(scratch)).unwrap();

    let local = node(&vfs, "file:///src");
    let temp = node(&vfs, "temp:///t.txt");
    assert_eq!(vfs.roots().len(), 2);

    vfs.unregister_provider("temp").unwrap();
    vfs.plugin_unloaded();
    assert_eq!(vfs.roots().len(), 1);
    assert!(!temp.exists());
    assert!(local.exists());
}

fn finish_flag() -> (Arc<AtomicBool>, vfs_core::FinishCallback) {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    (finished, Box::new(move || flag.store(true, Ordering::SeqCst)))
}

#[test]
fn shutdown_finishes_queued_sessions() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let main = node(&vfs, "file:///src/main.rs");
    fs.write_file("/src/main.rs", b"queued").unwrap();

    let (finished, on_finish) = finish_flag();
    vfs.refresh_queue()
        .refresh(true, false, Some(on_finish), [main.clone()]);
    assert_eq!(vfs.refresh_queue().pending(), 1);
    assert!(!finished.load(Ordering::SeqCst));

    vfs.shutdown();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(vfs.refresh_queue().pending(), 0);
    assert_eq!(vfs.refresh_queue().run_pending(), 0);
    assert_eq!(main.as_cached().unwrap().modification_count(), 0);
}

#[test]
fn async_lookup_queued_at_shutdown_reports_cancellation() {
    let (vfs, _fs) = setup(RefreshExecutor::Deferred);
    let (tx, rx) = crossbeam_channel::bounded(1);
    vfs.refresh_and_find_file_by_path_async("file:///src/main.rs", move |result| {
        tx.send(result.map(|found| found.is_some())).unwrap();
    });
    assert!(rx.try_recv().is_err());

    vfs.shutdown();
    let result = rx.try_recv().expect("callback ran");
    assert_eq!(result.unwrap_err().kind(), VfsErrorKind::Cancelled);
}

#[test]
fn sessions_launched_after_shutdown_still_finish() {
    for executor in [RefreshExecutor::Background, RefreshExecutor::Deferred] {
        let (vfs, _fs) = setup(executor);
        let main = node(&vfs, "file:///src/main.rs");
        vfs.shutdown();

        let (finished, on_finish) = finish_flag();
        let mut session = vfs.refresh_queue().create_session(true, false, Some(on_finish));
        session.add_file(main);
        session.launch();
        assert!(finished.load(Ordering::SeqCst));

        let (tx, rx) = crossbeam_channel::bounded(1);
        vfs.refresh_and_find_file_by_path_async("file:///src/main.rs", move |result| {
            tx.send(result.map(|found| found.is_some())).unwrap();
        });
        let result = rx.try_recv().expect("callback ran inline");
        assert_eq!(result.unwrap_err().kind(), VfsErrorKind::Cancelled);
    }
}

#[test]
fn cancelled_root_lookup_does_not_touch_the_provider() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    let provider = vfs.provider("file").expect("file provider");
    let calls = fs.stats().attributes();

    let token = CancellationToken::new();
    token.cancel();
    assert!(token.scope(|| vfs.find_root("/", &provider)).is_none());
    assert_eq!(fs.stats().attributes(), calls);

    assert!(vfs.find_root("/", &provider).is_some());
    assert!(fs.stats().attributes() > calls);
}

/// Archive listing one entry per line of the host; an entry's content is its name.
struct LinesHandler {
    entries: Vec<String>,
}

impl ArchiveHandler for LinesHandler {
    fn attributes(&self, relative: &str) -> Option<FileAttributes> {
        if relative.is_empty() {
            return Some(FileAttributes::directory(0));
        }
        self.entries
            .iter()
            .any(|entry| entry == relative)
            .then(|| FileAttributes::file(relative.len() as u64, 0))
    }

    fn list(&self, relative: &str) -> Vec<String> {
        if relative.is_empty() {
            self.entries.clone()
        } else {
            Vec::new()
        }
    }

    fn contents(&self, relative: &str) -> VfsResult<Vec<u8>> {
        match self.attributes(relative) {
            Some(attributes) if !attributes.is_directory() => Ok(relative.as_bytes().to_vec()),
            _ => Err(VfsError::new(VfsErrorKind::NotFound, "lines.contents")),
        }
    }

    fn clear_caches(&self) {}
}

struct LinesFormat;

impl ArchiveFormat for LinesFormat {
    fn protocol(&self) -> &'static str {
        "arc"
    }

    fn open(&self, source: ArchiveSource) -> VfsResult<Arc<dyn ArchiveHandler>> {
        let entries = String::from_utf8_lossy(&source.bytes)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(Arc::new(LinesHandler { entries }))
    }
}

#[test]
fn archive_events_are_mirrored_onto_the_host() {
    let (vfs, fs) = setup(RefreshExecutor::Deferred);
    fs.write_file("/pkg.arc", b"a\nb").unwrap();
    vfs.register_archive_format(Arc::new(LinesFormat), "file")
        .unwrap();
    let host = node(&vfs, "file:///pkg.arc");
    let root = node(&vfs, "arc:///pkg.arc!/");
    let entry = node(&vfs, "arc:///pkg.arc!/a");
    assert_eq!(entry.read_bytes().unwrap(), b"a".to_vec());
    let count = host.as_cached().unwrap().modification_count();

    assert!(vfs.process_events(vec![VfsEvent::content_change("arc", "/pkg.arc!/a")]));
    assert_eq!(host.as_cached().unwrap().modification_count(), count + 1);
    assert!(vfs.archive_handlers().contains("file", "/pkg.arc"));
    assert_eq!(vfs.refresh_queue().pending(), 0);

    fs.remove("/pkg.arc").unwrap();
    assert!(vfs.process_events(vec![VfsEvent::delete("arc", "/pkg.arc!/")]));
    assert!(!host.exists());
    assert!(!root.exists());
    assert!(!entry.exists());
    assert!(!vfs.archive_handlers().contains("file", "/pkg.arc"));
    assert!(vfs.find_file_by_path("file:///pkg.arc").unwrap().is_none());
    assert_eq!(vfs.refresh_queue().pending(), 0);
}
