use std::sync::Arc;

use pretty_assertions::assert_eq;
use vfs_core::{
    FileSystemProvider, Navigation, RefreshExecutor, SymlinkPolicy, TransientRoots, Vfs,
    VfsConfig, navigate,
};
use vfs_mem::{MemFs, MemFsConfig};

/// `/a` is a symlink to `/x/b`; `/c` and `/x/c` tell the two `..`
/// policies apart.
fn setup(policy: SymlinkPolicy) -> (Vfs, Arc<dyn FileSystemProvider>) {
    let fs = MemFs::default();
    fs.write_file("/x/b/inside.txt", b"inside").unwrap();
    fs.write_file("/x/c", b"posix").unwrap();
    fs.write_file("/c", b"lexical").unwrap();
    fs.symlink("/a", "/x/b").unwrap();

    let provider: Arc<dyn FileSystemProvider> = Arc::new(fs);
    let vfs = Vfs::builder()
        .config(VfsConfig {
            refresh_executor: RefreshExecutor::Deferred,
            navigation_policy: policy,
            ..VfsConfig::default()
        })
        .provider(provider.clone())
        .build()
        .expect("vfs should build");
    (vfs, provider)
}

fn contents_at(vfs: &Vfs, url: &str) -> Vec<u8> {
    vfs.find_file_by_path(url)
        .expect("lookup should succeed")
        .unwrap_or_else(|| panic!("{url} should resolve"))
        .read_bytes()
        .expect("read should succeed")
}

#[test]
fn lexical_dotdot_is_the_structural_parent() {
    let (vfs, _provider) = setup(SymlinkPolicy::Lexical);
    assert_eq!(contents_at(&vfs, "file:///a/../c"), b"lexical".to_vec());
}

#[test]
fn posix_light_dotdot_leaves_through_the_target() {
    let (vfs, _provider) = setup(SymlinkPolicy::PosixLight);
    assert_eq!(contents_at(&vfs, "file:///a/../c"), b"posix".to_vec());
}

#[test]
fn child_steps_through_a_symlink_stay_lexical() {
    for policy in [SymlinkPolicy::Lexical, SymlinkPolicy::PosixLight] {
        let (vfs, _provider) = setup(policy);
        let node = vfs
            .find_file_by_path("file:///a/inside.txt")
            .unwrap()
            .expect("entry behind the link resolves");
        assert_eq!(node.path(), "/a/inside.txt");
        assert_eq!(node.read_bytes().unwrap(), b"inside".to_vec());
    }
}

#[test]
fn lexical_round_trip_returns_to_the_same_node() {
    let (vfs, provider) = setup(SymlinkPolicy::Lexical);
    let direct = vfs
        .navigate(&provider, "/x/b/inside.txt", SymlinkPolicy::Lexical)
        .unwrap()
        .resolved()
        .expect("direct path resolves");
    let detour = vfs
        .navigate(&provider, "/x/./b/../b/inside.txt", SymlinkPolicy::Lexical)
        .unwrap()
        .resolved()
        .expect("detour resolves");
    assert_eq!(direct, detour);
}

#[test]
fn dotdot_above_the_root_is_unresolved() {
    let (vfs, provider) = setup(SymlinkPolicy::Lexical);
    let root = vfs.find_root("/", &provider).expect("root exists");
    match vfs.navigate(&provider, "/..", SymlinkPolicy::Lexical).unwrap() {
        Navigation::Unresolved(last) => assert_eq!(last, root),
        other => panic!("unexpected navigation: {other:?}"),
    }
}

#[test]
fn missing_segment_reports_the_last_node_reached() {
    let (vfs, provider) = setup(SymlinkPolicy::Lexical);
    match vfs
        .navigate(&provider, "/x/missing/deeper", SymlinkPolicy::Lexical)
        .unwrap()
    {
        Navigation::Unresolved(last) => assert_eq!(last.path(), "/x"),
        other => panic!("unexpected navigation: {other:?}"),
    }
}

#[test]
fn unknown_protocol_and_bare_paths() {
    let (vfs, _provider) = setup(SymlinkPolicy::Lexical);
    assert!(vfs.find_file_by_path("nope:///x/c").unwrap().is_none());

    let bare = vfs
        .find_file_by_path("/x/c")
        .unwrap()
        .expect("bare path is claimed by the local store");
    assert_eq!(bare.url(), "file:///x/c");
}

#[test]
fn transient_navigation_mints_nothing() {
    let (vfs, provider) = setup(SymlinkPolicy::PosixLight);
    let resolved = navigate(&TransientRoots, &provider, "/a/../c", SymlinkPolicy::PosixLight)
        .unwrap()
        .resolved()
        .expect("transient walk resolves");
    assert!(resolved.is_transient());
    assert_eq!(resolved.read_bytes().unwrap(), b"posix".to_vec());
    assert_eq!(vfs.cached_node_count(), 0);
}

#[test]
fn case_insensitive_store_shares_nodes_across_spellings() {
    let fs = MemFs::new(MemFsConfig {
        case_sensitive: false,
        ..MemFsConfig::default()
    });
    fs.write_file("/Docs/Guide.md", b"guide").unwrap();
    let vfs = Vfs::builder()
        .config(VfsConfig {
            refresh_executor: RefreshExecutor::Deferred,
            ..VfsConfig::default()
        })
        .provider(Arc::new(fs))
        .build()
        .unwrap();

    let upper = vfs.find_file_by_path("file:///DOCS/GUIDE.md").unwrap().unwrap();
    let lower = vfs.find_file_by_path("file:///docs/guide.md").unwrap().unwrap();
    assert_eq!(upper, lower);
    assert_eq!(upper.path(), "/Docs/Guide.md");
    assert_eq!(upper.name(), "Guide.md");

    let root = vfs.find_file_by_path("file:///").unwrap().unwrap();
    assert_eq!(root.children().unwrap().names(), ["Docs".to_string()]);
    let transient = vfs
        .find_transient_by_path("file:///docs/GUIDE.MD")
        .unwrap()
        .expect("transient resolves");
    assert_eq!(transient.path(), "/Docs/Guide.md");
}
