use std::collections::HashSet;
use std::io::{self, Cursor, Read};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWrite};

use stashfs_common::backend::{body_from_bytes, ByteReader, ObjectMeta, ObjectStore, StoreError};
use stashfs_common::breadcrumbs::build_breadcrumbs;
use stashfs_common::error::TreeError;
use stashfs_common::paths::{UserId, VirtualPath};
use stashfs_store::memory::MemoryStore;
use stashfs_vfs::{TreeManager, TreeOptions};

const USER: UserId = UserId(1);

fn path(raw: &str) -> VirtualPath {
    VirtualPath::parse(raw).unwrap()
}

fn tree_over(store: Arc<dyn ObjectStore>) -> TreeManager {
    TreeManager::new(store, TreeOptions { bulk_concurrency: 4, lock_stripes: 8 })
}

async fn seed(store: &Arc<dyn ObjectStore>, entries: &[(&str, &str)]) {
    for (key, data) in entries {
        store.put(key, body_from_bytes(*data)).await.unwrap();
    }
}

async fn keys(store: &Arc<dyn ObjectStore>, prefix: &str) -> Vec<String> {
    store.list(prefix).await.unwrap().into_iter().map(|m| m.key).collect()
}

async fn read_all(mut reader: ByteReader) -> String {
    let mut out = String::new();
    reader.read_to_string(&mut out).await.unwrap();
    out
}

/// Memory store that fails chosen calls and records every copy/delete.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_copy: HashSet<String>,
    fail_delete: HashSet<String>,
    log: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, body: ByteReader) -> Result<(), StoreError> {
        self.inner.put(key, body).await
    }

    async fn get(&self, key: &str) -> Result<ByteReader, StoreError> {
        self.inner.get(key).await
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        self.inner.stat(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.record(format!("delete {}", key));
        if self.fail_delete.contains(key) {
            return Err(StoreError::Unavailable("injected delete failure".into()));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        self.inner.list(prefix).await
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        self.record(format!("copy {}", src_key));
        if self.fail_copy.contains(src_key) {
            return Err(StoreError::Unavailable("injected copy failure".into()));
        }
        self.inner.copy(src_key, dst_key).await
    }
}

const PROJECT: &[(&str, &str)] = &[
    ("user-1/project/", ""),
    ("user-1/project/readme.md", "hello"),
    ("user-1/project/src/", ""),
    ("user-1/project/src/main.rs", "fn main() {}"),
    ("user-1/project/src/lib/util.rs", "pub fn util() {}"),
    ("user-1/project/assets/logo.png", "png"),
];

// ── Listing ──

#[tokio::test]
async fn test_list_collapses_descendants() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(store);

    let items = tree.list(USER, &path("project/")).await.unwrap();
    let names: Vec<(&str, bool)> = items.iter().map(|i| (i.name.as_str(), i.is_folder)).collect();
    assert_eq!(names, vec![("assets", true), ("src", true), ("readme.md", false)]);

    let assets = items.iter().find(|i| i.name == "assets").unwrap();
    assert!(assets.last_modified.is_none(), "implied folder has no marker");
    let src = items.iter().find(|i| i.name == "src").unwrap();
    assert!(src.last_modified.is_some());

    let root = tree.list(USER, &VirtualPath::root()).await.unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].path.to_string(), "project/");
}

#[tokio::test]
async fn test_empty_folder_differs_from_missing_folder() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let tree = tree_over(store);

    assert!(tree.list(USER, &VirtualPath::root()).await.unwrap().is_empty());
    let empty = tree.create_folder(USER, &VirtualPath::root(), "empty").await.unwrap();
    assert!(tree.list(USER, &empty).await.unwrap().is_empty());
    assert!(matches!(tree.list(USER, &path("missing/")).await, Err(TreeError::NotExists(_))));
}

#[tokio::test]
async fn test_users_are_isolated() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, &[("user-1/a.txt", "1"), ("user-10/b.txt", "10"), ("user-2/c.txt", "2")]).await;
    let tree = tree_over(store);

    let items = tree.list(USER, &VirtualPath::root()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "a.txt");
}

// ── Conflicts ──

#[tokio::test]
async fn test_repeated_mutations_conflict() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, &[("user-1/docs/a.txt", "a"), ("user-1/docs/b.txt", "b"), ("user-1/other/", "")]).await;
    let tree = tree_over(store);
    let root = VirtualPath::root();

    tree.create_folder(USER, &root, "new").await.unwrap();
    assert!(matches!(tree.create_folder(USER, &root, "new").await, Err(TreeError::AlreadyExists(_))));

    tree.upload_file(USER, &path("docs/"), "c.txt", body_from_bytes("c")).await.unwrap();
    assert!(matches!(
        tree.upload_file(USER, &path("docs/"), "c.txt", body_from_bytes("c")).await,
        Err(TreeError::AlreadyExists(_))
    ));

    assert!(matches!(
        tree.rename_file(USER, &path("docs/a.txt"), "b.txt").await,
        Err(TreeError::AlreadyExists(_))
    ));
    // "docs" exists only implicitly and still blocks a rename onto it.
    assert!(matches!(
        tree.rename_folder(USER, &path("other/"), "docs").await,
        Err(TreeError::AlreadyExists(_))
    ));
    assert!(matches!(
        tree.move_file(USER, &path("docs/a.txt"), &path("docs/")).await,
        Err(TreeError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_create_folder_requires_parent() {
    let tree = tree_over(Arc::new(MemoryStore::new()));
    assert!(matches!(
        tree.create_folder(USER, &path("nowhere/"), "x").await,
        Err(TreeError::NotExists(_))
    ));
    assert!(matches!(
        tree.create_folder(USER, &VirtualPath::root(), "bad?name").await,
        Err(TreeError::InvalidPath(_))
    ));
}

// ── Rename / move / copy ──

#[tokio::test]
async fn test_rename_folder_moves_every_key() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));

    let outcome = tree.rename_folder(USER, &path("project/"), "archive").await.unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.copied, PROJECT.len());
    assert_eq!(outcome.destination.to_string(), "archive/");
    assert_eq!(outcome.source_parent, VirtualPath::root());

    assert!(keys(&store, "user-1/project/").await.is_empty());
    let moved = keys(&store, "user-1/archive/").await;
    assert_eq!(moved.len(), PROJECT.len());
    assert!(moved.contains(&"user-1/archive/src/lib/util.rs".to_string()));

    let (info, reader) = tree.get_file_content(USER, &path("archive/src/main.rs")).await.unwrap();
    assert_eq!(info.size, 12);
    assert_eq!(read_all(reader).await, "fn main() {}");
}

#[tokio::test]
async fn test_move_folder_into_other_folder() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    seed(&store, &[("user-1/old/", "")]).await;
    let tree = tree_over(Arc::clone(&store));

    let outcome = tree.move_folder(USER, &path("project/src/"), &path("old/")).await.unwrap();
    assert_eq!(outcome.destination.to_string(), "old/src/");
    assert_eq!(outcome.source_parent.to_string(), "project/");
    assert_eq!(
        keys(&store, "user-1/old/").await,
        vec!["user-1/old/", "user-1/old/src/", "user-1/old/src/lib/util.rs", "user-1/old/src/main.rs"]
    );
    assert!(keys(&store, "user-1/project/src/").await.is_empty());
}

#[tokio::test]
async fn test_folder_cannot_move_into_itself() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));

    for dest in ["project/", "project/src/", "project/src/lib/"] {
        assert!(matches!(
            tree.move_folder(USER, &path("project/"), &path(dest)).await,
            Err(TreeError::AlreadyExists(_))
        ));
        assert!(matches!(
            tree.copy_folder(USER, &path("project/"), &path(dest), None).await,
            Err(TreeError::AlreadyExists(_))
        ));
    }
    assert_eq!(keys(&store, "user-1/").await.len(), PROJECT.len());
}

#[tokio::test]
async fn test_names_with_separator_are_rejected() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));
    let before = keys(&store, "user-1/").await;

    assert!(matches!(
        tree.create_folder(USER, &VirtualPath::root(), "ghost/child").await,
        Err(TreeError::InvalidPath(_))
    ));
    assert!(matches!(
        tree.rename_file(USER, &path("project/readme.md"), "sub/y.txt").await,
        Err(TreeError::InvalidPath(_))
    ));
    assert!(matches!(
        tree.rename_folder(USER, &path("project/src/"), "src/inner").await,
        Err(TreeError::InvalidPath(_))
    ));
    assert!(matches!(
        tree.copy_file(USER, &path("project/readme.md"), &path("project/"), Some("a/b.md")).await,
        Err(TreeError::InvalidPath(_))
    ));
    assert!(matches!(
        tree.copy_folder(USER, &path("project/src/"), &VirtualPath::root(), Some("x/y")).await,
        Err(TreeError::InvalidPath(_))
    ));

    assert_eq!(keys(&store, "user-1/").await, before);
    assert!(matches!(
        tree.validate_folder_exists(USER, &path("ghost/")).await,
        Err(TreeError::NotExists(_))
    ));
}

#[tokio::test]
async fn test_root_is_immutable() {
    let tree = tree_over(Arc::new(MemoryStore::new()));
    let root = VirtualPath::root();
    assert!(matches!(tree.rename_folder(USER, &root, "x").await, Err(TreeError::InvalidPath(_))));
    assert!(matches!(tree.delete_folder(USER, &root).await, Err(TreeError::InvalidPath(_))));
    assert!(matches!(tree.move_folder(USER, &root, &root).await, Err(TreeError::InvalidPath(_))));
}

#[tokio::test]
async fn test_move_into_missing_folder() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(store);
    assert!(matches!(
        tree.move_file(USER, &path("project/readme.md"), &path("nope/")).await,
        Err(TreeError::NotExists(_))
    ));
    assert!(matches!(
        tree.rename_file(USER, &path("project/missing.md"), "x.md").await,
        Err(TreeError::NotExists(_))
    ));
}

#[tokio::test]
async fn test_copy_keeps_source() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));

    tree.copy_folder(USER, &path("project/"), &VirtualPath::root(), Some("project-copy"))
        .await
        .unwrap();
    tree.copy_file(USER, &path("project/readme.md"), &path("project/src/"), None)
        .await
        .unwrap();

    assert_eq!(keys(&store, "user-1/project/").await.len(), PROJECT.len() + 1);
    assert_eq!(keys(&store, "user-1/project-copy/").await.len(), PROJECT.len());
    assert!(matches!(
        tree.copy_folder(USER, &path("project/"), &VirtualPath::root(), Some("project-copy")).await,
        Err(TreeError::AlreadyExists(_))
    ));
}

// ── Copy-then-delete ordering ──

#[tokio::test]
async fn test_copy_failure_deletes_nothing() {
    let flaky = Arc::new(FlakyStore {
        fail_copy: HashSet::from(["user-1/project/src/main.rs".to_string()]),
        ..Default::default()
    });
    let store: Arc<dyn ObjectStore> = flaky.clone();
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));

    let err = tree.rename_folder(USER, &path("project/"), "moved").await.unwrap_err();
    assert!(matches!(err, TreeError::StoreUnavailable(_)));

    assert!(flaky.log.lock().unwrap().iter().all(|e| e.starts_with("copy ")));
    assert_eq!(keys(&store, "user-1/project/").await.len(), PROJECT.len());
}

#[tokio::test]
async fn test_all_copies_precede_first_delete() {
    let flaky = Arc::new(FlakyStore::default());
    let store: Arc<dyn ObjectStore> = flaky.clone();
    let files: Vec<(String, String)> = (0..40)
        .map(|i| (format!("user-1/bulk/f{:02}.txt", i), format!("{}", i)))
        .collect();
    for (key, data) in &files {
        store.put(key, body_from_bytes(data.as_str())).await.unwrap();
    }
    let tree = tree_over(Arc::clone(&store));

    let outcome = tree.rename_folder(USER, &path("bulk/"), "bulk2").await.unwrap();
    assert_eq!(outcome.copied, 40);

    let log = flaky.log.lock().unwrap();
    let last_copy = log.iter().rposition(|e| e.starts_with("copy ")).unwrap();
    let first_delete = log.iter().position(|e| e.starts_with("delete ")).unwrap();
    assert!(last_copy < first_delete);
    assert_eq!(log.len(), 80);
}

#[tokio::test]
async fn test_delete_failure_reports_stale_keys() {
    let flaky = Arc::new(FlakyStore {
        fail_delete: HashSet::from(["user-1/project/readme.md".to_string()]),
        ..Default::default()
    });
    let store: Arc<dyn ObjectStore> = flaky.clone();
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));

    let outcome = tree.move_folder(USER, &path("project/"), &VirtualPath::root()).await;
    // Moving into its own parent is a conflict with itself.
    assert!(matches!(outcome, Err(TreeError::AlreadyExists(_))));

    let outcome = tree.rename_folder(USER, &path("project/"), "renamed").await.unwrap();
    assert!(!outcome.is_clean());
    assert_eq!(outcome.stale, vec!["project/readme.md".to_string()]);
    assert_eq!(keys(&store, "user-1/renamed/").await.len(), PROJECT.len());
    assert_eq!(keys(&store, "user-1/project/").await, vec!["user-1/project/readme.md"]);
}

// ── Delete ──

#[tokio::test]
async fn test_delete_folder_and_file() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(Arc::clone(&store));

    let parent = tree.delete_file(USER, &path("project/readme.md")).await.unwrap();
    assert_eq!(parent.to_string(), "project/");
    let parent = tree.delete_folder(USER, &path("project/src/")).await.unwrap();
    assert_eq!(parent.to_string(), "project/");

    assert_eq!(keys(&store, "user-1/").await, vec!["user-1/project/", "user-1/project/assets/logo.png"]);
    assert!(matches!(tree.delete_folder(USER, &path("project/src/")).await, Err(TreeError::NotExists(_))));
    assert!(matches!(tree.delete_file(USER, &path("project/readme.md")).await, Err(TreeError::NotExists(_))));
}

// ── Search and navigation ──

#[tokio::test]
async fn test_search_is_case_sensitive() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(
        &store,
        &[
            ("user-1/Report.txt", "a"),
            ("user-1/work/report_final.txt", "b"),
            ("user-1/notes.txt", "c"),
        ],
    )
    .await;
    let tree = tree_over(store);

    let hits = tree.search(USER, "report").await.unwrap();
    let paths: Vec<String> = hits.iter().map(|h| h.path.to_string()).collect();
    assert_eq!(paths, vec!["work/report_final.txt"]);

    let hits = tree.search(USER, "Report").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Report.txt");

    assert!(tree.search(USER, "missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_move_candidates() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    seed(&store, &[("user-1/other/deep/file.txt", "x")]).await;
    let tree = tree_over(store);

    let names = |v: Vec<VirtualPath>| v.iter().map(|p| p.to_string()).collect::<Vec<_>>();

    let candidates = names(tree.get_move_candidates(USER, &path("project/src/")).await.unwrap());
    assert_eq!(candidates, vec!["", "other/", "other/deep/", "project/assets/"]);

    let candidates = names(tree.get_move_candidates(USER, &path("project/readme.md")).await.unwrap());
    assert!(!candidates.contains(&"project/".to_string()));
    assert!(candidates.contains(&"project/src/lib/".to_string()));
    assert!(candidates.contains(&String::new()));

    assert!(matches!(
        tree.get_move_candidates(USER, &path("ghost/")).await,
        Err(TreeError::NotExists(_))
    ));
}

#[test]
fn test_breadcrumbs_follow_path() {
    let crumbs = build_breadcrumbs(&path("docs/2024/report.pdf"));
    let pairs: Vec<(String, String)> = crumbs.into_iter().map(|c| (c.name, c.path)).collect();
    assert_eq!(
        pairs,
        vec![("docs".to_string(), "docs".to_string()), ("2024".to_string(), "docs/2024".to_string())]
    );
}

// ── Upload and export ──

#[tokio::test]
async fn test_upload_file_rules() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, &[("user-1/docs/", "")]).await;
    let tree = tree_over(Arc::clone(&store));

    let uploaded = tree
        .upload_file(USER, &path("docs/"), "report (final).pdf", body_from_bytes("pdf"))
        .await
        .unwrap();
    assert_eq!(uploaded.to_string(), "docs/report (final).pdf");

    for bad in ["a/b.txt", "bad?.txt", "..", ""] {
        assert!(matches!(
            tree.upload_file(USER, &path("docs/"), bad, body_from_bytes("x")).await,
            Err(TreeError::InvalidPath(_))
        ));
    }
    assert!(matches!(
        tree.upload_file(USER, &path("nowhere/"), "a.txt", body_from_bytes("x")).await,
        Err(TreeError::Upload { .. })
    ));
    assert!(store.stat("user-1/nowhere/").await.unwrap().is_none());
}

#[tokio::test]
async fn test_folder_upload_creates_markers() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, &[("user-1/existing/", "")]).await;
    let tree = tree_over(Arc::clone(&store));

    let mut session = tree.start_folder_upload(USER, &VirtualPath::root()).await.unwrap();
    session.add_file("photos/2024/a.jpg", body_from_bytes("a")).await.unwrap();
    session.add_file("photos/2024/b.jpg", body_from_bytes("b")).await.unwrap();
    session.add_file("photos/c.jpg", body_from_bytes("c")).await.unwrap();
    assert!(matches!(
        session.add_file("existing/x.jpg", body_from_bytes("x")).await,
        Err(TreeError::AlreadyExists(_))
    ));
    assert!(matches!(
        session.add_file("loose.jpg", body_from_bytes("x")).await,
        Err(TreeError::InvalidPath(_))
    ));
    let files = session.finish();
    assert_eq!(files.len(), 3);

    assert_eq!(
        keys(&store, "user-1/photos/").await,
        vec![
            "user-1/photos/",
            "user-1/photos/2024/",
            "user-1/photos/2024/a.jpg",
            "user-1/photos/2024/b.jpg",
            "user-1/photos/c.jpg",
        ]
    );
}

/// Sink that keeps each write separately.
#[derive(Default)]
struct ChunkSink {
    chunks: Vec<Vec<u8>>,
}

impl AsyncWrite for ChunkSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().chunks.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_zip_export_streams_entries_before_finish() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    let tree = tree_over(store);

    let mut sink = ChunkSink::default();
    tree.write_folder_content(USER, &path("project/"), &mut sink).await.unwrap();

    // Five entries: each closed one reaches the sink ahead of the central directory.
    assert!(sink.chunks.len() >= 5, "{} writes", sink.chunks.len());
    assert!(sink.chunks[0].starts_with(b"PK\x03\x04"));
    let end_marker = b"PK\x05\x06";
    let last = sink.chunks.len() - 1;
    for chunk in &sink.chunks[..last] {
        assert!(!chunk.windows(4).any(|w| w == end_marker));
    }
    assert!(sink.chunks[last].windows(4).any(|w| w == end_marker));

    let whole: Vec<u8> = sink.chunks.concat();
    let mut archive = zip::ZipArchive::new(Cursor::new(whole)).unwrap();
    assert_eq!(archive.len(), 5);
    let mut content = String::new();
    archive.by_name("readme.md").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "hello");
}

#[tokio::test]
async fn test_zip_export_preserves_structure() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    seed(&store, PROJECT).await;
    seed(&store, &[("user-1/project/empty/", ""), ("user-1/outside.txt", "no")]).await;
    let tree = tree_over(store);

    let mut sink: Vec<u8> = Vec::new();
    let summary = tree.write_folder_content(USER, &path("project/"), &mut sink).await.unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.folders, 2);

    let mut archive = zip::ZipArchive::new(Cursor::new(sink)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["assets/logo.png", "empty/", "readme.md", "src/", "src/lib/util.rs", "src/main.rs"]
    );

    let mut content = String::new();
    archive.by_name("src/lib/util.rs").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "pub fn util() {}");

    let mut whole: Vec<u8> = Vec::new();
    tree.write_folder_content(USER, &VirtualPath::root(), &mut whole).await.unwrap();
    let archive = zip::ZipArchive::new(Cursor::new(whole)).unwrap();
    assert!(archive.file_names().any(|n| n == "project/readme.md"));
    assert!(archive.file_names().any(|n| n == "outside.txt"));

    let mut missing: Vec<u8> = Vec::new();
    assert!(matches!(
        tree.write_folder_content(USER, &path("ghost/"), &mut missing).await,
        Err(TreeError::NotExists(_))
    ));
}
