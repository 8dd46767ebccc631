// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end scenarios against both providers

use bytes::Bytes;
use rfm_core::config::{BackendKind, ListPolicy, RestrictionRules, ThumbnailLocation};
use rfm_core::{Access, ByteRange, Config, RfmError, RfmResult, StorageProvider, VirtualPath};
use rfm_manager::{FileManager, ThumbnailRenderer};
use rfm_providers::{MemoryObjectClient, ProviderSet};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    manager: FileManager,
    providers: ProviderSet,
    client: Option<Arc<MemoryObjectClient>>,
    _dir: Option<TempDir>,
}

impl Harness {
    fn local(config: Config) -> Self {
        Self::local_with(config, |builder| builder)
    }

    fn local_with(
        mut config: Config,
        customize: impl FnOnce(rfm_manager::FileManagerBuilder) -> rfm_manager::FileManagerBuilder,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        config.local.root = dir.path().to_path_buf();
        let providers = ProviderSet::from_config(&config).unwrap();
        let builder = FileManager::builder(config, providers.clone()).renderer(renderer());
        Self {
            manager: customize(builder).build().unwrap(),
            providers,
            client: None,
            _dir: Some(dir),
        }
    }

    fn object(mut config: Config, allow_bulk: bool) -> Self {
        config.storage.backend = BackendKind::Object;
        config.object.bucket = "files".into();
        config.object.allow_bulk = allow_bulk;
        let client = Arc::new(MemoryObjectClient::new("files"));
        let providers = ProviderSet::object(&config, client.clone());
        let manager = FileManager::builder(config, providers.clone())
            .renderer(renderer())
            .build()
            .unwrap();
        Self {
            manager,
            providers,
            client: Some(client),
            _dir: None,
        }
    }

    /// Both providers, with folder-wide operations allowed on the object store.
    fn both(config: Config) -> Vec<Harness> {
        vec![Self::local(config.clone()), Self::object(config, true)]
    }

    fn client(&self) -> &MemoryObjectClient {
        self.client.as_deref().unwrap()
    }

    fn label(&self) -> &'static str {
        if self.client.is_some() { "object" } else { "local" }
    }

    async fn thumb_exists(&self, path: &str) -> bool {
        self.providers
            .thumbnails
            .exists(&VirtualPath::new(path))
            .await
            .unwrap()
    }
}

fn renderer() -> Arc<dyn ThumbnailRenderer> {
    Arc::new(|source: &[u8], _extension: &str| -> RfmResult<Bytes> {
        Ok(Bytes::from(format!("thumb of {} bytes", source.len())))
    })
}

fn names(items: &[rfm_core::ItemInfo]) -> Vec<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

fn zip_of(members: &[(&str, &str)]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in members {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

#[tokio::test]
async fn resolved_paths_stay_under_root() {
    for h in Harness::both(Config::default()) {
        let root = h.manager.resolve("/").await.unwrap().absolute_path;
        for raw in ["../../etc/passwd", "/a/../../b", "a//b/./c/", "..\\..\\x", "/docs/../.."] {
            let item = h.manager.resolve(raw).await.unwrap();
            assert!(item.absolute_path.starts_with(&root), "{}: {}", h.label(), raw);
            assert!(
                !item.absolute_path.split('/').any(|segment| segment == ".."),
                "{}: {}",
                h.label(),
                raw
            );
        }
    }
}

#[tokio::test]
async fn rename_folder_then_list() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "docs").await.unwrap();
        m.upload("/docs/", "a.txt", Bytes::from_static(b"hello")).await.unwrap();

        let renamed = m.rename("/docs/", "reports").await.unwrap();
        assert_eq!(renamed.id, "/reports/");

        let listed = m.get_folder("/reports/").await.unwrap();
        assert_eq!(names(&listed), vec!["/reports/a.txt"], "{}", h.label());

        let err = m.get_folder("/docs/").await.unwrap_err();
        assert!(matches!(err, RfmError::PathNotFound { .. }), "{}: {:?}", h.label(), err);
    }
}

#[tokio::test]
async fn folder_rename_carries_thumbnails() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "docs").await.unwrap();
        m.upload("/docs/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
        let thumb = m.get_image("/docs/pic.png", true).await.unwrap();
        assert_eq!(&thumb[..], b"thumb of 6 bytes");
        assert!(h.thumb_exists("/_thumbs/docs/pic.png").await, "{}", h.label());

        m.rename("/docs/", "reports").await.unwrap();

        assert!(h.thumb_exists("/_thumbs/reports/pic.png").await, "{}", h.label());
        assert!(!h.thumb_exists("/_thumbs/docs/pic.png").await, "{}", h.label());
        assert!(!h.thumb_exists("/_thumbs/docs/").await, "{}", h.label());
    }
}

#[tokio::test]
async fn move_without_thumbnail_parent_drops_thumbnail() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "a").await.unwrap();
        m.add_folder("/", "b").await.unwrap();
        m.upload("/a/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
        m.get_image("/a/pic.png", true).await.unwrap();

        m.move_item("/a/pic.png", "/b/").await.unwrap();

        assert!(!h.thumb_exists("/_thumbs/a/pic.png").await, "{}", h.label());
        assert!(!h.thumb_exists("/_thumbs/b/pic.png").await, "{}", h.label());
        assert_eq!(&m.get_image("/b/pic.png", false).await.unwrap()[..], b"pixels");
    }
}

#[tokio::test]
async fn copy_without_thumbnail_parent_creates_no_thumbnail() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "src").await.unwrap();
        m.add_folder("/", "dst").await.unwrap();
        m.upload("/src/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
        m.get_image("/src/pic.png", true).await.unwrap();

        let copied = m.copy("/src/pic.png", "/dst/").await.unwrap();
        assert_eq!(copied.id, "/dst/pic.png");

        assert!(h.thumb_exists("/_thumbs/src/pic.png").await, "{}", h.label());
        assert!(!h.thumb_exists("/_thumbs/dst/pic.png").await, "{}", h.label());
    }
}

#[tokio::test]
async fn deleting_root_is_refused() {
    for h in [Harness::local(Config::default()), Harness::object(Config::default(), true)] {
        let err = h.manager.delete("/").await.unwrap_err();
        assert!(matches!(err, RfmError::RootFolderProtected), "{}: {:?}", h.label(), err);
        let err = h.manager.rename("/", "elsewhere").await.unwrap_err();
        assert!(matches!(err, RfmError::RootFolderProtected), "{}", h.label());
    }
}

#[tokio::test]
async fn delete_removes_item_and_thumbnail() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "docs").await.unwrap();
        m.upload("/docs/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
        m.get_image("/docs/pic.png", true).await.unwrap();

        let deleted = m.delete("/docs/").await.unwrap();
        assert_eq!(deleted.id, "/docs/");
        assert!(m.get_folder("/").await.unwrap().is_empty(), "{}", h.label());
        assert!(!h.thumb_exists("/_thumbs/docs/pic.png").await, "{}", h.label());
    }
}

#[tokio::test]
async fn object_store_bulk_flag_blocks_folder_move() {
    let h = Harness::object(Config::default(), false);
    let m = &h.manager;
    m.add_folder("/", "docs").await.unwrap();
    m.add_folder("/", "archive").await.unwrap();
    m.upload("/docs/", "a.txt", Bytes::from_static(b"a")).await.unwrap();
    let before = h.client().keys();

    let err = m.move_item("/docs/", "/archive/").await.unwrap_err();
    assert!(matches!(err, RfmError::ForbiddenBulkOperation { .. }), "{:?}", err);
    let err = m.delete("/docs/").await.unwrap_err();
    assert!(matches!(err, RfmError::ForbiddenBulkOperation { .. }));
    let err = m.download("/docs/").await.unwrap_err();
    assert!(matches!(err, RfmError::ForbiddenBulkOperation { .. }));

    assert_eq!(h.client().keys(), before);
    // single files still move
    m.move_item("/docs/a.txt", "/archive/").await.unwrap();
}

#[tokio::test]
async fn object_store_list_hides_grandchildren() {
    let h = Harness::object(Config::default(), false);
    for key in ["userfiles/a/", "userfiles/a/b/", "userfiles/a/b/c"] {
        h.client().insert(key, Bytes::new());
    }
    let listed = h.manager.get_folder("/a/").await.unwrap();
    assert_eq!(names(&listed), vec!["/a/b/"]);
}

#[tokio::test]
async fn object_store_rename_stops_at_first_failure() {
    let h = Harness::object(Config::default(), true);
    let m = &h.manager;
    m.add_folder("/", "docs").await.unwrap();
    m.upload("/docs/", "a.txt", Bytes::from_static(b"a")).await.unwrap();
    m.upload("/docs/", "b.txt", Bytes::from_static(b"b")).await.unwrap();
    h.client().fail_on("copy", "userfiles/docs/b.txt");

    let err = m.rename("/docs/", "reports").await.unwrap_err();
    match err {
        RfmError::BackendOperationFailed { ref path, .. } => assert_eq!(path, "/docs/b.txt"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(
        h.client().keys(),
        vec!["userfiles/docs/b.txt", "userfiles/reports/", "userfiles/reports/a.txt"]
    );
}

#[tokio::test]
async fn thumbnail_folder_is_hidden() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.upload("/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
        m.get_image("/pic.png", true).await.unwrap();

        assert_eq!(names(&m.get_folder("/").await.unwrap()), vec!["/pic.png"], "{}", h.label());
        let err = m.get_folder("/_thumbs/").await.unwrap_err();
        assert!(matches!(err, RfmError::ForbiddenPath { .. }), "{}", h.label());
        let summary = m.summarize().await.unwrap();
        assert_eq!(summary.attributes.files, 1);
        assert_eq!(summary.attributes.folders, 0);
        assert_eq!(summary.attributes.size, 6);
    }
}

#[tokio::test]
async fn overwrite_invalidates_thumbnail() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.upload("/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
        m.get_image("/pic.png", true).await.unwrap();
        assert!(h.thumb_exists("/_thumbs/pic.png").await);

        m.replace("/pic.png", Bytes::from_static(b"new pixels")).await.unwrap();
        assert!(!h.thumb_exists("/_thumbs/pic.png").await, "{}", h.label());
        let thumb = m.get_image("/pic.png", true).await.unwrap();
        assert_eq!(&thumb[..], b"thumb of 10 bytes");
    }
}

#[tokio::test]
async fn read_only_mode() {
    let mut config = Config::default();
    config.security.read_only = true;
    let h = Harness::local(config);
    let m = &h.manager;

    let err = m.add_folder("/", "docs").await.unwrap_err();
    assert!(matches!(err, RfmError::ReadOnly { .. }));

    h.providers
        .content
        .write_file(&VirtualPath::new("/pic.png"), Bytes::from_static(b"pixels"))
        .await
        .unwrap();
    let info = m.get_file("/pic.png").await.unwrap();
    assert_eq!(info.attributes.writable, 0);
    assert_eq!(info.attributes.readable, 1);

    // rendered, served, not stored
    let thumb = m.get_image("/pic.png", true).await.unwrap();
    assert_eq!(&thumb[..], b"thumb of 6 bytes");
    assert!(!h.thumb_exists("/_thumbs/pic.png").await);
}

#[tokio::test]
async fn authorization_hook_denies() {
    let h = Harness::local_with(Config::default(), |builder| {
        builder.authorization(Arc::new(|path: &str, access: Access| {
            !(path.contains("/secret") && access == Access::Write)
        }))
    });
    let m = &h.manager;
    m.add_folder("/", "secret").await.unwrap();

    let err = m
        .upload("/secret/", "a.txt", Bytes::from_static(b"a"))
        .await
        .unwrap_err();
    assert!(matches!(err, RfmError::NotAuthorized { .. }));
    assert!(m.get_folder("/secret/").await.unwrap().is_empty());
}

#[tokio::test]
async fn extension_allow_list_on_upload() {
    let mut config = Config::default();
    config.security.extensions = RestrictionRules {
        policy: ListPolicy::AllowList,
        ignore_case: true,
        restrictions: vec!["png".into(), "txt".into()],
    };
    for h in Harness::both(config) {
        h.manager
            .upload("/", "photo.PNG", Bytes::from_static(b"p"))
            .await
            .unwrap();
        let err = h
            .manager
            .upload("/", "script.sh", Bytes::from_static(b"#!"))
            .await
            .unwrap_err();
        assert!(matches!(err, RfmError::ForbiddenExtension { .. }), "{}", h.label());
    }
}

#[tokio::test]
async fn upload_limits_and_name_collisions() {
    let mut config = Config::default();
    config.upload.file_size_limit = Some(4);
    for h in Harness::both(config) {
        let m = &h.manager;
        let err = m.upload("/", "big.txt", Bytes::from_static(b"12345")).await.unwrap_err();
        assert!(matches!(err, RfmError::SizeLimitExceeded { limit: 4, .. }));

        m.upload("/", "a.txt", Bytes::from_static(b"1")).await.unwrap();
        let second = m.upload("/", "a.txt", Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(names(&second), vec!["/a (1).txt"], "{}", h.label());

        let normalized = m.upload("/", "my \"notes\".txt", Bytes::from_static(b"3")).await.unwrap();
        assert_eq!(names(&normalized), vec!["/my_notes_.txt"], "{}", h.label());
    }
}

#[tokio::test]
async fn read_file_range() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.upload("/", "digits.txt", Bytes::from_static(b"0123456789")).await.unwrap();

        let read = m
            .read_file("/digits.txt", ByteRange::parse_header("bytes=2-4"))
            .await
            .unwrap();
        assert_eq!(&read.data[..], b"234", "{}", h.label());
        assert_eq!(read.content_range().as_deref(), Some("bytes 2-4/10"));

        let whole = m.read_file("/digits.txt", None).await.unwrap();
        assert_eq!(whole.data.len(), 10);
        assert!(whole.content_range().is_none());

        let err = m
            .read_file("/digits.txt", ByteRange::parse_header("bytes=50-"))
            .await
            .unwrap_err();
        assert!(matches!(err, RfmError::RangeNotSatisfiable { size: 10, .. }));
    }
}

#[tokio::test]
async fn extract_skips_forbidden_entries() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "out").await.unwrap();
        let archive = zip_of(&[
            ("docs/readme.txt", "read me"),
            ("docs/evil.php", "<?php"),
            ("top.txt", "top"),
        ]);
        m.upload("/", "bundle.zip", archive).await.unwrap();

        let items = m.extract("/bundle.zip", "/out/").await.unwrap();
        assert_eq!(names(&items), vec!["/out/docs/", "/out/top.txt"], "{}", h.label());

        let docs = m.get_folder("/out/docs/").await.unwrap();
        assert_eq!(names(&docs), vec!["/out/docs/readme.txt"], "{}", h.label());
        assert!(!h.providers.content.exists(&VirtualPath::new("/out/docs/evil.php")).await.unwrap());
    }
}

#[tokio::test]
async fn edit_and_save() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.upload("/", "note.txt", Bytes::from_static(b"draft")).await.unwrap();

        let edit = m.edit_file("/note.txt").await.unwrap();
        assert_eq!(edit.attributes.content.as_deref(), Some("draft"));

        let saved = m.save_file("/note.txt", "final text").await.unwrap();
        assert_eq!(saved.attributes.size, Some(10));

        let err = m.save_file("/", "x").await.unwrap_err();
        assert!(matches!(err, RfmError::FolderNotAllowed { .. }));
    }
}

#[tokio::test]
async fn folder_download_is_a_zip() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "docs").await.unwrap();
        m.upload("/docs/", "a.txt", Bytes::from_static(b"a")).await.unwrap();

        let download = m.download("/docs/").await.unwrap();
        assert_eq!(download.name, "docs.zip");
        let archive = zip::ZipArchive::new(Cursor::new(download.data)).unwrap();
        let mut members: Vec<&str> = archive.file_names().collect();
        members.sort();
        assert_eq!(members, vec!["docs/", "docs/a.txt"], "{}", h.label());

        let file = m.download("/docs/a.txt").await.unwrap();
        assert_eq!(file.name, "a.txt");
        assert_eq!(&file.data[..], b"a");
    }
}

#[tokio::test]
async fn move_folder_into_itself_is_refused() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "a").await.unwrap();
        m.add_folder("/a/", "b").await.unwrap();
        let err = m.move_item("/a/", "/a/b/").await.unwrap_err();
        assert!(matches!(err, RfmError::InvalidDestination { .. }), "{}", h.label());
    }
}

#[tokio::test]
async fn initiate_exposes_policy() {
    let h = Harness::local(Config::default());
    let json = serde_json::to_value(h.manager.initiate()).unwrap();
    assert_eq!(json["type"], "initiate");
    assert_eq!(json["attributes"]["config"]["security"]["read_only"], false);
    assert_eq!(json["attributes"]["config"]["security"]["extensions"]["policy"], "disallow_list");
    assert_eq!(json["attributes"]["config"]["upload"]["fileSizeLimit"], 16_000_000);
}

#[tokio::test]
async fn upload_onto_folder_name_is_refused() {
    for h in Harness::both(Config::default()) {
        let m = &h.manager;
        m.add_folder("/", "shell.php").await.unwrap();

        let err = m
            .upload("/", "shell.php", Bytes::from_static(b"<?php"))
            .await
            .unwrap_err();
        assert!(matches!(err, RfmError::AlreadyExists { .. }), "{}: {:?}", h.label(), err);
        assert_eq!(names(&m.get_folder("/").await.unwrap()), vec!["/shell.php/"], "{}", h.label());
    }

    let mut config = Config::default();
    config.upload.overwrite = true;
    for h in Harness::both(config) {
        let m = &h.manager;
        m.add_folder("/", "notes.txt").await.unwrap();
        m.upload("/notes.txt/", "inner.txt", Bytes::from_static(b"i")).await.unwrap();

        let err = m
            .upload("/", "notes.txt", Bytes::from_static(b"n"))
            .await
            .unwrap_err();
        assert!(matches!(err, RfmError::AlreadyExists { .. }), "{}: {:?}", h.label(), err);
        let inner = m.get_folder("/notes.txt/").await.unwrap();
        assert_eq!(names(&inner), vec!["/notes.txt/inner.txt"], "{}", h.label());
        assert!(m.get_file("/notes.txt").await.is_err(), "{}", h.label());
    }
}

#[tokio::test]
async fn free_upload_name_is_authorized() {
    let h = Harness::local_with(Config::default(), |builder| {
        builder.authorization(Arc::new(|path: &str, _access: Access| !path.contains(" (1)")))
    });
    let m = &h.manager;
    m.upload("/", "a.txt", Bytes::from_static(b"1")).await.unwrap();

    let err = m.upload("/", "a.txt", Bytes::from_static(b"2")).await.unwrap_err();
    assert!(matches!(err, RfmError::NotAuthorized { .. }), "{:?}", err);
    assert_eq!(names(&m.get_folder("/").await.unwrap()), vec!["/a.txt"]);
}

#[tokio::test]
async fn names_never_leave_their_folder() {
    let mut config = Config::default();
    config.security.normalize_filename = false;
    let h = Harness::local_with(config, |builder| {
        builder.authorization(Arc::new(|path: &str, access: Access| {
            !(path.contains("/evil") && access == Access::Write)
        }))
    });
    let m = &h.manager;
    m.add_folder("/", "docs").await.unwrap();

    for name in ["../evil", "a/b", "a\\b", "..", "."] {
        let err = m.add_folder("/docs/", name).await.unwrap_err();
        assert!(matches!(err, RfmError::InvalidName { .. }), "{}: {:?}", name, err);
    }
    let err = m
        .upload("/docs/", "../evil.txt", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, RfmError::InvalidName { .. }), "{:?}", err);

    // the hook sees the folder being created, not just its parent
    let err = m.add_folder("/docs/", "evil").await.unwrap_err();
    assert!(matches!(err, RfmError::NotAuthorized { .. }), "{:?}", err);

    assert_eq!(names(&m.get_folder("/").await.unwrap()), vec!["/docs/"]);
    assert!(m.get_folder("/docs/").await.unwrap().is_empty());
}

#[tokio::test]
async fn local_thumbnails_for_object_content() {
    let thumbs = TempDir::new().unwrap();
    let mut config = Config::default();
    config.thumbnails.location = ThumbnailLocation::Local;
    config.thumbnails.local_root = thumbs.path().to_path_buf();
    let h = Harness::object(config, true);
    let m = &h.manager;
    let on_disk = |relative: &str| thumbs.path().join(relative).exists();

    m.add_folder("/", "docs").await.unwrap();
    m.upload("/docs/", "pic.png", Bytes::from_static(b"pixels")).await.unwrap();
    m.get_image("/docs/pic.png", true).await.unwrap();
    assert!(on_disk("_thumbs/docs/pic.png"));

    m.rename("/docs/", "reports").await.unwrap();
    assert!(on_disk("_thumbs/reports/pic.png"));
    assert!(!on_disk("_thumbs/docs"));

    m.copy("/reports/pic.png", "/").await.unwrap();
    assert!(on_disk("_thumbs/pic.png"));

    m.delete("/reports/").await.unwrap();
    assert!(!on_disk("_thumbs/reports"));
    assert!(on_disk("_thumbs/pic.png"));

    assert!(
        h.client().keys().iter().all(|key| !key.contains("_thumbs")),
        "{:?}",
        h.client().keys()
    );
    assert_eq!(names(&m.get_folder("/").await.unwrap()), vec!["/pic.png"]);
}
