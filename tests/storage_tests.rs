use chrono::{Duration, Utc};
use resource_hub::hash::ContentHash;
use resource_hub::storage::models::{
    DerivativeOutput, DerivativeStatus, FileRecord, FileState, FileType, ImageRecord, KeepRecord,
    MediaKind, MomentMedia, MomentRecord, TodoRecord, UserProfile,
};
use resource_hub::storage::{Database, DatabaseError, ListFilter, Reservation, Viewer};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn keep(id: &str, owner: &str, is_public: bool, age_secs: i64) -> KeepRecord {
    let at = Utc::now() - Duration::seconds(age_secs);
    KeepRecord {
        id: id.to_string(),
        owner_id: owner.to_string(),
        title: format!("Keep {id}"),
        content: "some notes".to_string(),
        category: String::new(),
        is_public,
        view_count: 0,
        created_at: at,
        updated_at: at,
    }
}

fn todo(id: &str, pinned: bool, status: bool, age_secs: i64) -> TodoRecord {
    let at = Utc::now() - Duration::seconds(age_secs);
    TodoRecord {
        id: id.to_string(),
        owner_id: "alice".to_string(),
        title: format!("Todo {id}"),
        description: None,
        status,
        pinned,
        category: String::new(),
        is_public: false,
        created_at: at,
        updated_at: at,
    }
}

fn file_row(id: &str, content: &[u8]) -> FileRecord {
    let hash = ContentHash::compute(content);
    let now = Utc::now();
    FileRecord {
        id: id.to_string(),
        bucket: "local".to_string(),
        path: hash.object_path("files"),
        hash: hash.to_hex(),
        byte_size: content.len() as u64,
        mime_type: "text/plain".to_string(),
        file_type: FileType::Document,
        owner_id: "alice".to_string(),
        is_public: false,
        state: FileState::Reserved,
        media_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn profile(id: &str, group: Option<&str>) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: id.to_string(),
        email: format!("{id}@example.com"),
        avatar: None,
        group_id: group.map(str::to_string),
    }
}

fn image(id: &str, owner: &str) -> ImageRecord {
    let now = Utc::now();
    ImageRecord {
        id: id.to_string(),
        owner_id: owner.to_string(),
        is_public: false,
        category: String::new(),
        original_file_id: format!("{id}-original"),
        thumbnail_320x_file_id: format!("{id}-320"),
        compressed_file_id: None,
        thumbnail_768x_file_id: None,
        thumbnail_10x: vec![0xff, 0xd8],
        width: 10,
        height: 10,
        exif: None,
        address: None,
        derivative_status: DerivativeStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

fn ids<T>(rows: &[T], id_of: impl Fn(&T) -> &str) -> Vec<String> {
    rows.iter().map(|r| id_of(r).to_string()).collect()
}

// ============================================================================
// Generic entity operations
// ============================================================================

#[test]
fn test_insert_fetch_update_delete() {
    let (_dir, db) = test_db();
    db.insert(&keep("k1", "alice", false, 0)).unwrap();

    let fetched: KeepRecord = db.fetch("k1").unwrap().expect("keep should exist");
    assert_eq!(fetched.title, "Keep k1");

    let updated = db
        .update_owned::<KeepRecord, _>("k1", "alice", |k| k.title = "Renamed".to_string())
        .unwrap();
    assert_eq!(updated.title, "Renamed");
    assert!(updated.updated_at >= fetched.updated_at);

    db.delete_owned::<KeepRecord>("k1", "alice").unwrap();
    assert!(db.fetch::<KeepRecord>("k1").unwrap().is_none());
}

#[test]
fn test_foreign_owner_is_not_found() {
    let (_dir, db) = test_db();
    db.insert(&keep("k1", "alice", true, 0)).unwrap();

    assert!(matches!(
        db.update_owned::<KeepRecord, _>("k1", "bob", |k| k.title.clear()),
        Err(DatabaseError::NotFound)
    ));
    assert!(matches!(
        db.delete_owned::<KeepRecord>("k1", "bob"),
        Err(DatabaseError::NotFound)
    ));
    assert!(matches!(
        db.delete_owned::<KeepRecord>("missing", "alice"),
        Err(DatabaseError::NotFound)
    ));
    assert_eq!(db.fetch::<KeepRecord>("k1").unwrap().unwrap().title, "Keep k1");
}

#[test]
fn test_visibility_rules() {
    let (_dir, db) = test_db();
    db.insert(&keep("private", "alice", false, 0)).unwrap();
    db.insert(&keep("public", "alice", true, 1)).unwrap();

    let owner = Viewer::user("alice", vec![]);
    let member = Viewer::user("bob", vec!["alice".to_string(), "bob".to_string()]);
    let stranger = Viewer::user("carol", vec![]);
    let anonymous = Viewer::anonymous();

    let all = ListFilter::default();
    let seen = |viewer: &Viewer| {
        let rows = db.list_visible::<KeepRecord>(viewer, &all).unwrap();
        ids(&rows, |k| k.id.as_str())
    };

    assert_eq!(seen(&owner), vec!["private", "public"]);
    assert_eq!(seen(&member), vec!["private", "public"]);
    assert_eq!(seen(&stranger), vec!["public"]);
    assert_eq!(seen(&anonymous), vec!["public"]);

    assert!(db.fetch_visible::<KeepRecord>("private", &member).is_ok());
    assert!(matches!(
        db.fetch_visible::<KeepRecord>("private", &anonymous),
        Err(DatabaseError::NotFound)
    ));
}

#[test]
fn test_pages_concatenate_to_full_listing() {
    let (_dir, db) = test_db();
    for i in 0..7 {
        db.insert(&keep(&format!("k{i}"), "alice", true, i)).unwrap();
    }
    // Same timestamp: ties fall back to id order
    let at = Utc::now() - Duration::seconds(100);
    for id in ["tie-a", "tie-b"] {
        let mut k = keep(id, "alice", true, 0);
        k.created_at = at;
        db.insert(&k).unwrap();
    }

    let viewer = Viewer::anonymous();
    let filter = ListFilter::default();
    let rows = db.list_visible::<KeepRecord>(&viewer, &filter).unwrap();
    let full = ids(&rows, |k| k.id.as_str());
    assert_eq!(full.len(), 9);
    assert_eq!(full[7..], ["tie-b".to_string(), "tie-a".to_string()]);

    let mut paged = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = db
            .list_page::<KeepRecord>(&viewer, &filter, cursor.as_deref(), 2)
            .unwrap();
        assert!(page.items.len() <= 2);
        paged.extend(ids(&page.items, |k| k.id.as_str()));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(paged, full);
}

#[test]
fn test_unknown_cursor_is_rejected() {
    let (_dir, db) = test_db();
    db.insert(&keep("private", "alice", false, 0)).unwrap();

    // A row the viewer cannot see is not a valid cursor either
    let result = db.list_page::<KeepRecord>(
        &Viewer::anonymous(),
        &ListFilter::default(),
        Some("private"),
        10,
    );
    assert!(matches!(result, Err(DatabaseError::InvalidCursor(_))));
}

#[test]
fn test_category_and_text_filters() {
    let (_dir, db) = test_db();
    let mut work = keep("work", "alice", true, 0);
    work.category = "work".to_string();
    work.content = "Quarterly PLANNING".to_string();
    db.insert(&work).unwrap();
    let mut home = keep("home", "alice", true, 1);
    home.category = "home".to_string();
    db.insert(&home).unwrap();
    db.insert(&keep("none", "alice", true, 2)).unwrap();

    let viewer = Viewer::anonymous();
    let by_category = ListFilter {
        category: Some("work".to_string()),
        query: None,
    };
    assert_eq!(
        ids(&db.list_visible::<KeepRecord>(&viewer, &by_category).unwrap(), |k| k.id.as_str()),
        vec!["work"]
    );

    let by_text = ListFilter {
        category: None,
        query: Some("  planning ".to_string()),
    };
    assert_eq!(
        ids(&db.list_visible::<KeepRecord>(&viewer, &by_text).unwrap(), |k| k.id.as_str()),
        vec!["work"]
    );

    let counts = db.category_counts::<KeepRecord>(&viewer).unwrap();
    let pairs: Vec<(String, u64)> = counts.into_iter().map(|c| (c.category, c.count)).collect();
    assert_eq!(pairs, vec![("home".to_string(), 1), ("work".to_string(), 1)]);
}

#[test]
fn test_view_counter() {
    let (_dir, db) = test_db();
    db.insert(&keep("k1", "alice", true, 0)).unwrap();

    db.record_view::<KeepRecord>("k1").unwrap();
    db.record_view::<KeepRecord>("k1").unwrap();
    db.record_view::<KeepRecord>("missing").unwrap();

    assert_eq!(db.fetch::<KeepRecord>("k1").unwrap().unwrap().view_count, 2);
}

#[test]
fn test_todo_ordering() {
    let (_dir, db) = test_db();
    db.insert(&todo("done-old", false, true, 30)).unwrap();
    db.insert(&todo("open-old", false, false, 20)).unwrap();
    db.insert(&todo("open-new", false, false, 10)).unwrap();
    db.insert(&todo("pinned-done", true, true, 5)).unwrap();
    db.insert(&todo("pinned-open", true, false, 40)).unwrap();

    let viewer = Viewer::user("alice", vec![]);
    let order = ids(
        &db.list_visible::<TodoRecord>(&viewer, &ListFilter::default()).unwrap(),
        |t| t.id.as_str(),
    );
    assert_eq!(
        order,
        vec!["pinned-open", "pinned-done", "open-new", "open-old", "done-old"]
    );
}

// ============================================================================
// Moments
// ============================================================================

#[test]
fn test_moment_media_order_and_cascade() {
    let (_dir, db) = test_db();
    let now = Utc::now();
    let moment = MomentRecord {
        id: "m1".to_string(),
        owner_id: "alice".to_string(),
        content: "Beach day".to_string(),
        category: String::new(),
        is_public: true,
        view_count: 0,
        created_at: now,
        updated_at: now,
    };
    let media = vec![
        MomentMedia {
            kind: MediaKind::Image,
            media_id: "img-b".to_string(),
            sort: 1,
        },
        MomentMedia {
            kind: MediaKind::Image,
            media_id: "img-a".to_string(),
            sort: 0,
        },
    ];
    db.create_moment(&moment, &media).unwrap();

    let attached = db.moment_media("m1").unwrap();
    assert_eq!(ids(&attached, |m| m.media_id.as_str()), vec!["img-a", "img-b"]);

    let updated = db
        .update_moment(
            "m1",
            "alice",
            |m| m.content = "Beach evening".to_string(),
            Some(&media[..1]),
        )
        .unwrap();
    assert_eq!(updated.content, "Beach evening");
    assert_eq!(db.moment_media("m1").unwrap().len(), 1);

    db.delete_owned::<MomentRecord>("m1", "alice").unwrap();
    assert!(db.moment_media("m1").unwrap().is_empty());
}

// ============================================================================
// Content-addressed file rows
// ============================================================================

#[test]
fn test_reserve_commit_then_reuse() {
    let (_dir, db) = test_db();

    let Reservation::Reserved(reserved) = db.reserve_file(file_row("f1", b"abc")).unwrap() else {
        panic!("first upload should reserve");
    };
    assert_eq!(reserved.state, FileState::Reserved);
    let object = db.object_ref("local", &reserved.path).unwrap();
    assert_eq!((object.holders, object.stored), (1, false));

    let committed = db.commit_file("f1").unwrap();
    assert_eq!(committed.state, FileState::Committed);
    assert!(db.object_ref("local", &committed.path).unwrap().stored);

    let mut second = file_row("f2", b"abc");
    second.owner_id = "bob".to_string();
    second.is_public = true;
    let Reservation::Existing(shared) = db.reserve_file(second).unwrap() else {
        panic!("stored content should not need another write");
    };
    assert_eq!(shared.id, "f2");
    assert_eq!(shared.state, FileState::Committed);
    assert_eq!((shared.owner_id.as_str(), shared.is_public), ("bob", true));
    assert_eq!(db.object_ref("local", &shared.path).unwrap().holders, 2);

    let first: FileRecord = db.fetch("f1").unwrap().unwrap();
    assert_eq!((first.owner_id.as_str(), first.is_public), ("alice", false));
}

#[test]
fn test_concurrent_reservations_commit_separately() {
    let (_dir, db) = test_db();
    db.reserve_file(file_row("a", b"same")).unwrap();
    db.reserve_file(file_row("b", b"same")).unwrap();

    assert_eq!(db.commit_file("a").unwrap().id, "a");
    assert_eq!(db.commit_file("b").unwrap().id, "b");

    let object = db.object_ref("local", &file_row("x", b"same").path).unwrap();
    assert_eq!((object.holders, object.stored), (2, true));
    assert!(db.reserved_files().unwrap().is_empty());
}

#[test]
fn test_abort_keeps_object_of_pending_reservation() {
    let (_dir, db) = test_db();
    db.reserve_file(file_row("a", b"race")).unwrap();
    db.reserve_file(file_row("b", b"race")).unwrap();

    // a's write failed while b's is still in flight
    let aborted = db.abort_file("a").unwrap().expect("reserved row aborts");
    assert!(aborted.object_in_use);

    let committed = db.commit_file("b").unwrap();
    let object = db.object_ref("local", &committed.path).unwrap();
    assert_eq!((object.holders, object.stored), (1, true));

    let last = db.release_file("b").unwrap().expect("last holder");
    assert_eq!(last.id, "b");
}

#[test]
fn test_abort_and_release() {
    let (_dir, db) = test_db();

    db.reserve_file(file_row("f1", b"abc")).unwrap();
    let aborted = db.abort_file("f1").unwrap().expect("reserved row aborts");
    assert!(!aborted.object_in_use);
    assert!(db.fetch::<FileRecord>("f1").unwrap().is_none());
    assert!(db.abort_file("f1").unwrap().is_none());

    db.reserve_file(file_row("f2", b"abc")).unwrap();
    db.commit_file("f2").unwrap();
    db.reserve_file(file_row("f3", b"abc")).unwrap();

    // Committed rows are never aborted
    assert!(db.abort_file("f2").unwrap().is_none());

    assert!(db.release_file("f2").unwrap().is_none());
    assert!(db.release_file("f2").unwrap().is_none());
    let last = db.release_file("f3").unwrap().expect("last holder");
    assert_eq!(last.id, "f3");
    assert_eq!(db.object_ref("local", &last.path).unwrap().holders, 0);
}

#[test]
fn test_file_visibility_follows_media() {
    let (_dir, db) = test_db();
    db.upsert_user(profile("alice", Some("family"))).unwrap();
    db.upsert_user(profile("bob", Some("family"))).unwrap();
    db.create_image(&image("img", "alice")).unwrap();

    let mut original = file_row("img-original", b"pixels");
    original.file_type = FileType::Image;
    original.media_id = Some("img".to_string());
    original.is_public = true;

    let owner = Viewer::user("alice", db.group_user_ids("alice").unwrap());
    let member = Viewer::user("bob", db.group_user_ids("bob").unwrap());
    let stranger = Viewer::user("carol", vec![]);
    let anonymous = Viewer::anonymous();

    // The image is private, so its own public flag does not matter
    assert!(db.file_visible(&original, &owner).unwrap());
    assert!(db.file_visible(&original, &member).unwrap());
    assert!(!db.file_visible(&original, &stranger).unwrap());
    assert!(!db.file_visible(&original, &anonymous).unwrap());

    let mut generic = file_row("doc", b"pixels");
    generic.owner_id = "carol".to_string();
    generic.is_public = true;
    assert!(db.file_visible(&generic, &anonymous).unwrap());
    generic.is_public = false;
    assert!(db.file_visible(&generic, &stranger).unwrap());
    assert!(!db.file_visible(&generic, &owner).unwrap());

    db.delete_owned::<ImageRecord>("img", "alice").unwrap();
    assert!(!db.file_visible(&original, &owner).unwrap());
}

// ============================================================================
// Derivative queue
// ============================================================================

#[test]
fn test_derivative_task_lifecycle() {
    let (_dir, db) = test_db();
    db.create_image(&image("img-1", "alice")).unwrap();
    db.create_image(&image("img-2", "alice")).unwrap();

    let tasks = db.pending_tasks().unwrap();
    assert_eq!(ids(&tasks, |t| t.image_id.as_str()), vec!["img-1", "img-2"]);

    let ready = db
        .complete_derivatives(
            "img-1",
            DerivativeOutput {
                compressed_file_id: "c".to_string(),
                thumbnail_768x_file_id: "t".to_string(),
                exif: None,
                address: Some("Somewhere".to_string()),
            },
        )
        .unwrap();
    assert_eq!(ready.derivative_status, DerivativeStatus::Ready);
    assert_eq!(ready.compressed_file_id.as_deref(), Some("c"));

    assert_eq!(
        db.fail_derivative_attempt("img-2", "decode failed", 2).unwrap(),
        DerivativeStatus::Pending
    );
    assert_eq!(
        db.fail_derivative_attempt("img-2", "decode failed", 2).unwrap(),
        DerivativeStatus::Failed
    );
    let failed: ImageRecord = db.fetch("img-2").unwrap().unwrap();
    assert_eq!(failed.derivative_status, DerivativeStatus::Failed);
    assert!(failed.compressed_file_id.is_none());
    assert!(db.pending_tasks().unwrap().is_empty());
}

#[test]
fn test_deleting_image_drops_task() {
    let (_dir, db) = test_db();
    db.create_image(&image("img-1", "alice")).unwrap();
    db.delete_owned::<ImageRecord>("img-1", "alice").unwrap();

    assert!(db.pending_tasks().unwrap().is_empty());
    assert!(matches!(
        db.complete_derivatives(
            "img-1",
            DerivativeOutput {
                compressed_file_id: "c".to_string(),
                thumbnail_768x_file_id: "t".to_string(),
                exif: None,
                address: None,
            },
        ),
        Err(DatabaseError::NotFound)
    ));
}

// ============================================================================
// Users and groups
// ============================================================================

#[test]
fn test_upsert_user_tracks_group_membership() {
    let (_dir, db) = test_db();
    assert_eq!(db.group_user_ids("alice").unwrap(), vec!["alice"]);

    db.upsert_user(profile("alice", Some("family"))).unwrap();
    db.upsert_user(profile("bob", Some("family"))).unwrap();
    let mut members = db.group_user_ids("alice").unwrap();
    members.sort();
    assert_eq!(members, vec!["alice", "bob"]);

    db.upsert_user(profile("bob", Some("work"))).unwrap();
    assert_eq!(db.group_user_ids("alice").unwrap(), vec!["alice"]);
    assert_eq!(db.get_group("work").unwrap().unwrap().member_ids, vec!["bob"]);
}

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();
    db.insert(&keep("k1", "alice", true, 0)).unwrap();
    db.reserve_file(file_row("f1", b"abc")).unwrap();
    db.commit_file("f1").unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.rows, 2);
    assert_eq!(stats.files, 1);
    assert!(db.fetch::<KeepRecord>("k1").unwrap().is_none());
    assert_eq!(db.object_ref("local", &file_row("x", b"abc").path).unwrap().holders, 0);
}
