use std::sync::{Arc, Mutex};

use shiki_core::datastore::JsonStore;
use shiki_core::error::StoreError;
use shiki_core::model::{Category, Priority};
use shiki_core::remote::{DocId, Fields, RemoteStore, TASKS};
use shiki_core::stores::categories::DEFAULT_CATEGORIES;
use shiki_core::stores::files::{FileUpload, decode_data_uri};
use shiki_core::stores::{CategoryStore, FileStore, TaskStore};
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> Arc<dyn RemoteStore> {
    Arc::new(JsonStore::open(dir).expect("open datastore"))
}

fn upload(name: &str, bytes: &[u8]) -> FileUpload {
    FileUpload {
        name: name.to_string(),
        mime_type: "application/pdf".to_string(),
        bytes: bytes.to_vec(),
    }
}

#[test]
fn added_category_appears_exactly_once_in_the_next_snapshot() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut categories = CategoryStore::new(Arc::clone(&store));
    categories.start().expect("start");

    let seen: Arc<Mutex<Vec<Vec<Category>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    categories.on_change(move |snapshot| {
        sink.lock().expect("lock").push(snapshot.to_vec());
    });

    categories.add("会場情報").expect("add category");

    let snapshots = seen.lock().expect("lock");
    let last = snapshots.last().expect("at least one push");
    assert_eq!(
        last.iter().filter(|c| c.name == "会場情報").count(),
        1,
        "exactly one entry with the added name"
    );
}

#[test]
fn category_validation_rejects_empty_long_and_duplicate_names() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut categories = CategoryStore::new(store);
    categories.start().expect("start");

    assert!(matches!(
        categories.add("   "),
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        categories.add(&"あ".repeat(51)),
        Err(StoreError::Validation(_))
    ));
    categories.add(&"あ".repeat(50)).expect("50 chars is fine");

    categories.add("台本").expect("add");
    assert!(matches!(
        categories.add("台本"),
        Err(StoreError::Validation(_))
    ));
}

#[test]
fn seeding_fills_an_empty_collection_and_only_an_empty_one() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut categories = CategoryStore::new(store);
    categories.start().expect("start");

    assert_eq!(categories.seed_defaults().expect("seed"), DEFAULT_CATEGORIES.len());
    assert_eq!(categories.categories().len(), DEFAULT_CATEGORIES.len());

    assert_eq!(categories.seed_defaults().expect("seed again"), 0);
    assert_eq!(categories.categories().len(), DEFAULT_CATEGORIES.len());
}

#[test]
fn reupload_bumps_the_version_and_leaves_a_single_record() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut files = FileStore::new(store);
    files.start().expect("start");

    let v1 = files.upload("台本", upload("script.pdf", b"draft")).expect("upload");
    assert_eq!(v1, 1);

    let v2 = files
        .upload("台本", upload("script.pdf", b"final"))
        .expect("re-upload");
    assert_eq!(v2, 2);

    let matching: Vec<_> = files
        .records()
        .into_iter()
        .filter(|r| r.category_name == "台本" && r.name == "script.pdf")
        .collect();
    assert_eq!(matching.len(), 1, "old record retired, new one issued");
    assert_eq!(matching[0].version, 2);
    assert!(matching[0].content.starts_with("data:application/pdf;base64,"));

    // Same name in another category versions independently.
    let other = files
        .upload("席次", upload("script.pdf", b"seating"))
        .expect("upload elsewhere");
    assert_eq!(other, 1);
}

#[test]
fn stored_content_decodes_back_to_the_uploaded_bytes() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut files = FileStore::new(store);
    files.start().expect("start");

    files
        .upload("台本", upload("script.pdf", b"final draft"))
        .expect("upload");

    let record = files.find("台本", "script.pdf").expect("present");
    let (mime_type, bytes) = decode_data_uri(&record.content).expect("decode");
    assert_eq!(mime_type, "application/pdf");
    assert_eq!(bytes, b"final draft");
}

#[test]
fn deleting_a_category_cascades_to_its_files_only() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut categories = CategoryStore::new(Arc::clone(&store));
    let mut files = FileStore::new(Arc::clone(&store));
    categories.start().expect("start");
    files.start().expect("start");

    categories.add("台本").expect("add");
    categories.add("席次").expect("add");
    files.upload("台本", upload("script.pdf", b"a")).expect("upload");
    files.upload("台本", upload("notes.docx", b"b")).expect("upload");
    files.upload("席次", upload("chart.xlsx", b"c")).expect("upload");

    let doomed = categories.find("台本").expect("present");
    let removed = categories.delete(&doomed.id, &doomed.name).expect("delete");
    assert_eq!(removed, 2);

    assert!(categories.find("台本").is_none());
    assert!(categories.find("席次").is_some());

    let remaining = files.records();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].category_name, "席次");
}

#[test]
fn toggling_completion_flips_the_flag_and_refreshes_last_updated() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut tasks = TaskStore::new(store);
    tasks.start().expect("start");

    tasks
        .add("座席表を印刷", None, Priority::High, "準備物")
        .expect("add");
    let task = tasks.tasks().pop().expect("present");
    assert!(!task.completed);

    tasks.toggle_completion(&task.id).expect("toggle");
    let toggled = tasks.tasks().pop().expect("still present");
    assert!(toggled.completed);
    assert!(toggled.last_updated >= task.last_updated);
    assert_eq!(toggled.created, task.created, "created never changes");

    tasks.toggle_completion(&task.id).expect("toggle back");
    assert!(!tasks.tasks().pop().expect("present").completed);
}

#[test]
fn toggling_a_vanished_task_is_a_benign_not_found() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let mut tasks = TaskStore::new(store);
    tasks.start().expect("start");

    let err = tasks
        .toggle_completion(&DocId::from("gone"))
        .expect_err("must miss");
    assert!(err.is_benign());
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn update_of_a_missing_id_fails_but_delete_is_tolerated() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let missing = DocId::from("missing");
    let err = store
        .update(TASKS, &missing, Fields::new())
        .expect_err("update must fail");
    assert!(matches!(err, StoreError::NotFound(_)));

    store.delete(TASKS, &missing).expect("delete is idempotent-tolerant");
}

#[test]
fn documents_survive_a_store_reopen() {
    let temp = tempdir().expect("tempdir");

    {
        let store = open_store(temp.path());
        let mut tasks = TaskStore::new(store);
        tasks.start().expect("start");
        tasks
            .add("司会の原稿を確認", None, Priority::Medium, "台本")
            .expect("add");
    }

    let store = open_store(temp.path());
    let mut tasks = TaskStore::new(store);
    tasks.start().expect("start");
    let all = tasks.tasks();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].text, "司会の原稿を確認");
}
