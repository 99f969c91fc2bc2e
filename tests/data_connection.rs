mod common;
use crate::common::{init_tracing, with_timeout, RecordingSink};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use spine_items::config::DataConnectionItemConfig;
use spine_items::dc::{validate_url, DataConnection, DatabaseConnectionValidator, DbReference};
use spine_items::fs::mock::MockFileSystem;
use spine_items::fs::RealFileSystem;
use spine_items::item::{ExecutableItem, MessageKind};
use spine_items::resource::ResourceType;
use spine_items::watch::{
    spawn_manual_reference_watcher, ReferenceEvent, ReferenceWatcher, RefreshPolicy, WatchCommand,
};

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

fn fast_policy() -> RefreshPolicy {
    RefreshPolicy {
        interval: Duration::from_millis(50),
        attempts: 5,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ReferenceEvent>) -> ReferenceEvent {
    with_timeout(rx.recv()).await.expect("watcher event")
}

#[test]
fn renamed_reference_follows_the_file() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/proj/inputs/a.csv", "1");
    fs.add_file("/proj/inputs/b.csv", "2");

    let sink = RecordingSink::new();
    let mut dc = DataConnection::new("Inputs", "/proj", sink.logger("Inputs"));
    assert!(dc.add_file_reference("/proj/inputs/a.csv"));
    assert!(!dc.add_file_reference("/proj/inputs/a.csv"));

    let (mut watcher, initial) = dc.reference_watcher(Arc::new(fs.clone()));
    assert!(initial.is_empty());

    fs.rename("/proj/inputs/a.csv", "/proj/inputs/renamed.csv")
        .expect("rename");
    let events = watcher.handle_directory_changed(Path::new("/proj/inputs"));
    assert_eq!(
        events,
        vec![ReferenceEvent::Renamed {
            old: PathBuf::from("/proj/inputs/a.csv"),
            new: PathBuf::from("/proj/inputs/renamed.csv"),
        }]
    );
    assert!(watcher.references().contains(Path::new("/proj/inputs/renamed.csv")));

    assert!(dc.apply_reference_event(&events[0]));
    assert_eq!(dc.file_references(), &[PathBuf::from("/proj/inputs/renamed.csv")]);
    assert!(sink
        .messages(MessageKind::Msg)
        .iter()
        .any(|m| m.contains("renamed to")));
}

#[test]
fn unrelated_changes_do_not_touch_references() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/inputs/a.csv", "1");
    fs.add_file("/proj/inputs/b.csv", "2");
    let mut watcher = ReferenceWatcher::new(Arc::new(fs.clone()));
    assert_eq!(watcher.add_file_reference("/proj/inputs/a.csv"), None);

    fs.rename("/proj/inputs/b.csv", "/proj/inputs/c.csv").expect("rename");
    assert!(watcher
        .handle_directory_changed(Path::new("/proj/inputs"))
        .is_empty());
    assert!(watcher
        .handle_directory_changed(Path::new("/proj/elsewhere"))
        .is_empty());
}

#[test]
fn removed_reference_is_missing_until_it_returns() {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/inputs/a.csv", "1");
    let mut watcher = ReferenceWatcher::new(Arc::new(fs.clone()));
    watcher.add_file_reference("/proj/inputs/a.csv");

    assert!(fs.remove_file("/proj/inputs/a.csv"));
    let events = watcher.handle_directory_changed(Path::new("/proj/inputs"));
    assert_eq!(events, vec![ReferenceEvent::Missing(PathBuf::from("/proj/inputs/a.csv"))]);
    assert!(watcher.is_missing(Path::new("/proj/inputs/a.csv")));
    assert_eq!(watcher.recheck_missing(Path::new("/proj/inputs/a.csv")), None);

    fs.add_file("/proj/inputs/a.csv", "1 again");
    assert_eq!(
        watcher.recheck_missing(Path::new("/proj/inputs/a.csv")),
        Some(ReferenceEvent::Found(PathBuf::from("/proj/inputs/a.csv")))
    );
    assert!(watcher.missing().is_empty());
}

#[test]
fn watched_data_directory_reports_additions_and_removals() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj/data");
    let mut watcher = ReferenceWatcher::new(Arc::new(fs.clone()));
    watcher.watch_directory("/proj/data");

    fs.add_file("/proj/data/new.csv", "x");
    assert_eq!(
        watcher.handle_directory_changed(Path::new("/proj/data")),
        vec![ReferenceEvent::Added(PathBuf::from("/proj/data/new.csv"))]
    );
    fs.remove_file("/proj/data/new.csv");
    assert_eq!(
        watcher.handle_directory_changed(Path::new("/proj/data")),
        vec![ReferenceEvent::Removed(PathBuf::from("/proj/data/new.csv"))]
    );
}

#[tokio::test]
async fn watcher_loop_rechecks_missing_reference() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/proj/inputs/a.csv", "1");
    let mut watcher = ReferenceWatcher::new(Arc::new(fs.clone()));
    watcher.add_file_reference("/proj/inputs/a.csv");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let handle = spawn_manual_reference_watcher(watcher, fast_policy(), events_tx);

    fs.remove_file("/proj/inputs/a.csv");
    handle.send(WatchCommand::DirectoryChanged(PathBuf::from("/proj/inputs")));
    assert_eq!(
        next_event(&mut events_rx).await,
        ReferenceEvent::Missing(PathBuf::from("/proj/inputs/a.csv"))
    );

    // Saved again by an editor: no directory event, the recheck finds it.
    fs.add_file("/proj/inputs/a.csv", "2");
    assert_eq!(
        next_event(&mut events_rx).await,
        ReferenceEvent::Found(PathBuf::from("/proj/inputs/a.csv"))
    );

    let watcher = handle.shutdown().await.expect("watcher loop");
    assert!(watcher.missing().is_empty());
}

#[tokio::test]
async fn watcher_loop_accepts_new_references() {
    let fs = MockFileSystem::new();
    fs.add_dir("/proj/inputs");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let handle = spawn_manual_reference_watcher(
        ReferenceWatcher::new(Arc::new(fs.clone())),
        RefreshPolicy {
            interval: Duration::from_millis(20),
            attempts: 0,
        },
        events_tx,
    );

    handle.send(WatchCommand::AddReference(PathBuf::from("/proj/inputs/late.csv")));
    assert_eq!(
        next_event(&mut events_rx).await,
        ReferenceEvent::Missing(PathBuf::from("/proj/inputs/late.csv"))
    );
    fs.add_file("/proj/inputs/late.csv", "x");
    handle.send(WatchCommand::PathChanged(PathBuf::from("/proj/inputs/late.csv")));
    assert_eq!(
        next_event(&mut events_rx).await,
        ReferenceEvent::Found(PathBuf::from("/proj/inputs/late.csv"))
    );

    let watcher = handle.shutdown().await.expect("watcher loop");
    assert_eq!(watcher.references().len(), 1);
}

#[test]
fn forward_resources_cover_references_data_files_and_databases() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let project = tmp.path();
    let outside = tempfile::tempdir().expect("tempdir");
    let referenced = outside.path().join("ref.csv");
    std::fs::write(&referenced, b"a").expect("write");
    let gone = outside.path().join("gone.csv");

    let mut dc = DataConnection::new("My Data", project, RecordingSink::new().logger("My Data"));
    std::fs::create_dir_all(dc.data_dir()).expect("data dir");
    std::fs::write(dc.data_dir().join("local.csv"), b"b").expect("write");
    dc.add_file_reference(&referenced);
    dc.add_file_reference(&gone);
    assert!(dc.is_missing(&gone));

    let db_file = project.join("model.sqlite");
    std::fs::write(&db_file, SQLITE_HEADER).expect("write");
    dc.add_db_reference(DbReference::sqlite(&db_file));

    let resources = dc.output_resources_forward();
    let labels: Vec<&str> = resources.iter().map(|r| r.label.as_str()).collect();
    let referenced_label = referenced.to_string_lossy().replace('\\', "/");
    assert_eq!(
        labels,
        vec![
            referenced_label.as_str(),
            "My Data/local.csv",
            dc.db_references()[0].safe_url().as_str(),
        ]
    );
    assert_eq!(resources[2].type_, ResourceType::Database);
    assert_eq!(dc.data_files(), vec![dc.data_dir().join("local.csv")]);
}

#[tokio::test]
async fn data_connection_executes_trivially() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dc = DataConnection::new("DC", tmp.path(), RecordingSink::new().logger("DC"));
    assert!(dc.ready_to_execute());
    assert_eq!(
        dc.execute(&[], &[]).await,
        spine_items::item::ItemExecutionFinishState::Success
    );
}

#[test]
fn item_dict_round_trip_keeps_relative_references() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let project = tmp.path();
    let inside = project.join("inputs").join("a.csv");
    let json = serde_json::json!({
        "type": "Data Connection",
        "description": "raw inputs",
        "x": 10.0,
        "y": -5.0,
        "file_references": [
            {"type": "path", "relative": true, "path": "inputs/a.csv"},
            {"type": "path", "relative": false, "path": "/elsewhere/b.csv"}
        ],
        "db_references": []
    });
    let config: DataConnectionItemConfig = serde_json::from_value(json).expect("item dict");
    let dc = DataConnection::from_dict("Raw", &config, project, RecordingSink::new().logger("Raw"))
        .expect("valid item");
    assert_eq!(
        dc.file_references(),
        &[inside, PathBuf::from("/elsewhere/b.csv")]
    );

    let back = dc.to_dict(false);
    assert_eq!(back.description, "raw inputs");
    assert!(back.file_references[0].relative);
    assert_eq!(back.file_references[0].path, "inputs/a.csv");
    assert!(!back.file_references[1].relative);
}

#[test]
fn from_dict_rejects_other_item_types() {
    let config = DataConnectionItemConfig {
        item_type: "Tool".to_string(),
        ..DataConnectionItemConfig::default()
    };
    let logger = RecordingSink::new().logger("X");
    assert!(DataConnection::from_dict("X", &config, "/proj", logger).is_err());
}

#[tokio::test]
async fn real_directory_rename_is_reported() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().to_path_buf();
    let original = dir.join("input.csv");
    std::fs::write(&original, b"1").expect("write");

    let mut watcher = ReferenceWatcher::new(Arc::new(RealFileSystem));
    watcher.add_file_reference(&original);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let handle = spawn_manual_reference_watcher(watcher, fast_policy(), events_tx);

    let renamed = dir.join("input_v2.csv");
    std::fs::rename(&original, &renamed).expect("rename");
    handle.send(WatchCommand::DirectoryChanged(dir));
    assert_eq!(
        next_event(&mut events_rx).await,
        ReferenceEvent::Renamed {
            old: original,
            new: renamed
        }
    );
    handle.shutdown().await.expect("watcher loop");
}

#[test]
fn renamed_database_file_is_missing_until_renamed_back() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let dbs = tmp.path().join("dbs");
    std::fs::create_dir_all(&dbs).expect("dbs dir");
    let db_file = dbs.join("x.sqlite");
    let moved = dbs.join("y.sqlite");
    std::fs::write(&db_file, SQLITE_HEADER).expect("write");

    let sink = RecordingSink::new();
    let mut dc = DataConnection::new("Store", tmp.path().join("proj"), sink.logger("Store"));
    let db = DbReference::sqlite(&db_file);
    assert!(dc.add_db_reference(db.clone()));
    let (mut watcher, initial) = dc.reference_watcher(Arc::new(RealFileSystem));
    assert!(initial.is_empty());

    std::fs::rename(&db_file, &moved).expect("rename");
    let events = watcher.handle_directory_changed(&dbs);
    assert_eq!(events, vec![ReferenceEvent::Missing(db_file.clone())]);
    assert!(watcher.references().contains(&db_file));
    assert!(!watcher.references().contains(&moved));
    for event in &events {
        dc.apply_reference_event(event);
    }
    assert!(dc.is_db_missing(&db));
    assert!(dc.output_resources_forward().is_empty());

    std::fs::rename(&moved, &db_file).expect("rename back");
    let events = watcher.handle_directory_changed(&dbs);
    assert_eq!(events, vec![ReferenceEvent::Found(db_file.clone())]);
    for event in &events {
        dc.apply_reference_event(event);
    }
    assert!(!dc.is_db_missing(&db));
    assert!(watcher.missing().is_empty());
    assert_eq!(dc.output_resources_forward().len(), 1);
}

#[tokio::test]
async fn missing_database_file_is_rechecked_by_the_loop() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let db_file = tmp.path().join("x.sqlite");
    std::fs::write(&db_file, SQLITE_HEADER).expect("write");

    let mut watcher = ReferenceWatcher::new(Arc::new(RealFileSystem));
    assert_eq!(watcher.add_database_file(&db_file), None);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let handle = spawn_manual_reference_watcher(watcher, fast_policy(), events_tx);

    let moved = tmp.path().join("y.sqlite");
    std::fs::rename(&db_file, &moved).expect("rename");
    handle.send(WatchCommand::DirectoryChanged(tmp.path().to_path_buf()));
    assert_eq!(next_event(&mut events_rx).await, ReferenceEvent::Missing(db_file.clone()));

    // Back before the re-checks run out; nobody reports the directory change.
    std::fs::rename(&moved, &db_file).expect("rename back");
    assert_eq!(next_event(&mut events_rx).await, ReferenceEvent::Found(db_file));
    handle.shutdown().await.expect("watcher loop");
}

#[tokio::test]
async fn sqlite_header_is_checked() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let good = tmp.path().join("good.sqlite");
    let empty = tmp.path().join("empty.sqlite");
    let bad = tmp.path().join("bad.sqlite");
    let mut contents = SQLITE_HEADER.to_vec();
    contents.extend_from_slice(&[0u8; 84]);
    std::fs::write(&good, contents).expect("write");
    std::fs::write(&empty, b"").expect("write");
    std::fs::write(&bad, b"definitely,not,sqlite\n").expect("write");

    let timeout = Duration::from_secs(1);
    let url = |p: &Path| DbReference::sqlite(p).url(None);
    assert!(validate_url(&url(&good), timeout).await.is_ok());
    assert!(validate_url(&url(&empty), timeout).await.is_ok());
    assert!(validate_url(&url(&bad), timeout).await.is_err());
    assert!(validate_url(&url(&tmp.path().join("absent.sqlite")), timeout)
        .await
        .is_err());
}

#[tokio::test]
async fn server_url_without_database_is_rejected() {
    let timeout = Duration::from_millis(200);
    assert!(validate_url("postgresql://localhost:5432/", timeout).await.is_err());
    assert!(validate_url("not a url", timeout).await.is_err());
}

#[tokio::test]
async fn newest_queued_validation_supersedes_older_one() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let db = tmp.path().join("db.sqlite");
    std::fs::write(&db, SQLITE_HEADER).expect("write");
    let url = DbReference::sqlite(&db).url(None);

    let validator = DatabaseConnectionValidator::new().with_timeout(Duration::from_millis(200));
    let first = validator.validate(url.clone());
    let second = validator.validate(url.clone());
    let third = validator.validate(url);

    assert!(with_timeout(first).await.expect("reply").is_ok());
    assert!(with_timeout(second).await.expect("reply").is_err());
    assert!(with_timeout(third).await.expect("reply").is_ok());
    assert!(!validator.is_busy());
}
