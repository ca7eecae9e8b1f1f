//! End-to-end explorer scenarios against real files in a temp directory.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use explorer_lib::{Explorer, ExplorerConfig, ExplorerError, SearchQuery, Status};

fn config(dir: &Path) -> ExplorerConfig {
    ExplorerConfig {
        store_path: dir.join("store").join("projects.json"),
        autosave: false,
        verify_on_load: false,
        verify_on_open: false,
        ..ExplorerConfig::default()
    }
}

#[tokio::test]
async fn test_research_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let docs = temp_dir.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let paper = docs.join("paper.txt");
    fs::write(&paper, "findings").unwrap();

    let explorer = Explorer::open(config(temp_dir.path())).unwrap();

    let research = explorer.create_project("Research").unwrap();
    let r1 = explorer.add(research, &paper, None).unwrap();

    match explorer.add(research, &paper, None) {
        Err(ExplorerError::DuplicateReference { .. }) => {}
        other => panic!("Expected DuplicateReference, got {:?}", other),
    }
    assert_eq!(explorer.list_by_project(research).unwrap().len(), 1);

    let urgent = explorer.create_tag("urgent", None).unwrap();
    explorer.tag(r1, urgent).unwrap();

    let query = SearchQuery::in_project(research).with_tags([urgent], true);
    let found: Vec<_> = explorer.search(&query).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(found, vec![r1]);

    fs::remove_file(&paper).unwrap();
    assert_eq!(explorer.verify(r1).unwrap(), Status::Missing);

    let found: Vec<_> = explorer.search(&query).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(found, vec![r1], "Status does not affect filtering");

    explorer.delete_project(research).unwrap();
    let everywhere = SearchQuery::default().with_tags([urgent], true);
    assert!(explorer.search(&everywhere).unwrap().is_empty());
    assert_eq!(explorer.list_tags().len(), 1, "Tag definition survives");

    explorer.shutdown().unwrap();
}

#[tokio::test]
async fn test_shared_file_across_projects() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("shared.pdf");
    fs::write(&file, "pdf").unwrap();

    let explorer = Explorer::open(config(temp_dir.path())).unwrap();
    let a = explorer.create_project("A").unwrap();
    let b = explorer.create_project("B").unwrap();
    let in_a = explorer.add(a, &file, None).unwrap();
    let in_b = explorer.add(b, &file, None).unwrap();
    assert_ne!(in_a, in_b);

    let only_a = explorer.create_tag("only-a", None).unwrap();
    explorer.tag(in_a, only_a).unwrap();

    let query = SearchQuery::in_project(b).with_tags([only_a], true);
    assert!(explorer.search(&query).unwrap().is_empty(), "Tags are per reference");

    explorer.shutdown().unwrap();
}

#[tokio::test]
async fn test_relocate_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let old = temp_dir.path().join("report-v1.docx");
    let new = temp_dir.path().join("archive").join("report-v1.docx");
    fs::write(&old, "v1").unwrap();

    let explorer = Explorer::open(config(temp_dir.path())).unwrap();
    let project = explorer.create_project("Reports").unwrap();
    let reference = explorer.add(project, &old, None).unwrap();
    explorer.set_tags_from_text(reference, "final").unwrap();

    fs::create_dir_all(new.parent().unwrap()).unwrap();
    fs::rename(&old, &new).unwrap();
    assert_eq!(explorer.verify(reference).unwrap(), Status::Missing);

    explorer.relocate(reference, &new).unwrap();
    assert_eq!(explorer.get(reference).unwrap().status, Status::Unknown);
    assert_eq!(explorer.verify(reference).unwrap(), Status::Present);

    let found = explorer.quick_search(Some(project), "final").unwrap();
    assert_eq!(found.len(), 1, "Tags survive relocation");
    assert_eq!(found[0].id, reference);

    explorer.shutdown().unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<_> = ["a.md", "b.png", "c.txt"]
        .iter()
        .map(|name| {
            let path = temp_dir.path().join(name);
            fs::write(&path, name).unwrap();
            path
        })
        .collect();

    let (project, order) = {
        let explorer = Explorer::open(config(temp_dir.path())).unwrap();
        let project = explorer.create_project("Ordered").unwrap();
        let report = explorer.add_many(project, &files).unwrap();
        assert!(report.rejected.is_empty());
        let order = vec![report.added[2], report.added[0], report.added[1]];
        explorer.reorder(project, &order).unwrap();
        explorer.rename_reference(order[0], "Read me first").unwrap();
        explorer.shutdown().unwrap();
        (project, order)
    };

    let explorer = Explorer::open(config(temp_dir.path())).unwrap();
    let listed = explorer.open_project(project).unwrap();
    let ids: Vec<_> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, order);
    assert_eq!(listed[0].display_name, "Read me first");
    explorer.shutdown().unwrap();
}

#[tokio::test]
async fn test_second_session_on_locked_store_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = config(temp_dir.path());
    fs::create_dir_all(cfg.store_path.parent().unwrap()).unwrap();

    let foreign = serde_json::json!({
        "hostname": "OTHER-DEVICE",
        "pid": 4242,
        "app_version": "0.1.0",
        "locked_at": chrono::Utc::now().to_rfc3339(),
        "heartbeat": chrono::Utc::now().to_rfc3339()
    });
    fs::write(cfg.lock_path(), foreign.to_string()).unwrap();

    match Explorer::open(cfg.clone()) {
        Err(ExplorerError::StoreLocked { holder, .. }) => assert_eq!(holder.pid, 4242),
        Err(other) => panic!("Expected StoreLocked, got {:?}", other),
        Ok(_) => panic!("Expected StoreLocked, got a session"),
    }

    let forced = Explorer::open_with(cfg, true).unwrap();
    forced.shutdown().unwrap();
}
