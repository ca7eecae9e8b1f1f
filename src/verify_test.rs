// Verifier tests
//
// Permission-denied outcomes are not exercised here: tests frequently run as root, where
// unreadable files are still readable.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, RwLock};
    use std::thread;
    use tempfile::TempDir;

    use crate::catalog::{Catalog, ReferenceId, Status};
    use crate::paths;
    use crate::verify::{self, CancelToken};

    fn catalog_with_files(dir: &TempDir, count: usize) -> (Catalog, Vec<ReferenceId>) {
        let mut catalog = Catalog::new();
        let project = catalog.create_project("Scan").unwrap();
        let mut ids = Vec::new();
        for i in 0..count {
            let path = dir.path().join(format!("file_{:03}.txt", i));
            fs::write(&path, format!("content {}", i)).unwrap();
            ids.push(catalog.add(project, &path, None).unwrap());
        }
        (catalog, ids)
    }

    #[test]
    fn test_verify_present_then_missing_keeps_last_metadata() {
        let dir = TempDir::new().unwrap();
        let (mut catalog, ids) = catalog_with_files(&dir, 1);
        let id = ids[0];

        assert_eq!(verify::verify(&mut catalog, id).unwrap(), Status::Present);
        let first = catalog.get(id).unwrap().clone();
        let size = first.metadata.as_ref().map(|m| m.size);
        assert_eq!(size, Some("content 0".len() as u64));

        fs::remove_file(dir.path().join("file_000.txt")).unwrap();
        assert_eq!(verify::verify(&mut catalog, id).unwrap(), Status::Missing);

        let second = catalog.get(id).unwrap();
        assert_eq!(second.metadata.as_ref().map(|m| m.size), size, "Last known size stays");
        assert!(second.last_verified >= first.last_verified);
        assert!(!second.status.is_available());
    }

    #[test]
    fn test_verify_unknown_reference() {
        let mut catalog = Catalog::new();
        assert!(verify::verify(&mut catalog, ReferenceId(5)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_verify_all_counts_outcomes() {
        let dir = TempDir::new().unwrap();
        let (catalog, ids) = catalog_with_files(&dir, 10);
        for i in [1, 4, 7] {
            fs::remove_file(dir.path().join(format!("file_{:03}.txt", i))).unwrap();
        }
        let shared = RwLock::new(catalog);

        let report = verify::verify_all(&shared, None, &CancelToken::new()).unwrap();
        println!("Report: {:?}", report);
        assert_eq!(report.checked, 10);
        assert_eq!(report.present, 7);
        assert_eq!(report.missing, 3);
        assert!(!report.cancelled);

        let catalog = shared.read().unwrap();
        assert_eq!(catalog.get(ids[4]).unwrap().status, Status::Missing);
        assert_eq!(catalog.get(ids[5]).unwrap().status, Status::Present);
    }

    #[test]
    fn test_verify_all_scoped_to_project() {
        let dir = TempDir::new().unwrap();
        let (mut catalog, ids) = catalog_with_files(&dir, 3);
        let other = catalog.create_project("Other").unwrap();
        let outside = catalog.add(other, &dir.path().join("file_000.txt"), None).unwrap();
        let scanned = catalog.get(ids[0]).unwrap().project;
        let shared = RwLock::new(catalog);

        let report = verify::verify_all(&shared, Some(scanned), &CancelToken::new()).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(
            shared.read().unwrap().get(outside).unwrap().status,
            Status::Unknown,
            "Other projects are left alone"
        );
    }

    #[test]
    fn test_cancelled_scan_leaves_references_untouched() {
        let dir = TempDir::new().unwrap();
        let (catalog, ids) = catalog_with_files(&dir, 5);
        let shared = RwLock::new(catalog);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = verify::verify_all(&shared, None, &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.skipped, 5);
        assert_eq!(report.checked, 0);
        for id in ids {
            assert_eq!(shared.read().unwrap().get(id).unwrap().status, Status::Unknown);
        }
    }

    #[test]
    fn test_remove_during_scan_is_not_resurrected() {
        let dir = TempDir::new().unwrap();
        let (catalog, ids) = catalog_with_files(&dir, 200);
        let shared = Arc::new(RwLock::new(catalog));

        let scanner = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || verify::verify_all(&shared, None, &CancelToken::new()))
        };
        for id in ids.iter().step_by(2) {
            shared.write().unwrap().remove(*id).unwrap();
        }
        let report = scanner.join().unwrap().unwrap();
        println!("Report with concurrent removals: {:?}", report);

        let catalog = shared.read().unwrap();
        assert_eq!(catalog.reference_count(), 100);
        for id in ids.iter().step_by(2) {
            assert!(!catalog.contains_reference(*id), "Removed reference came back: {}", id);
        }
        assert_eq!(report.present + report.vanished, report.checked);
        assert!(catalog.index_is_consistent());
    }

    #[test]
    fn test_stale_result_after_relocate_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (mut catalog, ids) = catalog_with_files(&dir, 1);
        let id = ids[0];
        let probed = catalog.get(id).unwrap().path.as_path().to_path_buf();
        let (status, metadata) = verify::outcome(paths::probe(&probed));
        assert_eq!(status, Status::Present);

        catalog.relocate(id, &dir.path().join("moved.txt")).unwrap();
        let written = verify::commit(&mut catalog, id, &probed, status, metadata).unwrap();
        assert!(!written, "Result for the old path must not land on the new one");

        let r = catalog.get(id).unwrap();
        assert_eq!(r.status, Status::Unknown);
        assert!(r.metadata.is_none());
        assert!(r.last_verified.is_none());

        let current = r.path.as_path().to_path_buf();
        let (status, metadata) = verify::outcome(paths::probe(&current));
        assert!(verify::commit(&mut catalog, id, &current, status, metadata).unwrap());
        assert_eq!(catalog.get(id).unwrap().status, Status::Missing);
    }

    #[test]
    fn test_relocate_during_scan_never_marks_missing_path_present() {
        let dir = TempDir::new().unwrap();
        let (catalog, ids) = catalog_with_files(&dir, 200);
        let shared = Arc::new(RwLock::new(catalog));

        let scanner = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || verify::verify_all(&shared, None, &CancelToken::new()))
        };
        for (i, id) in ids.iter().enumerate().step_by(2) {
            let target = dir.path().join(format!("gone_{:03}.txt", i));
            shared.write().unwrap().relocate(*id, &target).unwrap();
        }
        let report = scanner.join().unwrap().unwrap();
        println!("Report with concurrent relocations: {:?}", report);

        let catalog = shared.read().unwrap();
        for r in catalog.all_references() {
            if r.status == Status::Present {
                assert!(r.path.as_path().exists(), "Present but missing on disk: {:?}", r.path.as_path());
            }
        }
        for id in ids.iter().step_by(2) {
            assert_eq!(catalog.get(*id).unwrap().status, Status::Unknown, "Relocated {} keeps Unknown", id);
        }
        assert_eq!(report.vanished, 0);
        assert_eq!(report.present + report.relocated, report.checked);
    }

    #[test]
    fn test_verify_never_touches_other_fields() {
        let dir = TempDir::new().unwrap();
        let (mut catalog, ids) = catalog_with_files(&dir, 1);
        let tag = catalog.create_tag("kept", None).unwrap();
        catalog.tag(ids[0], tag).unwrap();
        catalog.rename_reference(ids[0], "Custom").unwrap();

        verify::verify(&mut catalog, ids[0]).unwrap();
        let r = catalog.get(ids[0]).unwrap();
        assert_eq!(r.display_name, "Custom");
        assert!(r.tags.contains(&tag));
    }
}
