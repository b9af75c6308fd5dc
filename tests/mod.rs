//! Main test module for timecopy
//!
//! This module includes all test suites:
//! - Integration tests for multi-snapshot, multi-host databases
//! - Resilience tests for broken chains, dry runs and interrupts
//! - Property-based tests for invariants

pub mod integration;
pub mod property;
pub mod resilience;

#[cfg(test)]
mod edge_cases {
    use ::timecopy::database::DATABASE_DIR;
    use ::timecopy::*;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> Timecopy {
        TimecopyBuilder::new().skip_ownership(true).build()
    }

    #[test]
    fn test_empty_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let destination = temp_dir.path().join("destination");
        fs::create_dir_all(source.join(DATABASE_DIR).join("host/2021-01-01")).unwrap();
        fs::create_dir_all(&destination).unwrap();

        let report = engine().copy_database(&source, &destination).unwrap();

        assert!(destination
            .join(DATABASE_DIR)
            .join("host/2021-01-01")
            .is_dir());
        // database root, host directory and the snapshot itself
        assert_eq!(report.totals().directories_created, 3);
        assert_eq!(report.totals().files_copied, 0);
    }

    #[test]
    fn test_host_without_snapshots() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let destination = temp_dir.path().join("destination");
        fs::create_dir_all(source.join(DATABASE_DIR).join("empty-host")).unwrap();
        fs::create_dir_all(&destination).unwrap();

        let report = engine().copy_database(&source, &destination).unwrap();

        assert!(report.chains.is_empty());
        assert!(!destination.join(DATABASE_DIR).join("empty-host").exists());
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let destination = temp_dir.path().join("destination");
        let snapshot = source.join(DATABASE_DIR).join("host/2021-01-01");
        fs::create_dir_all(&snapshot).unwrap();
        fs::create_dir_all(&destination).unwrap();

        let names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "unicode-файл.txt",
            ".hidden",
            "Backups.backupdb",
        ];
        for name in names {
            fs::write(snapshot.join(name), name.as_bytes()).unwrap();
        }

        engine().copy_database(&source, &destination).unwrap();

        let copied = destination.join(DATABASE_DIR).join("host/2021-01-01");
        for name in names {
            assert_eq!(fs::read(copied.join(name)).unwrap(), name.as_bytes());
        }
    }

    #[test]
    fn test_missing_target_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        fs::create_dir_all(source.join(DATABASE_DIR)).unwrap();

        let err = engine()
            .copy_database(&source, &temp_dir.path().join("nowhere"))
            .unwrap_err();
        assert!(err.is_startup());
    }
}
