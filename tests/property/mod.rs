//! Property-based testing for timecopy
//!
//! Uses proptest to check path mapping and copy invariants over generated
//! paths and trees.

use ::timecopy::copier::EntryCopier;
use ::timecopy::full_copy::FullCopy;
use ::timecopy::incremental::{IncrementalCopy, IncrementalRoots};
use ::timecopy::metadata::MetadataReplicator;
use ::timecopy::path_map::PathMapping;
use ::timecopy::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate relative paths of one to four components
fn relative_path_strategy() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec("[a-z][a-z0-9_.-]{0,8}", 1..=4)
        .prop_map(|parts| parts.iter().collect::<PathBuf>())
}

/// Generate a tree as relative file path -> content
///
/// Paths that would need an existing file to be a directory are dropped.
fn tree_strategy() -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::btree_map(
        relative_path_strategy(),
        prop::collection::vec(any::<u8>(), 0..256),
        1..20,
    )
    .prop_map(|mut files| {
        let paths: Vec<PathBuf> = files.keys().cloned().collect();
        for path in &paths {
            if paths.iter().any(|other| other != path && other.starts_with(path)) {
                files.remove(path);
            }
        }
        files
    })
}

fn materialize(root: &Path, files: &BTreeMap<PathBuf, Vec<u8>>) {
    fs::create_dir_all(root).unwrap();
    for (path, content) in files {
        let file = root.join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, content).unwrap();
    }
}

fn options() -> CopyOptions {
    CopyOptions {
        skip_ownership: true,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_mapping_preserves_relative_path(relative in relative_path_strategy()) {
        let mapping = PathMapping::new("/Volumes/Old/db/host/2021-01-01", "/Volumes/New/db/host/2021-01-01");
        let mapped = mapping.map(&mapping.from().join(&relative)).unwrap();
        prop_assert_eq!(mapped.strip_prefix(mapping.to()).unwrap(), relative.as_path());
    }

    #[test]
    fn prop_mapping_rejects_sibling_prefixes(relative in relative_path_strategy(), suffix in "[a-z]{1,4}") {
        let mapping = PathMapping::new("/src/snap", "/dst/snap");
        let sibling = PathBuf::from(format!("/src/snap{}", suffix)).join(relative);
        prop_assert!(mapping.map(&sibling).is_err());
    }

    #[test]
    fn prop_full_copy_is_complete(files in tree_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let destination = temp_dir.path().join("destination");
        materialize(&source, &files);
        fs::create_dir(&destination).unwrap();

        let options = options();
        let replicator = MetadataReplicator::new(&options);
        let mut strategy = FullCopy::new(&source, &destination, EntryCopier::new(&options, &replicator));
        strategy.run().unwrap();

        for (path, content) in &files {
            prop_assert_eq!(&fs::read(destination.join(path)).unwrap(), content);
        }
        let report = strategy.into_report();
        prop_assert_eq!(report.files_copied, files.len());
        prop_assert_eq!(report.bytes_copied, files.values().map(|c| c.len() as u64).sum::<u64>());
        prop_assert!(!report.has_failures());
    }

    #[test]
    fn prop_incremental_links_exactly_the_shared_files(
        files in tree_strategy(),
        changed in prop::collection::vec(any::<bool>(), 20),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let (one, two) = (root.join("src/one"), root.join("src/two"));
        let (copy_one, copy_two) = (root.join("dst/one"), root.join("dst/two"));
        materialize(&one, &files);
        let mut expected_links = 0;
        for (index, path) in files.keys().enumerate() {
            let target = two.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            if changed[index] {
                fs::write(&target, b"changed").unwrap();
            } else {
                fs::hard_link(one.join(path), &target).unwrap();
                expected_links += 1;
            }
        }
        fs::create_dir_all(&copy_one).unwrap();
        fs::create_dir_all(&copy_two).unwrap();

        let options = options();
        let replicator = MetadataReplicator::new(&options);
        FullCopy::new(&one, &copy_one, EntryCopier::new(&options, &replicator)).run().unwrap();
        let roots = IncrementalRoots {
            source: two.clone(),
            reference: one.clone(),
            previous_destination: copy_one.clone(),
            destination: copy_two.clone(),
        };
        let mut strategy = IncrementalCopy::new(&roots, EntryCopier::new(&options, &replicator));
        strategy.run().unwrap();
        let report = strategy.into_report();

        prop_assert_eq!(report.hard_links, expected_links);
        for (index, path) in files.keys().enumerate() {
            let previous = fs::metadata(copy_one.join(path)).unwrap().ino();
            let current = fs::metadata(copy_two.join(path)).unwrap().ino();
            if changed[index] {
                prop_assert_ne!(previous, current);
                prop_assert_eq!(fs::read(copy_two.join(path)).unwrap(), b"changed".to_vec());
            } else {
                prop_assert_eq!(previous, current);
            }
        }
    }
}
