mod common;

use filetime::{set_file_mtime, FileTime};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn addition_is_detected_and_persisted() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "new.txt", b"hello");

    common::scan(temp.path(), &[])
        .success()
        .stdout(predicate::str::contains("added=1"));

    // A second scan over the same unchanged tree sees no further additions.
    common::scan(temp.path(), &[])
        .success()
        .stdout(predicate::str::contains("added=0"))
        .stdout(predicate::str::contains("unchanged=1"));
}

#[test]
fn change_is_detected_via_mtime() {
    let temp = TempDir::new().unwrap();
    let path = write_file(temp.path(), "f.txt", b"v1");

    common::scan(temp.path(), &["--use-checksum"]).success();

    std::fs::write(&path, b"v2-longer-content").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();

    common::scan(temp.path(), &["--use-checksum"])
        .success()
        .stdout(predicate::str::contains("changed=1"));
}

#[test]
fn age_limit_removes_old_entries_by_default() {
    let temp = TempDir::new().unwrap();
    let path = write_file(temp.path(), "old.txt", b"x");

    common::scan(temp.path(), &[]).success();
    std::thread::sleep(std::time::Duration::from_millis(20));

    common::scan(temp.path(), &["--days", "0"])
        .code(1)
        .stdout(predicate::str::contains("past_age_limit=1"));

    assert!(!path.exists());
}

#[test]
fn dry_run_reports_violations_without_deleting() {
    let temp = TempDir::new().unwrap();
    let path = write_file(temp.path(), "old.txt", b"x");

    common::scan(temp.path(), &[]).success();
    std::thread::sleep(std::time::Duration::from_millis(20));

    common::scan(temp.path(), &["--days", "0", "--dry-run"])
        .code(1)
        .stdout(predicate::str::contains("past_age_limit=1"));

    assert!(path.exists());
}

#[test]
fn size_limit_removes_largest_files_first() {
    let temp = TempDir::new().unwrap();
    let small = write_file(temp.path(), "small.txt", &[0u8; 10]);
    let big = write_file(temp.path(), "big.txt", &[0u8; 1000]);

    common::scan(temp.path(), &["--max-size", "500"])
        .code(1)
        .stdout(predicate::str::contains("past_size_limit=1"));

    assert!(!big.exists());
    assert!(small.exists());
}

#[test]
fn prune_dirs_removes_directories_emptied_by_size_policy() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("a/b")).unwrap();
    write_file(&temp.path().join("a/b"), "big.txt", &[0u8; 1000]);
    write_file(temp.path(), "small.txt", &[0u8; 10]);

    common::scan(temp.path(), &["--max-size", "500", "--prune-dirs"])
        .code(1)
        .stdout(predicate::str::contains("past_size_limit=1"));

    assert!(!temp.path().join("a/b").exists());
    assert!(!temp.path().join("a").exists());
    assert!(temp.path().join("small.txt").exists());
}

#[test]
fn without_prune_dirs_emptied_directories_remain() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("a/b")).unwrap();
    write_file(&temp.path().join("a/b"), "big.txt", &[0u8; 1000]);
    write_file(temp.path(), "small.txt", &[0u8; 10]);

    common::scan(temp.path(), &["--max-size", "500"])
        .code(1)
        .stdout(predicate::str::contains("past_size_limit=1"));

    assert!(!temp.path().join("a/b/big.txt").exists());
    assert!(temp.path().join("a/b").exists());
}

#[test]
fn declining_past_limit_hook_leaves_entry_tracked_for_retry() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "old.txt", b"x");

    common::scan(temp.path(), &[]).success();
    std::thread::sleep(std::time::Duration::from_millis(20));

    // `false` always exits non-zero, so the hook never commits.
    common::scan(temp.path(), &["--days", "0", "--on-past-limit", "false"])
        .code(1)
        .stdout(predicate::str::contains("past_age_limit=1"));

    // The entry was not forgotten, so it is flagged again on the next run.
    common::scan(temp.path(), &["--days", "0", "--on-past-limit", "false"])
        .code(1)
        .stdout(predicate::str::contains("past_age_limit=1"));
}

#[test]
fn legacy_state_file_is_upgraded_transparently() {
    let temp = TempDir::new().unwrap();
    let tracked = write_file(temp.path(), "tracked.txt", b"x");
    let database = temp.path().join(".dirsweep.dat");
    std::fs::write(
        &database,
        format!("\"{}\" = 1700000000.0\n", tracked.display()),
    )
    .unwrap();

    // The legacy record carries no prior metadata snapshot, so the first
    // reconciliation after upgrade has nothing to compare against and
    // conservatively reports the entry as changed once.
    common::status(temp.path())
        .success()
        .stdout(predicate::str::contains("changed=1"));

    let upgraded = std::fs::read_to_string(&database).unwrap();
    assert!(upgraded.contains("[metadata]"));
    assert!(upgraded.contains("version = 1"));

    // The second run has a full snapshot to compare against and sees no
    // further change.
    common::status(temp.path())
        .success()
        .stdout(predicate::str::contains("unchanged=1"));
}

#[test]
fn status_never_deletes_even_with_no_flags() {
    let temp = TempDir::new().unwrap();
    let path = write_file(temp.path(), "f.txt", b"x");

    common::status(temp.path()).success();
    assert!(path.exists());
}
