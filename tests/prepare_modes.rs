use anyhow::Result;
use stagewrite::io::{FakeFileSystem, FileSystem};
use stagewrite::plan::WriteMode;
use stagewrite::prepare::{DestinationSnapshot, prepare};
use stagewrite::testing::text_plan;
use stagewrite::ErrorKind;

fn destination() -> FakeFileSystem {
    let fs = FakeFileSystem::new();
    fs.put_file("/dest/part__1", b"old");
    fs.put_file("/dest/part__2.gz", b"old");
    fs.put_file("/dest/other.dat", b"keep");
    fs.put_file("/dest/sub/nested", b"nested");
    fs
}

fn run_twice(mode: WriteMode) -> Result<FakeFileSystem> {
    let fs = destination();
    let mut plan = text_plan("/dest", "part");
    plan.write_mode = mode;
    prepare(&plan, &fs)?;
    let after_first = fs.files();
    prepare(&plan, &fs)?;
    assert_eq!(fs.files(), after_first, "{mode} is not idempotent");
    Ok(fs)
}

#[test]
fn append_deletes_nothing() -> Result<()> {
    let fs = run_twice(WriteMode::Append)?;
    assert_eq!(fs.files().len(), 4);
    assert!(fs.deleted().is_empty());
    Ok(())
}

#[test]
fn truncate_deletes_only_prefixed_files() -> Result<()> {
    let fs = run_twice(WriteMode::Truncate)?;
    assert_eq!(
        fs.files(),
        vec!["/dest/other.dat".to_string(), "/dest/sub/nested".to_string()]
    );
    assert_eq!(fs.deleted(), vec!["/dest/part__1", "/dest/part__2.gz"]);
    Ok(())
}

#[test]
fn truncate_all_empties_the_destination() -> Result<()> {
    let fs = run_twice(WriteMode::TruncateAll)?;
    assert!(fs.files().is_empty());
    assert!(fs.is_dir("/dest")?);
    assert!(fs.list_files("/dest")?.is_empty());
    Ok(())
}

#[test]
fn non_conflict_fails_on_prefixed_files() {
    let fs = destination();
    let mut plan = text_plan("/dest", "part");
    plan.write_mode = WriteMode::NonConflict;
    let err = prepare(&plan, &fs).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IllegalValue);
    assert!(err.message.contains("/dest/part__1"));
    assert_eq!(fs.files().len(), 4);
}

#[test]
fn non_conflict_ignores_unrelated_files() -> Result<()> {
    let fs = FakeFileSystem::new();
    fs.put_file("/dest/other.dat", b"");
    let mut plan = text_plan("/dest", "part");
    plan.write_mode = WriteMode::NonConflict;
    let snapshot = prepare(&plan, &fs)?;
    assert!(snapshot.prefixed.is_empty());
    assert_eq!(snapshot.all.len(), 1);
    Ok(())
}

#[test]
fn snapshot_is_taken_before_deleting() -> Result<()> {
    let fs = destination();
    let mut plan = text_plan("/dest", "part");
    plan.write_mode = WriteMode::TruncateAll;
    let snapshot = prepare(&plan, &fs)?;
    let expected = DestinationSnapshot::take(&destination(), "/dest", "part")?;
    assert_eq!(snapshot, expected);
    Ok(())
}

#[test]
fn local_filesystem_truncate() -> Result<()> {
    use stagewrite::io::{ConnectOptions, FileSystemConnector, LocalConnector};
    use stagewrite::testing::local_root;
    use std::io::Write;

    let (root, endpoint) = local_root()?;
    let fs = LocalConnector.connect(&endpoint, &ConnectOptions::default())?;
    fs.create("/dest/part__old")?.write_all(b"x")?;
    fs.create("/dest/keep.txt")?.write_all(b"y")?;

    let mut plan = text_plan("/dest", "part");
    plan.write_mode = WriteMode::Truncate;
    prepare(&plan, fs.as_ref())?;

    assert!(!root.path().join("dest/part__old").exists());
    assert!(root.path().join("dest/keep.txt").exists());
    Ok(())
}
