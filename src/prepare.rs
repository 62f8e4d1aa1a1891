//! Destination reconciliation.
//!
//! Runs once, after planning and before any task is dispatched. Makes sure the
//! destination directory exists, records what is already in it, and applies the
//! write mode to that content.

use crate::error::{ErrorKind, Result, WriterError};
use crate::io::fs::FileSystem;
use crate::plan::{WriteMode, WritePlan};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Entries found directly under the destination when the job was prepared.
///
/// `prefixed` holds the entries whose name starts with the file name prefix, `all`
/// holds every entry. Both are absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationSnapshot {
    pub prefixed: BTreeSet<String>,
    pub all: BTreeSet<String>,
}

impl DestinationSnapshot {
    /// List the entries of `dir` that start with `prefix`, then every entry.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn take(fs: &dyn FileSystem, dir: &str, prefix: &str) -> Result<Self> {
        let prefixed = fs.list_files_with_prefix(dir, prefix)?.into_iter().collect();
        let all = fs.list_files(dir)?.into_iter().collect();
        Ok(Self { prefixed, all })
    }
}

/// Ensure the destination exists and apply the write mode.
///
/// Returns the snapshot taken before any deletion, which the splitter uses as the
/// initial set of names to avoid.
///
/// # Errors
/// - [`ErrorKind::CreatePath`] if the destination is missing and may not be created
/// - [`ErrorKind::IllegalValue`] if the destination is a file, or if `nonConflict`
///   finds prefixed entries
/// - [`ErrorKind::WriteIo`] if a deletion fails
pub fn prepare(plan: &WritePlan, fs: &dyn FileSystem) -> Result<DestinationSnapshot> {
    let dir = plan.path.as_str();
    if !fs.exists(dir)? {
        if !plan.create_path {
            return Err(WriterError::new(
                ErrorKind::CreatePath,
                format!("destination [{dir}] does not exist and isCreatePath is false"),
            ));
        }
        info!(path = dir, "destination missing, creating it");
        fs.mkdirs(dir)?;
    } else if !fs.is_dir(dir)? {
        return Err(WriterError::illegal(format!(
            "destination [{dir}] is not a directory"
        )));
    } else {
        info!(path = dir, "destination exists");
    }

    let snapshot = DestinationSnapshot::take(fs, dir, &plan.file_name)?;

    match plan.write_mode {
        WriteMode::Append => {
            info!(
                path = dir,
                prefix = %plan.file_name,
                "append mode, existing content is kept"
            );
        }
        WriteMode::NonConflict => {
            if !snapshot.prefixed.is_empty() {
                let conflicts: Vec<&str> = snapshot.prefixed.iter().map(String::as_str).collect();
                warn!(path = dir, conflicts = ?conflicts, "nonConflict mode found existing files");
                return Err(WriterError::illegal(format!(
                    "nonConflict mode, but [{dir}] already holds files starting with [{}]: {}",
                    plan.file_name,
                    conflicts.join(", ")
                )));
            }
            info!(path = dir, "nonConflict mode, no conflicting files");
        }
        WriteMode::Truncate => {
            if !snapshot.prefixed.is_empty() {
                info!(
                    path = dir,
                    prefix = %plan.file_name,
                    count = snapshot.prefixed.len(),
                    "truncate mode, deleting prefixed files"
                );
                delete_all(fs, &snapshot.prefixed)?;
            }
        }
        WriteMode::TruncateAll => {
            if !snapshot.all.is_empty() {
                info!(
                    path = dir,
                    count = snapshot.all.len(),
                    "truncateAll mode, deleting everything in the destination"
                );
                delete_all(fs, &snapshot.all)?;
            }
        }
    }
    Ok(snapshot)
}

fn delete_all(fs: &dyn FileSystem, paths: &BTreeSet<String>) -> Result<()> {
    let paths: Vec<String> = paths.iter().cloned().collect();
    fs.delete(&paths).map_err(|e| {
        WriterError::new(
            ErrorKind::WriteIo,
            format!("failed to delete existing files: {}", e.message),
        )
        .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fs::FakeFileSystem;
    use crate::testing::text_plan;

    fn seeded() -> FakeFileSystem {
        let fs = FakeFileSystem::new();
        fs.put_file("/out/part__old1", b"a");
        fs.put_file("/out/part__old2", b"b");
        fs.put_file("/out/other.txt", b"c");
        fs
    }

    #[test]
    fn snapshot_partitions_by_prefix() {
        let fs = seeded();
        fs.put_file("/out/partial/x", b"d");
        let snap = DestinationSnapshot::take(&fs, "/out", "part__").unwrap();
        assert_eq!(
            snap.prefixed,
            BTreeSet::from(["/out/part__old1".to_string(), "/out/part__old2".to_string()])
        );
        assert_eq!(snap.all.len(), 4);
        assert!(snap.all.contains("/out/other.txt"));
        assert!(snap.all.contains("/out/partial"));
    }

    #[test]
    fn missing_destination_without_create_path() {
        let fs = FakeFileSystem::new();
        let plan = text_plan("/missing", "part");
        assert_eq!(prepare(&plan, &fs).unwrap_err().kind, ErrorKind::CreatePath);

        let mut plan = plan;
        plan.create_path = true;
        let snap = prepare(&plan, &fs).unwrap();
        assert!(snap.all.is_empty());
        assert!(fs.is_dir("/missing").unwrap());
    }

    #[test]
    fn destination_must_be_a_directory() {
        let fs = FakeFileSystem::new();
        fs.put_file("/out", b"not a dir");
        let plan = text_plan("/out", "part");
        assert_eq!(prepare(&plan, &fs).unwrap_err().kind, ErrorKind::IllegalValue);
    }

    #[test]
    fn truncate_keeps_unprefixed_files() {
        let fs = seeded();
        let mut plan = text_plan("/out", "part");
        plan.write_mode = WriteMode::Truncate;
        prepare(&plan, &fs).unwrap();
        assert_eq!(fs.files(), vec!["/out/other.txt".to_string()]);
    }

    #[test]
    fn delete_failure_is_write_io() {
        let fs = seeded();
        fs.fail_delete_of("/out/part__old1");
        let mut plan = text_plan("/out", "part");
        plan.write_mode = WriteMode::TruncateAll;
        assert_eq!(prepare(&plan, &fs).unwrap_err().kind, ErrorKind::WriteIo);
    }
}
