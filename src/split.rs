//! Collision-free naming of task outputs.
//!
//! Every task writes to `<tempDir><prefix>__<token>` and is later renamed to
//! `<finalDir><prefix>__<token>`. The temp directory is a sibling of the
//! destination, `<path>__<token>/`, so nothing becomes visible in the destination
//! before commit.

use crate::error::{Result, WriterError};
use crate::io::compression::codec_for;
use crate::io::fs::{FileSystem, normalize};
use crate::plan::{FileFormat, WritePlan};
use crate::prepare::DestinationSnapshot;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Upper bound on regenerations for a single name.
pub const MAX_TOKEN_ATTEMPTS: usize = 64;

/// Source of unique name tokens.
pub trait TokenGenerator: Send + Sync {
    fn next_token(&self) -> String;
}

/// Random UUID v4 tokens with `-` replaced by `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokens;

impl TokenGenerator for UuidTokens {
    fn next_token(&self) -> String {
        uuid::Uuid::new_v4().to_string().replace('-', "_")
    }
}

/// Temporary and final location of one task's output file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePathPair {
    temp: String,
    final_path: String,
}

impl FilePathPair {
    pub(crate) fn new(temp: impl Into<String>, final_path: impl Into<String>) -> Self {
        Self {
            temp: temp.into(),
            final_path: final_path.into(),
        }
    }

    #[must_use]
    pub fn temp(&self) -> &str {
        &self.temp
    }

    #[must_use]
    pub fn final_path(&self) -> &str {
        &self.final_path
    }
}

/// Output of [`split`].
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// Staging directory, `/` terminated.
    pub temp_dir: String,
    /// Destination directory, `/` terminated.
    pub final_dir: String,
    pub pairs: Vec<FilePathPair>,
}

fn final_dir(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

fn temp_dir(path: &str, token: &str) -> String {
    match normalize(path) {
        "/" => format!("/__{token}/"),
        dir => format!("{dir}__{token}/"),
    }
}

fn exhausted(what: &str) -> WriterError {
    WriterError::illegal(format!(
        "could not generate a unique {what} after {MAX_TOKEN_ATTEMPTS} attempts"
    ))
}

/// Produce `n` pairs whose final paths are pairwise distinct and absent from
/// `snapshot.all`.
///
/// # Errors
/// Returns [`ErrorKind::IllegalValue`](crate::ErrorKind::IllegalValue) for `n == 0`,
/// for a text codec that is not compiled in, or when the token generator keeps
/// producing taken names. Propagates filesystem errors from the temp directory check.
pub fn split(
    plan: &WritePlan,
    snapshot: &DestinationSnapshot,
    fs: &dyn FileSystem,
    n: usize,
    tokens: &dyn TokenGenerator,
) -> Result<SplitPlan> {
    if n == 0 {
        return Err(WriterError::illegal("cannot split a write into 0 tasks"));
    }
    info!(tasks = n, "splitting write");

    let final_dir = final_dir(&plan.path);

    let mut attempts = 0;
    let temp_dir = loop {
        attempts += 1;
        if attempts > MAX_TOKEN_ATTEMPTS {
            return Err(exhausted("temp directory"));
        }
        let candidate = temp_dir(&plan.path, &tokens.next_token());
        if !fs.exists(&candidate)? {
            break candidate;
        }
    };

    let suffix = match plan.format {
        FileFormat::Text => codec_for(plan.compression)?
            .map(|codec| codec.extension().to_string())
            .unwrap_or_default(),
        FileFormat::Parquet => String::new(),
    };
    let mut taken: BTreeSet<String> = snapshot.all.clone();
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let mut attempts = 0;
        let (name, final_path) = loop {
            attempts += 1;
            if attempts > MAX_TOKEN_ATTEMPTS {
                return Err(exhausted("file name"));
            }
            let name = format!("{}__{}", plan.file_name, tokens.next_token());
            let final_path = format!("{final_dir}{name}");
            if !taken.contains(&final_path) && !taken.contains(&format!("{final_path}{suffix}"))
            {
                break (name, final_path);
            }
        };
        taken.insert(final_path.clone());
        let pair = FilePathPair {
            temp: format!("{temp_dir}{name}{suffix}"),
            final_path: format!("{final_path}{suffix}"),
        };
        debug!(temp = %pair.temp, final_path = %pair.final_path, "split output");
        pairs.push(pair);
    }
    info!(temp_dir = %temp_dir, tasks = pairs.len(), "split done");
    Ok(SplitPlan {
        temp_dir,
        final_dir,
        pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::fs::FakeFileSystem;
    use crate::testing::{ScriptedTokens, text_plan};

    #[test]
    fn directories() {
        assert_eq!(final_dir("/a/b"), "/a/b/");
        assert_eq!(final_dir("/a/b/"), "/a/b/");
        assert_eq!(temp_dir("/a/b", "t"), "/a/b__t/");
        assert_eq!(temp_dir("/a/b/", "t"), "/a/b__t/");
        assert_eq!(temp_dir("/", "t"), "/__t/");
        assert_eq!(temp_dir("//", "t"), "/__t/");
    }

    #[test]
    fn uuid_tokens_have_no_dashes() {
        let t = UuidTokens.next_token();
        assert_eq!(t.len(), 36);
        assert!(!t.contains('-'));
    }

    #[test]
    fn skips_taken_names_and_existing_temp_dirs() {
        let fs = FakeFileSystem::new();
        fs.put_file("/out__busy/x", b"");
        let plan = text_plan("/out", "part");
        let snapshot = DestinationSnapshot {
            prefixed: BTreeSet::from(["/out/part__a".to_string()]),
            all: BTreeSet::from(["/out/part__a".to_string()]),
        };
        let tokens = ScriptedTokens::new(["busy", "tmp", "a", "b", "b", "c"]);
        let split = split(&plan, &snapshot, &fs, 2, &tokens).unwrap();
        assert_eq!(split.temp_dir, "/out__tmp/");
        assert_eq!(split.final_dir, "/out/");
        assert_eq!(split.pairs[0].temp(), "/out__tmp/part__b");
        assert_eq!(split.pairs[0].final_path(), "/out/part__b");
        assert_eq!(split.pairs[1].final_path(), "/out/part__c");
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn codec_suffix_on_both_paths() {
        let fs = FakeFileSystem::new();
        let mut plan = text_plan("/out", "part");
        plan.compression = crate::plan::Compression::Gzip;
        let tokens = ScriptedTokens::new(["tmp", "x"]);
        let split = split(&plan, &DestinationSnapshot::default(), &fs, 1, &tokens).unwrap();
        assert_eq!(split.pairs[0].temp(), "/out__tmp/part__x.gz");
        assert_eq!(split.pairs[0].final_path(), "/out/part__x.gz");
    }

    #[test]
    fn zero_tasks_is_rejected() {
        let fs = FakeFileSystem::new();
        let plan = text_plan("/out", "part");
        let err = split(&plan, &DestinationSnapshot::default(), &fs, 0, &UuidTokens).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalValue);
    }

    #[test]
    fn stuck_generator_is_bounded() {
        let fs = FakeFileSystem::new();
        let plan = text_plan("/out", "part");
        let tokens = ScriptedTokens::repeating("same");
        let err = split(&plan, &DestinationSnapshot::default(), &fs, 2, &tokens).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalValue);
    }

    #[test]
    fn parquet_names_carry_no_codec_suffix() {
        let fs = FakeFileSystem::new();
        let mut plan = text_plan("/out", "part");
        plan.format = FileFormat::Parquet;
        plan.compression = crate::plan::Compression::Snappy;
        let tokens = ScriptedTokens::new(["tmp", "p"]);
        let split = split(&plan, &DestinationSnapshot::default(), &fs, 1, &tokens).unwrap();
        assert_eq!(split.pairs[0].final_path(), "/out/part__p");
    }
}
