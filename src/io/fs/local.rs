//! Local-disk filesystem client.
//!
//! Endpoints take the form `file:///some/root`. Every absolute path used by the job
//! is resolved below that root, so `file:///srv/data` with path `/orders` writes
//! into `/srv/data/orders`. `file://` alone maps to the machine root.

use crate::error::{ErrorKind, Result, WriterError};
use crate::io::fs::traits::{ConnectOptions, FileSystem, FileSystemConnector, join};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEME: &str = "file://";

/// Connector for [`LocalFileSystem`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl FileSystemConnector for LocalConnector {
    fn connect(&self, endpoint: &str, options: &ConnectOptions) -> Result<Box<dyn FileSystem>> {
        let root = endpoint.strip_prefix(SCHEME).ok_or_else(|| {
            WriterError::new(
                ErrorKind::ConnectFs,
                format!("unsupported filesystem endpoint [{endpoint}], expected {SCHEME}<root>"),
            )
        })?;
        let root = if root.is_empty() { "/" } else { root };

        if let Some(auth) = &options.kerberos {
            // Local disks have no KDC; the closest check is that the keytab is readable.
            File::open(&auth.keytab_path).map_err(|e| {
                WriterError::new(
                    ErrorKind::KerberosLogin,
                    format!(
                        "kerberos login as [{}] failed, cannot read keytab [{}]",
                        auth.principal, auth.keytab_path
                    ),
                )
                .with_source(e)
            })?;
            info!(principal = %auth.principal, "kerberos keytab verified");
        }

        let root = PathBuf::from(root);
        if !root.is_dir() {
            return Err(WriterError::new(
                ErrorKind::ConnectFs,
                format!("filesystem root {} is not a directory", root.display()),
            ));
        }
        debug!(
            root = %root.display(),
            timeout_ms = options.timeout.as_millis(),
            "connected to local filesystem"
        );
        Ok(Box::new(LocalFileSystem::new(root)))
    }
}

/// A [`FileSystem`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map an absolute job path onto the local disk.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn io_err(action: &str, path: &Path, err: std::io::Error) -> WriterError {
    WriterError::io(format!("{action} {}", path.display()), err)
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &str) -> Result<bool> {
        let local = self.resolve(path);
        local
            .try_exists()
            .map_err(|e| io_err("stat", &local, e))
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).is_dir())
    }

    fn mkdirs(&self, path: &str) -> Result<()> {
        let local = self.resolve(path);
        fs::create_dir_all(&local).map_err(|e| io_err("mkdir -p", &local, e))
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let local = self.resolve(dir);
        let mut out = Vec::new();
        for entry in fs::read_dir(&local).map_err(|e| io_err("list", &local, e))? {
            let entry = entry.map_err(|e| io_err("list", &local, e))?;
            out.push(join(dir, &entry.file_name().to_string_lossy()));
        }
        out.sort();
        Ok(out)
    }

    fn delete(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            let local = self.resolve(path);
            let result = if local.is_dir() {
                fs::remove_dir_all(&local)
            } else {
                fs::remove_file(&local)
            };
            result.map_err(|e| io_err("delete", &local, e))?;
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let src = self.resolve(from);
        let dst = self.resolve(to);
        // std::fs::rename silently replaces an existing file on Unix.
        if dst.exists() {
            return Err(WriterError::new(
                ErrorKind::Rename,
                format!("cannot rename {from} to {to}: destination exists"),
            ));
        }
        fs::rename(&src, &dst).map_err(|e| {
            WriterError::new(ErrorKind::Rename, format!("cannot rename {from} to {to}"))
                .with_source(e)
        })
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let local = self.resolve(path);
        fs::remove_dir(&local).map_err(|e| io_err("rmdir", &local, e))
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let local = self.resolve(path);
        if let Some(parent) = local.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| io_err("mkdir -p", parent, e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local)
            .map_err(|e| io_err("create", &local, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn close(&mut self) -> Result<()> {
        debug!(root = %self.root.display(), "closed local filesystem");
        Ok(())
    }
}
