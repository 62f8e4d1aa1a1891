//! In-memory filesystem for tests.
//!
//! [`FakeFileSystem`] is cheap to clone and every clone shares the same state, so a
//! [`FakeConnector`] can hand one "connection" to the coordinator and one to each
//! task while tests inspect the result afterwards. Failures can be injected per
//! operation.

use crate::error::{ErrorKind, Result, WriterError};
use crate::io::fs::traits::{
    ConnectOptions, FileSystem, FileSystemConnector, file_name, normalize, parent,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Entry {
    Dir,
    File(Arc<Mutex<Vec<u8>>>),
}

#[derive(Debug, Default)]
struct FakeState {
    entries: BTreeMap<String, Entry>,
    failing_renames: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    failing_creates: BTreeSet<String>,
    connects: usize,
    closes: usize,
    renames: usize,
    deletes: Vec<String>,
}

/// Shared in-memory filesystem.
#[derive(Debug, Clone)]
pub struct FakeFileSystem {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFileSystem {
    /// An empty filesystem containing only `/`.
    #[must_use]
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.entries.insert("/".to_string(), Entry::Dir);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake filesystem mutex poisoned")
    }

    /// Seed a file (and its parents) with `data`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the state is poisoned.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let mut state = self.lock();
        if let Some(dir) = parent(path) {
            insert_dirs(&mut state, dir);
        }
        state.entries.insert(
            normalize(path).to_string(),
            Entry::File(Arc::new(Mutex::new(data.to_vec()))),
        );
    }

    /// Contents of a file, if it exists.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the state is poisoned.
    #[must_use]
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().entries.get(normalize(path))? {
            Entry::File(data) => Some(data.lock().expect("file mutex poisoned").clone()),
            Entry::Dir => None,
        }
    }

    /// Every file path currently stored, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the mutex protecting the state is poisoned.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, e)| matches!(e, Entry::File(_)))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Make `rename(from, _)` fail.
    pub fn fail_rename_of(&self, from: &str) {
        self.lock().failing_renames.insert(normalize(from).to_string());
    }

    /// Make deleting `path` fail.
    pub fn fail_delete_of(&self, path: &str) {
        self.lock().failing_deletes.insert(normalize(path).to_string());
    }

    /// Make creating any file whose name starts with `prefix` fail.
    pub fn fail_create_with_prefix(&self, prefix: &str) {
        self.lock().failing_creates.insert(prefix.to_string());
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    #[must_use]
    pub fn rename_count(&self) -> usize {
        self.lock().renames
    }

    /// Paths passed to successful `delete` calls, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deletes.clone()
    }
}

fn insert_dirs(state: &mut FakeState, dir: &str) {
    let mut cur = Some(normalize(dir));
    while let Some(path) = cur {
        state
            .entries
            .entry(path.to_string())
            .or_insert(Entry::Dir);
        cur = parent(path);
    }
}

fn not_found(path: &str) -> WriterError {
    WriterError::new(ErrorKind::WriteIo, format!("{path} does not exist"))
}

fn is_child(candidate: &str, dir: &str) -> bool {
    parent(candidate) == Some(dir) && candidate != dir
}

fn is_descendant(candidate: &str, dir: &str) -> bool {
    candidate == dir || (candidate.starts_with(dir) && candidate[dir.len()..].starts_with('/'))
        || (dir == "/" && candidate != "/")
}

impl FileSystem for FakeFileSystem {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock().entries.contains_key(normalize(path)))
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(matches!(
            self.lock().entries.get(normalize(path)),
            Some(Entry::Dir)
        ))
    }

    fn mkdirs(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        let mut cur = Some(normalize(path));
        while let Some(p) = cur {
            if let Some(Entry::File(_)) = state.entries.get(p) {
                return Err(WriterError::new(
                    ErrorKind::WriteIo,
                    format!("cannot create directory {path}: {p} is a file"),
                ));
            }
            cur = parent(p);
        }
        insert_dirs(&mut state, path);
        Ok(())
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let dir = normalize(dir);
        let state = self.lock();
        match state.entries.get(dir) {
            Some(Entry::Dir) => {}
            Some(Entry::File(_)) => {
                return Err(WriterError::new(
                    ErrorKind::WriteIo,
                    format!("{dir} is not a directory"),
                ));
            }
            None => return Err(not_found(dir)),
        }
        Ok(state
            .entries
            .keys()
            .filter(|p| is_child(p, dir))
            .cloned()
            .collect())
    }

    fn delete(&self, paths: &[String]) -> Result<()> {
        let mut state = self.lock();
        for path in paths {
            let path = normalize(path);
            if state.failing_deletes.contains(path) {
                return Err(WriterError::new(
                    ErrorKind::WriteIo,
                    format!("injected delete failure for {path}"),
                ));
            }
            if !state.entries.contains_key(path) {
                return Err(not_found(path));
            }
            state.entries.retain(|p, _| !is_descendant(p, path));
            state.deletes.push(path.to_string());
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (normalize(from), normalize(to));
        let mut state = self.lock();
        if state.failing_renames.contains(from) {
            return Err(WriterError::new(
                ErrorKind::Rename,
                format!("injected rename failure for {from}"),
            ));
        }
        if state.entries.contains_key(to) {
            return Err(WriterError::new(
                ErrorKind::Rename,
                format!("cannot rename {from} to {to}: destination exists"),
            ));
        }
        if !matches!(parent(to).and_then(|p| state.entries.get(p)), Some(Entry::Dir)) {
            return Err(WriterError::new(
                ErrorKind::Rename,
                format!("cannot rename {from} to {to}: parent directory missing"),
            ));
        }
        match state.entries.remove(from) {
            Some(entry @ Entry::File(_)) => {
                state.entries.insert(to.to_string(), entry);
                state.renames += 1;
                Ok(())
            }
            Some(Entry::Dir) => {
                state.entries.insert(from.to_string(), Entry::Dir);
                Err(WriterError::new(
                    ErrorKind::Rename,
                    format!("{from} is a directory"),
                ))
            }
            None => Err(WriterError::new(
                ErrorKind::Rename,
                format!("cannot rename {from}: source missing"),
            )),
        }
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut state = self.lock();
        if !matches!(state.entries.get(path), Some(Entry::Dir)) {
            return Err(not_found(path));
        }
        if state.entries.keys().any(|p| is_child(p, path)) {
            return Err(WriterError::new(
                ErrorKind::WriteIo,
                format!("directory {path} is not empty"),
            ));
        }
        state.entries.remove(path);
        Ok(())
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let path = normalize(path);
        let mut state = self.lock();
        let name = file_name(path);
        if state.failing_creates.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            return Err(WriterError::new(
                ErrorKind::WriteIo,
                format!("injected create failure for {path}"),
            ));
        }
        if state.entries.contains_key(path) {
            return Err(WriterError::new(
                ErrorKind::WriteIo,
                format!("{path} already exists"),
            ));
        }
        if let Some(dir) = parent(path) {
            insert_dirs(&mut state, dir);
        }
        let data = Arc::new(Mutex::new(Vec::new()));
        state
            .entries
            .insert(path.to_string(), Entry::File(Arc::clone(&data)));
        Ok(Box::new(FakeFile { data }))
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closes += 1;
        Ok(())
    }
}

/// Write handle to a fake file; bytes land in the shared store immediately.
struct FakeFile {
    data: Arc<Mutex<Vec<u8>>>,
}

impl Write for FakeFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data
            .lock()
            .map_err(|_| std::io::Error::other("fake file mutex poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Connector handing out clones of one [`FakeFileSystem`].
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    fs: FakeFileSystem,
    refuse: Arc<Mutex<bool>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new(fs: FakeFileSystem) -> Self {
        Self {
            fs,
            refuse: Arc::new(Mutex::new(false)),
            timeouts: Arc::default(),
        }
    }

    /// Timeout requested by every successful connection, in order.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn connect_timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().expect("timeouts mutex poisoned").clone()
    }

    #[must_use]
    pub fn filesystem(&self) -> &FakeFileSystem {
        &self.fs
    }

    /// Refuse (or accept again) new connections.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set_refuse_connections(&self, refuse: bool) {
        *self.refuse.lock().expect("refuse mutex poisoned") = refuse;
    }
}

impl FileSystemConnector for FakeConnector {
    fn connect(&self, endpoint: &str, options: &ConnectOptions) -> Result<Box<dyn FileSystem>> {
        if *self.refuse.lock().expect("refuse mutex poisoned") {
            return Err(WriterError::new(
                ErrorKind::ConnectFs,
                format!("connection to {endpoint} refused"),
            ));
        }
        self.fs.lock().connects += 1;
        self.timeouts
            .lock()
            .expect("timeouts mutex poisoned")
            .push(options.timeout);
        Ok(Box::new(self.fs.clone()))
    }
}
