//! The storage capability: everything the session needs from a filesystem.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use crate::{disk_io, watcher};

/// File content together with the modification time it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub text: String,
    pub modified: SystemTime,
}

/// Called (from any thread) once per debounced burst of changes.
pub type ChangeSink = Box<dyn Fn() + Send + Sync + 'static>;

/// Live watch registration. Dropping it unsubscribes and cancels any
/// pending debounce timer.
pub struct Subscription {
    _guard: Box<dyn Send>,
}

impl Subscription {
    pub fn new(guard: impl Send + 'static) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

pub trait Storage {
    fn read(&self, path: &Path) -> io::Result<Snapshot>;
    /// Replace the file and return the modification time of what was
    /// written, as observed by the write itself.
    fn write(&self, path: &Path, contents: &str) -> io::Result<SystemTime>;
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
    fn watch(&self, path: &Path, debounce: Duration, sink: ChangeSink)
    -> io::Result<Subscription>;
}

/// The real filesystem.
#[derive(Clone, Copy, Debug)]
pub struct DiskStorage {
    atomic_save: bool,
}

impl DiskStorage {
    pub const fn new(atomic_save: bool) -> Self {
        Self { atomic_save }
    }
}

impl Default for DiskStorage {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Storage for DiskStorage {
    fn read(&self, path: &Path) -> io::Result<Snapshot> {
        let (text, revision) = disk_io::read_stable(path)?;
        Ok(Snapshot {
            text,
            modified: revision.modified,
        })
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<SystemTime> {
        if self.atomic_save {
            disk_io::write_atomic(path, contents)
        } else {
            disk_io::write_in_place(path, contents)
        }
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        disk_io::revision(path).map(|rev| rev.modified)
    }

    fn watch(
        &self,
        path: &Path,
        debounce: Duration,
        sink: ChangeSink,
    ) -> io::Result<Subscription> {
        watcher::watch_file(path, debounce, sink)
    }
}

/// In-memory files on a logical clock: every write advances `modified` by one
/// second. Clones share the same files, so a host (or a test) can keep a
/// handle and play the part of an external writer.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryFiles>>,
}

#[derive(Default)]
struct MemoryFiles {
    clock: u64,
    files: HashMap<PathBuf, (String, SystemTime)>,
    watchers: Vec<(PathBuf, Arc<ChangeSink>)>,
    fail_reads: bool,
    fail_writes: bool,
    fail_stats: bool,
}

impl MemoryFiles {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write as an outside actor would. Returns the new modification time.
    pub fn put(&self, path: impl Into<PathBuf>, contents: impl Into<String>) -> SystemTime {
        let mut files = self.lock();
        let modified = files.tick();
        files.files.insert(path.into(), (contents.into(), modified));
        modified
    }

    pub fn remove(&self, path: &Path) {
        self.lock().files.remove(path);
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock().files.get(path).map(|(text, _)| text.clone())
    }

    /// Deliver a change notification to every live watch on `path`.
    pub fn notify(&self, path: &Path) {
        let sinks: Vec<_> = self
            .lock()
            .watchers
            .iter()
            .filter(|(watched, sink)| watched == path && Arc::strong_count(sink) > 1)
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in sinks {
            sink();
        }
    }

    /// Number of watches on `path` that have not been dropped.
    pub fn live_watches(&self, path: &Path) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|(watched, sink)| watched == path && Arc::strong_count(sink) > 1)
            .count()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn fail_stats(&self, fail: bool) {
        self.lock().fail_stats = fail;
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

impl Storage for MemoryStorage {
    fn read(&self, path: &Path) -> io::Result<Snapshot> {
        let files = self.lock();
        if files.fail_reads {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "unreadable storage",
            ));
        }
        let (text, modified) = files.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(Snapshot {
            text: text.clone(),
            modified: *modified,
        })
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<SystemTime> {
        let mut files = self.lock();
        if files.fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only storage",
            ));
        }
        let modified = files.tick();
        files
            .files
            .insert(path.to_path_buf(), (contents.to_owned(), modified));
        Ok(modified)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        let files = self.lock();
        if files.fail_stats {
            return Err(io::Error::other("stat unavailable"));
        }
        files
            .files
            .get(path)
            .map(|(_, modified)| *modified)
            .ok_or_else(|| not_found(path))
    }

    fn watch(
        &self,
        path: &Path,
        _debounce: Duration,
        sink: ChangeSink,
    ) -> io::Result<Subscription> {
        let sink = Arc::new(sink);
        let mut files = self.lock();
        files
            .watchers
            .retain(|(_, existing)| Arc::strong_count(existing) > 1);
        files.watchers.push((path.to_path_buf(), Arc::clone(&sink)));
        Ok(Subscription::new(MemoryWatch { _sink: sink }))
    }
}

/// Holds the second reference to a sink; dropping it marks the watch dead.
struct MemoryWatch {
    _sink: Arc<ChangeSink>,
}
