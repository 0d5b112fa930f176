use std::{
    ffi::OsStr,
    io,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::{Duration, Instant},
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};

use crate::storage::{ChangeSink, Subscription};

/// Trailing-edge debounce: every event pushes the deadline out by `window`,
/// and a burst fires once, `window` after its last event.
#[derive(Debug)]
pub(crate) struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub(crate) const fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub(crate) fn note(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub(crate) fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub(crate) fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

struct FileWatch {
    _watcher: RecommendedWatcher,
    cancelled: Arc<AtomicBool>,
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Watch a single file for changes.
///
/// The parent directory is watched (non-recursively) and events are filtered
/// by file name, so editors that save by writing a temp file and renaming it
/// over the original are still seen.
pub(crate) fn watch_file(
    path: &Path,
    debounce: Duration,
    sink: ChangeSink,
) -> io::Result<Subscription> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path is missing a file name"))?
        .to_os_string();

    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(tx).map_err(io::Error::other)?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(io::Error::other)?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let thread_cancelled = Arc::clone(&cancelled);
    let label = path.display().to_string();

    thread::Builder::new()
        .name("twinmark-watch".to_owned())
        .spawn(move || {
            let mut debouncer = Debouncer::new(debounce);
            loop {
                let received = match debouncer.remaining(Instant::now()) {
                    Some(wait) => rx.recv_timeout(wait),
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                match received {
                    Ok(Ok(event)) => {
                        if touches_file(&event, &file_name) {
                            tracing::trace!(path = %label, kind = ?event.kind, "watch event");
                            debouncer.note(Instant::now());
                        }
                    }
                    Ok(Err(err)) => tracing::warn!(path = %label, "watch error: {err}"),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if thread_cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if debouncer.fire(Instant::now()) {
                    tracing::debug!(path = %label, "debounced change");
                    sink();
                }
            }
            tracing::debug!(path = %label, "watch thread stopped");
        })?;

    Ok(Subscription::new(FileWatch {
        _watcher: watcher,
        cancelled,
    }))
}

fn touches_file(event: &Event, file_name: &OsStr) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name))
}
