//! Load/save orchestration for the single open document.

use std::{
    path::{Path, PathBuf},
    sync::mpsc::Sender,
};

use crate::{
    config::Config,
    doc_type::{self, Mode},
    engine::{Content, ContentEngine},
    error::{Error, Result},
    event_loop::Event,
    frontmatter::{self, Frontmatter},
    session::Session,
    storage::{ChangeSink, Storage, Subscription},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The engine is not ready yet; the path replays on `engine_ready`.
    Queued,
    NothingOpen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    NothingOpen,
}

pub struct Editor<S, E> {
    storage: S,
    engine: E,
    session: Session,
    config: Config,
    /// One slot: a newer open replaces an older one.
    pending: Option<PathBuf>,
    watch: Option<Subscription>,
    /// Stamped on every watch notification so stale ones can be told apart.
    generation: u64,
    notifier: Option<Sender<Event>>,
}

impl<S: Storage, E: ContentEngine> Editor<S, E> {
    pub fn new(storage: S, engine: E, config: Config) -> Self {
        Self {
            storage,
            engine,
            session: Session::default(),
            config,
            pending: None,
            watch: None,
            generation: 0,
            notifier: None,
        }
    }

    /// Where watch notifications are posted. Without one, no watch is made.
    pub(crate) fn set_notifier(&mut self, notifier: Sender<Event>) {
        self.notifier = Some(notifier);
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) const fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access for the host's own edits. Follow with
    /// [`Editor::content_changed`].
    pub const fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn pending(&self) -> Option<&Path> {
        self.pending.as_deref()
    }

    pub const fn watch_generation(&self) -> u64 {
        self.generation
    }

    pub const fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    pub fn open(&mut self, path: impl Into<PathBuf>) -> Result<LoadOutcome> {
        let path = path.into();
        if !self.engine.is_ready() {
            tracing::debug!(path = %path.display(), "engine not ready, queueing load");
            self.pending = Some(path);
            return Ok(LoadOutcome::Queued);
        }
        self.load_now(path)
    }

    /// Re-read the addressed file: the queued path if any, else the open one.
    pub fn reload(&mut self) -> Result<LoadOutcome> {
        let Some(path) = self
            .pending
            .clone()
            .or_else(|| self.session.path().map(Path::to_path_buf))
        else {
            return Ok(LoadOutcome::NothingOpen);
        };
        self.open(path)
    }

    pub fn engine_ready(&mut self) -> Result<LoadOutcome> {
        self.engine.mark_ready();
        match self.pending.take() {
            Some(path) => self.load_now(path),
            None => Ok(LoadOutcome::NothingOpen),
        }
    }

    pub(crate) fn load_now(&mut self, path: PathBuf) -> Result<LoadOutcome> {
        let snapshot = match self.storage.read(&path) {
            Ok(snapshot) => snapshot,
            Err(source) => {
                tracing::warn!(path = %path.display(), "load failed: {source}");
                self.session.mark_load_failed();
                return Err(Error::Read { path, source });
            }
        };

        let mode = doc_type::classify(&path);
        let language = doc_type::language_for(&path);
        let loaded = match mode {
            Mode::StructuredText => {
                let parsed = frontmatter::parse(&snapshot.text);
                self.engine
                    .load(Content::Structured { body: parsed.body })
                    .map(|()| parsed.frontmatter)
            }
            Mode::PlainText => self
                .engine
                .load(Content::Plain {
                    text: &snapshot.text,
                    language,
                })
                .map(|()| Frontmatter::new()),
        };
        let frontmatter = match loaded {
            Ok(frontmatter) => frontmatter,
            Err(err) => {
                tracing::warn!(path = %path.display(), "engine rejected content: {err}");
                self.session.mark_load_failed();
                return Err(err.into());
            }
        };

        let path_changed = self.session.path() != Some(path.as_path());
        tracing::info!(path = %path.display(), mode = mode.label(), "loaded");
        self.session = Session::opened(path, mode, language, frontmatter, snapshot.modified);

        if (path_changed || self.watch.is_none())
            && let Err(err) = self.subscribe()
        {
            tracing::warn!("{err}");
        }
        Ok(LoadOutcome::Loaded)
    }

    fn subscribe(&mut self) -> Result<()> {
        self.watch = None;
        self.generation += 1;

        let (Some(path), Some(notifier)) = (self.session.path(), self.notifier.clone()) else {
            return Ok(());
        };
        let generation = self.generation;
        let sink: ChangeSink = Box::new(move || {
            // The loop may already be gone during shutdown.
            let _ = notifier.send(Event::FileChanged { generation });
        });

        let subscription = self
            .storage
            .watch(path, self.config.watch_debounce(), sink)
            .map_err(|source| Error::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), generation, "watching");
        self.watch = Some(subscription);
        Ok(())
    }

    pub fn save(&mut self) -> Result<SaveOutcome> {
        let Some(path) = self.session.path().map(Path::to_path_buf) else {
            return Ok(SaveOutcome::NothingOpen);
        };
        if self.session.has_conflict() {
            return Err(Error::Conflict { path });
        }

        let contents = match self.session.mode() {
            Mode::PlainText => self.engine.snapshot(Mode::PlainText)?,
            Mode::StructuredText => {
                let mut out = frontmatter::serialize(self.session.frontmatter());
                out.push_str(&self.engine.snapshot(Mode::StructuredText)?);
                out
            }
        };

        let written = match self.storage.write(&path, &contents) {
            Ok(written) => written,
            Err(source) => {
                tracing::warn!(path = %path.display(), "save failed: {source}");
                return Err(Error::Write { path, source });
            }
        };
        self.session.mark_saved();
        // Only our own revision is recorded; anything written after it
        // still reads as newer.
        self.session.advance_modified(written);
        tracing::info!(path = %path.display(), bytes = contents.len(), "saved");
        Ok(SaveOutcome::Saved)
    }

    pub fn content_changed(&mut self) {
        self.session.mark_dirty();
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if !self.editing_frontmatter()
            || self.session.frontmatter().get(key) == Some(value.as_str())
        {
            return false;
        }
        let changed = self.session.frontmatter_mut().set(key, value);
        if changed {
            self.session.mark_dirty();
        }
        changed
    }

    /// Append an empty property under a fresh name and return the name.
    pub fn add_property(&mut self) -> Option<String> {
        if !self.editing_frontmatter() {
            return None;
        }
        let key = self.session.frontmatter_mut().add_property();
        self.session.mark_dirty();
        Some(key)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        let removed = self.session.frontmatter_mut().remove(key)?;
        self.session.mark_dirty();
        Some(removed)
    }

    pub fn rename_property(&mut self, old: &str, new: &str) -> bool {
        let renamed = self.session.frontmatter_mut().rename(old, new);
        if renamed {
            self.session.mark_dirty();
        }
        renamed
    }

    fn editing_frontmatter(&self) -> bool {
        self.session.path().is_some() && self.session.mode() == Mode::StructuredText
    }

    /// Back to the empty state. The watch is dropped.
    pub fn close(&mut self) {
        self.teardown();
        self.session = Session::default();
    }

    /// Drop the watch and the queued load. Notifications already in flight
    /// carry an old generation and are ignored.
    pub fn teardown(&mut self) {
        self.watch = None;
        self.pending = None;
        self.generation += 1;
    }
}
