//! External-change reconciliation and conflict resolution.
//!
//! Every trigger (watch notification, focus gained, became visible) ends up
//! in [`Editor::check_and_reconcile`]. It takes `&mut Editor`, so two checks
//! can never interleave.

use std::path::Path;

use crate::{
    editor::Editor,
    engine::ContentEngine,
    error::Result,
    storage::Storage,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// The path is not the open document.
    NotOpen,
    Unchanged,
    /// Clean session, newer file: reloaded.
    Reloaded,
    /// Clean session, newer file, but the reload failed.
    ReloadFailed,
    /// Dirty session, newer file: local content kept, conflict flagged.
    Conflict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    AcceptExternal,
    KeepMine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved {
    NoConflict,
    Reloaded,
    KeptLocal,
}

impl<S: Storage, E: ContentEngine> Editor<S, E> {
    pub fn check_and_reconcile(&mut self, path: &Path) -> Reconciliation {
        if self.session().path() != Some(path) {
            return Reconciliation::NotOpen;
        }

        let modified = match self.storage().modified(path) {
            Ok(modified) => modified,
            Err(err) => {
                tracing::debug!(path = %path.display(), "stat failed, assuming unchanged: {err}");
                return Reconciliation::Unchanged;
            }
        };
        if !self.session().is_stale(modified) {
            return Reconciliation::Unchanged;
        }

        // Advance first so the same revision is never reported twice.
        self.session_mut().advance_modified(modified);

        if self.session().is_dirty() {
            tracing::info!(path = %path.display(), "changed on disk with unsaved edits");
            self.session_mut().flag_conflict();
            return Reconciliation::Conflict;
        }

        tracing::debug!(path = %path.display(), "changed on disk, reloading");
        match self.load_now(path.to_path_buf()) {
            Ok(_) => Reconciliation::Reloaded,
            Err(err) => {
                tracing::warn!("reload after external change failed: {err}");
                Reconciliation::ReloadFailed
            }
        }
    }

    pub fn resolve(&mut self, resolution: Resolution) -> Result<Resolved> {
        if !self.session().has_conflict() {
            return Ok(Resolved::NoConflict);
        }
        let Some(path) = self.session().path().map(Path::to_path_buf) else {
            return Ok(Resolved::NoConflict);
        };

        match resolution {
            Resolution::AcceptExternal => {
                tracing::info!(path = %path.display(), "conflict resolved: reloading from disk");
                self.load_now(path)?;
                Ok(Resolved::Reloaded)
            }
            Resolution::KeepMine => {
                tracing::info!(path = %path.display(), "conflict resolved: keeping local edits");
                self.session_mut().clear_conflict();
                Ok(Resolved::KeptLocal)
            }
        }
    }
}
