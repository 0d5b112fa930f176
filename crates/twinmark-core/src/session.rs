use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::{
    doc_type::{Language, Mode},
    frontmatter::Frontmatter,
};

pub const NO_FILE_LABEL: &str = "No file opened";
pub const LOAD_FAILED_LABEL: &str = "Error loading file";

/// The single open-document context of an editor window.
///
/// `conflict` implies `dirty`: a clean session simply reloads on external
/// change, so only a dirty one ever needs arbitration.
#[derive(Clone, Debug, Default)]
pub struct Session {
    path: Option<PathBuf>,
    load_failed: bool,
    mode: Mode,
    language: Language,
    dirty: bool,
    conflict: bool,
    last_known_modified: Option<SystemTime>,
    frontmatter: Frontmatter,
}

impl Session {
    pub(crate) fn opened(
        path: PathBuf,
        mode: Mode,
        language: Language,
        frontmatter: Frontmatter,
        modified: SystemTime,
    ) -> Self {
        Self {
            path: Some(path),
            load_failed: false,
            mode,
            language,
            dirty: false,
            conflict: false,
            last_known_modified: Some(modified),
            frontmatter,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn display_name(&self) -> Cow<'_, str> {
        if self.load_failed {
            return Cow::Borrowed(LOAD_FAILED_LABEL);
        }
        self.path
            .as_ref()
            .and_then(|path| path.file_name())
            .map_or(Cow::Borrowed(NO_FILE_LABEL), |name| name.to_string_lossy())
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub const fn language(&self) -> Language {
        self.language
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub const fn has_conflict(&self) -> bool {
        self.conflict
    }

    pub const fn last_known_modified(&self) -> Option<SystemTime> {
        self.last_known_modified
    }

    /// True once a file has been loaded; false in the empty state.
    pub const fn showing_editor(&self) -> bool {
        self.path.is_some()
    }

    pub const fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    pub(crate) const fn frontmatter_mut(&mut self) -> &mut Frontmatter {
        &mut self.frontmatter
    }

    pub(crate) const fn mark_dirty(&mut self) {
        if self.path.is_some() {
            self.dirty = true;
        }
    }

    pub(crate) const fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub(crate) const fn mark_load_failed(&mut self) {
        self.load_failed = true;
    }

    /// Ignored for a clean session, which reloads instead.
    pub(crate) const fn flag_conflict(&mut self) {
        if self.dirty {
            self.conflict = true;
        }
    }

    pub(crate) const fn clear_conflict(&mut self) {
        self.conflict = false;
    }

    pub(crate) const fn advance_modified(&mut self, modified: SystemTime) {
        self.last_known_modified = Some(modified);
    }

    /// Whether `modified` is newer than anything this session has seen.
    pub(crate) fn is_stale(&self, modified: SystemTime) -> bool {
        self.last_known_modified
            .is_none_or(|known| modified > known)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn opened(path: &str) -> Session {
        Session::opened(
            PathBuf::from(path),
            Mode::StructuredText,
            Language::Markdown,
            Frontmatter::new(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(10),
        )
    }

    #[test]
    fn display_name_tracks_state() {
        let mut session = Session::default();
        assert_eq!(session.display_name(), NO_FILE_LABEL);
        assert!(!session.showing_editor());

        session = opened("/docs/notes.md");
        assert_eq!(session.display_name(), "notes.md");
        assert!(session.showing_editor());

        session.mark_load_failed();
        assert_eq!(session.display_name(), LOAD_FAILED_LABEL);
        assert_eq!(session.path(), Some(Path::new("/docs/notes.md")));
    }

    #[test]
    fn dirty_requires_open_file() {
        let mut session = Session::default();
        session.mark_dirty();
        assert!(!session.is_dirty());

        let mut session = opened("/docs/notes.md");
        session.mark_dirty();
        assert!(session.is_dirty());
        session.mark_saved();
        assert!(!session.is_dirty());
    }

    #[test]
    fn conflict_implies_dirty() {
        let mut session = opened("/docs/notes.md");
        session.flag_conflict();
        assert!(!session.has_conflict());

        session.mark_dirty();
        session.flag_conflict();
        assert!(session.has_conflict() && session.is_dirty());
        session.clear_conflict();
        assert!(!session.has_conflict() && session.is_dirty());
    }

    #[test]
    fn staleness_compares_timestamps() {
        let mut session = opened("/docs/notes.md");
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        assert!(!session.is_stale(base));
        assert!(!session.is_stale(base - Duration::from_secs(1)));
        assert!(session.is_stale(base + Duration::from_secs(1)));

        session.advance_modified(base + Duration::from_secs(1));
        assert!(!session.is_stale(base + Duration::from_secs(1)));
        assert!(Session::default().is_stale(base));
    }
}
