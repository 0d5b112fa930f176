use std::{
    fs::{self, File, Metadata},
    io::{self, Read as _, Write as _},
    path::Path,
    thread,
    time::{Duration, SystemTime},
};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt as _;

use crate::MAX_FILE_BYTES;

const READ_ATTEMPTS: usize = 3;
const READ_BACKOFF: Duration = Duration::from_millis(5);

/// Identity of one version of a file on disk. Two equal revisions mean
/// nothing replaced or rewrote the file in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Revision {
    pub(crate) modified: SystemTime,
    len: u64,
    #[cfg(unix)]
    inode: (u64, u64),
}

impl Revision {
    fn of(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            len: meta.len(),
            #[cfg(unix)]
            inode: (meta.dev(), meta.ino()),
        }
    }
}

pub(crate) fn revision(path: &Path) -> io::Result<Revision> {
    fs::metadata(path).map(|meta| Revision::of(&meta))
}

/// Read `path` as UTF-8 without tearing.
///
/// The revision of the opened handle must match the revision of the path
/// after the read; a writer that lands in between forces another attempt.
pub(crate) fn read_stable(path: &Path) -> io::Result<(String, Revision)> {
    for attempt in 0..READ_ATTEMPTS {
        if attempt > 0 {
            thread::sleep(READ_BACKOFF);
        }

        let mut file = File::open(path)?;
        let before = Revision::of(&file.metadata()?);
        if before.len > MAX_FILE_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is larger than {MAX_FILE_BYTES} bytes", path.display()),
            ));
        }

        let mut text = String::with_capacity(usize::try_from(before.len).unwrap_or(0));
        file.read_to_string(&mut text)?;

        match revision(path) {
            Ok(after) if after == before => return Ok((text, after)),
            Ok(_) => {}
            // Replaced by rename mid-read; the next attempt opens the new file.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::other(format!(
        "{} kept changing while being read",
        path.display()
    )))
}

/// Replace `path` with `contents` through a synced temp file in the same
/// directory, so readers see either the old or the new file.
///
/// Returns the modification time of the file written, read from the temp
/// file's handle; the rename keeps it.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> io::Result<SystemTime> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path is missing a file name"))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".twinmark-{}-", name.to_string_lossy()))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    if let Ok(meta) = fs::metadata(path) {
        let _ = tmp.as_file().set_permissions(meta.permissions());
    }
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    let written = Revision::of(&tmp.as_file().metadata()?).modified;
    // On failure the temp file is removed when the error drops.
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(written)
}

/// Truncate and rewrite `path` in place. Returns the modification time seen
/// through the handle that did the writing.
pub(crate) fn write_in_place(path: &Path, contents: &str) -> io::Result<SystemTime> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(Revision::of(&file.metadata()?).modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftovers(dir: &Path) -> io::Result<usize> {
        Ok(fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".twinmark-"))
            .count())
    }

    #[test]
    fn reads_text_with_its_revision() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.md");
        fs::write(&path, "content")?;

        let (text, rev) = read_stable(&path)?;
        assert_eq!(text, "content");
        assert_eq!(rev, revision(&path)?);
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir();
        let err = dir
            .and_then(|dir| read_stable(&dir.path().join("absent.md")))
            .err();
        assert_eq!(err.map(|e| e.kind()), Some(io::ErrorKind::NotFound));
    }

    #[test]
    fn invalid_utf8_is_an_error() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("binary.md");
        fs::write(&path, [0xff, 0xfe, 0x00])?;
        assert!(read_stable(&path).is_err());
        Ok(())
    }

    #[test]
    fn rewrite_changes_revision() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.md");
        fs::write(&path, "one")?;
        let first = revision(&path)?;
        write_atomic(&path, "three")?;
        assert_ne!(revision(&path)?, first);
        Ok(())
    }

    #[test]
    fn atomic_write_creates_and_replaces() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.md");

        let written = write_atomic(&path, "first")?;
        assert_eq!(fs::read_to_string(&path)?, "first");
        assert_eq!(revision(&path)?.modified, written);
        write_atomic(&path, "second")?;
        assert_eq!(fs::read_to_string(&path)?, "second");
        assert_eq!(leftovers(dir.path())?, 0);
        Ok(())
    }

    #[test]
    fn in_place_write_reports_its_own_timestamp() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.md");
        fs::write(&path, "a much longer first version")?;

        let written = write_in_place(&path, "short")?;
        assert_eq!(fs::read_to_string(&path)?, "short");
        assert_eq!(revision(&path)?.modified, written);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_keeps_permissions() -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("script.sh");
        fs::write(&path, "echo one\n")?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o750))?;

        write_atomic(&path, "echo two\n")?;
        assert_eq!(fs::metadata(&path)?.permissions().mode() & 0o777, 0o750);
        Ok(())
    }

    #[test]
    fn atomic_write_rejects_missing_file_name() {
        assert!(write_atomic(Path::new("/"), "data").is_err());
    }
}
