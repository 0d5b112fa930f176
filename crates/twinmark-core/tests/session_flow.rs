use std::{
    fs, io,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use twinmark_core::{
    Config, DiskStorage, Editor, Engines, Event, EventLoop, LoadOutcome, Notice, Reconciliation,
    Resolution, Resolved, SaveOutcome,
    blocks::{Block, BlockDocument},
    text_buffer::TextBuffer,
};

type DiskLoop = EventLoop<DiskStorage, Engines<BlockDocument, TextBuffer>>;

const WAIT: Duration = Duration::from_secs(5);

fn disk_loop() -> DiskLoop {
    let config = Config {
        watch_debounce_ms: 50,
        ..Config::default()
    };
    EventLoop::new(Editor::new(
        DiskStorage::new(config.atomic_save),
        Engines::new(BlockDocument::default(), TextBuffer::default()),
        config,
    ))
}

/// Drain the loop until a reconciliation shows up or `WAIT` passes.
fn wait_for_reconcile(event_loop: &mut DiskLoop) -> Option<Reconciliation> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        for notice in event_loop.drain() {
            if let Notice::Reconcile(outcome) = notice {
                return Some(outcome);
            }
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

/// Filesystems with coarse timestamps need a visible gap between writes.
fn external_write(path: &Path, contents: &str) -> io::Result<()> {
    thread::sleep(Duration::from_millis(1100));
    fs::write(path, contents)
}

fn open(event_loop: &mut DiskLoop, path: &Path) -> bool {
    let ready = event_loop.handle(Event::EngineReady);
    let opened = event_loop.handle(Event::Open(path.to_path_buf()));
    matches!(ready, Some(Notice::Load(LoadOutcome::NothingOpen)))
        && matches!(opened, Some(Notice::Load(LoadOutcome::Loaded)))
}

#[test]
fn external_edit_reloads_clean_session() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.md");
    fs::write(&path, "---\ntitle: Hello\n---\nBody text\n")?;

    let mut event_loop = disk_loop();
    assert!(open(&mut event_loop, &path));
    assert!(event_loop.editor().is_watching());

    external_write(&path, "---\ntitle: Changed\n---\nNew body\n")?;
    assert_eq!(
        wait_for_reconcile(&mut event_loop),
        Some(Reconciliation::Reloaded)
    );

    let editor = event_loop.editor();
    assert_eq!(editor.session().frontmatter().get("title"), Some("Changed"));
    assert_eq!(
        editor.engine().structured().blocks(),
        [Block::paragraph("New body")]
    );
    Ok(())
}

#[test]
fn external_edit_with_local_changes_conflicts() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.md");
    fs::write(&path, "Mine\n")?;

    let mut event_loop = disk_loop();
    assert!(open(&mut event_loop, &path));
    event_loop
        .editor_mut()
        .engine_mut()
        .structured_mut()
        .push(Block::paragraph("Added"));
    assert!(event_loop.handle(Event::ContentChanged).is_none());

    external_write(&path, "Theirs\n")?;
    assert_eq!(
        wait_for_reconcile(&mut event_loop),
        Some(Reconciliation::Conflict)
    );
    assert_eq!(fs::read_to_string(&path)?, "Theirs\n");

    let kept = event_loop.handle(Event::Resolve(Resolution::KeepMine));
    assert!(matches!(kept, Some(Notice::Resolve(Resolved::KeptLocal))));
    let saved = event_loop.handle(Event::Save);
    assert!(matches!(saved, Some(Notice::Save(SaveOutcome::Saved))));
    assert_eq!(fs::read_to_string(&path)?, "Mine\n\nAdded\n");

    // The watch sees our own save, but it is not newer than what we know.
    assert_eq!(wait_for_short(&mut event_loop), None);
    assert!(!event_loop.editor().session().is_dirty());
    Ok(())
}

fn wait_for_short(event_loop: &mut DiskLoop) -> Option<Reconciliation> {
    thread::sleep(Duration::from_millis(300));
    event_loop.drain().into_iter().find_map(|notice| match notice {
        Notice::Reconcile(outcome) => Some(outcome),
        _ => None,
    })
}

#[test]
fn writes_inside_the_debounce_window_reconcile_once() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("draft.txt");
    fs::write(&path, "zero\n")?;

    let mut event_loop = disk_loop();
    assert!(open(&mut event_loop, &path));

    external_write(&path, "one\n")?;
    thread::sleep(Duration::from_millis(10));
    fs::write(&path, "one\ntwo\n")?;

    assert_eq!(
        wait_for_reconcile(&mut event_loop),
        Some(Reconciliation::Reloaded)
    );
    assert_eq!(wait_for_short(&mut event_loop), None);
    assert_eq!(event_loop.editor().engine().plain().text(), "one\ntwo\n");
    Ok(())
}

#[test]
fn plain_text_round_trips_verbatim() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("main.rs");
    let source = "---\nnot: frontmatter\n---\nfn main() {}\n";
    fs::write(&path, source)?;

    let mut event_loop = disk_loop();
    assert!(open(&mut event_loop, &path));
    assert!(event_loop.editor().session().frontmatter().is_empty());

    assert!(event_loop.handle(Event::ContentChanged).is_none());
    let saved = event_loop.handle(Event::Save);
    assert!(matches!(saved, Some(Notice::Save(SaveOutcome::Saved))));
    assert_eq!(fs::read_to_string(&path)?, source);
    Ok(())
}

#[test]
fn missing_file_reports_error_name() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut event_loop = disk_loop();
    let _ = event_loop.handle(Event::EngineReady);

    let failed = event_loop.handle(Event::Open(dir.path().join("absent.md")));
    assert!(matches!(
        failed,
        Some(Notice::Failed(twinmark_core::Error::Read { .. }))
    ));
    assert_eq!(
        event_loop.editor().session().display_name(),
        twinmark_core::session::LOAD_FAILED_LABEL
    );
    Ok(())
}
