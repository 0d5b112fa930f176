#![forbid(unsafe_code)]

use std::{
    fs,
    io::{self, BufRead as _, Read as _},
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;
use twinmark_core::{
    Config, DiskStorage, Editor, Engines, Event, EventLoop, LoadOutcome, Mode, Notice,
    Reconciliation, Resolution, Resolved, SaveOutcome,
    blocks::{Block, BlockDocument},
    doc_type, frontmatter, markdown,
    text_buffer::TextBuffer,
};

const POLL: Duration = Duration::from_millis(100);

type CliLoop = EventLoop<DiskStorage, Engines<BlockDocument, TextBuffer>>;

#[derive(Parser)]
#[command(name = "twinmark", about = "Headless markdown/plain-text editing session", version)]
struct Cli {
    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to the platform config dir).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the body of a markdown file as plain text, frontmatter stripped.
    Preview {
        /// Path to a markdown file. Use `-` to read from stdin.
        path: PathBuf,
    },
    /// Print the frontmatter properties and the body of a file.
    Frontmatter { path: PathBuf },
    /// Print the editing mode and language chosen for a path.
    Classify { path: PathBuf },
    /// Open a file and drive the session from stdin commands.
    Open { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Preview { path } => {
            let source = read_source(&path)?;
            let parsed = frontmatter::parse(&source);
            print!("{}", markdown::plain_text(parsed.body));
        }
        Command::Frontmatter { path } => {
            let source = read_source(&path)?;
            let parsed = frontmatter::parse(&source);
            for (key, value) in parsed.frontmatter.iter() {
                println!("{key}: {value}");
            }
            println!("---");
            print!("{}", parsed.body);
        }
        Command::Classify { path } => {
            println!(
                "{} {}",
                doc_type::classify(&path).label(),
                doc_type::language_for(&path).label()
            );
        }
        Command::Open { path } => {
            let config = Config::load(cli.config.as_deref()).context("failed to load config")?;
            let path = std::path::absolute(&path)
                .with_context(|| format!("failed to resolve {}", path.display()))?;
            open(config, path)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Save,
    Reload,
    Edit(String),
    Focus,
    Keep,
    Accept,
    Status,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    Some(match word {
        "save" => Input::Save,
        "reload" => Input::Reload,
        "edit" if !rest.is_empty() => Input::Edit(rest.to_owned()),
        "focus" => Input::Focus,
        "keep" => Input::Keep,
        "accept" => Input::Accept,
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        _ => return None,
    })
}

fn open(config: Config, path: PathBuf) -> anyhow::Result<()> {
    let storage = DiskStorage::new(config.atomic_save);
    let engines = Engines::new(BlockDocument::default(), TextBuffer::default());
    let mut event_loop = EventLoop::new(Editor::new(storage, engines, config));
    let events = event_loop.sender();
    events
        .send(Event::Open(path))
        .and_then(|()| events.send(Event::EngineReady))
        .context("event loop is gone")?;

    let (input_tx, input_rx) = mpsc::channel();
    thread::Builder::new()
        .name("twinmark-stdin".to_owned())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if input_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader")?;

    while !event_loop.is_stopped() {
        match input_rx.recv_timeout(POLL) {
            Ok(line) => match parse_input(&line) {
                Some(input) => apply(&mut event_loop, input),
                None => eprintln!("unknown command: {line}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => apply(&mut event_loop, Input::Quit),
        }
        for notice in event_loop.drain() {
            report(&event_loop, &notice);
        }
    }
    Ok(())
}

fn apply(event_loop: &mut CliLoop, input: Input) {
    let event = match input {
        Input::Save => Event::Save,
        Input::Reload => Event::Reload,
        Input::Focus => Event::FocusChanged(true),
        Input::Keep => Event::Resolve(Resolution::KeepMine),
        Input::Accept => Event::Resolve(Resolution::AcceptExternal),
        Input::Quit => Event::Shutdown,
        Input::Status => {
            status(event_loop);
            return;
        }
        Input::Edit(text) => {
            let editor = event_loop.editor_mut();
            if editor.session().path().is_none() {
                eprintln!("nothing open");
                return;
            }
            append(editor, &text);
            Event::ContentChanged
        }
    };
    if let Some(notice) = event_loop.handle(event) {
        report(event_loop, &notice);
    }
}

fn append(editor: &mut Editor<DiskStorage, Engines<BlockDocument, TextBuffer>>, text: &str) {
    let mode = editor.session().mode();
    let engines = editor.engine_mut();
    match mode {
        Mode::StructuredText => engines.structured_mut().push(Block::paragraph(text)),
        Mode::PlainText => {
            let buffer = engines.plain_mut();
            buffer.set_cursor(buffer.text().len());
            if !buffer.text().is_empty() && !buffer.text().ends_with('\n') {
                buffer.insert("\n");
            }
            buffer.insert(text);
            buffer.insert("\n");
        }
    }
}

fn status(event_loop: &CliLoop) {
    let session = event_loop.editor().session();
    println!(
        "{} [{}] dirty={} conflict={}",
        session.display_name(),
        session.mode().label(),
        session.is_dirty(),
        session.has_conflict()
    );
    for (key, value) in session.frontmatter().iter() {
        println!("  {key}: {value}");
    }
}

fn report(event_loop: &CliLoop, notice: &Notice) {
    let name = event_loop.editor().session().display_name();
    match notice {
        Notice::Load(LoadOutcome::Loaded) => println!("opened {name}"),
        Notice::Load(LoadOutcome::Queued) => println!("waiting for the editor"),
        Notice::Load(LoadOutcome::NothingOpen) | Notice::Save(SaveOutcome::NothingOpen) => {}
        Notice::Save(SaveOutcome::Saved) => println!("saved {name}"),
        Notice::Reconcile(Reconciliation::Reloaded) => println!("{name} changed on disk; reloaded"),
        Notice::Reconcile(Reconciliation::Conflict) => {
            println!("{name} changed on disk while you have unsaved edits; `accept` or `keep`");
        }
        Notice::Reconcile(Reconciliation::ReloadFailed) => println!("{name} could not be reloaded"),
        Notice::Reconcile(Reconciliation::NotOpen | Reconciliation::Unchanged) => {}
        Notice::Resolve(Resolved::Reloaded) => println!("took the version on disk"),
        Notice::Resolve(Resolved::KeptLocal) => println!("kept your version"),
        Notice::Resolve(Resolved::NoConflict) => println!("no conflict to resolve"),
        Notice::Failed(err) => eprintln!("error: {err}"),
        Notice::Stopped => {}
    }
}
