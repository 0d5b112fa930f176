//! The single consumer of host signals and watch notifications.
//!
//! Everything that can change the session arrives as an [`Event`] on one
//! channel. Watch threads only ever post messages; all session mutation
//! happens on the thread that drives the loop.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::mpsc::{self, Receiver, Sender},
};

use crate::{
    editor::{Editor, LoadOutcome, SaveOutcome},
    engine::ContentEngine,
    error::Error,
    reconcile::{Reconciliation, Resolution, Resolved},
    storage::Storage,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Open(PathBuf),
    Reload,
    Save,
    FocusChanged(bool),
    VisibilityChanged(bool),
    /// Posted by the debounced watch of subscription `generation`.
    FileChanged {
        generation: u64,
    },
    EngineReady,
    ContentChanged,
    Resolve(Resolution),
    Shutdown,
}

/// What the host should hear about after handling an event.
#[derive(Debug)]
pub enum Notice {
    Load(LoadOutcome),
    Save(SaveOutcome),
    Reconcile(Reconciliation),
    Resolve(Resolved),
    Failed(Error),
    Stopped,
}

pub struct EventLoop<S, E> {
    editor: Editor<S, E>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    backlog: VecDeque<Event>,
    stopped: bool,
}

impl<S: Storage, E: ContentEngine> EventLoop<S, E> {
    pub fn new(mut editor: Editor<S, E>) -> Self {
        let (tx, rx) = mpsc::channel();
        editor.set_notifier(tx.clone());
        Self {
            editor,
            tx,
            rx,
            backlog: VecDeque::new(),
            stopped: false,
        }
    }

    /// A handle for posting events from any thread.
    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub const fn editor(&self) -> &Editor<S, E> {
        &self.editor
    }

    pub const fn editor_mut(&mut self) -> &mut Editor<S, E> {
        &mut self.editor
    }

    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Handle everything already queued without blocking.
    pub fn drain(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while !self.stopped
            && let Some(event) = self.next_queued()
        {
            notices.extend(self.handle(event));
        }
        notices
    }

    /// Block on the queue until `Shutdown`, reporting each notice.
    pub fn run(&mut self, mut on_notice: impl FnMut(&Editor<S, E>, Notice)) {
        while !self.stopped {
            let event = match self.backlog.pop_front() {
                Some(event) => event,
                None => match self.rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            if let Some(notice) = self.handle(event) {
                on_notice(&self.editor, notice);
            }
        }
    }

    fn next_queued(&mut self) -> Option<Event> {
        self.backlog
            .pop_front()
            .or_else(|| self.rx.try_recv().ok())
    }

    pub fn handle(&mut self, event: Event) -> Option<Notice> {
        if self.stopped {
            return None;
        }

        match event {
            Event::Open(path) => Some(outcome(self.editor.open(path), Notice::Load)),
            Event::Reload => Some(outcome(self.editor.reload(), Notice::Load)),
            Event::Save => Some(outcome(self.editor.save(), Notice::Save)),
            Event::EngineReady => Some(outcome(self.editor.engine_ready(), Notice::Load)),
            Event::ContentChanged => {
                self.editor.content_changed();
                None
            }
            Event::Resolve(resolution) => {
                Some(outcome(self.editor.resolve(resolution), Notice::Resolve))
            }
            Event::FileChanged { generation } if generation != self.editor.watch_generation() => {
                tracing::debug!(generation, "dropping notification from an old watch");
                None
            }
            trigger @ (Event::FileChanged { .. }
            | Event::FocusChanged(true)
            | Event::VisibilityChanged(true)) => self.recheck(&trigger),
            Event::FocusChanged(false) | Event::VisibilityChanged(false) => None,
            Event::Shutdown => {
                self.editor.teardown();
                self.backlog.clear();
                self.stopped = true;
                tracing::debug!("event loop stopped");
                Some(Notice::Stopped)
            }
        }
    }

    fn recheck(&mut self, trigger: &Event) -> Option<Notice> {
        let from_watch = matches!(trigger, Event::FileChanged { .. });
        if !from_watch && !self.editor.config().recheck_on_focus {
            return None;
        }
        let path = self.editor.session().path()?.to_path_buf();

        let coalesced = self.coalesce_triggers();
        if coalesced > 0 {
            tracing::debug!(coalesced, "merged queued change checks");
        }

        match self.editor.check_and_reconcile(&path) {
            Reconciliation::NotOpen | Reconciliation::Unchanged => None,
            outcome => Some(Notice::Reconcile(outcome)),
        }
    }

    /// Drop the change checks queued right behind the one about to run. The
    /// check stats the file after they were posted, so it covers them.
    fn coalesce_triggers(&mut self) -> usize {
        self.backlog.extend(self.rx.try_iter());
        let generation = self.editor.watch_generation();
        let mut dropped = 0;
        while let Some(next) = self.backlog.front() {
            let redundant = match next {
                Event::FileChanged { generation: g } => *g == generation,
                Event::FocusChanged(gained) | Event::VisibilityChanged(gained) => *gained,
                _ => false,
            };
            if !redundant {
                break;
            }
            self.backlog.pop_front();
            dropped += 1;
        }
        dropped
    }
}

fn outcome<T>(result: Result<T, Error>, notice: impl FnOnce(T) -> Notice) -> Notice {
    result.map_or_else(Notice::Failed, notice)
}
