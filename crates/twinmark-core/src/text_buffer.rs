use crate::{doc_type::Language, engine::PlainTextEngine};

const MAX_UNDO: usize = 200;

/// A headless plain-text editing buffer with a cursor and undo history.
#[derive(Clone, Debug, Default)]
pub struct TextBuffer {
    text: String,
    language: Option<Language>,
    cursor: usize,
    undo: Vec<String>,
    redo: Vec<String>,
    generation: u64,
}

impl TextBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte offset of the cursor, always on a char boundary.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, offset: usize) {
        self.cursor = floor_char_boundary(&self.text, offset);
    }

    /// Bumped every time the buffer is re-created.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.checkpoint();
        self.text.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.undo.pop() else {
            return false;
        };
        self.redo.push(std::mem::replace(&mut self.text, previous));
        self.set_cursor(self.cursor);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        self.undo.push(std::mem::replace(&mut self.text, next));
        self.set_cursor(self.cursor);
        true
    }

    fn checkpoint(&mut self) {
        if self.undo.len() == MAX_UNDO {
            self.undo.remove(0);
        }
        self.undo.push(self.text.clone());
        self.redo.clear();
    }
}

impl PlainTextEngine for TextBuffer {
    fn set_content(&mut self, text: &str) {
        if self.text == text {
            return;
        }
        self.checkpoint();
        text.clone_into(&mut self.text);
        self.set_cursor(self.cursor);
    }

    fn recreate(&mut self, language: Language, text: &str) {
        *self = Self {
            text: text.to_owned(),
            language: Some(language),
            generation: self.generation + 1,
            ..Self::default()
        };
    }

    fn content(&self) -> String {
        self.text.clone()
    }

    fn language(&self) -> Option<Language> {
        self.language
    }
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
