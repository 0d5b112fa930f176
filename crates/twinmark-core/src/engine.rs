//! The content engine capability: whatever renders and edits the document.
//!
//! The orchestrator never talks to the structured and plain-text engines
//! directly. It hands a [`Content`] to one [`ContentEngine`] and asks it for
//! a text snapshot back, and the engine dispatches on the variant.

use crate::{
    doc_type::{Language, Mode},
    error::EngineError,
};

/// Block-structured rich text (markdown).
pub trait StructuredEngine {
    type Tree;

    fn decode(&mut self, markdown: &str) -> Result<Self::Tree, EngineError>;
    fn replace(&mut self, tree: Self::Tree);
    /// Markdown for the current tree. Formatting the tree cannot express is
    /// dropped, so this is not a byte-exact inverse of `decode`.
    fn encode_lossy(&self) -> Result<String, EngineError>;
}

/// A flat text buffer.
pub trait PlainTextEngine {
    /// Replace the content in place, keeping cursor and undo history.
    fn set_content(&mut self, text: &str);
    /// Start over with a fresh buffer for `language`.
    fn recreate(&mut self, language: Language, text: &str);
    fn content(&self) -> String;
    /// `None` until the buffer has been created.
    fn language(&self) -> Option<Language>;
}

/// What a load hands to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Content<'a> {
    Structured { body: &'a str },
    Plain { text: &'a str, language: Language },
}

pub trait ContentEngine {
    fn is_ready(&self) -> bool;
    fn mark_ready(&mut self);
    fn load(&mut self, content: Content<'_>) -> Result<(), EngineError>;
    fn snapshot(&self, mode: Mode) -> Result<String, EngineError>;
}

/// A structured and a plain-text engine behind one capability.
#[derive(Debug, Default)]
pub struct Engines<S, P> {
    structured: S,
    plain: P,
    ready: bool,
}

impl<S, P> Engines<S, P> {
    pub const fn new(structured: S, plain: P) -> Self {
        Self {
            structured,
            plain,
            ready: false,
        }
    }

    pub const fn structured(&self) -> &S {
        &self.structured
    }

    pub const fn structured_mut(&mut self) -> &mut S {
        &mut self.structured
    }

    pub const fn plain(&self) -> &P {
        &self.plain
    }

    pub const fn plain_mut(&mut self) -> &mut P {
        &mut self.plain
    }
}

impl<S: StructuredEngine, P: PlainTextEngine> ContentEngine for Engines<S, P> {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn mark_ready(&mut self) {
        self.ready = true;
    }

    fn load(&mut self, content: Content<'_>) -> Result<(), EngineError> {
        match content {
            Content::Structured { body } => {
                let tree = self.structured.decode(body)?;
                self.structured.replace(tree);
            }
            Content::Plain { text, language } => {
                if self.plain.language() == Some(language) {
                    self.plain.set_content(text);
                } else {
                    self.plain.recreate(language, text);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self, mode: Mode) -> Result<String, EngineError> {
        match mode {
            Mode::StructuredText => self.structured.encode_lossy(),
            Mode::PlainText => Ok(self.plain.content()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{blocks::BlockDocument, text_buffer::TextBuffer};

    #[test]
    fn engines_start_unready() {
        let mut engines = Engines::new(BlockDocument::default(), TextBuffer::default());
        assert!(!engines.is_ready());
        engines.mark_ready();
        assert!(engines.is_ready());
    }

    #[test]
    fn load_dispatches_by_variant() -> Result<(), EngineError> {
        let mut engines = Engines::new(BlockDocument::default(), TextBuffer::default());

        engines.load(Content::Structured { body: "# Title\n" })?;
        assert_eq!(engines.snapshot(Mode::StructuredText)?, "# Title\n");
        assert_eq!(engines.snapshot(Mode::PlainText)?, "");

        let text = "fn main() {}\n";
        engines.load(Content::Plain {
            text,
            language: Language::Rust,
        })?;
        assert_eq!(engines.snapshot(Mode::PlainText)?, text);
        Ok(())
    }

    #[test]
    fn same_language_replaces_in_place() -> Result<(), EngineError> {
        let mut engines = Engines::new(BlockDocument::default(), TextBuffer::default());
        engines.load(Content::Plain {
            text: "one",
            language: Language::Rust,
        })?;
        let created = engines.plain().generation();

        engines.load(Content::Plain {
            text: "two",
            language: Language::Rust,
        })?;
        assert_eq!(engines.plain().generation(), created);
        assert!(engines.plain().can_undo());

        engines.load(Content::Plain {
            text: "three",
            language: Language::Python,
        })?;
        assert_ne!(engines.plain().generation(), created);
        assert!(!engines.plain().can_undo());
        Ok(())
    }
}
