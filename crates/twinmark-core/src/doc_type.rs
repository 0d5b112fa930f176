use std::path::Path;

/// Which content engine owns a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Markdown held as a block tree, with a frontmatter header.
    #[default]
    StructuredText,
    /// A flat text buffer (source code and everything else).
    PlainText,
}

impl Mode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::StructuredText => "structured",
            Self::PlainText => "plain",
        }
    }
}

/// Highlighting language for plain-text documents. Switching language
/// re-creates the plain-text engine rather than replacing its content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Language {
    Json,
    Yaml,
    Xml,
    JavaScript,
    TypeScript,
    Python,
    Css,
    Html,
    Rust,
    Cpp,
    Go,
    Sql,
    Shell,
    Markdown,
    #[default]
    Plain,
}

impl Language {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Xml => "xml",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Css => "css",
            Self::Html => "html",
            Self::Rust => "rust",
            Self::Cpp => "cpp",
            Self::Go => "go",
            Self::Sql => "sql",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Plain => "plain",
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn classify(path: &Path) -> Mode {
    match extension(path).as_deref() {
        Some("md" | "markdown") => Mode::StructuredText,
        _ => Mode::PlainText,
    }
}

pub fn language_for(path: &Path) -> Language {
    let Some(ext) = extension(path) else {
        return Language::Plain;
    };
    match ext.as_str() {
        "json" => Language::Json,
        "yaml" | "yml" => Language::Yaml,
        "xml" => Language::Xml,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "ts" | "tsx" => Language::TypeScript,
        "py" | "pyw" => Language::Python,
        "css" | "scss" | "less" => Language::Css,
        "html" | "htm" | "vue" | "svelte" => Language::Html,
        "rs" => Language::Rust,
        "c" | "h" | "cpp" | "hpp" | "cc" | "cxx" => Language::Cpp,
        "go" => Language::Go,
        "sql" => Language::Sql,
        "sh" | "bash" | "zsh" => Language::Shell,
        "md" | "markdown" => Language::Markdown,
        _ => Language::Plain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_extension() {
        for (path, mode) in [
            ("notes.md", Mode::StructuredText),
            ("/a/b/README.MARKDOWN", Mode::StructuredText),
            ("Notes.Md", Mode::StructuredText),
            ("main.rs", Mode::PlainText),
            ("Makefile", Mode::PlainText),
            ("archive.md.bak", Mode::PlainText),
            ("", Mode::PlainText),
        ] {
            assert_eq!(classify(Path::new(path)), mode, "{path}");
        }
    }

    #[test]
    fn language_by_extension() {
        for (path, language) in [
            ("config.YML", Language::Yaml),
            ("app.tsx", Language::TypeScript),
            ("build.sh", Language::Shell),
            ("lib.rs", Language::Rust),
            ("data.csv", Language::Plain),
            ("LICENSE", Language::Plain),
        ] {
            assert_eq!(language_for(Path::new(path)), language, "{path}");
        }
    }
}
