use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Create a `pulldown-cmark` parser with our default options enabled.
pub fn parser(source: &str) -> Parser<'_> {
    Parser::new_ext(source, options())
}

/// Flatten a markdown body to readable text: markup dropped, list items
/// keep a marker, table cells are joined with ` | `.
pub fn plain_text(source: &str) -> String {
    let mut out = String::new();
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut first_cell = true;

    for event in parser(source) {
        match event {
            Event::Start(Tag::List(start)) => lists.push(start),
            Event::Start(Tag::Item) => {
                end_line(&mut out);
                let depth = lists.len().saturating_sub(1);
                out.push_str(&"  ".repeat(depth));
                match lists.last_mut() {
                    Some(Some(n)) => {
                        out.push_str(&format!("{n}. "));
                        *n = n.saturating_add(1);
                    }
                    _ => out.push_str("- "),
                }
            }
            Event::Start(Tag::TableRow | Tag::TableHead) => first_cell = true,
            Event::Start(Tag::TableCell) => {
                if !first_cell {
                    out.push_str(" | ");
                }
                first_cell = false;
            }
            Event::TaskListMarker(checked) => out.push_str(if checked { "[x] " } else { "[ ] " }),
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => {
                end_line(&mut out);
                out.push_str("---\n");
            }
            Event::End(end) => match end {
                TagEnd::List(_) => {
                    let _ = lists.pop();
                    end_line(&mut out);
                }
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::BlockQuote(_)
                | TagEnd::CodeBlock
                | TagEnd::Item
                | TagEnd::TableHead
                | TagEnd::TableRow => end_line(&mut out),
                _ => {}
            },
            _ => {}
        }
    }

    out
}

fn end_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_and_lists() {
        let md = "# Title\n\nHello **world**.\n\n- a\n- [x] b\n\n3. c\n4. d\n";
        assert_eq!(
            plain_text(md),
            "Title\nHello world.\n- a\n- [x] b\n3. c\n4. d\n"
        );
    }

    #[test]
    fn nested_lists_indent() {
        assert_eq!(plain_text("- a\n  - b\n"), "- a\n  - b\n");
    }

    #[test]
    fn code_blocks_and_rules() {
        assert_eq!(plain_text("```rs\nlet x = 1;\n```\n"), "let x = 1;\n");
        assert_eq!(plain_text("a\n\n---\n\nb\n"), "a\n---\nb\n");
    }

    #[test]
    fn tables_join_cells() {
        let md = "| a | b |\n| - | - |\n| c | d |\n";
        assert_eq!(plain_text(md), "a | b\nc | d\n");
    }
}
