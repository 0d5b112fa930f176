//! A headless block-tree engine for markdown bodies.
//!
//! `decode` turns markdown into a flat list of blocks (quotes are bracketed
//! by start/end markers), `encode_lossy` writes markdown back. Link titles,
//! reference definitions, footnotes, loose-list spacing and the choice of
//! list/emphasis markers do not survive the trip.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Tag, TagEnd};

use crate::{engine::StructuredEngine, error::EngineError, markdown};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    QuoteStart,
    QuoteEnd,
    Heading {
        level: u8,
        spans: Vec<Span>,
    },
    Paragraph {
        spans: Vec<Span>,
    },
    ListItem {
        depth: usize,
        /// Item number for ordered lists.
        ordered: Option<u64>,
        task: Option<bool>,
        spans: Vec<Span>,
    },
    Code {
        language: Option<String>,
        code: String,
    },
    Html {
        raw: String,
    },
    Table {
        rows: Vec<TableRow>,
    },
    Rule,
}

impl Block {
    pub fn paragraph(text: &str) -> Self {
        Self::Paragraph {
            spans: vec![Span::plain(text)],
        }
    }

    pub fn heading(level: u8, text: &str) -> Self {
        Self::Heading {
            level: level.clamp(1, 6),
            spans: vec![Span::plain(text)],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    pub header: bool,
    pub cells: Vec<Vec<Span>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub strong: bool,
    pub emphasis: bool,
    pub code: bool,
    pub strikethrough: bool,
    pub link: Option<String>,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            style: SpanStyle::default(),
        }
    }
}

/// The block tree currently being edited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockDocument {
    blocks: Vec<Block>,
}

impl BlockDocument {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }
}

impl StructuredEngine for BlockDocument {
    type Tree = Vec<Block>;

    fn decode(&mut self, markdown: &str) -> Result<Self::Tree, EngineError> {
        Ok(parse(markdown))
    }

    fn replace(&mut self, tree: Self::Tree) {
        self.blocks = tree;
    }

    fn encode_lossy(&self) -> Result<String, EngineError> {
        Ok(encode(&self.blocks))
    }
}

#[derive(Clone, Copy, Debug)]
enum BlockKind {
    Heading(u8),
    Paragraph,
    ListItem { depth: usize, ordered: Option<u64> },
}

#[derive(Default)]
struct InlineState {
    strong: usize,
    emphasis: usize,
    strikethrough: usize,
    links: Vec<String>,
    image: Option<String>,
}

impl InlineState {
    fn style(&self) -> SpanStyle {
        SpanStyle {
            strong: self.strong > 0,
            emphasis: self.emphasis > 0,
            code: false,
            strikethrough: self.strikethrough > 0,
            link: self.links.last().cloned(),
            image: self.image.clone(),
        }
    }

    fn code_style(&self) -> SpanStyle {
        SpanStyle {
            code: true,
            link: self.links.last().cloned(),
            ..SpanStyle::default()
        }
    }
}

#[derive(Default)]
struct TableState {
    in_head: bool,
    rows: Vec<TableRow>,
    cells: Vec<Vec<Span>>,
    cell: Option<Vec<Span>>,
}

/// Parse a markdown body into blocks.
pub fn parse(source: &str) -> Vec<Block> {
    let mut blocks = Vec::<Block>::new();

    let mut kind: Option<BlockKind> = None;
    let mut spans = Vec::<Span>::new();
    let mut task_marker: Option<bool> = None;
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut inline = InlineState::default();

    let mut code: Option<(Option<String>, String)> = None;
    let mut html: Option<String> = None;
    let mut table: Option<TableState> = None;

    for event in markdown::parser(source) {
        match event {
            Event::Start(tag) => match tag {
                Tag::BlockQuote(_) => {
                    flush_item(&mut kind, &mut spans, &mut task_marker, &mut blocks);
                    blocks.push(Block::QuoteStart);
                }
                Tag::List(start) => {
                    flush_item(&mut kind, &mut spans, &mut task_marker, &mut blocks);
                    lists.push(start);
                }
                Tag::Item => {
                    let ordered = match lists.last_mut() {
                        Some(Some(next)) => {
                            let number = *next;
                            *next = next.saturating_add(1);
                            Some(number)
                        }
                        _ => None,
                    };
                    kind = Some(BlockKind::ListItem {
                        depth: lists.len(),
                        ordered,
                    });
                    spans.clear();
                    task_marker = None;
                }
                Tag::Paragraph => {
                    if kind.is_none() {
                        kind = Some(BlockKind::Paragraph);
                        spans.clear();
                    }
                }
                Tag::Heading { level, .. } => {
                    kind = Some(BlockKind::Heading(heading_level(level)));
                    spans.clear();
                }
                Tag::Emphasis => inline.emphasis = inline.emphasis.saturating_add(1),
                Tag::Strong => inline.strong = inline.strong.saturating_add(1),
                Tag::Strikethrough => {
                    inline.strikethrough = inline.strikethrough.saturating_add(1);
                }
                Tag::Link { dest_url, .. } => inline.links.push(dest_url.to_string()),
                Tag::Image { dest_url, .. } => inline.image = Some(dest_url.to_string()),
                Tag::CodeBlock(code_kind) => {
                    flush_item(&mut kind, &mut spans, &mut task_marker, &mut blocks);
                    let language = match code_kind {
                        CodeBlockKind::Fenced(lang) => {
                            let lang = lang.trim();
                            (!lang.is_empty()).then(|| lang.to_owned())
                        }
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((language, String::new()));
                }
                Tag::HtmlBlock => {
                    flush_item(&mut kind, &mut spans, &mut task_marker, &mut blocks);
                    html = Some(String::new());
                }
                Tag::Table(_) => table = Some(TableState::default()),
                Tag::TableHead => {
                    if let Some(table) = table.as_mut() {
                        table.in_head = true;
                    }
                }
                Tag::TableRow => {
                    if let Some(table) = table.as_mut() {
                        table.cells.clear();
                    }
                }
                Tag::TableCell => {
                    if let Some(table) = table.as_mut() {
                        table.cell = Some(Vec::new());
                    }
                }
                _ => {}
            },
            Event::End(end) => match end {
                TagEnd::BlockQuote(_) => blocks.push(Block::QuoteEnd),
                TagEnd::List(_) => {
                    let _ = lists.pop();
                }
                TagEnd::Item => flush_item(&mut kind, &mut spans, &mut task_marker, &mut blocks),
                TagEnd::Paragraph => {
                    if matches!(kind, Some(BlockKind::Paragraph)) {
                        kind = None;
                        blocks.push(Block::Paragraph {
                            spans: std::mem::take(&mut spans),
                        });
                    }
                }
                TagEnd::Heading(_) => {
                    if let Some(BlockKind::Heading(level)) = kind.take() {
                        blocks.push(Block::Heading {
                            level,
                            spans: std::mem::take(&mut spans),
                        });
                    }
                }
                TagEnd::Emphasis => inline.emphasis = inline.emphasis.saturating_sub(1),
                TagEnd::Strong => inline.strong = inline.strong.saturating_sub(1),
                TagEnd::Strikethrough => {
                    inline.strikethrough = inline.strikethrough.saturating_sub(1);
                }
                TagEnd::Link => {
                    let _ = inline.links.pop();
                }
                TagEnd::Image => inline.image = None,
                TagEnd::CodeBlock => {
                    if let Some((language, code)) = code.take() {
                        blocks.push(Block::Code { language, code });
                    }
                }
                TagEnd::HtmlBlock => {
                    if let Some(raw) = html.take() {
                        blocks.push(Block::Html { raw });
                    }
                }
                TagEnd::TableHead => {
                    // The header row has no TableRow wrapper.
                    if let Some(table) = table.as_mut() {
                        table.in_head = false;
                        let cells = std::mem::take(&mut table.cells);
                        table.rows.push(TableRow {
                            header: true,
                            cells,
                        });
                    }
                }
                TagEnd::TableRow => {
                    if let Some(table) = table.as_mut() {
                        let cells = std::mem::take(&mut table.cells);
                        table.rows.push(TableRow {
                            header: false,
                            cells,
                        });
                    }
                }
                TagEnd::TableCell => {
                    if let Some(table) = table.as_mut()
                        && let Some(cell) = table.cell.take()
                    {
                        table.cells.push(cell);
                    }
                }
                TagEnd::Table => {
                    if let Some(table) = table.take() {
                        blocks.push(Block::Table { rows: table.rows });
                    }
                }
                _ => {}
            },
            Event::TaskListMarker(checked) => task_marker = Some(checked),
            Event::Text(text) => {
                if let Some((_, body)) = code.as_mut() {
                    body.push_str(&text);
                } else {
                    let target = inline_target(&mut table, &mut spans);
                    push_span(target, &text, inline.style());
                }
            }
            Event::Code(text) => {
                let target = inline_target(&mut table, &mut spans);
                push_span(target, &text, inline.code_style());
            }
            Event::SoftBreak | Event::HardBreak => {
                let target = inline_target(&mut table, &mut spans);
                push_span(target, "\n", inline.style());
            }
            Event::Html(text) => {
                if let Some(raw) = html.as_mut() {
                    raw.push_str(&text);
                }
            }
            Event::InlineHtml(text) => {
                let target = inline_target(&mut table, &mut spans);
                push_span(target, &text, SpanStyle::default());
            }
            Event::Rule => {
                flush_item(&mut kind, &mut spans, &mut task_marker, &mut blocks);
                blocks.push(Block::Rule);
            }
            _ => {}
        }
    }

    blocks
}

/// Emit the pending list item, if any. Called when an item ends and when a
/// nested block starts inside it, so parent text is not lost.
fn flush_item(
    kind: &mut Option<BlockKind>,
    spans: &mut Vec<Span>,
    task: &mut Option<bool>,
    blocks: &mut Vec<Block>,
) {
    if let Some(BlockKind::ListItem { depth, ordered }) = *kind {
        *kind = None;
        blocks.push(Block::ListItem {
            depth,
            ordered,
            task: task.take(),
            spans: std::mem::take(spans),
        });
    }
}

fn inline_target<'a>(
    table: &'a mut Option<TableState>,
    spans: &'a mut Vec<Span>,
) -> &'a mut Vec<Span> {
    match table.as_mut().and_then(|table| table.cell.as_mut()) {
        Some(cell) => cell,
        None => spans,
    }
}

fn push_span(spans: &mut Vec<Span>, text: &str, style: SpanStyle) {
    if text.is_empty() {
        return;
    }

    match spans.last_mut() {
        Some(last) if last.style == style => last.text.push_str(text),
        _ => spans.push(Span {
            text: text.to_owned(),
            style,
        }),
    }
}

const fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

const LIST_INDENT: &str = "    ";

/// Write blocks back out as markdown.
pub fn encode(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    // Shallowest quote depth seen since the previous block; decides whether a
    // separator line stays inside the quote.
    let mut shared_depth = 0usize;
    let mut previous: Option<(&Block, usize)> = None;

    for block in blocks {
        match block {
            Block::QuoteStart => {
                depth += 1;
                continue;
            }
            Block::QuoteEnd => {
                depth = depth.saturating_sub(1);
                shared_depth = shared_depth.min(depth);
                continue;
            }
            _ => {}
        }

        let text = encode_block(block, previous.is_none());

        if let Some((prev, prev_depth)) = previous {
            let tight = prev_depth == depth
                && shared_depth == depth
                && same_list_kind(prev, block);
            if !tight {
                out.push_str(quote_prefix(shared_depth.min(depth)).trim_end());
                out.push('\n');
            }
        }

        let prefix = quote_prefix(depth);
        for line in text.split('\n') {
            if line.is_empty() {
                out.push_str(prefix.trim_end());
            } else {
                out.push_str(&prefix);
                out.push_str(line);
            }
            out.push('\n');
        }

        previous = Some((block, depth));
        shared_depth = depth;
    }

    out
}

/// Adjacent items only stay tight when a bullet never directly precedes a
/// number, which could otherwise read back as paragraph continuation.
const fn same_list_kind(prev: &Block, next: &Block) -> bool {
    match (prev, next) {
        (
            Block::ListItem { ordered: a, .. },
            Block::ListItem { ordered: b, .. },
        ) => a.is_some() == b.is_some(),
        _ => false,
    }
}

fn quote_prefix(depth: usize) -> String {
    "> ".repeat(depth)
}

fn encode_block(block: &Block, first: bool) -> String {
    match block {
        Block::Heading { level, spans } => {
            let text = encode_spans(spans).replace('\n', " ");
            let marks = "#".repeat(usize::from((*level).clamp(1, 6)));
            if text.is_empty() {
                marks
            } else {
                format!("{marks} {text}")
            }
        }
        Block::Paragraph { spans } => encode_spans(spans)
            .split('\n')
            .map(escape_line_start)
            .collect::<Vec<_>>()
            .join("\n"),
        Block::ListItem {
            depth,
            ordered,
            task,
            spans,
        } => {
            let indent = LIST_INDENT.repeat(depth.saturating_sub(1));
            let mut marker = ordered.map_or_else(|| "- ".to_owned(), |n| format!("{n}. "));
            let continuation = format!("{indent}{}", " ".repeat(marker.len()));
            match task {
                Some(true) => marker.push_str("[x] "),
                Some(false) => marker.push_str("[ ] "),
                None => {}
            }
            let text = encode_spans(spans);
            let mut lines = text.split('\n');
            let mut out = format!("{indent}{marker}{}", lines.next().unwrap_or_default());
            for line in lines {
                out.push('\n');
                out.push_str(&continuation);
                out.push_str(line);
            }
            out.trim_end().to_owned()
        }
        Block::Code { language, code } => {
            let fence = "`".repeat(longest_run(code, '`').max(2) + 1);
            let mut out = format!("{fence}{}\n", language.as_deref().unwrap_or_default());
            out.push_str(code);
            if !code.is_empty() && !code.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&fence);
            out
        }
        Block::Html { raw } => raw.trim_end_matches('\n').to_owned(),
        Block::Table { rows } => encode_table(rows),
        // A leading `---` would be read back as a frontmatter delimiter.
        Block::Rule if first => "***".to_owned(),
        Block::Rule => "---".to_owned(),
        Block::QuoteStart | Block::QuoteEnd => String::new(),
    }
}

fn encode_table(rows: &[TableRow]) -> String {
    let cols = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0).max(1);
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (idx, row) in rows.iter().enumerate() {
        let mut line = String::from("|");
        for col in 0..cols {
            let cell = row
                .cells
                .get(col)
                .map(|cell| encode_spans(cell).replace('\n', " ").replace('|', "\\|"))
                .unwrap_or_default();
            line.push(' ');
            line.push_str(&cell);
            line.push_str(" |");
        }
        lines.push(line);
        if idx == 0 {
            lines.push(format!("|{}", " --- |".repeat(cols)));
        }
    }
    lines.join("\n")
}

fn encode_spans(spans: &[Span]) -> String {
    spans.iter().map(encode_span).collect()
}

fn encode_span(span: &Span) -> String {
    let style = &span.style;
    if style.code {
        let code = code_span(&span.text);
        return match style.link.as_deref() {
            Some(url) => format!("[{code}]({})", link_destination(url)),
            None => code,
        };
    }

    let core = span.text.trim_matches(char::is_whitespace);
    if core.is_empty() {
        return span.text.clone();
    }
    let start = span.text.len() - span.text.trim_start_matches(char::is_whitespace).len();
    let lead = &span.text[..start];
    let trail = &span.text[start + core.len()..];

    let mut inner = escape_inline(core);
    if style.strikethrough {
        inner = format!("~~{inner}~~");
    }
    match (style.strong, style.emphasis) {
        (true, true) => inner = format!("***{inner}***"),
        (true, false) => inner = format!("**{inner}**"),
        (false, true) => inner = format!("*{inner}*"),
        (false, false) => {}
    }
    if let Some(url) = style.image.as_deref() {
        inner = format!("![{inner}]({})", link_destination(url));
    }
    if let Some(url) = style.link.as_deref() {
        inner = format!("[{inner}]({})", link_destination(url));
    }
    format!("{lead}{inner}{trail}")
}

fn code_span(text: &str) -> String {
    let run = longest_run(text, '`');
    if run == 0 {
        return format!("`{text}`");
    }
    let ticks = "`".repeat(run + 1);
    format!("{ticks} {text} {ticks}")
}

fn link_destination(url: &str) -> String {
    if url.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
        format!("<{url}>")
    } else {
        url.to_owned()
    }
}

fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for c in text.chars() {
        if c == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn escape_inline(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (idx, &c) in chars.iter().enumerate() {
        let escape = match c {
            '\\' | '*' | '`' | '[' | ']' | '~' => true,
            // Intraword underscores never open emphasis.
            '_' => {
                let before = idx.checked_sub(1).and_then(|i| chars.get(i));
                let after = chars.get(idx + 1);
                !(before.is_some_and(|c| c.is_alphanumeric())
                    && after.is_some_and(|c| c.is_alphanumeric()))
            }
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Keep paragraph lines from being read back as headings, quotes, lists or
/// setext underlines.
fn escape_line_start(line: &str) -> String {
    let Some(first) = line.chars().next() else {
        return String::new();
    };
    if matches!(first, '#' | '>' | '-' | '+' | '=') {
        return format!("\\{line}");
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && matches!(line.as_bytes().get(digits), Some(b'.' | b')')) {
        return format!("{}\\{}", &line[..digits], &line[digits..]);
    }
    line.to_owned()
}
