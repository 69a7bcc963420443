//! Markdown + math text engine.
//!
//! Turns explanation source (CommonMark with GFM tables, strikethrough, task
//! lists and `$...$` / `$$...$$` math) into a [`Document`] of styled blocks that
//! any view can draw. Raw HTML is never interpreted and control characters are
//! removed, so the output is safe to write to a terminal.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

mod math;

pub use math::latex_to_unicode;

const TABLE_CELL_SEPARATOR: &str = " │ ";
const TAB_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub math: bool,
    pub link: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    ListItem { depth: usize, marker: String },
    Task { depth: usize, checked: bool },
    Quote,
    Code,
    Math,
    TableRow { header: bool },
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub spans: Vec<Span>,
}

impl Block {
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match &block.kind {
                BlockKind::ListItem { depth, marker } => {
                    format!("{}{marker} {}", "  ".repeat(*depth), block.text())
                }
                BlockKind::Task { depth, checked } => {
                    let mark = if *checked { "[x]" } else { "[ ]" };
                    format!("{}{mark} {}", "  ".repeat(*depth), block.text())
                }
                BlockKind::Quote => format!("> {}", block.text()),
                BlockKind::Rule => "---".to_string(),
                _ => block.text(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarkdownEngine {
    options: Options,
}

impl Default for MarkdownEngine {
    fn default() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_MATH);
        Self { options }
    }
}

impl MarkdownEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, source: &str) -> Document {
        if source.trim().is_empty() {
            return Document::default();
        }

        let mut builder = DocumentBuilder::default();
        for event in Parser::new_ext(source, self.options) {
            builder.push_event(event);
        }
        builder.finish()
    }
}

#[derive(Debug, Default)]
struct DocumentBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    strong: usize,
    emphasis: usize,
    strike: usize,
    links: Vec<String>,
    in_code_block: bool,
    code_buffer: String,
    table_cell: usize,
}

impl DocumentBuilder {
    fn push_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    self.code_buffer.push_str(&text);
                } else {
                    self.push_text(&text, self.style());
                }
            }
            Event::Code(code) => {
                let style = SpanStyle {
                    code: true,
                    ..self.style()
                };
                self.push_text(&code, style);
            }
            Event::InlineMath(tex) => {
                let style = SpanStyle {
                    math: true,
                    ..self.style()
                };
                self.push_text(&latex_to_unicode(&tex), style);
            }
            Event::DisplayMath(tex) => {
                self.flush();
                self.blocks.push(Block {
                    kind: BlockKind::Math,
                    spans: vec![Span {
                        text: sanitize(&latex_to_unicode(&tex)),
                        style: SpanStyle {
                            math: true,
                            ..SpanStyle::default()
                        },
                    }],
                });
            }
            // shown verbatim, never interpreted
            Event::Html(html) | Event::InlineHtml(html) => {
                let text = html.trim_end_matches('\n');
                self.push_text(text, self.style());
            }
            Event::SoftBreak | Event::HardBreak => self.push_text(" ", self.style()),
            Event::Rule => {
                self.flush();
                self.blocks.push(Block {
                    kind: BlockKind::Rule,
                    spans: Vec::new(),
                });
            }
            Event::TaskListMarker(checked) => {
                let depth = self.lists.len().saturating_sub(1);
                let block = self.current.get_or_insert_with(|| Block {
                    kind: BlockKind::Paragraph,
                    spans: Vec::new(),
                });
                block.kind = BlockKind::Task { depth, checked };
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                let continues_item = self.current.as_ref().is_some_and(|b| {
                    matches!(b.kind, BlockKind::ListItem { .. } | BlockKind::Task { .. })
                        && b.spans.is_empty()
                });
                if !continues_item {
                    self.open(self.paragraph_kind());
                }
            }
            Tag::Heading { level, .. } => self.open(BlockKind::Heading(level as u8)),
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code_block = true;
                self.code_buffer.clear();
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}.");
                        *next += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                self.open(BlockKind::ListItem { depth, marker });
            }
            Tag::Table(_) => self.flush(),
            Tag::TableHead => {
                self.open(BlockKind::TableRow { header: true });
                self.table_cell = 0;
            }
            Tag::TableRow => {
                self.open(BlockKind::TableRow { header: false });
                self.table_cell = 0;
            }
            Tag::TableCell => {
                if self.table_cell > 0 {
                    self.push_text(TABLE_CELL_SEPARATOR, SpanStyle::default());
                }
                self.table_cell += 1;
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.links.push(dest_url.to_string()),
            Tag::Image { .. } => self.push_text("[image: ", self.style()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item => self.flush(),
            TagEnd::TableHead | TagEnd::TableRow => self.flush(),
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                let code = std::mem::take(&mut self.code_buffer);
                let style = SpanStyle {
                    code: true,
                    ..SpanStyle::default()
                };
                for line in code.trim_end_matches('\n').lines() {
                    self.blocks.push(Block {
                        kind: BlockKind::Code,
                        spans: vec![Span {
                            text: sanitize(line),
                            style,
                        }],
                    });
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.links.pop() {
                    let shown = self
                        .current
                        .as_ref()
                        .is_some_and(|b| b.spans.last().is_some_and(|s| s.text == url));
                    if !url.is_empty() && !shown {
                        self.push_text(&format!(" ({url})"), SpanStyle::default());
                    }
                }
            }
            TagEnd::Image => self.push_text("]", self.style()),
            _ => {}
        }
    }

    fn style(&self) -> SpanStyle {
        SpanStyle {
            bold: self.strong > 0,
            italic: self.emphasis > 0,
            strikethrough: self.strike > 0,
            code: false,
            math: false,
            link: !self.links.is_empty(),
        }
    }

    fn paragraph_kind(&self) -> BlockKind {
        if self.quote_depth > 0 {
            BlockKind::Quote
        } else {
            BlockKind::Paragraph
        }
    }

    fn open(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Block {
            kind,
            spans: Vec::new(),
        });
    }

    fn push_text(&mut self, text: &str, style: SpanStyle) {
        let text = sanitize(text);
        if text.is_empty() {
            return;
        }
        let kind = self.paragraph_kind();
        let block = self.current.get_or_insert_with(|| Block {
            kind,
            spans: Vec::new(),
        });
        match block.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(&text),
            _ => block.spans.push(Span { text, style }),
        }
    }

    fn flush(&mut self) {
        if let Some(mut block) = self.current.take() {
            if let Some(last) = block.spans.last_mut() {
                let trimmed = last.text.trim_end().len();
                last.text.truncate(trimmed);
            }
            block.spans.retain(|s| !s.text.is_empty());
            let keep = !block.spans.is_empty()
                || matches!(block.kind, BlockKind::ListItem { .. } | BlockKind::Task { .. });
            if keep {
                self.blocks.push(block);
            }
        }
    }

    fn finish(mut self) -> Document {
        self.flush();
        Document {
            blocks: self.blocks,
        }
    }
}

/// Drops terminal control characters (escape sequences included) and expands tabs.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\t' => out.push_str(&" ".repeat(TAB_WIDTH)),
            '\n' | '\r' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str) -> Document {
        MarkdownEngine::new().render(source)
    }

    #[test]
    fn empty_source_renders_empty_document() {
        assert!(render("").is_empty());
        assert!(render("  \n\n ").is_empty());
    }

    #[test]
    fn plain_equation_stays_verbatim() {
        let doc = render("x=2");
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(doc.plain_text(), "x=2");
    }

    #[test]
    fn inline_and_display_math_become_unicode() {
        let doc = render("Square both sides: $x^2 = 9$\n\n$$\\sqrt{9} = 3$$");
        assert_eq!(doc.blocks[0].text(), "Square both sides: x² = 9");
        assert!(doc.blocks[0].spans.iter().any(|s| s.style.math));
        let math = doc
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Math)
            .expect("display math block");
        assert_eq!(math.text(), "√9 = 3");
    }

    #[test]
    fn emphasis_and_strikethrough_are_styled() {
        let doc = render("**Multiply** by ~~3~~ 2");
        let spans = &doc.blocks[0].spans;
        assert_eq!(spans[0].text, "Multiply");
        assert!(spans[0].style.bold);
        assert!(spans.iter().any(|s| s.style.strikethrough && s.text == "3"));
    }

    #[test]
    fn tables_render_one_block_per_row() {
        let doc = render("| x | f(x) |\n|---|---|\n| 1 | 2 |\n| 2 | 4 |");
        let rows: Vec<_> = doc
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::TableRow { .. }))
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind, BlockKind::TableRow { header: true });
        assert_eq!(rows[0].text(), "x │ f(x)");
        assert_eq!(rows[2].text(), "2 │ 4");
    }

    #[test]
    fn task_lists_and_ordered_lists_keep_markers() {
        let doc = render("- [x] isolate x\n- [ ] check\n\n1. first\n2. second");
        assert_eq!(
            doc.blocks[0].kind,
            BlockKind::Task {
                depth: 0,
                checked: true
            }
        );
        assert_eq!(doc.blocks[0].text(), "isolate x");
        assert_eq!(
            doc.blocks[3].kind,
            BlockKind::ListItem {
                depth: 0,
                marker: "2.".to_string()
            }
        );
        assert_eq!(
            doc.plain_text(),
            "[x] isolate x\n[ ] check\n1. first\n2. second"
        );
    }

    #[test]
    fn html_is_shown_as_text_and_escapes_are_stripped() {
        let doc = render("<script>alert(1)</script>\n\nok \u{1b}[31mred");
        let text = doc.plain_text();
        assert!(text.contains("<script>alert(1)</script>"));
        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("ok [31mred"));
    }

    #[test]
    fn code_blocks_keep_lines() {
        let doc = render("```\na = 1\nb = 2\n```");
        assert_eq!(doc.blocks.len(), 2);
        assert!(doc.blocks.iter().all(|b| b.kind == BlockKind::Code));
        assert_eq!(doc.blocks[1].text(), "b = 2");
    }

    #[test]
    fn deeply_nested_math_renders_without_overflow() {
        let source = format!("Check ${}x$ again", r"\sqrt".repeat(200_000));
        let text = render(&source).plain_text();
        assert!(text.starts_with("Check √(√("));
        assert!(text.contains(r"\sqrt\sqrtx"));
        assert!(text.ends_with(") again"));
    }
}
