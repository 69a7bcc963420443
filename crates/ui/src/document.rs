//! Draws engine documents as wrapped ratatui lines.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use solver_engine::{Block, BlockKind, Document, SpanStyle};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const CODE_COLOR: Color = Color::Yellow;
const MATH_COLOR: Color = Color::Cyan;

pub(crate) fn document_lines(doc: &Document, width: usize, accent: Color) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, block) in doc.blocks.iter().enumerate() {
        if idx > 0 && matches!(block.kind, BlockKind::Heading(_)) {
            lines.push(Line::default());
        }
        lines.extend(block_lines(block, width, accent));
    }
    lines
}

fn block_lines(block: &Block, width: usize, accent: Color) -> Vec<Line<'static>> {
    let (prefix, base) = match &block.kind {
        BlockKind::Paragraph => (String::new(), Style::default()),
        BlockKind::Heading(level) => {
            let mut style = Style::default().fg(accent).add_modifier(Modifier::BOLD);
            if *level <= 1 {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            (String::new(), style)
        }
        BlockKind::ListItem { depth, marker } => {
            (format!("{}{marker} ", "  ".repeat(*depth)), Style::default())
        }
        BlockKind::Task { depth, checked } => {
            let mark = if *checked { "[x]" } else { "[ ]" };
            (format!("{}{mark} ", "  ".repeat(*depth)), Style::default())
        }
        BlockKind::Quote => (
            "│ ".to_string(),
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        ),
        BlockKind::Code => {
            return vec![Line::from(vec![
                Span::raw("  "),
                Span::styled(block.text(), Style::default().fg(CODE_COLOR)),
            ])];
        }
        BlockKind::Math => {
            return vec![Line::from(vec![
                Span::raw("    "),
                Span::styled(block.text(), Style::default().fg(MATH_COLOR)),
            ])];
        }
        BlockKind::TableRow { header } => {
            let style = if *header {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let spans = block
                .spans
                .iter()
                .map(|s| Span::styled(s.text.clone(), span_style(style, s.style)))
                .collect::<Vec<_>>();
            return vec![Line::from(spans)];
        }
        BlockKind::Rule => {
            return vec![Line::styled(
                "─".repeat(width.max(1)),
                Style::default().fg(Color::DarkGray),
            )];
        }
    };

    let pieces = block
        .spans
        .iter()
        .map(|s| (s.text.as_str(), span_style(base, s.style)))
        .collect::<Vec<_>>();
    wrap_styled(&prefix, &pieces, width)
}

fn span_style(base: Style, style: SpanStyle) -> Style {
    let mut out = base;
    if style.bold {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.italic {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.strikethrough {
        out = out.add_modifier(Modifier::CROSSED_OUT);
    }
    if style.link {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    if style.code {
        out = out.fg(CODE_COLOR);
    }
    if style.math {
        out = out.fg(MATH_COLOR);
    }
    out
}

struct Word<'a> {
    text: &'a str,
    style: Style,
    space_before: bool,
}

fn split_words<'a>(pieces: &[(&'a str, Style)]) -> Vec<Word<'a>> {
    let mut words = Vec::new();
    let mut pending_space = false;
    for (text, style) in pieces {
        let mut rest = *text;
        while !rest.is_empty() {
            let trimmed = rest.trim_start();
            if trimmed.len() != rest.len() {
                pending_space = true;
                rest = trimmed;
                continue;
            }
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            words.push(Word {
                text: &rest[..end],
                style: *style,
                space_before: pending_space,
            });
            pending_space = false;
            rest = &rest[end..];
        }
    }
    words
}

/// Cuts a word wider than `limit` columns into pieces that fit.
fn break_word<'a>(word: Word<'a>, limit: usize) -> Vec<Word<'a>> {
    if limit == 0 || UnicodeWidthStr::width(word.text) <= limit {
        return vec![word];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (idx, ch) in word.text.char_indices() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > limit && idx > start {
            pieces.push(&word.text[start..idx]);
            start = idx;
            used = 0;
        }
        used += w;
    }
    pieces.push(&word.text[start..]);
    pieces
        .into_iter()
        .enumerate()
        .map(|(n, text)| Word {
            text,
            style: word.style,
            space_before: n == 0 && word.space_before,
        })
        .collect()
}

/// Greedy word wrap across differently styled spans. Continuation lines are
/// indented to the width of `prefix`; words wider than a line are split.
pub(crate) fn wrap_styled(
    prefix: &str,
    pieces: &[(&str, Style)],
    width: usize,
) -> Vec<Line<'static>> {
    let indent = UnicodeWidthStr::width(prefix);
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = vec![Span::raw(prefix.to_string())];
    let mut used = indent;
    let mut has_words = false;
    let limit = width.saturating_sub(indent);

    let words = split_words(pieces)
        .into_iter()
        .flat_map(|word| break_word(word, limit));
    for word in words {
        let word_width = UnicodeWidthStr::width(word.text);
        let sep = usize::from(has_words && word.space_before);
        if has_words && width > 0 && used + sep + word_width > width {
            lines.push(Line::from(std::mem::take(&mut current)));
            current.push(Span::raw(" ".repeat(indent)));
            used = indent;
            has_words = false;
        }
        if has_words && word.space_before {
            current.push(Span::raw(" "));
            used += 1;
        }
        current.push(Span::styled(word.text.to_string(), word.style));
        used += word_width;
        has_words = true;
    }

    if has_words || lines.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}
