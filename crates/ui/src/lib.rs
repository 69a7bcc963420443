//! Terminal front end for the math solver.

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Context as _;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, Gauge, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};
use ratatui_image::Image as ImageWidget;
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol as ImageProtocol;
use solver_application::{
    Applied, Badge, ImageSelection, ResultView, Session, StepsView, SubmitRejected, load_image,
};
use solver_core::{Level, Mode, SettlementPolicy, ValidationError};
use tracing::{debug, warn};
use unicode_width::UnicodeWidthStr;

mod document;
mod preview;

const ACCENT: Color = Color::Yellow;
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiExit {
    Quit,
    /// The API URL changed; the caller rebuilds the client and runs again.
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Input,
    Steps,
}

pub struct Ui {
    session: Session,
    health: String,
    mode: Mode,
    focus: Focus,
    question: String,
    image_path: String,
    loaded_path: Option<String>,
    selection: ImageSelection<ImageProtocol>,
    notice: Option<String>,
    step_cursor: usize,
    settings_panel: SettingsPanel,
    image_picker: Picker,
    picker_ready: bool,
    spinner: usize,
}

impl Ui {
    pub fn new(session: Session, health: impl Into<String>) -> Self {
        Self {
            session,
            health: health.into(),
            mode: Mode::Text,
            focus: Focus::Input,
            question: String::new(),
            image_path: String::new(),
            loaded_path: None,
            selection: ImageSelection::new(),
            notice: None,
            step_cursor: 0,
            settings_panel: SettingsPanel::default(),
            image_picker: Picker::halfblocks(),
            picker_ready: false,
            spinner: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn set_health(&mut self, health: impl Into<String>) {
        self.health = health.into();
    }

    pub fn run(&mut self) -> anyhow::Result<UiExit> {
        let mut terminal = setup_terminal()?;
        if !self.picker_ready {
            self.image_picker = preview::detect_picker();
            self.picker_ready = true;
        }
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(exit)), Ok(())) => Ok(exit),
            (Ok(Ok(_)), Err(err)) => Err(err),
            (Ok(Err(err)), _) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<UiExit> {
        let tick_rate = Duration::from_millis(120);
        let mut needs_redraw = true;

        loop {
            if self.apply_settlements() {
                needs_redraw = true;
            }
            if self.is_busy() {
                self.spinner = self.spinner.wrapping_add(1);
                needs_redraw = true;
            }

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }

                    needs_redraw = true;

                    let exit = if self.settings_panel.open {
                        self.handle_settings_panel_key(key)?
                    } else {
                        self.handle_main_key(key)?
                    };
                    if let Some(exit) = exit {
                        return Ok(exit);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_settlements(&mut self) -> bool {
        let applied = self.session.poll();
        for outcome in &applied {
            if let Applied::Result(mode) = outcome {
                debug!(%mode, "result replaced");
                self.step_cursor = 0;
                if self.session.steps().is_none() {
                    self.focus = Focus::Input;
                }
            }
        }
        !applied.is_empty()
    }

    fn is_busy(&self) -> bool {
        self.session.controller.is_submitting(Mode::Text)
            || self.session.controller.is_submitting(Mode::Image)
    }

    fn spinner_char(&self) -> char {
        SPINNER[self.spinner % SPINNER.len()]
    }

    fn active_input_mut(&mut self) -> &mut String {
        match self.mode {
            Mode::Text => &mut self.question,
            Mode::Image => &mut self.image_path,
        }
    }

    fn handle_main_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
                KeyCode::Char('u') => self.active_input_mut().clear(),
                KeyCode::Char('l') if self.mode == Mode::Image => {
                    self.load_selected_image();
                }
                KeyCode::Char('x') if self.mode == Mode::Image => {
                    self.selection.clear();
                    self.loaded_path = None;
                }
                _ => {}
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::F(2) => {
                self.settings_panel.open(&self.session.settings.api_base_url);
            }
            KeyCode::Tab => {
                self.mode = match self.mode {
                    Mode::Text => Mode::Image,
                    Mode::Image => Mode::Text,
                };
                self.focus = Focus::Input;
            }
            KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Input if self.session.steps().is_some() => Focus::Steps,
                    _ => Focus::Input,
                };
            }
            KeyCode::Esc => {
                if self.session.controller.error().is_some() {
                    self.session.controller.dismiss_error();
                } else if self.notice.is_some() {
                    self.notice = None;
                } else {
                    self.focus = Focus::Input;
                }
            }
            _ if self.focus == Focus::Steps => self.handle_steps_key(key),
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.active_input_mut().pop();
            }
            KeyCode::Down => {
                if self.session.steps().is_some() {
                    self.focus = Focus::Steps;
                }
            }
            KeyCode::Char(ch) => self.active_input_mut().push(ch),
            _ => {}
        }
        Ok(None)
    }

    fn handle_steps_key(&mut self, key: KeyEvent) {
        let cursor = self.step_cursor;
        let Some(steps) = self.session.steps_mut() else {
            self.focus = Focus::Input;
            return;
        };
        match key.code {
            KeyCode::Up => {
                if cursor == 0 {
                    self.focus = Focus::Input;
                } else {
                    self.step_cursor = cursor - 1;
                }
            }
            KeyCode::Down => {
                self.step_cursor = (cursor + 1).min(steps.len().saturating_sub(1));
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                steps.toggle(cursor);
            }
            KeyCode::Char('e') => steps.expand_all(),
            KeyCode::Char('c') => steps.collapse_all(),
            _ => {}
        }
    }

    fn submit(&mut self) {
        self.notice = None;
        let result = match self.mode {
            Mode::Text => self.session.submit_text(&self.question),
            Mode::Image => {
                if self.image_path_pending() && !self.load_selected_image() {
                    return;
                }
                self.session.submit_image(self.selection.input())
            }
        };
        match result {
            Ok(_) => debug!(mode = %self.mode, "submission dispatched"),
            Err(SubmitRejected::Busy(mode)) => {
                self.notice = Some(format!("A {mode} solve is already running."));
            }
            Err(SubmitRejected::Invalid(err)) => debug!(%err, "submission rejected"),
        }
    }

    fn image_path_pending(&self) -> bool {
        let path = self.image_path.trim();
        self.loaded_path.as_deref() != Some(path)
    }

    /// Selects the file named in the path box. Returns false when it could not be read.
    fn load_selected_image(&mut self) -> bool {
        let path = self.image_path.trim().to_string();
        if path.is_empty() {
            self.selection.clear();
            self.loaded_path = None;
            return true;
        }
        match load_image(&path) {
            Ok(input) => {
                let preview = preview::build_preview(&self.image_picker, &input);
                self.selection.select(input, preview);
                self.loaded_path = Some(path);
                true
            }
            Err(err) => {
                warn!(path = %path, error = %format!("{err:#}"), "image load failed");
                self.notice = Some(match err.downcast_ref::<ValidationError>() {
                    Some(invalid) => invalid.to_string(),
                    None => format!("Could not read {path}."),
                });
                false
            }
        }
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(area);

        let title = Paragraph::new(Text::from(self.header_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(title, layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(layout[1]);

        match self.mode {
            Mode::Text => self.draw_question(frame, body[0]),
            Mode::Image => self.draw_image_input(frame, body[0]),
        }

        let view = self.session.result_view();
        let panel = ResultPanel {
            view: view.as_ref(),
            steps: self.session.steps(),
            cursor: (self.focus == Focus::Steps).then_some(self.step_cursor),
            spinner: self.is_busy().then(|| self.spinner_char()),
        };
        draw_result_panel(frame, body[1], &panel);

        let footer = Paragraph::new(Text::from(self.footer_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);

        if self.settings_panel.open {
            self.draw_settings_panel(area, frame);
        }
    }

    fn header_lines(&self) -> Vec<Line<'static>> {
        let settings = &self.session.settings;
        vec![
            Line::from(vec![
                Span::styled("Math Solver", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("   "),
                option_chip("Text", self.mode == Mode::Text, false),
                Span::raw(" "),
                option_chip("Image", self.mode == Mode::Image, false),
            ]),
            Line::from(vec![
                Span::styled("service: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!("{} ({})", settings.api_base_url, self.health)),
                Span::styled("  level: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(settings.level.to_string()),
            ]),
        ]
    }

    fn footer_lines(&self) -> Vec<Line<'static>> {
        if let Some(error) = self.session.controller.error() {
            return vec![Line::from(vec![
                Span::styled(
                    error.to_string(),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ),
                Span::styled("  (Esc to dismiss)", Style::default().fg(Color::DarkGray)),
            ])];
        }
        if let Some(notice) = &self.notice {
            return vec![Line::styled(notice.clone(), Style::default().fg(ACCENT))];
        }

        let key = |k: &'static str| Span::styled(k, Style::default().add_modifier(Modifier::BOLD));
        let mut spans = vec![
            key("Enter"),
            Span::raw(" solve  "),
            key("Tab"),
            Span::raw(" mode  "),
            key("Shift-Tab"),
            Span::raw(" steps  "),
        ];
        if self.focus == Focus::Steps {
            spans.extend([
                key("Space"),
                Span::raw(" toggle  "),
                key("e/c"),
                Span::raw(" expand/collapse all  "),
            ]);
        } else if self.mode == Mode::Image {
            spans.extend([key("^L"), Span::raw(" load  "), key("^X"), Span::raw(" clear  ")]);
        }
        spans.extend([key("F2"), Span::raw(" settings  "), key("^Q"), Span::raw(" quit")]);
        vec![Line::from(spans)]
    }

    fn input_block(&self, title: &'static str) -> Block<'static> {
        let style = if self.focus == Focus::Input {
            Style::default().fg(ACCENT)
        } else {
            Style::default()
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(style)
            .title(Span::styled(title, Style::default().add_modifier(Modifier::BOLD)))
    }

    fn input_text(&self, value: &str, width: u16) -> Vec<Line<'static>> {
        let mut lines = wrap_text(value, width.saturating_sub(1) as usize)
            .into_iter()
            .map(Line::raw)
            .collect::<Vec<_>>();
        if self.focus == Focus::Input
            && let Some(last) = lines.last_mut()
        {
            last.push_span(Span::styled("▏", Style::default().fg(ACCENT)));
        }
        lines
    }

    fn draw_question(&self, frame: &mut ratatui::Frame, area: Rect) {
        let block = self.input_block("Question");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner);

        let text = if self.question.is_empty() && self.focus != Focus::Input {
            vec![Line::styled(
                "Type a math question, e.g. Solve (x-1)/2 = 1",
                Style::default().fg(Color::DarkGray),
            )]
        } else {
            self.input_text(&self.question, sections[0].width)
        };
        frame.render_widget(Paragraph::new(Text::from(text)), sections[0]);
        frame.render_widget(self.mode_status(Mode::Text), sections[1]);
    }

    fn draw_image_input(&self, frame: &mut ratatui::Frame, area: Rect) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        let block = self.input_block("Image path");
        let inner = block.inner(layout[0]);
        frame.render_widget(block, layout[0]);
        let path = self.input_text(&self.image_path, inner.width);
        frame.render_widget(Paragraph::new(Text::from(path)), inner);

        let title = format!("Preview ({})", preview::protocol_label(&self.image_picker));
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner = block.inner(layout[1]);
        frame.render_widget(block, layout[1]);

        match (self.selection.input(), self.selection.preview()) {
            (_, Some(protocol)) => {
                let proto_area = protocol.area();
                let draw_width = proto_area.width.min(inner.width);
                let draw_height = proto_area.height.min(inner.height);
                let draw_area = Rect::new(
                    inner.x + inner.width.saturating_sub(draw_width) / 2,
                    inner.y + inner.height.saturating_sub(draw_height) / 2,
                    draw_width,
                    draw_height,
                );
                frame.render_widget(ImageWidget::new(protocol), draw_area);
            }
            (Some(input), None) => {
                let text = format!(
                    "{} ({}, {})\nno preview available",
                    input.file_name(),
                    input.mime_type(),
                    format_bytes(input.len() as u64)
                );
                frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
            }
            (None, None) => {
                let hint = Paragraph::new("No image selected. Type a path and press Ctrl-L.")
                    .style(Style::default().fg(Color::DarkGray))
                    .wrap(Wrap { trim: true });
                frame.render_widget(hint, inner);
            }
        }

        frame.render_widget(self.mode_status(Mode::Image), layout[2]);
    }

    fn mode_status(&self, mode: Mode) -> Paragraph<'static> {
        if self.session.controller.is_submitting(mode) {
            Paragraph::new(Line::styled(
                format!("{} Solving...", self.spinner_char()),
                Style::default().fg(ACCENT),
            ))
        } else {
            Paragraph::new(Line::default())
        }
    }

    fn handle_settings_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if self.settings_panel.editing_url {
            match key.code {
                KeyCode::Esc => self.settings_panel.editing_url = false,
                KeyCode::Enter => {
                    self.session.settings.api_base_url = self.settings_panel.url_input.clone();
                    self.session.sync_settings();
                    self.settings_panel.editing_url = false;
                }
                KeyCode::Backspace => {
                    self.settings_panel.url_input.pop();
                }
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.settings_panel.url_input.clear();
                }
                KeyCode::Char(ch) => self.settings_panel.url_input.push(ch),
                _ => {}
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Esc | KeyCode::F(2) => {
                self.settings_panel.open = false;
                if self.session.settings.api_base_url != self.settings_panel.original_url {
                    return Ok(Some(UiExit::Reconnect));
                }
            }
            KeyCode::Up => {
                self.settings_panel.selected = self.settings_panel.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                self.settings_panel.selected = (self.settings_panel.selected + 1)
                    .min(SETTINGS_MENU_ITEM_COUNT.saturating_sub(1));
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Enter => {
                match self.settings_panel.selected {
                    SETTINGS_MENU_LEVEL => self.session.settings.cycle_level(),
                    SETTINGS_MENU_POLICY => self.session.settings.cycle_settlement_policy(),
                    SETTINGS_MENU_API_URL if key.code == KeyCode::Enter => {
                        self.settings_panel.url_input = self.session.settings.api_base_url.clone();
                        self.settings_panel.editing_url = true;
                    }
                    _ => {}
                }
                self.session.sync_settings();
            }
            _ => {}
        }
        Ok(None)
    }

    fn draw_settings_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(60, 40, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Settings",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);

        let inner = block.inner(popup_area);
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(inner);

        let highlight_style = Style::default()
            .fg(Color::Black)
            .bg(ACCENT)
            .add_modifier(Modifier::BOLD);

        let settings = &self.session.settings;
        let label = |text: &'static str| Span::styled(text, Style::default().add_modifier(Modifier::BOLD));

        let level_row = self.settings_panel.selected == SETTINGS_MENU_LEVEL;
        let mut level_spans = vec![label("Level: ")];
        for level in [
            Level::Auto,
            Level::Beginner,
            Level::Intermediate,
            Level::Advanced,
        ] {
            level_spans.push(option_chip(level.as_str(), settings.level == level, level_row));
            level_spans.push(Span::raw(" "));
        }

        let policy_row = self.settings_panel.selected == SETTINGS_MENU_POLICY;
        let policy_spans = vec![
            label("Result race: "),
            option_chip(
                "latest issued",
                settings.settlement_policy == SettlementPolicy::LatestIssued,
                policy_row,
            ),
            Span::raw(" "),
            option_chip(
                "last settled",
                settings.settlement_policy == SettlementPolicy::LastSettled,
                policy_row,
            ),
        ];

        let url = if self.settings_panel.editing_url {
            format!("{}▏", self.settings_panel.url_input)
        } else {
            settings.api_base_url.clone()
        };
        let items = vec![
            ListItem::new(Line::from(level_spans)),
            ListItem::new(Line::from(policy_spans)),
            ListItem::new(Line::from(vec![label("API URL: "), Span::raw(url)])),
        ];

        let list = List::new(items)
            .highlight_style(highlight_style)
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always)
            .block(Block::default());

        let mut state = ListState::default();
        state.select(Some(
            self.settings_panel
                .selected
                .min(SETTINGS_MENU_ITEM_COUNT.saturating_sub(1)),
        ));
        frame.render_stateful_widget(list, sections[0], &mut state);

        let help_lines = vec![Line::from(vec![
            Span::styled("↑/↓", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" select  "),
            Span::styled("←/→", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cycle  "),
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" edit  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" close"),
        ])];
        let help = Paragraph::new(Text::from(help_lines))
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Left);
        frame.render_widget(help, sections[1]);
    }
}

#[derive(Debug, Default)]
struct SettingsPanel {
    open: bool,
    selected: usize,
    editing_url: bool,
    url_input: String,
    original_url: String,
}

impl SettingsPanel {
    fn open(&mut self, api_base_url: &str) {
        self.open = true;
        self.selected = 0;
        self.editing_url = false;
        self.original_url = api_base_url.to_string();
    }
}

const SETTINGS_MENU_LEVEL: usize = 0;
const SETTINGS_MENU_POLICY: usize = 1;
const SETTINGS_MENU_API_URL: usize = 2;
const SETTINGS_MENU_ITEM_COUNT: usize = 3;

/// What the result side of the screen shows.
struct ResultPanel<'a> {
    view: Option<&'a ResultView>,
    steps: Option<&'a StepsView>,
    /// Highlighted step when the step list has focus.
    cursor: Option<usize>,
    spinner: Option<char>,
}

fn draw_result_panel(frame: &mut ratatui::Frame, area: Rect, panel: &ResultPanel<'_>) {
    let title = match panel.spinner {
        Some(ch) => format!("Result {ch}"),
        None => "Result".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(Span::styled(
        title,
        Style::default().add_modifier(Modifier::BOLD),
    ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(view) = panel.view else {
        let empty = Paragraph::new("Submit a question or an image to see its solution.")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(empty, inner);
        return;
    };

    let summary = summary_lines(view, inner.width as usize);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(summary.len() as u16),
            Constraint::Length(u16::from(view.confidence.is_some())),
            Constraint::Min(0),
        ])
        .split(inner);

    frame.render_widget(Paragraph::new(Text::from(summary)), layout[0]);

    if let Some(bar) = view.confidence {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Green).bg(Color::DarkGray))
            .ratio(bar.ratio())
            .label(format!("Confidence {}", bar.label()));
        frame.render_widget(gauge, layout[1]);
    }

    if let Some(steps) = panel.steps {
        let block = Block::default()
            .borders(Borders::TOP)
            .title(format!("Steps ({})", steps.len()));
        let steps_area = block.inner(layout[2]);
        frame.render_widget(block, layout[2]);

        let (lines, cursor_line) = steps_lines(steps, panel.cursor, steps_area.width as usize);
        let height = steps_area.height as usize;
        let scroll = match cursor_line {
            Some(line) if line >= height => line.saturating_sub(height / 2),
            _ => 0,
        };
        frame.render_widget(
            Paragraph::new(Text::from(lines)).scroll((scroll as u16, 0)),
            steps_area,
        );
    }
}

fn result_lines(view: &ResultView) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let badge = match view.badge {
        Badge::Verified => Span::styled(
            format!("✔ {}", view.badge.label()),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Badge::Unverified => Span::styled(
            view.badge.label(),
            Style::default().fg(Color::DarkGray),
        ),
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(view.title, bold.fg(ACCENT)),
            Span::raw("  "),
            badge,
        ]),
        Line::from(vec![
            Span::styled("Final Answer: ", bold),
            Span::styled(view.final_answer.clone(), bold),
        ]),
    ];
    let mut field = |label: &'static str, value: &Option<String>| {
        if let Some(value) = value {
            lines.push(Line::from(vec![
                Span::styled(label, Style::default().fg(Color::Gray)),
                Span::raw(value.clone()),
            ]));
        }
    };
    field("Model: ", &view.model);
    field("Difficulty: ", &view.difficulty);
    field("OCR Hint: ", &view.ocr_hint);
    lines
}

/// [`result_lines`] wrapped to `width`, so the summary area can be sized exactly.
fn summary_lines(view: &ResultView, width: usize) -> Vec<Line<'static>> {
    result_lines(view)
        .iter()
        .flat_map(|line| {
            let pieces = line
                .spans
                .iter()
                .map(|span| (span.content.as_ref(), span.style))
                .collect::<Vec<_>>();
            document::wrap_styled("", &pieces, width)
        })
        .collect()
}

/// Lines for every step header plus the bodies of expanded steps, and the
/// line index of the highlighted header.
fn steps_lines(
    steps: &StepsView,
    cursor: Option<usize>,
    width: usize,
) -> (Vec<Line<'static>>, Option<usize>) {
    let mut lines = Vec::new();
    let mut cursor_line = None;
    for (idx, section) in steps.sections().iter().enumerate() {
        let marker = if section.expanded { "▾ " } else { "▸ " };
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if cursor == Some(idx) {
            style = style.add_modifier(Modifier::REVERSED);
            cursor_line = Some(lines.len());
        }
        lines.push(Line::from(vec![
            Span::raw(marker),
            Span::styled(section.header.clone(), style),
        ]));
        if section.expanded {
            for line in document::document_lines(&section.body, width.saturating_sub(2), ACCENT) {
                let mut spans = vec![Span::raw("  ")];
                spans.extend(line.spans);
                lines.push(Line::from(spans));
            }
        }
    }
    (lines, cursor_line)
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Wraps free text for an input box. Explicit newlines are not expected here.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;
    for ch in text.chars() {
        let mut buf = [0u8; 4];
        let w = UnicodeWidthStr::width(&*ch.encode_utf8(&mut buf));
        if current_width + w > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += w;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn option_chip(label: &str, selected: bool, row_selected: bool) -> Span<'static> {
    let base = if selected && row_selected {
        Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD)
    } else if selected {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };

    Span::styled(label.to_string(), base)
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use ratatui::buffer::Buffer;
    use solver_core::{SolveResponse, Step};
    use solver_engine::MarkdownEngine;

    use super::*;

    fn buffer_text(buffer: &Buffer) -> String {
        let area = buffer.area;
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn scenario() -> SolveResponse {
        SolveResponse {
            final_answer: "x=3".to_string(),
            steps: vec![Step {
                title: "Isolate x".to_string(),
                explanation: "Multiply both sides by $2$ then add $1$".to_string(),
            }],
            verified: true,
            latex: None,
            level: None,
            confidence: Some(0.92),
            difficulty: Some(2.0),
            model: None,
        }
    }

    fn render(panel: &ResultPanel<'_>, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal
            .draw(|frame| draw_result_panel(frame, frame.area(), panel))
            .unwrap();
        buffer_text(terminal.backend().buffer())
    }

    #[test]
    fn result_panel_shows_answer_badge_confidence_and_steps() {
        let response = scenario();
        let view = ResultView::project("Text Solution", &response, None);
        let steps = StepsView::project(&response.steps, &MarkdownEngine::new()).unwrap();
        let panel = ResultPanel {
            view: Some(&view),
            steps: Some(&steps),
            cursor: None,
            spinner: None,
        };
        let screen = render(&panel, 60, 14);
        assert!(screen.contains("Text Solution"));
        assert!(screen.contains("Verified"));
        assert!(screen.contains("Final Answer: x=3"));
        assert!(screen.contains("Difficulty: 2"));
        assert!(screen.contains("Confidence 92%"));
        assert!(screen.contains("Steps (1)"));
        assert!(screen.contains("Isolate x"));
        assert!(!screen.contains("Multiply"));
    }

    #[test]
    fn expanded_step_shows_its_body() {
        let response = scenario();
        let view = ResultView::project("Text Solution", &response, None);
        let mut steps = StepsView::project(&response.steps, &MarkdownEngine::new()).unwrap();
        steps.toggle(0);
        let panel = ResultPanel {
            view: Some(&view),
            steps: Some(&steps),
            cursor: Some(0),
            spinner: Some('|'),
        };
        let screen = render(&panel, 60, 14);
        assert!(screen.contains("Result |"));
        assert!(screen.contains("Multiply both sides by 2 then add 1"));
    }

    #[test]
    fn long_final_answer_wraps_instead_of_being_cut() {
        let mut response = scenario();
        response.final_answer = (1..=8)
            .map(|n| format!("x = {n}"))
            .collect::<Vec<_>>()
            .join(" or ")
            + " or LASTROOT";
        response.model = Some(solver_core::ModelInfo {
            provider: "google_genai".to_string(),
            name: "gemini-flash-long-name".to_string(),
        });
        let view = ResultView::project("Text Solution", &response, None);
        let panel = ResultPanel {
            view: Some(&view),
            steps: None,
            cursor: None,
            spinner: None,
        };
        let screen = render(&panel, 40, 20);
        assert!(screen.contains("LASTROOT"));
        assert!(screen.contains("long-name"));
        assert!(screen.contains("Confidence 92%"));
    }

    #[test]
    fn summary_lines_fit_the_panel_width() {
        let mut response = scenario();
        response.final_answer = "y".repeat(50);
        response.difficulty = None;
        let view = ResultView::project("Text Solution", &response, None);
        let lines = summary_lines(&view, 20);
        assert!(lines.iter().all(|line| line.width() <= 20));
        let answer: String = lines
            .iter()
            .flat_map(|l| l.spans.iter().map(|s| s.content.to_string()))
            .collect();
        assert_eq!(answer.matches('y').count(), 50);
    }

    #[test]
    fn absent_fields_are_not_drawn() {
        let mut response = scenario();
        response.confidence = None;
        response.difficulty = None;
        response.verified = false;
        let view = ResultView::project("Text Solution", &response, None);
        let panel = ResultPanel {
            view: Some(&view),
            steps: None,
            cursor: None,
            spinner: None,
        };
        let screen = render(&panel, 60, 10);
        assert!(screen.contains("Unverified"));
        assert!(!screen.contains("Confidence"));
        assert!(!screen.contains("Difficulty"));
        assert!(!screen.contains("Steps"));
    }

    #[test]
    fn empty_panel_prompts_for_input() {
        let panel = ResultPanel {
            view: None,
            steps: None,
            cursor: None,
            spinner: None,
        };
        let screen = render(&panel, 70, 6);
        assert!(screen.contains("Submit a question"));
    }

    #[test]
    fn image_result_shows_ocr_hint() {
        let response = scenario();
        let view = ResultView::project("Image Solution", &response, Some("(x-1)/2 = 1"));
        let lines = result_lines(&view);
        let text: Vec<String> = lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert!(text.contains(&"OCR Hint: (x-1)/2 = 1".to_string()));
    }

    #[test]
    fn steps_lines_track_cursor_header() {
        let steps = vec![
            Step {
                title: "One".to_string(),
                explanation: "a".to_string(),
            },
            Step {
                title: "Two".to_string(),
                explanation: "b".to_string(),
            },
        ];
        let mut view = StepsView::project(&steps, &MarkdownEngine::new()).unwrap();
        view.toggle(0);
        let (lines, cursor_line) = steps_lines(&view, Some(1), 40);
        assert_eq!(lines.len(), 3);
        assert_eq!(cursor_line, Some(2));
    }

    #[test]
    fn wrap_text_breaks_long_input() {
        assert_eq!(wrap_text("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap_text("", 4), vec![""]);
    }

    #[test]
    fn format_bytes_scales() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
