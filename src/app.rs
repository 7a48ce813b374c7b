use crate::api::Backend;
use crate::config::{self, Config};
use crate::minibuffer::{Minibuffer, Source};
use crate::site::{Overlay, Site, ViewLine};
use crate::store::Store;
use crate::theme::{ThemeManager, UiPalette};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthStr;

const MAX_COMPLETIONS: usize = 8;

pub fn run_app(
    mut config: Config,
    store: Box<dyn Store>,
    backend: Option<Arc<dyn Backend>>,
) -> Result<()> {
    let themes = ThemeManager::load();
    if !themes.contains(&config.theme) {
        tracing::warn!("Unknown theme {:?}, using {}", config.theme, themes.fallback_name());
        config.theme = themes.fallback_name().to_string();
        config::write_config(&config)?;
    }
    let styles = Styles::from_palette(themes.ui_palette(&config.theme));

    let mut site = Site::new(config, store, backend);

    let mut terminal = setup_terminal()?;
    let _guard = TerminalGuard;

    let tick_rate = Duration::from_millis(50);

    loop {
        let size = terminal.size()?;
        let layout = LayoutInfo::compute(&site, size);
        site.set_view_height(layout.content.height.saturating_sub(2) as usize);

        terminal.draw(|f| ui(f, &site, &styles, &layout))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    site.handle_key(key);
                }
            }
        }

        site.tick(Instant::now());
        if site.should_quit() {
            break;
        }
    }

    site.persist();
    Ok(())
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = stdout.execute(LeaveAlternateScreen);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

struct Styles {
    ui: UiPalette,
    base: Style,
    heading: Style,
    muted: Style,
    accent: Style,
    highlight: Style,
    mode_line: Style,
}

impl Styles {
    fn from_palette(ui: UiPalette) -> Self {
        let base = Style::default().fg(ui.base_fg).bg(bg_or_reset(ui.base_bg));
        let highlight_fg = ui.base_bg.unwrap_or(ui.base_fg);
        Self {
            ui,
            base,
            heading: Style::default().fg(ui.heading).add_modifier(Modifier::BOLD),
            muted: Style::default().fg(ui.muted),
            accent: Style::default().fg(ui.accent),
            highlight: Style::default().bg(ui.accent).fg(highlight_fg),
            mode_line: Style::default().fg(ui.base_fg).bg(ui.mode_line_bg),
        }
    }

    fn block<'a>(&self, title: impl Into<Line<'a>>) -> Block<'a> {
        Block::bordered()
            .title(title)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.ui.border))
            .style(self.base)
    }
}

struct LayoutInfo {
    sidebar: Option<Rect>,
    content: Rect,
    mode_line: Rect,
    minibuffer: Rect,
}

impl LayoutInfo {
    fn compute(site: &Site, area: Rect) -> Self {
        let completion_rows = site
            .minibuffer()
            .palette()
            .map(|p| p.completion.match_count().clamp(1, MAX_COMPLETIONS))
            .unwrap_or(0);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1 + completion_rows as u16),
            ])
            .split(area);

        let (sidebar, content) = if matches!(site.overlay(), Overlay::Sidebar { .. }) {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Length(site.config().sidebar_width),
                    Constraint::Min(10),
                ])
                .split(rows[0]);
            (Some(cols[0]), cols[1])
        } else {
            (None, rows[0])
        };

        Self {
            sidebar,
            content,
            mode_line: rows[1],
            minibuffer: rows[2],
        }
    }
}

fn ui(f: &mut ratatui::Frame, site: &Site, styles: &Styles, layout: &LayoutInfo) {
    f.render_widget(Block::default().style(styles.base), f.size());

    if let Some(area) = layout.sidebar {
        render_sidebar(f, site, styles, area);
    }
    render_content(f, site, styles, layout.content);
    f.render_widget(
        Paragraph::new(mode_line(site, styles)).style(styles.mode_line),
        layout.mode_line,
    );
    render_minibuffer(f, site, styles, layout.minibuffer);

    if matches!(site.overlay(), Overlay::Help) {
        render_help(f, site, styles, layout.content);
    }
}

fn render_sidebar(f: &mut ratatui::Frame, site: &Site, styles: &Styles, area: Rect) {
    let Overlay::Sidebar { selected } = *site.overlay() else {
        return;
    };
    let items: Vec<ListItem> = site.sidebar_rows().into_iter().map(ListItem::new).collect();
    let mut state = ListState::default();
    state.select(Some(selected));
    let list = List::new(items)
        .block(styles.block(" Buffers "))
        .style(styles.base)
        .highlight_style(styles.highlight);
    f.render_stateful_widget(list, area, &mut state);
}

fn render_content(f: &mut ratatui::Frame, site: &Site, styles: &Styles, area: Rect) {
    let buffer = site.manager().active();

    if let Some(session) = site.edit_session() {
        let marker = if session.is_dirty() { "*" } else { "" };
        let title = format!(" {marker}{} [edit] ", buffer.display_name());
        let lines: Vec<Line> = session.lines().into_iter().map(Line::from).collect();
        let paragraph = Paragraph::new(Text::from(lines))
            .block(styles.block(title))
            .style(styles.base)
            .scroll((session.scroll() as u16, 0));
        f.render_widget(paragraph, area);

        let inner_width = area.width.saturating_sub(2);
        let inner_height = area.height.saturating_sub(2);
        if let Some((x, y)) = session.cursor_offset(inner_width, inner_height) {
            f.set_cursor(area.x + 1 + x, area.y + 1 + y);
        }
        return;
    }

    let Some(rows) = site.visible_content() else {
        let lines = vec![
            Line::from(Span::styled("Authentication required", styles.heading)),
            Line::from(""),
            Line::from("M-x login     log in to an existing account"),
            Line::from("M-x register  create an account"),
            Line::from("M-x register-email  sign up with a registration code"),
            Line::from(""),
            Line::from(Span::styled("C-x C-c quits", styles.muted)),
        ];
        let paragraph = Paragraph::new(Text::from(lines))
            .block(styles.block(" mxsite "))
            .style(styles.base);
        f.render_widget(paragraph, area);
        return;
    };

    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = rows
        .iter()
        .skip(site.scroll())
        .take(height)
        .map(|row| content_line(row, styles))
        .collect();
    let title = format!(" {} ", buffer.display_name());
    let paragraph = Paragraph::new(Text::from(lines))
        .block(styles.block(title))
        .style(styles.base);
    f.render_widget(paragraph, area);
}

fn content_line(row: &ViewLine, styles: &Styles) -> Line<'static> {
    let mut style = if row.heading_level.is_some() {
        styles.heading
    } else {
        styles.base
    };
    if row.is_match {
        style = style.add_modifier(Modifier::REVERSED);
    }
    let mut spans = vec![Span::styled(row.text.clone(), style)];
    if row.folded {
        spans.push(Span::styled(" ...", styles.muted));
    }
    Line::from(spans)
}

fn mode_line(site: &Site, styles: &Styles) -> Line<'static> {
    let sep = || Span::styled(" | ", styles.muted.bg(styles.ui.mode_line_bg));
    let mut parts = vec![Span::styled(
        format!(" {}", site.manager().active().display_name()),
        Style::default().add_modifier(Modifier::BOLD),
    )];

    if let Some(title) = site.current_heading() {
        parts.push(sep());
        parts.push(Span::styled(title.to_string(), styles.muted.bg(styles.ui.mode_line_bg)));
    }

    if let Some(session) = site.edit_session() {
        parts.push(sep());
        let label = if session.is_dirty() { "EDIT*" } else { "EDIT" };
        parts.push(Span::styled(label, styles.accent.bg(styles.ui.mode_line_bg)));
    }

    parts.push(sep());
    parts.push(Span::raw(match site.session() {
        Some(session) => session.username.clone(),
        None => "not logged in".to_string(),
    }));

    if let Some((current, total)) = site.search_status() {
        parts.push(sep());
        parts.push(Span::raw(format!("match {current}/{total}")));
    }

    parts.push(sep());
    parts.push(Span::raw(chrono::Local::now().format("%H:%M").to_string()));

    // The echo area is taken while the minibuffer is open.
    if site.minibuffer().is_open() {
        if let Some(msg) = site.message() {
            parts.push(sep());
            parts.push(Span::styled(msg.to_string(), styles.accent.bg(styles.ui.mode_line_bg)));
        }
    }
    Line::from(parts)
}

fn render_minibuffer(f: &mut ratatui::Frame, site: &Site, styles: &Styles, area: Rect) {
    match site.minibuffer() {
        Minibuffer::Closed => {
            let text = site.message().unwrap_or("").to_string();
            f.render_widget(Paragraph::new(text).style(styles.base), area);
        }
        Minibuffer::TextInput(prompt) => {
            let shown = prompt.shown_input();
            let line = Line::from(vec![
                Span::styled(prompt.prompt.clone(), styles.accent),
                Span::styled(shown.clone(), styles.base),
            ]);
            f.render_widget(Paragraph::new(line).style(styles.base), area);
            let x = UnicodeWidthStr::width(prompt.prompt.as_str()) + UnicodeWidthStr::width(shown.as_str());
            f.set_cursor(area.x + (x as u16).min(area.width.saturating_sub(1)), area.y);
        }
        Minibuffer::Command(palette) => {
            let completion = &palette.completion;
            let list_height = area.height.saturating_sub(1);
            let list_area = Rect {
                height: list_height,
                ..area
            };
            let input_area = Rect {
                y: area.y + list_height,
                height: 1,
                ..area
            };

            let items: Vec<ListItem> = if completion.match_count() == 0 {
                vec![ListItem::new(Span::styled("[No match]", styles.muted))]
            } else {
                completion
                    .matches()
                    .map(|c| {
                        ListItem::new(Line::from(vec![
                            Span::raw(format!("{:<24}", c.label)),
                            Span::styled(c.description.clone(), styles.muted),
                        ]))
                    })
                    .collect()
            };
            let mut state = ListState::default();
            if completion.match_count() > 0 {
                state.select(Some(completion.selected_index()));
            }
            let list = List::new(items).style(styles.base).highlight_style(styles.highlight);
            f.render_stateful_widget(list, list_area, &mut state);

            let label = match palette.source {
                Source::Commands => "M-x ",
                Source::Buffers => "Switch to buffer: ",
            };
            let line = Line::from(vec![
                Span::styled(label, styles.accent),
                Span::styled(completion.query().to_string(), styles.base),
            ]);
            f.render_widget(Paragraph::new(line).style(styles.base), input_area);
            let x = UnicodeWidthStr::width(label) + UnicodeWidthStr::width(completion.query());
            f.set_cursor(
                input_area.x + (x as u16).min(input_area.width.saturating_sub(1)),
                input_area.y,
            );
        }
    }
}

const KEY_HELP: &[(&str, &str)] = &[
    ("M-x", "run a command"),
    ("C-x b", "switch buffer"),
    ("C-x k", "delete buffer"),
    ("C-x C-f", "create buffer"),
    ("C-x C-c", "quit"),
    ("C-b", "toggle sidebar"),
    ("j / k", "scroll"),
    ("g / G", "top / bottom"),
    ("[ / ]", "previous / next heading"),
    ("Tab / S-Tab", "fold heading / all"),
    ("h / l", "previous / next buffer"),
    ("/ n N", "search, next, previous"),
    ("e", "edit (C-s save, Esc discard)"),
    ("C-g / Esc", "cancel"),
];

fn render_help(f: &mut ratatui::Frame, site: &Site, styles: &Styles, area: Rect) {
    let popup = centered_rect(70, 80, area);
    f.render_widget(Clear, popup);

    let mut lines = vec![Line::from(Span::styled("Keys", styles.heading))];
    for (keys, what) in KEY_HELP {
        lines.push(Line::from(vec![
            Span::styled(format!("{keys:<14}"), styles.accent),
            Span::raw(*what),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Commands", styles.heading)));
    let authed = site.is_authenticated();
    for command in site.registry().list().iter().filter(|c| authed || c.public) {
        lines.push(Line::from(vec![
            Span::styled(format!("{:<16}", command.name), styles.accent),
            Span::styled(command.description, styles.muted),
        ]));
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(styles.block(" Help (any key closes) "))
        .style(styles.base)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, popup);
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

fn bg_or_reset(color: Option<Color>) -> Color {
    color.unwrap_or(Color::Reset)
}
