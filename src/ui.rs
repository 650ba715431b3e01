use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Cell, Clear, Paragraph, Row, Table, TableState};
use unicode_width::UnicodeWidthChar;

use crate::app::{App, BANNER_HEIGHT, Focus, INPUT_HEIGHT, STATUS_HEIGHT};
use crate::model::ServerInfo;
use crate::overlay;

const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const SELECTED: Color = Color::Rgb(24, 36, 58);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(BANNER_HEIGHT),
            Constraint::Min(1),
            Constraint::Length(INPUT_HEIGHT),
            Constraint::Length(STATUS_HEIGHT),
        ])
        .split(frame.area());

    render_banner(frame, root[0], app);
    render_table(frame, root[1], app);
    render_input(frame, root[2], app);
    render_status(frame, root[3], app);

    if app.dialog().is_some() {
        render_dialog(frame, app);
    }
}

fn render_banner(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(40), Constraint::Min(1)])
        .split(area);

    let mut lines = vec![title_line(app)];
    lines.extend(server_lines(app.server_info()));
    frame.render_widget(Paragraph::new(lines), chunks[0]);

    frame.render_widget(Paragraph::new(help_lines(app, area.height)), chunks[1]);
}

fn title_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " stevedore ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.context().title()),
        Color::White,
        PL_B,
        Color::Reset,
    );
    Line::from(spans)
}

fn server_lines(info: Option<&ServerInfo>) -> Vec<Line<'static>> {
    let Some(info) = info else {
        return vec![Line::from(Span::styled(
            " connecting…",
            Style::default().fg(MUTED),
        ))];
    };

    vec![
        labelled("Host", info.name.clone()),
        labelled(
            "Version",
            format!("{} (api {})", info.server_version, info.client_version),
        ),
        labelled("Images", info.images.to_string()),
        labelled(
            "Containers",
            format!(
                "{} running, {} paused, {} stopped",
                info.running, info.paused, info.stopped
            ),
        ),
    ]
}

fn labelled(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!(" {label:<11}"), Style::default().fg(MUTED)),
        Span::styled(value, Style::default().fg(Color::White)),
    ])
}

fn help_lines(app: &App, height: u16) -> Vec<Line<'static>> {
    let mut entries = vec![(":".to_string(), "command".to_string())];
    entries.extend(
        app.bindings()
            .iter()
            .map(|binding| (binding.key.to_string(), binding.help.to_string())),
    );
    entries.push(("1-9".to_string(), "sort".to_string()));
    if app.context().is_transient() {
        entries.push(("esc".to_string(), "back".to_string()));
    }
    entries.push(("q".to_string(), "quit".to_string()));

    let rows = usize::from(height.max(1));
    let mut lines = vec![Vec::<Span<'static>>::new(); rows];
    for (index, (key, help)) in entries.into_iter().enumerate() {
        let line = &mut lines[index % rows];
        line.push(Span::styled(
            format!("<{key}> "),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ));
        line.push(Span::styled(
            format!("{help:<12}"),
            Style::default().fg(MUTED),
        ));
    }
    lines.into_iter().map(Line::from).collect()
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let table = app.table();
    let focused = app.focus() == Focus::Table;

    let header_row = Row::new(table.columns().iter().enumerate().map(|(index, column)| {
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if index == table.sort_key() {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        Cell::from(column.title.clone()).style(style)
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = table.rows().iter().map(|row| {
        Row::new(row.iter().map(|field| Cell::from(field.clone()))).style(table.row_style(row))
    });

    let constraints = table
        .columns()
        .iter()
        .map(|column| Constraint::Length(u16::try_from(column.width).unwrap_or(u16::MAX)))
        .collect::<Vec<_>>();

    let block = Block::bordered()
        .border_type(BorderType::Rounded)
        .title(format!(" {} ({}) ", app.context().title(), table.rows().len()))
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL));

    let widget = Table::new(rows, constraints)
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(SELECTED).add_modifier(Modifier::BOLD));

    let mut state = TableState::default();
    state.select(table.cursor());
    frame.render_stateful_widget(widget, area, &mut state);
}

fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let editing = app.focus() == Focus::Input;
    let block = Block::bordered()
        .border_type(BorderType::Rounded)
        .border_style(if editing {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        });

    let line = if editing {
        Line::from(Span::styled(
            app.input().text().to_string(),
            Style::default().fg(Color::White),
        ))
    } else {
        Line::from(Span::styled(
            "press : to enter a command",
            Style::default().fg(MUTED),
        ))
    };
    frame.render_widget(Paragraph::new(line).block(block), area);

    if editing {
        let offset = app
            .input()
            .text()
            .chars()
            .take(app.input().cursor())
            .map(|ch| ch.width().unwrap_or(0))
            .sum::<usize>();
        let x = area
            .x
            .saturating_add(1)
            .saturating_add(u16::try_from(offset).unwrap_or(u16::MAX));
        frame.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let (fg, bg) = if app.status().starts_with("Refresh failed") {
        (Color::Black, WARN)
    } else {
        (MUTED, Color::Reset)
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            format!(" {}", app.status()),
            Style::default().fg(fg).bg(bg),
        ))),
        area,
    );
}

fn render_dialog(frame: &mut Frame, app: &App) {
    let Some(dialog) = app.dialog() else {
        return;
    };

    let area = frame.area();
    let background = overlay::buffer_lines(frame.buffer_mut());
    let block = dialog.render_lines();
    let (x, y) = overlay::centered_origin(&block, &background);
    let composed = overlay::place_overlay(x, y, &block, &background, true);

    let lines = composed
        .iter()
        .map(|line| overlay::parse_line(line))
        .collect::<Vec<_>>();
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines), area);
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}
