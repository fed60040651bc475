use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, DeployWizard, InputMode, ModalStep, OperationKind};
use crate::model::{Column, DETAIL_COLUMNS, Tab};
use crate::projector::{truncate, workload_name};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const SELECTED: Color = Color::Rgb(24, 36, 58);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match app.mode() {
        InputMode::Detail => render_detail(frame, root[1], app),
        InputMode::Normal | InputMode::Modal => render_table(frame, root[1], app),
    }
    render_hints(frame, root[2], app);
    render_footer(frame, root[3], app);

    if let Some(wizard) = app.wizard() {
        render_wizard(frame, app, wizard);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " LCR ", Color::Black, ACCENT, PL_A);
    for (position, tab) in Tab::ALL.iter().enumerate() {
        let active = *tab == app.active_tab();
        let bg = if active { Color::Rgb(59, 130, 246) } else { PL_A };
        let fg = if active { Color::Black } else { Color::White };
        let next_bg = match Tab::ALL.get(position + 1) {
            Some(next) if *next == app.active_tab() => Color::Rgb(59, 130, 246),
            Some(_) => PL_A,
            None => BG,
        };
        push_powerline_segment(
            &mut spans,
            format!(" {} {tab} ", tab.index() + 1),
            fg,
            bg,
            next_bg,
        );
    }

    let right = Line::from(vec![
        Span::styled(" ns ", Style::default().fg(MUTED).bg(BG)),
        Span::styled(
            format!("{} ", app.namespace()),
            Style::default()
                .fg(Color::White)
                .bg(BG)
                .add_modifier(Modifier::BOLD),
        ),
    ]);
    let right_width = spans_width(&right.spans) as u16;
    if right_width >= area.width {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let tab = app.active_tab();
    let columns = tab.columns();
    let (rows, selected) = app.visible_rows();

    let header_row = Row::new(columns.iter().map(|column| {
        Cell::from(column.title).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let body = rows.iter().map(|row| {
        Row::new(
            row.cells()
                .into_iter()
                .map(|cell| Cell::from(cell).style(Style::default().fg(Color::White))),
        )
    });

    let mut title = format!(
        "{} ({}) {}/{}",
        tab.title(),
        record_count(app),
        app.selected_index() + 1,
        app.rows().len()
    );
    if loading_for_tab(app, tab) {
        title.push_str(" loading…");
    }
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if app.mode() == InputMode::Normal {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL));

    let table = Table::new(body, column_constraints(columns))
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(SELECTED)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    if !rows.is_empty() {
        state.select(Some(selected));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_detail(frame: &mut Frame, area: Rect, app: &App) {
    let Some(view) = app.detail() else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                " Pod ",
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" {}/{}", view.namespace, view.name),
                Style::default().fg(Color::White),
            ),
        ]))
        .style(Style::default().bg(BG)),
        chunks[0],
    );

    let block = Block::default()
        .title("Details")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let Some((rows, selected)) = app.visible_detail_rows() else {
        frame.render_widget(
            Paragraph::new("Loading pod details…")
                .style(Style::default().fg(MUTED))
                .block(block),
            chunks[1],
        );
        return;
    };

    let header_row = Row::new(DETAIL_COLUMNS.iter().map(|column| {
        Cell::from(column.title).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().fg(ACCENT));
    let body = rows.iter().map(|row| {
        let key_style = if row.key == "Error" {
            Style::default().fg(ERROR).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Rgb(147, 197, 253))
        };
        Row::new(vec![
            Cell::from(row.key.clone()).style(key_style),
            Cell::from(row.value.clone()).style(Style::default().fg(Color::White)),
        ])
    });

    let table = Table::new(body, column_constraints(&DETAIL_COLUMNS))
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(SELECTED));
    let mut state = TableState::default();
    if !rows.is_empty() {
        state.select(Some(selected));
    }
    frame.render_stateful_widget(table, chunks[1], &mut state);
}

fn render_wizard(frame: &mut Frame, app: &App, wizard: &DeployWizard) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Image: ", Style::default().fg(MUTED)),
            Span::styled(
                wizard.image.clone(),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
    ];

    let title = match wizard.step {
        ModalStep::SelectTarget => {
            lines.push(Line::from("Choose a deployment to update, or create a new one:"));
            lines.push(Line::from(""));
            lines.push(choice_line(
                wizard.cursor.is_none(),
                format!(
                    "+ Create new deployment ({})",
                    workload_name(&wizard.image)
                ),
            ));
            if app.is_pending(OperationKind::ListWorkloads) {
                lines.push(Line::styled(
                    "  Loading deployments…",
                    Style::default().fg(MUTED),
                ));
            }
            for (index, candidate) in app.candidates().iter().enumerate() {
                lines.push(choice_line(
                    wizard.cursor == Some(index),
                    format!(
                        "{:<32} {:<16} {:<9} {}",
                        truncate(&candidate.name, 32),
                        truncate(&candidate.namespace, 16),
                        candidate.status,
                        candidate.replica_fraction
                    ),
                ));
            }
            "Deploy image"
        }
        ModalStep::CreateConfirm => {
            lines.push(Line::from(format!(
                "Create deployment '{}' in namespace '{}'?",
                workload_name(&wizard.image),
                app.namespace()
            )));
            lines.push(Line::styled(
                "1 replica, container port 80, image pull policy Never",
                Style::default().fg(MUTED),
            ));
            "Create deployment"
        }
        ModalStep::UpdateConfirm => {
            if let Some(target) = wizard.target.as_ref() {
                lines.push(Line::from(format!(
                    "Update deployment '{}/{}' ({}) to this image?",
                    target.namespace, target.name, target.replica_fraction
                )));
            }
            lines.push(Line::from(""));
            if app.is_pending(OperationKind::WorkloadPods) {
                lines.push(Line::styled("Loading pods…", Style::default().fg(MUTED)));
            } else if wizard.target_pods.is_empty() {
                lines.push(Line::styled("No pods found", Style::default().fg(MUTED)));
            } else {
                for pod in &wizard.target_pods {
                    lines.push(Line::from(format!(
                        "  {:<35} {:<10} restarts {:<4} {}",
                        truncate(&pod.name, 35),
                        pod.status,
                        pod.restarts,
                        pod.age
                    )));
                }
            }
            "Update deployment"
        }
    };

    lines.push(Line::from(""));
    lines.push(Line::styled(
        wizard_hint(wizard.step),
        Style::default().fg(WARN),
    ));

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn choice_line(selected: bool, text: String) -> Line<'static> {
    if selected {
        Line::styled(
            format!("▶ {text}"),
            Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Line::from(format!("  {text}"))
    }
}

fn wizard_hint(step: ModalStep) -> &'static str {
    match step {
        ModalStep::SelectTarget => "j/k move  1/Enter next  2 cancel  Esc close",
        ModalStep::CreateConfirm | ModalStep::UpdateConfirm => {
            "1/Enter confirm  2 back  Esc close"
        }
    }
}

fn render_hints(frame: &mut Frame, area: Rect, app: &App) {
    let hints = match app.mode() {
        InputMode::Detail => "j/k scroll  g/G top/bottom  Esc back",
        InputMode::Modal => "deploy wizard open",
        InputMode::Normal => match app.active_tab() {
            Tab::Commits => "1-3/Tab switch  j/k move  q quit",
            Tab::Images => {
                "1-3/Tab switch  j/k move  Enter deploy  ^D delete  ^P pull  r refresh  q quit"
            }
            Tab::Workloads => "1-3/Tab switch  j/k move  Enter details  r refresh  q quit",
        },
    };
    frame.render_widget(
        Paragraph::new(Line::styled(format!(" {hints}"), Style::default().fg(MUTED)))
            .style(Style::default().bg(BG)),
        area,
    );
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (mode_label, mode_bg) = match app.mode() {
        InputMode::Normal => (" nrm ", PL_A),
        InputMode::Modal => (" dpl ", WARN),
        InputMode::Detail => (" pod ", PL_C),
    };
    let mode_fg = if app.mode() == InputMode::Modal {
        Color::Black
    } else {
        Color::White
    };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, mode_fg, mode_bg, PL_B);
    let status_width = area.width.saturating_sub(24).max(24) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", truncate(app.status(), status_width)),
        Color::White,
        PL_B,
        BG,
    );

    let pending = app.pending_count();
    if pending == 0 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let right = Line::from(Span::styled(
        format!(" ⟳ {pending} running "),
        Style::default()
            .fg(Color::Black)
            .bg(WARN)
            .add_modifier(Modifier::BOLD),
    ));
    let right_width = (spans_width(&right.spans) as u16).min(area.width);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn record_count(app: &App) -> usize {
    match app.active_tab() {
        Tab::Commits => app.commits().len(),
        Tab::Images => app.images().len(),
        Tab::Workloads => app.workloads().len(),
    }
}

fn loading_for_tab(app: &App, tab: Tab) -> bool {
    match tab {
        Tab::Commits => false,
        Tab::Images => {
            app.is_pending(OperationKind::RefreshImages)
                || app.is_pending(OperationKind::Delete)
                || app.is_pending(OperationKind::Pull)
        }
        Tab::Workloads => app.is_pending(OperationKind::RefreshWorkloads),
    }
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

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: &[Column]) -> Vec<Constraint> {
    columns
        .iter()
        .map(|column| Constraint::Length(column.width as u16))
        .collect()
}
