use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use platelog_types::food::{FoodItem, MAX_RATING};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use uuid::Uuid;

pub fn stars(rating: u8) -> String {
    let filled = rating.min(MAX_RATING) as usize;
    format!(
        "{}{}",
        "★".repeat(filled),
        "☆".repeat(MAX_RATING as usize - filled)
    )
}

struct BrowserState {
    items: Vec<FoodItem>,
    list: ListState,
    preview: bool,
    status: String,
}

impl BrowserState {
    fn new(items: Vec<FoodItem>) -> Self {
        let mut list = ListState::default();
        if !items.is_empty() {
            list.select(Some(0));
        }
        let status = format!("{}개 항목", items.len());
        Self {
            items,
            list,
            preview: false,
            status,
        }
    }

    fn selected(&self) -> Option<&FoodItem> {
        self.list.selected().and_then(|i| self.items.get(i))
    }

    fn step(&mut self, delta: isize) {
        if self.items.is_empty() {
            return;
        }
        let last = self.items.len() as isize - 1;
        let current = self.list.selected().unwrap_or(0) as isize;
        self.list.select(Some((current + delta).clamp(0, last) as usize));
    }

    /// Apply one key press. Returns `true` when the browser should quit.
    fn handle_key(
        &mut self,
        code: KeyCode,
        on_delete: &mut dyn FnMut(Uuid) -> Result<bool>,
    ) -> bool {
        match code {
            KeyCode::Esc if self.preview => self.preview = false,
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Down | KeyCode::Char('j') if !self.preview => self.step(1),
            KeyCode::Up | KeyCode::Char('k') if !self.preview => self.step(-1),
            KeyCode::Enter if self.selected().is_some() => self.preview = true,
            KeyCode::Char('d') if !self.preview => {
                if let Some(id) = self.selected().map(|item| item.id) {
                    self.status = match on_delete(id) {
                        Ok(true) => match self.remove_selected() {
                            Some(item) => format!("삭제됨: {}", item.name),
                            None => "삭제됨".into(),
                        },
                        Ok(false) => "이미 삭제된 항목".into(),
                        Err(err) => format!("삭제 실패: {err}"),
                    };
                }
            }
            _ => {}
        }
        false
    }

    fn remove_selected(&mut self) -> Option<FoodItem> {
        let index = self.list.selected()?;
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        if self.items.is_empty() {
            self.list.select(None);
        } else {
            self.list.select(Some(index.min(self.items.len() - 1)));
        }
        Some(removed)
    }
}

/// Interactive list. Enter opens a preview, Esc dismisses it, `d` deletes
/// the selection through `on_delete`, `q` quits.
pub fn run(
    items: Vec<FoodItem>,
    summary: String,
    mut on_delete: impl FnMut(Uuid) -> Result<bool>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, BrowserState::new(items), &summary, &mut on_delete);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut state: BrowserState,
    summary: &str,
    on_delete: &mut dyn FnMut(Uuid) -> Result<bool>,
) -> Result<()> {
    loop {
        terminal.draw(|f| draw(f, &mut state, summary))?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }
        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Press && state.handle_key(key.code, on_delete) {
            break;
        }
    }
    Ok(())
}

fn draw(f: &mut Frame, state: &mut BrowserState, summary: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(f.size());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Platelog",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(state.status.clone()),
        Span::raw("  "),
        Span::styled("저장소:", Style::default().fg(Color::Magenta)),
        Span::raw(" "),
        Span::raw(summary.to_string()),
        Span::raw("  "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" 미리보기 "),
        Span::styled("d", Style::default().fg(Color::Yellow)),
        Span::raw(" 삭제 "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" 종료"),
    ]))
    .block(Block::default().borders(Borders::ALL).title("요약"));
    f.render_widget(header, chunks[0]);

    let rows: Vec<ListItem> = state
        .items
        .iter()
        .map(|item| {
            let grade = item
                .nutri_score
                .map(|g| format!(" [{g}]"))
                .unwrap_or_default();
            ListItem::new(format!("{}  {}{}", stars(item.rating), item.name, grade))
        })
        .collect();
    let list = List::new(rows)
        .block(Block::default().borders(Borders::ALL).title("기록"))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    f.render_stateful_widget(list, chunks[1], &mut state.list);

    if state.preview {
        if let Some(item) = state.selected() {
            let area = centered(f.size(), 60, 60);
            f.render_widget(Clear, area);
            f.render_widget(preview(item), area);
        }
    }
}

fn preview(item: &FoodItem) -> Paragraph<'static> {
    let mut lines = vec![
        Line::from(Span::styled(
            item.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(stars(item.rating)),
    ];
    if let Some(grade) = item.nutri_score {
        lines.push(Line::from(format!("영양 등급: {grade}")));
    }
    if !item.tags.is_empty() {
        lines.push(Line::from(format!("태그: {}", item.tags.join(", "))));
    }
    if let Some(notes) = &item.notes {
        lines.push(Line::from(""));
        lines.push(Line::from(notes.clone()));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(match &item.image {
        Some(image) => format!("사진: {} ({} bytes)", image.mime(), image.len()),
        None => "사진 없음".to_string(),
    }));
    lines.push(Line::from(format!(
        "기록: {}",
        item.created_at.format("%Y-%m-%d %H:%M")
    )));

    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("미리보기 (Esc 닫기)"),
        )
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}
