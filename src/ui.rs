use crate::backend::LocalBackend;
use crate::catalog::resolve_catalog;
use crate::executor::{Notifier, TransitionExecutor};
use crate::model::{BoardStage, EntityKind, MoveIntent};
use crate::projection::{project, BoardFilters};
use crate::resolver::CardIndex;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::time::Duration;

pub fn run(backend: LocalBackend) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(backend);
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    result
}

struct App {
    backend: LocalBackend,
    executor: TransitionExecutor,
    filters: BoardFilters,
    catalog: Vec<BoardStage>,
    columns: Vec<ColumnView>,
    index: CardIndex,
    selected_column: usize,
    selected_card: usize,
    scroll_offsets: Vec<usize>,
    status: String,
    mode: Mode,
}

enum Mode {
    Normal,
    Searching(String),
    Dragging(DragState),
}

/// A grab in progress: the carried card plus the column/card the carry
/// cursor currently hovers over.
struct DragState {
    card_id: String,
    kind: EntityKind,
    title: String,
    hover_column: usize,
    hover_card: usize,
}

/// Owned snapshot of one rendered column, rebuilt from the projection
/// whenever entities, catalog or filters change.
struct ColumnView {
    key: &'static str,
    label: String,
    color: Color,
    backend_id: Option<i64>,
    cards: Vec<CardView>,
    total_value: f64,
}

struct CardView {
    id: String,
    kind: EntityKind,
    title: String,
    subtitle: String,
    value: f64,
}

struct StatusNotifier {
    line: Option<(bool, String)>,
}

impl Notifier for StatusNotifier {
    fn success(&mut self, message: &str) {
        self.line = Some((true, message.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.line = Some((false, message.to_string()));
    }
}

impl App {
    fn new(backend: LocalBackend) -> Self {
        let status = format!("Loaded CRM store from {}", backend.location().path.display());
        let mut app = App {
            backend,
            executor: TransitionExecutor::new(),
            filters: BoardFilters::default(),
            catalog: Vec::new(),
            columns: Vec::new(),
            index: CardIndex::default(),
            selected_column: 0,
            selected_card: 0,
            scroll_offsets: Vec::new(),
            status,
            mode: Mode::Normal,
        };
        app.rebuild();
        app
    }

    /// Recompute catalog, projections and the card index from the backend
    /// state. The index mirrors exactly what is rendered.
    fn rebuild(&mut self) {
        let store = self.backend.store();
        self.catalog = resolve_catalog(store.stage_records());
        let mut index = CardIndex::new(self.catalog.iter().map(|s| s.key));
        let mut columns = Vec::with_capacity(self.catalog.len());
        for stage in &self.catalog {
            let cards = project(&store.deals, &store.leads, stage, &self.catalog, &self.filters);
            let mut views = Vec::with_capacity(cards.len());
            for deal in &cards.deals {
                index.insert_card(deal.id.clone(), stage.key);
                views.push(CardView {
                    id: deal.id.clone(),
                    kind: EntityKind::Deal,
                    title: deal.title.clone(),
                    subtitle: format!("{} · {}%", deal.customer_name, deal.probability),
                    value: deal.value,
                });
            }
            for lead in &cards.leads {
                index.insert_card(lead.id.clone(), stage.key);
                views.push(CardView {
                    id: lead.id.clone(),
                    kind: EntityKind::Lead,
                    title: lead.name.clone(),
                    subtitle: lead
                        .assigned_to
                        .clone()
                        .unwrap_or_else(|| "unassigned".to_string()),
                    value: lead.estimated_value,
                });
            }
            columns.push(ColumnView {
                key: stage.key,
                label: stage.label.clone(),
                color: stage_color(stage.color),
                backend_id: stage.id,
                total_value: cards.total_value(),
                cards: views,
            });
        }
        self.columns = columns;
        self.index = index;
        if self.scroll_offsets.len() < self.columns.len() {
            self.scroll_offsets.resize(self.columns.len(), 0);
        }
        self.clamp_selection();
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Searching(_) => self.handle_search_key(key),
            Mode::Dragging(_) => self.handle_drag_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Left | KeyCode::Char('h') => self.prev_column(),
            KeyCode::Right | KeyCode::Char('l') => self.next_column(),
            KeyCode::Up | KeyCode::Char('k') => self.prev_card(),
            KeyCode::Down | KeyCode::Char('j') => self.next_card(),
            KeyCode::Char(' ') | KeyCode::Enter => self.grab_selected(),
            KeyCode::Char('/') => {
                let initial = self.filters.search.clone().unwrap_or_default();
                self.mode = Mode::Searching(initial);
                self.status = "Search (Enter apply, Esc clear)".to_string();
            }
            KeyCode::Char('c') => {
                self.filters = BoardFilters::default();
                self.rebuild();
                self.status = "Filters cleared".to_string();
            }
            KeyCode::Char('r') => {
                self.backend.reload()?;
                self.rebuild();
                self.status = "Reloaded from store".to_string();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Result<bool> {
        let mut query = match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Searching(q) => q,
            other => {
                self.mode = other;
                return Ok(false);
            }
        };
        match key.code {
            KeyCode::Esc => {
                self.filters.search = None;
                self.rebuild();
                self.status = "Search cleared".to_string();
            }
            KeyCode::Enter => {
                self.filters.search = (!query.is_empty()).then_some(query);
                self.rebuild();
                self.status = match &self.filters.search {
                    Some(q) => format!("Filtering by \"{}\"", q),
                    None => "Search cleared".to_string(),
                };
            }
            KeyCode::Backspace => {
                query.pop();
                self.mode = Mode::Searching(query);
            }
            KeyCode::Char(c) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    query.push(c);
                }
                self.mode = Mode::Searching(query);
            }
            _ => self.mode = Mode::Searching(query),
        }
        Ok(false)
    }

    fn handle_drag_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.status = "Drop canceled".to_string();
            }
            KeyCode::Left | KeyCode::Char('h') => self.hover(-1, 0),
            KeyCode::Right | KeyCode::Char('l') => self.hover(1, 0),
            KeyCode::Up | KeyCode::Char('k') => self.hover(0, -1),
            KeyCode::Down | KeyCode::Char('j') => self.hover(0, 1),
            KeyCode::Char(' ') | KeyCode::Enter => self.drop_carried()?,
            _ => {}
        }
        Ok(false)
    }

    fn grab_selected(&mut self) {
        let (card_id, kind, title) = match self.current_card() {
            Some(card) => (card.id.clone(), card.kind, card.title.clone()),
            None => {
                self.status = "No card selected".to_string();
                return;
            }
        };
        if self.executor.is_in_flight(kind, &card_id) {
            self.status = format!("{} {} is still moving", kind.label(), card_id);
            return;
        }
        self.status = format!(
            "Carrying {} \"{}\" (←→ choose column, Space drop, Esc cancel)",
            kind.label(),
            title
        );
        self.mode = Mode::Dragging(DragState {
            card_id,
            kind,
            title,
            hover_column: self.selected_column,
            hover_card: self.selected_card,
        });
    }

    fn hover(&mut self, d_col: isize, d_card: isize) {
        let column_count = self.columns.len() as isize;
        if column_count == 0 {
            return;
        }
        if let Mode::Dragging(drag) = &mut self.mode {
            let col = (drag.hover_column as isize + d_col).clamp(0, column_count - 1) as usize;
            if col != drag.hover_column {
                drag.hover_column = col;
                drag.hover_card = 0;
            }
            let card_count = self.columns[col].cards.len() as isize;
            // hover_card == card_count means "the empty space below", i.e.
            // the column itself is the drop target.
            let max = card_count;
            drag.hover_card =
                (drag.hover_card as isize + d_card).clamp(0, max.max(0)) as usize;
        }
    }

    /// Complete the gesture: identify the drop target (card under the carry
    /// cursor, or the hovered column), resolve it to a stage, execute.
    fn drop_carried(&mut self) -> Result<()> {
        let drag = match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Dragging(drag) => drag,
            other => {
                self.mode = other;
                return Ok(());
            }
        };
        let column = match self.columns.get(drag.hover_column) {
            Some(c) => c,
            None => {
                self.status = "Drop target vanished".to_string();
                return Ok(());
            }
        };
        let target_id = column
            .cards
            .get(drag.hover_card)
            .map(|c| c.id.clone())
            .unwrap_or_else(|| column.key.to_string());

        let stage_key = match self.index.resolve_drop(&drag.card_id, &target_id) {
            Ok(Some(key)) => key,
            Ok(None) => {
                self.status = "Dropped in place, no change".to_string();
                return Ok(());
            }
            Err(err) => {
                self.status = format!("Drop rejected: {}", err);
                return Ok(());
            }
        };
        let Some(stage) = self.catalog.iter().find(|s| s.key == stage_key) else {
            self.status = format!("Drop rejected: unknown stage {}", stage_key);
            return Ok(());
        };

        let intent = MoveIntent::new(drag.kind, drag.card_id.clone(), stage);
        let mut notify = StatusNotifier { line: None };
        let moved = self
            .executor
            .execute(&intent, &mut self.backend, &mut notify)
            .is_ok();
        if let Some((_, message)) = notify.line {
            self.status = message;
        }
        if moved && self.backend.any_stale() {
            self.backend.reload()?;
            self.rebuild();
            self.selected_column = drag.hover_column.min(self.columns.len().saturating_sub(1));
            self.selected_card = 0;
        }
        Ok(())
    }

    fn prev_column(&mut self) {
        if self.selected_column > 0 {
            self.selected_column -= 1;
            self.selected_card = 0;
        }
    }

    fn next_column(&mut self) {
        if self.selected_column + 1 < self.columns.len() {
            self.selected_column += 1;
            self.selected_card = 0;
        }
    }

    fn prev_card(&mut self) {
        if self.selected_card > 0 {
            self.selected_card -= 1;
        }
    }

    fn next_card(&mut self) {
        if let Some(column) = self.columns.get(self.selected_column) {
            if self.selected_card + 1 < column.cards.len() {
                self.selected_card += 1;
            }
        }
    }

    fn clamp_selection(&mut self) {
        if self.columns.is_empty() {
            self.selected_column = 0;
            self.selected_card = 0;
            return;
        }
        self.selected_column = self.selected_column.min(self.columns.len() - 1);
        let cards = self.columns[self.selected_column].cards.len();
        self.selected_card = self.selected_card.min(cards.saturating_sub(1));
    }

    fn current_card(&self) -> Option<&CardView> {
        self.columns
            .get(self.selected_column)?
            .cards
            .get(self.selected_card)
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(f.size());

        self.draw_header(f, layout[0]);
        self.draw_board(f, layout[1]);
        self.draw_footer(f, layout[2]);
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let mut spans = vec![
            Span::styled(
                "pipeboard ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{}", self.backend.location().path.display()),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        if let Some(query) = &self.filters.search {
            spans.push(Span::raw("  •  "));
            spans.push(Span::styled(
                format!("search: {}", query),
                Style::default().fg(Color::Yellow),
            ));
        }
        if let Mode::Searching(query) = &self.mode {
            spans.push(Span::raw("  •  "));
            spans.push(Span::styled(
                format!("/{}▌", query),
                Style::default().fg(Color::LightYellow),
            ));
        }
        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let paragraph = Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_board(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        if self.columns.is_empty() {
            let msg = Paragraph::new("No stages resolved")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("pipeboard"));
            f.render_widget(msg, area);
            return;
        }

        let chunk_constraints = self
            .columns
            .iter()
            .map(|_| Constraint::Percentage((100 / self.columns.len() as u16).max(1)))
            .collect::<Vec<_>>();
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(chunk_constraints)
            .split(area);

        let (drag_column, drag_card, dragged_id) = match &self.mode {
            Mode::Dragging(d) => (Some(d.hover_column), d.hover_card, Some(d.card_id.clone())),
            _ => (None, 0, None),
        };

        for (idx, column) in self.columns.iter().enumerate() {
            let hovered = drag_column == Some(idx);
            let selected_here = drag_column.is_none() && idx == self.selected_column;
            let card_width = chunks[idx].width.saturating_sub(2);
            let items = column
                .cards
                .iter()
                .enumerate()
                .map(|(c_idx, card)| {
                    let highlighted = (selected_here && c_idx == self.selected_card)
                        || (hovered && c_idx == drag_card);
                    let carried = dragged_id.as_deref() == Some(card.id.as_str());
                    card_item(card, card_width, highlighted, carried)
                })
                .collect::<Vec<_>>();

            let mut state = ListState::default();
            let mut offset = *self.scroll_offsets.get(idx).unwrap_or(&0);
            let viewport = chunks[idx].height.saturating_sub(2) as usize;
            let cursor = if selected_here {
                Some(self.selected_card)
            } else if hovered {
                Some(drag_card.min(column.cards.len().saturating_sub(1)))
            } else {
                None
            };
            if let Some(sel) = cursor {
                offset = adjust_offset(sel, offset, viewport, 2, items.len());
                self.scroll_offsets[idx] = offset;
                state.select(Some(sel.min(items.len().saturating_sub(1))));
                *state.offset_mut() = offset;
            } else {
                *state.offset_mut() = offset.min(items.len().saturating_sub(1));
            }

            let id_part = column
                .backend_id
                .map(|id| format!("#{}", id))
                .unwrap_or_else(|| "unprovisioned".to_string());
            let title = format!(
                "{} ({}) {} · {:.0}",
                column.label,
                column.cards.len(),
                id_part,
                column.total_value
            );
            let border = if hovered {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(column.color)
            };
            let block = Block::default()
                .title(Span::styled(
                    title,
                    Style::default()
                        .fg(column.color)
                        .add_modifier(if selected_here || hovered {
                            Modifier::BOLD | Modifier::UNDERLINED
                        } else {
                            Modifier::BOLD
                        }),
                ))
                .borders(Borders::ALL)
                .border_style(border);

            let list = List::new(items).block(block);
            f.render_stateful_widget(list, chunks[idx], &mut state);
        }
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(2)])
            .split(area);

        let help = match self.mode {
            Mode::Dragging(_) => Line::from(vec![
                Span::styled("←↑↓→", Style::default().fg(Color::LightCyan)),
                Span::raw(" aim  "),
                Span::styled("Space", Style::default().fg(Color::LightGreen)),
                Span::raw(" drop  "),
                Span::styled("Esc", Style::default().fg(Color::LightRed)),
                Span::raw(" cancel"),
            ]),
            _ => Line::from(vec![
                Span::styled("←↑↓→ / h j k l", Style::default().fg(Color::LightCyan)),
                Span::raw(" navigate  "),
                Span::styled("Space", Style::default().fg(Color::LightGreen)),
                Span::raw(" grab  "),
                Span::styled("/", Style::default().fg(Color::LightYellow)),
                Span::raw(" search  "),
                Span::styled("c", Style::default().fg(Color::LightYellow)),
                Span::raw(" clear  "),
                Span::styled("r", Style::default().fg(Color::LightMagenta)),
                Span::raw(" reload  "),
                Span::styled("q", Style::default().fg(Color::LightRed)),
                Span::raw(" quit"),
            ]),
        };
        let help_bar = Paragraph::new(help).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(help_bar, rows[0]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(status, rows[1]);
    }
}

fn card_item(card: &CardView, width: u16, highlighted: bool, carried: bool) -> ListItem<'static> {
    let kind_tag = match card.kind {
        EntityKind::Deal => Span::styled("deal", Style::default().fg(Color::LightGreen)),
        EntityKind::Lead => Span::styled("lead", Style::default().fg(Color::LightBlue)),
    };
    let mut title_style = Style::default().add_modifier(Modifier::BOLD);
    if carried {
        title_style = title_style
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::ITALIC);
    } else if highlighted {
        title_style = title_style.fg(Color::Black).bg(Color::LightCyan);
    }
    let max = width.saturating_sub(8) as usize;
    let lines = vec![
        Line::from(vec![
            kind_tag,
            Span::raw(" "),
            Span::styled(truncate_text(&card.title, max), title_style),
        ]),
        Line::from(Span::styled(
            format!("  {} · {:.0}", truncate_text(&card.subtitle, max), card.value),
            Style::default().fg(Color::Gray),
        )),
    ];
    ListItem::new(lines)
}

fn stage_color(name: &str) -> Color {
    match name {
        "cyan" => Color::Cyan,
        "blue" => Color::Blue,
        "yellow" => Color::Yellow,
        "magenta" => Color::Magenta,
        "green" => Color::Green,
        _ => Color::White,
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn adjust_offset(
    selected: usize,
    offset: usize,
    viewport: usize,
    item_height: usize,
    total: usize,
) -> usize {
    if total == 0 || viewport == 0 {
        return 0;
    }
    let visible = (viewport / item_height.max(1)).max(1);
    let mut offset = offset.min(total.saturating_sub(1));
    if selected < offset {
        offset = selected;
    } else if selected >= offset + visible {
        offset = selected + 1 - visible;
    }
    offset
}

fn truncate_text(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_selection() {
        assert_eq!(adjust_offset(0, 0, 10, 2, 20), 0);
        assert_eq!(adjust_offset(7, 0, 10, 2, 20), 3);
        assert_eq!(adjust_offset(2, 5, 10, 2, 20), 2);
        assert_eq!(adjust_offset(0, 0, 0, 2, 20), 0);
    }

    #[test]
    fn truncation_respects_char_limit() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a very long deal title", 8), "a very …");
        assert_eq!(truncate_text("anything", 0), "");
    }
}
