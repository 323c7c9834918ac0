//! Instrument selector: distinct tickers of the analytics view.

use ratatui::layout::Rect;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

use crate::app::AppState;
use crate::theme;

pub fn render(f: &mut Frame, area: Rect, app: &AppState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::panel_border(true))
        .title(format!(" Instruments ({}) ", app.instruments.len()))
        .title_style(theme::panel_title(true));

    let items: Vec<ListItem> = app
        .instruments
        .iter()
        .map(|i| ListItem::new(i.as_str()).style(theme::neutral()))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(theme::accent_bold())
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.instruments.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}
