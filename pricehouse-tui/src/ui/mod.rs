//! Top-level UI layout: selector, metrics, chart tabs and status bar.

pub mod metrics;
pub mod overlays;
pub mod price_chart;
pub mod returns_histogram;
pub mod selector;
pub mod status_bar;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Tabs};
use ratatui::Frame;

use crate::app::{AppState, ChartTab, Overlay, SeriesView};
use crate::theme::{self, Theme};

/// Draw the entire UI.
pub fn draw(f: &mut Frame, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());
    let main_area = chunks[0];

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(22), Constraint::Min(20)])
        .split(main_area);
    selector::render(f, columns[0], app);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(5)])
        .split(columns[1]);
    metrics::render(f, right[0], app);
    draw_chart_pane(f, right[1], app);

    status_bar::render(f, chunks[1], app);

    match app.overlay {
        Overlay::Help => overlays::render_help(f, main_area),
        Overlay::ErrorHistory => overlays::render_error_history(f, main_area, app),
        Overlay::None => {}
    }
}

fn draw_chart_pane(f: &mut Frame, area: Rect, app: &AppState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::panel_border(true))
        .title(" Chart ")
        .title_style(theme::panel_title(true));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let titles = [ChartTab::Price, ChartTab::Returns]
        .iter()
        .map(|t| format!("{} {}", t.index() + 1, t.label()));
    let tabs = Tabs::new(titles)
        .select(app.tab.index())
        .style(theme::muted())
        .highlight_style(theme::accent_bold());
    f.render_widget(tabs, parts[0]);

    match (&app.view, app.tab) {
        (SeriesView::Loaded { rows, summary, .. }, ChartTab::Price) => {
            price_chart::render(f, parts[1], &summary.instrument, rows);
        }
        (SeriesView::Loaded { histogram, .. }, ChartTab::Returns) => {
            let theme = Theme::default();
            f.render_widget(
                returns_histogram::ReturnsHistogram::new(histogram, &theme),
                parts[1],
            );
        }
        (SeriesView::Diagnostic { message, .. }, _) => {
            let text = vec![
                Line::from(""),
                Line::from(Span::styled("No chart for this selection.", theme::warning())),
                Line::from(Span::styled(message.as_str(), theme::muted())),
            ];
            f.render_widget(Paragraph::new(text), parts[1]);
        }
        (SeriesView::Idle, _) => {
            let text = vec![
                Line::from(""),
                Line::from(Span::styled(
                    "No instruments in v_market_analysis.",
                    theme::muted(),
                )),
                Line::from(Span::styled(
                    "Run `pricehouse ingest`, then press r to reload.",
                    theme::muted(),
                )),
            ];
            f.render_widget(Paragraph::new(text), parts[1]);
        }
    }
}

/// Compute a centered rect for overlays.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
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

/// `12.3456` style number, or `n/a`.
pub fn format_num(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".into(), |v| format!("{v:.4}"))
}

/// Signed percentage, or `n/a`.
pub fn format_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".into(), |v| format!("{:+.2}%", v * 100.0))
}
