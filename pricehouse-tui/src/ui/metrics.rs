//! Headline metrics for the selected instrument, or the diagnostic that
//! replaces them when the series is too short.

use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use super::{format_num, format_pct};
use crate::app::{AppState, SeriesView};
use crate::theme;

pub fn render(f: &mut Frame, area: Rect, app: &AppState) {
    let title = match app.selected_instrument() {
        Some(instrument) => format!(" {instrument} "),
        None => " Metrics ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::panel_border(true))
        .title(title)
        .title_style(theme::panel_title(true));

    let lines = match &app.view {
        SeriesView::Loaded { summary, .. } => {
            let mut lines = Vec::new();
            metric(
                &mut lines,
                "Latest close",
                format_num(summary.latest_close),
                theme::accent(),
            );
            metric(
                &mut lines,
                "Change",
                format_pct(summary.latest_change),
                theme::change_style(summary.latest_change),
            );
            metric(
                &mut lines,
                "7-period MA",
                format_num(summary.latest_moving_avg),
                theme::warning(),
            );
            metric(
                &mut lines,
                "Return std dev",
                format_pct(summary.return_std_dev),
                theme::neutral(),
            );
            metric(
                &mut lines,
                "Rows",
                format!(
                    "{} ({} to {})",
                    summary.rows,
                    summary.first_timestamp.format("%m-%d %H:%M"),
                    summary.latest_timestamp.format("%m-%d %H:%M")
                ),
                theme::muted(),
            );
            lines
        }
        SeriesView::Diagnostic { message, .. } => vec![
            Line::from(Span::styled("Cannot summarize this selection", theme::warning())),
            Line::from(""),
            Line::from(Span::styled(message.as_str(), theme::muted())),
        ],
        SeriesView::Idle => vec![Line::from(Span::styled(
            "Nothing selected.",
            theme::muted(),
        ))],
    };

    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(para, area);
}

fn metric<'a>(lines: &mut Vec<Line<'a>>, label: &str, value: String, style: Style) {
    lines.push(Line::from(vec![
        Span::styled(format!("  {label:>15}: "), theme::muted()),
        Span::styled(value, style),
    ]));
}
