//! Close and 7-period moving average over time.

use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::symbols;
use ratatui::text::Span;
use ratatui::widgets::{Axis, Chart, Dataset, GraphType, LegendPosition};
use ratatui::Frame;

use pricehouse_core::domain::AnalyticsRow;

use crate::theme;

/// Chart points: x is hours since the first row, rows with no value skipped.
pub fn series_points(
    rows: &[AnalyticsRow],
    value: impl Fn(&AnalyticsRow) -> Option<f64>,
) -> Vec<(f64, f64)> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|r| {
            let y = value(r).filter(|v| v.is_finite())?;
            let x = (r.timestamp - first.timestamp).num_seconds() as f64 / 3600.0;
            Some((x, y))
        })
        .collect()
}

/// Padded `[min, max]` over every y value, `None` when there are none.
pub fn y_bounds(series: &[&[(f64, f64)]]) -> Option<(f64, f64)> {
    let mut values = series.iter().flat_map(|s| s.iter().map(|(_, y)| *y)).peekable();
    values.peek()?;
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
        (lo.min(y), hi.max(y))
    });
    let padding = ((hi - lo).abs() * 0.05).max(hi.abs() * 1e-3).max(1e-6);
    Some((lo - padding, hi + padding))
}

pub fn render(f: &mut Frame, area: Rect, instrument: &str, rows: &[AnalyticsRow]) {
    let closes = series_points(rows, |r| r.close);
    let averages = series_points(rows, |r| r.moving_avg_7);
    let Some((y_min, y_max)) = y_bounds(&[&closes, &averages]) else {
        f.render_widget(
            ratatui::widgets::Paragraph::new(Span::styled(
                "No close prices in this series.",
                theme::muted(),
            )),
            area,
        );
        return;
    };
    let x_max = closes
        .iter()
        .chain(&averages)
        .map(|(x, _)| *x)
        .fold(0.0_f64, f64::max);

    let (first, last) = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return,
    };

    let datasets = vec![
        Dataset::default()
            .name(format!("{instrument} close"))
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(theme::ACCENT))
            .graph_type(GraphType::Line)
            .data(&closes),
        Dataset::default()
            .name("ma_7")
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(theme::WARNING))
            .graph_type(GraphType::Line)
            .data(&averages),
    ];

    let chart = Chart::new(datasets)
        .legend_position(Some(LegendPosition::TopLeft))
        .x_axis(
            Axis::default()
                .style(theme::muted())
                .bounds([0.0, x_max.max(1.0)])
                .labels(vec![
                    Span::styled(first.format("%m-%d %H:%M").to_string(), theme::muted()),
                    Span::styled(last.format("%m-%d %H:%M").to_string(), theme::muted()),
                ]),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled("Close", theme::muted()))
                .style(theme::muted())
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::styled(format!("{y_min:.2}"), theme::muted()),
                    Span::styled(format!("{y_max:.2}"), theme::muted()),
                ]),
        );

    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn row(hour: i64, close: Option<f64>, ma: Option<f64>) -> AnalyticsRow {
        AnalyticsRow {
            instrument_id: "X".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::hours(hour),
            close,
            moving_avg_7: ma,
            prior_close: None,
            fractional_change: None,
        }
    }

    #[test]
    fn points_skip_missing_values_and_use_hour_offsets() {
        let rows = vec![row(0, Some(1.0), Some(1.0)), row(2, None, Some(1.0)), row(3, Some(4.0), Some(2.5))];
        let closes = series_points(&rows, |r| r.close);
        assert_eq!(closes, vec![(0.0, 1.0), (3.0, 4.0)]);
        assert_eq!(series_points(&rows, |r| r.moving_avg_7).len(), 3);
    }

    #[test]
    fn bounds_are_padded_and_handle_flat_series() {
        let (lo, hi) = y_bounds(&[&[(0.0, 10.0), (1.0, 20.0)]]).unwrap();
        assert!(lo < 10.0 && hi > 20.0);

        let (lo, hi) = y_bounds(&[&[(0.0, 5.0), (1.0, 5.0)]]).unwrap();
        assert!(lo < 5.0 && hi > 5.0);

        assert!(y_bounds(&[&[]]).is_none());
    }
}
