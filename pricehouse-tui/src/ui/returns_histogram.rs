//! Returns histogram: vertical bar widget over the fractional changes.
//!
//! Renders:
//! - one column group per histogram bin, bar height scaled to the tallest bin
//! - a zero marker when 0 lies inside the range
//! - min / max labels along the bottom row

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};

use pricehouse_core::analytics::Histogram;

use crate::theme::Theme;

const LABEL_ROWS: u16 = 1;
const BAR: &str = "\u{2588}"; // █

pub struct ReturnsHistogram<'a> {
    histogram: &'a Histogram,
    theme: &'a Theme,
}

impl<'a> ReturnsHistogram<'a> {
    pub fn new(histogram: &'a Histogram, theme: &'a Theme) -> Self {
        Self { histogram, theme }
    }
}

impl Widget for ReturnsHistogram<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 4 || area.height < 2 {
            return;
        }
        let bins = &self.histogram.bins;
        let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
            buf.set_string(
                area.x,
                area.y,
                "No returns to plot.",
                Style::default().fg(self.theme.muted),
            );
            return;
        };

        let plot_height = area.height.saturating_sub(LABEL_ROWS);
        let max_count = self.histogram.max_count().max(1);
        let plot_width = area.width as usize;

        // Each screen column shows the bin under it; wide areas repeat bins.
        for col in 0..plot_width {
            let bin = &bins[col * bins.len() / plot_width];
            let height =
                (bin.count as f64 / max_count as f64 * plot_height as f64).round() as u16;
            let color = if bin.upper <= 0.0 {
                self.theme.negative
            } else if bin.lower >= 0.0 {
                self.theme.positive
            } else {
                self.theme.accent
            };
            let x = area.x + col as u16;
            for h in 0..height {
                let y = area.y + plot_height - 1 - h;
                buf.set_string(x, y, BAR, Style::default().fg(color));
            }
        }

        // Zero marker.
        let (lo, hi) = (first.lower, last.upper);
        if lo < 0.0 && hi > 0.0 {
            let frac = (0.0 - lo) / (hi - lo);
            let x = area.x + (frac * (plot_width - 1) as f64).round() as u16;
            buf.set_string(
                x,
                area.y,
                "0",
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            );
        }

        // Bottom row: range labels and count.
        let label_y = area.y + plot_height;
        let label_style = Style::default().fg(self.theme.muted);
        let left = format!("{:+.2}%", lo * 100.0);
        let right = format!("{:+.2}%", hi * 100.0);
        let middle = format!("n={} bins={}", self.histogram.total(), bins.len());
        buf.set_string(area.x, label_y, &left, label_style);
        let middle_x = area.x + (area.width.saturating_sub(middle.len() as u16)) / 2;
        if middle_x > area.x + left.len() as u16 {
            buf.set_string(middle_x, label_y, &middle, label_style);
        }
        let right_x = area.right().saturating_sub(right.len() as u16);
        if right_x > area.x + left.len() as u16 {
            buf.set_string(right_x, label_y, &right, label_style);
        }
    }
}
