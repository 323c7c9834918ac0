//! Application state: single-owner, main-thread only.
//!
//! The app owns the store handle for its lifetime. Every reload re-queries
//! the analytics view; nothing is cached outside the store.

use std::collections::VecDeque;

use chrono::NaiveDateTime;

use pricehouse_core::analytics::{Histogram, SeriesSummary};
use pricehouse_core::domain::AnalyticsRow;
use pricehouse_core::{PipelineError, Warehouse};

/// Most recent errors kept for the history overlay.
pub const ERROR_HISTORY_CAP: usize = 50;

/// Which chart the right-hand pane shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartTab {
    Price,
    Returns,
}

impl ChartTab {
    pub fn index(self) -> usize {
        match self {
            ChartTab::Price => 0,
            ChartTab::Returns => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChartTab::Price => "Price",
            ChartTab::Returns => "Returns",
        }
    }

    pub fn toggle(self) -> ChartTab {
        match self {
            ChartTab::Price => ChartTab::Returns,
            ChartTab::Returns => ChartTab::Price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Help,
    ErrorHistory,
}

/// Status message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Error category for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connectivity,
    Schema,
    Data,
    Store,
    Other,
}

impl ErrorCategory {
    pub fn of(err: &PipelineError) -> Self {
        match err {
            e if e.is_connectivity() => ErrorCategory::Connectivity,
            PipelineError::Schema(_) => ErrorCategory::Schema,
            PipelineError::EmptySeries { .. } | PipelineError::Analytics(_) => ErrorCategory::Data,
            PipelineError::Store(_) => ErrorCategory::Store,
            _ => ErrorCategory::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorCategory::Connectivity => "NET",
            ErrorCategory::Schema => "SCHEMA",
            ErrorCategory::Data => "DATA",
            ErrorCategory::Store => "STORE",
            ErrorCategory::Other => "ERR",
        }
    }
}

/// An error record for the error history overlay.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub timestamp: NaiveDateTime,
    pub category: ErrorCategory,
    pub message: String,
    pub context: String,
}

/// What the metrics and chart panes show for the current selection.
#[derive(Debug, Clone)]
pub enum SeriesView {
    /// Nothing selected (empty selector).
    Idle,
    Loaded {
        rows: Vec<AnalyticsRow>,
        summary: SeriesSummary,
        histogram: Histogram,
    },
    /// The series could not be summarized; shown in place of metrics.
    Diagnostic { instrument: String, message: String },
}

pub struct AppState {
    pub running: bool,
    store: Warehouse,
    pub instruments: Vec<String>,
    pub selected: usize,
    pub tab: ChartTab,
    pub view: SeriesView,
    pub histogram_bins: usize,
    pub overlay: Overlay,
    pub status_message: Option<(String, StatusLevel)>,
    pub error_history: VecDeque<ErrorRecord>,
    pub error_scroll: usize,
}

impl AppState {
    pub fn new(store: Warehouse, histogram_bins: usize) -> Self {
        Self {
            running: true,
            store,
            instruments: Vec::new(),
            selected: 0,
            tab: ChartTab::Price,
            view: SeriesView::Idle,
            histogram_bins: histogram_bins.max(1),
            overlay: Overlay::None,
            status_message: None,
            error_history: VecDeque::with_capacity(ERROR_HISTORY_CAP),
            error_scroll: 0,
        }
    }

    pub fn store_location(&self) -> &str {
        self.store.location()
    }

    /// Hand the store back for an explicit close at shutdown.
    pub fn into_store(self) -> Warehouse {
        self.store
    }

    pub fn selected_instrument(&self) -> Option<&str> {
        self.instruments.get(self.selected).map(String::as_str)
    }

    /// Re-query the selector, keeping the current instrument when it survives.
    pub fn reload(&mut self) {
        let previous = self.selected_instrument().map(str::to_string);
        match self.store.instruments() {
            Ok(instruments) => {
                self.instruments = instruments;
                self.selected = previous
                    .and_then(|p| self.instruments.iter().position(|i| *i == p))
                    .unwrap_or(0);
                self.load_selected();
                if !matches!(self.view, SeriesView::Diagnostic { .. }) {
                    self.set_status(format!(
                        "Loaded {} instrument(s) from {}",
                        self.instruments.len(),
                        self.store.location()
                    ));
                }
            }
            Err(e) => {
                self.instruments.clear();
                self.selected = 0;
                self.view = SeriesView::Diagnostic {
                    instrument: String::new(),
                    message: e.to_string(),
                };
                self.push_pipeline_error(&e, "loading instruments");
            }
        }
    }

    /// Query the analytics view for the selected instrument.
    pub fn load_selected(&mut self) {
        let Some(instrument) = self.selected_instrument().map(str::to_string) else {
            self.view = SeriesView::Idle;
            return;
        };

        let loaded = self.store.analytics(&instrument).and_then(|rows| {
            let summary = SeriesSummary::from_rows(&instrument, &rows)?;
            Ok((rows, summary))
        });
        match loaded {
            Ok((rows, summary)) => {
                let histogram = summary.histogram(self.histogram_bins);
                tracing::debug!(instrument = %instrument, rows = rows.len(), "series loaded");
                self.view = SeriesView::Loaded {
                    rows,
                    summary,
                    histogram,
                };
            }
            Err(e @ PipelineError::EmptySeries { .. }) => {
                self.set_warning(e.to_string());
                self.view = SeriesView::Diagnostic {
                    instrument,
                    message: e.to_string(),
                };
            }
            Err(e) => {
                self.push_pipeline_error(&e, &instrument);
                self.view = SeriesView::Diagnostic {
                    instrument,
                    message: e.to_string(),
                };
            }
        }
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.instruments.len() {
            self.selected += 1;
            self.load_selected();
        }
    }

    pub fn select_prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.load_selected();
        }
    }

    fn push_pipeline_error(&mut self, err: &PipelineError, context: &str) {
        tracing::warn!(error = %err, context, "dashboard query failed");
        self.push_error(ErrorCategory::of(err), err.to_string(), context.to_string());
    }

    /// Push an error to the history, capping at [`ERROR_HISTORY_CAP`].
    pub fn push_error(&mut self, category: ErrorCategory, message: String, context: String) {
        let record = ErrorRecord {
            timestamp: chrono::Local::now().naive_local(),
            category,
            message: message.clone(),
            context,
        };
        self.error_history.push_front(record);
        if self.error_history.len() > ERROR_HISTORY_CAP {
            self.error_history.pop_back();
        }
        self.status_message = Some((message, StatusLevel::Error));
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some((msg.into(), StatusLevel::Info));
    }

    pub fn set_warning(&mut self, msg: impl Into<String>) {
        self.status_message = Some((msg.into(), StatusLevel::Warning));
    }
}
