//! Deduplication: exactly one clean observation per (instrument, timestamp).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::{CleanObservation, RawObservation};

/// Collapse raw rows to one per (instrument, timestamp).
///
/// Ties are broken by ingestion order: the row with the highest `seq` wins.
/// Output is ordered by instrument, then timestamp ascending.
pub fn dedupe(raw: &[RawObservation]) -> Vec<CleanObservation> {
    let mut latest: BTreeMap<(&str, DateTime<Utc>), &RawObservation> = BTreeMap::new();
    for row in raw {
        let key = (
            row.observation.instrument_id.as_str(),
            row.observation.timestamp,
        );
        latest
            .entry(key)
            .and_modify(|kept| {
                if row.seq > kept.seq {
                    *kept = row;
                }
            })
            .or_insert(row);
    }
    latest
        .into_values()
        .map(|row| row.observation.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use chrono::TimeZone;

    fn raw(seq: i64, ticker: &str, hour: u32, close: f64) -> RawObservation {
        RawObservation {
            seq,
            batch_id: 1,
            observation: Observation::close_only(
                ticker,
                Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
                close,
            ),
        }
    }

    #[test]
    fn keeps_one_row_per_key() {
        let rows = vec![
            raw(1, "X", 9, 100.0),
            raw(2, "X", 10, 101.0),
            raw(3, "X", 9, 100.0),
            raw(4, "Y", 9, 50.0),
        ];
        let clean = dedupe(&rows);
        assert_eq!(clean.len(), 3);
        assert_eq!(clean[0].instrument_id, "X");
        assert_eq!(clean[2].instrument_id, "Y");
    }

    #[test]
    fn last_write_wins() {
        let rows = vec![raw(7, "X", 9, 100.0), raw(3, "X", 9, 99.0), raw(8, "X", 9, 98.5)];
        let clean = dedupe(&rows);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].close, Some(98.5));
    }

    #[test]
    fn output_is_time_ordered_per_instrument() {
        let rows = vec![raw(1, "X", 12, 1.0), raw(2, "X", 9, 2.0), raw(3, "X", 10, 3.0)];
        let hours: Vec<_> = dedupe(&rows)
            .iter()
            .map(|o| o.timestamp.format("%H").to_string())
            .collect();
        assert_eq!(hours, vec!["09", "10", "12"]);
    }

    #[test]
    fn empty_input() {
        assert!(dedupe(&[]).is_empty());
    }
}
