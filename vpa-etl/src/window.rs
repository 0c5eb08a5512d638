//! WindowJoiner: prints ⋈ taps ⟕ pays over a trailing window of ISO weeks
//!
//! Week distance is measured between ISO week start dates (Mondays), so a
//! window that crosses a year boundary keeps its four calendar weeks.

use crate::error::{EtlError, EtlResult};
use crate::records::{PayEvent, PrintEvent, TapEvent, UserId};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use vpa_common::config::{AnchorSetting, WindowConfig};

/// Position of a joined row inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WeekLabel {
    /// The anchor week itself
    #[serde(rename = "last")]
    Last,
    /// One of the trailing weeks before the anchor
    #[serde(rename = "last-3")]
    Prior,
}

impl WeekLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekLabel::Last => "last",
            WeekLabel::Prior => "last-3",
        }
    }
}

impl fmt::Display for WeekLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO week identified by ISO year and week number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoWeekRef {
    pub year: i32,
    pub week: u32,
}

impl IsoWeekRef {
    pub fn of(day: NaiveDate) -> Self {
        let iso = day.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Monday of the week; `None` for week 53 of a 52-week year
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }
}

impl fmt::Display for IsoWeekRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Anchor week plus the number of weeks before it that belong to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub anchor: IsoWeekRef,
    pub trailing_weeks: u32,
    anchor_monday: NaiveDate,
}

impl Window {
    pub fn new(anchor: IsoWeekRef, trailing_weeks: u32) -> EtlResult<Self> {
        let anchor_monday = anchor
            .monday()
            .ok_or_else(|| EtlError::Anchor(format!("{} does not exist", anchor)))?;
        Ok(Self {
            anchor,
            trailing_weeks,
            anchor_monday,
        })
    }

    /// Label for a day, or `None` when it falls outside the window
    pub fn label(&self, day: NaiveDate) -> Option<WeekLabel> {
        let monday = day - chrono::Duration::days(day.weekday().num_days_from_monday() as i64);
        let weeks_before = (self.anchor_monday - monday).num_days() / 7;
        match weeks_before {
            0 => Some(WeekLabel::Last),
            n if n > 0 && n <= self.trailing_weeks as i64 => Some(WeekLabel::Prior),
            _ => None,
        }
    }
}

/// Pick the anchor week from configuration and the prints
///
/// - `latest`: ISO week of the most recent print
/// - week with year: taken as is
/// - week without year: ISO year of the most recent print in that week,
///   else of the most recent print
///
/// Returns `None` when the anchor depends on prints and there are none.
pub fn resolve_anchor(prints: &[PrintEvent], config: &WindowConfig) -> Option<IsoWeekRef> {
    let latest = prints.iter().map(|p| p.day).max();
    match (config.anchor, config.anchor_year) {
        (AnchorSetting::Latest, _) => latest.map(IsoWeekRef::of),
        (AnchorSetting::Week(week), Some(year)) => Some(IsoWeekRef { year, week }),
        (AnchorSetting::Week(week), None) => {
            let year = prints
                .iter()
                .map(|p| IsoWeekRef::of(p.day))
                .filter(|w| w.week == week)
                .map(|w| w.year)
                .max()
                .or_else(|| latest.map(|d| d.iso_week().year()))?;
            Some(IsoWeekRef { year, week })
        }
    }
}

/// Output row of the silver layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub day: NaiveDate,
    pub user_id: UserId,
    pub week_label: WeekLabel,
    pub value_prop_prints: String,
    pub value_prop_taps: Option<String>,
    pub value_prop_pays: Option<String>,
    pub clicked: u8,
    pub total: Option<f64>,
    /// Position of the matched pay in the pays input; one pay fanned out
    /// over several prints keeps the same id
    pub pay_id: Option<usize>,
}

/// Column order of the silver table
pub const JOINED_COLUMNS: [&str; 9] = [
    "day",
    "user_id",
    "week_label",
    "value_prop_prints",
    "value_prop_taps",
    "value_prop_pays",
    "clicked",
    "total",
    "pay_id",
];

/// Composite key `day ++ value_prop` used to decide whether a tap clicked a print
pub fn day_value_prop(day: NaiveDate, value_prop: &str) -> String {
    format!("{}{}", day.format("%Y-%m-%d"), value_prop)
}

/// Join prints with taps and pays inside the window
///
/// Every print yields one row per matching tap (or one row when there is
/// none), times one row per matching pay (or one row when there is none).
/// Rows keep the order of the prints.
pub fn join(prints: &[PrintEvent], taps: &[TapEvent], pays: &[PayEvent], window: &Window) -> Vec<JoinedRow> {
    let mut taps_by_key: HashMap<(UserId, NaiveDate), Vec<&TapEvent>> = HashMap::new();
    for tap in taps {
        taps_by_key.entry((tap.user_id, tap.day)).or_default().push(tap);
    }

    let mut pays_by_key: HashMap<(UserId, NaiveDate), Vec<(usize, &PayEvent)>> = HashMap::new();
    for (pay_id, pay) in pays.iter().enumerate() {
        pays_by_key
            .entry((pay.user_id, pay.pay_date))
            .or_default()
            .push((pay_id, pay));
    }

    let mut rows = Vec::new();
    for print in prints {
        let Some(week_label) = window.label(print.day) else {
            continue;
        };
        let key = (print.user_id, print.day);
        let print_key = day_value_prop(print.day, &print.value_prop);

        let tap_matches: Vec<Option<&TapEvent>> = match taps_by_key.get(&key) {
            Some(matches) => matches.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        let pay_matches: Vec<Option<(usize, &PayEvent)>> = match pays_by_key.get(&key) {
            Some(matches) => matches.iter().copied().map(Some).collect(),
            None => vec![None],
        };

        for tap in &tap_matches {
            let clicked = tap
                .map(|t| day_value_prop(t.day, &t.value_prop) == print_key)
                .unwrap_or(false);
            for pay in &pay_matches {
                rows.push(JoinedRow {
                    day: print.day,
                    user_id: print.user_id,
                    week_label,
                    value_prop_prints: print.value_prop.clone(),
                    value_prop_taps: tap.map(|t| t.value_prop.clone()),
                    value_prop_pays: pay.map(|(_, p)| p.value_prop.clone()),
                    clicked: u8::from(clicked),
                    total: pay.map(|(_, p)| p.total),
                    pay_id: pay.map(|(id, _)| id),
                });
            }
        }
    }
    rows
}

/// Anchor-week print in the shape of the raw prints feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorPrint {
    pub day: NaiveDate,
    pub event_data: AnchorPrintPayload,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorPrintPayload {
    pub value_prop: String,
}

/// Prints whose ISO week is the anchor week, in input order
pub fn anchor_week_prints(prints: &[PrintEvent], window: &Window) -> Vec<AnchorPrint> {
    prints
        .iter()
        .filter(|p| window.label(p.day) == Some(WeekLabel::Last))
        .map(|p| AnchorPrint {
            day: p.day,
            event_data: AnchorPrintPayload {
                value_prop: p.value_prop.clone(),
            },
            user_id: p.user_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn print(user_id: UserId, d: &str, vp: &str) -> PrintEvent {
        PrintEvent {
            user_id,
            day: day(d),
            value_prop: vp.to_string(),
        }
    }

    fn pay(user_id: UserId, d: &str, vp: &str, total: f64) -> PayEvent {
        PayEvent {
            user_id,
            pay_date: day(d),
            value_prop: vp.to_string(),
            total,
        }
    }

    fn window_49() -> Window {
        Window::new(IsoWeekRef { year: 2023, week: 49 }, 3).unwrap()
    }

    #[test]
    fn test_week_labels_cover_anchor_and_three_prior_weeks() {
        let window = window_49();
        // 2023-W49 is Mon 2023-12-04 .. Sun 2023-12-10
        assert_eq!(window.label(day("2023-12-04")), Some(WeekLabel::Last));
        assert_eq!(window.label(day("2023-12-10")), Some(WeekLabel::Last));
        assert_eq!(window.label(day("2023-12-03")), Some(WeekLabel::Prior)); // W48
        assert_eq!(window.label(day("2023-11-13")), Some(WeekLabel::Prior)); // W46
        assert_eq!(window.label(day("2023-11-12")), None); // W45
        assert_eq!(window.label(day("2023-12-11")), None); // W50
        assert_eq!(window.label(day("2022-12-05")), None); // W49 of the previous year
    }

    #[test]
    fn test_window_crossing_year_boundary() {
        let window = Window::new(IsoWeekRef { year: 2024, week: 2 }, 3).unwrap();
        assert_eq!(window.label(day("2024-01-08")), Some(WeekLabel::Last));
        assert_eq!(window.label(day("2024-01-01")), Some(WeekLabel::Prior)); // 2024-W01
        assert_eq!(window.label(day("2023-12-25")), Some(WeekLabel::Prior)); // 2023-W52
        assert_eq!(window.label(day("2023-12-18")), Some(WeekLabel::Prior)); // 2023-W51
        assert_eq!(window.label(day("2023-12-17")), None); // 2023-W50
    }

    #[test]
    fn test_nonexistent_anchor_week_is_error() {
        // 2023 has 52 ISO weeks
        assert!(matches!(
            Window::new(IsoWeekRef { year: 2023, week: 53 }, 3),
            Err(EtlError::Anchor(_))
        ));
    }

    #[test]
    fn test_resolve_anchor_modes() {
        let prints = vec![
            print(1, "2022-12-06", "A"), // 2022-W49
            print(1, "2023-11-21", "A"), // 2023-W47
            print(1, "2023-12-05", "A"), // 2023-W49
            print(1, "2023-12-12", "B"), // 2023-W50
        ];

        let latest = WindowConfig::default();
        assert_eq!(resolve_anchor(&prints, &latest), Some(IsoWeekRef { year: 2023, week: 50 }));

        let week_49 = WindowConfig {
            anchor: AnchorSetting::Week(49),
            ..WindowConfig::default()
        };
        assert_eq!(resolve_anchor(&prints, &week_49), Some(IsoWeekRef { year: 2023, week: 49 }));

        let week_10 = WindowConfig {
            anchor: AnchorSetting::Week(10),
            ..WindowConfig::default()
        };
        assert_eq!(resolve_anchor(&prints, &week_10), Some(IsoWeekRef { year: 2023, week: 10 }));

        let explicit = WindowConfig {
            anchor: AnchorSetting::Week(49),
            anchor_year: Some(2022),
            ..WindowConfig::default()
        };
        assert_eq!(resolve_anchor(&[], &explicit), Some(IsoWeekRef { year: 2022, week: 49 }));
        assert_eq!(resolve_anchor(&[], &latest), None);
    }

    #[test]
    fn test_clicked_only_for_matching_value_prop() {
        let prints = vec![print(1, "2023-12-05", "A"), print(2, "2023-12-05", "A")];
        let taps = vec![print(1, "2023-12-05", "A"), print(2, "2023-12-05", "B")];
        let rows = join(&prints, &taps, &[], &window_49());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].clicked, 1);
        assert_eq!(rows[0].value_prop_taps.as_deref(), Some("A"));
        assert_eq!(rows[1].clicked, 0);
        assert_eq!(rows[1].value_prop_taps.as_deref(), Some("B"));
    }

    #[test]
    fn test_tap_on_other_day_does_not_click() {
        let prints = vec![print(1, "2023-12-05", "A")];
        let taps = vec![print(1, "2023-12-06", "A")];
        let rows = join(&prints, &taps, &[], &window_49());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].clicked, 0);
        assert_eq!(rows[0].value_prop_taps, None);
    }

    #[test]
    fn test_multiple_taps_fan_out_without_dedup() {
        let prints = vec![print(1, "2023-12-05", "A")];
        let taps = vec![
            print(1, "2023-12-05", "A"),
            print(1, "2023-12-05", "B"),
            print(1, "2023-12-05", "A"),
        ];
        let rows = join(&prints, &taps, &[], &window_49());
        let clicks: Vec<u8> = rows.iter().map(|r| r.clicked).collect();
        assert_eq!(clicks, vec![1, 0, 1]);
    }

    #[test]
    fn test_pays_attach_by_user_and_day() {
        let prints = vec![print(1, "2023-12-05", "A"), print(1, "2023-12-06", "B")];
        let pays = vec![
            pay(1, "2023-12-05", "A", 10.0),
            pay(1, "2023-12-05", "C", 4.5),
            pay(2, "2023-12-06", "B", 99.0),
        ];
        let rows = join(&prints, &[], &pays, &window_49());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value_prop_pays.as_deref(), Some("A"));
        assert_eq!(rows[0].total, Some(10.0));
        assert_eq!(rows[1].value_prop_pays.as_deref(), Some("C"));
        assert_eq!(rows[1].total, Some(4.5));
        assert_eq!(rows[2].day, day("2023-12-06"));
        assert_eq!(rows[2].value_prop_pays, None);
        assert_eq!(rows[2].total, None);
        let ids: Vec<Option<usize>> = rows.iter().map(|r| r.pay_id).collect();
        assert_eq!(ids, vec![Some(0), Some(1), None]);
    }

    #[test]
    fn test_one_pay_shared_by_prints_keeps_its_id() {
        let prints = vec![print(1, "2023-11-22", "A"), print(1, "2023-11-22", "B")];
        let pays = vec![pay(1, "2023-11-22", "A", 10.0)];
        let rows = join(&prints, &[], &pays, &window_49());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pay_id, Some(0));
        assert_eq!(rows[1].pay_id, Some(0));
    }

    #[test]
    fn test_rows_outside_window_dropped_and_labelled() {
        let prints = vec![
            print(1, "2023-11-08", "A"), // W45
            print(1, "2023-11-22", "B"), // W47
            print(1, "2023-12-05", "C"), // W49
            print(1, "2023-12-12", "D"), // W50
        ];
        let rows = join(&prints, &[], &[], &window_49());
        let labels: Vec<(&str, WeekLabel)> = rows
            .iter()
            .map(|r| (r.value_prop_prints.as_str(), r.week_label))
            .collect();
        assert_eq!(labels, vec![("B", WeekLabel::Prior), ("C", WeekLabel::Last)]);
    }

    #[test]
    fn test_anchor_week_prints() {
        let prints = vec![print(1, "2023-11-22", "B"), print(2, "2023-12-05", "C")];
        let snapshot = anchor_week_prints(&prints, &window_49());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, 2);
        let json = serde_json::to_value(&snapshot[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"day": "2023-12-05", "event_data": {"value_prop": "C"}, "user_id": 2})
        );
    }

    #[test]
    fn test_day_value_prop_key() {
        assert_eq!(day_value_prop(day("2023-12-05"), "A"), "2023-12-05A");
    }
}
