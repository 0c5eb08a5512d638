//! AggregationEngine: the gold analytics over joined rows
//!
//! - Task 1: click flag per print (pass-through projection)
//! - Task 2: views per value prop for each user, prior weeks only
//! - Task 3: click flag per value prop for each user, prior weeks only
//! - Task 4/5: payment count and sum per value prop for each user, prior weeks only
//!
//! Mappings only contain value props observed for the user; there are no
//! zero entries.

use crate::records::UserId;
use crate::window::{JoinedRow, WeekLabel};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use vpa_common::config::{AggregationConfig, ClickReduction, PaymentAggregation};

/// Task 1 row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickAnnotation {
    pub day: NaiveDate,
    pub user_id: UserId,
    pub value_prop: String,
    pub clicked: u8,
}

/// Task 2 row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewCounts {
    pub user_id: UserId,
    pub week_label: WeekLabel,
    #[serde(serialize_with = "as_json_text")]
    pub value_prop_view_counts: BTreeMap<String, u64>,
}

/// Task 3 row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickMap {
    pub user_id: UserId,
    #[serde(serialize_with = "as_json_text")]
    pub value_prop_click_map: BTreeMap<String, u8>,
}

/// Task 4/5 row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub user_id: UserId,
    #[serde(serialize_with = "as_json_text")]
    pub count_of_pays_for_each_value_prop: BTreeMap<String, u64>,
    #[serde(serialize_with = "as_json_text")]
    pub sum_of_pays_for_each_value_prop: BTreeMap<String, f64>,
}

pub const TASK2_COLUMNS: [&str; 3] = ["user_id", "week_label", "value_prop_view_counts"];
pub const TASK3_COLUMNS: [&str; 2] = ["user_id", "value_prop_click_map"];
pub const TASK4_5_COLUMNS: [&str; 3] = [
    "user_id",
    "count_of_pays_for_each_value_prop",
    "sum_of_pays_for_each_value_prop",
];

/// Mappings are stored as JSON object text inside a single CSV cell
fn as_json_text<T: Serialize, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    let text = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

/// All four gold views
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoldReport {
    pub click_annotations: Vec<ClickAnnotation>,
    pub view_counts: Vec<ViewCounts>,
    pub click_maps: Vec<ClickMap>,
    pub payment_summaries: Vec<PaymentSummary>,
}

/// Result of aggregating the silver table
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    /// Joined table was empty; nothing was computed
    NoData,
    Report(GoldReport),
}

/// Run the four tasks
pub fn aggregate(rows: &[JoinedRow], config: &AggregationConfig) -> AggregationOutcome {
    if rows.is_empty() {
        return AggregationOutcome::NoData;
    }
    AggregationOutcome::Report(GoldReport {
        click_annotations: annotate_clicks(rows),
        view_counts: count_views(rows),
        click_maps: map_clicks(rows, config.click_reduction),
        payment_summaries: summarize_payments(rows, config.payment_aggregation),
    })
}

/// Task 1: one row per joined row, unchanged
pub fn annotate_clicks(rows: &[JoinedRow]) -> Vec<ClickAnnotation> {
    rows.iter()
        .map(|row| ClickAnnotation {
            day: row.day,
            user_id: row.user_id,
            value_prop: row.value_prop_prints.clone(),
            clicked: row.clicked,
        })
        .collect()
}

/// Task 2: count prints per value prop by (user, week label), keep prior weeks
pub fn count_views(rows: &[JoinedRow]) -> Vec<ViewCounts> {
    let mut groups: BTreeMap<(UserId, WeekLabel), BTreeMap<String, u64>> = BTreeMap::new();
    for row in rows {
        *groups
            .entry((row.user_id, row.week_label))
            .or_default()
            .entry(row.value_prop_prints.clone())
            .or_insert(0) += 1;
    }

    groups
        .into_iter()
        .filter(|((_, label), _)| *label == WeekLabel::Prior)
        .map(|((user_id, week_label), counts)| ViewCounts {
            user_id,
            week_label,
            value_prop_view_counts: counts,
        })
        .collect()
}

/// Task 3: one click flag per (user, value prop) over prior weeks
pub fn map_clicks(rows: &[JoinedRow], reduction: ClickReduction) -> Vec<ClickMap> {
    let mut groups: BTreeMap<UserId, BTreeMap<String, u8>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.week_label == WeekLabel::Prior) {
        let flags = groups.entry(row.user_id).or_default();
        match reduction {
            ClickReduction::LastSeen => {
                flags.insert(row.value_prop_prints.clone(), row.clicked);
            }
            ClickReduction::Any => {
                let flag = flags.entry(row.value_prop_prints.clone()).or_insert(0);
                *flag = (*flag).max(row.clicked);
            }
        }
    }

    groups
        .into_iter()
        .map(|(user_id, value_prop_click_map)| ClickMap {
            user_id,
            value_prop_click_map,
        })
        .collect()
}

/// Task 4/5: payment count and sum per (user, value prop) over prior weeks
///
/// Rows without a payment are ignored. In `Distinct` mode identical totals
/// inside a group count once, so two same-day payments of equal amount merge.
/// In `Exact` mode every pay counts once: rows repeating a `pay_id` (one pay
/// joined to several prints or taps) are collapsed.
pub fn summarize_payments(rows: &[JoinedRow], mode: PaymentAggregation) -> Vec<PaymentSummary> {
    let mut groups: BTreeMap<(UserId, WeekLabel, String), Vec<f64>> = BTreeMap::new();
    let mut seen_pays: HashSet<usize> = HashSet::new();
    for row in rows {
        let (Some(value_prop), Some(total)) = (&row.value_prop_pays, row.total) else {
            continue;
        };
        if let Some(pay_id) = row.pay_id {
            if !seen_pays.insert(pay_id) {
                continue;
            }
        }
        groups
            .entry((row.user_id, row.week_label, value_prop.clone()))
            .or_default()
            .push(total);
    }

    let mut summaries: BTreeMap<UserId, PaymentSummary> = BTreeMap::new();
    for ((user_id, week_label, value_prop), mut totals) in groups {
        if week_label != WeekLabel::Prior {
            continue;
        }
        if mode == PaymentAggregation::Distinct {
            totals.sort_by(f64::total_cmp);
            totals.dedup();
        }
        let count = totals.len() as u64;
        let sum: f64 = totals.iter().sum();

        let summary = summaries.entry(user_id).or_insert_with(|| PaymentSummary {
            user_id,
            count_of_pays_for_each_value_prop: BTreeMap::new(),
            sum_of_pays_for_each_value_prop: BTreeMap::new(),
        });
        summary
            .count_of_pays_for_each_value_prop
            .insert(value_prop.clone(), count);
        summary.sum_of_pays_for_each_value_prop.insert(value_prop, sum);
    }

    summaries.into_values().collect()
}
