//! Typed event records read from extracted canonical tables

use crate::error::{DateParseError, EtlError, EtlResult};
use crate::payload::VALUE_PROP_COLUMN;
use crate::table::CanonicalTable;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub type UserId = i64;

pub const USER_ID_COLUMN: &str = "user_id";
pub const DAY_COLUMN: &str = "day";
pub const PAY_DATE_COLUMN: &str = "pay_date";
pub const TOTAL_COLUMN: &str = "total";

/// A print (impression) or tap (click) after payload extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementEvent {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub value_prop: String,
}

pub type PrintEvent = EngagementEvent;
pub type TapEvent = EngagementEvent;

/// A completed payment
#[derive(Debug, Clone, PartialEq)]
pub struct PayEvent {
    pub user_id: UserId,
    pub pay_date: NaiveDate,
    pub value_prop: String,
    pub total: f64,
}

/// Read prints or taps from a table whose payload was already extracted
pub fn engagement_events(table: &CanonicalTable) -> EtlResult<Vec<EngagementEvent>> {
    let mut events = Vec::with_capacity(table.len());
    for (index, row) in table.rows.iter().enumerate() {
        let user_id = required(table, index, row.text(USER_ID_COLUMN), USER_ID_COLUMN)
            .and_then(|text| parse_user_id(table, index, &text))?;
        let day = parse_date_column(table, index, row.text(DAY_COLUMN), DAY_COLUMN)?;
        let value_prop = required(table, index, row.text(VALUE_PROP_COLUMN), VALUE_PROP_COLUMN)?;
        events.push(EngagementEvent {
            user_id,
            day,
            value_prop,
        });
    }
    Ok(events)
}

/// Read payments from the pays table
pub fn pay_events(table: &CanonicalTable) -> EtlResult<Vec<PayEvent>> {
    let mut events = Vec::with_capacity(table.len());
    for (index, row) in table.rows.iter().enumerate() {
        let user_id = required(table, index, row.text(USER_ID_COLUMN), USER_ID_COLUMN)
            .and_then(|text| parse_user_id(table, index, &text))?;
        let pay_date = parse_date_column(table, index, row.text(PAY_DATE_COLUMN), PAY_DATE_COLUMN)?;
        let value_prop = required(table, index, row.text(VALUE_PROP_COLUMN), VALUE_PROP_COLUMN)?;
        let total_text = required(table, index, row.text(TOTAL_COLUMN), TOTAL_COLUMN)?;
        let total = total_text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| EtlError::record(&table.name, index, format!("total {:?} is not a number", total_text)))?;
        events.push(PayEvent {
            user_id,
            pay_date,
            value_prop,
            total,
        });
    }
    Ok(events)
}

/// Calendar day from `YYYY-MM-DD`, a naive datetime, or an RFC 3339 instant
pub fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive())
}

fn required(table: &CanonicalTable, row: usize, value: Option<String>, column: &str) -> EtlResult<String> {
    value.ok_or_else(|| EtlError::record(&table.name, row, format!("missing {}", column)))
}

fn parse_date_column(table: &CanonicalTable, row: usize, value: Option<String>, column: &str) -> EtlResult<NaiveDate> {
    let text = value.unwrap_or_default();
    parse_day(&text).ok_or_else(|| {
        DateParseError {
            table: table.name.clone(),
            row,
            column: column.to_string(),
            value: text.clone(),
        }
        .into()
    })
}

/// Integer ids; tolerates a `.0` suffix left by float-typed writers
fn parse_user_id(table: &CanonicalTable, row: usize, text: &str) -> EtlResult<UserId> {
    let trimmed = text.trim();
    if let Ok(id) = trimmed.parse::<UserId>() {
        return Ok(id);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as UserId),
        _ => Err(EtlError::record(&table.name, row, format!("user_id {:?} is not an integer", text))),
    }
}
