use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::timestamp::parse_date;

/// Reports default to the last 30 days, today included.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Longest range a report may span.
pub const MAX_RANGE_DAYS: i64 = 366 * 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub total_patients: i64,
    pub total_doctors: i64,
    pub today_appointments: i64,
    pub pending_appointments: i64,
    pub revenue_collected: f64,
    pub outstanding_balance: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecentAppointment {
    pub id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_at: NaiveDateTime,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecentPatient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub period: String,
    pub total: f64,
    pub payments: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DoctorCount {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub total: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCount {
    pub period: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GenderCount {
    pub gender: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    Day,
    Month,
}

impl GroupBy {
    /// `to_char` pattern for the period label.
    pub fn pattern(self) -> &'static str {
        match self {
            GroupBy::Day => "YYYY-MM-DD",
            GroupBy::Month => "YYYY-MM",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Day => "day",
            GroupBy::Month => "month",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(GroupBy::Day),
            "month" => Ok(GroupBy::Month),
            _ => Err(AppError::field("groupBy", "groupBy must be one of: day, month")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub group_by: Option<String>,
}

/// Inclusive range of display-zone dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

fn parse_bound(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_date(value)
            .map(Some)
            .map_err(|_| AppError::field(field, "Must be a valid date (YYYY-MM-DD)")),
        None => Ok(None),
    }
}

impl ReportQuery {
    pub fn range(&self, today: NaiveDate) -> Result<ReportRange, AppError> {
        let to = parse_bound("to", self.to.as_deref())?.unwrap_or(today);
        let from = parse_bound("from", self.from.as_deref())?
            .unwrap_or_else(|| to - Duration::days(DEFAULT_RANGE_DAYS - 1));

        if from > to {
            return Err(AppError::field("from", "from must not be after to"));
        }
        if (to - from).num_days() >= MAX_RANGE_DAYS {
            return Err(AppError::field("from", "Report range is too long"));
        }
        Ok(ReportRange { from, to })
    }

    pub fn group_by(&self) -> Result<GroupBy, AppError> {
        match self.group_by.as_deref().filter(|g| !g.is_empty()) {
            Some(raw) => raw.parse(),
            None => Ok(GroupBy::default()),
        }
    }
}
