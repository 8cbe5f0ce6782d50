// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::response::PageQuery;
use shared_utils::timestamp::{combine_date_and_time_naive, parse_date, parse_time, parse_zone};
use shared_utils::validation::Validator;

pub const DEFAULT_DURATION_MINUTES: i32 = 30;
pub const MAX_DURATION_MINUTES: i32 = 480;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Statuses that hold a slot in the doctor's calendar.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.occupies_slot()
    }

    /// Open appointments may move to any status; finished ones are frozen.
    /// Re-applying the current status is always accepted.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        *self == next || !self.is_terminal()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                AppError::validation(vec![shared_models::error::FieldError::new(
                    "status",
                    format!(
                        "Must be one of: {}",
                        Self::ALL.map(|s| s.as_str()).join(", ")
                    ),
                )
                .with_value(value)])
            })
    }
}

/// Appointment joined with the patient and doctor names shown in lists.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub patient_phone: Option<String>,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub appointment_at: NaiveDateTime,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A validated booking, `appointment_at` already in UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_at: NaiveDateTime,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn end_time(&self) -> NaiveDateTime {
        self.appointment_at + Duration::minutes(i64::from(self.duration_minutes))
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub appointment_date: String,
    #[serde(default)]
    pub appointment_time: String,
    pub timezone: Option<String>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub timezone: Option<String>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub date: Option<String>,
    pub status: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

impl AppointmentListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

fn parse_id(validator: &mut Validator, field: &str, raw: Option<&str>) -> Option<Uuid> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            validator.push(field, &format!("{} is required", field), None);
            None
        }
        Some(value) => match Uuid::parse_str(value) {
            Ok(id) => Some(id),
            Err(_) => {
                validator.push(field, "Must be a valid id", Some(serde_json::Value::from(value)));
                None
            }
        },
    }
}

fn check_duration(validator: &mut Validator, duration: i32) {
    validator.check(
        (1..=MAX_DURATION_MINUTES).contains(&duration),
        "durationMinutes",
        &format!("Must be between 1 and {} minutes", MAX_DURATION_MINUTES),
    );
}

/// Booking zone: the one named in the request, else the display zone.
fn check_zone(validator: &mut Validator, requested: Option<&str>, default_zone: Tz) -> Tz {
    match requested.map(str::trim).filter(|z| !z.is_empty()) {
        None => default_zone,
        Some(name) => parse_zone(name).unwrap_or_else(|_| {
            validator.push(
                "timezone",
                "Must be an IANA time zone name",
                Some(serde_json::Value::from(name)),
            );
            default_zone
        }),
    }
}

fn check_date_and_time(validator: &mut Validator, date: &str, time: &str) {
    if parse_date(date.trim()).is_err() {
        validator.push(
            "appointmentDate",
            "Must be a valid date (YYYY-MM-DD)",
            Some(serde_json::Value::from(date)),
        );
    }
    if parse_time(time.trim()).is_err() {
        validator.push(
            "appointmentTime",
            "Must be a valid time (HH:mm)",
            Some(serde_json::Value::from(time)),
        );
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CreateAppointmentRequest {
    pub fn validate(self, default_zone: Tz) -> Result<NewAppointment, AppError> {
        let mut validator = Validator::new();
        let patient_id = parse_id(&mut validator, "patientId", self.patient_id.as_deref());
        let doctor_id = parse_id(&mut validator, "doctorId", self.doctor_id.as_deref());
        check_date_and_time(&mut validator, &self.appointment_date, &self.appointment_time);
        let zone = check_zone(&mut validator, self.timezone.as_deref(), default_zone);
        let duration_minutes = self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        check_duration(&mut validator, duration_minutes);
        validator.finish()?;

        let appointment_at = combine_date_and_time_naive(
            self.appointment_date.trim(),
            self.appointment_time.trim(),
            zone,
        )?;

        match (patient_id, doctor_id) {
            (Some(patient_id), Some(doctor_id)) => Ok(NewAppointment {
                patient_id,
                doctor_id,
                appointment_at,
                duration_minutes,
                reason: trimmed(self.reason),
                notes: trimmed(self.notes),
            }),
            _ => Err(AppError::BadRequest("patientId and doctorId are required".to_string())),
        }
    }
}

impl UpdateAppointmentRequest {
    /// Applies the edit on top of `current`. Rescheduling needs both the date
    /// and the time, interpreted in the request zone.
    pub fn apply_to(
        self,
        current: &Appointment,
        default_zone: Tz,
    ) -> Result<NewAppointment, AppError> {
        let mut validator = Validator::new();
        let patient_id = match self.patient_id.as_deref() {
            Some(raw) => parse_id(&mut validator, "patientId", Some(raw)),
            None => Some(current.patient_id),
        };
        let doctor_id = match self.doctor_id.as_deref() {
            Some(raw) => parse_id(&mut validator, "doctorId", Some(raw)),
            None => Some(current.doctor_id),
        };
        let zone = check_zone(&mut validator, self.timezone.as_deref(), default_zone);
        let reschedule = match (&self.appointment_date, &self.appointment_time) {
            (Some(date), Some(time)) => {
                check_date_and_time(&mut validator, date, time);
                Some((date.trim().to_string(), time.trim().to_string()))
            }
            (None, None) => None,
            (Some(_), None) => {
                validator.push(
                    "appointmentTime",
                    "appointmentTime is required when rescheduling",
                    None,
                );
                None
            }
            (None, Some(_)) => {
                validator.push(
                    "appointmentDate",
                    "appointmentDate is required when rescheduling",
                    None,
                );
                None
            }
        };
        let duration_minutes = self.duration_minutes.unwrap_or(current.duration_minutes);
        check_duration(&mut validator, duration_minutes);
        validator.finish()?;

        let appointment_at = match reschedule {
            Some((date, time)) => combine_date_and_time_naive(&date, &time, zone)?,
            None => current.appointment_at,
        };

        match (patient_id, doctor_id) {
            (Some(patient_id), Some(doctor_id)) => Ok(NewAppointment {
                patient_id,
                doctor_id,
                appointment_at,
                duration_minutes,
                reason: match self.reason {
                    Some(reason) => trimmed(Some(reason)),
                    None => current.reason.clone(),
                },
                notes: match self.notes {
                    Some(notes) => trimmed(Some(notes)),
                    None => current.notes.clone(),
                },
            }),
            _ => Err(AppError::BadRequest("patientId and doctorId are required".to_string())),
        }
    }
}
