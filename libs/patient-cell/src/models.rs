use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::response::PageQuery;
use shared_utils::timestamp::parse_date;
use shared_utils::validation::Validator;

pub const GENDERS: [&str; 3] = ["male", "female", "other"];
pub const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const SORTABLE_COLUMNS: [&str; 5] =
    ["first_name", "last_name", "date_of_birth", "created_at", "updated_at"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn age_on(&self, today: NaiveDate) -> i32 {
        let mut years = today.year() - self.date_of_birth.year();
        if (today.month(), today.day()) < (self.date_of_birth.month(), self.date_of_birth.day()) {
            years -= 1;
        }
        years.max(0)
    }
}

/// Validated column values for an insert.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PatientChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub blood_group: Option<Option<String>>,
    pub allergies: Option<Option<String>>,
    pub emergency_contact_name: Option<Option<String>>,
    pub emergency_contact_phone: Option<Option<String>>,
}

impl PatientChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.blood_group.is_none()
            && self.allergies.is_none()
            && self.emergency_contact_name.is_none()
            && self.emergency_contact_phone.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub gender: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl PatientListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn descending(&self) -> bool {
        !matches!(self.order.as_deref(), Some(o) if o.eq_ignore_ascii_case("asc"))
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_date_of_birth(
    validator: &mut Validator,
    raw: &str,
    today: NaiveDate,
) -> Option<NaiveDate> {
    match parse_date(raw.trim()) {
        Ok(date) => {
            validator.not_future("dateOfBirth", date, today);
            Some(date)
        }
        Err(_) => {
            validator.push(
                "dateOfBirth",
                "Must be a valid date (YYYY-MM-DD)",
                Some(serde_json::Value::from(raw)),
            );
            None
        }
    }
}

fn check_optional_blood_group(validator: &mut Validator, blood_group: Option<&str>) {
    if let Some(group) = blood_group.map(str::trim).filter(|g| !g.is_empty()) {
        validator.one_of("bloodGroup", group, &BLOOD_GROUPS);
    }
}

impl CreatePatientRequest {
    pub fn validate(self, today: NaiveDate) -> Result<NewPatient, AppError> {
        let mut validator = Validator::new();
        validator
            .required("firstName", &self.first_name)
            .max_length("firstName", &self.first_name, 80)
            .required("lastName", &self.last_name)
            .max_length("lastName", &self.last_name, 80)
            .one_of("gender", self.gender.trim(), &GENDERS)
            .phone("phone", self.phone.trim())
            .optional_email("email", self.email.as_deref())
            .optional_phone("emergencyContactPhone", self.emergency_contact_phone.as_deref());
        check_optional_blood_group(&mut validator, self.blood_group.as_deref());
        let date_of_birth = check_date_of_birth(&mut validator, &self.date_of_birth, today);
        validator.finish()?;
        let date_of_birth = date_of_birth
            .ok_or_else(|| AppError::field("dateOfBirth", "dateOfBirth is required"))?;

        Ok(NewPatient {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            date_of_birth,
            gender: self.gender.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: blank_to_none(self.email).map(|e| e.to_lowercase()),
            address: blank_to_none(self.address),
            blood_group: blank_to_none(self.blood_group),
            allergies: blank_to_none(self.allergies),
            emergency_contact_name: blank_to_none(self.emergency_contact_name),
            emergency_contact_phone: blank_to_none(self.emergency_contact_phone),
        })
    }
}

impl UpdatePatientRequest {
    /// Absent fields stay untouched; optional fields sent blank are cleared.
    pub fn validate(self, today: NaiveDate) -> Result<PatientChanges, AppError> {
        let mut validator = Validator::new();
        if let Some(first_name) = &self.first_name {
            validator.required("firstName", first_name).max_length("firstName", first_name, 80);
        }
        if let Some(last_name) = &self.last_name {
            validator.required("lastName", last_name).max_length("lastName", last_name, 80);
        }
        if let Some(gender) = &self.gender {
            validator.one_of("gender", gender.trim(), &GENDERS);
        }
        if let Some(phone) = &self.phone {
            validator.phone("phone", phone.trim());
        }
        validator
            .optional_email("email", self.email.as_deref())
            .optional_phone("emergencyContactPhone", self.emergency_contact_phone.as_deref());
        check_optional_blood_group(&mut validator, self.blood_group.as_deref());
        let date_of_birth = self
            .date_of_birth
            .as_deref()
            .and_then(|raw| check_date_of_birth(&mut validator, raw, today));
        validator.finish()?;

        Ok(PatientChanges {
            first_name: self.first_name.map(|v| v.trim().to_string()),
            last_name: self.last_name.map(|v| v.trim().to_string()),
            date_of_birth,
            gender: self.gender.map(|v| v.trim().to_string()),
            phone: self.phone.map(|v| v.trim().to_string()),
            email: self.email.map(|v| blank_to_none(Some(v)).map(|e| e.to_lowercase())),
            address: self.address.map(|v| blank_to_none(Some(v))),
            blood_group: self.blood_group.map(|v| blank_to_none(Some(v))),
            allergies: self.allergies.map(|v| blank_to_none(Some(v))),
            emergency_contact_name: self.emergency_contact_name.map(|v| blank_to_none(Some(v))),
            emergency_contact_phone: self.emergency_contact_phone.map(|v| blank_to_none(Some(v))),
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientAppointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub appointment_at: NaiveDateTime,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: String,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientInvoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientRecord {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub created_at: NaiveDateTime,
}
