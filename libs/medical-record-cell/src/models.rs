use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use shared_models::auth::{CurrentUser, Role};
use shared_models::error::AppError;
use shared_models::response::PageQuery;
use shared_utils::timestamp::parse_date;
use shared_utils::validation::Validator;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub appointment_id: Option<Uuid>,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub record_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub visit_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub symptoms: Option<Option<String>>,
    pub treatment: Option<Option<String>>,
    pub prescription: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub visit_date: Option<String>,
    #[serde(default)]
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordRequest {
    pub visit_date: Option<String>,
    pub diagnosis: Option<String>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAttachmentRequest {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

impl RecordListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_visit_date(validator: &mut Validator, raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    match parse_date(raw.trim()) {
        Ok(date) => {
            validator.not_future("visitDate", date, today);
            Some(date)
        }
        Err(_) => {
            validator.push(
                "visitDate",
                "Must be a valid date (YYYY-MM-DD)",
                Some(serde_json::Value::from(raw)),
            );
            None
        }
    }
}

/// The author of a new record: doctors write their own, admins name one.
fn resolve_author(
    validator: &mut Validator,
    author: &CurrentUser,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, AppError> {
    match author.role {
        Role::Doctor => match requested {
            Some(doctor_id) if doctor_id != author.id => Err(AppError::Forbidden(
                "Doctors can only create records under their own name".to_string(),
            )),
            _ => Ok(Some(author.id)),
        },
        _ => {
            validator.check(requested.is_some(), "doctorId", "doctorId is required");
            Ok(requested)
        }
    }
}

impl CreateRecordRequest {
    pub fn validate(self, author: &CurrentUser, today: NaiveDate) -> Result<NewRecord, AppError> {
        let mut validator = Validator::new();
        validator.check(self.patient_id.is_some(), "patientId", "patientId is required");
        let doctor_id = resolve_author(&mut validator, author, self.doctor_id)?;
        validator.required("diagnosis", &self.diagnosis);
        let visit_date = match self.visit_date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => check_visit_date(&mut validator, raw, today),
            None => Some(today),
        };
        validator.finish()?;

        match (self.patient_id, doctor_id, visit_date) {
            (Some(patient_id), Some(doctor_id), Some(visit_date)) => Ok(NewRecord {
                patient_id,
                doctor_id,
                appointment_id: self.appointment_id,
                visit_date,
                diagnosis: self.diagnosis.trim().to_string(),
                symptoms: blank_to_none(self.symptoms),
                treatment: blank_to_none(self.treatment),
                prescription: blank_to_none(self.prescription),
                notes: blank_to_none(self.notes),
            }),
            _ => Err(AppError::BadRequest("Incomplete medical record".to_string())),
        }
    }
}

impl UpdateRecordRequest {
    pub fn validate(self, today: NaiveDate) -> Result<RecordChanges, AppError> {
        let mut validator = Validator::new();
        if let Some(diagnosis) = &self.diagnosis {
            validator.required("diagnosis", diagnosis);
        }
        let visit_date = self
            .visit_date
            .as_deref()
            .and_then(|raw| check_visit_date(&mut validator, raw, today));
        validator.finish()?;

        Ok(RecordChanges {
            visit_date,
            diagnosis: self.diagnosis.map(|d| d.trim().to_string()),
            symptoms: self.symptoms.map(|v| blank_to_none(Some(v))),
            treatment: self.treatment.map(|v| blank_to_none(Some(v))),
            prescription: self.prescription.map(|v| blank_to_none(Some(v))),
            notes: self.notes.map(|v| blank_to_none(Some(v))),
        })
    }
}

/// Records may be edited by their author or by an admin.
pub fn ensure_can_edit(user: &CurrentUser, record: &MedicalRecord) -> Result<(), AppError> {
    if user.is_admin() || record.doctor_id == user.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the authoring doctor or an admin can modify this record".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            name: "User".into(),
            role,
        }
    }

    fn request() -> CreateRecordRequest {
        CreateRecordRequest {
            patient_id: Some(Uuid::new_v4()),
            diagnosis: "Seasonal influenza".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_doctor_authors_own_record() {
        let doctor = user(Role::Doctor);
        let record = request().validate(&doctor, today()).unwrap();
        assert_eq!(record.doctor_id, doctor.id);
        assert_eq!(record.visit_date, today());
    }

    #[test]
    fn test_doctor_cannot_write_for_colleague() {
        let doctor = user(Role::Doctor);
        let err = CreateRecordRequest {
            doctor_id: Some(Uuid::new_v4()),
            ..request()
        }
        .validate(&doctor, today())
        .unwrap_err();
        assert_matches!(err, AppError::Forbidden(_));
    }

    #[test]
    fn test_admin_must_name_doctor() {
        let admin = user(Role::Admin);
        let err = request().validate(&admin, today()).unwrap_err();
        assert_matches!(
            err,
            AppError::Validation { ref errors, .. } if errors[0].field == "doctorId"
        );

        let doctor_id = Uuid::new_v4();
        let record = CreateRecordRequest {
            doctor_id: Some(doctor_id),
            ..request()
        }
        .validate(&admin, today())
        .unwrap();
        assert_eq!(record.doctor_id, doctor_id);
    }

    #[test]
    fn test_future_visit_date_is_rejected() {
        let err = CreateRecordRequest {
            visit_date: Some("2024-06-16".into()),
            ..request()
        }
        .validate(&user(Role::Doctor), today())
        .unwrap_err();
        assert_matches!(
            err,
            AppError::Validation { ref errors, .. } if errors[0].field == "visitDate"
        );
    }

    #[test]
    fn test_only_author_or_admin_can_edit() {
        let author = user(Role::Doctor);
        let now = chrono::Utc::now().naive_utc();
        let record = MedicalRecord {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_name: "Ada Lovelace".into(),
            doctor_id: author.id,
            doctor_name: "Dr. Who".into(),
            appointment_id: None,
            visit_date: today(),
            diagnosis: "Flu".into(),
            symptoms: None,
            treatment: None,
            prescription: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert!(ensure_can_edit(&author, &record).is_ok());
        assert!(ensure_can_edit(&user(Role::Admin), &record).is_ok());
        assert_matches!(ensure_can_edit(&user(Role::Doctor), &record), Err(AppError::Forbidden(_)));
    }
}
