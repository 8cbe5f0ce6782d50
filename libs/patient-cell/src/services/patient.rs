use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::timestamp::now_reference;

use crate::models::{
    NewPatient, Patient, PatientAppointment, PatientChanges, PatientInvoice, PatientRecord,
};

const PATIENT_COLUMNS: &str = "id, first_name, last_name, date_of_birth, gender, phone, email, \
    address, blood_group, allergies, emergency_contact_name, emergency_contact_phone, \
    created_by, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct PatientFilters {
    pub search: Option<String>,
    pub gender: Option<String>,
}

pub struct PatientService {
    db: PgPool,
}

impl PatientService {
    pub fn new(db: &PgPool) -> Self {
        Self { db: db.clone() }
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filters: &'a PatientFilters) {
        builder.push(" WHERE 1 = 1");
        if let Some(gender) = filters.gender.as_deref().filter(|g| !g.is_empty()) {
            builder.push(" AND gender = ").push_bind(gender);
        }
        if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let like = format!("%{}%", search);
            builder
                .push(" AND (first_name ILIKE ")
                .push_bind(like.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(like.clone())
                .push(" OR (first_name || ' ' || last_name) ILIKE ")
                .push_bind(like.clone())
                .push(" OR phone ILIKE ")
                .push_bind(like.clone())
                .push(" OR email ILIKE ")
                .push_bind(like)
                .push(")");
        }
    }

    /// `sort_column` must come from the whitelist in `models::SORTABLE_COLUMNS`.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: &PatientFilters,
        sort_column: &'static str,
        descending: bool,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Patient>, u64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM patients");
        Self::push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM patients", PATIENT_COLUMNS));
        Self::push_filters(&mut query, filters);
        query
            .push(format!(
                " ORDER BY {} {} LIMIT ",
                sort_column,
                if descending { "DESC" } else { "ASC" }
            ))
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let patients = query.build_query_as::<Patient>().fetch_all(&self.db).await?;

        Ok((patients, total.max(0) as u64))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>, AppError> {
        let sql = format!("SELECT {} FROM patients WHERE id = $1", PATIENT_COLUMNS);
        let patient = sqlx::query_as::<_, Patient>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(patient)
    }

    pub async fn get(&self, id: Uuid) -> Result<Patient, AppError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))
    }

    #[instrument(skip(self, patient))]
    pub async fn create(&self, patient: NewPatient, created_by: Uuid) -> Result<Patient, AppError> {
        debug!("Creating patient {} {}", patient.first_name, patient.last_name);
        let sql = format!(
            "INSERT INTO patients (id, first_name, last_name, date_of_birth, gender, phone, \
             email, address, blood_group, allergies, emergency_contact_name, \
             emergency_contact_phone, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14) \
             RETURNING {}",
            PATIENT_COLUMNS
        );
        let row = sqlx::query_as::<_, Patient>(&sql)
            .bind(Uuid::new_v4())
            .bind(&patient.first_name)
            .bind(&patient.last_name)
            .bind(patient.date_of_birth)
            .bind(&patient.gender)
            .bind(&patient.phone)
            .bind(&patient.email)
            .bind(&patient.address)
            .bind(&patient.blood_group)
            .bind(&patient.allergies)
            .bind(&patient.emergency_contact_name)
            .bind(&patient.emergency_contact_phone)
            .bind(created_by)
            .bind(now_reference())
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, changes: PatientChanges) -> Result<Patient, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE patients SET updated_at = ");
        builder.push_bind(now_reference());
        if let Some(first_name) = changes.first_name {
            builder.push(", first_name = ").push_bind(first_name);
        }
        if let Some(last_name) = changes.last_name {
            builder.push(", last_name = ").push_bind(last_name);
        }
        if let Some(date_of_birth) = changes.date_of_birth {
            builder.push(", date_of_birth = ").push_bind(date_of_birth);
        }
        if let Some(gender) = changes.gender {
            builder.push(", gender = ").push_bind(gender);
        }
        if let Some(phone) = changes.phone {
            builder.push(", phone = ").push_bind(phone);
        }
        if let Some(email) = changes.email {
            builder.push(", email = ").push_bind(email);
        }
        if let Some(address) = changes.address {
            builder.push(", address = ").push_bind(address);
        }
        if let Some(blood_group) = changes.blood_group {
            builder.push(", blood_group = ").push_bind(blood_group);
        }
        if let Some(allergies) = changes.allergies {
            builder.push(", allergies = ").push_bind(allergies);
        }
        if let Some(name) = changes.emergency_contact_name {
            builder.push(", emergency_contact_name = ").push_bind(name);
        }
        if let Some(phone) = changes.emergency_contact_phone {
            builder.push(", emergency_contact_phone = ").push_bind(phone);
        }
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", PATIENT_COLUMNS));

        builder
            .build_query_as::<Patient>()
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))
    }

    /// Fails with `DanglingReference` while appointments, invoices or records
    /// still point at the patient.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Patient not found".to_string()));
        }
        Ok(())
    }

    pub async fn appointments(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<PatientAppointment>, AppError> {
        let rows = sqlx::query_as::<_, PatientAppointment>(
            "SELECT a.id, a.doctor_id, u.name AS doctor_name, a.appointment_at, \
             a.duration_minutes, a.reason, a.status, a.completed_at \
             FROM appointments a JOIN users u ON u.id = a.doctor_id \
             WHERE a.patient_id = $1 ORDER BY a.appointment_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn invoices(&self, patient_id: Uuid) -> Result<Vec<PatientInvoice>, AppError> {
        let rows = sqlx::query_as::<_, PatientInvoice>(
            "SELECT id, invoice_number, total_amount, paid_amount, status, due_date, created_at \
             FROM invoices WHERE patient_id = $1 ORDER BY created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn medical_records(&self, patient_id: Uuid) -> Result<Vec<PatientRecord>, AppError> {
        let rows = sqlx::query_as::<_, PatientRecord>(
            "SELECT m.id, m.doctor_id, u.name AS doctor_name, m.visit_date, m.diagnosis, \
             m.treatment, m.created_at \
             FROM medical_records m JOIN users u ON u.id = m.doctor_id \
             WHERE m.patient_id = $1 ORDER BY m.visit_date DESC, m.created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
