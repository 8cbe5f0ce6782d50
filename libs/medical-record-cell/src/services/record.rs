use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::timestamp::now_reference;

use crate::models::{Attachment, MedicalRecord, NewRecord, RecordChanges};
use crate::services::storage::{AttachmentStore, DecodedUpload};

const RECORD_SELECT: &str = "SELECT m.id, m.patient_id, \
     (p.first_name || ' ' || p.last_name) AS patient_name, m.doctor_id, u.name AS doctor_name, \
     m.appointment_id, m.visit_date, m.diagnosis, m.symptoms, m.treatment, m.prescription, \
     m.notes, m.created_at, m.updated_at \
     FROM medical_records m \
     JOIN patients p ON p.id = m.patient_id \
     JOIN users u ON u.id = m.doctor_id";

const ATTACHMENT_COLUMNS: &str =
    "id, record_id, file_name, mime_type, size_bytes, storage_path, uploaded_by, uploaded_at";

#[derive(Debug, Clone, Default)]
pub struct RecordFilters {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

pub struct MedicalRecordService {
    db: PgPool,
}

impl MedicalRecordService {
    pub fn new(db: &PgPool) -> Self {
        Self { db: db.clone() }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &RecordFilters) {
        builder.push(" WHERE 1 = 1");
        if let Some(patient_id) = filters.patient_id {
            builder.push(" AND m.patient_id = ").push_bind(patient_id);
        }
        if let Some(doctor_id) = filters.doctor_id {
            builder.push(" AND m.doctor_id = ").push_bind(doctor_id);
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: &RecordFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MedicalRecord>, u64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM medical_records m");
        Self::push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut query = QueryBuilder::<Postgres>::new(RECORD_SELECT);
        Self::push_filters(&mut query, filters);
        query
            .push(" ORDER BY m.visit_date DESC, m.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let records = query.build_query_as::<MedicalRecord>().fetch_all(&self.db).await?;

        Ok((records, total.max(0) as u64))
    }

    pub async fn get(&self, id: Uuid) -> Result<MedicalRecord, AppError> {
        let sql = format!("{} WHERE m.id = $1", RECORD_SELECT);
        sqlx::query_as::<_, MedicalRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Medical record not found".to_string()))
    }

    #[instrument(
        skip(self, record),
        fields(patient_id = %record.patient_id, doctor_id = %record.doctor_id)
    )]
    pub async fn create(&self, record: NewRecord) -> Result<MedicalRecord, AppError> {
        let is_doctor: Option<bool> =
            sqlx::query_scalar("SELECT role = 'doctor' FROM users WHERE id = $1")
                .bind(record.doctor_id)
                .fetch_optional(&self.db)
                .await?;
        if is_doctor != Some(true) {
            return Err(AppError::DanglingReference("Doctor not found".to_string()));
        }

        let id = Uuid::new_v4();
        let now = now_reference();
        sqlx::query(
            "INSERT INTO medical_records (id, patient_id, doctor_id, appointment_id, visit_date, \
             diagnosis, symptoms, treatment, prescription, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
        )
        .bind(id)
        .bind(record.patient_id)
        .bind(record.doctor_id)
        .bind(record.appointment_id)
        .bind(record.visit_date)
        .bind(&record.diagnosis)
        .bind(&record.symptoms)
        .bind(&record.treatment)
        .bind(&record.prescription)
        .bind(&record.notes)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(id).await
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: RecordChanges,
    ) -> Result<MedicalRecord, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE medical_records SET updated_at = ");
        builder.push_bind(now_reference());
        if let Some(visit_date) = changes.visit_date {
            builder.push(", visit_date = ").push_bind(visit_date);
        }
        if let Some(diagnosis) = changes.diagnosis {
            builder.push(", diagnosis = ").push_bind(diagnosis);
        }
        if let Some(symptoms) = changes.symptoms {
            builder.push(", symptoms = ").push_bind(symptoms);
        }
        if let Some(treatment) = changes.treatment {
            builder.push(", treatment = ").push_bind(treatment);
        }
        if let Some(prescription) = changes.prescription {
            builder.push(", prescription = ").push_bind(prescription);
        }
        if let Some(notes) = changes.notes {
            builder.push(", notes = ").push_bind(notes);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.db).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Medical record not found".to_string()));
        }
        self.get(id).await
    }

    /// Deletes the record, then its stored files. A file that cannot be
    /// removed is logged and left behind.
    #[instrument(skip(self, store))]
    pub async fn delete(&self, id: Uuid, store: &dyn AttachmentStore) -> Result<(), AppError> {
        let attachments = self.attachments(id).await?;
        let result = sqlx::query("DELETE FROM medical_records WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Medical record not found".to_string()));
        }

        for attachment in attachments {
            if let Err(e) = store.remove(&attachment.storage_path).await {
                warn!("Orphaned attachment file {}: {}", attachment.storage_path, e);
            }
        }
        Ok(())
    }

    pub async fn attachments(&self, record_id: Uuid) -> Result<Vec<Attachment>, AppError> {
        let sql = format!(
            "SELECT {} FROM record_attachments WHERE record_id = $1 ORDER BY uploaded_at ASC",
            ATTACHMENT_COLUMNS
        );
        let attachments = sqlx::query_as::<_, Attachment>(&sql)
            .bind(record_id)
            .fetch_all(&self.db)
            .await?;
        Ok(attachments)
    }

    /// Writes the bytes first and the row second; a failed insert removes the
    /// written file again.
    #[instrument(
        skip(self, store, upload),
        fields(file_name = %upload.file_name, size = upload.bytes.len())
    )]
    pub async fn attach(
        &self,
        record_id: Uuid,
        upload: DecodedUpload,
        uploaded_by: Uuid,
        store: &dyn AttachmentStore,
    ) -> Result<Attachment, AppError> {
        let location = store.put(&upload.storage_key(record_id), &upload.bytes).await?;

        let sql = format!(
            "INSERT INTO record_attachments (id, record_id, file_name, mime_type, size_bytes, \
             storage_path, uploaded_by, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            ATTACHMENT_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Attachment>(&sql)
            .bind(Uuid::new_v4())
            .bind(record_id)
            .bind(&upload.file_name)
            .bind(&upload.mime_type)
            .bind(upload.bytes.len() as i64)
            .bind(&location)
            .bind(uploaded_by)
            .bind(now_reference())
            .fetch_one(&self.db)
            .await;

        match inserted {
            Ok(attachment) => {
                info!("Attached {} to record {}", attachment.file_name, record_id);
                Ok(attachment)
            }
            Err(e) => {
                if let Err(cleanup) = store.remove(&location).await {
                    warn!("Failed to clean up {}: {}", location, cleanup);
                }
                Err(e.into())
            }
        }
    }
}
