// =====================================================================================
// APPOINTMENT BOOKING SERVICE
// =====================================================================================

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::timestamp::now_reference;

use crate::models::{Appointment, AppointmentStatus, NewAppointment};
use crate::services::conflict::{conflict_error, find_conflict};

const APPOINTMENT_SELECT: &str = "SELECT a.id, a.patient_id, \
     (p.first_name || ' ' || p.last_name) AS patient_name, p.phone AS patient_phone, \
     a.doctor_id, u.name AS doctor_name, a.appointment_at, a.duration_minutes, a.reason, \
     a.status, a.notes, a.completed_at, a.created_by, a.created_at, a.updated_at \
     FROM appointments a \
     JOIN patients p ON p.id = a.patient_id \
     JOIN users u ON u.id = a.doctor_id";

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilters {
    /// UTC `[start, end)` of the requested display-zone day.
    pub window: Option<(NaiveDateTime, NaiveDateTime)>,
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

pub struct AppointmentService {
    db: PgPool,
}

impl AppointmentService {
    pub fn new(db: &PgPool) -> Self {
        Self { db: db.clone() }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &AppointmentFilters) {
        builder.push(" WHERE 1 = 1");
        if let Some((start, end)) = filters.window {
            builder
                .push(" AND a.appointment_at >= ")
                .push_bind(start)
                .push(" AND a.appointment_at < ")
                .push_bind(end);
        }
        if let Some(status) = filters.status {
            builder.push(" AND a.status = ").push_bind(status.as_str());
        }
        if let Some(doctor_id) = filters.doctor_id {
            builder.push(" AND a.doctor_id = ").push_bind(doctor_id);
        }
        if let Some(patient_id) = filters.patient_id {
            builder.push(" AND a.patient_id = ").push_bind(patient_id);
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: &AppointmentFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Appointment>, u64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM appointments a");
        Self::push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut query = QueryBuilder::<Postgres>::new(APPOINTMENT_SELECT);
        Self::push_filters(&mut query, filters);
        query
            .push(" ORDER BY a.appointment_at ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let appointments = query.build_query_as::<Appointment>().fetch_all(&self.db).await?;

        Ok((appointments, total.max(0) as u64))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        let sql = format!("{} WHERE a.id = $1", APPOINTMENT_SELECT);
        let appointment = sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(appointment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Appointment, AppError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))
    }

    /// Locks the doctor row so concurrent bookings for the same doctor
    /// serialize on it.
    async fn lock_doctor(conn: &mut PgConnection, doctor_id: Uuid) -> Result<(), AppError> {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM users \
             WHERE id = $1 AND role = 'doctor' AND is_active = TRUE FOR UPDATE",
        )
        .bind(doctor_id)
        .fetch_optional(conn)
        .await?;
        found
            .map(|_| ())
            .ok_or_else(|| AppError::DanglingReference("Doctor not found or inactive".to_string()))
    }

    async fn ensure_patient(conn: &mut PgConnection, patient_id: Uuid) -> Result<(), AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM patients WHERE id = $1)")
                .bind(patient_id)
                .fetch_one(conn)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(AppError::DanglingReference("Patient not found".to_string()))
        }
    }

    async fn fetch_in(conn: &mut PgConnection, id: Uuid) -> Result<Appointment, AppError> {
        let sql = format!("{} WHERE a.id = $1", APPOINTMENT_SELECT);
        let appointment = sqlx::query_as::<_, Appointment>(&sql).bind(id).fetch_one(conn).await?;
        Ok(appointment)
    }

    /// Books a slot. The doctor check, the overlap check and the insert share
    /// one transaction.
    #[instrument(
        skip(self, booking),
        fields(doctor_id = %booking.doctor_id, patient_id = %booking.patient_id)
    )]
    pub async fn create(
        &self,
        booking: NewAppointment,
        created_by: Uuid,
        zone: Tz,
    ) -> Result<Appointment, AppError> {
        let mut tx = self.db.begin().await?;

        Self::lock_doctor(&mut tx, booking.doctor_id).await?;
        Self::ensure_patient(&mut tx, booking.patient_id).await?;
        let end = booking.end_time();
        if let Some(existing) =
            find_conflict(&mut tx, booking.doctor_id, booking.appointment_at, end, None).await?
        {
            return Err(conflict_error(&existing, zone));
        }

        let id = Uuid::new_v4();
        let now = now_reference();
        sqlx::query(
            "INSERT INTO appointments (id, patient_id, doctor_id, appointment_at, \
             duration_minutes, reason, status, notes, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7, $8, $9, $9)",
        )
        .bind(id)
        .bind(booking.patient_id)
        .bind(booking.doctor_id)
        .bind(booking.appointment_at)
        .bind(booking.duration_minutes)
        .bind(&booking.reason)
        .bind(&booking.notes)
        .bind(created_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let appointment = Self::fetch_in(&mut tx, id).await?;
        tx.commit().await?;

        info!("Booked appointment {} at {}", id, booking.appointment_at);
        Ok(appointment)
    }

    #[instrument(skip(self, edit))]
    pub async fn update(
        &self,
        id: Uuid,
        edit: NewAppointment,
        zone: Tz,
    ) -> Result<Appointment, AppError> {
        let mut tx = self.db.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM appointments WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let status = status.ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;
        let status: AppointmentStatus = status.parse()?;
        if status.is_terminal() {
            return Err(AppError::BadRequest(format!("Cannot edit a {} appointment", status)));
        }

        Self::lock_doctor(&mut tx, edit.doctor_id).await?;
        Self::ensure_patient(&mut tx, edit.patient_id).await?;
        let end = edit.end_time();
        if let Some(existing) =
            find_conflict(&mut tx, edit.doctor_id, edit.appointment_at, end, Some(id)).await?
        {
            return Err(conflict_error(&existing, zone));
        }

        sqlx::query(
            "UPDATE appointments SET patient_id = $2, doctor_id = $3, appointment_at = $4, \
             duration_minutes = $5, reason = $6, notes = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(id)
        .bind(edit.patient_id)
        .bind(edit.doctor_id)
        .bind(edit.appointment_at)
        .bind(edit.duration_minutes)
        .bind(&edit.reason)
        .bind(&edit.notes)
        .bind(now_reference())
        .execute(&mut *tx)
        .await?;

        let appointment = Self::fetch_in(&mut tx, id).await?;
        tx.commit().await?;
        Ok(appointment)
    }

    /// Moves the appointment to `next`; reaching `completed` stamps
    /// `completed_at`.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppError> {
        let current = self.get(id).await?;
        let current_status: AppointmentStatus = current.status.parse()?;
        if !current_status.can_transition_to(next) {
            warn!("Rejected status change {} -> {} for {}", current_status, next, id);
            return Err(AppError::BadRequest(format!(
                "Cannot change appointment status from {} to {}",
                current_status, next
            )));
        }
        debug!("Appointment {} status {} -> {}", id, current_status, next);

        let now = now_reference();
        let completed_at = match next {
            AppointmentStatus::Completed => Some(current.completed_at.unwrap_or(now)),
            _ => None,
        };
        sqlx::query(
            "UPDATE appointments SET status = $2, completed_at = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(next.as_str())
        .bind(completed_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Appointment not found".to_string()));
        }
        Ok(())
    }
}
