use chrono::NaiveDateTime;
use sqlx::{FromRow, PgConnection};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::timestamp::present_naive;

#[derive(Debug, Clone, FromRow)]
pub struct ConflictingAppointment {
    pub id: Uuid,
    pub appointment_at: NaiveDateTime,
    pub duration_minutes: i32,
}

/// Looks for an open appointment of `doctor_id` overlapping `[start, end)`;
/// back-to-back slots do not collide.
/// Runs on the caller's transaction so the check and the write commit together.
pub async fn find_conflict(
    conn: &mut PgConnection,
    doctor_id: Uuid,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude_appointment_id: Option<Uuid>,
) -> Result<Option<ConflictingAppointment>, AppError> {
    debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start, end);

    let conflict = sqlx::query_as::<_, ConflictingAppointment>(
        "SELECT id, appointment_at, duration_minutes FROM appointments \
         WHERE doctor_id = $1 \
           AND status IN ('scheduled', 'confirmed') \
           AND appointment_at < $3 \
           AND appointment_at + (duration_minutes * INTERVAL '1 minute') > $2 \
           AND ($4::uuid IS NULL OR id <> $4) \
         ORDER BY appointment_at LIMIT 1",
    )
    .bind(doctor_id)
    .bind(start)
    .bind(end)
    .bind(exclude_appointment_id)
    .fetch_optional(conn)
    .await?;

    if let Some(existing) = &conflict {
        warn!("Conflict detected for doctor {} with appointment {}", doctor_id, existing.id);
    }
    Ok(conflict)
}

pub fn conflict_error(existing: &ConflictingAppointment, zone: chrono_tz::Tz) -> AppError {
    AppError::Conflict(format!(
        "Doctor already has an appointment at {} ({} minutes, {})",
        present_naive(existing.appointment_at, zone),
        existing.duration_minutes,
        zone.name()
    ))
}
