// =====================================================================================
// DASHBOARD AND REPORT AGGREGATES
// =====================================================================================

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use sqlx::PgPool;
use tracing::{debug, instrument};

use shared_models::error::AppError;
use shared_utils::timestamp::{day_bounds, range_bounds, today_in};

use crate::models::{
    DashboardTotals, DoctorCount, GenderCount, GroupBy, PeriodCount, RecentAppointment,
    RecentPatient, ReportRange, RevenuePoint, StatusCount,
};

const RECENT_LIMIT: i64 = 5;

/// Read-only aggregate queries. Stored timestamps are UTC; period labels are
/// computed in the display zone so a late-evening payment lands on the local day.
pub struct DashboardService {
    db: PgPool,
}

impl DashboardService {
    pub fn new(db: &PgPool) -> Self {
        Self { db: db.clone() }
    }

    async fn count(&self, sql: &str) -> Result<i64, AppError> {
        let value: i64 = sqlx::query_scalar(sql).fetch_one(&self.db).await?;
        Ok(value)
    }

    async fn amount(&self, sql: &str) -> Result<f64, AppError> {
        let value: f64 = sqlx::query_scalar(sql).fetch_one(&self.db).await?;
        Ok((value * 100.0).round() / 100.0)
    }

    #[instrument(skip(self))]
    pub async fn totals(&self, zone: Tz) -> Result<DashboardTotals, AppError> {
        let (day_start, day_end) = day_bounds(today_in(zone), zone)?;
        debug!("Counting appointments between {} and {}", day_start, day_end);

        let today_appointments: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments WHERE appointment_at >= $1 AND appointment_at < $2 \
             AND status <> 'cancelled'",
        )
        .bind(day_start)
        .bind(day_end)
        .fetch_one(&self.db)
        .await?;

        Ok(DashboardTotals {
            total_patients: self.count("SELECT COUNT(*) FROM patients").await?,
            total_doctors: self
                .count("SELECT COUNT(*) FROM users WHERE role = 'doctor' AND is_active")
                .await?,
            today_appointments,
            pending_appointments: self
                .count(
                    "SELECT COUNT(*) FROM appointments \
                     WHERE status IN ('scheduled', 'confirmed')",
                )
                .await?,
            revenue_collected: self
                .amount("SELECT COALESCE(SUM(amount), 0)::float8 FROM payments")
                .await?,
            outstanding_balance: self
                .amount(
                    "SELECT COALESCE(SUM(total_amount - paid_amount), 0)::float8 FROM invoices \
                     WHERE status IN ('pending', 'partially_paid')",
                )
                .await?,
        })
    }

    pub async fn recent_appointments(&self) -> Result<Vec<RecentAppointment>, AppError> {
        let rows = sqlx::query_as::<_, RecentAppointment>(
            "SELECT a.id, (p.first_name || ' ' || p.last_name) AS patient_name, \
             u.name AS doctor_name, a.appointment_at, a.status \
             FROM appointments a \
             JOIN patients p ON p.id = a.patient_id \
             JOIN users u ON u.id = a.doctor_id \
             ORDER BY a.created_at DESC LIMIT $1",
        )
        .bind(RECENT_LIMIT)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn recent_patients(&self) -> Result<Vec<RecentPatient>, AppError> {
        let rows = sqlx::query_as::<_, RecentPatient>(
            "SELECT id, first_name, last_name, phone, created_at FROM patients \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(RECENT_LIMIT)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    fn bounds(range: ReportRange, zone: Tz) -> Result<(NaiveDateTime, NaiveDateTime), AppError> {
        Ok(range_bounds(range.from, range.to, zone)?)
    }

    #[instrument(skip(self))]
    pub async fn revenue(
        &self,
        range: ReportRange,
        group_by: GroupBy,
        zone: Tz,
    ) -> Result<Vec<RevenuePoint>, AppError> {
        let (start, end) = Self::bounds(range, zone)?;
        let rows = sqlx::query_as::<_, RevenuePoint>(
            "SELECT to_char(paid_at AT TIME ZONE 'UTC' AT TIME ZONE $1, $2) AS period, \
             COALESCE(SUM(amount), 0)::float8 AS total, COUNT(*) AS payments \
             FROM payments WHERE paid_at >= $3 AND paid_at < $4 \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(zone.name())
        .bind(group_by.pattern())
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn appointments_by_status(
        &self,
        range: ReportRange,
        zone: Tz,
    ) -> Result<Vec<StatusCount>, AppError> {
        let (start, end) = Self::bounds(range, zone)?;
        let rows = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM appointments \
             WHERE appointment_at >= $1 AND appointment_at < $2 \
             GROUP BY status ORDER BY count DESC, status",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn appointments_by_doctor(
        &self,
        range: ReportRange,
        zone: Tz,
    ) -> Result<Vec<DoctorCount>, AppError> {
        let (start, end) = Self::bounds(range, zone)?;
        let rows = sqlx::query_as::<_, DoctorCount>(
            "SELECT a.doctor_id, u.name AS doctor_name, COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE a.status = 'completed') AS completed \
             FROM appointments a JOIN users u ON u.id = a.doctor_id \
             WHERE a.appointment_at >= $1 AND a.appointment_at < $2 \
             GROUP BY a.doctor_id, u.name ORDER BY total DESC, u.name",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn registrations(
        &self,
        range: ReportRange,
        zone: Tz,
    ) -> Result<Vec<PeriodCount>, AppError> {
        let (start, end) = Self::bounds(range, zone)?;
        let rows = sqlx::query_as::<_, PeriodCount>(
            "SELECT to_char(created_at AT TIME ZONE 'UTC' AT TIME ZONE $1, $2) AS period, \
             COUNT(*) AS count \
             FROM patients WHERE created_at >= $3 AND created_at < $4 \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(zone.name())
        .bind(GroupBy::Month.pattern())
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn gender_distribution(&self) -> Result<Vec<GenderCount>, AppError> {
        let rows = sqlx::query_as::<_, GenderCount>(
            "SELECT gender, COUNT(*) AS count FROM patients GROUP BY gender ORDER BY gender",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
