use std::sync::Arc;

use axum::extract::State;
use serde_json::{json, Value};

use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::extractor::AppQuery;
use shared_utils::fields::{to_wire, with_display_time};
use shared_utils::state::AppState;
use shared_utils::timestamp::today_in;

use crate::models::{ReportQuery, ReportRange};
use crate::services::DashboardService;

fn range_to_wire(range: ReportRange, state: &AppState) -> Value {
    json!({
        "from": range.from.to_string(),
        "to": range.to.to_string(),
        "timezone": state.display_zone().name(),
    })
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<ApiResponse<Value>, AppError> {
    let zone = state.display_zone();
    let service = DashboardService::new(&state.db);

    let totals = service.totals(zone).await?;
    let recent_appointments = service
        .recent_appointments()
        .await?
        .iter()
        .map(|a| -> Result<Value, AppError> {
            Ok(with_display_time(to_wire(a)?, "appointmentAt", a.appointment_at, zone))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let recent_patients = to_wire(&service.recent_patients().await?)?;

    Ok(ApiResponse::ok(
        "Dashboard statistics retrieved successfully",
        json!({
            "totals": totals,
            "recentAppointments": recent_appointments,
            "recentPatients": recent_patients,
            "timezone": zone.name(),
        }),
    ))
}

pub async fn revenue_report(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ReportQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let zone = state.display_zone();
    let range = query.range(today_in(zone))?;
    let group_by = query.group_by()?;

    let points = DashboardService::new(&state.db).revenue(range, group_by, zone).await?;
    let total = points.iter().map(|p| p.total).sum::<f64>();

    Ok(ApiResponse::ok(
        "Revenue report generated successfully",
        json!({
            "range": range_to_wire(range, &state),
            "groupBy": group_by.as_str(),
            "total": (total * 100.0).round() / 100.0,
            "series": points,
        }),
    ))
}

pub async fn appointment_report(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ReportQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let zone = state.display_zone();
    let range = query.range(today_in(zone))?;
    let service = DashboardService::new(&state.db);

    let by_status = service.appointments_by_status(range, zone).await?;
    let by_doctor = service.appointments_by_doctor(range, zone).await?;

    Ok(ApiResponse::ok(
        "Appointment report generated successfully",
        json!({
            "range": range_to_wire(range, &state),
            "total": by_status.iter().map(|s| s.count).sum::<i64>(),
            "byStatus": by_status,
            "byDoctor": by_doctor,
        }),
    ))
}

pub async fn patient_report(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ReportQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let zone = state.display_zone();
    let range = query.range(today_in(zone))?;
    let service = DashboardService::new(&state.db);

    let registrations = service.registrations(range, zone).await?;
    let genders = service.gender_distribution().await?;

    Ok(ApiResponse::ok(
        "Patient report generated successfully",
        json!({
            "range": range_to_wire(range, &state),
            "newPatients": registrations.iter().map(|r| r.count).sum::<i64>(),
            "registrationsByMonth": registrations,
            "genderDistribution": genders,
        }),
    ))
}
