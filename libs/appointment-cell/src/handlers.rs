use std::sync::Arc;

use axum::extract::{Extension, State};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use shared_models::auth::{CurrentUser, Role};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Paginated};
use shared_utils::extractor::{AppJson, AppPath, AppQuery};
use shared_utils::fields::{to_wire, with_display_time};
use shared_utils::state::AppState;
use shared_utils::timestamp::{day_bounds, parse_date};

use crate::models::{
    Appointment, AppointmentListQuery, AppointmentStatus, CreateAppointmentRequest,
    UpdateAppointmentRequest, UpdateStatusRequest,
};
use crate::services::{AppointmentFilters, AppointmentService};

/// Wire shape: camel-case keys, `appointmentAt` in the display zone.
pub fn appointment_to_wire(appointment: &Appointment, zone: Tz) -> Result<Value, AppError> {
    Ok(with_display_time(
        to_wire(appointment)?,
        "appointmentAt",
        appointment.appointment_at,
        zone,
    ))
}

/// Doctors only ever see their own calendar.
fn ensure_visible(user: &CurrentUser, appointment: &Appointment) -> Result<(), AppError> {
    if user.role == Role::Doctor && appointment.doctor_id != user.id {
        return Err(AppError::Forbidden("You can only access your own appointments".to_string()));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<AppointmentListQuery>,
) -> Result<Paginated<Value>, AppError> {
    let zone = state.display_zone();

    let window = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => {
            let date = parse_date(raw)
                .map_err(|_| AppError::field("date", "Must be a valid date (YYYY-MM-DD)"))?;
            Some(day_bounds(date, zone)?)
        }
        None => None,
    };
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<AppointmentStatus>()?),
        None => None,
    };
    let doctor_id = if user.role == Role::Doctor {
        Some(user.id)
    } else {
        query.doctor_id
    };

    let filters = AppointmentFilters {
        window,
        status,
        doctor_id,
        patient_id: query.patient_id,
    };
    let page = query.page_query();
    let (appointments, total) = AppointmentService::new(&state.db)
        .list(&filters, i64::from(page.limit()), page.offset())
        .await?;

    let data = appointments
        .iter()
        .map(|a| appointment_to_wire(a, zone))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Paginated::new(data, &page, total))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let appointment = AppointmentService::new(&state.db).get(id).await?;
    ensure_visible(&user, &appointment)?;

    Ok(ApiResponse::ok(
        "Appointment retrieved successfully",
        appointment_to_wire(&appointment, state.display_zone())?,
    ))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppJson(request): AppJson<CreateAppointmentRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let zone = state.display_zone();
    let booking = request.validate(zone)?;
    if user.role == Role::Doctor && booking.doctor_id != user.id {
        return Err(AppError::Forbidden(
            "Doctors can only book appointments for themselves".to_string(),
        ));
    }

    let appointment = AppointmentService::new(&state.db).create(booking, user.id, zone).await?;
    info!("Appointment {} created by {}", appointment.id, user.id);

    Ok(ApiResponse::created(
        "Appointment created successfully",
        appointment_to_wire(&appointment, zone)?,
    ))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateAppointmentRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let zone = state.display_zone();
    let service = AppointmentService::new(&state.db);

    let current = service.get(id).await?;
    ensure_visible(&user, &current)?;
    let edit = request.apply_to(&current, zone)?;
    if user.role == Role::Doctor && edit.doctor_id != user.id {
        return Err(AppError::Forbidden("Doctors cannot reassign appointments".to_string()));
    }

    let appointment = service.update(id, edit, zone).await?;
    info!("Appointment {} updated by {}", id, user.id);

    Ok(ApiResponse::ok(
        "Appointment updated successfully",
        appointment_to_wire(&appointment, zone)?,
    ))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateStatusRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let next: AppointmentStatus = request.status.trim().parse()?;
    let service = AppointmentService::new(&state.db);

    let current = service.get(id).await?;
    ensure_visible(&user, &current)?;

    let appointment = service.set_status(id, next).await?;
    info!("Appointment {} marked {} by {}", id, next, user.id);

    Ok(ApiResponse::ok(
        "Appointment status updated successfully",
        appointment_to_wire(&appointment, state.display_zone())?,
    ))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    AppointmentService::new(&state.db).delete(id).await?;
    info!("Appointment {} deleted by {}", id, user.id);

    Ok(ApiResponse::ok("Appointment deleted successfully", Value::Null))
}
