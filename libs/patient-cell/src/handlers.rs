use std::sync::Arc;

use axum::extract::{Extension, State};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::{CurrentUser, Role};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Paginated};
use shared_utils::extractor::{AppJson, AppPath, AppQuery};
use shared_utils::fields::{resolve_sort_column, to_wire, with_display_time};
use shared_utils::state::AppState;
use shared_utils::timestamp::today_in;

use crate::models::{
    CreatePatientRequest, PatientListQuery, UpdatePatientRequest, GENDERS, SORTABLE_COLUMNS,
};
use crate::services::{PatientFilters, PatientService};

#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<PatientListQuery>,
) -> Result<Paginated<Value>, AppError> {
    let gender = query.gender.as_deref().map(str::trim).filter(|g| !g.is_empty());
    if let Some(gender) = gender {
        if !GENDERS.contains(&gender) {
            return Err(AppError::field("gender", "Must be one of: male, female, other"));
        }
    }

    let filters = PatientFilters {
        search: query.search.clone(),
        gender: gender.map(str::to_string),
    };
    let sort_column =
        resolve_sort_column(query.sort_by.as_deref(), &SORTABLE_COLUMNS, "created_at");
    let page = query.page_query();

    let (patients, total) = PatientService::new(&state.db)
        .list(&filters, sort_column, query.descending(), i64::from(page.limit()), page.offset())
        .await?;

    let data = patients.iter().map(to_wire).collect::<Result<Vec<_>, _>>()?;
    Ok(Paginated::new(data, &page, total))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let patient = PatientService::new(&state.db).get(id).await?;
    Ok(ApiResponse::ok("Patient retrieved successfully", to_wire(&patient)?))
}

/// Everything known about a patient in one payload. Clinical notes are only
/// included for callers allowed to read medical records.
#[axum::debug_handler]
pub async fn get_patient_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let service = PatientService::new(&state.db);
    let zone = state.display_zone();

    let patient = service.get(id).await?;
    let appointments = service.appointments(id).await?;
    let invoices = service.invoices(id).await?;

    let mut patient_json = to_wire(&patient)?;
    patient_json["age"] = json!(patient.age_on(today_in(zone)));

    let appointments_json = appointments
        .iter()
        .map(|a| to_wire(a).map(|v| with_display_time(v, "appointmentAt", a.appointment_at, zone)))
        .collect::<Result<Vec<_>, _>>()?;

    let completed = appointments.iter().filter(|a| a.status == "completed").count();
    let outstanding: f64 = invoices
        .iter()
        .filter(|i| i.status != "cancelled")
        .map(|i| (i.total_amount - i.paid_amount).max(0.0))
        .sum();

    let mut history = json!({
        "patient": patient_json,
        "appointments": appointments_json,
        "invoices": to_wire(&invoices)?,
        "summary": {
            "totalAppointments": appointments.len(),
            "completedAppointments": completed,
            "totalInvoices": invoices.len(),
            "outstandingBalance": (outstanding * 100.0).round() / 100.0,
        },
    });

    if user.has_any_role(&[Role::Admin, Role::Doctor]) {
        history["medicalRecords"] = to_wire(&service.medical_records(id).await?)?;
    }

    Ok(ApiResponse::ok("Patient history retrieved successfully", history))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppJson(request): AppJson<CreatePatientRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let new_patient = request.validate(today_in(state.display_zone()))?;
    let patient = PatientService::new(&state.db).create(new_patient, user.id).await?;
    info!("Patient {} registered by {}", patient.id, user.id);

    Ok(ApiResponse::created("Patient created successfully", to_wire(&patient)?))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdatePatientRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let changes = request.validate(today_in(state.display_zone()))?;
    if changes.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let patient = PatientService::new(&state.db).update(id, changes).await?;
    info!("Patient {} updated by {}", patient.id, user.id);

    Ok(ApiResponse::ok("Patient updated successfully", to_wire(&patient)?))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    PatientService::new(&state.db).delete(id).await?;
    info!("Patient {} deleted by {}", id, user.id);

    Ok(ApiResponse::ok("Patient deleted successfully", Value::Null))
}
