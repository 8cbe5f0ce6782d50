use std::sync::Arc;

use axum::extract::{Extension, State};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use shared_models::auth::CurrentUser;
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Paginated};
use shared_utils::extractor::{AppJson, AppPath, AppQuery};
use shared_utils::fields::to_wire;
use shared_utils::state::AppState;
use shared_utils::timestamp::today_in;

use crate::models::{
    ensure_can_edit, CreateRecordRequest, RecordListQuery, UpdateRecordRequest,
    UploadAttachmentRequest,
};
use crate::services::{decode_upload, LocalDiskStore, MedicalRecordService, RecordFilters};

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<RecordListQuery>,
) -> Result<Paginated<Value>, AppError> {
    let filters = RecordFilters {
        patient_id: query.patient_id,
        doctor_id: query.doctor_id,
    };
    let page = query.page_query();

    let (records, total) = MedicalRecordService::new(&state.db)
        .list(&filters, i64::from(page.limit()), page.offset())
        .await?;
    let data = records.iter().map(to_wire).collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(data, &page, total))
}

pub async fn get_record(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let service = MedicalRecordService::new(&state.db);
    let record = service.get(id).await?;
    let attachments = service.attachments(id).await?;

    let mut value = to_wire(&record)?;
    value["attachments"] = to_wire(&attachments)?;
    Ok(ApiResponse::ok("Medical record retrieved successfully", value))
}

pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppJson(request): AppJson<CreateRecordRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let record = request.validate(&user, today_in(state.display_zone()))?;
    let created = MedicalRecordService::new(&state.db).create(record).await?;
    info!("Medical record {} created by {}", created.id, user.id);

    Ok(ApiResponse::created("Medical record created successfully", to_wire(&created)?))
}

pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateRecordRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let changes = request.validate(today_in(state.display_zone()))?;
    let service = MedicalRecordService::new(&state.db);
    ensure_can_edit(&user, &service.get(id).await?)?;

    let updated = service.update(id, changes).await?;
    Ok(ApiResponse::ok("Medical record updated successfully", to_wire(&updated)?))
}

pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let store = LocalDiskStore::from_config(&state.config);
    MedicalRecordService::new(&state.db).delete(id, &store).await?;
    info!("Medical record {} deleted by {}", id, user.id);

    Ok(ApiResponse::ok("Medical record deleted successfully", Value::Null))
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let service = MedicalRecordService::new(&state.db);
    service.get(id).await?;
    let attachments = service.attachments(id).await?;

    Ok(ApiResponse::ok("Attachments retrieved successfully", to_wire(&attachments)?))
}

pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UploadAttachmentRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let config = &state.config;
    let upload = decode_upload(request, config.max_file_size, &config.allowed_file_types)?;
    let service = MedicalRecordService::new(&state.db);
    ensure_can_edit(&user, &service.get(id).await?)?;

    let store = LocalDiskStore::from_config(&state.config);
    let attachment = service.attach(id, upload, user.id, &store).await?;

    Ok(ApiResponse::created("Attachment uploaded successfully", to_wire(&attachment)?))
}
