use std::sync::Arc;

use axum::extract::{Extension, State};
use serde_json::{json, Value};
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
    CreateInvoiceRequest, Invoice, InvoiceListQuery, InvoiceStatus, PaymentRequest,
    UpdateInvoiceRequest,
};
use crate::services::{InvoiceFilters, InvoiceService};

fn invoice_to_wire(invoice: &Invoice) -> Result<Value, AppError> {
    let mut value = to_wire(invoice)?;
    value["balanceDue"] = json!(invoice.balance_due());
    Ok(value)
}

pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<InvoiceListQuery>,
) -> Result<Paginated<Value>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<InvoiceStatus>()?),
        None => None,
    };
    let filters = InvoiceFilters {
        status,
        patient_id: query.patient_id,
    };
    let page = query.page_query();

    let (invoices, total) = InvoiceService::new(&state.db)
        .list(&filters, i64::from(page.limit()), page.offset())
        .await?;
    let data = invoices.iter().map(invoice_to_wire).collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(data, &page, total))
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let service = InvoiceService::new(&state.db);
    let invoice = service.get(id).await?;
    let payments = service.payments(id).await?;

    let mut value = invoice_to_wire(&invoice)?;
    value["payments"] = to_wire(&payments)?;
    Ok(ApiResponse::ok("Invoice retrieved successfully", value))
}

pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppJson(request): AppJson<CreateInvoiceRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let invoice = request.validate()?;
    let issued_on = today_in(state.display_zone());

    let created = InvoiceService::new(&state.db).create(invoice, issued_on, user.id).await?;
    info!("Invoice {} issued by {}", created.invoice_number, user.id);

    Ok(ApiResponse::created("Invoice created successfully", invoice_to_wire(&created)?))
}

pub async fn update_invoice(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateInvoiceRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let changes = request.validate()?;
    let updated = InvoiceService::new(&state.db).update(id, changes).await?;

    Ok(ApiResponse::ok("Invoice updated successfully", invoice_to_wire(&updated)?))
}

pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<PaymentRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let payment = request.validate()?;
    let (invoice, recorded) = InvoiceService::new(&state.db)
        .record_payment(id, payment, user.id)
        .await?;

    Ok(ApiResponse::created(
        "Payment recorded successfully",
        json!({
            "invoice": invoice_to_wire(&invoice)?,
            "payment": to_wire(&recorded)?,
        }),
    ))
}

pub async fn cancel_invoice(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let cancelled = InvoiceService::new(&state.db).cancel(id).await?;
    info!("Invoice {} cancelled by {}", cancelled.invoice_number, user.id);

    Ok(ApiResponse::ok("Invoice cancelled successfully", invoice_to_wire(&cancelled)?))
}

pub async fn delete_invoice(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    InvoiceService::new(&state.db).delete(id).await?;
    info!("Invoice {} deleted by {}", id, user.id);

    Ok(ApiResponse::ok("Invoice deleted successfully", Value::Null))
}
