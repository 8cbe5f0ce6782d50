// =====================================================================================
// INVOICE AND PAYMENT SERVICE
// =====================================================================================

use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::timestamp::now_reference;

use crate::models::{
    apply_payment, compute_totals, generate_invoice_number, Invoice, InvoiceChanges, InvoiceStatus,
    NewInvoice, NewPayment, Payment,
};

const INVOICE_SELECT: &str = "SELECT i.id, i.invoice_number, i.patient_id, \
     (p.first_name || ' ' || p.last_name) AS patient_name, i.appointment_id, i.items, \
     i.subtotal, i.tax, i.discount, i.total_amount, i.paid_amount, i.status, i.due_date, \
     i.notes, i.paid_at, i.created_by, i.created_at, i.updated_at \
     FROM invoices i JOIN patients p ON p.id = i.patient_id";

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilters {
    pub status: Option<InvoiceStatus>,
    pub patient_id: Option<Uuid>,
}

pub struct InvoiceService {
    db: PgPool,
}

impl InvoiceService {
    pub fn new(db: &PgPool) -> Self {
        Self { db: db.clone() }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &InvoiceFilters) {
        builder.push(" WHERE 1 = 1");
        if let Some(status) = filters.status {
            builder.push(" AND i.status = ").push_bind(status.as_str());
        }
        if let Some(patient_id) = filters.patient_id {
            builder.push(" AND i.patient_id = ").push_bind(patient_id);
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: &InvoiceFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Invoice>, u64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM invoices i");
        Self::push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut query = QueryBuilder::<Postgres>::new(INVOICE_SELECT);
        Self::push_filters(&mut query, filters);
        query
            .push(" ORDER BY i.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let invoices = query.build_query_as::<Invoice>().fetch_all(&self.db).await?;

        Ok((invoices, total.max(0) as u64))
    }

    async fn fetch_in(conn: &mut PgConnection, id: Uuid, lock: bool) -> Result<Invoice, AppError> {
        let sql = format!(
            "{} WHERE i.id = $1{}",
            INVOICE_SELECT,
            if lock { " FOR UPDATE OF i" } else { "" }
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<Invoice, AppError> {
        let mut conn = self.db.acquire().await?;
        Self::fetch_in(&mut conn, id, false).await
    }

    pub async fn payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT id, invoice_id, amount, payment_method, reference, received_by, paid_at \
             FROM payments WHERE invoice_id = $1 ORDER BY paid_at ASC",
        )
        .bind(invoice_id)
        .fetch_all(&self.db)
        .await?;
        Ok(payments)
    }

    #[instrument(skip(self, invoice), fields(patient_id = %invoice.patient_id))]
    pub async fn create(
        &self,
        invoice: NewInvoice,
        issued_on: NaiveDate,
        created_by: Uuid,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.db.begin().await?;
        let id = Uuid::new_v4();
        let invoice_number = generate_invoice_number(issued_on);
        debug!("Issuing invoice {}", invoice_number);

        sqlx::query(
            "INSERT INTO invoices (id, invoice_number, patient_id, appointment_id, items, \
             subtotal, tax, discount, total_amount, paid_amount, status, due_date, notes, \
             created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, 'pending', $10, $11, $12, $13, $13)",
        )
        .bind(id)
        .bind(&invoice_number)
        .bind(invoice.patient_id)
        .bind(invoice.appointment_id)
        .bind(Json(&invoice.items))
        .bind(invoice.totals.subtotal)
        .bind(invoice.totals.tax)
        .bind(invoice.totals.discount)
        .bind(invoice.totals.total_amount)
        .bind(invoice.due_date)
        .bind(&invoice.notes)
        .bind(created_by)
        .bind(now_reference())
        .execute(&mut *tx)
        .await?;

        let created = Self::fetch_in(&mut tx, id, false).await?;
        tx.commit().await?;

        info!("Created invoice {} for {:.2}", invoice_number, created.total_amount);
        Ok(created)
    }

    /// Only invoices without payments can change.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, changes: InvoiceChanges) -> Result<Invoice, AppError> {
        let mut tx = self.db.begin().await?;
        let current = Self::fetch_in(&mut tx, id, true).await?;
        if current.status()? != InvoiceStatus::Pending || current.paid_amount > 0.0 {
            return Err(AppError::BadRequest("Only unpaid invoices can be edited".to_string()));
        }

        let items = changes.items.unwrap_or_else(|| current.items.0.clone());
        let totals = compute_totals(
            &items,
            changes.tax.unwrap_or(current.tax),
            changes.discount.unwrap_or(current.discount),
        )?;
        let due_date = changes.due_date.unwrap_or(current.due_date);
        let notes = changes.notes.unwrap_or_else(|| current.notes.clone());

        sqlx::query(
            "UPDATE invoices SET items = $2, subtotal = $3, tax = $4, discount = $5, \
             total_amount = $6, due_date = $7, notes = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(id)
        .bind(Json(&items))
        .bind(totals.subtotal)
        .bind(totals.tax)
        .bind(totals.discount)
        .bind(totals.total_amount)
        .bind(due_date)
        .bind(&notes)
        .bind(now_reference())
        .execute(&mut *tx)
        .await?;

        let updated = Self::fetch_in(&mut tx, id, false).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Records a payment and moves the invoice to `partially_paid` or `paid`
    /// in one transaction.
    #[instrument(skip(self, payment), fields(amount = payment.amount))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        payment: NewPayment,
        received_by: Uuid,
    ) -> Result<(Invoice, Payment), AppError> {
        let mut tx = self.db.begin().await?;
        let invoice = Self::fetch_in(&mut tx, invoice_id, true).await?;
        let status = invoice.status()?;
        if !status.accepts_payments() {
            return Err(AppError::BadRequest(format!(
                "Cannot record a payment on a {} invoice",
                status
            )));
        }

        let (paid_amount, next_status) =
            apply_payment(invoice.total_amount, invoice.paid_amount, payment.amount)?;
        let now = now_reference();

        let recorded = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments \
             (id, invoice_id, amount, payment_method, reference, received_by, paid_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, invoice_id, amount, payment_method, reference, received_by, paid_at",
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(payment.amount)
        .bind(&payment.payment_method)
        .bind(&payment.reference)
        .bind(received_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let paid_at = (next_status == InvoiceStatus::Paid).then_some(now);
        sqlx::query(
            "UPDATE invoices SET paid_amount = $2, status = $3, \
             paid_at = COALESCE($4, paid_at), updated_at = $5 WHERE id = $1",
        )
        .bind(invoice_id)
        .bind(paid_amount)
        .bind(next_status.as_str())
        .bind(paid_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let updated = Self::fetch_in(&mut tx, invoice_id, false).await?;
        tx.commit().await?;

        info!(
            "Invoice {} received {:.2}, now {}",
            updated.invoice_number, payment.amount, next_status
        );
        Ok((updated, recorded))
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<Invoice, AppError> {
        let mut tx = self.db.begin().await?;
        let invoice = Self::fetch_in(&mut tx, id, true).await?;
        match invoice.status()? {
            InvoiceStatus::Cancelled => {
                return Err(AppError::BadRequest("Invoice is already cancelled".to_string()))
            }
            _ if invoice.paid_amount > 0.0 => {
                return Err(AppError::BadRequest(
                    "Invoices with payments cannot be cancelled".to_string(),
                ))
            }
            _ => {}
        }

        sqlx::query("UPDATE invoices SET status = 'cancelled', updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now_reference())
            .execute(&mut *tx)
            .await?;

        let cancelled = Self::fetch_in(&mut tx, id, false).await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Invoice not found".to_string()));
        }
        Ok(())
    }
}
