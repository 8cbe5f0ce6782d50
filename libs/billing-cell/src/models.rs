use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use shared_models::error::{AppError, FieldError};
use shared_models::response::PageQuery;
use shared_utils::timestamp::parse_date;
use shared_utils::validation::Validator;

pub const PAYMENT_METHODS: [&str; 5] = ["cash", "card", "insurance", "bank_transfer", "other"];

/// Amounts closer than this are considered equal.
const CENT_TOLERANCE: f64 = 0.005;

const INVOICE_SUFFIX_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Pending,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Paid,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn accepts_payments(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                AppError::validation(vec![FieldError::new(
                    "status",
                    "Must be one of: pending, partially_paid, paid, cancelled",
                )
                .with_value(value)])
            })
    }
}

pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// One billed line, stored inside the invoice's `items` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
}

impl InvoiceItem {
    pub fn new(description: &str, quantity: f64, unit_price: f64) -> Self {
        Self {
            description: description.trim().to_string(),
            quantity,
            unit_price: round_money(unit_price),
            line_total: round_money(quantity * unit_price),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub total_amount: f64,
}

/// Tax and discount are absolute amounts applied to the rounded subtotal.
pub fn compute_totals(
    items: &[InvoiceItem],
    tax: f64,
    discount: f64,
) -> Result<InvoiceTotals, AppError> {
    let subtotal = round_money(items.iter().map(|item| item.line_total).sum());
    let tax = round_money(tax);
    let discount = round_money(discount);
    let total_amount = round_money(subtotal + tax - discount);
    if total_amount < 0.0 {
        return Err(AppError::field("discount", "Discount cannot exceed subtotal plus tax"));
    }
    Ok(InvoiceTotals {
        subtotal,
        tax,
        discount,
        total_amount,
    })
}

/// Paid amount and status after applying `amount` to an invoice.
pub fn apply_payment(
    total_amount: f64,
    paid_amount: f64,
    amount: f64,
) -> Result<(f64, InvoiceStatus), AppError> {
    let outstanding = round_money(total_amount - paid_amount);
    if amount > outstanding + CENT_TOLERANCE {
        return Err(AppError::BadRequest(format!(
            "Payment of {:.2} exceeds outstanding balance of {:.2}",
            amount, outstanding
        )));
    }
    let paid = round_money(paid_amount + amount);
    let status = if total_amount - paid <= CENT_TOLERANCE {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::PartiallyPaid
    };
    Ok((paid, status))
}

/// `INV-YYYYMMDD-XXXXXX`, dated in the display zone.
pub fn generate_invoice_number(issued_on: NaiveDate) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| INVOICE_SUFFIX_CHARSET[rng.gen_range(0..INVOICE_SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("INV-{}-{}", issued_on.format("%Y%m%d"), suffix)
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub appointment_id: Option<Uuid>,
    pub items: Json<Vec<InvoiceItem>>,
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub paid_at: Option<NaiveDateTime>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Invoice {
    pub fn status(&self) -> Result<InvoiceStatus, AppError> {
        self.status.parse()
    }

    pub fn balance_due(&self) -> f64 {
        round_money((self.total_amount - self.paid_amount).max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub reference: Option<String>,
    pub received_by: Option<Uuid>,
    pub paid_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub items: Vec<InvoiceItem>,
    pub totals: InvoiceTotals,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceChanges {
    pub items: Option<Vec<InvoiceItem>>,
    pub tax: Option<f64>,
    pub discount: Option<f64>,
    pub due_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: f64,
    pub payment_method: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemInput {
    #[serde(default)]
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub patient_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<InvoiceItemInput>,
    pub tax: Option<f64>,
    pub discount: Option<f64>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub items: Option<Vec<InvoiceItemInput>>,
    pub tax: Option<f64>,
    pub discount: Option<f64>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: Option<f64>,
    #[serde(default)]
    pub payment_method: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub patient_id: Option<Uuid>,
}

impl InvoiceListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

fn check_items(validator: &mut Validator, inputs: &[InvoiceItemInput]) -> Vec<InvoiceItem> {
    validator.check(!inputs.is_empty(), "items", "At least one item is required");
    inputs
        .iter()
        .enumerate()
        .filter_map(|(index, input)| {
            let description_field = format!("items[{}].description", index);
            let quantity_field = format!("items[{}].quantity", index);
            let price_field = format!("items[{}].unitPrice", index);
            let before = validator.is_valid();

            validator.required(&description_field, &input.description);
            let quantity = input.quantity.unwrap_or(1.0);
            validator.positive(&quantity_field, quantity);
            match input.unit_price {
                Some(price) => {
                    validator.non_negative(&price_field, price);
                }
                None => {
                    validator.push(&price_field, "unitPrice is required", None);
                }
            }

            let item_valid = before && validator.is_valid();
            let unit_price = input.unit_price.unwrap_or(0.0);
            item_valid.then(|| InvoiceItem::new(&input.description, quantity, unit_price))
        })
        .collect()
}

fn check_due_date(validator: &mut Validator, raw: &str) -> Option<NaiveDate> {
    match parse_date(raw.trim()) {
        Ok(date) => Some(date),
        Err(_) => {
            validator.push(
                "dueDate",
                "Must be a valid date (YYYY-MM-DD)",
                Some(serde_json::Value::from(raw)),
            );
            None
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CreateInvoiceRequest {
    pub fn validate(self) -> Result<NewInvoice, AppError> {
        let mut validator = Validator::new();
        validator.check(self.patient_id.is_some(), "patientId", "patientId is required");
        let items = check_items(&mut validator, &self.items);
        let tax = self.tax.unwrap_or(0.0);
        let discount = self.discount.unwrap_or(0.0);
        validator.non_negative("tax", tax).non_negative("discount", discount);
        let due_date = self
            .due_date
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .and_then(|raw| check_due_date(&mut validator, raw));
        validator.finish()?;

        let totals = compute_totals(&items, tax, discount)?;
        let patient_id = self
            .patient_id
            .ok_or_else(|| AppError::field("patientId", "patientId is required"))?;

        Ok(NewInvoice {
            patient_id,
            appointment_id: self.appointment_id,
            items,
            totals,
            due_date,
            notes: blank_to_none(self.notes),
        })
    }
}

impl UpdateInvoiceRequest {
    pub fn validate(self) -> Result<InvoiceChanges, AppError> {
        let mut validator = Validator::new();
        let items = self.items.as_deref().map(|inputs| check_items(&mut validator, inputs));
        if let Some(tax) = self.tax {
            validator.non_negative("tax", tax);
        }
        if let Some(discount) = self.discount {
            validator.non_negative("discount", discount);
        }
        let due_date = self.due_date.as_deref().map(|raw| match raw.trim() {
            "" => None,
            value => check_due_date(&mut validator, value),
        });
        validator.finish()?;

        Ok(InvoiceChanges {
            items,
            tax: self.tax,
            discount: self.discount,
            due_date,
            notes: self.notes.map(|n| blank_to_none(Some(n))),
        })
    }
}

impl PaymentRequest {
    pub fn validate(self) -> Result<NewPayment, AppError> {
        let mut validator = Validator::new();
        // Checked after rounding: what gets stored must be at least one cent.
        let amount = self.amount.map(round_money);
        match amount {
            Some(amount) => {
                validator.positive("amount", amount);
            }
            None => {
                validator.push("amount", "amount is required", None);
            }
        }
        validator.one_of("paymentMethod", self.payment_method.trim(), &PAYMENT_METHODS);
        validator.finish()?;

        Ok(NewPayment {
            amount: amount.unwrap_or(0.0),
            payment_method: self.payment_method.trim().to_string(),
            reference: blank_to_none(self.reference),
        })
    }
}
