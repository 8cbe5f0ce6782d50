//! Storage (`snake_case`) to wire (`camelCase`) record shaping.

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};

use shared_models::error::AppError;

use crate::timestamp::{present_naive, to_external_format};

/// Known storage/wire name pairs. Lookups go through this table first so
/// renames stay explicit and reversible; anything missing falls back to a
/// mechanical conversion.
pub const FIELD_NAMES: &[(&str, &str)] = &[
    ("first_name", "firstName"),
    ("last_name", "lastName"),
    ("full_name", "fullName"),
    ("date_of_birth", "dateOfBirth"),
    ("blood_group", "bloodGroup"),
    ("emergency_contact_name", "emergencyContactName"),
    ("emergency_contact_phone", "emergencyContactPhone"),
    ("password_hash", "passwordHash"),
    ("is_active", "isActive"),
    ("last_login_at", "lastLoginAt"),
    ("created_by", "createdBy"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
    ("patient_id", "patientId"),
    ("patient_name", "patientName"),
    ("patient_phone", "patientPhone"),
    ("doctor_id", "doctorId"),
    ("doctor_name", "doctorName"),
    ("appointment_id", "appointmentId"),
    ("appointment_at", "appointmentAt"),
    ("duration_minutes", "durationMinutes"),
    ("completed_at", "completedAt"),
    ("invoice_id", "invoiceId"),
    ("invoice_number", "invoiceNumber"),
    ("unit_price", "unitPrice"),
    ("line_total", "lineTotal"),
    ("total_amount", "totalAmount"),
    ("paid_amount", "paidAmount"),
    ("balance_due", "balanceDue"),
    ("due_date", "dueDate"),
    ("paid_at", "paidAt"),
    ("payment_method", "paymentMethod"),
    ("received_by", "receivedBy"),
    ("record_id", "recordId"),
    ("visit_date", "visitDate"),
    ("file_name", "fileName"),
    ("mime_type", "mimeType"),
    ("size_bytes", "sizeBytes"),
    ("storage_path", "storagePath"),
    ("uploaded_by", "uploadedBy"),
    ("uploaded_at", "uploadedAt"),
    ("total_patients", "totalPatients"),
    ("total_doctors", "totalDoctors"),
    ("today_appointments", "todayAppointments"),
    ("pending_appointments", "pendingAppointments"),
    ("total_revenue", "totalRevenue"),
    ("outstanding_balance", "outstandingBalance"),
    ("recent_appointments", "recentAppointments"),
    ("recent_patients", "recentPatients"),
    ("appointment_count", "appointmentCount"),
    ("patient_count", "patientCount"),
    ("payment_count", "paymentCount"),
];

/// Storage keys whose values are audit timestamps, rendered as ISO-8601.
pub const TIMESTAMP_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "uploaded_at",
    "paid_at",
    "completed_at",
];

pub fn to_wire_key(storage_key: &str) -> String {
    FIELD_NAMES
        .iter()
        .find(|(storage, _)| *storage == storage_key)
        .map(|(_, wire)| wire.to_string())
        .unwrap_or_else(|| snake_to_camel(storage_key))
}

pub fn to_storage_key(wire_key: &str) -> String {
    FIELD_NAMES
        .iter()
        .find(|(_, wire)| *wire == wire_key)
        .map(|(storage, _)| storage.to_string())
        .unwrap_or_else(|| camel_to_snake(wire_key))
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for (idx, ch) in key.chars().enumerate() {
        if ch == '_' && idx > 0 {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (idx, ch) in key.chars().enumerate() {
        if ch.is_uppercase() {
            if idx > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Renames a record's keys to camel-case and renders its audit timestamps as
/// ISO-8601. Arrays are shaped element-wise; nested values are left alone.
pub fn rename_fields_and_timestamps(record: Value) -> Value {
    match record {
        Value::Array(items) => {
            Value::Array(items.into_iter().map(rename_fields_and_timestamps).collect())
        }
        Value::Object(map) => Value::Object(rename_object(map)),
        other => other,
    }
}

fn rename_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let value = if TIMESTAMP_FIELDS.contains(&key.as_str()) {
                match value {
                    Value::String(raw) => to_external_format(Some(&raw))
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                    other => other,
                }
            } else {
                value
            };
            (to_wire_key(&key), value)
        })
        .collect()
}

/// Serializes a row (or rows) and shapes it for the wire.
pub fn to_wire<T: Serialize>(value: &T) -> Result<Value, AppError> {
    Ok(rename_fields_and_timestamps(serde_json::to_value(value)?))
}

/// Overwrites a business timestamp on a shaped record with its display-zone
/// rendering and records the zone it was rendered in.
pub fn with_display_time(
    mut record: Value,
    wire_key: &str,
    reference: NaiveDateTime,
    zone: Tz,
) -> Value {
    if let Value::Object(map) = &mut record {
        map.insert(wire_key.to_string(), Value::String(present_naive(reference, zone)));
        map.insert("timezone".to_string(), Value::String(zone.name().to_string()));
    }
    record
}

/// Resolves a camel-case `sortBy` parameter against a column whitelist.
pub fn resolve_sort_column(
    sort_by: Option<&str>,
    allowed: &[&'static str],
    default: &'static str,
) -> &'static str {
    sort_by
        .map(to_storage_key)
        .and_then(|column| allowed.iter().copied().find(|candidate| *candidate == column))
        .unwrap_or(default)
}
