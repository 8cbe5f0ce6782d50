// =====================================================================================
// INPUT VALIDATION - FIELD-LEVEL ERROR COLLECTION
// =====================================================================================

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use shared_models::error::{AppError, FieldError};

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern is valid")
    })
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| {
        Regex::new(r"^\+?[0-9][0-9\s\-().]{5,19}$").expect("phone pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_regex().is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone.trim())
}

/// Collects every problem with a request before failing, so the caller gets
/// the full list in one `ValidationFailed` response.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: &str, value: Option<Value>) -> &mut Self {
        let mut error = FieldError::new(field, message);
        error.value = value;
        self.errors.push(error);
        self
    }

    pub fn check(&mut self, condition: bool, field: &str, message: &str) -> &mut Self {
        if !condition {
            self.push(field, message, None);
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.push(field, &format!("{} is required", field), None);
        }
        self
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.push(field, &format!("{} must be at most {} characters", field, max), None);
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_valid_email(value.trim()) {
            self.push(field, "Must be a valid email address", Some(Value::from(value)));
        }
        self
    }

    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => self.email(field, v),
            _ => self,
        }
    }

    pub fn phone(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_valid_phone(value) {
            self.push(field, "Must be a valid phone number", Some(Value::from(value)));
        }
        self
    }

    pub fn optional_phone(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => self.phone(field, v),
            _ => self,
        }
    }

    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) -> &mut Self {
        if !allowed.contains(&value) {
            self.push(
                field,
                &format!("Must be one of: {}", allowed.join(", ")),
                Some(Value::from(value)),
            );
        }
        self
    }

    pub fn not_future(&mut self, field: &str, value: NaiveDate, today: NaiveDate) -> &mut Self {
        if value > today {
            self.push(field, "Date cannot be in the future", Some(Value::from(value.to_string())));
        }
        self
    }

    pub fn positive(&mut self, field: &str, value: f64) -> &mut Self {
        if !(value.is_finite() && value > 0.0) {
            self.push(field, "Must be greater than zero", Some(Value::from(value)));
        }
        self
    }

    pub fn non_negative(&mut self, field: &str, value: f64) -> &mut Self {
        if !(value.is_finite() && value >= 0.0) {
            self.push(field, "Must not be negative", Some(Value::from(value)));
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(std::mem::take(&mut self.errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_email_and_phone_formats() {
        assert!(is_valid_email("jane.doe@hospital.org"));
        assert!(!is_valid_email("jane.doe@"));
        assert!(is_valid_phone("+1 (555) 010-0199"));
        assert!(is_valid_phone("0851234567"));
        assert!(!is_valid_phone("call me"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut v = Validator::new();
        v.required("firstName", "  ")
            .email("email", "nope")
            .one_of("gender", "unknown", &["male", "female", "other"]);

        let err = v.finish().unwrap_err();
        assert_matches!(err, AppError::Validation { ref errors, .. } if errors.len() == 3);
        if let AppError::Validation { errors, .. } = err {
            assert_eq!(errors[0].field, "firstName");
            assert_eq!(errors[1].value, Some(Value::from("nope")));
            assert!(errors[2].message.contains("male, female, other"));
        }
    }

    #[test]
    fn test_optional_fields_skip_when_blank() {
        let mut v = Validator::new();
        v.optional_email("email", Some("")).optional_phone("phone", None);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_dates_and_numbers() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut v = Validator::new();
        v.not_future("dateOfBirth", NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(), today)
            .positive("amount", 0.0)
            .non_negative("tax", -1.0)
            .positive("quantity", f64::NAN);
        assert_matches!(v.finish(), Err(AppError::Validation { errors, .. }) if errors.len() == 4);
    }
}
