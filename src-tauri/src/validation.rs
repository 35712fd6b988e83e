//! Form Validation Module
//!
//! Simple per-field checks run before a form is submitted. The backend
//! reports its own failures with the same `{field, error}` shape.

use serde::{Deserialize, Serialize};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: &str, error: &str) -> Self {
        Self {
            field: field.to_string(),
            error: error.to_string(),
        }
    }
}

/// Collects field errors for one form.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(&mut self, field: &str, value: &str, message: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.push(field, message);
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.push(field, "Email is required");
        } else if !looks_like_email(value.trim()) {
            self.push(field, "Invalid email format");
        }
        self
    }

    pub fn min_len(&mut self, field: &str, value: &str, min: usize, message: &str) -> &mut Self {
        if value.chars().count() < min {
            self.push(field, message);
        }
        self
    }

    pub fn positive(&mut self, field: &str, value: Option<f64>, message: &str) -> &mut Self {
        if let Some(v) = value {
            if !(v.is_finite() && v > 0.0) {
                self.push(field, message);
            }
        }
        self
    }

    pub fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.push(field, message);
        }
        self
    }

    fn push(&mut self, field: &str, message: &str) {
        // first failure per field wins
        if !self.errors.iter().any(|e| e.field == field) {
            self.errors.push(FieldError::new(field, message));
        }
    }

    pub fn finish(&mut self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
