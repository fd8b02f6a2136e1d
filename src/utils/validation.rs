// Field validation for request bodies - collects every failure before rejecting

use crate::core::errors::{AppError, FieldError};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("Valid regex pattern")
});

static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ()\-.]{7,20}$").expect("Valid regex pattern"));

/// Accumulating validator
///
/// Each check records a `FieldError` instead of returning early, so a client
/// sees every problem with its form in one response. Only the first failure
/// per field is kept.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        if !self.errors.iter().any(|e| e.field == field) {
            self.errors.push(FieldError::new(field, message));
        }
    }

    /// Record `message` against `field` unless `ok` holds
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.fail(field, message);
        }
        self
    }

    /// Non-empty after trimming, with a character count in `min..=max`
    pub fn length(&mut self, field: &str, label: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let count = value.trim().chars().count();
        if count == 0 {
            self.fail(field, format!("{} is required", label));
        } else if count < min || count > max {
            self.fail(field, format!("{} must be between {} and {} characters", label, min, max));
        }
        self
    }

    /// Optional text no longer than `max` characters
    pub fn max_length(&mut self, field: &str, label: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(value) = value {
            if value.chars().count() > max {
                self.fail(field, format!("{} cannot exceed {} characters", label, max));
            }
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "Email is required");
        } else if value.len() > 254 || !EMAIL_REGEX.is_match(value) {
            self.fail(field, "Please provide a valid email");
        }
        self
    }

    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.email(field, value);
        }
        self
    }

    pub fn phone(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            if !PHONE_REGEX.is_match(value) {
                self.fail(field, "Please provide a valid phone number");
            }
        }
        self
    }

    pub fn range(&mut self, field: &str, label: &str, value: i64, min: i64, max: i64) -> &mut Self {
        if value < min || value > max {
            self.fail(field, format!("{} must be between {} and {}", label, min, max));
        }
        self
    }

    pub fn at_least(&mut self, field: &str, label: &str, value: i64, min: i64) -> &mut Self {
        if value < min {
            self.fail(field, format!("{} must be at least {}", label, min));
        }
        self
    }

    /// Absolute http(s) URL or a site-relative path such as `/uploads/x.png`
    pub fn url(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(value) = value {
            let valid = (value.starts_with('/') && !value.starts_with("//"))
                || url::Url::parse(value)
                    .map(|u| u.scheme() == "http" || u.scheme() == "https")
                    .unwrap_or(false);
            if !valid {
                self.fail(field, "Please provide a valid URL");
            } else if value.len() > max {
                self.fail(field, format!("URL cannot exceed {} characters", max));
            }
        }
        self
    }

    /// Password policy: at least 8 characters with a letter and a digit
    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "Password is required");
        } else if value.chars().count() < 8 {
            self.fail(field, "Password must be at least 8 characters");
        } else if value.chars().count() > 128 {
            self.fail(field, "Password cannot exceed 128 characters");
        } else if !value.chars().any(|c| c.is_alphabetic()) || !value.chars().any(|c| c.is_ascii_digit()) {
            self.fail(field, "Password must contain at least one letter and one number");
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Trimmed, lower-cased email
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Trim in place
pub fn trim(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

/// Trim an optional field, treating blank as absent
pub fn trim_opt(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
