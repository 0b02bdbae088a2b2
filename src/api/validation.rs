//! Input validation for API requests.
//!
//! Validators return `Result<(), String>`; handlers collect failures into a
//! `ValidationErrorBuilder` from the `error` module so nothing is written
//! when any field is invalid.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Basic email shape: local part, @, dotted domain
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)+$").unwrap();

    /// Usernames: alphanumeric plus dot/underscore/dash, 3-32 chars
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9._-]{3,32}$").unwrap();

    /// Calendar dates as YYYY-MM-DD
    static ref DATE_REGEX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required.".to_string());
    }
    if username.len() < 3 {
        return Err("Username must be at least 3 characters long.".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username may only contain letters, digits, dot, underscore and dash.".to_string(),
        );
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required.".to_string());
    }
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address.".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long.".to_string());
    }
    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<(), String> {
    if name.trim().len() < 2 {
        return Err("Full name is required.".to_string());
    }
    Ok(())
}

/// Validate an optional YYYY-MM-DD date field
pub fn validate_date(date: &Option<String>) -> Result<(), String> {
    if let Some(d) = date {
        if d.is_empty() {
            return Ok(());
        }
        if !DATE_REGEX.is_match(d) {
            return Err("Date must be in YYYY-MM-DD format.".to_string());
        }
        if chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err() {
            return Err("Invalid calendar date.".to_string());
        }
    }
    Ok(())
}

/// Validate a required YYYY-MM-DD date field
pub fn validate_required_date(date: &str) -> Result<(), String> {
    if date.is_empty() {
        return Err("Date is required.".to_string());
    }
    validate_date(&Some(date.to_string()))
}

/// Validate an optional non-negative monetary amount
pub fn validate_amount(amount: &Option<f64>) -> Result<(), String> {
    if let Some(a) = amount {
        if !a.is_finite() || *a < 0.0 {
            return Err("Amount must be a non-negative number.".to_string());
        }
    }
    Ok(())
}

pub fn validate_required(field_name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required.", field_name));
    }
    Ok(())
}
