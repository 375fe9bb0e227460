//! Validation helpers for bulk imports.
//!
//! Provides email validation, display name sanitization, and CSV header checks.

use std::collections::HashMap;

/// Recognised column names (matched case-insensitively). Anything else is
/// kept as a free-form attribute.
pub const KNOWN_COLUMNS: &[&str] = &[
    "email",
    "first_name",
    "last_name",
    "display_name",
    "university",
    "department",
    "student_id",
];

/// Maximum email length per RFC 5321.
const MAX_EMAIL_LENGTH: usize = 254;

/// Validate an email address format.
///
/// Practical RFC 5322 subset: one `@`, non-empty local part, a dotted
/// domain that does not start or end with `.` or `-`, no whitespace.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is empty".to_string());
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(format!(
            "Email exceeds maximum length of {MAX_EMAIL_LENGTH} characters"
        ));
    }

    if email.contains(char::is_whitespace) {
        return Err("Email contains whitespace".to_string());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("Email must contain exactly one '@'".to_string());
    };

    if domain.contains('@') {
        return Err("Email must contain exactly one '@'".to_string());
    }

    if local.is_empty() {
        return Err("Email local part is empty".to_string());
    }

    if domain.is_empty() {
        return Err("Email domain is empty".to_string());
    }

    if !domain.contains('.') {
        return Err("Email domain must contain at least one '.'".to_string());
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err("Email domain has an empty label".to_string());
    }

    if domain.starts_with('-') || domain.ends_with('-') {
        return Err("Email domain cannot start or end with '-'".to_string());
    }

    Ok(())
}

/// Normalise an email for storage and comparison.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Strip HTML and script content from a display name.
#[must_use]
pub fn sanitize_display_name(name: &str) -> String {
    let cleaned = ammonia::clean(name);
    cleaned.trim().to_string()
}

/// Column positions resolved from a header row.
#[derive(Debug)]
pub struct HeaderLayout {
    /// Known column name -> 0-based index.
    pub known_columns: HashMap<String, usize>,
    /// Unrecognised columns (original spelling, trimmed) with their index.
    pub custom_columns: Vec<(String, usize)>,
}

impl HeaderLayout {
    #[must_use]
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.known_columns.get(column).copied()
    }
}

/// Validate a header row and map column positions.
///
/// Fails if `email` or any of `required` is missing, or if a recognised
/// column appears twice.
pub fn validate_csv_headers(headers: &[String], required: &[String]) -> Result<HeaderLayout, String> {
    let mut known_columns = HashMap::new();
    let mut custom_columns = Vec::new();

    for (idx, header) in headers.iter().enumerate() {
        let normalized = header.trim().to_lowercase();

        if normalized.is_empty() {
            continue;
        }

        if KNOWN_COLUMNS.contains(&normalized.as_str()) {
            if known_columns.insert(normalized.clone(), idx).is_some() {
                return Err(format!("Column '{normalized}' appears more than once"));
            }
        } else {
            custom_columns.push((header.trim().to_string(), idx));
        }
    }

    let missing: Vec<&str> = std::iter::once("email")
        .chain(required.iter().map(String::as_str))
        .filter(|col| !known_columns.contains_key(*col))
        .collect();

    if !missing.is_empty() {
        return Err(format!(
            "CSV is missing required columns: {}. Found columns: {}",
            missing.join(", "),
            headers.join(", ")
        ));
    }

    Ok(HeaderLayout {
        known_columns,
        custom_columns,
    })
}
