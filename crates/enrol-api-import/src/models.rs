//! Configuration, report and request/response models.

use chrono::Duration;
use enrol_db::{TokenPurpose, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Supported CSV delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvDelimiter {
    #[default]
    Comma,
    /// Common in European spreadsheet exports.
    Semicolon,
    Tab,
    Pipe,
}

impl CsvDelimiter {
    /// Convert delimiter to byte for csv crate.
    #[must_use]
    pub fn as_byte(&self) -> u8 {
        match self {
            CsvDelimiter::Comma => b',',
            CsvDelimiter::Semicolon => b';',
            CsvDelimiter::Tab => b'\t',
            CsvDelimiter::Pipe => b'|',
        }
    }

    /// Parse delimiter from string input.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "," | "comma" => Ok(CsvDelimiter::Comma),
            ";" | "semicolon" => Ok(CsvDelimiter::Semicolon),
            "\t" | "tab" | "\\t" => Ok(CsvDelimiter::Tab),
            "|" | "pipe" => Ok(CsvDelimiter::Pipe),
            _ => Err(format!(
                "Invalid delimiter '{s}'. Valid values: ',', ';', '\\t', '|'"
            )),
        }
    }
}

/// Limits and column requirements for bulk imports.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub max_file_bytes: usize,
    pub max_rows: usize,
    /// Rows processed concurrently after the pre-pass.
    pub concurrency: usize,
    /// Columns every row must fill in, in addition to `email`.
    pub required_columns: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_rows: 10_000,
            concurrency: 8,
            required_columns: vec![
                "first_name".to_string(),
                "last_name".to_string(),
                "university".to_string(),
            ],
        }
    }
}

/// Token lifetimes per purpose.
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub access_ttl: Duration,
    pub invitation_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(30),
            invitation_ttl: Duration::days(7),
        }
    }
}

impl TokenConfig {
    #[must_use]
    pub fn ttl_for(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Access => self.access_ttl,
            TokenPurpose::Invitation => self.invitation_ttl,
        }
    }
}

// ---------------------------------------------------------------------------
// Import report
// ---------------------------------------------------------------------------

/// Where an earlier record with the same email was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DuplicateSource {
    /// An earlier row of the same file.
    InFile { first_line: usize },
    /// A user that already exists in the directory.
    InDirectory,
}

/// Whether the token for a created user reached the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed { reason: String },
}

impl DeliveryStatus {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryStatus::Failed { .. })
    }
}

/// Terminal outcome of one CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Created {
        user_id: UserId,
        delivery: DeliveryStatus,
    },
    SkippedDuplicate {
        duplicate_of: DuplicateSource,
    },
    RejectedInvalid {
        column: String,
        reason: String,
    },
    /// The directory failed while processing this row. No user was created
    /// for it; re-uploading the file retries it.
    Failed { reason: String },
}

impl RowOutcome {
    /// Stable label used in summaries and the CSV report.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RowOutcome::Created { .. } => "created",
            RowOutcome::SkippedDuplicate { .. } => "skipped_duplicate",
            RowOutcome::RejectedInvalid { .. } => "rejected_invalid",
            RowOutcome::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one row, with the row as uploaded.
#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    /// 1-based line in the uploaded file (header = 1).
    pub line_number: usize,
    /// Normalised email, if the row had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub raw_row: Vec<String>,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub created: usize,
    pub skipped_duplicate: usize,
    pub rejected_invalid: usize,
    pub failed: usize,
    pub notification_failed: usize,
}

/// Result of a bulk import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// In upload order.
    pub rows: Vec<RowReport>,
    /// Emails of created users whose token was not delivered.
    pub notification_failures: Vec<String>,
}

impl ImportReport {
    /// Build a report and its summary from row outcomes.
    #[must_use]
    pub fn from_rows(rows: Vec<RowReport>) -> Self {
        let mut summary = ImportSummary {
            total_rows: rows.len(),
            ..Default::default()
        };
        let mut notification_failures = Vec::new();

        for row in &rows {
            match &row.outcome {
                RowOutcome::Created { delivery, .. } => {
                    summary.created += 1;
                    if delivery.is_failed() {
                        summary.notification_failed += 1;
                        if let Some(email) = &row.email {
                            notification_failures.push(email.clone());
                        }
                    }
                }
                RowOutcome::SkippedDuplicate { .. } => summary.skipped_duplicate += 1,
                RowOutcome::RejectedInvalid { .. } => summary.rejected_invalid += 1,
                RowOutcome::Failed { .. } => summary.failed += 1,
            }
        }

        Self {
            summary,
            rows,
            notification_failures,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP request/response bodies
// ---------------------------------------------------------------------------

/// Report rendering for `POST /bulk-import`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkImportParams {
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
}

/// Body of every `202` from `POST /token/request`, whether or not the email
/// belongs to a user.
#[derive(Debug, Serialize)]
pub struct TokenRequestAccepted {
    pub message: &'static str,
}

impl Default for TokenRequestAccepted {
    fn default() -> Self {
        Self {
            message: "If the address belongs to an account, a token has been sent.",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct CommitPasswordRequest {
    pub token: String,
    pub new_password: String,
}

impl std::fmt::Debug for CommitPasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitPasswordRequest")
            .field("token", &"[REDACTED]")
            .field("new_password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserIdResponse {
    pub user_id: UserId,
}
