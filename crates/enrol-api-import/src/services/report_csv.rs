//! CSV rendering of an import report.

use crate::error::ProvisioningError;
use crate::models::{DeliveryStatus, DuplicateSource, ImportReport, RowOutcome};

/// Columns of the downloadable report.
pub const REPORT_HEADERS: &[&str] = &["line_number", "email", "outcome", "detail"];

fn detail(outcome: &RowOutcome) -> String {
    match outcome {
        RowOutcome::Created {
            delivery: DeliveryStatus::Sent,
            ..
        } => "token sent".to_string(),
        RowOutcome::Created {
            delivery: DeliveryStatus::Failed { reason },
            ..
        } => format!("token not delivered: {reason}"),
        RowOutcome::SkippedDuplicate {
            duplicate_of: DuplicateSource::InFile { first_line },
        } => format!("duplicate of line {first_line}"),
        RowOutcome::SkippedDuplicate {
            duplicate_of: DuplicateSource::InDirectory,
        } => "user already exists".to_string(),
        RowOutcome::RejectedInvalid { column, reason } => format!("{column}: {reason}"),
        RowOutcome::Failed { reason } => reason.clone(),
    }
}

/// Render the per-row report as CSV bytes.
pub fn render_report_csv(report: &ImportReport) -> Result<Vec<u8>, ProvisioningError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let internal = |e: csv::Error| ProvisioningError::Internal(format!("CSV write error: {e}"));

    writer.write_record(REPORT_HEADERS).map_err(internal)?;

    for row in &report.rows {
        writer
            .write_record([
                row.line_number.to_string(),
                row.email.clone().unwrap_or_default(),
                row.outcome.label().to_string(),
                detail(&row.outcome),
            ])
            .map_err(internal)?;
    }

    writer
        .into_inner()
        .map_err(|e| ProvisioningError::Internal(format!("CSV flush error: {e}")))
}
