//! Bulk import handler.
//!
//! - POST /bulk-import: multipart upload (`file`, optional `delimiter`).
//!   Returns the report as JSON, or as CSV with `?format=csv`.

use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::multipart::{Multipart, MultipartError};

use crate::error::ProvisioningError;
use crate::models::{BulkImportParams, CsvDelimiter, ReportFormat};
use crate::router::ProvisioningState;
use crate::services::report_csv::render_report_csv;

fn multipart_error(e: &MultipartError) -> ProvisioningError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProvisioningError::FileTooLarge(e.body_text())
    } else {
        ProvisioningError::MalformedInput(format!("Multipart read error: {}", e.body_text()))
    }
}

/// POST /bulk-import
pub async fn bulk_import(
    Extension(state): Extension<ProvisioningState>,
    Query(params): Query<BulkImportParams>,
    mut multipart: Multipart,
) -> Result<Response, ProvisioningError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut delimiter = CsvDelimiter::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await.map_err(|e| multipart_error(&e))?;
                file_data = Some(bytes.to_vec());
            }
            "delimiter" => {
                let text = field.text().await.map_err(|e| multipart_error(&e))?;
                delimiter =
                    CsvDelimiter::parse(text.trim()).map_err(ProvisioningError::MalformedInput)?;
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or_else(|| {
        ProvisioningError::MalformedInput("No 'file' field found in multipart upload".to_string())
    })?;

    let report = state.pipeline.ingest(&data, delimiter).await?;

    match params.format {
        ReportFormat::Json => Ok(Json(report).into_response()),
        ReportFormat::Csv => {
            let body = render_report_csv(&report)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"import-report.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}
