//! Bulk import pipeline.
//!
//! 1. Pre-pass ([`parse_csv`]): parse every row, validate locally, mark
//!    in-file duplicates. A structural error rejects the batch before any
//!    write.
//! 2. Candidates are processed concurrently (bounded by
//!    `ImportConfig::concurrency`): directory lookup, insert as `pending`,
//!    then issue an invitation token and notify.
//! 3. Outcomes are collected in upload order once every row is terminal.
//!    A directory failure is a row outcome, so the report always covers the
//!    rows that were already created.

use std::sync::Arc;

use enrol_db::{Directory, NewUser, StoreError, TokenPurpose, UserMetadata};
use futures::stream::{self, StreamExt};

use crate::error::ProvisioningError;
use crate::models::{
    CsvDelimiter, DeliveryStatus, DuplicateSource, ImportConfig, ImportReport, RowOutcome,
    RowReport,
};
use crate::services::csv_parser::{parse_csv, ParsedRow, Triage};
use crate::services::token_lifecycle::TokenLifecycleManager;

pub struct IngestPipeline {
    directory: Arc<dyn Directory>,
    lifecycle: Arc<TokenLifecycleManager>,
    config: ImportConfig,
}

impl IngestPipeline {
    pub fn new(
        directory: Arc<dyn Directory>,
        lifecycle: Arc<TokenLifecycleManager>,
        config: ImportConfig,
    ) -> Self {
        Self {
            directory,
            lifecycle,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import a CSV upload.
    ///
    /// # Errors
    ///
    /// Batch-level only: `FileTooLarge`, `MalformedInput` and `TooManyRows`,
    /// all raised before any write. Directory failures are reported per row
    /// as `RowOutcome::Failed`.
    pub async fn ingest(
        &self,
        data: &[u8],
        delimiter: CsvDelimiter,
    ) -> Result<ImportReport, ProvisioningError> {
        if data.len() > self.config.max_file_bytes {
            return Err(ProvisioningError::FileTooLarge(format!(
                "File size {} bytes exceeds maximum of {} bytes",
                data.len(),
                self.config.max_file_bytes
            )));
        }

        let rows = parse_csv(data, delimiter, &self.config)?;
        tracing::info!(rows = rows.len(), "Import pre-pass complete");

        let rows: Vec<RowReport> = stream::iter(rows)
            .map(|row| self.process_row(row))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = ImportReport::from_rows(rows);

        tracing::info!(
            total = report.summary.total_rows,
            created = report.summary.created,
            skipped_duplicate = report.summary.skipped_duplicate,
            rejected_invalid = report.summary.rejected_invalid,
            failed = report.summary.failed,
            notification_failed = report.summary.notification_failed,
            "Import complete"
        );
        Ok(report)
    }

    async fn process_row(&self, row: ParsedRow) -> RowReport {
        let ParsedRow {
            line_number,
            raw,
            email,
            metadata,
            triage,
        } = row;

        let outcome = match triage {
            Triage::Invalid { column, reason } => {
                tracing::debug!(line = line_number, column = %column, "Row rejected");
                RowOutcome::RejectedInvalid { column, reason }
            }
            Triage::Duplicate(source) => {
                tracing::debug!(line = line_number, "Row skipped, duplicate in file");
                RowOutcome::SkippedDuplicate {
                    duplicate_of: source,
                }
            }
            Triage::Candidate => match self.create_user(line_number, &email, metadata).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(line = line_number, error = %e, "Row failed, directory error");
                    RowOutcome::Failed {
                        reason: format!("directory unavailable: {e}"),
                    }
                }
            },
        };

        RowReport {
            line_number,
            email: (!email.is_empty()).then_some(email),
            raw_row: raw,
            outcome,
        }
    }

    async fn create_user(
        &self,
        line_number: usize,
        email: &str,
        metadata: UserMetadata,
    ) -> Result<RowOutcome, StoreError> {
        let in_directory = RowOutcome::SkippedDuplicate {
            duplicate_of: DuplicateSource::InDirectory,
        };

        if self.directory.find_by_email(email).await?.is_some() {
            tracing::debug!(line = line_number, "Row skipped, user already exists");
            return Ok(in_directory);
        }

        let user = match self
            .directory
            .insert(NewUser {
                email: email.to_string(),
                metadata,
            })
            .await
        {
            Ok(user) => user,
            Err(e) if e.is_conflict() => {
                tracing::debug!(line = line_number, "Row skipped, user created concurrently");
                return Ok(in_directory);
            }
            Err(e) => return Err(e),
        };

        tracing::info!(line = line_number, user_id = %user.id, "User created");

        let delivery = match self
            .lifecycle
            .issue_and_notify(&user, TokenPurpose::Invitation)
            .await
        {
            Ok(dispatched) => dispatched.delivery,
            Err(e) => DeliveryStatus::Failed {
                reason: format!("token could not be issued: {e}"),
            },
        };

        Ok(RowOutcome::Created {
            user_id: user.id,
            delivery,
        })
    }
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
