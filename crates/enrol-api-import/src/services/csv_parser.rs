//! CSV parsing and the single-threaded pre-pass of an import.
//!
//! Handles BOM stripping, configurable delimiters, header validation,
//! per-field validation and in-file duplicate detection. Every row is read
//! before anything is written, so a structural problem anywhere in the file
//! rejects the whole batch.

use std::collections::{BTreeMap, HashMap};

use enrol_db::UserMetadata;

use crate::error::ProvisioningError;
use crate::models::{CsvDelimiter, DuplicateSource, ImportConfig};
use crate::validation::{self, HeaderLayout};

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// What the pre-pass decided about a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triage {
    /// Passed every local check; still needs the directory lookup.
    Candidate,
    Duplicate(DuplicateSource),
    Invalid { column: String, reason: String },
}

/// A data row after the pre-pass.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    /// 1-based line number (header = 1, first data row = 2).
    pub line_number: usize,
    /// Fields exactly as uploaded.
    pub raw: Vec<String>,
    /// Trimmed, lowercased. Empty if the column was blank.
    pub email: String,
    pub metadata: UserMetadata,
    pub triage: Triage,
}

/// Strip UTF-8 BOM from the beginning of data if present.
fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// Parse a CSV upload into triaged rows, in file order.
///
/// # Errors
///
/// `MalformedInput` for an empty file, bad headers, unreadable records or a
/// file with no data rows; `TooManyRows` above `config.max_rows`.
pub fn parse_csv(
    data: &[u8],
    delimiter: CsvDelimiter,
    config: &ImportConfig,
) -> Result<Vec<ParsedRow>, ProvisioningError> {
    let data = strip_utf8_bom(data);

    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ProvisioningError::MalformedInput(
            "CSV file is empty".to_string(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter.as_byte())
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ProvisioningError::MalformedInput(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

    let layout = validation::validate_csv_headers(&headers, &config.required_columns)
        .map_err(ProvisioningError::MalformedInput)?;

    let mut rows = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            ProvisioningError::MalformedInput(format!("Failed to parse CSV row {}: {e}", idx + 2))
        })?;

        if rows.len() == config.max_rows {
            return Err(ProvisioningError::TooManyRows(format!(
                "CSV file exceeds maximum row limit of {}",
                config.max_rows
            )));
        }

        let line_number = record
            .position()
            .map_or(idx + 2, |p| usize::try_from(p.line()).unwrap_or(idx + 2));

        rows.push(triage_row(
            &record,
            line_number,
            &layout,
            &config.required_columns,
            &mut first_seen,
        ));
    }

    if rows.is_empty() {
        return Err(ProvisioningError::MalformedInput(
            "CSV file contains no data rows".to_string(),
        ));
    }

    Ok(rows)
}

/// Local checks in order: email syntax, in-file duplicate, required fields.
///
/// The first row carrying a syntactically valid email claims it, even if the
/// row is rejected for another field.
fn triage_row(
    record: &csv::StringRecord,
    line_number: usize,
    layout: &HeaderLayout,
    required: &[String],
    first_seen: &mut HashMap<String, usize>,
) -> ParsedRow {
    let raw: Vec<String> = record.iter().map(str::to_string).collect();
    let email = layout
        .index_of("email")
        .and_then(|i| record.get(i))
        .map(validation::normalize_email)
        .unwrap_or_default();
    let metadata = extract_metadata(record, layout);

    let triage = if let Err(reason) = validation::validate_email(&email) {
        Triage::Invalid {
            column: "email".to_string(),
            reason,
        }
    } else if let Some(&first_line) = first_seen.get(&email) {
        Triage::Duplicate(DuplicateSource::InFile { first_line })
    } else {
        first_seen.insert(email.clone(), line_number);
        match required
            .iter()
            .find(|col| get_field(record, layout, col).is_none())
        {
            Some(col) => Triage::Invalid {
                column: col.clone(),
                reason: "Required field is empty".to_string(),
            },
            None => Triage::Candidate,
        }
    };

    ParsedRow {
        line_number,
        raw,
        email,
        metadata,
        triage,
    }
}

fn extract_metadata(record: &csv::StringRecord, layout: &HeaderLayout) -> UserMetadata {
    let mut attributes = BTreeMap::new();
    for (col_name, col_idx) in &layout.custom_columns {
        if let Some(val) = record.get(*col_idx) {
            let trimmed = val.trim();
            if !trimmed.is_empty() {
                attributes.insert(col_name.clone(), trimmed.to_string());
            }
        }
    }

    UserMetadata {
        first_name: get_field(record, layout, "first_name"),
        last_name: get_field(record, layout, "last_name"),
        display_name: get_field(record, layout, "display_name")
            .map(|n| validation::sanitize_display_name(&n))
            .filter(|n| !n.is_empty()),
        university: get_field(record, layout, "university"),
        department: get_field(record, layout, "department"),
        student_id: get_field(record, layout, "student_id"),
        attributes,
    }
}

/// A trimmed, non-empty field by column name.
fn get_field(record: &csv::StringRecord, layout: &HeaderLayout, name: &str) -> Option<String> {
    layout
        .index_of(name)
        .and_then(|idx| record.get(idx))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "email,first_name,last_name,university";

    fn parse(csv: &str) -> Result<Vec<ParsedRow>, ProvisioningError> {
        parse_csv(csv.as_bytes(), CsvDelimiter::Comma, &ImportConfig::default())
    }

    #[test]
    fn test_parse_valid_rows() {
        let rows = parse(&format!(
            "{HEADER}\nAlice@U.edu,Alice,Smith,Uni A\nbob@u.edu,Bob,Jones,Uni B\n"
        ))
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line_number, 2);
        assert_eq!(rows[0].email, "alice@u.edu");
        assert_eq!(rows[0].raw[0], "Alice@U.edu");
        assert_eq!(rows[0].metadata.university.as_deref(), Some("Uni A"));
        assert_eq!(rows[1].triage, Triage::Candidate);
    }

    #[test]
    fn test_duplicate_in_file_points_at_first_line() {
        let rows = parse(&format!(
            "{HEADER}\nalice@u.edu,A,S,U\nbob@u.edu,B,J,U\nALICE@u.edu,A,S,U\n"
        ))
        .unwrap();

        assert_eq!(rows[0].triage, Triage::Candidate);
        assert_eq!(
            rows[2].triage,
            Triage::Duplicate(DuplicateSource::InFile { first_line: 2 })
        );
    }

    #[test]
    fn test_invalid_first_occurrence_still_claims_email() {
        let rows = parse(&format!("{HEADER}\nalice@u.edu,A,S,\nalice@u.edu,A,S,U\n")).unwrap();

        assert_eq!(
            rows[0].triage,
            Triage::Invalid {
                column: "university".into(),
                reason: "Required field is empty".into()
            }
        );
        assert_eq!(
            rows[1].triage,
            Triage::Duplicate(DuplicateSource::InFile { first_line: 2 })
        );
    }

    #[test]
    fn test_bad_email_is_rejected_and_not_claimed() {
        let rows = parse(&format!("{HEADER}\nbad-email,A,S,U\nbad-email,A,S,U\n")).unwrap();
        for row in rows {
            assert!(matches!(row.triage, Triage::Invalid { ref column, .. } if column == "email"));
        }
    }

    #[test]
    fn test_short_row_reports_missing_field() {
        let rows = parse(&format!("{HEADER}\ncarol@u.edu,Carol\n")).unwrap();
        assert!(
            matches!(&rows[0].triage, Triage::Invalid { column, .. } if column == "last_name")
        );
    }

    #[test]
    fn test_bom_semicolon_and_custom_columns() {
        let data = "\u{feff}Email;First_Name;Last_Name;University;Cohort\nalice@u.edu;A;S;U;2026\n";
        let rows = parse_csv(
            data.as_bytes(),
            CsvDelimiter::Semicolon,
            &ImportConfig::default(),
        )
        .unwrap();

        assert_eq!(rows[0].triage, Triage::Candidate);
        assert_eq!(
            rows[0].metadata.attributes.get("Cohort").map(String::as_str),
            Some("2026")
        );
    }

    #[test]
    fn test_display_name_is_sanitized() {
        let rows = parse(
            "email,first_name,last_name,university,display_name\n\
             alice@u.edu,A,S,U,<b>Alice</b><script>x()</script>\n",
        )
        .unwrap();
        assert_eq!(rows[0].metadata.display_name.as_deref(), Some("<b>Alice</b>"));
    }

    #[test]
    fn test_empty_file_is_malformed() {
        assert!(matches!(parse(""), Err(ProvisioningError::MalformedInput(_))));
        assert!(matches!(parse("\n  \n"), Err(ProvisioningError::MalformedInput(_))));
    }

    #[test]
    fn test_header_only_is_malformed() {
        assert!(matches!(
            parse(&format!("{HEADER}\n")),
            Err(ProvisioningError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_missing_required_header_is_malformed() {
        let err = parse("email,first_name\nalice@u.edu,A\n").unwrap_err();
        assert!(matches!(err, ProvisioningError::MalformedInput(msg) if msg.contains("university")));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut data = format!("{HEADER}\nalice@u.edu,A,S,").into_bytes();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        let result = parse_csv(&data, CsvDelimiter::Comma, &ImportConfig::default());
        assert!(matches!(result, Err(ProvisioningError::MalformedInput(_))));
    }

    #[test]
    fn test_row_limit() {
        let config = ImportConfig {
            max_rows: 2,
            ..Default::default()
        };
        let data = format!("{HEADER}\na@u.edu,A,S,U\nb@u.edu,B,S,U\nc@u.edu,C,S,U\n");
        let result = parse_csv(data.as_bytes(), CsvDelimiter::Comma, &config);
        assert!(matches!(result, Err(ProvisioningError::TooManyRows(_))));

        let data = format!("{HEADER}\na@u.edu,A,S,U\nb@u.edu,B,S,U\n");
        assert_eq!(
            parse_csv(data.as_bytes(), CsvDelimiter::Comma, &config)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_quoted_multiline_field_keeps_line_numbers() {
        let rows = parse(&format!(
            "{HEADER}\n\"alice@u.edu\",\"A\",\"S\",\"Uni\nof Somewhere\"\nbob@u.edu,B,J,U\n"
        ))
        .unwrap();
        assert_eq!(rows[0].line_number, 2);
        assert_eq!(rows[1].line_number, 4);
    }
}
