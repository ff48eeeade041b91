use crate::convert::models::{OUTPUT_COLUMNS, OutputRow, SourceRow};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("csv input is empty")]
    Empty,
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("csv read failed: {0}")]
    Read(String),
    #[error("csv write failed: {0}")]
    Write(String),
}

const HANDLE_COLUMN: &str = "Handle";

/// Parses a catalog export. Malformed records are skipped with a warning so
/// one bad line does not sink the whole file.
pub fn read_source_rows(text: &str) -> Result<Vec<SourceRow>, CsvError> {
    let text = text.trim_start_matches('\u{FEFF}');
    if text.trim().is_empty() {
        return Err(CsvError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| CsvError::Read(err.to_string()))?
        .clone();
    if !headers.iter().any(|header| header == HANDLE_COLUMN) {
        return Err(CsvError::MissingColumn(HANDLE_COLUMN));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<SourceRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(err) => {
                warn!(target = "forge.convert", line = line + 2, error = %err, "malformed_source_record_skipped");
            }
        }
    }
    Ok(rows)
}

/// Serialises rows with the full header, every column present.
pub fn write_output_rows(rows: &[OutputRow]) -> Result<String, CsvError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(OUTPUT_COLUMNS)
        .map_err(|err| CsvError::Write(err.to_string()))?;
    for row in rows {
        writer
            .write_record(row.cells())
            .map_err(|err| CsvError::Write(err.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| CsvError::Write(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| CsvError::Write(err.to_string()))
}

/// Reads rows previously produced by `write_output_rows`.
pub fn read_output_rows(text: &str) -> Result<Vec<OutputRow>, CsvError> {
    let text = text.trim_start_matches('\u{FEFF}');
    if text.trim().is_empty() {
        return Err(CsvError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| CsvError::Read(err.to_string()))?
        .clone();
    if !headers.iter().any(|header| header == OUTPUT_COLUMNS[0]) {
        return Err(CsvError::MissingColumn(OUTPUT_COLUMNS[0]));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| CsvError::Read(err.to_string()))?;
        rows.push(OutputRow::from_named_cells(headers.iter().zip(record.iter())));
    }
    Ok(rows)
}
