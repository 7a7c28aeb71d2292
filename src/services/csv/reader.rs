use std::collections::HashSet;

use super::utils::clean_column_name;
use crate::error::ProfileError;
use crate::models::RawTable;

/// Splits raw CSV bytes into a sanitized header row and the data rows.
///
/// Rows keep their own length; short rows are not padded here.
pub fn read_table(raw: &[u8]) -> Result<RawTable, ProfileError> {
    let text = std::str::from_utf8(raw).map_err(|e| ProfileError::Decoding(e.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ProfileError::Decoding(e.to_string()))?;
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let mut records = records.into_iter();
    let header_row = records.next().ok_or(ProfileError::EmptyInput)?;

    let mut existing_names = HashSet::new();
    let headers = header_row
        .iter()
        .enumerate()
        .map(|(idx, name)| clean_column_name(name, idx, &mut existing_names))
        .collect();

    Ok(RawTable {
        headers,
        rows: records.collect(),
    })
}
