use super::utils::group_thousands;
use crate::models::{DatasetProfile, InferredType};

/// Renders profiles as prose for prompts and as chunks for embedding.
///
/// Output is a pure function of the profile, so a summary never needs to be
/// stored next to the profile it came from.
#[derive(Debug, Clone)]
pub struct SummaryCompressor {
    chunk_row_limit: usize,
}

impl Default for SummaryCompressor {
    fn default() -> Self {
        Self { chunk_row_limit: 10 }
    }
}

impl SummaryCompressor {
    pub fn new(chunk_row_limit: usize) -> Self {
        Self { chunk_row_limit }
    }

    pub fn summarize(&self, profile: &DatasetProfile) -> String {
        let mut summary_parts = vec![
            format!(
                "This dataset contains {} rows and {} columns.",
                group_thousands(profile.total_rows),
                profile.total_columns
            ),
            format!("The columns are: {}.", profile.headers.join(", ")),
        ];

        let type_counts = type_counts(profile);
        if !type_counts.is_empty() {
            let type_summary: Vec<String> = type_counts
                .iter()
                .map(|(data_type, count)| format!("{} {}", count, data_type))
                .collect();
            summary_parts.push(format!("Column types: {}.", type_summary.join(", ")));
        }

        let total_cells = profile.total_cells();
        let total_empty = profile.total_empty_cells();
        if total_empty > 0 {
            let empty_percentage = total_empty as f64 / total_cells as f64 * 100.0;
            summary_parts.push(format!(
                "Data completeness: {:.1}% of cells contain data.",
                100.0 - empty_percentage
            ));
        }

        summary_parts.join(" ")
    }

    /// Column list, then the summary, then one chunk per sample row.
    pub fn chunks_for_embedding(&self, profile: &DatasetProfile) -> Vec<String> {
        let mut chunks = Vec::with_capacity(2 + profile.sample_rows.len().min(self.chunk_row_limit));
        chunks.push(format!("Dataset columns: {}", profile.headers.join(", ")));
        chunks.push(self.summarize(profile));

        chunks.extend(
            profile
                .sample_rows
                .iter()
                .take(self.chunk_row_limit)
                .enumerate()
                .map(|(i, row)| format!("Row {}: {}", i + 1, row.join(", "))),
        );

        chunks
    }
}

/// Column count per inferred type, in first-seen order.
fn type_counts(profile: &DatasetProfile) -> Vec<(InferredType, usize)> {
    let mut counts: Vec<(InferredType, usize)> = Vec::new();
    for column in &profile.column_profiles {
        match counts.iter_mut().find(|(t, _)| *t == column.inferred_type) {
            Some((_, count)) => *count += 1,
            None => counts.push((column.inferred_type, 1)),
        }
    }
    counts
}

pub fn summarize(profile: &DatasetProfile) -> String {
    SummaryCompressor::default().summarize(profile)
}

pub fn chunks_for_embedding(profile: &DatasetProfile) -> Vec<String> {
    SummaryCompressor::default().chunks_for_embedding(profile)
}
