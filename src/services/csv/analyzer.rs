use smallvec::SmallVec;
use std::collections::HashSet;

use super::utils::{is_numeric, looks_like_date};
use crate::config::ProfilerSettings;
use crate::models::{ColumnProfile, InferredType, SAMPLE_SIZE};

const NUMERIC_THRESHOLD: f64 = 0.8;
const DATE_THRESHOLD: f64 = 0.5;

/// Per-column statistics over a bounded prefix of the column.
///
/// Empty counts cover the whole column. Type inference and unique sampling
/// only look at the first `type_inference_window` cells, so their cost does
/// not grow with the file.
#[derive(Debug, Clone, Default)]
pub struct ColumnAnalyzer {
    settings: ProfilerSettings,
}

impl ColumnAnalyzer {
    pub fn new(settings: ProfilerSettings) -> Self {
        Self { settings }
    }

    pub fn analyze_column(&self, name: &str, values: &[&str]) -> ColumnProfile {
        let non_empty_cells = values.iter().filter(|v| !v.trim().is_empty()).count();
        let (unique_count, sample_unique_values) = self.sample_unique(values);

        ColumnProfile {
            name: name.to_string(),
            inferred_type: self.detect_column_type(values),
            total_cells: values.len(),
            non_empty_cells,
            empty_cells: values.len() - non_empty_cells,
            unique_count,
            sample_unique_values,
        }
    }

    /// Numeric wins above 80% of checked cells, then date above 50%.
    ///
    /// Blank cells count toward the checked total but match neither rule.
    /// Only a column without a single non-blank cell is `Unknown`.
    pub fn detect_column_type(&self, values: &[&str]) -> InferredType {
        if values.iter().all(|v| v.trim().is_empty()) {
            return InferredType::Unknown;
        }

        let window = self.window(values);
        let (numeric_count, date_count) = window
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .fold((0usize, 0usize), |(num, date), value| {
                (
                    num + is_numeric(value) as usize,
                    date + looks_like_date(value) as usize,
                )
            });

        let checked = window.len() as f64;
        let numeric_ratio = numeric_count as f64 / checked;
        let date_ratio = date_count as f64 / checked;

        match () {
            _ if numeric_ratio > NUMERIC_THRESHOLD => InferredType::Numeric,
            _ if date_ratio > DATE_THRESHOLD => InferredType::Date,
            _ => InferredType::Text,
        }
    }

    /// Distinct non-blank trimmed values in the window, samples in first-seen order.
    fn sample_unique(&self, values: &[&str]) -> (usize, SmallVec<[String; SAMPLE_SIZE]>) {
        let mut seen = HashSet::new();
        let mut samples = SmallVec::new();

        for value in self.window(values).iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            if seen.insert(value) && samples.len() < self.settings.unique_sample_limit {
                samples.push(value.to_string());
            }
        }

        (seen.len(), samples)
    }

    fn window<'a>(&self, values: &'a [&'a str]) -> &'a [&'a str] {
        &values[..values.len().min(self.settings.type_inference_window)]
    }
}
