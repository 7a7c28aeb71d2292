use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Inline capacity for per-column sample values.
pub const SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    Numeric,
    Date,
    Text,
    Unknown,
}

impl InferredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferredType::Numeric => "numeric",
            InferredType::Date => "date",
            InferredType::Text => "text",
            InferredType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header plus data rows as read from the upload. Rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Cell `column` of `row`, or `""` when the row is too short.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn column(&self, column: usize) -> Vec<&str> {
        (0..self.rows.len()).map(|row| self.cell(row, column)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: InferredType,
    pub total_cells: usize,
    pub non_empty_cells: usize,
    pub empty_cells: usize,
    pub unique_count: usize,
    pub sample_unique_values: SmallVec<[String; SAMPLE_SIZE]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub headers: Vec<String>,
    pub total_rows: usize,
    pub total_columns: usize,
    pub column_profiles: Vec<ColumnProfile>,
    pub sample_rows: Vec<Vec<String>>,
}

impl DatasetProfile {
    pub fn total_cells(&self) -> usize {
        self.column_profiles.iter().map(|c| c.total_cells).sum()
    }

    pub fn total_empty_cells(&self) -> usize {
        self.column_profiles.iter().map(|c| c.empty_cells).sum()
    }
}

/// Optional dataset facts attached to a question.
///
/// Any subset of fields may be present. Empty header lists and blank
/// summaries count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    #[serde(default)]
    pub total_rows: Option<usize>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl PromptContext {
    pub fn from_profile(profile: &DatasetProfile, summary: &str) -> Self {
        Self {
            headers: Some(profile.headers.clone()),
            total_rows: Some(profile.total_rows),
            summary: Some(summary.to_string()),
        }
    }

    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref().filter(|h| !h.is_empty())
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.headers().is_none() && self.total_rows.is_none() && self.summary().is_none()
    }
}
