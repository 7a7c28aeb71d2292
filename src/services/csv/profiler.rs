use super::analyzer::ColumnAnalyzer;
use super::reader::read_table;
use crate::config::ProfilerSettings;
use crate::error::ProfileError;
use crate::models::{DatasetProfile, RawTable};

/// Turns an uploaded CSV into a [`DatasetProfile`].
///
/// Holds no state between calls, so one profiler can serve concurrent
/// uploads.
#[derive(Debug, Clone)]
pub struct DatasetProfiler {
    analyzer: ColumnAnalyzer,
    sample_row_limit: usize,
}

impl Default for DatasetProfiler {
    fn default() -> Self {
        Self::new(ProfilerSettings::default())
    }
}

impl DatasetProfiler {
    pub fn new(settings: ProfilerSettings) -> Self {
        Self {
            sample_row_limit: settings.sample_row_limit,
            analyzer: ColumnAnalyzer::new(settings),
        }
    }

    pub fn profile(&self, raw: &[u8]) -> Result<DatasetProfile, ProfileError> {
        let start = std::time::Instant::now();
        let table = read_table(raw)?;
        let profile = self.profile_table(table)?;

        tracing::info!(
            "Profiled CSV: {} rows, {} columns in {:?}",
            profile.total_rows,
            profile.total_columns,
            start.elapsed()
        );
        Ok(profile)
    }

    pub fn profile_table(&self, table: RawTable) -> Result<DatasetProfile, ProfileError> {
        if table.headers.is_empty() && table.rows.is_empty() {
            return Err(ProfileError::EmptyInput);
        }

        let column_profiles = table
            .headers
            .iter()
            .enumerate()
            .map(|(idx, name)| self.analyzer.analyze_column(name, &table.column(idx)))
            .collect();

        let sample_rows = table.rows.iter().take(self.sample_row_limit).cloned().collect();

        Ok(DatasetProfile {
            total_rows: table.rows.len(),
            total_columns: table.headers.len(),
            column_profiles,
            sample_rows,
            headers: table.headers,
        })
    }
}
