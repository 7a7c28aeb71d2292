pub mod analyzer;
pub mod profiler;
pub mod reader;
pub mod summary;
pub mod utils;

pub use analyzer::ColumnAnalyzer;
pub use profiler::DatasetProfiler;
pub use reader::read_table;
pub use summary::{chunks_for_embedding, summarize, SummaryCompressor};

use crate::error::ProfileError;
use crate::models::DatasetProfile;

/// Profiles raw CSV bytes with the default sampling caps.
pub fn profile(raw: &[u8]) -> Result<DatasetProfile, ProfileError> {
    DatasetProfiler::default().profile(raw)
}
