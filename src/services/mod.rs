pub mod csv;
pub mod embedding;
pub mod file_processor;
pub mod file_storage;
pub mod llm_agent;
pub mod prompt;
pub mod query;
pub mod session;
pub mod vector_index;
