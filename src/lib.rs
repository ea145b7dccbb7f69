pub mod config;
pub mod document_extractor;
pub mod models;
pub mod processing;
pub mod utils;

pub use config::ExtractorConfig;
pub use document_extractor::DocumentExtractor;
pub use models::{DocumentType, ExtractionResult};
pub use utils::ExtractionError;
