pub mod data;
pub mod labels;
pub mod template;

pub use data::{
    BoundingBox, DocumentCategory, DocumentType, DualLanguageRecord, ExtractionResult, Language,
    SideValue, TextBlock,
};
pub use labels::{FieldLabel, RECTO_LABELS, VERSO_LABELS};
pub use template::{FieldTemplate, ZoneRule};
