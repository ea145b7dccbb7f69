use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Image processing error: {0}")]
    ImageProcessingError(String),
    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),
    #[error("Template error: {0}")]
    TemplateError(String),
    #[error("OCR engine initialization failed: {0}")]
    EngineInitError(String),
    #[error("OCR recognition error: {0}")]
    RecognitionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<image::ImageError> for ExtractionError {
    fn from(err: image::ImageError) -> Self {
        ExtractionError::ImageProcessingError(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractionError {
    fn from(err: serde_json::Error) -> Self {
        ExtractionError::TemplateError(err.to_string())
    }
}

impl ExtractionError {
    /// Short machine-readable label used in the CLI error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::ImageProcessingError(_) => "image_processing",
            ExtractionError::UnknownDocumentType(_) => "unknown_document_type",
            ExtractionError::TemplateError(_) => "template",
            ExtractionError::EngineInitError(_) => "engine_init",
            ExtractionError::RecognitionError(_) => "recognition",
            ExtractionError::ConfigError(_) => "config",
            ExtractionError::IoError(_) => "io",
        }
    }
}
