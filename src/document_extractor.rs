use crate::config::ExtractorConfig;
use crate::models::*;
use crate::processing::id_card::{layout_for, IdCardExtractor};
use crate::processing::registration::{RegistrationParser, RegistrationSide};
use crate::processing::transform::flatten_records;
use crate::processing::{
    DocumentClassifier, ImageProcessor, NameComparator, OcrEngines, PhoneticComparator,
};
use crate::utils::ExtractionError;
use image::DynamicImage;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Accepted by `extract` in place of a concrete document type.
pub const AUTO_DETECT: &str = "auto";

/// Resolves the document type and runs the matching extractor.
pub struct DocumentExtractor {
    config: ExtractorConfig,
    engines: OcrEngines,
    classifier: DocumentClassifier,
    comparator: Option<Arc<dyn NameComparator>>,
}

impl DocumentExtractor {
    pub fn new(config: ExtractorConfig, engines: OcrEngines) -> Self {
        let comparator: Option<Arc<dyn NameComparator>> = if config.name_check {
            Some(Arc::new(PhoneticComparator::default()))
        } else {
            None
        };
        DocumentExtractor {
            classifier: DocumentClassifier::new(engines.clone()),
            config,
            engines,
            comparator,
        }
    }

    // Main entry point: declared type or "auto", image on disk
    pub fn extract(
        &self,
        image_path: &Path,
        document_type: &str,
    ) -> Result<(DocumentType, ExtractionResult), ExtractionError> {
        let declared = Self::parse_type(document_type)?;
        let img = ImageProcessor::load(image_path)?;

        let start = Instant::now();
        let resolved = match declared {
            Some(doc_type) => doc_type,
            None => {
                let detected = self.classifier.detect(&img);
                info!("Detected document type: {}", detected);
                detected
            }
        };

        let result = self.extract_image(&img, resolved)?;
        info!(
            "Extracted {} fields from {} in {:.2}s",
            result.len(),
            resolved,
            start.elapsed().as_secs_f64()
        );
        Ok((resolved, result))
    }

    /// Run the extractor for a known document type on an already loaded image.
    pub fn extract_image(
        &self,
        img: &DynamicImage,
        document_type: DocumentType,
    ) -> Result<ExtractionResult, ExtractionError> {
        match document_type.category() {
            DocumentCategory::IdCard => self.extract_id_card(img, document_type),
            DocumentCategory::RegistrationCard => self.extract_registration(img, document_type),
        }
    }

    fn extract_id_card(
        &self,
        img: &DynamicImage,
        document_type: DocumentType,
    ) -> Result<ExtractionResult, ExtractionError> {
        let layout = layout_for(document_type)
            .ok_or_else(|| ExtractionError::UnknownDocumentType(document_type.to_string()))?;
        let template_path = self.config.template_path(layout.template_file());
        debug!("Loading template {}", template_path.display());
        let template = FieldTemplate::load(&template_path)?;

        let extractor = IdCardExtractor::new(self.engines.clone(), layout, self.comparator.clone());
        extractor.extract(img, &template, self.config.debug_image.as_deref())
    }

    fn extract_registration(
        &self,
        img: &DynamicImage,
        document_type: DocumentType,
    ) -> Result<ExtractionResult, ExtractionError> {
        let side = RegistrationSide::from_document_type(document_type)
            .ok_or_else(|| ExtractionError::UnknownDocumentType(document_type.to_string()))?;
        let parser = RegistrationParser::new(self.engines.clone(), side)
            .with_max_corrections(self.config.max_corrections);
        let records = parser.extract(img)?;
        Ok(flatten_records(&records))
    }

    /// `None` means auto-detection.
    fn parse_type(document_type: &str) -> Result<Option<DocumentType>, ExtractionError> {
        let trimmed = document_type.trim();
        if trimmed.eq_ignore_ascii_case(AUTO_DETECT) {
            return Ok(None);
        }
        trimmed.parse::<DocumentType>().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::MockRecognizer;
    use image::{ImageBuffer, Rgb};
    use std::path::PathBuf;

    const TEMPLATE: &str = r#"{
        "document": "CIN_MAROC",
        "width": 400,
        "height": 250,
        "fields": {
            "prenom_fr": {"x": 0.05, "y": 0.2, "w": 0.4, "h": 0.1, "lang": "fr"},
            "prenom_ar": {"x": 0.55, "y": 0.2, "w": 0.4, "h": 0.1, "lang": "ar"},
            "date_expiration": {"x": 0.3, "y": 0.8, "w": 0.3, "h": 0.1, "lang": "fr"}
        }
    }"#;

    fn save_solid(dir: &Path, name: &str, width: u32, height: u32, rgb: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb(rgb));
        img.save(&path).unwrap();
        path
    }

    fn config_in(dir: &Path) -> ExtractorConfig {
        ExtractorConfig {
            template_dir: dir.to_path_buf(),
            ..ExtractorConfig::default()
        }
    }

    fn engines(primary: MockRecognizer, fallback: MockRecognizer) -> OcrEngines {
        OcrEngines::new(Arc::new(primary), Arc::new(fallback))
    }

    #[test]
    fn test_auto_detects_new_id_card() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cin_new_template.json"), TEMPLATE).unwrap();
        let image_path = save_solid(dir.path(), "card.png", 800, 500, [220, 150, 170]);

        // two classifier passes read nothing, then one call per field
        let primary = MockRecognizer::new("primary")
            .then(Vec::new())
            .then(Vec::new())
            .then_text("AHMED", 0.95)
            .then_text("أحمد", 0.95)
            .then_text("05/11/2031", 0.95);
        let fallback = MockRecognizer::new("fallback").then_text("احمد", 0.90);
        let extractor = DocumentExtractor::new(config_in(dir.path()), engines(primary, fallback));

        let (doc_type, result) = extractor.extract(&image_path, "auto").unwrap();
        assert_eq!(doc_type, DocumentType::CinNew);
        let keys: Vec<&str> = result.keys().collect();
        assert_eq!(keys, vec!["prenom_ar", "prenom_fr", "date_expiration"]);
        assert_eq!(result.get("prenom_ar"), Some("أحمد"));
        assert_eq!(result.get("date_expiration"), Some("05.11.2031"));
    }

    #[test]
    fn test_declared_registration_back_is_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_solid(dir.path(), "verso.png", 1200, 800, [255, 255, 255]);

        let primary = MockRecognizer::new("primary").then(vec![
            TextBlock::new("Marque", BoundingBox::new(40, 120, 120, 30), 0.95),
            TextBlock::new("TOYOTA", BoundingBox::new(400, 122, 130, 30), 0.93),
            TextBlock::new("التجاري", BoundingBox::new(900, 121, 90, 30), 0.9),
            TextBlock::new("الاسم", BoundingBox::new(1000, 121, 70, 30), 0.9),
        ]);
        let extractor = DocumentExtractor::new(
            config_in(dir.path()),
            engines(primary, MockRecognizer::new("fallback")),
        );

        let (doc_type, result) = extractor.extract(&image_path, "carte_grise_verso").unwrap();
        assert_eq!(doc_type, DocumentType::CarteGriseVerso);
        assert_eq!(result.get("marque_fr"), Some("TOYOTA"));
    }

    #[test]
    fn test_input_errors_fail_before_recognition() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_solid(dir.path(), "card.png", 400, 250, [220, 150, 170]);
        let primary = Arc::new(MockRecognizer::new("primary"));
        let extractor = DocumentExtractor::new(
            config_in(dir.path()),
            OcrEngines::new(primary.clone(), Arc::new(MockRecognizer::new("fallback"))),
        );

        let err = extractor.extract(&image_path, "passport").unwrap_err();
        assert!(matches!(err, ExtractionError::UnknownDocumentType(_)));

        let err = extractor.extract(&dir.path().join("missing.png"), "cin_new").unwrap_err();
        assert!(matches!(err, ExtractionError::ImageProcessingError(_)));

        // no template file in the directory
        let err = extractor.extract(&image_path, "cin_old").unwrap_err();
        assert!(matches!(err, ExtractionError::TemplateError(_)));

        assert_eq!(primary.calls(), 0);
    }

    #[test]
    fn test_recognition_failure_aborts_registration() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = save_solid(dir.path(), "recto.png", 600, 400, [255, 255, 255]);
        let extractor = DocumentExtractor::new(
            config_in(dir.path()),
            engines(
                MockRecognizer::new("primary").then_fail("engine gone"),
                MockRecognizer::new("fallback"),
            ),
        );

        let err = extractor.extract(&image_path, "carte_grise_recto").unwrap_err();
        assert_eq!(err.kind(), "recognition");
    }

    #[test]
    fn test_name_check_follows_config() {
        let engines = engines(MockRecognizer::new("p"), MockRecognizer::new("f"));
        let with = DocumentExtractor::new(ExtractorConfig::default(), engines.clone());
        assert!(with.comparator.is_some());

        let config = ExtractorConfig {
            name_check: false,
            ..ExtractorConfig::default()
        };
        let without = DocumentExtractor::new(config, engines);
        assert!(without.comparator.is_none());
    }
}
