use crate::models::{
    data::{joined_text, mean_confidence},
    BoundingBox, DocumentType, ExtractionResult, FieldTemplate, Language, TextBlock,
};
use crate::processing::image::ImageProcessor;
use crate::processing::ocr::OcrEngines;
use crate::processing::text::{
    is_allowed_fragment, is_wrong_script, normalize_date, reorder_identity_fields, NameComparator,
};
use crate::utils::ExtractionError;
use image::DynamicImage;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

/// Layout-specific preprocessing and acceptance threshold of an ID card.
pub trait LayoutStrategy: Send + Sync {
    fn document_type(&self) -> DocumentType;
    fn template_file(&self) -> &'static str;
    /// Mean primary confidence below which the fallback recognizer is consulted.
    fn confidence_threshold(&self) -> f32;
    fn preprocess_primary(&self, zone: &DynamicImage) -> DynamicImage;
    fn preprocess_fallback(&self, zone: &DynamicImage) -> DynamicImage;
}

/// Pink banner cards: clean print, strong contrast plus Otsu.
pub struct NewLayout;

impl LayoutStrategy for NewLayout {
    fn document_type(&self) -> DocumentType {
        DocumentType::CinNew
    }

    fn template_file(&self) -> &'static str {
        "cin_new_template.json"
    }

    fn confidence_threshold(&self) -> f32 {
        0.80
    }

    fn preprocess_primary(&self, zone: &DynamicImage) -> DynamicImage {
        let contrasted = ImageProcessor::scale_contrast(&zone.to_luma8(), 1.5);
        DynamicImage::ImageLuma8(ImageProcessor::otsu_binarize(&contrasted))
    }

    fn preprocess_fallback(&self, zone: &DynamicImage) -> DynamicImage {
        zone.clone()
    }
}

/// Green banner cards: worn print and a guilloche background.
pub struct OldLayout;

const OLD_UPSCALE: u32 = 3;
const OLD_CLAHE_CLIP: f32 = 1.5;
const OLD_CLAHE_GRID: u32 = 8;
const OLD_TO_ZERO_LEVEL: u8 = 146;

impl LayoutStrategy for OldLayout {
    fn document_type(&self) -> DocumentType {
        DocumentType::CinOld
    }

    fn template_file(&self) -> &'static str {
        "cin_old_template.json"
    }

    fn confidence_threshold(&self) -> f32 {
        0.60
    }

    fn preprocess_primary(&self, zone: &DynamicImage) -> DynamicImage {
        let contrasted = ImageProcessor::scale_contrast(&zone.to_luma8(), 1.3);
        DynamicImage::ImageLuma8(ImageProcessor::otsu_binarize(&contrasted))
    }

    fn preprocess_fallback(&self, zone: &DynamicImage) -> DynamicImage {
        let big = ImageProcessor::upscale(zone, OLD_UPSCALE);
        let equalized = ImageProcessor::clahe(&big.to_luma8(), OLD_CLAHE_CLIP, OLD_CLAHE_GRID);
        DynamicImage::ImageLuma8(ImageProcessor::to_zero(&equalized, OLD_TO_ZERO_LEVEL))
    }
}

pub fn layout_for(document_type: DocumentType) -> Option<Box<dyn LayoutStrategy>> {
    match document_type {
        DocumentType::CinNew => Some(Box::new(NewLayout)),
        DocumentType::CinOld => Some(Box::new(OldLayout)),
        _ => None,
    }
}

/// Reads every template zone of an ID card with the primary recognizer.
/// Empty or wrong-script zones are read again by the fallback; weak Arabic
/// names are re-read and arbitrated by the name check.
pub struct IdCardExtractor {
    engines: OcrEngines,
    layout: Box<dyn LayoutStrategy>,
    comparator: Option<Arc<dyn NameComparator>>,
}

impl IdCardExtractor {
    pub fn new(
        engines: OcrEngines,
        layout: Box<dyn LayoutStrategy>,
        comparator: Option<Arc<dyn NameComparator>>,
    ) -> Self {
        IdCardExtractor {
            engines,
            layout,
            comparator,
        }
    }

    pub fn extract(
        &self,
        img: &DynamicImage,
        template: &FieldTemplate,
        debug_path: Option<&Path>,
    ) -> Result<ExtractionResult, ExtractionError> {
        info!(
            "Reading {} zones of a {} card",
            template.fields.len(),
            self.layout.document_type()
        );
        let img = ImageProcessor::resize_to(img, template.width, template.height);
        let mut results = ExtractionResult::new();
        let mut zones: Vec<BoundingBox> = Vec::with_capacity(template.fields.len());

        for (field, rule) in &template.fields {
            let (zone, bbox) = ImageProcessor::safe_crop(&img, rule);
            debug!("{} zone {:?}", field, bbox);
            zones.push(bbox);

            let mut text = self.read_field(field, &zone, &results);
            if field.contains("date") {
                text = normalize_date(&text);
            }
            results.insert(field.as_str(), text);
        }

        if let Some(path) = debug_path {
            let annotated = ImageProcessor::annotate(&img, &zones);
            match ImageProcessor::save_annotated(&annotated, path) {
                Ok(()) => info!("Debug zones written to {}", path.display()),
                Err(e) => warn!("{}", e),
            }
        }

        Ok(reorder_identity_fields(results))
    }

    fn read_field(&self, field: &str, zone: &DynamicImage, results: &ExtractionResult) -> String {
        let primary_input = self.layout.preprocess_primary(zone);
        let blocks = match self.engines.primary.recognize(&primary_input) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Primary recognition failed for {}: {}", field, e);
                return String::new();
            }
        };
        let blocks: Vec<TextBlock> = blocks
            .into_iter()
            .filter(|b| is_allowed_fragment(&b.text))
            .collect();

        if blocks.is_empty() {
            debug!("{}: no usable fragments, using fallback", field);
            return self.read_fallback(field, zone).unwrap_or_default();
        }

        let text = joined_text(&blocks);
        let confidence = mean_confidence(&blocks);

        if is_wrong_script(field, &text) {
            debug!("{}: '{}' has the wrong script, using fallback", field, text);
            return self.read_fallback(field, zone).unwrap_or(text);
        }

        let is_arabic_field = Language::of_field(field) == Some(Language::Ar);
        if !is_arabic_field && confidence >= self.layout.confidence_threshold() {
            return text;
        }

        // Only the name check can overrule a primary reading that passed the filters.
        let Some((comparator, french)) = self.name_check_target(field, results) else {
            debug!("{}: '{}' ({:.2}) kept, no name check", field, text, confidence);
            return text;
        };
        let Some(fallback_text) = self.read_fallback(field, zone) else {
            return text;
        };

        let primary_score = comparator.compare(&text, french).score;
        let fallback_score = comparator.compare(&fallback_text, french).score;
        debug!(
            "{}: primary '{}' ({:.3}), fallback '{}' ({:.3}) against '{}'",
            field, text, primary_score, fallback_text, fallback_score, french
        );
        if fallback_score > primary_score {
            fallback_text
        } else {
            text
        }
    }

    fn read_fallback(&self, field: &str, zone: &DynamicImage) -> Option<String> {
        let input = self.layout.preprocess_fallback(zone);
        match self.engines.fallback.recognize(&input) {
            Ok(blocks) => Some(joined_text(&blocks)),
            Err(e) => {
                warn!("Fallback recognition failed for {}: {}", field, e);
                None
            }
        }
    }

    /// Comparator and already extracted `_fr` counterpart of an `_ar` field.
    fn name_check_target<'a>(
        &'a self,
        field: &str,
        results: &'a ExtractionResult,
    ) -> Option<(&'a dyn NameComparator, &'a str)> {
        let comparator = self.comparator.as_deref()?;
        let stem = field.strip_suffix("_ar")?;
        let french = results
            .get(&format!("{}_fr", stem))
            .filter(|v| !v.trim().is_empty())?;
        Some((comparator, french))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ocr::MockRecognizer;
    use crate::processing::text::{contains_arabic, PhoneticComparator};
    use image::{ImageBuffer, Rgb};

    const TEMPLATE: &str = r#"{
        "document": "CIN_MAROC",
        "width": 400,
        "height": 250,
        "fields": {
            "prenom_fr": {"x": 0.05, "y": 0.20, "w": 0.40, "h": 0.10, "lang": "fr"},
            "prenom_ar": {"x": 0.55, "y": 0.20, "w": 0.40, "h": 0.10, "lang": "ar"},
            "nom_fr": {"x": 0.05, "y": 0.32, "w": 0.40, "h": 0.10, "lang": "fr"},
            "nom_ar": {"x": 0.55, "y": 0.32, "w": 0.40, "h": 0.10, "lang": "ar"},
            "date_naissance": {"x": 0.30, "y": 0.45, "w": 0.40, "h": 0.10, "lang": "fr"},
            "cin": {"x": 0.70, "y": 0.90, "w": 0.50, "h": 0.30, "lang": "fr"}
        }
    }"#;

    fn card() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(800, 500, |x, y| {
            if y < 100 {
                Rgb([220u8, 150, 170])
            } else if (x / 8 + y / 8) % 2 == 0 {
                Rgb([240u8, 240, 240])
            } else {
                Rgb([30u8, 30, 30])
            }
        }))
    }

    fn template() -> FieldTemplate {
        FieldTemplate::from_json_str(TEMPLATE).unwrap()
    }

    fn extractor(
        primary: Arc<MockRecognizer>,
        fallback: Arc<MockRecognizer>,
        layout: Box<dyn LayoutStrategy>,
        comparator: Option<Arc<dyn NameComparator>>,
    ) -> IdCardExtractor {
        IdCardExtractor::new(OcrEngines::new(primary, fallback), layout, comparator)
    }

    #[test]
    fn test_new_layout_end_to_end() {
        let primary = Arc::new(
            MockRecognizer::new("primary")
                .then_text("AHMED", 0.95)
                .then_text("أحمد", 0.90)
                .then_text("ALAM1", 0.50)
                .then_text("ALAMI", 0.90)
                .then_text("|", 0.90)
                .then_text("AB123456", 0.95),
        );
        let fallback = Arc::new(
            MockRecognizer::new("fallback")
                .then_text("احمد", 0.70)
                .then_text("العلمي", 0.80)
                .then_text("12 03 1990", 0.60),
        );
        let comparator: Arc<dyn NameComparator> = Arc::new(PhoneticComparator::default());
        let extractor = extractor(primary.clone(), fallback.clone(), Box::new(NewLayout), Some(comparator));

        let result = extractor.extract(&card(), &template(), None).unwrap();

        let keys: Vec<&str> = result.keys().collect();
        assert_eq!(
            keys,
            vec!["prenom_ar", "prenom_fr", "nom_ar", "nom_fr", "date_naissance", "cin"]
        );
        // equal name-check scores keep the primary reading
        assert_eq!(result.get("prenom_ar"), Some("أحمد"));
        assert_eq!(result.get("prenom_fr"), Some("AHMED"));
        // weak French reading with nothing to check it against stays
        assert_eq!(result.get("nom_fr"), Some("ALAM1"));
        assert_eq!(result.get("nom_ar"), Some("العلمي"));
        assert_eq!(result.get("date_naissance"), Some("12.03.1990"));
        assert_eq!(result.get("cin"), Some("AB123456"));

        for (field, value) in result.iter() {
            assert!(!value.is_empty(), "{} is empty", field);
            if field.ends_with("_ar") {
                assert!(contains_arabic(value));
            }
            if field.ends_with("_fr") {
                assert!(!contains_arabic(value));
            }
        }

        assert_eq!(primary.calls(), 6);
        assert_eq!(fallback.calls(), 3);
    }

    #[test]
    fn test_low_confidence_without_name_check_keeps_primary() {
        let primary = Arc::new(MockRecognizer::new("primary").then_text("AB123456", 0.50));
        let fallback = Arc::new(MockRecognizer::new("fallback").then_text("A8I2E4S6", 0.70));
        let template = FieldTemplate::from_json_str(
            r#"{"document": "t", "width": 400, "height": 250, "fields": {
                "cin": {"x": 0.7, "y": 0.85, "w": 0.25, "h": 0.1, "lang": "fr"}
            }}"#,
        )
        .unwrap();
        let extractor = extractor(primary, fallback.clone(), Box::new(NewLayout), None);

        let result = extractor.extract(&card(), &template, None).unwrap();
        assert_eq!(result.get("cin"), Some("AB123456"));
        assert_eq!(fallback.calls(), 0);
    }

    #[test]
    fn test_name_check_prefers_matching_transliteration() {
        let primary = Arc::new(
            MockRecognizer::new("primary")
                .then_text("MOHAMED", 0.95)
                .then_text("فاطمة", 0.95),
        );
        let fallback = Arc::new(MockRecognizer::new("fallback").then_text("محمد", 0.40));
        let template = FieldTemplate::from_json_str(
            r#"{"document": "t", "width": 400, "height": 250, "fields": {
                "prenom_fr": {"x": 0.05, "y": 0.2, "w": 0.4, "h": 0.1, "lang": "fr"},
                "prenom_ar": {"x": 0.55, "y": 0.2, "w": 0.4, "h": 0.1, "lang": "ar"}
            }}"#,
        )
        .unwrap();

        let comparator: Arc<dyn NameComparator> = Arc::new(PhoneticComparator::default());
        let with_check = extractor(primary, fallback, Box::new(NewLayout), Some(comparator));
        let result = with_check.extract(&card(), &template, None).unwrap();
        assert_eq!(result.get("prenom_ar"), Some("محمد"));

        // without the name check the primary reading stays
        let primary = Arc::new(
            MockRecognizer::new("primary")
                .then_text("MOHAMED", 0.95)
                .then_text("فاطمة", 0.95),
        );
        let fallback = Arc::new(MockRecognizer::new("fallback").then_text("محمد", 0.40));
        let without_check = extractor(primary, fallback, Box::new(NewLayout), None);
        let result = without_check.extract(&card(), &template, None).unwrap();
        assert_eq!(result.get("prenom_ar"), Some("فاطمة"));
    }

    #[test]
    fn test_recognizer_errors_leave_field_empty() {
        let primary = Arc::new(
            MockRecognizer::new("primary")
                .then_fail("engine busy")
                .with_default(vec![]),
        );
        let fallback = Arc::new(MockRecognizer::new("fallback").then_fail("down"));
        let extractor = extractor(primary, fallback, Box::new(NewLayout), None);

        let result = extractor.extract(&card(), &template(), None).unwrap();
        assert_eq!(result.len(), 6);
        assert_eq!(result.get("prenom_fr"), Some(""));
    }

    #[test]
    fn test_old_layout_upscales_fallback_zone() {
        let primary = Arc::new(MockRecognizer::new("primary").then_text("#%", 0.30));
        let fallback = Arc::new(MockRecognizer::new("fallback").then_text("AB123456", 0.20));
        let template = FieldTemplate::from_json_str(
            r#"{"document": "t", "width": 400, "height": 250, "fields": {
                "cin": {"x": 0.1, "y": 0.1, "w": 0.25, "h": 0.1, "lang": "fr"}
            }}"#,
        )
        .unwrap();
        let extractor = extractor(primary.clone(), fallback.clone(), Box::new(OldLayout), None);

        let result = extractor.extract(&card(), &template, None).unwrap();
        // nothing usable from the primary pass
        assert_eq!(result.get("cin"), Some("AB123456"));
        assert_eq!(primary.region_sizes(), vec![(100, 25)]);
        assert_eq!(fallback.region_sizes(), vec![(300, 75)]);
    }

    #[test]
    fn test_debug_image_is_written() {
        let primary = Arc::new(MockRecognizer::new("primary").with_default(vec![]));
        let fallback = Arc::new(MockRecognizer::new("fallback"));
        let extractor = extractor(primary, fallback, Box::new(NewLayout), None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.png");
        extractor.extract(&card(), &template(), Some(&path)).unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (400, 250));
    }

    #[test]
    fn test_layout_selection() {
        assert_eq!(layout_for(DocumentType::CinOld).unwrap().template_file(), "cin_old_template.json");
        assert_eq!(layout_for(DocumentType::CinNew).unwrap().confidence_threshold(), 0.80);
        assert!(layout_for(DocumentType::CarteGriseRecto).is_none());
    }
}
