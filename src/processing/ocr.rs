use crate::config::ExtractorConfig;
use crate::models::{BoundingBox, TextBlock};
use crate::processing::image::ImageProcessor;
use crate::utils::ExtractionError;
use image::DynamicImage;
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tesseract::{PageSegMode, Tesseract};

/// Detects text in an image region. Implementations must be shareable across
/// threads; an empty or textless region yields an empty list.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, region: &DynamicImage) -> Result<Vec<TextBlock>, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerProfile {
    /// Word positions within a single uniform block of text.
    Primary,
    /// Sparse text in no particular order, used to retry weak fields.
    Fallback,
}

impl RecognizerProfile {
    pub fn page_seg_mode(&self) -> PageSegMode {
        match self {
            RecognizerProfile::Primary => PageSegMode::PsmSingleBlock,
            RecognizerProfile::Fallback => PageSegMode::PsmSparseText,
        }
    }

    pub fn default_languages(&self) -> &'static str {
        match self {
            RecognizerProfile::Primary => "fra+ara",
            RecognizerProfile::Fallback => "ara+fra+eng",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RecognizerProfile::Primary => "tesseract-primary",
            RecognizerProfile::Fallback => "tesseract-fallback",
        }
    }
}

/// Tesseract-backed recognizer. The engine is not reentrant, so every call
/// holds the lock for the whole recognition.
pub struct TesseractRecognizer {
    profile: RecognizerProfile,
    languages: String,
    datapath: Option<String>,
    engine: Mutex<Option<Tesseract>>,
}

impl TesseractRecognizer {
    pub fn new(
        profile: RecognizerProfile,
        languages: &str,
        datapath: Option<&str>,
    ) -> Result<Self, ExtractionError> {
        let engine = Self::init_engine(profile, languages, datapath)?;
        info!("Initialized {} with languages {}", profile.label(), languages);
        Ok(TesseractRecognizer {
            profile,
            languages: languages.to_string(),
            datapath: datapath.map(str::to_string),
            engine: Mutex::new(Some(engine)),
        })
    }

    fn init_engine(
        profile: RecognizerProfile,
        languages: &str,
        datapath: Option<&str>,
    ) -> Result<Tesseract, ExtractionError> {
        let mut tess = Tesseract::new(datapath, Some(languages)).map_err(|e| {
            ExtractionError::EngineInitError(format!(
                "Failed to initialize Tesseract with {}: {}",
                languages, e
            ))
        })?;
        tess.set_page_seg_mode(profile.page_seg_mode());
        Ok(tess)
    }

    fn run(&self, engine: Tesseract, png: &[u8]) -> Result<(Tesseract, String), ExtractionError> {
        let mut tess = engine
            .set_image_from_mem(png)
            .map_err(|e| ExtractionError::RecognitionError(format!("Failed to set image: {}", e)))?
            .recognize()
            .map_err(|e| ExtractionError::RecognitionError(format!("Recognition failed: {}", e)))?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| ExtractionError::RecognitionError(format!("TSV output failed: {}", e)))?;
        Ok((tess, tsv))
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        self.profile.label()
    }

    fn recognize(&self, region: &DynamicImage) -> Result<Vec<TextBlock>, ExtractionError> {
        if region.width() == 0 || region.height() == 0 {
            return Ok(Vec::new());
        }
        let png = ImageProcessor::encode_png(region)?;

        let mut slot = self
            .engine
            .lock()
            .map_err(|_| ExtractionError::RecognitionError("engine lock poisoned".to_string()))?;

        // A failed call consumes the handle; start from a fresh engine then.
        let engine = match slot.take() {
            Some(engine) => engine,
            None => {
                debug!("Re-initializing {}", self.profile.label());
                Self::init_engine(self.profile, &self.languages, self.datapath.as_deref())?
            }
        };

        let (engine, tsv) = self.run(engine, &png)?;
        *slot = Some(engine);
        Ok(parse_tsv(&tsv))
    }
}

/// Word rows (level 5) of Tesseract TSV output with a positive confidence and
/// non-blank text. Confidence is rescaled from 0-100 to 0-1.
pub fn parse_tsv(tsv: &str) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    for row in tsv.lines() {
        let tokens: Vec<&str> = row.split('\t').collect();
        if tokens.len() < 12 || tokens[0] != "5" {
            continue;
        }
        let text = tokens[11..].join("\t");
        if text.trim().is_empty() {
            continue;
        }
        let conf: f32 = match tokens[10].trim().parse() {
            Ok(c) if c > 0.0 => c,
            _ => continue,
        };
        let coords: Vec<i32> = tokens[6..10]
            .iter()
            .filter_map(|t| t.trim().parse().ok())
            .collect();
        if coords.len() != 4 {
            continue;
        }
        let bbox = BoundingBox::new(coords[0], coords[1], coords[2], coords[3]);
        blocks.push(TextBlock::new(text.trim(), bbox, conf / 100.0));
    }
    blocks
}

type ScriptedResponse = Result<Vec<TextBlock>, String>;

/// Returns scripted responses in call order, then the default response.
pub struct MockRecognizer {
    name: String,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    default: Vec<TextBlock>,
    calls: AtomicUsize,
    region_sizes: Mutex<Vec<(u32, u32)>>,
}

impl MockRecognizer {
    pub fn new(name: &str) -> Self {
        MockRecognizer {
            name: name.to_string(),
            responses: Mutex::new(VecDeque::new()),
            default: Vec::new(),
            calls: AtomicUsize::new(0),
            region_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, blocks: Vec<TextBlock>) -> Self {
        self.default = blocks;
        self
    }

    pub fn then(self, blocks: Vec<TextBlock>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(blocks));
        }
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(message.to_string()));
        }
        self
    }

    /// Single full-confidence block spanning a small box.
    pub fn then_text(self, text: &str, confidence: f32) -> Self {
        let block = TextBlock::new(text, BoundingBox::new(0, 0, 10 * text.chars().count() as i32, 12), confidence);
        self.then(vec![block])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn region_sizes(&self) -> Vec<(u32, u32)> {
        self.region_sizes.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl TextRecognizer for MockRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, region: &DynamicImage) -> Result<Vec<TextBlock>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sizes) = self.region_sizes.lock() {
            sizes.push((region.width(), region.height()));
        }
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(blocks)) => Ok(blocks),
            Some(Err(message)) => Err(ExtractionError::RecognitionError(message)),
            None => Ok(self.default.clone()),
        }
    }
}

/// The two recognizers shared by every extraction. Built once, cloned cheaply.
#[derive(Clone)]
pub struct OcrEngines {
    pub primary: Arc<dyn TextRecognizer>,
    pub fallback: Arc<dyn TextRecognizer>,
}

impl OcrEngines {
    pub fn new(primary: Arc<dyn TextRecognizer>, fallback: Arc<dyn TextRecognizer>) -> Self {
        OcrEngines { primary, fallback }
    }

    pub fn tesseract(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        let datapath = config.tessdata_path.as_deref();
        let primary = TesseractRecognizer::new(
            RecognizerProfile::Primary,
            &config.primary_languages,
            datapath,
        )?;
        let fallback = TesseractRecognizer::new(
            RecognizerProfile::Fallback,
            &config.fallback_languages,
            datapath,
        )?;
        Ok(OcrEngines::new(Arc::new(primary), Arc::new(fallback)))
    }
}
