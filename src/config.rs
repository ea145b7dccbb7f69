use crate::processing::ocr::RecognizerProfile;
use crate::utils::ExtractionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime settings of the extractor. Every field has a default so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Directory holding `cin_new_template.json` and `cin_old_template.json`.
    pub template_dir: PathBuf,
    /// Tesseract data directory; `None` uses the engine's own lookup.
    pub tessdata_path: Option<String>,
    pub primary_languages: String,
    pub fallback_languages: String,
    /// Cross-check Arabic names against their French counterpart.
    pub name_check: bool,
    /// Cap on fallback re-recognitions per registration card.
    pub max_corrections: usize,
    pub debug_image: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            template_dir: PathBuf::from("config"),
            tessdata_path: None,
            primary_languages: RecognizerProfile::Primary.default_languages().to_string(),
            fallback_languages: RecognizerProfile::Fallback.default_languages().to_string(),
            name_check: true,
            max_corrections: 10,
            debug_image: None,
        }
    }
}

impl ExtractorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ExtractionError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ExtractorConfig = serde_json::from_str(&json).map_err(|e| {
            ExtractionError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Take the tessdata location from `TESSDATA_PREFIX` when none is configured.
    pub fn with_env(mut self) -> Self {
        if self.tessdata_path.is_none() {
            if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
                if !prefix.trim().is_empty() {
                    self.tessdata_path = Some(prefix);
                }
            }
        }
        self
    }

    pub fn template_path(&self, file_name: &str) -> PathBuf {
        self.template_dir.join(file_name)
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.primary_languages.trim().is_empty() || self.fallback_languages.trim().is_empty() {
            return Err(ExtractionError::ConfigError(
                "recognizer language sets must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
