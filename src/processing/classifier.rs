use crate::models::{DocumentCategory, DocumentType, TextBlock};
use crate::processing::image::ImageProcessor;
use crate::processing::ocr::OcrEngines;
use crate::processing::similarity::ratio;
use image::imageops::FilterType;
use image::DynamicImage;
use log::{debug, warn};

/// Inverse binarisation applied before every keyword pass.
pub const KEYWORD_THRESHOLD: u8 = 148;
pub const KEYWORD_MAX_VALUE: u8 = 253;

const CATEGORY_BAND: f32 = 0.20;
const KEYWORD_BAND: f32 = 0.30;
const HSV_BAND: f32 = 0.25;
const COLORED_BAND_VARIANCE: f32 = 25.0;
const TIE_BREAK_VARIANCE: f32 = 20.0;

const ID_TOP_KEYWORDS: [&str; 5] = [
    "carte nationale",
    "البطاقة الوطنية",
    "للتعريف",
    "identité",
    "d'identité",
];

// Dominant colour ranges, (blue, green, red) lower and upper bounds.
const OLD_LAYOUT_BGR: ([i32; 3], [i32; 3]) = ([100, 150, 100], [200, 255, 200]);
const NEW_LAYOUT_BGR: ([i32; 3], [i32; 3]) = ([140, 140, 180], [240, 200, 255]);

const RECTO_KEYWORDS: [&str; 7] = [
    "Numéro d'immatriculation",
    "Propriétaire",
    "Adresse",
    "Usage",
    "Mutation",
    "المالك",
    "العنوان",
];

const VERSO_KEYWORDS: [&str; 10] = [
    "Marque",
    "Type",
    "Genre",
    "Modèle",
    "chassis",
    "cylindres",
    "Puissance fiscale",
    "الاسم التجاري",
    "الصنف",
    "النوع",
];

const KEYWORD_RATIO: f32 = 0.6;

/// Colour statistics of the top band of an ID card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandColor {
    /// Mean colour as integer (blue, green, red).
    pub dominant_bgr: [i32; 3],
    /// Mean hue on the 0-180 scale.
    pub hue: f32,
    /// Mean saturation on the 0-255 scale.
    pub saturation: f32,
}

/// Picks the document type from visual cues and a few keyword passes.
pub struct DocumentClassifier {
    engines: OcrEngines,
}

impl DocumentClassifier {
    pub fn new(engines: OcrEngines) -> Self {
        DocumentClassifier { engines }
    }

    pub fn detect(&self, img: &DynamicImage) -> DocumentType {
        match self.detect_category(img) {
            DocumentCategory::IdCard => Self::detect_id_layout(img),
            DocumentCategory::RegistrationCard => self.detect_registration_side(img),
        }
    }

    pub fn detect_category(&self, img: &DynamicImage) -> DocumentCategory {
        let [r, g, b] = ImageProcessor::top_band_mean(img, CATEGORY_BAND);
        let color_variance = r.max(g).max(b) - r.min(g).min(b);

        let mut id_score = 0;
        let mut registration_score = 0;

        if color_variance > COLORED_BAND_VARIANCE {
            id_score += 3;
        } else {
            registration_score += 1;
        }

        let binary = Self::keyword_image(img);
        let top_rows = ((binary.height() as f32 * KEYWORD_BAND) as u32).max(1);
        let top = binary.crop_imm(0, 0, binary.width(), top_rows);

        match self.read_text(&top) {
            Ok(text) => {
                for keyword in ID_TOP_KEYWORDS {
                    if text.contains(keyword) {
                        id_score += 4;
                    }
                }
            }
            Err(e) => warn!("Header keyword pass failed: {}", e),
        }

        match self.read_text(&binary) {
            Ok(text) => {
                if text.contains("carte nationale") || text.contains("البطاقة الوطنية") {
                    id_score += 5;
                }
                if text.contains("propriétaire") || text.contains("المالك") {
                    registration_score += 3;
                }
                if text.contains("marque") || text.contains("الاسم التجاري") {
                    registration_score += 3;
                }
                if text.contains("genre") && text.contains("النوع") {
                    registration_score += 3;
                }
            }
            Err(e) => warn!("Full-page keyword pass failed: {}", e),
        }

        debug!(
            "Category scores: id={}, registration={}, color_variance={:.1}",
            id_score, registration_score, color_variance
        );

        if id_score > registration_score {
            DocumentCategory::IdCard
        } else if registration_score > id_score {
            DocumentCategory::RegistrationCard
        } else if color_variance > TIE_BREAK_VARIANCE {
            DocumentCategory::IdCard
        } else {
            DocumentCategory::RegistrationCard
        }
    }

    pub fn band_color(img: &DynamicImage) -> BandColor {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let dominant_rows = ((height as f32 * CATEGORY_BAND) as u32).max(1).min(height.max(1));
        let band = image::imageops::crop_imm(&rgb, 0, 0, width, dominant_rows).to_image();
        let small = image::imageops::resize(&band, 100, 20, FilterType::Triangle);
        let [r, g, b] = ImageProcessor::mean_rgb(&small, small.height());

        let hsv_rows = ((height as f32 * HSV_BAND) as u32).max(1).min(height.max(1));
        let (mut hue_sum, mut sat_sum, mut count) = (0f64, 0f64, 0f64);
        for y in 0..hsv_rows {
            for x in 0..width {
                let p = rgb.get_pixel(x, y);
                let (h, s) = hue_saturation(p[0], p[1], p[2]);
                hue_sum += h as f64;
                sat_sum += s as f64;
                count += 1.0;
            }
        }
        let count = count.max(1.0);

        BandColor {
            dominant_bgr: [b as i32, g as i32, r as i32],
            hue: (hue_sum / count) as f32,
            saturation: (sat_sum / count) as f32,
        }
    }

    /// Old (green/yellow banner) versus new (pink/red banner) ID card.
    pub fn detect_id_layout(img: &DynamicImage) -> DocumentType {
        let color = Self::band_color(img);
        let [b, g, r] = color.dominant_bgr;

        let mut old_score = 0;
        let mut new_score = 0;

        if in_range(color.dominant_bgr, OLD_LAYOUT_BGR) {
            old_score += 3;
        }
        if in_range(color.dominant_bgr, NEW_LAYOUT_BGR) {
            new_score += 3;
        }

        if (20.0..=60.0).contains(&color.hue) && color.saturation < 60.0 {
            old_score += 4;
        } else if color.hue >= 140.0 || color.hue <= 10.0 {
            new_score += 4;
        }

        if r > g && r > b {
            new_score += 5;
        } else if g >= r {
            old_score += 5;
        }

        if color.saturation > 100.0 {
            new_score += 2;
        } else if color.saturation < 80.0 {
            old_score += 2;
        }

        debug!(
            "Layout scores: old={}, new={}, bgr={:?}, hue={:.1}, saturation={:.1}",
            old_score, new_score, color.dominant_bgr, color.hue, color.saturation
        );

        if new_score > old_score {
            DocumentType::CinNew
        } else if old_score > new_score {
            DocumentType::CinOld
        } else if (20.0..=90.0).contains(&color.hue) {
            DocumentType::CinOld
        } else {
            DocumentType::CinNew
        }
    }

    pub fn detect_registration_side(&self, img: &DynamicImage) -> DocumentType {
        let binary = Self::keyword_image(img);
        let text = match self.read_text(&binary) {
            Ok(text) => text,
            Err(e) => {
                warn!("Side keyword pass failed, assuming front: {}", e);
                return DocumentType::CarteGriseRecto;
            }
        };

        let recto = RECTO_KEYWORDS.iter().filter(|k| keyword_found(&text, k)).count();
        let verso = VERSO_KEYWORDS.iter().filter(|k| keyword_found(&text, k)).count();
        debug!("Side scores: recto={}, verso={}", recto, verso);

        if verso > recto {
            DocumentType::CarteGriseVerso
        } else {
            DocumentType::CarteGriseRecto
        }
    }

    fn keyword_image(img: &DynamicImage) -> DynamicImage {
        let gray = img.to_luma8();
        DynamicImage::ImageLuma8(ImageProcessor::inverse_binary(
            &gray,
            KEYWORD_THRESHOLD,
            KEYWORD_MAX_VALUE,
        ))
    }

    /// Lowercased text of a region, words joined by spaces.
    fn read_text(&self, region: &DynamicImage) -> Result<String, crate::utils::ExtractionError> {
        let blocks: Vec<TextBlock> = self.engines.primary.recognize(region)?;
        Ok(blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<&str>>()
            .join(" ")
            .to_lowercase())
    }
}

fn in_range(color: [i32; 3], range: ([i32; 3], [i32; 3])) -> bool {
    let (low, high) = range;
    (0..3).all(|i| low[i] <= color[i] && color[i] <= high[i])
}

/// Hue (0-180) and saturation (0-255) of one pixel, 8-bit HSV convention.
pub fn hue_saturation(r: u8, g: u8, b: u8) -> (f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    if delta == 0.0 {
        return (0.0, saturation.round());
    }

    let mut hue = if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    ((hue / 2.0).round(), saturation.round())
}

/// Lowercase substring, or any word longer than 3 chars close enough to the keyword.
pub fn keyword_found(text: &str, keyword: &str) -> bool {
    let text = text.to_lowercase();
    let keyword = keyword.to_lowercase();
    if text.contains(&keyword) {
        return true;
    }
    text.split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .any(|w| ratio(w, &keyword) >= KEYWORD_RATIO)
}
