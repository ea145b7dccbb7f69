use crate::utils::ExtractionError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    CinOld,          // National ID card, green/yellow banner
    CinNew,          // National ID card, pink/red banner
    CarteGriseRecto, // Vehicle registration card, owner side
    CarteGriseVerso, // Vehicle registration card, vehicle side
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentCategory {
    IdCard,
    RegistrationCard,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::CinOld,
        DocumentType::CinNew,
        DocumentType::CarteGriseRecto,
        DocumentType::CarteGriseVerso,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::CinOld => "cin_old",
            DocumentType::CinNew => "cin_new",
            DocumentType::CarteGriseRecto => "carte_grise_recto",
            DocumentType::CarteGriseVerso => "carte_grise_verso",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DocumentType::CinOld => "Moroccan national ID card, old layout",
            DocumentType::CinNew => "Moroccan national ID card, new layout",
            DocumentType::CarteGriseRecto => "Vehicle registration card, front",
            DocumentType::CarteGriseVerso => "Vehicle registration card, back",
        }
    }

    pub fn category(&self) -> DocumentCategory {
        match self {
            DocumentType::CinOld | DocumentType::CinNew => DocumentCategory::IdCard,
            DocumentType::CarteGriseRecto | DocumentType::CarteGriseVerso => {
                DocumentCategory::RegistrationCard
            }
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ExtractionError::UnknownDocumentType(s.to_string()))
    }
}

impl Serialize for DocumentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Language of a field value, carried as the `_fr` / `_ar` suffix of field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Fr,
    Ar,
}

impl Language {
    /// Expected language of a field, from its name suffix.
    pub fn of_field(field: &str) -> Option<Language> {
        if field.ends_with("_ar") {
            Some(Language::Ar)
        } else if field.ends_with("_fr") {
            Some(Language::Fr)
        } else {
            None
        }
    }
}

/// Axis-aligned box in source image pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        BoundingBox { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn y_center(&self) -> f32 {
        self.y as f32 + self.height as f32 / 2.0
    }

    /// Clip to an image of the given size. The result always has an origin
    /// inside the image and a strictly positive size.
    pub fn clip_to(&self, image_width: u32, image_height: u32) -> BoundingBox {
        // i64 so that saturated template coordinates cannot overflow
        let max_w = image_width.clamp(1, i32::MAX as u32) as i64;
        let max_h = image_height.clamp(1, i32::MAX as u32) as i64;

        let x = (self.x as i64).clamp(0, max_w - 1);
        let y = (self.y as i64).clamp(0, max_h - 1);
        let right = (self.x as i64 + self.width as i64).min(max_w).max(x + 1);
        let bottom = (self.y as i64 + self.height as i64).min(max_h).max(y + 1);

        BoundingBox::new(x as i32, y as i32, (right - x) as i32, (bottom - y) as i32)
    }
}

/// One recognized text fragment. Confidence is always on the `[0, 1]` scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        TextBlock {
            text: text.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Copy of this block with the text replaced.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        TextBlock {
            text: text.into(),
            ..self.clone()
        }
    }

    /// Copy of this block moved by `(dx, dy)`, e.g. from crop to image coordinates.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        let bbox = BoundingBox::new(
            self.bbox.x + dx,
            self.bbox.y + dy,
            self.bbox.width,
            self.bbox.height,
        );
        TextBlock { bbox, ..self.clone() }
    }
}

/// Mean confidence of a set of blocks, 0 when empty.
pub fn mean_confidence(blocks: &[TextBlock]) -> f32 {
    if blocks.is_empty() {
        return 0.0;
    }
    blocks.iter().map(|b| b.confidence).sum::<f32>() / blocks.len() as f32
}

/// Joined text of a set of blocks, in the order given.
pub fn joined_text(blocks: &[TextBlock]) -> String {
    blocks
        .iter()
        .map(|b| b.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
}

/// One language side of a registration-card field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideValue {
    pub key: Option<String>,
    pub value: String,
    pub confidence: u8,
    pub bbox: BoundingBox,
}

/// A registration-card field as found on the card, French and Arabic sides.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DualLanguageRecord {
    pub field: String,
    pub fr: SideValue,
    pub ar: SideValue,
}

/// Extracted fields, field name to text, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    entries: Vec<(String, String)>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        ExtractionResult::default()
    }

    /// Insert or replace a field. A replaced field keeps its position.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = (&str, &mut String)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for ExtractionResult {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut result = ExtractionResult::new();
        for (k, v) in iter {
            result.insert(k, v);
        }
        result
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_parsing() {
        assert_eq!("cin_new".parse::<DocumentType>().unwrap(), DocumentType::CinNew);
        assert_eq!(
            " CARTE_GRISE_VERSO ".parse::<DocumentType>().unwrap(),
            DocumentType::CarteGriseVerso
        );
        assert!(matches!(
            "passport".parse::<DocumentType>(),
            Err(ExtractionError::UnknownDocumentType(_))
        ));
    }

    #[test]
    fn test_clip_keeps_box_inside_image() {
        let clipped = BoundingBox::new(-20, 90, 500, 40).clip_to(200, 100);
        assert_eq!(clipped, BoundingBox::new(0, 90, 200, 10));

        let outside = BoundingBox::new(300, 300, 10, 10).clip_to(200, 100);
        assert_eq!(outside, BoundingBox::new(199, 99, 1, 1));

        let saturated = BoundingBox::new(i32::MAX, 10, i32::MAX, -5).clip_to(200, 100);
        assert_eq!(saturated, BoundingBox::new(199, 10, 1, 1));

        let far_negative = BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, 50).clip_to(200, 100);
        assert_eq!(far_negative, BoundingBox::new(0, 0, 1, 1));
    }

    #[test]
    fn test_result_keeps_insertion_order_on_replace() {
        let mut result = ExtractionResult::new();
        result.insert("nom_ar", "a");
        result.insert("cin", "b");
        result.insert("nom_ar", "c");

        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["nom_ar", "cin"]);
        assert_eq!(result.get("nom_ar"), Some("c"));
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"nom_ar":"c","cin":"b"}"#
        );
    }

    #[test]
    fn test_joined_text_skips_blank_blocks() {
        let b = BoundingBox::default();
        let blocks = vec![
            TextBlock::new("AHMED ", b, 0.9),
            TextBlock::new("  ", b, 0.1),
            TextBlock::new("ALAMI", b, 0.7),
        ];
        assert_eq!(joined_text(&blocks), "AHMED ALAMI");
        assert!((mean_confidence(&blocks) - 0.5667).abs() < 1e-3);
    }
}
