use crate::models::data::{BoundingBox, Language};
use crate::utils::ExtractionError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

/// Normalized rectangle of one ID-card field plus the expected script.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRule {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub lang: Language,
}

impl ZoneRule {
    /// Scale to pixels and clip so the crop is inside the image with positive size.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> BoundingBox {
        let x = (self.x * image_width as f64) as i32;
        let y = (self.y * image_height as f64) as i32;
        let w = (self.w * image_width as f64) as i32;
        let h = (self.h * image_height as f64) as i32;
        BoundingBox::new(x, y, w, h).clip_to(image_width, image_height)
    }
}

/// Fixed zone layout for one ID-card sub-type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTemplate {
    pub document: String,
    pub width: u32,
    pub height: u32,
    #[serde(
        deserialize_with = "deserialize_ordered",
        serialize_with = "serialize_ordered"
    )]
    pub fields: Vec<(String, ZoneRule)>,
}

impl FieldTemplate {
    pub fn from_json_str(json: &str) -> Result<Self, ExtractionError> {
        let template: FieldTemplate = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ExtractionError::TemplateError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn rule(&self, field: &str) -> Option<&ZoneRule> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, r)| r)
    }

    fn validate(&self) -> Result<(), ExtractionError> {
        if self.width == 0 || self.height == 0 {
            return Err(ExtractionError::TemplateError(format!(
                "template '{}' has an empty reference size",
                self.document
            )));
        }
        if self.fields.is_empty() {
            return Err(ExtractionError::TemplateError(format!(
                "template '{}' declares no fields",
                self.document
            )));
        }
        for (name, rule) in &self.fields {
            let values = [rule.x, rule.y, rule.w, rule.h];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ExtractionError::TemplateError(format!(
                    "field '{}' has a non-finite coordinate",
                    name
                )));
            }
        }
        Ok(())
    }
}

struct OrderedFieldsVisitor;

impl<'de> Visitor<'de> for OrderedFieldsVisitor {
    type Value = Vec<(String, ZoneRule)>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of field name to zone rule")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut fields: Vec<(String, ZoneRule)> = Vec::new();
        while let Some((name, rule)) = access.next_entry::<String, ZoneRule>()? {
            match fields.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = rule,
                None => fields.push((name, rule)),
            }
        }
        Ok(fields)
    }
}

// Declaration order matters: `_fr` fields are read before their `_ar` counterparts.
fn deserialize_ordered<'de, D>(deserializer: D) -> Result<Vec<(String, ZoneRule)>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(OrderedFieldsVisitor)
}

fn serialize_ordered<S>(fields: &[(String, ZoneRule)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (name, rule) in fields {
        map.serialize_entry(name, rule)?;
    }
    map.end()
}
