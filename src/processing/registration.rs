use crate::models::{
    BoundingBox, DocumentType, DualLanguageRecord, FieldLabel, Language, SideValue, TextBlock,
    RECTO_LABELS, VERSO_LABELS,
};
use crate::processing::image::ImageProcessor;
use crate::processing::lines::{group_into_lines, merge_line, y_tolerance, KeyMark, Line, Phrase};
use crate::processing::ocr::OcrEngines;
use crate::processing::similarity::{ratio, ratio_lowercase};
use crate::processing::text::has_meaningful_char;
use crate::utils::ExtractionError;
use image::DynamicImage;
use log::{debug, info, warn};
use std::collections::HashSet;

const BINARY_THRESHOLD: u8 = 148;
const BINARY_MAX_VALUE: u8 = 253;

const LABEL_THRESHOLD: f32 = 0.6;
const KEY_SIMILARITY: f32 = 0.65;
const CORRECTION_THRESHOLD: f32 = 0.60;
pub const DEFAULT_MAX_CORRECTIONS: usize = 10;
const MARKED_KEY_CONFIDENCE: f32 = 0.9;
/// Horizontal slack used when following a multi-line value.
const CONTINUATION_OFFSET: i32 = 20;
const BOTTOM_MARGIN: i32 = 10;
const SIDE_DETECTION_MIN_FIELDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationSide {
    Front,
    Back,
}

impl RegistrationSide {
    pub fn from_document_type(document_type: DocumentType) -> Option<Self> {
        match document_type {
            DocumentType::CarteGriseRecto => Some(RegistrationSide::Front),
            DocumentType::CarteGriseVerso => Some(RegistrationSide::Back),
            _ => None,
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            RegistrationSide::Front => DocumentType::CarteGriseRecto,
            RegistrationSide::Back => DocumentType::CarteGriseVerso,
        }
    }

    pub fn labels(&self) -> &'static [FieldLabel] {
        match self {
            RegistrationSide::Front => RECTO_LABELS,
            RegistrationSide::Back => VERSO_LABELS,
        }
    }

    /// Inclusive vertical band holding the field lines.
    pub fn band(&self) -> (i32, i32) {
        match self {
            RegistrationSide::Front => (200, 900),
            RegistrationSide::Back => (1, 950),
        }
    }

    /// Merge gap in average character widths.
    pub fn spaces(&self) -> f32 {
        match self {
            RegistrationSide::Front => 2.0,
            RegistrationSide::Back => 1.8,
        }
    }

    /// Side whose French labels show up at least three times (distinct
    /// fields) in the grouped lines, front checked first.
    pub fn detect_from_lines(lines: &[Line]) -> Option<RegistrationSide> {
        let mut front: HashSet<&str> = HashSet::new();
        let mut back: HashSet<&str> = HashSet::new();

        for phrase in lines.iter().flatten() {
            if phrase.text().is_empty() {
                continue;
            }
            for (side, found) in [
                (RegistrationSide::Front, &mut front),
                (RegistrationSide::Back, &mut back),
            ] {
                for label in side.labels() {
                    if !found.contains(label.key) && ratio(phrase.text(), label.fr) >= LABEL_THRESHOLD {
                        found.insert(label.key);
                        if found.len() >= SIDE_DETECTION_MIN_FIELDS {
                            return Some(side);
                        }
                    }
                }
            }
        }
        None
    }
}

/// Reads a registration card by locating its printed bilingual labels and
/// taking the neighbouring phrases as values.
pub struct RegistrationParser {
    engines: OcrEngines,
    side: RegistrationSide,
    max_corrections: usize,
}

impl RegistrationParser {
    pub fn new(engines: OcrEngines, side: RegistrationSide) -> Self {
        RegistrationParser {
            engines,
            side,
            max_corrections: DEFAULT_MAX_CORRECTIONS,
        }
    }

    pub fn with_max_corrections(mut self, max_corrections: usize) -> Self {
        self.max_corrections = max_corrections;
        self
    }

    pub fn extract(&self, img: &DynamicImage) -> Result<Vec<DualLanguageRecord>, ExtractionError> {
        let gray = img.to_luma8();
        let binary = DynamicImage::ImageLuma8(ImageProcessor::inverse_binary(
            &gray,
            BINARY_THRESHOLD,
            BINARY_MAX_VALUE,
        ));
        let blocks = self.engines.primary.recognize(&binary)?;
        debug!("{} word blocks on {:?} side", blocks.len(), self.side);

        let lines = self.build_lines(blocks);

        if let Some(detected) = RegistrationSide::detect_from_lines(&lines) {
            if detected != self.side {
                warn!(
                    "Card declared as {} but its labels look like {}",
                    self.side.document_type(),
                    detected.document_type()
                );
            }
        }

        let lines = self.mark_keys(lines);
        let lines = self.correct_low_confidence(img, lines);
        let lines = self.filter_lines(lines);
        let lines = self.mark_keys(lines);

        let records = self.parse(&lines, img.width() as i32);
        info!("Resolved {} registration fields", records.len());
        Ok(records)
    }

    pub fn build_lines(&self, blocks: Vec<TextBlock>) -> Vec<Line> {
        let tolerance = y_tolerance(&blocks);
        group_into_lines(blocks, tolerance)
            .iter()
            .map(|line| merge_line(line, self.side.spaces()))
            .collect()
    }

    fn best_label(&self, text: &str, lang: Language) -> Option<&'static FieldLabel> {
        let mut best: Option<&'static FieldLabel> = None;
        let mut best_ratio = 0.0;
        for label in self.side.labels() {
            let candidate = match lang {
                Language::Fr => label.fr,
                Language::Ar => label.ar,
            };
            let r = ratio(text, candidate);
            if r > best_ratio {
                best_ratio = r;
                best = Some(label);
            }
        }
        if best_ratio >= LABEL_THRESHOLD {
            best
        } else {
            None
        }
    }

    /// Turn the first label-like phrase of each line into a key. Values sit
    /// left of an Arabic key and right of a French one, so the other side is
    /// dropped.
    pub fn mark_keys(&self, lines: Vec<Line>) -> Vec<Line> {
        lines
            .into_iter()
            .map(|mut line| {
                let mut marked: Option<(usize, Language)> = None;
                for (idx, phrase) in line.iter_mut().enumerate() {
                    let found = self
                        .best_label(phrase.text(), Language::Fr)
                        .map(|l| (l, Language::Fr))
                        .or_else(|| self.best_label(phrase.text(), Language::Ar).map(|l| (l, Language::Ar)));

                    if let Some((label, lang)) = found {
                        let text = match lang {
                            Language::Fr => label.fr,
                            Language::Ar => label.ar,
                        };
                        let block = TextBlock::new(text, phrase.block.bbox, MARKED_KEY_CONFIDENCE);
                        *phrase = Phrase {
                            block,
                            key: Some(KeyMark { field: label.key, lang }),
                        };
                        marked = Some((idx, lang));
                        break;
                    }
                    phrase.key = None;
                }

                match marked {
                    Some((idx, Language::Ar)) => line.truncate(idx + 1),
                    Some((idx, Language::Fr)) => {
                        line.drain(..idx);
                    }
                    None => {}
                }
                line
            })
            .collect()
    }

    pub fn is_label_similar(&self, text: &str) -> bool {
        self.side
            .labels()
            .iter()
            .any(|l| ratio(l.fr, text) >= KEY_SIMILARITY || ratio(l.ar, text) >= KEY_SIMILARITY)
    }

    /// Re-read weak phrases with the fallback recognizer on a widened crop
    /// of the original image. At most `max_corrections` phrases are replaced.
    pub fn correct_low_confidence(&self, img: &DynamicImage, mut lines: Vec<Line>) -> Vec<Line> {
        let (band_top, band_bottom) = self.side.band();
        let (width, height) = (img.width(), img.height());
        let mut corrected = 0;

        for line_idx in 0..lines.len() {
            let first_y = match lines[line_idx].first() {
                Some(p) => p.bbox().y,
                None => continue,
            };
            if !(band_top < first_y && first_y < band_bottom) {
                continue;
            }

            for phrase_idx in 0..lines[line_idx].len() {
                if corrected >= self.max_corrections {
                    return lines;
                }
                let phrase = &lines[line_idx][phrase_idx];
                if phrase.block.confidence >= CORRECTION_THRESHOLD
                    || phrase.is_key()
                    || self.is_label_similar(phrase.text())
                {
                    continue;
                }

                let region = safe_region(&lines, line_idx, phrase_idx, width, height);
                let crop = ImageProcessor::crop(img, &region);
                let blocks = match self.engines.fallback.recognize(&crop) {
                    Ok(blocks) => blocks,
                    Err(e) => {
                        warn!("Fallback re-read of '{}' failed: {}", phrase.text(), e);
                        continue;
                    }
                };
                let Some(first) = blocks.into_iter().next() else {
                    continue;
                };

                let replacement = first.offset(region.x, region.y);
                let replacement = replacement.with_text(replacement.text.trim());
                debug!(
                    "Corrected '{}' ({:.2}) to '{}' ({:.2})",
                    phrase.text(),
                    phrase.block.confidence,
                    replacement.text,
                    replacement.confidence
                );
                lines[line_idx][phrase_idx] = Phrase::new(replacement);
                corrected += 1;
            }
        }
        lines
    }

    /// Keep lines starting inside the band, drop noise phrases and empty lines.
    pub fn filter_lines(&self, lines: Vec<Line>) -> Vec<Line> {
        let (band_top, band_bottom) = self.side.band();
        lines
            .into_iter()
            .filter(|line| match line.first() {
                Some(p) => (band_top..=band_bottom).contains(&p.bbox().y),
                None => false,
            })
            .map(|line| {
                line.into_iter()
                    .filter(|p| p.is_key() || has_meaningful_char(p.text().trim()))
                    .collect::<Line>()
            })
            .filter(|line| !line.is_empty())
            .collect()
    }

    fn label_position(line: &Line, label: &str) -> Option<usize> {
        line.iter()
            .position(|p| ratio_lowercase(p.text(), label) >= KEY_SIMILARITY)
    }

    fn line_has_label(&self, line: &Line) -> bool {
        line.iter().any(|p| self.is_label_similar(p.text()))
    }

    /// One record per line, for the first dictionary field found on it.
    pub fn parse(&self, lines: &[Line], image_width: i32) -> Vec<DualLanguageRecord> {
        let mut records = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            for label in self.side.labels() {
                let pos_fr = Self::label_position(line, label.fr);
                let pos_ar = Self::label_position(line, label.ar);
                if pos_fr.is_none() && pos_ar.is_none() {
                    continue;
                }

                let fr = match pos_fr {
                    Some(pos) => {
                        let mut side = self.french_value(lines, idx, pos, label, image_width);
                        side.key = Some(label.fr.to_string());
                        side
                    }
                    None => SideValue::default(),
                };
                let ar = match pos_ar {
                    Some(pos) => {
                        let mut side = self.arabic_value(lines, idx, pos, label, image_width);
                        side.key = Some(label.ar.to_string());
                        side
                    }
                    None => SideValue::default(),
                };

                debug!("{}: fr='{}' ar='{}'", label.key, fr.value, ar.value);
                records.push(DualLanguageRecord {
                    field: label.key.to_string(),
                    fr,
                    ar,
                });
                break;
            }
        }
        records
    }

    fn side_from(&self, phrase: Option<&Phrase>) -> SideValue {
        match phrase {
            Some(p) if !self.is_label_similar(p.text()) => SideValue {
                key: None,
                value: p.text().to_string(),
                confidence: (p.block.confidence * 100.0) as u8,
                bbox: *p.bbox(),
            },
            _ => SideValue::default(),
        }
    }

    fn french_value(
        &self,
        lines: &[Line],
        idx: usize,
        pos: usize,
        label: &FieldLabel,
        image_width: i32,
    ) -> SideValue {
        let line = &lines[idx];
        // a French key closing its line has no value, not even a continued one
        let Some(next) = line.get(pos + 1) else {
            return SideValue::default();
        };
        let mut side = self.side_from(Some(next));
        if label.multi_line {
            let key_x = line[pos].bbox().x;
            let middle = image_width / 2;
            let pieces = self.continuation(lines, idx, |next| {
                next.iter()
                    .find(|p| p.bbox().x > key_x + CONTINUATION_OFFSET && p.bbox().x < middle)
            });
            side.value = join_pieces(&side.value, pieces);
        }
        side
    }

    fn arabic_value(
        &self,
        lines: &[Line],
        idx: usize,
        pos: usize,
        label: &FieldLabel,
        image_width: i32,
    ) -> SideValue {
        let line = &lines[idx];
        let previous = if pos == 0 { None } else { line.get(pos - 1) };
        let mut side = self.side_from(previous);
        if label.multi_line {
            let key: BoundingBox = *line[pos].bbox();
            let middle = image_width / 2;
            let pieces = self.continuation(lines, idx, |next| {
                next.iter().rev().find(|p| {
                    p.bbox().x < key.x + key.width - CONTINUATION_OFFSET && p.bbox().right() > middle
                })
            });
            side.value = join_pieces(&side.value, pieces);
        }
        side
    }

    /// Pieces picked from each line after `idx`, up to the next line holding a label.
    fn continuation<'a, F>(&self, lines: &'a [Line], idx: usize, pick: F) -> Vec<&'a str>
    where
        F: Fn(&'a Line) -> Option<&'a Phrase>,
    {
        lines[idx + 1..]
            .iter()
            .take_while(|next| !self.line_has_label(next))
            .filter_map(|next| pick(next))
            .map(|p| p.text())
            .filter(|t| !t.trim().is_empty())
            .collect()
    }
}

fn join_pieces(first: &str, pieces: Vec<&str>) -> String {
    std::iter::once(first)
        .chain(pieces)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Crop around a phrase reaching halfway to its neighbours: previous and next
/// lines vertically, previous and next phrases horizontally. Without a
/// neighbour the crop reaches the image edge, the bottom edge being kept a
/// few pixels above the image border.
pub fn safe_region(
    lines: &[Line],
    line_idx: usize,
    phrase_idx: usize,
    image_width: u32,
    image_height: u32,
) -> BoundingBox {
    let line = &lines[line_idx];
    let b = *line[phrase_idx].bbox();
    let (w, h) = (image_width as i32, image_height as i32);

    let top = match line_idx.checked_sub(1).and_then(|i| lines.get(i)) {
        Some(prev) => {
            let prev_bottom = prev.iter().map(|p| p.bbox().bottom()).max().unwrap_or(0);
            b.y.min((prev_bottom + b.y) / 2)
        }
        None => 0,
    };
    let bottom = match lines.get(line_idx + 1) {
        Some(next) => {
            let next_top = next.iter().map(|p| p.bbox().y).min().unwrap_or(h);
            b.bottom().max((b.bottom() + next_top) / 2)
        }
        None => b.bottom().max(h - BOTTOM_MARGIN),
    };
    let left = match phrase_idx.checked_sub(1).and_then(|i| line.get(i)) {
        Some(prev) => b.x.min((prev.bbox().right() + b.x) / 2),
        None => 0,
    };
    let right = match line.get(phrase_idx + 1) {
        Some(next) => b.right().max((b.right() + next.bbox().x) / 2),
        None => w,
    };

    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(w);
    let bottom = bottom.min(h);
    BoundingBox::new(left, top, (right - left).max(1), (bottom - top).max(1)).clip_to(image_width, image_height)
}
