use crate::models::{BoundingBox, Language, TextBlock};
use crate::processing::text::{clean_invisible_chars, contains_arabic};

const TOLERANCE_RATIO: f32 = 0.5;
const MIN_TOLERANCE: i32 = 6;
const MAX_TOLERANCE: i32 = 30;
const DEFAULT_TOLERANCE: i32 = 10;
const DEFAULT_CHAR_WIDTH: f32 = 5.0;

/// Which dictionary label a phrase was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMark {
    pub field: &'static str,
    pub lang: Language,
}

/// A run of merged blocks within a line, possibly marked as a label.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub block: TextBlock,
    pub key: Option<KeyMark>,
}

impl Phrase {
    pub fn new(block: TextBlock) -> Self {
        Phrase { block, key: None }
    }

    pub fn text(&self) -> &str {
        &self.block.text
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.block.bbox
    }

    pub fn is_key(&self) -> bool {
        self.key.is_some()
    }
}

/// Phrases of one visual line, left to right.
pub type Line = Vec<Phrase>;

/// Vertical grouping tolerance from the average block height.
pub fn y_tolerance(blocks: &[TextBlock]) -> i32 {
    let heights: Vec<i32> = blocks
        .iter()
        .map(|b| b.bbox.height)
        .filter(|h| *h > 0)
        .collect();
    if heights.is_empty() {
        return DEFAULT_TOLERANCE;
    }
    let avg = heights.iter().sum::<i32>() as f32 / heights.len() as f32;
    ((avg * TOLERANCE_RATIO) as i32).clamp(MIN_TOLERANCE, MAX_TOLERANCE)
}

/// Group blocks into lines. Blocks are visited top to bottom and join the
/// first line whose mean vertical centre is within `tolerance`.
pub fn group_into_lines(blocks: Vec<TextBlock>, tolerance: i32) -> Vec<Vec<TextBlock>> {
    let mut blocks: Vec<TextBlock> = blocks
        .into_iter()
        .map(|b| {
            let cleaned = clean_invisible_chars(&b.text).trim().to_string();
            b.with_text(cleaned)
        })
        .collect();
    blocks.sort_by(|a, b| a.bbox.y_center().total_cmp(&b.bbox.y_center()));

    let mut lines: Vec<Vec<TextBlock>> = Vec::new();
    for block in blocks {
        let center = block.bbox.y_center();
        let target = lines.iter_mut().find(|line| {
            let avg = line.iter().map(|b| b.bbox.y_center()).sum::<f32>() / line.len() as f32;
            (center - avg).abs() <= tolerance as f32
        });
        match target {
            Some(line) => line.push(block),
            None => lines.push(vec![block]),
        }
    }

    for line in lines.iter_mut() {
        line.sort_by_key(|b| b.bbox.x);
    }
    lines
}

/// Merge horizontally close blocks of a line into phrases. Two blocks merge
/// when their gap is at most `spaces` average character widths.
pub fn merge_line(line: &[TextBlock], spaces: f32) -> Line {
    let mut sorted = line.to_vec();
    sorted.sort_by_key(|b| b.bbox.x);
    let mut iter = sorted.into_iter();
    let mut current = match iter.next() {
        Some(first) => first,
        None => return Vec::new(),
    };

    let total_width: i32 = line.iter().map(|b| b.bbox.width).sum();
    let total_chars: usize = line.iter().map(|b| b.text.trim().chars().count()).sum();
    let avg_char_width = if total_chars > 0 {
        total_width as f32 / total_chars as f32
    } else {
        DEFAULT_CHAR_WIDTH
    };
    let max_gap = spaces * avg_char_width;

    let mut merged = Vec::new();
    for next in iter {
        let gap = (next.bbox.x - current.bbox.right()) as f32;
        if gap <= max_gap {
            // Arabic reads right to left, so the right-hand block comes first.
            let text = if contains_arabic(&current.text) || contains_arabic(&next.text) {
                format!("{} {}", next.text, current.text)
            } else {
                format!("{} {}", current.text, next.text)
            };
            let bbox = BoundingBox::new(
                current.bbox.x,
                current.bbox.y,
                next.bbox.right() - current.bbox.x,
                current.bbox.height.max(next.bbox.height),
            );
            let confidence = (current.confidence + next.confidence) / 2.0;
            current = TextBlock::new(text, bbox, confidence);
        } else {
            merged.push(Phrase::new(current));
            current = next;
        }
    }
    merged.push(Phrase::new(current));
    merged
}
