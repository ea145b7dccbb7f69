use crate::models::{BoundingBox, ZoneRule};
use crate::utils::ExtractionError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn load(image_path: &Path) -> Result<DynamicImage, ExtractionError> {
        image::open(image_path).map_err(|e| {
            ExtractionError::ImageProcessingError(format!(
                "Failed to open image {}: {}",
                image_path.display(),
                e
            ))
        })
    }

    /// Resize to exactly `width × height` unless the image already has that size.
    pub fn resize_to(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if img.width() == width && img.height() == height {
            return img.clone();
        }
        img.resize_exact(width, height, FilterType::Triangle)
    }

    /// Crop a template zone. The returned box is the clipped pixel rectangle.
    pub fn safe_crop(img: &DynamicImage, rule: &ZoneRule) -> (DynamicImage, BoundingBox) {
        let bbox = rule.to_pixels(img.width(), img.height());
        (Self::crop(img, &bbox), bbox)
    }

    /// Crop any box, clipped to the image first.
    pub fn crop(img: &DynamicImage, bbox: &BoundingBox) -> DynamicImage {
        let b = bbox.clip_to(img.width(), img.height());
        img.crop_imm(b.x as u32, b.y as u32, b.width as u32, b.height as u32)
    }

    /// Linear contrast gain with saturation, `g * gain` clamped to `[0, 255]`.
    pub fn scale_contrast(gray: &GrayImage, gain: f32) -> GrayImage {
        let mut out = gray.clone();
        for pixel in out.pixels_mut() {
            pixel[0] = (pixel[0] as f32 * gain).round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    /// Otsu binarisation: pixels above the computed level become 255, others 0.
    pub fn otsu_binarize(gray: &GrayImage) -> GrayImage {
        let level = otsu_level(gray);
        threshold(gray, level)
    }

    /// Inverse binary threshold: pixels above `level` become 0, others `max_value`.
    pub fn inverse_binary(gray: &GrayImage, level: u8, max_value: u8) -> GrayImage {
        let mut out = gray.clone();
        for pixel in out.pixels_mut() {
            pixel[0] = if pixel[0] > level { 0 } else { max_value };
        }
        out
    }

    /// Pixels at or below `level` become 0, others keep their value.
    pub fn to_zero(gray: &GrayImage, level: u8) -> GrayImage {
        let mut out = gray.clone();
        for pixel in out.pixels_mut() {
            if pixel[0] <= level {
                pixel[0] = 0;
            }
        }
        out
    }

    pub fn upscale(img: &DynamicImage, factor: u32) -> DynamicImage {
        img.resize_exact(
            img.width() * factor,
            img.height() * factor,
            FilterType::CatmullRom,
        )
    }

    /// Contrast limited adaptive histogram equalisation over a `grid × grid`
    /// tile layout with bilinear blending between tile lookup tables.
    pub fn clahe(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return gray.clone();
        }
        let tiles_x = grid.clamp(1, width);
        let tiles_y = grid.clamp(1, height);

        let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * width / tiles_x;
                let x1 = (tx + 1) * width / tiles_x;
                let y0 = ty * height / tiles_y;
                let y1 = (ty + 1) * height / tiles_y;
                luts.push(Self::tile_lut(gray, x0, x1, y0, y1, clip_limit));
            }
        }

        let tile_w = width as f32 / tiles_x as f32;
        let tile_h = height as f32 / tiles_y as f32;
        let lut_at = |tx: u32, ty: u32, v: u8| luts[(ty * tiles_x + tx) as usize][v as usize] as f32;

        let mut out = GrayImage::new(width, height);
        for y in 0..height {
            let fy = (y as f32 + 0.5) / tile_h - 0.5;
            let ty1 = fy.floor().max(0.0) as u32;
            let ty2 = (ty1 + 1).min(tiles_y - 1);
            let wy = (fy - ty1 as f32).clamp(0.0, 1.0);

            for x in 0..width {
                let fx = (x as f32 + 0.5) / tile_w - 0.5;
                let tx1 = fx.floor().max(0.0) as u32;
                let tx2 = (tx1 + 1).min(tiles_x - 1);
                let wx = (fx - tx1 as f32).clamp(0.0, 1.0);

                let v = gray.get_pixel(x, y)[0];
                let top = lut_at(tx1, ty1, v) * (1.0 - wx) + lut_at(tx2, ty1, v) * wx;
                let bottom = lut_at(tx1, ty2, v) * (1.0 - wx) + lut_at(tx2, ty2, v) * wx;
                let value = top * (1.0 - wy) + bottom * wy;
                out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }

    fn tile_lut(gray: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
        let mut hist = [0u32; 256];
        for y in y0..y1 {
            for x in x0..x1 {
                hist[gray.get_pixel(x, y)[0] as usize] += 1;
            }
        }
        let area = ((x1 - x0) * (y1 - y0)).max(1);

        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for count in hist.iter_mut() {
            if *count > limit {
                excess += *count - limit;
                *count = limit;
            }
        }
        let batch = excess / 256;
        let residual = (excess % 256) as usize;
        for count in hist.iter_mut() {
            *count += batch;
        }
        if residual > 0 {
            let step = (256 / residual).max(1);
            for i in (0..256).step_by(step).take(residual) {
                hist[i] += 1;
            }
        }

        let mut lut = [0u8; 256];
        let mut cdf = 0u32;
        for (i, count) in hist.iter().enumerate() {
            cdf += count;
            lut[i] = (cdf as f32 * 255.0 / area as f32).round().min(255.0) as u8;
        }
        lut
    }

    /// Mean RGB colour of the top `fraction` of the image.
    pub fn top_band_mean(img: &DynamicImage, fraction: f32) -> [f32; 3] {
        let rgb = img.to_rgb8();
        let band = ((rgb.height() as f32 * fraction) as u32).clamp(1, rgb.height().max(1));
        Self::mean_rgb(&rgb, band)
    }

    pub fn mean_rgb(rgb: &RgbImage, rows: u32) -> [f32; 3] {
        let rows = rows.min(rgb.height());
        let mut sum = [0f64; 3];
        let mut count = 0f64;
        for y in 0..rows {
            for x in 0..rgb.width() {
                let p = rgb.get_pixel(x, y);
                sum[0] += p[0] as f64;
                sum[1] += p[1] as f64;
                sum[2] += p[2] as f64;
                count += 1.0;
            }
        }
        if count == 0.0 {
            return [0.0; 3];
        }
        [
            (sum[0] / count) as f32,
            (sum[1] / count) as f32,
            (sum[2] / count) as f32,
        ]
    }

    /// Copy of the image with every box outlined in green.
    pub fn annotate(img: &DynamicImage, boxes: &[BoundingBox]) -> RgbImage {
        let mut canvas = img.to_rgb8();
        let (w, h) = canvas.dimensions();
        for bbox in boxes {
            let b = bbox.clip_to(w, h);
            // two nested outlines for a 2px stroke
            for inset in 0..2 {
                let width = b.width - 2 * inset;
                let height = b.height - 2 * inset;
                if width <= 0 || height <= 0 {
                    break;
                }
                let rect = Rect::at(b.x + inset, b.y + inset).of_size(width as u32, height as u32);
                draw_hollow_rect_mut(&mut canvas, rect, Rgb([0u8, 255u8, 0u8]));
            }
        }
        canvas
    }

    pub fn save_annotated(img: &RgbImage, path: &Path) -> Result<(), ExtractionError> {
        img.save(path).map_err(|e| {
            ExtractionError::ImageProcessingError(format!(
                "Failed to save debug image {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// PNG bytes for engines that decode images themselves.
    pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessingError(format!("PNG encoding failed: {}", e)))?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use image::ImageBuffer;

    fn gradient(width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 255 / width.max(1)) as u8]))
    }

    #[test]
    fn test_safe_crop_stays_inside_image() {
        let img = DynamicImage::ImageLuma8(gradient(200, 100));
        let rules = [
            ZoneRule { x: 0.9, y: 0.9, w: 0.5, h: 0.5, lang: Language::Fr },
            ZoneRule { x: -0.2, y: -0.1, w: 0.3, h: 0.3, lang: Language::Ar },
            ZoneRule { x: 1.5, y: 2.0, w: 0.0, h: 0.0, lang: Language::Fr },
            ZoneRule { x: 0.1, y: 0.1, w: 0.2, h: 0.2, lang: Language::Fr },
            ZoneRule { x: 1e10, y: 0.1, w: 0.25, h: 0.1, lang: Language::Fr },
            ZoneRule { x: 0.3, y: -1e12, w: -5.0, h: 1e10, lang: Language::Ar },
        ];
        for rule in &rules {
            let (crop, bbox) = ImageProcessor::safe_crop(&img, rule);
            assert!(bbox.x >= 0 && bbox.y >= 0);
            assert!(bbox.width > 0 && bbox.height > 0);
            assert!(bbox.right() <= 200 && bbox.bottom() <= 100);
            assert_eq!(crop.width(), bbox.width as u32);
            assert_eq!(crop.height(), bbox.height as u32);
        }
    }

    #[test]
    fn test_thresholds() {
        let gray = GrayImage::from_raw(4, 1, vec![10, 146, 147, 200]).unwrap();

        let inv = ImageProcessor::inverse_binary(&gray, 148, 253);
        assert_eq!(inv.into_raw(), vec![253, 253, 253, 0]);

        let zero = ImageProcessor::to_zero(&gray, 146);
        assert_eq!(zero.into_raw(), vec![0, 0, 147, 200]);

        let scaled = ImageProcessor::scale_contrast(&gray, 1.5);
        assert_eq!(scaled.into_raw(), vec![15, 219, 221, 255]);
    }

    #[test]
    fn test_otsu_splits_two_levels() {
        let gray = ImageBuffer::from_fn(10, 10, |x, _| Luma([if x < 5 { 40u8 } else { 210u8 }]));
        let bin = ImageProcessor::otsu_binarize(&gray);
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(9, 9)[0], 255);
    }

    #[test]
    fn test_clahe_keeps_size_and_order() {
        let gray = gradient(64, 32);
        let out = ImageProcessor::clahe(&gray, 1.5, 8);
        assert_eq!(out.dimensions(), (64, 32));
        // equalisation is monotonic within a row
        assert!(out.get_pixel(2, 5)[0] <= out.get_pixel(60, 5)[0]);

        let tiny = ImageProcessor::clahe(&gradient(3, 2), 1.5, 8);
        assert_eq!(tiny.dimensions(), (3, 2));
    }

    #[test]
    fn test_top_band_mean_and_upscale() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(10, 10, |_, y| {
            if y < 2 { Rgb([200u8, 40, 60]) } else { Rgb([0u8, 0, 0]) }
        }));
        let mean = ImageProcessor::top_band_mean(&img, 0.2);
        assert_eq!(mean, [200.0, 40.0, 60.0]);

        let big = ImageProcessor::upscale(&img, 3);
        assert_eq!((big.width(), big.height()), (30, 30));
    }

    #[test]
    fn test_annotate_and_save() {
        let img = DynamicImage::ImageLuma8(gradient(50, 40));
        let annotated = ImageProcessor::annotate(&img, &[BoundingBox::new(5, 5, 20, 10)]);
        assert_eq!(annotated.get_pixel(5, 5), &Rgb([0, 255, 0]));
        assert_eq!(annotated.get_pixel(6, 10), &Rgb([0, 255, 0]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.png");
        ImageProcessor::save_annotated(&annotated, &path).unwrap();
        assert!(path.exists());

        let png = ImageProcessor::encode_png(&img).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
