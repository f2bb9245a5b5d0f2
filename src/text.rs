//! Overlay text drawn with the embedded DejaVu Sans faces.
//!
//! Lines are rasterized into a coverage mask with imageproc, then
//! aligned on the ink of the mask and blended onto the overlay.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;

use crate::error::{MapError, Result};
use crate::render::{fill_rect, paint_mask_at};

/// Embedded font data - DejaVu Sans (see assets/fonts/LICENSE)
const FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const FONT_DATA_BOLD: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    /// Top of the ink on the anchor.
    Top,
    /// Bottom of the last line, descender included, on the anchor.
    Bottom,
    /// Middle of the ink on the anchor.
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

/// Box drawn behind a label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub fill: Rgba<u8>,
    /// Edge colour and width in pixels.
    pub edge: Option<(Rgba<u8>, f64)>,
    /// Gap between the ink and the box edge, in pixels.
    pub pad_px: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Em size in output pixels.
    pub size_px: f64,
    pub weight: Weight,
    pub color: Rgba<u8>,
    pub background: Option<TextBox>,
}

/// Pixel rectangle covered by drawn ink, right and bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl InkBox {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) as f64 / 2.0,
            (self.top + self.bottom) as f64 / 2.0,
        )
    }
}

/// The two faces used on overlays.
pub struct Fonts {
    regular: FontRef<'static>,
    bold: FontRef<'static>,
}

fn load(data: &'static [u8], face: &str) -> Result<FontRef<'static>> {
    FontRef::try_from_slice(data).map_err(|e| MapError::Font(format!("{}: {}", face, e)))
}

/// Ink bounds of a mask in mask pixels.
fn ink_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, m) in mask.enumerate_pixels() {
        if m.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x + 1, y + 1),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1)),
        });
    }
    bounds
}

impl Fonts {
    pub fn embedded() -> Result<Self> {
        Ok(Self {
            regular: load(FONT_DATA, "DejaVuSans")?,
            bold: load(FONT_DATA_BOLD, "DejaVuSans-Bold")?,
        })
    }

    fn face(&self, weight: Weight) -> &FontRef<'static> {
        match weight {
            Weight::Regular => &self.regular,
            Weight::Bold => &self.bold,
        }
    }

    /// Whether the face has an outline for `c`.
    pub fn has_glyph(&self, weight: Weight, c: char) -> bool {
        self.face(weight).glyph_id(c).0 != 0
    }

    /// Scale that makes one em `em_px` pixels tall.
    fn scale(font: &FontRef<'static>, em_px: f64) -> PxScale {
        let units = font.units_per_em().unwrap_or_else(|| font.height_unscaled());
        PxScale::from(em_px as f32 * font.height_unscaled() / units)
    }

    /// Advance width of one line with kerning.
    fn line_width(font: &FontRef<'static>, scale: PxScale, line: &str) -> f32 {
        let scaled = font.as_scaled(scale);
        let mut width = 0.0;
        let mut prev = None;
        for c in line.chars() {
            let id = scaled.glyph_id(c);
            if let Some(p) = prev {
                width += scaled.kern(p, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }

    /// Draws `text` onto an overlay, one line per `\n`, aligned on `anchor`.
    ///
    /// Returns the ink rectangle in overlay pixels, `None` when nothing
    /// was inked.
    pub fn draw_text(
        &self,
        image: &mut RgbaImage,
        text: &str,
        anchor: (f64, f64),
        style: &TextStyle,
        halign: HAlign,
        valign: VAlign,
    ) -> Option<InkBox> {
        let font = self.face(style.weight);
        let scale = Self::scale(font, style.size_px);
        let scaled = font.as_scaled(scale);
        let line_height = scaled.height() + scaled.line_gap();

        let lines: Vec<&str> = text.split('\n').collect();
        let widths: Vec<f32> = lines
            .iter()
            .map(|line| Self::line_width(font, scale, line))
            .collect();
        let block_w = widths.iter().cloned().fold(0.0f32, f32::max);
        let pad = style.size_px.ceil().max(1.0) as f32;

        let mask_w = (block_w + 2.0 * pad).ceil() as u32;
        let mask_h = (lines.len() as f32 * line_height + 2.0 * pad).ceil() as u32;
        let mut mask = GrayImage::new(mask_w.max(1), mask_h.max(1));
        for (i, (line, w)) in lines.iter().zip(&widths).enumerate() {
            let indent = match halign {
                HAlign::Left => 0.0,
                HAlign::Center => (block_w - w) / 2.0,
                HAlign::Right => block_w - w,
            };
            let x = (pad + indent).round() as i32;
            let y = (pad + i as f32 * line_height).round() as i32;
            draw_text_mut(&mut mask, Luma([255u8]), x, y, scale, font, line);
        }

        let (x0, y0, x1, y1) = ink_bounds(&mask)?;
        let ref_x = match halign {
            HAlign::Left => x0 as f64,
            HAlign::Center => (x0 + x1) as f64 / 2.0,
            HAlign::Right => x1 as f64,
        };
        let ref_y = match valign {
            VAlign::Top => y0 as f64,
            VAlign::Center => (y0 + y1) as f64 / 2.0,
            VAlign::Bottom => {
                let last_top = (pad + (lines.len() - 1) as f32 * line_height).round();
                (last_top + scaled.ascent() - scaled.descent()) as f64
            }
        };
        let ox = (anchor.0 - ref_x).round() as i64;
        let oy = (anchor.1 - ref_y).round() as i64;
        let ink = InkBox {
            left: ox + x0 as i64,
            top: oy + y0 as i64,
            right: ox + x1 as i64,
            bottom: oy + y1 as i64,
        };

        if let Some(background) = &style.background {
            draw_box(image, &ink, background);
        }
        paint_mask_at(image, &mask, ox, oy, style.color);
        Some(ink)
    }
}

fn draw_box(image: &mut RgbaImage, ink: &InkBox, background: &TextBox) {
    let pad = background.pad_px.round() as i64;
    let (x0, y0) = (ink.left - pad, ink.top - pad);
    let (x1, y1) = (ink.right + pad, ink.bottom + pad);
    fill_rect(image, x0, y0, x1, y1, background.fill);

    let Some((color, width)) = background.edge else {
        return;
    };
    let e = width.round().max(1.0) as i64;
    fill_rect(image, x0 - e, y0 - e, x1 + e, y0, color);
    fill_rect(image, x0 - e, y1, x1 + e, y1 + e, color);
    fill_rect(image, x0 - e, y0, x0, y1, color);
    fill_rect(image, x1, y0, x1 + e, y1, color);
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn style(size_px: f64, weight: Weight) -> TextStyle {
        TextStyle {
            size_px,
            weight,
            color: WHITE,
            background: None,
        }
    }

    fn inked_bounds(img: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
        let mut mask = GrayImage::new(img.width(), img.height());
        for (x, y, p) in img.enumerate_pixels() {
            mask.put_pixel(x, y, Luma([p.0[3]]));
        }
        ink_bounds(&mask)
    }

    #[test]
    fn test_embedded_fonts_load() {
        let fonts = Fonts::embedded().unwrap();
        for c in "München Škofja Loka ß?".chars().filter(|c| !c.is_whitespace()) {
            assert!(fonts.has_glyph(Weight::Regular, c), "missing {:?}", c);
            assert!(fonts.has_glyph(Weight::Bold, c), "missing bold {:?}", c);
        }
    }

    #[test]
    fn test_centered_question_mark() {
        let fonts = Fonts::embedded().unwrap();
        let mut img = RgbaImage::new(200, 100);
        let ink = fonts
            .draw_text(&mut img, "?", (100.0, 50.0), &style(40.0, Weight::Bold), HAlign::Center, VAlign::Center)
            .unwrap();
        let (cx, cy) = ink.center();
        assert!((cx - 100.0).abs() <= 1.0);
        assert!((cy - 50.0).abs() <= 1.0);

        let (x0, y0, x1, y1) = inked_bounds(&img).unwrap();
        assert_eq!((x0 as i64, y0 as i64, x1 as i64, y1 as i64), (ink.left, ink.top, ink.right, ink.bottom));
        // A bold question mark is taller than wide and about 0.73 em high.
        assert!(y1 - y0 > x1 - x0);
        assert!((y1 - y0) as f64 > 0.6 * 40.0 && ((y1 - y0) as f64) < 0.85 * 40.0);
    }

    #[test]
    fn test_left_and_right_alignment() {
        let fonts = Fonts::embedded().unwrap();
        let mut left = RgbaImage::new(300, 100);
        let ink = fonts
            .draw_text(&mut left, "Bozen", (150.0, 50.0), &style(20.0, Weight::Regular), HAlign::Left, VAlign::Bottom)
            .unwrap();
        assert_eq!(ink.left, 150);
        // Lowercase descender space keeps the ink above the anchor.
        assert!(ink.bottom <= 50);

        let mut right = RgbaImage::new(300, 100);
        let ink = fonts
            .draw_text(&mut right, "Bozen", (150.0, 50.0), &style(20.0, Weight::Regular), HAlign::Right, VAlign::Bottom)
            .unwrap();
        assert_eq!(ink.right, 150);

        let mut top = RgbaImage::new(300, 100);
        let ink = fonts
            .draw_text(&mut top, "Bozen", (150.0, 10.0), &style(20.0, Weight::Regular), HAlign::Center, VAlign::Top)
            .unwrap();
        assert_eq!(ink.top, 10);
    }

    #[test]
    fn test_multiline_stacks_lines() {
        let fonts = Fonts::embedded().unwrap();
        let mut one = RgbaImage::new(300, 200);
        let single = fonts
            .draw_text(&mut one, "Matterhorn", (20.0, 100.0), &style(16.0, Weight::Regular), HAlign::Left, VAlign::Bottom)
            .unwrap();
        let mut two = RgbaImage::new(300, 200);
        let double = fonts
            .draw_text(&mut two, "Matterhorn\n4478m", (20.0, 100.0), &style(16.0, Weight::Regular), HAlign::Left, VAlign::Bottom)
            .unwrap();
        // The second line sits on the anchor and pushes the first one up.
        assert!(double.top < single.top - 10);
        assert_eq!(double.left, 20);
    }

    #[test]
    fn test_background_box_surrounds_ink() {
        let fonts = Fonts::embedded().unwrap();
        let mut img = RgbaImage::new(200, 100);
        let text = TextStyle {
            background: Some(TextBox {
                fill: Rgba([255, 255, 255, 128]),
                edge: Some((Rgba([204, 0, 0, 255]), 1.0)),
                pad_px: 3.0,
            }),
            color: Rgba([204, 0, 0, 255]),
            ..style(20.0, Weight::Bold)
        };
        let ink = fonts
            .draw_text(&mut img, "Piz", (100.0, 50.0), &text, HAlign::Center, VAlign::Center)
            .unwrap();
        // Box fill inside the padding.
        assert_eq!(img.get_pixel((ink.left - 2) as u32, (ink.top - 2) as u32).0, [255, 255, 255, 128]);
        // Edge just outside the padding.
        assert_eq!(img.get_pixel((ink.left - 4) as u32, (ink.top - 4) as u32).0, [204, 0, 0, 255]);
        assert_eq!(img.get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn test_blank_text_draws_nothing() {
        let fonts = Fonts::embedded().unwrap();
        let mut img = RgbaImage::new(50, 50);
        assert!(fonts
            .draw_text(&mut img, " ", (25.0, 25.0), &style(12.0, Weight::Regular), HAlign::Center, VAlign::Center)
            .is_none());
        assert!(img.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_text_clips_at_image_edge() {
        let fonts = Fonts::embedded().unwrap();
        let mut img = RgbaImage::new(40, 40);
        let ink = fonts
            .draw_text(&mut img, "Ortler", (0.0, 20.0), &style(20.0, Weight::Bold), HAlign::Center, VAlign::Center)
            .unwrap();
        assert!(ink.left < 0);
        // The right half of the word survives the clip.
        let (x0, _, x1, _) = inked_bounds(&img).unwrap();
        assert!(x0 < 10);
        assert_eq!(x1 as i64, ink.right);
    }
}
