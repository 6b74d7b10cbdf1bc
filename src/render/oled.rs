//! Monochrome OLED layout: time, date and weather over an optional dithered
//! background image.
//!
//! Frames are drawn into an in-memory [`FrameBuffer`] and handed to an
//! [`OledDevice`] in one go. The SSD1306 I2C driver lives behind the
//! `ssd1306` feature; without it [`open_device`] reports the panel as
//! unavailable and the consumer is simply not started.

use super::{Frame, Renderer};
use crate::config::{Config, OledConfig, seconds};
use crate::error::RenderError;
use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::iso_8859_1::{
    FONT_4X6, FONT_5X7, FONT_5X8, FONT_6X9, FONT_6X10, FONT_6X12, FONT_6X13, FONT_7X13, FONT_7X14,
    FONT_8X13, FONT_9X15, FONT_9X18, FONT_10X20,
};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use image::imageops::{self, BiLevel, FilterType};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Top edge of each text row.
pub const TIME_Y: i32 = 2;
pub const DATE_Y: i32 = 34;
pub const WEATHER_Y: i32 = 48;

/// Blank margin kept around each text box so it reads over the background.
const BOX_PAD: i32 = 2;

const FONTS: [&MonoFont<'static>; 13] = [
    &FONT_4X6, &FONT_5X7, &FONT_5X8, &FONT_6X9, &FONT_6X10, &FONT_6X12, &FONT_6X13, &FONT_7X13,
    &FONT_7X14, &FONT_8X13, &FONT_9X15, &FONT_9X18, &FONT_10X20,
];

/// Tallest bundled font whose glyphs fit in `px` rows.
pub fn font_for_size(px: u32) -> &'static MonoFont<'static> {
    FONTS
        .iter()
        .rev()
        .find(|font| font.character_size.height <= px)
        .copied()
        .unwrap_or(&FONT_4X6)
}

/// A 1-bit pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    size: Size,
    pixels: Vec<bool>,
}

impl FrameBuffer {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            pixels: vec![false; (size.width * size.height) as usize],
        }
    }

    fn index(&self, point: Point) -> Option<usize> {
        let (w, h) = (self.size.width as i32, self.size.height as i32);
        ((0..w).contains(&point.x) && (0..h).contains(&point.y))
            .then(|| (point.y * w + point.x) as usize)
    }

    pub fn is_lit(&self, point: Point) -> bool {
        self.index(point).is_some_and(|i| self.pixels[i])
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|&&on| on).count()
    }

    /// Every lit pixel, for drivers that take pixel streams.
    pub fn lit_pixels(&self) -> impl Iterator<Item = Pixel<BinaryColor>> + '_ {
        let width = self.size.width as usize;
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(move |(i, _)| {
                Pixel(
                    Point::new((i % width) as i32, (i / width) as i32),
                    BinaryColor::On,
                )
            })
    }

    pub fn copy_from(&mut self, other: &FrameBuffer) {
        if other.size == self.size {
            self.pixels.copy_from_slice(&other.pixels);
        }
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(i) = self.index(point) {
                self.pixels[i] = color.is_on();
            }
        }
        Ok(())
    }
}

/// A panel that shows whole frame buffers.
pub trait OledDevice: Send {
    /// Drawable size after rotation.
    fn size(&self) -> Size;

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), RenderError>;

    /// Blank the panel and let go of the bus.
    fn release(&mut self) {}
}

/// Open the configured panel.
pub fn open_device(config: &OledConfig) -> Result<Box<dyn OledDevice>, RenderError> {
    #[cfg(feature = "ssd1306")]
    {
        let device = super::i2c_panel::Ssd1306Device::open(config)?;
        Ok(Box::new(device))
    }
    #[cfg(not(feature = "ssd1306"))]
    {
        let _ = config;
        Err(RenderError::Unavailable(
            "built without the `ssd1306` feature".to_string(),
        ))
    }
}

/// Converted background, reused until the file changes.
struct Background {
    path: PathBuf,
    modified: Option<SystemTime>,
    bitmap: FrameBuffer,
}

/// Resize, grayscale and Floyd-Steinberg dither an image file to 1 bit.
pub fn load_background(path: &Path, size: Size) -> Result<FrameBuffer, image::ImageError> {
    let image = image::open(path)?;
    let mut luma = image
        .resize_exact(size.width, size.height, FilterType::Lanczos3)
        .to_luma8();
    imageops::dither(&mut luma, &BiLevel);

    let mut bitmap = FrameBuffer::new(size);
    for (x, y, pixel) in luma.enumerate_pixels() {
        if pixel.0[0] > 127 {
            if let Some(i) = bitmap.index(Point::new(x as i32, y as i32)) {
                bitmap.pixels[i] = true;
            }
        }
    }
    Ok(bitmap)
}

/// Draw `text` centered horizontally at `y` inside a cleared box.
pub fn draw_boxed_text<D>(target: &mut D, text: &str, y: i32, font: &MonoFont<'_>)
where
    D: DrawTarget<Color = BinaryColor>,
{
    let chars = text.chars().count() as u32;
    let glyph = font.character_size;
    let text_width = chars * glyph.width + chars.saturating_sub(1) * font.character_spacing;
    let width = target.bounding_box().size.width;
    let x = (width.saturating_sub(text_width) / 2) as i32;

    Rectangle::new(
        Point::new(x - BOX_PAD, y - BOX_PAD),
        Size::new(text_width + 2 * BOX_PAD as u32, glyph.height + 2 * BOX_PAD as u32),
    )
    .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
    .draw(target)
    .ok();

    Text::with_baseline(
        text,
        Point::new(x, y),
        MonoTextStyle::new(font, BinaryColor::On),
        Baseline::Top,
    )
    .draw(target)
    .ok();
}

/// Renders frames to an [`OledDevice`].
pub struct OledRenderer {
    device: Box<dyn OledDevice>,
    buffer: FrameBuffer,
    background: Option<Background>,
}

impl OledRenderer {
    pub fn new(device: Box<dyn OledDevice>) -> Self {
        let buffer = FrameBuffer::new(device.size());
        Self {
            device,
            buffer,
            background: None,
        }
    }

    /// Copy the background in, reloading it when the path or mtime moved.
    /// A missing or unreadable file leaves the frame blank.
    fn paint_background(&mut self, path: &Path) {
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok();
        let stale = self
            .background
            .as_ref()
            .is_none_or(|bg| bg.path != path || bg.modified != modified);

        if stale {
            self.background = match load_background(path, self.buffer.size) {
                Ok(bitmap) => Some(Background {
                    path: path.to_path_buf(),
                    modified,
                    bitmap,
                }),
                Err(e) => {
                    debug!("Background {} not usable: {}", path.display(), e);
                    None
                }
            };
        }
        if let Some(bg) = &self.background {
            self.buffer.copy_from(&bg.bitmap);
        }
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }
}

impl Renderer for OledRenderer {
    fn name(&self) -> &'static str {
        "oled"
    }

    fn refresh_interval(&self, config: &Config) -> std::time::Duration {
        seconds(config.oled.refresh_s)
    }

    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.buffer.clear(BinaryColor::Off).ok();
        let background = &frame.config.background;
        if background.enabled {
            self.paint_background(&background.path);
        }

        let fonts = &frame.config.oled.font_sizes;
        let time = frame.now.format("%H:%M:%S").to_string();
        let date = frame.now.format("%b %d, %Y").to_string();
        draw_boxed_text(&mut self.buffer, &time, TIME_Y, font_for_size(fonts.time));
        draw_boxed_text(&mut self.buffer, &date, DATE_Y, font_for_size(fonts.date));
        draw_boxed_text(
            &mut self.buffer,
            &frame.weather,
            WEATHER_Y,
            font_for_size(fonts.weather),
        );

        self.device.present(&self.buffer)
    }

    fn shutdown(&mut self) {
        self.device.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FrameSources;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Keeps the last presented frame.
    struct Panel {
        shown: Arc<Mutex<Option<FrameBuffer>>>,
        released: Arc<Mutex<bool>>,
    }

    impl OledDevice for Panel {
        fn size(&self) -> Size {
            Size::new(128, 64)
        }

        fn present(&mut self, frame: &FrameBuffer) -> Result<(), RenderError> {
            *self.shown.lock().unwrap() = Some(frame.clone());
            Ok(())
        }

        fn release(&mut self) {
            *self.released.lock().unwrap() = true;
        }
    }

    fn renderer() -> (OledRenderer, Arc<Mutex<Option<FrameBuffer>>>, Arc<Mutex<bool>>) {
        let shown = Arc::new(Mutex::new(None));
        let released = Arc::new(Mutex::new(false));
        let panel = Panel {
            shown: Arc::clone(&shown),
            released: Arc::clone(&released),
        };
        (OledRenderer::new(Box::new(panel)), shown, released)
    }

    fn write_white_png(path: &Path) {
        image::RgbImage::from_pixel(32, 16, image::Rgb([255, 255, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_font_for_size() {
        assert_eq!(font_for_size(28).character_size, Size::new(10, 20));
        assert_eq!(font_for_size(12).character_size, Size::new(6, 12));
        assert_eq!(font_for_size(1).character_size, Size::new(4, 6));
    }

    #[test]
    fn test_frame_buffer_clips() {
        let mut fb = FrameBuffer::new(Size::new(4, 2));
        fb.draw_iter([
            Pixel(Point::new(1, 1), BinaryColor::On),
            Pixel(Point::new(-1, 0), BinaryColor::On),
            Pixel(Point::new(4, 0), BinaryColor::On),
        ])
        .ok();
        assert!(fb.is_lit(Point::new(1, 1)));
        assert_eq!(fb.lit_count(), 1);
        assert_eq!(fb.lit_pixels().count(), 1);
    }

    #[test]
    fn test_text_box_clears_background() {
        let mut fb = FrameBuffer::new(Size::new(128, 64));
        fb.clear(BinaryColor::On).ok();
        draw_boxed_text(&mut fb, "12:00", 10, font_for_size(12));
        // Box margin is blank, rows below the box are untouched.
        assert!(!fb.is_lit(Point::new(64, 8)));
        assert!(fb.is_lit(Point::new(64, 40)));
    }

    #[test]
    fn test_render_presents_text() {
        let (mut oled, shown, released) = renderer();
        let mut config = Config::default();
        config.background.enabled = false;
        let frame = FrameSources::detached().frame(config);

        oled.render(&frame).unwrap();
        let shown = shown.lock().unwrap().clone().unwrap();
        assert!(shown.lit_count() > 0);
        // Corners stay dark without a background.
        assert!(!shown.is_lit(Point::new(0, 63)));

        oled.shutdown();
        assert!(*released.lock().unwrap());
    }

    #[test]
    fn test_background_cached_and_missing_file_tolerated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bg.png");
        write_white_png(&path);

        let (mut oled, shown, _) = renderer();
        let mut config = Config::default();
        config.background.enabled = true;
        config.background.path = path.clone();
        let sources = FrameSources::detached();

        oled.render(&sources.frame(config.clone())).unwrap();
        assert!(shown.lock().unwrap().as_ref().unwrap().is_lit(Point::new(0, 63)));
        assert!(oled.background.is_some());

        config.background.path = temp.path().join("missing.png");
        oled.render(&sources.frame(config)).unwrap();
        assert!(oled.background.is_none());
        assert!(!shown.lock().unwrap().as_ref().unwrap().is_lit(Point::new(0, 63)));
    }

    #[test]
    fn test_open_device_without_driver() {
        if cfg!(feature = "ssd1306") {
            return;
        }
        assert!(matches!(
            open_device(&OledConfig::default()),
            Err(RenderError::Unavailable(_))
        ));
    }
}
