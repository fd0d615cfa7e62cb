use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::types::{Color, Mm, Size};

#[derive(Debug)]
pub enum SurfaceError {
    PageOutOfRange { requested: usize, page_count: usize },
    Serialize(String),
    Write(String),
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::PageOutOfRange {
                requested,
                page_count,
            } => write!(
                f,
                "page {} out of range (surface has {} pages)",
                requested, page_count
            ),
            SurfaceError::Serialize(message) => write!(f, "serialize failed: {}", message),
            SurfaceError::Write(message) => write!(f, "write failed: {}", message),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// Text styling for a single draw call. The surface owns font selection and
/// metrics; the engine only asks for size, weight, and color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size_pt: f32,
    pub color: Color,
    pub bold: bool,
}

impl TextStyle {
    pub fn new(size_pt: f32) -> Self {
        Self {
            size_pt,
            color: Color::BLACK,
            bold: false,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: Color,
    pub width: Mm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "png",
            ImageEncoding::Jpeg => "jpeg",
        }
    }
}

/// An encoded raster ready for embedding: the pixel buffer dimensions here
/// are the supersampled ones, not the logical placement dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub format: ImageEncoding,
    pub data: Vec<u8>,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

/// The paginated drawing backend the report engine targets.
///
/// A surface starts with a single empty page and maintains an active page
/// that draw calls land on. `set_active_page` repositions onto an
/// already-created page, which is what makes the deferred footer pass
/// possible: total page count exists only after all content is placed.
///
/// Coordinates are millimetres from the top-left page corner.
pub trait DrawSurface {
    /// Appends a fresh page and makes it active.
    fn new_page(&mut self);

    /// Redirects subsequent draw calls onto page `page` (1-based).
    fn set_active_page(&mut self, page: usize) -> Result<(), SurfaceError>;

    fn page_count(&self) -> usize;

    fn draw_text(&mut self, x: Mm, y: Mm, text: &str, style: &TextStyle);

    fn draw_image(&mut self, x: Mm, y: Mm, width: Mm, height: Mm, image: &EncodedImage);

    fn draw_line(&mut self, x1: Mm, y1: Mm, x2: Mm, y2: Mm, style: &LineStyle);

    /// Splits `text` into the lines it would occupy at `max_width`. Pure:
    /// no drawing, no state change.
    fn measure_wrapped_lines(&self, text: &str, max_width: Mm, style: &TextStyle) -> Vec<String>;

    /// Native extension of the serialized artifact, without the dot.
    fn file_extension(&self) -> &'static str;

    fn serialize(&self) -> Result<Vec<u8>, SurfaceError>;

    /// Persists the serialized artifact at `path`.
    fn save(&self, path: &Path) -> Result<(), SurfaceError> {
        let data = self.serialize()?;
        std::fs::write(path, data).map_err(|err| SurfaceError::Write(err.to_string()))
    }
}

/// One recorded placement command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Text {
        x: Mm,
        y: Mm,
        text: String,
        size_pt: f32,
        color: Color,
        bold: bool,
    },
    Image {
        x: Mm,
        y: Mm,
        width: Mm,
        height: Mm,
        resource_id: String,
    },
    Line {
        x1: Mm,
        y1: Mm,
        x2: Mm,
        y2: Mm,
        color: Color,
        width: Mm,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub commands: Vec<Command>,
}

/// Command-recording [`DrawSurface`]: pages are an indexed arena of command
/// lists, image payloads are deduplicated by content digest, and
/// `serialize()` emits a deterministic line-oriented dump. Serves as the
/// default backend and as the inspection double in tests.
pub struct RecordingSurface {
    page_size: Size,
    pages: Vec<Page>,
    active: usize,
    resources: BTreeMap<String, EncodedImage>,
}

// Point-to-millimetre conversion and the average glyph advance as a
// fraction of the em square, used by the width approximation.
const PT_TO_MM: f32 = 0.352_778;
const AVG_CHAR_WIDTH_EM: f32 = 0.5;

impl RecordingSurface {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: vec![Page::default()],
            active: 0,
            resources: BTreeMap::new(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn resources(&self) -> &BTreeMap<String, EncodedImage> {
        &self.resources
    }

    fn current(&mut self) -> &mut Page {
        &mut self.pages[self.active]
    }

    fn approx_char_width(style: &TextStyle) -> f32 {
        style.size_pt * PT_TO_MM * AVG_CHAR_WIDTH_EM
    }

    fn register_resource(&mut self, image: &EncodedImage) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&image.data);
        let digest = hasher.finalize();
        let mut id = String::with_capacity(20);
        id.push_str("img-");
        for byte in digest.iter().take(8) {
            id.push_str(&format!("{byte:02x}"));
        }
        self.resources.entry(id.clone()).or_insert_with(|| image.clone());
        id
    }
}

impl DrawSurface for RecordingSurface {
    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.active = self.pages.len() - 1;
    }

    fn set_active_page(&mut self, page: usize) -> Result<(), SurfaceError> {
        if page == 0 || page > self.pages.len() {
            return Err(SurfaceError::PageOutOfRange {
                requested: page,
                page_count: self.pages.len(),
            });
        }
        self.active = page - 1;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn draw_text(&mut self, x: Mm, y: Mm, text: &str, style: &TextStyle) {
        let command = Command::Text {
            x,
            y,
            text: text.to_string(),
            size_pt: style.size_pt,
            color: style.color,
            bold: style.bold,
        };
        self.current().commands.push(command);
    }

    fn draw_image(&mut self, x: Mm, y: Mm, width: Mm, height: Mm, image: &EncodedImage) {
        let resource_id = self.register_resource(image);
        self.current().commands.push(Command::Image {
            x,
            y,
            width,
            height,
            resource_id,
        });
    }

    fn draw_line(&mut self, x1: Mm, y1: Mm, x2: Mm, y2: Mm, style: &LineStyle) {
        let command = Command::Line {
            x1,
            y1,
            x2,
            y2,
            color: style.color,
            width: style.width,
        };
        self.current().commands.push(command);
    }

    fn measure_wrapped_lines(&self, text: &str, max_width: Mm, style: &TextStyle) -> Vec<String> {
        let char_width = Self::approx_char_width(style);
        if char_width <= 0.0 {
            return vec![text.to_string()];
        }
        let max_chars = ((max_width.to_f32() / char_width).floor() as usize).max(1);

        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for word in text.split_whitespace() {
            let mut word = word.to_string();
            let mut word_chars = word.chars().count();

            // Hard-split words wider than a full line.
            while word_chars > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                let split_at = word
                    .char_indices()
                    .nth(max_chars)
                    .map(|(idx, _)| idx)
                    .unwrap_or(word.len());
                let rest = word.split_off(split_at);
                lines.push(std::mem::replace(&mut word, rest));
                word_chars -= max_chars;
            }

            let needed = if current.is_empty() {
                word_chars
            } else {
                current_chars + 1 + word_chars
            };
            if needed <= max_chars {
                if !current.is_empty() {
                    current.push(' ');
                    current_chars += 1;
                }
                current.push_str(&word);
                current_chars += word_chars;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(&word);
                current_chars = word_chars;
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    fn file_extension(&self) -> &'static str {
        "dcr"
    }

    fn serialize(&self) -> Result<Vec<u8>, SurfaceError> {
        let mut out = String::new();
        out.push_str("docreport-surface/1\n");
        out.push_str(&format!(
            "page-size {} {}\n",
            self.page_size.width.to_milli_i64(),
            self.page_size.height.to_milli_i64()
        ));

        for (index, page) in self.pages.iter().enumerate() {
            out.push_str(&format!("page {}\n", index + 1));
            for command in &page.commands {
                match command {
                    Command::Text {
                        x,
                        y,
                        text,
                        size_pt,
                        color,
                        bold,
                    } => {
                        let (r, g, b) = color.to_rgb8();
                        out.push_str(&format!(
                            "  text {} {} {} {},{},{} {} \"{}\"\n",
                            x.to_milli_i64(),
                            y.to_milli_i64(),
                            (size_pt * 1000.0).round() as i64,
                            r,
                            g,
                            b,
                            if *bold { "bold" } else { "normal" },
                            text_escape(text),
                        ));
                    }
                    Command::Image {
                        x,
                        y,
                        width,
                        height,
                        resource_id,
                    } => {
                        out.push_str(&format!(
                            "  image {} {} {} {} {}\n",
                            x.to_milli_i64(),
                            y.to_milli_i64(),
                            width.to_milli_i64(),
                            height.to_milli_i64(),
                            resource_id,
                        ));
                    }
                    Command::Line {
                        x1,
                        y1,
                        x2,
                        y2,
                        color,
                        width,
                    } => {
                        let (r, g, b) = color.to_rgb8();
                        out.push_str(&format!(
                            "  line {} {} {} {} {},{},{} {}\n",
                            x1.to_milli_i64(),
                            y1.to_milli_i64(),
                            x2.to_milli_i64(),
                            y2.to_milli_i64(),
                            r,
                            g,
                            b,
                            width.to_milli_i64(),
                        ));
                    }
                }
            }
        }

        // BTreeMap iteration keeps the resource section ordered by id.
        for (id, resource) in &self.resources {
            out.push_str(&format!(
                "resource {} {} {}x{} {}\n",
                id,
                resource.format.as_str(),
                resource.pixel_width,
                resource.pixel_height,
                base64::engine::general_purpose::STANDARD.encode(&resource.data),
            ));
        }

        Ok(out.into_bytes())
    }
}

fn text_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> RecordingSurface {
        RecordingSurface::new(Size::a4())
    }

    #[test]
    fn starts_with_one_empty_page() {
        let surface = surface();
        assert_eq!(surface.page_count(), 1);
        assert!(surface.pages()[0].commands.is_empty());
    }

    #[test]
    fn set_active_page_redirects_draws() {
        let mut surface = surface();
        surface.new_page();
        surface.new_page();
        surface
            .set_active_page(1)
            .expect("page 1 exists");
        surface.draw_text(
            Mm::from_f32(20.0),
            Mm::from_f32(287.0),
            "Page 1 of 3",
            &TextStyle::new(10.0),
        );
        assert_eq!(surface.pages()[0].commands.len(), 1);
        assert!(surface.pages()[1].commands.is_empty());
        assert!(surface.pages()[2].commands.is_empty());
    }

    #[test]
    fn set_active_page_rejects_out_of_range() {
        let mut surface = surface();
        let err = surface.set_active_page(2).expect_err("only one page");
        assert!(matches!(err, SurfaceError::PageOutOfRange { .. }));
        let err = surface.set_active_page(0).expect_err("pages are 1-based");
        assert!(matches!(err, SurfaceError::PageOutOfRange { .. }));
    }

    #[test]
    fn wrap_is_greedy_and_pure() {
        let surface = surface();
        let style = TextStyle::new(12.0);
        let max = Mm::from_f32(40.0);
        let lines = surface.measure_wrapped_lines(
            "the quick brown fox jumps over the lazy dog",
            max,
            &style,
        );
        assert!(lines.len() > 1);
        let rejoined = lines.join(" ");
        assert_eq!(rejoined, "the quick brown fox jumps over the lazy dog");
        // Pure: measuring must not record anything.
        assert!(surface.pages()[0].commands.is_empty());
    }

    #[test]
    fn wrap_hard_splits_oversized_words() {
        let surface = surface();
        let style = TextStyle::new(12.0);
        let word = "a".repeat(200);
        let lines = surface.measure_wrapped_lines(&word, Mm::from_f32(40.0), &style);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(""), word);
    }

    #[test]
    fn wrap_of_empty_text_is_empty() {
        let surface = surface();
        let lines =
            surface.measure_wrapped_lines("   ", Mm::from_f32(40.0), &TextStyle::new(12.0));
        assert!(lines.is_empty());
    }

    #[test]
    fn identical_images_share_a_resource() {
        let mut surface = surface();
        let image = EncodedImage {
            format: ImageEncoding::Png,
            data: vec![1, 2, 3, 4],
            pixel_width: 2,
            pixel_height: 2,
        };
        let zero = Mm::ZERO;
        let dim = Mm::from_f32(10.0);
        surface.draw_image(zero, zero, dim, dim, &image);
        surface.draw_image(zero, dim, dim, dim, &image);
        assert_eq!(surface.resources().len(), 1);
    }

    #[test]
    fn serialize_is_deterministic() {
        let build = || {
            let mut surface = surface();
            surface.draw_text(
                Mm::from_f32(20.0),
                Mm::from_f32(20.0),
                "Document Classification Report",
                &TextStyle::new(24.0),
            );
            surface.new_page();
            surface.draw_line(
                Mm::from_f32(20.0),
                Mm::from_f32(30.0),
                Mm::from_f32(190.0),
                Mm::from_f32(30.0),
                &LineStyle {
                    color: Color::BLACK,
                    width: Mm::from_f32(0.2),
                },
            );
            surface.serialize().expect("serialize")
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn serialized_text_is_escaped() {
        let mut surface = surface();
        surface.draw_text(
            Mm::ZERO,
            Mm::ZERO,
            "quote \" and\nnewline",
            &TextStyle::new(12.0),
        );
        let dump = String::from_utf8(surface.serialize().expect("serialize")).expect("utf8");
        assert!(dump.contains("quote \\\" and\\nnewline"));
    }
}
