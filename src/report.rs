use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::error::ReportError;
use crate::layout::{LayoutPlanner, PageGeometry, truncate_preview};
use crate::metrics::ReportMetrics;
use crate::model::{
    ClassificationResult, ConfidenceThresholds, FAILURE_SUMMARY_SENTINEL, ReportMetadata,
    SourceImage,
};
use crate::raster::{self, PreprocessedImage, RasterOptions};
use crate::surface::{DrawSurface, LineStyle, TextStyle};
use crate::types::{Margins, Mm, Size, palette};

// Vertical rhythm of the report, in millimetres.
const TITLE_ADVANCE: f32 = 15.0;
const META_LINE_ADVANCE: f32 = 8.0;
const META_TRAILING_ADVANCE: f32 = 15.0;
const SEPARATOR_ADVANCE: f32 = 10.0;
const DOC_TITLE_ADVANCE: f32 = 10.0;
const IMAGE_TRAILING_MARGIN: f32 = 10.0;
const LABEL_ROW_ADVANCE: f32 = 8.0;
const CONFIDENCE_ROW_ADVANCE: f32 = 12.0;
const PARAGRAPH_HEADING_ADVANCE: f32 = 6.0;
const LINE_HEIGHT: f32 = 5.0;
const PARAGRAPH_TRAILING: f32 = 5.0;
const PREVIEW_HEIGHT_CAP: f32 = 30.0;
const PREVIEW_TRAILING: f32 = 15.0;
const FOOTER_RISE: f32 = 10.0;
const FOOTER_RIGHT_INSET: f32 = 80.0;
const VALUE_COLUMN_OFFSET: f32 = 40.0;

#[derive(Debug, Clone)]
pub(crate) struct ReportConfig {
    pub page_size: Size,
    pub margins: Margins,
    pub image_box: Size,
    pub preview_char_budget: usize,
    pub thresholds: ConfidenceThresholds,
    pub raster: RasterOptions,
    pub document_start_reserve: Mm,
    pub title: String,
    pub footer_brand: String,
    pub footer_tagline: String,
}

/// The final artifact of one generation run.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    /// Deterministic artifact name derived from the generation timestamp
    /// and the surface's native extension.
    pub file_name: String,
    pub data: Vec<u8>,
    pub metrics: ReportMetrics,
    pub metadata: ReportMetadata,
}

impl GeneratedReport {
    /// Writes the artifact into `dir` under its derived [`file_name`] and
    /// returns the full path.
    ///
    /// [`file_name`]: GeneratedReport::file_name
    pub fn save_in(&self, dir: &std::path::Path) -> Result<std::path::PathBuf, ReportError> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.data)?;
        Ok(path)
    }
}

/// Converts classification results and their source images into a paginated
/// report on a [`DrawSurface`].
///
/// An engine is immutable configuration; each `generate` call owns its
/// surface and layout cursor exclusively, so independent reports may be
/// generated concurrently from one engine.
pub struct ReportEngine {
    config: ReportConfig,
}

impl ReportEngine {
    pub fn builder() -> ReportEngineBuilder {
        ReportEngineBuilder::default()
    }

    /// Builds the batch report and serializes the artifact.
    ///
    /// `results` and `images` are parallel sequences: `images[i]` belongs to
    /// `results[i]`, with `None` marking a result that has no source raster.
    /// The surface must be fresh (a single empty page); a surface that was
    /// already drawn on is rejected. Image preprocessing failures are
    /// absorbed (the block is omitted); serialization failure is fatal and
    /// returns no partial artifact.
    pub fn generate<S: DrawSurface>(
        &self,
        surface: &mut S,
        results: &[ClassificationResult],
        images: &[Option<SourceImage>],
    ) -> Result<GeneratedReport, ReportError> {
        self.generate_at(surface, results, images, Utc::now())
    }

    /// Single-result convenience: equivalent to the batch entry point with
    /// one-element sequences.
    pub fn generate_single<S: DrawSurface>(
        &self,
        surface: &mut S,
        result: &ClassificationResult,
        image: Option<&SourceImage>,
    ) -> Result<GeneratedReport, ReportError> {
        self.generate(
            surface,
            std::slice::from_ref(result),
            std::slice::from_ref(&image.cloned()),
        )
    }

    /// [`ReportEngine::generate`] with an explicit timestamp. Two calls with
    /// identical inputs and the same timestamp produce byte-identical
    /// artifacts.
    pub fn generate_at<S: DrawSurface>(
        &self,
        surface: &mut S,
        results: &[ClassificationResult],
        images: &[Option<SourceImage>],
        generated_at: DateTime<Utc>,
    ) -> Result<GeneratedReport, ReportError> {
        if results.len() != images.len() {
            return Err(ReportError::InputShape(format!(
                "{} results but {} image slots",
                results.len(),
                images.len()
            )));
        }
        // Page numbering assumes the surface is untouched: one empty page,
        // cursor at the top.
        if surface.page_count() != 1 {
            return Err(ReportError::InputShape(format!(
                "surface already has {} pages, expected a fresh surface",
                surface.page_count()
            )));
        }

        let config = &self.config;

        // Preprocessing is per-result independent: prefetch in parallel,
        // keeping input order. Placement below stays strictly sequential
        // because each block's origin depends on the cursor the previous
        // block left behind.
        let prefetched: Vec<Option<PreprocessedImage>> = images
            .par_iter()
            .map(|slot| {
                slot.as_ref().and_then(|source| {
                    raster::preprocess(
                        source.bytes(),
                        config.image_box.width,
                        config.image_box.height,
                        &config.raster,
                    )
                })
            })
            .collect();

        let geometry = PageGeometry {
            page_size: config.page_size,
            margins: config.margins,
        };
        let mut planner = LayoutPlanner::new(geometry, config.document_start_reserve);
        let mut metrics = ReportMetrics::default();
        let metadata = ReportMetadata {
            generated_at,
            total_documents: results.len(),
        };

        self.emit_header(surface, &mut planner, &metadata);

        for (index, (result, preprocessed)) in results.iter().zip(&prefetched).enumerate() {
            planner.ensure_document_start(surface);
            self.emit_result(surface, &mut planner, index, result, preprocessed.as_ref());
            if preprocessed.is_some() {
                metrics.images_embedded += 1;
            } else if images[index].is_some() {
                metrics.images_skipped += 1;
            }
            metrics.result_count += 1;
        }

        let total_pages = surface.page_count();
        debug_assert_eq!(total_pages, planner.cursor().page);
        self.emit_footers(surface, total_pages)?;
        metrics.page_count = total_pages;

        let data = surface.serialize()?;
        Ok(GeneratedReport {
            file_name: artifact_file_name(generated_at, surface.file_extension()),
            data,
            metrics,
            metadata,
        })
    }

    fn emit_header<S: DrawSurface + ?Sized>(
        &self,
        surface: &mut S,
        planner: &mut LayoutPlanner,
        metadata: &ReportMetadata,
    ) {
        let geometry = planner.geometry();
        let left = geometry.left();

        let y = planner.reserve(surface, Mm::from_f32(TITLE_ADVANCE));
        surface.draw_text(
            left,
            y,
            &self.config.title,
            &TextStyle::new(24.0).with_color(palette::HEADER),
        );

        let meta = TextStyle::new(12.0).with_color(palette::MUTED);
        let y = planner.reserve(surface, Mm::from_f32(META_LINE_ADVANCE));
        surface.draw_text(
            left,
            y,
            &format!(
                "Generated on: {}",
                metadata.generated_at.format("%Y-%m-%d")
            ),
            &meta,
        );
        let y = planner.reserve(surface, Mm::from_f32(META_TRAILING_ADVANCE));
        surface.draw_text(
            left,
            y,
            &format!("Total Documents: {}", metadata.total_documents),
            &meta,
        );
    }

    fn emit_result<S: DrawSurface + ?Sized>(
        &self,
        surface: &mut S,
        planner: &mut LayoutPlanner,
        index: usize,
        result: &ClassificationResult,
        preprocessed: Option<&PreprocessedImage>,
    ) {
        let geometry = planner.geometry();
        let left = geometry.left();
        let value_column = left + Mm::from_f32(VALUE_COLUMN_OFFSET);
        let heading = TextStyle::new(12.0).with_color(palette::TEXT).bold();

        let y = planner.reserve(surface, Mm::from_f32(SEPARATOR_ADVANCE));
        surface.draw_line(
            left,
            y,
            geometry.right(),
            y,
            &LineStyle {
                color: palette::SEPARATOR,
                width: Mm::from_f32(0.2),
            },
        );

        let y = planner.reserve(surface, Mm::from_f32(DOC_TITLE_ADVANCE));
        surface.draw_text(
            left,
            y,
            &format!("Document {}: {}", index + 1, result.file_name),
            &TextStyle::new(16.0).with_color(palette::TEXT),
        );

        if let Some(pre) = preprocessed {
            // Image plus trailing margin reserved as one atomic block: an
            // embedded raster never straddles a page boundary.
            let y = planner.reserve(
                surface,
                pre.height + Mm::from_f32(IMAGE_TRAILING_MARGIN),
            );
            surface.draw_image(left, y, pre.width, pre.height, &pre.image);
        }

        let y = planner.reserve(surface, Mm::from_f32(LABEL_ROW_ADVANCE));
        surface.draw_text(left, y, "Classification:", &heading);
        surface.draw_text(
            value_column,
            y,
            &result.label,
            &TextStyle::new(12.0).with_color(palette::HEADER),
        );

        let y = planner.reserve(surface, Mm::from_f32(CONFIDENCE_ROW_ADVANCE));
        surface.draw_text(left, y, "Confidence:", &heading);
        let band = result.confidence.band(&self.config.thresholds);
        surface.draw_text(
            value_column,
            y,
            &result.confidence.to_string(),
            &TextStyle::new(12.0).with_color(band.color()),
        );

        if let Some(summary) = &result.summary {
            if summary != FAILURE_SUMMARY_SENTINEL && !summary.trim().is_empty() {
                self.emit_paragraph(surface, planner, "Summary:", summary, None);
            }
        }

        if let Some(text) = &result.extracted_text {
            if !text.trim().is_empty() {
                let preview = truncate_preview(text, self.config.preview_char_budget);
                self.emit_paragraph(
                    surface,
                    planner,
                    "Extracted Text (Preview):",
                    &preview,
                    Some(Mm::from_f32(PREVIEW_HEIGHT_CAP)),
                );
            }
        }
    }

    /// A heading line followed by a wrapped body paragraph. With a height
    /// cap, surplus wrapped lines are dropped rather than overrunning the
    /// reserved block.
    fn emit_paragraph<S: DrawSurface + ?Sized>(
        &self,
        surface: &mut S,
        planner: &mut LayoutPlanner,
        heading: &str,
        body: &str,
        height_cap: Option<Mm>,
    ) {
        let geometry = planner.geometry();
        let left = geometry.left();
        let heading_style = TextStyle::new(12.0).with_color(palette::TEXT).bold();
        let body_style = TextStyle::new(12.0).with_color(palette::MUTED);
        let line_height = Mm::from_f32(LINE_HEIGHT);

        let y = planner.reserve(surface, Mm::from_f32(PARAGRAPH_HEADING_ADVANCE));
        surface.draw_text(left, y, heading, &heading_style);

        let mut lines =
            surface.measure_wrapped_lines(body, geometry.content_width(), &body_style);
        let trailing;
        match height_cap {
            Some(cap) => {
                let max_lines =
                    (cap.to_milli_i64() / line_height.to_milli_i64()).max(1) as usize;
                lines.truncate(max_lines);
                trailing = Mm::from_f32(PREVIEW_TRAILING);
            }
            None => trailing = Mm::from_f32(PARAGRAPH_TRAILING),
        }

        let block_height = line_height * lines.len() as i32 + trailing;
        let y = planner.reserve(surface, block_height);
        for (offset, line) in lines.iter().enumerate() {
            surface.draw_text(left, y + line_height * offset as i32, line, &body_style);
        }
    }

    /// Second pass: every page gets its "Page N of total" footer. Possible
    /// only because the surface exposes already-created pages by index.
    fn emit_footers<S: DrawSurface + ?Sized>(
        &self,
        surface: &mut S,
        total_pages: usize,
    ) -> Result<(), ReportError> {
        let style = TextStyle::new(10.0).with_color(palette::MUTED);
        let footer_y = self.config.page_size.height - Mm::from_f32(FOOTER_RISE);
        let left = self.config.margins.left;
        let right = self.config.page_size.width - Mm::from_f32(FOOTER_RIGHT_INSET);

        for page in 1..=total_pages {
            surface.set_active_page(page)?;
            surface.draw_text(
                left,
                footer_y,
                &format!(
                    "{} - Page {} of {}",
                    self.config.footer_brand, page, total_pages
                ),
                &style,
            );
            surface.draw_text(right, footer_y, &self.config.footer_tagline, &style);
        }
        Ok(())
    }
}

/// `document-classification-report-{ISO-8601, colons replaced}.{ext}`.
pub fn artifact_file_name(generated_at: DateTime<Utc>, extension: &str) -> String {
    let stamp = generated_at.format("%Y-%m-%dT%H-%M-%S");
    format!("document-classification-report-{stamp}.{extension}")
}

pub struct ReportEngineBuilder {
    page_size: Size,
    margins: Margins,
    image_box: Size,
    preview_char_budget: usize,
    thresholds: ConfidenceThresholds,
    raster: RasterOptions,
    document_start_reserve: Mm,
    title: String,
    footer_brand: String,
    footer_tagline: String,
}

impl Default for ReportEngineBuilder {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(20.0),
            image_box: Size::from_mm(120.0, 90.0),
            preview_char_budget: 300,
            thresholds: ConfidenceThresholds::default(),
            raster: RasterOptions::default(),
            document_start_reserve: Mm::from_f32(120.0),
            title: "Document Classification Report".to_string(),
            footer_brand: "Generated by DocClassifier".to_string(),
            footer_tagline: "Powered by AI Document Classification".to_string(),
        }
    }
}

impl ReportEngineBuilder {
    pub fn page_size(mut self, page_size: Size) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    /// Bounding box embedded images are scaled to fit within.
    pub fn image_box(mut self, width_mm: f32, height_mm: f32) -> Self {
        self.image_box = Size::from_mm(width_mm, height_mm);
        self
    }

    pub fn preview_char_budget(mut self, budget: usize) -> Self {
        self.preview_char_budget = budget;
        self
    }

    pub fn confidence_thresholds(mut self, affirmative: f64, cautionary: f64) -> Self {
        self.thresholds = ConfidenceThresholds {
            affirmative,
            cautionary,
        };
        self
    }

    pub fn lossless_byte_ceiling(mut self, bytes: usize) -> Self {
        self.raster.lossless_byte_ceiling = bytes;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.raster.jpeg_quality = quality;
        self
    }

    /// Minimum space a document section needs below the cursor before its
    /// header is allowed to start on the current page.
    pub fn document_start_reserve(mut self, reserve_mm: f32) -> Self {
        self.document_start_reserve = Mm::from_f32(reserve_mm);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn footer_brand(mut self, brand: impl Into<String>) -> Self {
        self.footer_brand = brand.into();
        self
    }

    pub fn footer_tagline(mut self, tagline: impl Into<String>) -> Self {
        self.footer_tagline = tagline.into();
        self
    }

    pub fn build(self) -> Result<ReportEngine, ReportError> {
        let content_width =
            self.page_size.width - self.margins.left - self.margins.right;
        if content_width <= Mm::ZERO {
            return Err(ReportError::InvalidConfiguration(
                "margins leave no horizontal content area".to_string(),
            ));
        }
        let content_height =
            self.page_size.height - self.margins.top - self.margins.bottom;
        if content_height <= Mm::ZERO {
            return Err(ReportError::InvalidConfiguration(
                "margins leave no vertical content area".to_string(),
            ));
        }
        if self.image_box.width <= Mm::ZERO || self.image_box.height <= Mm::ZERO {
            return Err(ReportError::InvalidConfiguration(
                "image_box dimensions must be positive".to_string(),
            ));
        }
        if self.image_box.width > content_width || self.image_box.height > content_height {
            return Err(ReportError::InvalidConfiguration(
                "image_box does not fit inside the content area".to_string(),
            ));
        }
        if self.preview_char_budget == 0 {
            return Err(ReportError::InvalidConfiguration(
                "preview_char_budget must be at least 1".to_string(),
            ));
        }
        let t = &self.thresholds;
        if !(0.0..=100.0).contains(&t.cautionary)
            || !(0.0..=100.0).contains(&t.affirmative)
            || t.cautionary >= t.affirmative
        {
            return Err(ReportError::InvalidConfiguration(
                "confidence_thresholds must satisfy 0 <= cautionary < affirmative <= 100"
                    .to_string(),
            ));
        }
        if self.raster.lossless_byte_ceiling == 0 {
            return Err(ReportError::InvalidConfiguration(
                "lossless_byte_ceiling must be positive".to_string(),
            ));
        }
        if self.raster.jpeg_quality == 0 || self.raster.jpeg_quality > 100 {
            return Err(ReportError::InvalidConfiguration(
                "jpeg_quality must be in 1..=100".to_string(),
            ));
        }
        if self.document_start_reserve >= self.page_size.height {
            return Err(ReportError::InvalidConfiguration(
                "document_start_reserve must be smaller than the page height".to_string(),
            ));
        }

        Ok(ReportEngine {
            config: ReportConfig {
                page_size: self.page_size,
                margins: self.margins,
                image_box: self.image_box,
                preview_char_budget: self.preview_char_budget,
                thresholds: self.thresholds,
                raster: self.raster,
                document_start_reserve: self.document_start_reserve,
                title: self.title,
                footer_brand: self.footer_brand,
                footer_tagline: self.footer_tagline,
            },
        })
    }
}
