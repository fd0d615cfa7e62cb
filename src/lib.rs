mod error;
mod layout;
mod metrics;
mod model;
mod raster;
mod report;
mod surface;
mod types;

pub use error::ReportError;
pub use layout::{ELLIPSIS, LayoutCursor, LayoutPlanner, PageGeometry, truncate_preview};
pub use metrics::ReportMetrics;
pub use model::{
    ClassificationResult, Confidence, ConfidenceBand, ConfidenceThresholds, ERROR_LABEL,
    FAILURE_SUMMARY_SENTINEL, ReportMetadata, SourceImage,
};
pub use raster::{PreprocessedImage, RasterOptions, preprocess};
pub use report::{GeneratedReport, ReportEngine, ReportEngineBuilder, artifact_file_name};
pub use surface::{
    Command, DrawSurface, EncodedImage, ImageEncoding, LineStyle, Page, RecordingSurface,
    SurfaceError, TextStyle,
};
pub use types::{Color, Margins, Mm, Size, palette};
