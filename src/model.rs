use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::raster;
use crate::types::{Color, palette};

/// Summary value the upstream classifier emits when it could not produce a
/// real summary. Never rendered as a summary block.
pub const FAILURE_SUMMARY_SENTINEL: &str = "Failed to classify";

/// Label the upstream classifier emits for a document it could not process.
pub const ERROR_LABEL: &str = "Error";

/// One classified document as delivered by the upstream API. The engine only
/// reads these; it never mutates or re-derives classification data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub file_name: String,
    pub label: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub summary: Option<String>,
    /// Upstream names this field `text`.
    #[serde(default, alias = "text")]
    pub extracted_text: Option<String>,
}

/// Confidence as resolved once at ingestion.
///
/// The upstream producer is inconsistent: it sends `"82%"`, `"0.92"`, `0.82`,
/// `82`, or free text like `"N/A"`. The wire value is normalized exactly once
/// when deserialized (or via [`Confidence::from_text`] /
/// [`Confidence::from_number`]); every display and color-coding site then
/// works from [`Confidence::percent`].
#[derive(Debug, Clone, PartialEq)]
pub enum Confidence {
    /// Value already expressed in percent (0-100 scale).
    Percent(f64),
    /// Value expressed as a ratio in [0, 1].
    Fraction(f64),
    /// Unparseable wire value, preserved verbatim for display.
    Unknown(String),
}

impl Confidence {
    /// A bare number <= 1 is a ratio, anything larger is already a percent.
    pub fn from_number(value: f64) -> Confidence {
        if !value.is_finite() {
            return Confidence::Unknown(value.to_string());
        }
        if value <= 1.0 {
            Confidence::Fraction(value)
        } else {
            Confidence::Percent(value)
        }
    }

    /// Text containing a percent marker is parsed as already-percent;
    /// otherwise the text is parsed as a bare number and classified by
    /// [`Confidence::from_number`].
    pub fn from_text(raw: &str) -> Confidence {
        let trimmed = raw.trim();
        if trimmed.contains('%') {
            let lead: String = trimmed
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
                .collect();
            if let Ok(value) = lead.parse::<f64>() {
                return Confidence::Percent(value);
            }
            return Confidence::Unknown(raw.to_string());
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Confidence::from_number(value),
            Err(_) => Confidence::Unknown(raw.to_string()),
        }
    }

    /// The normalized percent value, if one exists.
    pub fn percent(&self) -> Option<f64> {
        match self {
            Confidence::Percent(p) => Some(*p),
            Confidence::Fraction(f) => Some(f * 100.0),
            Confidence::Unknown(_) => None,
        }
    }

    pub fn band(&self, thresholds: &ConfidenceThresholds) -> ConfidenceBand {
        match self.percent() {
            Some(p) if p >= thresholds.affirmative => ConfidenceBand::Affirmative,
            Some(p) if p >= thresholds.cautionary => ConfidenceBand::Cautionary,
            Some(_) => ConfidenceBand::Negative,
            None => ConfidenceBand::Unknown,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = match self {
            Confidence::Percent(p) => *p,
            Confidence::Fraction(fraction) => fraction * 100.0,
            Confidence::Unknown(raw) => return f.write_str(raw),
        };
        if (p - p.round()).abs() < 0.05 {
            write!(f, "{:.0}%", p)
        } else {
            write!(f, "{:.1}%", p)
        }
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(f64),
            Text(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Number(n) => Confidence::from_number(n),
            Wire::Text(t) => Confidence::from_text(&t),
        })
    }
}

/// Three-tier banding applied to the normalized percent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Affirmative,
    Cautionary,
    Negative,
    Unknown,
}

impl ConfidenceBand {
    pub fn color(&self) -> Color {
        match self {
            ConfidenceBand::Affirmative => palette::AFFIRMATIVE,
            ConfidenceBand::Cautionary => palette::CAUTIONARY,
            ConfidenceBand::Negative => palette::NEGATIVE,
            ConfidenceBand::Unknown => palette::MUTED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThresholds {
    /// Percent at or above which confidence is affirmative.
    pub affirmative: f64,
    /// Percent at or above which confidence is cautionary.
    pub cautionary: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            affirmative: 80.0,
            cautionary: 60.0,
        }
    }
}

/// Encoded source raster paired positionally with a [`ClassificationResult`].
#[derive(Debug, Clone)]
pub struct SourceImage {
    data: Vec<u8>,
}

impl SourceImage {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Accepts `data:<mime>;base64,<payload>` and plain-text data URIs, the
    /// form the upload client hands over for previewed files.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let (_mime, data) = raster::parse_data_uri(uri)?;
        Some(Self { data })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Report-level metadata, derived at generation time.
#[derive(Debug, Clone, Copy)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_documents: usize,
}
