/// Per-run counters surfaced alongside the generated artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportMetrics {
    pub page_count: usize,
    pub result_count: usize,
    /// Images preprocessed and placed.
    pub images_embedded: usize,
    /// Images supplied but dropped after a decode/encode failure.
    pub images_skipped: usize,
}
