//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di conversione.
//!
//! ## Componenti principali:
//! - `ProgressManager`: Progress bar `indicatif` per i file di una directory
//! - `FormatTally`: Conteggio dei file per formato (WebP / JPEG / PNG)
//! - `ConversionStats`: Statistiche cumulative di optimize
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 6/10 (60%) page-3.png
//! ```

use crate::file_manager::FileManager;
use crate::profile::OutputFormat;
use indicatif::{ProgressBar, ProgressStyle};
use std::ops::AddAssign;
use std::path::Path;
use std::time::Duration;

/// Manages progress reporting for one directory
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that never draws, for library callers and tests
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish and clear the bar so summary lines stay readable
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Number of files per output format
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FormatTally {
    pub webp: usize,
    pub jpg: usize,
    pub png: usize,
}

impl FormatTally {
    pub fn record(&mut self, format: OutputFormat) {
        match format {
            OutputFormat::Webp => self.webp += 1,
            OutputFormat::Jpg => self.jpg += 1,
            OutputFormat::Png => self.png += 1,
        }
    }

    /// Count a file by its extension; unknown extensions are ignored
    pub fn record_path(&mut self, path: &Path) {
        if let Some(format) = OutputFormat::from_path(path) {
            self.record(format);
        }
    }

    pub fn total(&self) -> usize {
        self.webp + self.jpg + self.png
    }
}

impl AddAssign for FormatTally {
    fn add_assign(&mut self, other: Self) {
        self.webp += other.webp;
        self.jpg += other.jpg;
        self.png += other.png;
    }
}

/// Statistics tracker for optimize results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConversionStats {
    pub files: usize,
    pub conversions_ok: usize,
    pub conversions_failed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub formats: FormatTally,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self, format: OutputFormat, original_size: u64, new_size: u64) {
        self.conversions_ok += 1;
        self.bytes_before += original_size;
        self.bytes_after += new_size;
        self.formats.record(format);
    }

    pub fn add_failure(&mut self) {
        self.conversions_failed += 1;
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.bytes_before, self.bytes_after)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Files: {} | Outputs: {} (WebP {}, JPG {}, PNG {}) | Failed: {} | {} -> {} ({:.1}% smaller)",
            self.files,
            self.conversions_ok,
            self.formats.webp,
            self.formats.jpg,
            self.formats.png,
            self.conversions_failed,
            FileManager::format_size(self.bytes_before),
            FileManager::format_size(self.bytes_after),
            self.overall_reduction_percent()
        )
    }
}

impl AddAssign<&ConversionStats> for ConversionStats {
    fn add_assign(&mut self, other: &ConversionStats) {
        self.files += other.files;
        self.conversions_ok += other.conversions_ok;
        self.conversions_failed += other.conversions_failed;
        self.bytes_before += other.bytes_before;
        self.bytes_after += other.bytes_after;
        self.formats += other.formats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_by_extension() {
        let mut tally = FormatTally::default();
        tally.record_path(Path::new("a.webp"));
        tally.record_path(Path::new("b.JPEG"));
        tally.record_path(Path::new("c.png"));
        tally.record_path(Path::new("d.txt"));
        assert_eq!(tally, FormatTally { webp: 1, jpg: 1, png: 1 });
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut dir_a = ConversionStats::new();
        dir_a.files = 1;
        dir_a.add_success(OutputFormat::Webp, 1000, 250);
        dir_a.add_failure();

        let mut total = ConversionStats::new();
        total += &dir_a;
        total += &dir_a;

        assert_eq!(total.files, 2);
        assert_eq!(total.conversions_ok, 2);
        assert_eq!(total.conversions_failed, 2);
        assert_eq!(total.formats.webp, 2);
        assert_eq!(total.overall_reduction_percent(), 75.0);
        assert!(total.format_summary().contains("75.0% smaller"));
    }
}
