//! # Image Profiles
//!
//! Quality/size presets and the filename heuristic that picks one.
//!
//! | Profile   | Max width | Quality | Outputs     | Selected when filename contains |
//! |-----------|-----------|---------|-------------|---------------------------------|
//! | video     | 600       | 80      | webp, jpg   | `video`                         |
//! | portfolio | 1200      | 85      | webp, jpg   | `page-` or `portfolio`          |
//! | small     | 300       | 90      | webp, png   | anything else                   |
//!
//! Matching is case-insensitive and only looks at the file name, never at the
//! directories above it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Output encodings the converter knows how to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpg,
    Png,
}

impl OutputFormat {
    /// File extension used for staged files of this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }

    /// Map a destination path to a format by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "webp" => Some(Self::Webp),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

/// Resize and encoding preset for one class of images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProfile {
    /// Target width in pixels (aspect ratio is always kept)
    pub max_width: u32,
    /// Encoder quality (1-100)
    pub quality: u8,
    /// Formats generated for each source file, in order
    pub formats: Vec<OutputFormat>,
}

impl ImageProfile {
    pub fn portfolio() -> Self {
        Self {
            max_width: 1200,
            quality: 85,
            formats: vec![OutputFormat::Webp, OutputFormat::Jpg],
        }
    }

    pub fn video() -> Self {
        Self {
            max_width: 600,
            quality: 80,
            formats: vec![OutputFormat::Webp, OutputFormat::Jpg],
        }
    }

    pub fn small() -> Self {
        Self {
            max_width: 300,
            quality: 90,
            formats: vec![OutputFormat::Webp, OutputFormat::Png],
        }
    }
}

/// Which preset a file was classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Video,
    Portfolio,
    Small,
}

impl ProfileKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Portfolio => "portfolio",
            Self::Small => "small",
        }
    }
}

/// The three presets, overridable through the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet {
    pub portfolio: ImageProfile,
    pub video: ImageProfile,
    pub small: ImageProfile,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            portfolio: ImageProfile::portfolio(),
            video: ImageProfile::video(),
            small: ImageProfile::small(),
        }
    }
}

impl ProfileSet {
    /// Classify a file by its name. First match wins: video, then
    /// portfolio (`page-` / `portfolio`), then the small fallback.
    pub fn classify_kind(path: &Path) -> ProfileKind {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if filename.contains("video") {
            ProfileKind::Video
        } else if filename.contains("page-") || filename.contains("portfolio") {
            ProfileKind::Portfolio
        } else {
            ProfileKind::Small
        }
    }

    /// Profile for a file
    pub fn classify(&self, path: &Path) -> &ImageProfile {
        self.get(Self::classify_kind(path))
    }

    pub fn get(&self, kind: ProfileKind) -> &ImageProfile {
        match kind {
            ProfileKind::Video => &self.video,
            ProfileKind::Portfolio => &self.portfolio,
            ProfileKind::Small => &self.small,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProfileKind, &ImageProfile)> {
        [
            (ProfileKind::Portfolio, &self.portfolio),
            (ProfileKind::Video, &self.video),
            (ProfileKind::Small, &self.small),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_wins_over_portfolio() {
        let profiles = ProfileSet::default();
        for name in [
            "video-cover.png",
            "Portfolio-VIDEO.jpg",
            "page-1-video.jpeg",
            "myVideoThumb.PNG",
        ] {
            assert_eq!(ProfileSet::classify_kind(Path::new(name)), ProfileKind::Video, "{name}");
            assert_eq!(profiles.classify(Path::new(name)), &ImageProfile::video());
        }
    }

    #[test]
    fn test_portfolio_markers() {
        assert_eq!(ProfileSet::classify_kind(Path::new("page-03.png")), ProfileKind::Portfolio);
        assert_eq!(ProfileSet::classify_kind(Path::new("AI-Portfolio-hero.jpg")), ProfileKind::Portfolio);
        // "page" without the dash is not a marker
        assert_eq!(ProfileSet::classify_kind(Path::new("homepage.png")), ProfileKind::Small);
    }

    #[test]
    fn test_only_filename_is_inspected() {
        let path = Path::new("/site/video-planning/portfolio/logo.png");
        assert_eq!(ProfileSet::classify_kind(path), ProfileKind::Small);
    }

    #[test]
    fn test_custom_profiles_are_used() {
        let mut profiles = ProfileSet::default();
        profiles.small.max_width = 64;
        assert_eq!(profiles.classify(Path::new("icon.png")).max_width, 64);
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("a.WEBP")), Some(OutputFormat::Webp));
        assert_eq!(OutputFormat::from_path(Path::new("a.jpeg")), Some(OutputFormat::Jpg));
        assert_eq!(OutputFormat::from_path(Path::new("a.png")), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_path(Path::new("a.gif")), None);
        assert_eq!(OutputFormat::Jpg.to_string(), "JPG");
    }
}
