use std::path::Path;

use crate::edit::apply::InputType;

/// Broad class of a media file, deciding which pipeline handles it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Animated GIF.
    Gif,
    /// Video with an optional audio track.
    Video,
    /// Silent looping video standing in for a GIF.
    Gifv,
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "webm", "mkv", "avi", "flv", "wmv", "mpg", "mpeg", "ts", "3gp", "ogv",
];

impl MediaKind {
    /// Classify by file extension, case-insensitively. Unknown extensions count as images.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "gif" => Self::Gif,
            "gifv" => Self::Gifv,
            e if VIDEO_EXTENSIONS.contains(&e) => Self::Video,
            _ => Self::Image,
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Image)
    }

    /// How the edit pipeline treats this kind. Animations of either flavour are looped like
    /// images; only real video plays once.
    pub fn edit_input(self) -> InputType {
        match self {
            Self::Image | Self::Gif | Self::Gifv => InputType::Image,
            Self::Video => InputType::Video,
        }
    }

    /// Container produced when this kind is composited or uncaptioned.
    pub fn output_format(self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Gif | Self::Gifv => "gif",
            Self::Video => "mp4",
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/kind.rs"]
mod tests;
