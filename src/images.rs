use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Look applied to every slide at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ImageFilter {
    Grayscale,
    Sepia,
    /// Every channel scaled by 1.5.
    Brightness,
    /// Contrast raised by 1.5.
    Contrast,
}

impl ImageFilter {
    /// The ffmpeg filter chain for this look.
    pub fn ffmpeg_filter(self) -> &'static str {
        match self {
            ImageFilter::Grayscale => "hue=s=0",
            ImageFilter::Sepia => {
                "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131"
            }
            ImageFilter::Brightness => "colorchannelmixer=rr=1.5:gg=1.5:bb=1.5",
            ImageFilter::Contrast => "eq=contrast=1.5",
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Image files directly inside `dir`, ordered by file name. Slides are shown
/// in this order. `max_images` keeps only the first that many.
pub fn load_image_pool(dir: &Path, max_images: Option<usize>) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read image directory {}", dir.display()))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        } else {
            debug!("Ignoring non-image {}", path.display());
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    if let Some(max) = max_images {
        if images.len() > max {
            debug!("Keeping {} of {} images", max, images.len());
            images.truncate(max);
        }
    }
    info!("Loaded {} images from {}", images.len(), dir.display());
    Ok(images)
}
