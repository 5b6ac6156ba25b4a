//! Grid compositor
//!
//! Decodes 2-6 images, places them at native resolution on a white canvas
//! using the fixed [`GridLayout`] for the count, and writes a maximum-quality
//! JPEG. Inputs are never modified.
//!
//! Cells are sized to the largest input in each dimension. Inputs are not
//! resized, so a smaller image leaves white space and a mixed-size group may
//! overlap neighbouring cells.

use crate::error::{Result, StitchError};
use crate::group::{sort_by_file_name, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use crate::layout::GridLayout;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ImageReader, Rgba, RgbaImage, RgbImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Subdirectory created next to the inputs when no output folder is set.
/// The watcher never ingests paths under a directory with this marker.
pub const OUTPUT_DIR_NAME: &str = "Processed";

/// Fallback output name when inputs share no usable prefix
pub const FALLBACK_PREFIX: &str = "stitched";

/// JPEG quality for composites
pub const JPEG_QUALITY: u8 = 100;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Result of a successful composite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchOutput {
    pub output_path: PathBuf,
    /// Inputs in placement order
    pub sources: Vec<PathBuf>,
    pub width: u32,
    pub height: u32,
}

impl StitchOutput {
    pub fn count(&self) -> usize {
        self.sources.len()
    }
}

/// Combines groups of images into grid composites
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    output_folder: Option<PathBuf>,
}

impl Compositor {
    /// Create a compositor; `None` writes into `Processed/` beside the inputs
    pub fn new(output_folder: Option<PathBuf>) -> Self {
        Self { output_folder }
    }

    pub fn output_folder(&self) -> Option<&Path> {
        self.output_folder.as_deref()
    }

    pub fn set_output_folder(&mut self, folder: Option<PathBuf>) {
        self.output_folder = folder;
    }

    /// Directory the composite for `first_input` is written to
    pub fn output_dir_for(&self, first_input: &Path) -> PathBuf {
        match &self.output_folder {
            Some(folder) => folder.clone(),
            None => first_input
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(OUTPUT_DIR_NAME),
        }
    }

    /// Stitch `paths` into one JPEG, stamped with the current time
    pub fn compose(&self, paths: &[PathBuf]) -> Result<StitchOutput> {
        self.compose_at(paths, Utc::now())
    }

    /// Stitch `paths` into one JPEG named with `timestamp`
    pub fn compose_at(&self, paths: &[PathBuf], timestamp: DateTime<Utc>) -> Result<StitchOutput> {
        let count = paths.len();
        let layout = GridLayout::for_count(count).ok_or(StitchError::InvalidGroupSize(count))?;

        let mut sources = paths.to_vec();
        sort_by_file_name(&mut sources);

        info!("Stitching {} images", count);
        debug!(
            "Image order: {}",
            sources
                .iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let images = decode_all(&sources)?;
        let canvas = render(&images, layout, &sources)?;

        let output_dir = self.output_dir_for(&sources[0]);
        fs::create_dir_all(&output_dir).map_err(|e| StitchError::io(&output_dir, e))?;

        let output_path = output_dir.join(output_file_name(&sources, timestamp));
        write_jpeg(&canvas, &output_path)?;

        info!("Stitched {} images to {}", count, output_path.display());

        Ok(StitchOutput {
            output_path,
            sources,
            width: canvas.width(),
            height: canvas.height(),
        })
    }
}

/// Decode every input, failing on the first unreadable one
pub fn decode_all(paths: &[PathBuf]) -> Result<Vec<DynamicImage>> {
    paths.iter().map(|path| decode(path)).collect()
}

fn decode(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| StitchError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| StitchError::io(path, e))?;

    let image = reader.decode().map_err(|source| StitchError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if image.width() == 0 || image.height() == 0 {
        return Err(StitchError::EmptyImage(path.to_path_buf()));
    }
    Ok(image)
}

/// Place decoded images on a white canvas according to `layout`
///
/// `sources` is only used for error reporting and must match `images`.
pub fn render(images: &[DynamicImage], layout: &GridLayout, sources: &[PathBuf]) -> Result<RgbImage> {
    if images.len() != layout.positions.len()
        || !(MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&images.len())
    {
        return Err(StitchError::InvalidGroupSize(images.len()));
    }

    let cell_width = images.iter().map(DynamicImage::width).max().unwrap_or(0);
    let cell_height = images.iter().map(DynamicImage::height).max().unwrap_or(0);
    if cell_width == 0 || cell_height == 0 {
        let path = sources.first().cloned().unwrap_or_default();
        return Err(StitchError::EmptyImage(path));
    }

    let (width, height) = layout.canvas_size(cell_width, cell_height);
    let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(StitchError::CanvasTooLarge { width, height }),
    };

    let mut canvas = RgbaImage::from_pixel(width, height, WHITE);
    for (image, (x, y)) in images.iter().zip(layout.cell_offsets(cell_width, cell_height)) {
        imageops::overlay(&mut canvas, &image.to_rgba8(), x, y);
    }

    Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

fn write_jpeg(canvas: &RgbImage, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| StitchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);

    if let Err(source) = canvas.write_with_encoder(encoder) {
        drop(writer);
        let _ = fs::remove_file(path);
        return Err(StitchError::Encode {
            path: path.to_path_buf(),
            source,
        });
    }

    writer
        .into_inner()
        .map_err(|e| StitchError::io(path, e.into_error()))?
        .sync_all()
        .map_err(|e| StitchError::io(path, e))
}

/// `{prefix}_{count}images_{YYYY-MM-DDTHH-MM-SS}.jpg`
pub fn output_file_name<P: AsRef<Path>>(paths: &[P], timestamp: DateTime<Utc>) -> String {
    format!(
        "{}_{}images_{}.jpg",
        common_prefix(paths),
        paths.len(),
        timestamp.format("%Y-%m-%dT%H-%M-%S")
    )
}

/// Longest shared leading run of the input stems, minus trailing `_`/`-`
///
/// When the stems diverge inside a `_`/`-` delimited segment, that partial
/// segment is dropped, so `vacation_01`/`vacation_02` share `vacation`.
/// Falls back to `"stitched"` when nothing usable is shared.
pub fn common_prefix<P: AsRef<Path>>(paths: &[P]) -> String {
    let stems: Vec<Vec<char>> = paths
        .iter()
        .map(|p| {
            p.as_ref()
                .file_stem()
                .map(|s| s.to_string_lossy().chars().collect())
                .unwrap_or_default()
        })
        .collect();

    let Some(first) = stems.first() else {
        return FALLBACK_PREFIX.to_string();
    };

    let shared = first
        .iter()
        .enumerate()
        .take_while(|&(i, c)| stems.iter().all(|stem| stem.get(i) == Some(c)))
        .count();

    let diverges = stems.iter().any(|stem| stem.len() > shared);
    let cut = if diverges {
        first[..shared]
            .iter()
            .rposition(|c| matches!(c, '_' | '-'))
            .unwrap_or(shared)
    } else {
        shared
    };

    let prefix: String = first[..cut].iter().collect();
    let prefix = prefix.trim_end_matches(['_', '-']);

    if prefix.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        prefix.to_string()
    }
}
