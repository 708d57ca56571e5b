//! Block-grid fingerprints for similar-picture detection.
//!
//! A picture is decoded, converted to 8-bit luminance and divided into an
//! N×N grid. Each cell of the digest is the mean luminance of the pixels
//! that fall into it. Two renditions of the same picture (rescaled,
//! re-encoded, lightly recompressed) produce grids that differ by only a
//! few levels per cell, which the matcher turns into a similarity score.
//!
//! The grid is computed by exact area averaging on integer coordinates,
//! so the result is identical on every platform and thread count.

use std::path::Path;

use image::{GrayImage, ImageError, ImageReader};

use super::fingerprint::{BlockDigest, Fingerprint};
use super::ExtractionError;

/// Default grid edge length (16×16 = 256 cells).
pub const DEFAULT_GRID_SIZE: u32 = 16;

/// Smallest accepted grid edge length.
pub const MIN_GRID_SIZE: u32 = 2;

/// Largest accepted grid edge length.
pub const MAX_GRID_SIZE: u32 = 64;

/// Computes block-grid digests for pictures.
#[derive(Debug, Clone)]
pub struct PictureExtractor {
    grid_size: u32,
}

impl PictureExtractor {
    /// Create an extractor with the given grid edge length.
    ///
    /// Values outside `2..=64` are clamped.
    #[must_use]
    pub fn new(grid_size: u32) -> Self {
        Self {
            grid_size: grid_size.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE),
        }
    }

    /// Grid edge length in cells.
    #[must_use]
    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Decode a picture file and compute its digest.
    ///
    /// # Errors
    ///
    /// - [`ExtractionError::UnsupportedFormat`] if the content is not a
    ///   recognised picture format
    /// - [`ExtractionError::Decode`] if the picture is corrupt or has no
    ///   pixels
    /// - The mapped I/O error if the file cannot be read
    pub fn digest_file(&self, path: &Path) -> Result<BlockDigest, ExtractionError> {
        let reader = ImageReader::open(path)
            .and_then(ImageReader::with_guessed_format)
            .map_err(|e| ExtractionError::from_io(path, e))?;

        if reader.format().is_none() {
            return Err(ExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: "unrecognised picture signature".to_string(),
            });
        }

        let image = reader.decode().map_err(|e| map_image_error(path, e))?;
        let luma = image.to_luma8();
        if luma.width() == 0 || luma.height() == 0 {
            return Err(ExtractionError::Decode {
                path: path.to_path_buf(),
                reason: "picture has no pixels".to_string(),
            });
        }

        Ok(self.digest_luma(&luma))
    }

    /// Compute the digest of an already decoded luminance buffer.
    ///
    /// The buffer must be at least 1×1.
    #[must_use]
    pub fn digest_luma(&self, luma: &GrayImage) -> BlockDigest {
        let n = u64::from(self.grid_size);
        let width = u64::from(luma.width());
        let height = u64::from(luma.height());
        let mut cells = Vec::with_capacity((n * n) as usize);

        for cy in 0..n {
            let y0 = cy * height / n;
            let y1 = ((cy + 1) * height / n).max(y0 + 1);
            for cx in 0..n {
                let x0 = cx * width / n;
                let x1 = ((cx + 1) * width / n).max(x0 + 1);

                let mut sum = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += u64::from(luma.get_pixel(x as u32, y as u32).0[0]);
                    }
                }
                let count = (y1 - y0) * (x1 - x0);
                // Round half up.
                cells.push(((sum + count / 2) / count) as u8);
            }
        }

        BlockDigest::new(cells)
    }
}

impl Default for PictureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_SIZE)
    }
}

impl super::Extract for PictureExtractor {
    fn namespace(&self) -> String {
        format!("picture/{}", self.grid_size)
    }

    fn extract_path(&self, path: &Path) -> Result<Fingerprint, ExtractionError> {
        self.digest_file(path).map(Fingerprint::Picture)
    }
}

fn map_image_error(path: &Path, error: ImageError) -> ExtractionError {
    match error {
        ImageError::IoError(io) => ExtractionError::from_io(path, io),
        ImageError::Unsupported(e) => ExtractionError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: e.to_string(),
        },
        other => ExtractionError::Decode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}
