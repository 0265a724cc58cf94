//! Raw heightfield loading and sampling.
//!
//! A heightfield file is a flat `width * height` array of unsigned bytes,
//! row-major. A short or missing file is an error and constructs nothing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeightfieldError {
    #[error("failed to open heightfield: {0}")]
    Io(#[from] std::io::Error),
    #[error("heightfield file too short: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

/// A sampled terrain height grid.
#[derive(Debug)]
pub struct Heightfield {
    width: u32,
    height: u32,
    samples: Vec<i16>,
    /// World units per grid cell.
    horizontal_scale: f32,
    /// World units per sample unit.
    vertical_scale: f32,
}

impl Heightfield {
    /// Load `width * height` raw bytes from `path`. Byte values are centered
    /// around zero and widened to signed 16-bit samples.
    pub fn load(path: &Path, width: u32, height: u32) -> Result<Self, HeightfieldError> {
        let expected = width as usize * height as usize;
        let mut raw = Vec::with_capacity(expected);
        File::open(path)?
            .take(expected as u64)
            .read_to_end(&mut raw)?;
        if raw.len() < expected {
            return Err(HeightfieldError::ShortRead {
                expected,
                got: raw.len(),
            });
        }

        let samples = raw
            .iter()
            .map(|&b| ((b as i16) - 128) << 4)
            .collect();

        Ok(Self {
            width,
            height,
            samples,
            horizontal_scale: 1.0,
            vertical_scale: 0.004,
        })
    }

    /// Build a heightfield directly from samples; used by the flat-ground
    /// fallback and by tests.
    pub fn from_samples(
        width: u32,
        height: u32,
        samples: Vec<i16>,
        horizontal_scale: f32,
        vertical_scale: f32,
    ) -> Self {
        assert_eq!(samples.len(), width as usize * height as usize);
        Self {
            width,
            height,
            samples,
            horizontal_scale,
            vertical_scale,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn horizontal_scale(&self) -> f32 {
        self.horizontal_scale
    }

    /// World-space height of the sample at grid cell (col, row), clamped to
    /// the grid edges.
    pub fn sample(&self, col: i64, row: i64) -> f32 {
        let c = col.clamp(0, self.width as i64 - 1) as usize;
        let r = row.clamp(0, self.height as i64 - 1) as usize;
        self.samples[r * self.width as usize + c] as f32 * self.vertical_scale
    }

    /// Bilinear world-space height at (x, z). The grid is centered on the
    /// origin.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let half_w = (self.width as f32 - 1.0) * 0.5;
        let half_h = (self.height as f32 - 1.0) * 0.5;
        let gx = x / self.horizontal_scale + half_w;
        let gz = z / self.horizontal_scale + half_h;

        let c0 = gx.floor() as i64;
        let r0 = gz.floor() as i64;
        let fx = gx - gx.floor();
        let fz = gz - gz.floor();

        let h00 = self.sample(c0, r0);
        let h10 = self.sample(c0 + 1, r0);
        let h01 = self.sample(c0, r0 + 1);
        let h11 = self.sample(c0 + 1, r0 + 1);

        let top = h00 + (h10 - h00) * fx;
        let bottom = h01 + (h11 - h01) * fx;
        top + (bottom - top) * fz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_rejects_short_files() {
        let dir = std::env::temp_dir();
        let path = dir.join("embers-short-heightfield.raw");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        drop(file);

        let err = Heightfield::load(&path, 8, 8).unwrap_err();
        match err {
            HeightfieldError::ShortRead { expected, got } => {
                assert_eq!(expected, 64);
                assert_eq!(got, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_reads_exact_grid() {
        let dir = std::env::temp_dir();
        let path = dir.join("embers-heightfield.raw");
        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![128u8; 16]).unwrap();
        drop(file);

        let hf = Heightfield::load(&path, 4, 4).unwrap();
        assert_eq!(hf.width(), 4);
        // Byte 128 centers to sample 0.
        assert_eq!(hf.height_at(0.0, 0.0), 0.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Heightfield::load(Path::new("/nonexistent/terrain.raw"), 4, 4).unwrap_err();
        assert!(matches!(err, HeightfieldError::Io(_)));
    }

    #[test]
    fn bilinear_interpolates_between_samples() {
        // 2x2 grid: left column low, right column high.
        let hf = Heightfield::from_samples(2, 2, vec![0, 100, 0, 100], 1.0, 0.01);
        let mid = hf.height_at(0.0, 0.0);
        assert!((mid - 0.5).abs() < 1e-4);
        // At the left edge the low samples win.
        assert!(hf.height_at(-0.5, 0.0) < mid);
    }
}
