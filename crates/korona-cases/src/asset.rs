//! Incidence value → picture bucket.
//!
//! The pictures come in 17 levels (0, 25, …, 400) plus an error picture.
//! The folding formula below is the one the picture set was drawn for; keep
//! it exactly as is, including the quirks around the .5 boundaries.

use std::fmt;
use std::path::{Path, PathBuf};

/// Distance between two picture levels.
pub const STEP: u16 = 25;
/// Highest picture level.
pub const MAX_LEVEL: u16 = 400;

/// One picture of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetBucket {
    /// Multiple of [`STEP`] in `0..=MAX_LEVEL`.
    Level(u16),
    /// No value known for the county.
    Unavailable,
}

impl AssetBucket {
    /// Every bucket the mapper can produce.
    pub fn all() -> impl Iterator<Item = AssetBucket> {
        (0..=MAX_LEVEL)
            .step_by(STEP as usize)
            .map(AssetBucket::Level)
            .chain(std::iter::once(AssetBucket::Unavailable))
    }

    /// File name inside the asset directory.
    pub fn file_name(&self) -> String {
        match self {
            AssetBucket::Level(level) => format!("{level}.jpg"),
            AssetBucket::Unavailable => "error.jpg".into(),
        }
    }
}

impl fmt::Display for AssetBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetBucket::Level(level) => write!(f, "{level}"),
            AssetBucket::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Map a nullable incidence value to its picture bucket. Never fails.
pub fn map_to_asset(value: Option<f64>) -> AssetBucket {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return AssetBucket::Unavailable;
    };
    let clamped = fold(v).clamp(0.0, f64::from(MAX_LEVEL));
    let steps = (clamped / f64::from(STEP)).round() as u16;
    AssetBucket::Level(steps * STEP)
}

/// `v - 12.5 + (400 - v + 12.5) mod 25`, remainder taken as non-negative.
fn fold(v: f64) -> f64 {
    let max = f64::from(MAX_LEVEL);
    let half = f64::from(STEP) / 2.0;
    v - half + (max - v + half).rem_euclid(f64::from(STEP))
}

/// Picture directory on disk.
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    dir: PathBuf,
}

impl AssetCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the picture for `bucket`.
    pub fn path_for(&self, bucket: AssetBucket) -> PathBuf {
        self.dir.join(bucket.file_name())
    }

    /// Buckets whose picture file is missing.
    pub fn missing(&self) -> Vec<AssetBucket> {
        AssetBucket::all()
            .filter(|b| !self.path_for(*b).is_file())
            .collect()
    }
}
