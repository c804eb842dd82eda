//! On-disk artifacts of one cache root.
//!
//! Layout:
//!
//! ```text
//! {root}/level_{id}_render_data.bin
//! {root}/level_{id}_history_base.bin
//! {root}/level_{id}_history_composite.bin
//! {root}/cache_package.bin
//! {root}/generation
//! ```
//!
//! Every write goes to a sibling temp file first and is renamed into place,
//! so readers only ever see complete artifacts.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_core::{GenerationKey, LevelId, RenderData, StorageError, TesseraResult, Update};

use crate::history::RasterHistoryGrid;

const RENDER_DATA_MAGIC: &[u8; 4] = b"TSRD";
const RENDER_DATA_VERSION: u16 = 1;

/// Which of a level's two histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryVariant {
    /// Changes to the level's own geometry.
    Base,
    /// Base history folded with everything visible through the level.
    Composite,
}

impl fmt::Display for HistoryVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryVariant::Base => write!(f, "base"),
            HistoryVariant::Composite => write!(f, "composite"),
        }
    }
}

/// Replace `path` with `bytes` via temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let artifact = path.display().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::from_io(&artifact, &e))?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(format!(".tmp{}", std::process::id()));
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes).map_err(|e| StorageError::from_io(&artifact, &e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StorageError::from_io(&artifact, &e)
    })
}

/// `magic | version u16 | lz4(bincode(value))`
pub(crate) fn seal<T: Serialize>(
    magic: &[u8; 4],
    version: u16,
    value: &T,
    artifact: &str,
) -> Result<Vec<u8>, StorageError> {
    let body = bincode::serialize(value).map_err(|e| StorageError::Serialization {
        artifact: artifact.to_string(),
        reason: e.to_string(),
    })?;
    let compressed = lz4_flex::compress_prepend_size(&body);
    let mut out = Vec::with_capacity(6 + compressed.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub(crate) fn unseal<T: DeserializeOwned>(
    magic: &[u8; 4],
    version: u16,
    bytes: &[u8],
    artifact: &str,
) -> Result<T, StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt {
        artifact: artifact.to_string(),
        reason,
    };
    if bytes.len() < 6 || &bytes[..4] != magic {
        return Err(corrupt("unknown magic".to_string()));
    }
    let found = u16::from_le_bytes([bytes[4], bytes[5]]);
    if found != version {
        return Err(corrupt(format!("unsupported format version {}", found)));
    }
    let body = lz4_flex::decompress_size_prepended(&bytes[6..]).map_err(|e| corrupt(e.to_string()))?;
    bincode::deserialize(&body).map_err(|e| corrupt(e.to_string()))
}

/// Paths and typed access to every artifact under one root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn render_data_path(&self, level: LevelId) -> PathBuf {
        self.root.join(format!("level_{}_render_data.bin", level))
    }

    pub fn history_path(&self, level: LevelId, variant: HistoryVariant) -> PathBuf {
        self.root.join(format!("level_{}_history_{}.bin", level, variant))
    }

    pub fn package_path(&self) -> PathBuf {
        self.root.join("cache_package.bin")
    }

    pub fn generation_path(&self) -> PathBuf {
        self.root.join("generation")
    }

    pub fn save_render_data(&self, data: &RenderData) -> Result<(), StorageError> {
        let path = self.render_data_path(data.level_id);
        let bytes = seal(
            RENDER_DATA_MAGIC,
            RENDER_DATA_VERSION,
            data,
            &path.display().to_string(),
        )?;
        write_atomic(&path, &bytes)
    }

    pub fn load_render_data(&self, level: LevelId) -> Result<RenderData, StorageError> {
        let path = self.render_data_path(level);
        let artifact = path.display().to_string();
        let bytes = fs::read(&path).map_err(|e| StorageError::from_io(&artifact, &e))?;
        unseal(RENDER_DATA_MAGIC, RENDER_DATA_VERSION, &bytes, &artifact)
    }

    /// Open a level history, seeding it with `default_update` if missing.
    pub fn open_history(
        &self,
        level: LevelId,
        variant: HistoryVariant,
        resolution: u16,
        default_update: Update,
    ) -> TesseraResult<RasterHistoryGrid> {
        RasterHistoryGrid::open(&self.history_path(level, variant), resolution, default_update)
    }

    pub fn save_history(
        &self,
        level: LevelId,
        variant: HistoryVariant,
        grid: &mut RasterHistoryGrid,
    ) -> Result<(), StorageError> {
        grid.save(&self.history_path(level, variant))
    }

    /// Generation marker, `None` before the first rebuild.
    pub fn read_generation(&self) -> Result<Option<GenerationKey>, StorageError> {
        let path = self.generation_path();
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(GenerationKey::from_raw(raw.trim()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::from_io(path.display().to_string(), &err)),
        }
    }

    pub fn write_generation(&self, generation: &GenerationKey) -> Result<(), StorageError> {
        write_atomic(&self.generation_path(), generation.as_str().as_bytes())
    }
}
