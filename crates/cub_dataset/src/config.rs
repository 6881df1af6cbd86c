//! Dataset configuration, loaded from TOML with defaults for missing keys.
//!
//! ```toml
//! seed = 1
//! verify_cache = false
//!
//! [dataset]
//! root = "~/data"
//! num_shots = 16
//! subsample_classes = "base"
//! ```

use crate::types::{CubDatasetError, DatasetResult, SubsampleMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CONFIG_NAME: &str = "cub-dataset.toml";
pub const CONFIG_ENV: &str = "CUB_DATASET_CONFIG";
pub const DEFAULT_SEED: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubConfig {
    /// Directory containing `CUB_200_2011/`.
    pub root: PathBuf,
    /// Shots per class; 0 keeps the full splits.
    pub num_shots: usize,
    pub seed: u64,
    pub subsample: SubsampleMode,
    /// Regenerate the split cache when the annotation files change.
    pub verify_cache: bool,
}

impl Default for CubConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            num_shots: 0,
            seed: DEFAULT_SEED,
            subsample: SubsampleMode::All,
            verify_cache: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CubConfigFile {
    seed: Option<u64>,
    verify_cache: Option<bool>,
    dataset: Option<DatasetSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DatasetSection {
    root: Option<String>,
    num_shots: Option<usize>,
    subsample_classes: Option<String>,
}

impl CubConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_num_shots(mut self, num_shots: usize) -> Self {
        self.num_shots = num_shots;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_subsample(mut self, subsample: SubsampleMode) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn with_verify_cache(mut self, verify_cache: bool) -> Self {
        self.verify_cache = verify_cache;
        self
    }

    /// Resolve from `$CUB_DATASET_CONFIG`, then `./cub-dataset.toml`, else defaults.
    pub fn load() -> DatasetResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> DatasetResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CubDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            CubDatasetError::Config(msg) => {
                CubDatasetError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> DatasetResult<Self> {
        let file: CubConfigFile =
            toml::from_str(raw).map_err(|e| CubDatasetError::Config(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: CubConfigFile) -> DatasetResult<Self> {
        let defaults = Self::default();
        let dataset = file.dataset.unwrap_or_default();
        let subsample = match dataset.subsample_classes {
            Some(raw) => raw.parse()?,
            None => defaults.subsample,
        };
        let cfg = CubConfig {
            root: dataset
                .root
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.root),
            num_shots: dataset.num_shots.unwrap_or(defaults.num_shots),
            seed: file.seed.unwrap_or(defaults.seed),
            subsample,
            verify_cache: file.verify_cache.unwrap_or(defaults.verify_cache),
        };
        cfg.warn_if_suspicious();
        Ok(cfg)
    }

    fn warn_if_suspicious(&self) {
        if self.root.as_os_str().is_empty() {
            warn!("cub config: dataset.root is empty; the working directory will be used");
        }
    }

    /// `root` with `~` expanded and made absolute against the working directory.
    pub fn absolute_root(&self) -> DatasetResult<PathBuf> {
        let expanded = expand_path(&self.root.to_string_lossy());
        if expanded.is_absolute() {
            return Ok(expanded);
        }
        let cwd = std::env::current_dir().map_err(|e| CubDatasetError::Io {
            path: PathBuf::from("."),
            source: e,
        })?;
        Ok(cwd.join(expanded))
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Substitute `${VAR}`; unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
