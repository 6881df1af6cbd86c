//! Core types, error definitions, and data structures for cub_dataset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, CubDatasetError>;

#[derive(Debug, Error)]
pub enum CubDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error at {path}:{line}: {msg}")]
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    #[error("id {id} not found in {table}")]
    MissingEntry { table: &'static str, id: u32 },
    #[error("image {id} has class id {label}; class ids start at 1")]
    InvalidLabel { id: u32, label: u32 },
    #[error("directory missing: {path}")]
    MissingDirectory { path: PathBuf },
    #[error("validation split is empty for a train pool of {pool} ids")]
    EmptyValidation { pool: usize },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("bincode error at {path}: {source}")]
    Bincode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("config error: {0}")]
    Config(String),
}

/// One labeled image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub impath: PathBuf,
    /// Zero-based class index.
    pub label: usize,
    pub classname: String,
}

impl Record {
    pub fn new(impath: impl Into<PathBuf>, label: usize, classname: impl Into<String>) -> Self {
        Self {
            impath: impath.into(),
            label,
            classname: classname.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<Record>,
    pub val: Vec<Record>,
    pub test: Vec<Record>,
}

/// Payload of a few-shot cache artifact. Test records are never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotSet {
    pub train: Vec<Record>,
    pub val: Vec<Record>,
}

/// Which half of the classes survives class subsampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsampleMode {
    #[default]
    All,
    Base,
    New,
}

impl SubsampleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsampleMode::All => "all",
            SubsampleMode::Base => "base",
            SubsampleMode::New => "new",
        }
    }
}

impl fmt::Display for SubsampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubsampleMode {
    type Err = CubDatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SubsampleMode::All),
            "base" => Ok(SubsampleMode::Base),
            "new" => Ok(SubsampleMode::New),
            other => Err(CubDatasetError::Config(format!(
                "unknown subsample mode '{other}' (expected all, base or new)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub records: usize,
    pub classes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub train: SplitSummary,
    pub val: SplitSummary,
    pub test: SplitSummary,
    pub num_classes: usize,
}
