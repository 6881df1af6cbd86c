//! JSON split cache and the optional annotation fingerprint stored beside it.

use crate::annotations::ANNOTATION_FILES;
use crate::types::{CubDatasetError, DatasetResult, Partition, Record};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const SPLIT_FILE_NAME: &str = "split_li_cub.json";
const FINGERPRINT_SUFFIX: &str = "sha256";

/// `[impath, label, classname]`, with `impath` relative to the dataset dir.
type SplitEntry = (PathBuf, usize, String);

#[derive(Debug, Serialize, Deserialize)]
struct SplitFile {
    train: Vec<SplitEntry>,
    val: Vec<SplitEntry>,
    test: Vec<SplitEntry>,
}

fn io_err(path: &Path, source: std::io::Error) -> CubDatasetError {
    CubDatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn to_entries(records: &[Record], path_prefix: &Path) -> Vec<SplitEntry> {
    records
        .iter()
        .map(|r| {
            let rel = r
                .impath
                .strip_prefix(path_prefix)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| r.impath.clone());
            (rel, r.label, r.classname.clone())
        })
        .collect()
}

fn from_entries(entries: Vec<SplitEntry>, path_prefix: &Path) -> Vec<Record> {
    entries
        .into_iter()
        .map(|(rel, label, classname)| Record::new(path_prefix.join(rel), label, classname))
        .collect()
}

pub fn save_split(partition: &Partition, path: &Path, path_prefix: &Path) -> DatasetResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file = SplitFile {
        train: to_entries(&partition.train, path_prefix),
        val: to_entries(&partition.val, path_prefix),
        test: to_entries(&partition.test, path_prefix),
    };
    let data = serde_json::to_vec_pretty(&file).map_err(|e| CubDatasetError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, data).map_err(|e| io_err(path, e))
}

pub fn read_split(path: &Path, path_prefix: &Path) -> DatasetResult<Partition> {
    let raw = fs::read(path).map_err(|e| io_err(path, e))?;
    let file: SplitFile = serde_json::from_slice(&raw).map_err(|e| CubDatasetError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Partition {
        train: from_entries(file.train, path_prefix),
        val: from_entries(file.val, path_prefix),
        test: from_entries(file.test, path_prefix),
    })
}

/// Hex SHA256 over the annotation files, in `ANNOTATION_FILES` order.
pub fn annotation_fingerprint(dataset_dir: &Path) -> DatasetResult<String> {
    let mut hasher = Sha256::new();
    for name in ANNOTATION_FILES {
        let path = dataset_dir.join(name);
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        hasher.update(name.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn fingerprint_path(split_path: &Path) -> PathBuf {
    let mut name = split_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(FINGERPRINT_SUFFIX);
    split_path.with_file_name(name)
}

/// Stored fingerprint for a split cache, or `None` if it was never written.
pub fn read_fingerprint(split_path: &Path) -> DatasetResult<Option<String>> {
    let path = fingerprint_path(split_path);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(raw.trim().to_string()))
}

pub fn write_fingerprint(split_path: &Path, fingerprint: &str) -> DatasetResult<()> {
    let path = fingerprint_path(split_path);
    fs::write(&path, format!("{fingerprint}\n")).map_err(|e| io_err(&path, e))
}
