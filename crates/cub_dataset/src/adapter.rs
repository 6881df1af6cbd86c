//! `CubDataset`: split resolution, few-shot resolution, class subsampling.

use crate::annotations::AnnotationTables;
use crate::config::CubConfig;
use crate::fewshot::{resolve_fewshot, FewShotSampler, PerClassSampler, FEWSHOT_DIR_NAME};
use crate::split_store::{
    annotation_fingerprint, read_fingerprint, read_split, save_split, write_fingerprint,
    SPLIT_FILE_NAME,
};
use crate::splits::build_partition;
use crate::subsample::subsample_classes;
use crate::summary::summarize;
use crate::types::{CubDatasetError, DatasetResult, Partition, PartitionSummary, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DATASET_DIR_NAME: &str = "CUB_200_2011";
pub const IMAGE_DIR_NAME: &str = "images";

#[derive(Debug, Clone)]
pub struct CubDataset {
    dataset_dir: PathBuf,
    image_dir: PathBuf,
    split_path: PathBuf,
    split_fewshot_dir: PathBuf,
    train: Vec<Record>,
    val: Vec<Record>,
    test: Vec<Record>,
}

impl CubDataset {
    /// Build with a `StdRng` seeded from `cfg.seed` and the per-class sampler.
    pub fn load(cfg: &CubConfig) -> DatasetResult<Self> {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        Self::load_with(cfg, &mut rng, &PerClassSampler)
    }

    /// Build with an injected generator and few-shot sampler.
    ///
    /// The same generator drives the train/val shuffle and the few-shot draw.
    pub fn load_with<R, S>(cfg: &CubConfig, rng: &mut R, sampler: &S) -> DatasetResult<Self>
    where
        R: Rng + ?Sized,
        S: FewShotSampler,
    {
        let root = cfg.absolute_root()?;
        let dataset_dir = root.join(DATASET_DIR_NAME);
        let image_dir = dataset_dir.join(IMAGE_DIR_NAME);
        let split_path = dataset_dir.join(SPLIT_FILE_NAME);
        let split_fewshot_dir = dataset_dir.join(FEWSHOT_DIR_NAME);

        require_dir(&dataset_dir)?;
        require_dir(&image_dir)?;
        fs::create_dir_all(&split_fewshot_dir).map_err(|e| CubDatasetError::Io {
            path: split_fewshot_dir.clone(),
            source: e,
        })?;

        let mut partition = resolve_split(
            &dataset_dir,
            &image_dir,
            &split_path,
            &split_fewshot_dir,
            cfg.verify_cache,
            rng,
        )?;

        if cfg.num_shots >= 1 {
            let fewshot = resolve_fewshot(
                &split_fewshot_dir,
                cfg.num_shots,
                cfg.seed,
                &partition.train,
                &partition.val,
                sampler,
                rng,
            )?;
            partition.train = fewshot.train;
            partition.val = fewshot.val;
        }

        let Partition { train, val, test } = subsample_classes(partition, cfg.subsample);
        info!(
            train = train.len(),
            val = val.len(),
            test = test.len(),
            "cub dataset ready"
        );
        Ok(Self {
            dataset_dir,
            image_dir,
            split_path,
            split_fewshot_dir,
            train,
            val,
            test,
        })
    }

    pub fn train(&self) -> &[Record] {
        &self.train
    }

    pub fn val(&self) -> &[Record] {
        &self.val
    }

    pub fn test(&self) -> &[Record] {
        &self.test
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn split_path(&self) -> &Path {
        &self.split_path
    }

    pub fn split_fewshot_dir(&self) -> &Path {
        &self.split_fewshot_dir
    }

    /// Largest train label plus one.
    pub fn num_classes(&self) -> usize {
        self.train.iter().map(|r| r.label + 1).max().unwrap_or(0)
    }

    /// Label to class name, as seen in the train split.
    pub fn lab2cname(&self) -> BTreeMap<usize, String> {
        self.train
            .iter()
            .map(|r| (r.label, r.classname.clone()))
            .collect()
    }

    /// Class names ordered by label.
    pub fn classnames(&self) -> Vec<String> {
        self.lab2cname().into_values().collect()
    }

    pub fn summary(&self) -> PartitionSummary {
        summarize(&self.train, &self.val, &self.test, self.num_classes())
    }

    pub fn into_partition(self) -> Partition {
        Partition {
            train: self.train,
            val: self.val,
            test: self.test,
        }
    }
}

fn require_dir(path: &Path) -> DatasetResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(CubDatasetError::MissingDirectory {
            path: path.to_path_buf(),
        })
    }
}

/// Read the cached split if present (and fresh, when verifying), else build and persist it.
fn resolve_split<R: Rng + ?Sized>(
    dataset_dir: &Path,
    image_dir: &Path,
    split_path: &Path,
    split_fewshot_dir: &Path,
    verify_cache: bool,
    rng: &mut R,
) -> DatasetResult<Partition> {
    let fingerprint = if verify_cache {
        Some(annotation_fingerprint(dataset_dir)?)
    } else {
        None
    };

    if split_path.exists() {
        let fresh = match &fingerprint {
            None => true,
            Some(current) => {
                read_fingerprint(split_path)?.as_deref() == Some(current.as_str())
            }
        };
        if fresh {
            info!("reading split from {}", split_path.display());
            return read_split(split_path, dataset_dir);
        }
        warn!(
            "annotation files changed since {} was written; rebuilding split",
            split_path.display()
        );
    }
    if fingerprint.is_some() {
        clear_fewshot_cache(split_fewshot_dir)?;
    }

    let tables = AnnotationTables::load(dataset_dir, image_dir)?;
    let partition = build_partition(&tables, rng)?;
    save_split(&partition, split_path, dataset_dir)?;
    info!("saved split to {}", split_path.display());
    if let Some(fp) = fingerprint {
        write_fingerprint(split_path, &fp)?;
    }
    Ok(partition)
}

/// Few-shot sets drawn from a replaced split are removed with it.
fn clear_fewshot_cache(dir: &Path) -> DatasetResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| CubDatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| CubDatasetError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let is_cache = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("shot_") && n.ends_with(".bin"));
        if is_cache {
            fs::remove_file(&path).map_err(|e| CubDatasetError::Io {
                path: path.clone(),
                source: e,
            })?;
            info!("removed stale few-shot cache {}", path.display());
        }
    }
    Ok(())
}
