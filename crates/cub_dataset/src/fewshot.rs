//! Few-shot subsampling and its on-disk cache.

use crate::types::{CubDatasetError, DatasetResult, FewShotSet, Record};
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const FEWSHOT_DIR_NAME: &str = "split_fewshot";
/// Validation never keeps more than this many shots per class.
pub const MAX_VAL_SHOTS: usize = 4;

/// Draws a per-class subsample of records.
pub trait FewShotSampler {
    fn sample<R: Rng + ?Sized>(&self, records: &[Record], num_shots: usize, rng: &mut R)
        -> Vec<Record>;
}

/// Keeps `num_shots` records per class, drawn without replacement.
///
/// Classes are visited in first-seen order. A class with fewer than
/// `num_shots` records is kept whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerClassSampler;

impl FewShotSampler for PerClassSampler {
    fn sample<R: Rng + ?Sized>(
        &self,
        records: &[Record],
        num_shots: usize,
        rng: &mut R,
    ) -> Vec<Record> {
        if num_shots == 0 || records.is_empty() {
            return records.to_vec();
        }
        let mut order: Vec<usize> = Vec::new();
        let mut by_label: HashMap<usize, Vec<&Record>> = HashMap::new();
        for record in records {
            by_label
                .entry(record.label)
                .or_insert_with(|| {
                    order.push(record.label);
                    Vec::new()
                })
                .push(record);
        }

        let mut out = Vec::new();
        for label in order {
            let items = &by_label[&label];
            if items.len() >= num_shots {
                let picked = rand::seq::index::sample(rng, items.len(), num_shots);
                out.extend(picked.into_iter().map(|i| items[i].clone()));
            } else {
                out.extend(items.iter().map(|r| (*r).clone()));
            }
        }
        out
    }
}

pub fn fewshot_cache_path(fewshot_dir: &Path, num_shots: usize, seed: u64) -> PathBuf {
    fewshot_dir.join(format!("shot_{num_shots}-seed_{seed}.bin"))
}

impl FewShotSet {
    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| CubDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        bincode::deserialize(&raw).map_err(|e| CubDatasetError::Bincode {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let bytes = bincode::serialize(self).map_err(|e| CubDatasetError::Bincode {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, bytes).map_err(|e| CubDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Load the cached few-shot set for `(num_shots, seed)` or sample and persist one.
pub fn resolve_fewshot<S, R>(
    fewshot_dir: &Path,
    num_shots: usize,
    seed: u64,
    train: &[Record],
    val: &[Record],
    sampler: &S,
    rng: &mut R,
) -> DatasetResult<FewShotSet>
where
    S: FewShotSampler,
    R: Rng + ?Sized,
{
    let preprocessed = fewshot_cache_path(fewshot_dir, num_shots, seed);
    if preprocessed.exists() {
        info!("loading preprocessed few-shot data from {}", preprocessed.display());
        return FewShotSet::load(&preprocessed);
    }
    let set = FewShotSet {
        train: sampler.sample(train, num_shots, rng),
        val: sampler.sample(val, num_shots.min(MAX_VAL_SHOTS), rng),
    };
    info!("saving preprocessed few-shot data to {}", preprocessed.display());
    set.save(&preprocessed)?;
    Ok(set)
}
