//! Train/val/test partitioning of the annotation tables.

use crate::annotations::AnnotationTables;
use crate::types::{CubDatasetError, DatasetResult, Partition, Record};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

/// Fraction of the train-flagged pool held out for validation.
pub const VAL_FRACTION: f64 = 0.2;

pub fn validation_count(pool: usize) -> usize {
    (pool as f64 * VAL_FRACTION).round() as usize
}

/// Shuffle the train-flagged pool and cut it into `(train, val)` ids.
///
/// The first `round(0.2 * pool)` shuffled ids become validation.
pub fn split_train_val<R: Rng + ?Sized>(
    pool: &[u32],
    rng: &mut R,
) -> DatasetResult<(Vec<u32>, Vec<u32>)> {
    let n_val = validation_count(pool.len());
    if n_val == 0 {
        return Err(CubDatasetError::EmptyValidation { pool: pool.len() });
    }
    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);
    let train = shuffled.split_off(n_val);
    Ok((train, shuffled))
}

/// Build one record per id; labels are converted from 1-based to 0-based.
pub fn make_records(ids: &[u32], tables: &AnnotationTables) -> DatasetResult<Vec<Record>> {
    ids.iter()
        .map(|&id| {
            let impath = tables
                .image_paths
                .get(&id)
                .ok_or(CubDatasetError::MissingEntry {
                    table: "images.txt",
                    id,
                })?;
            let label = *tables
                .image_labels
                .get(&id)
                .ok_or(CubDatasetError::MissingEntry {
                    table: "image_class_labels.txt",
                    id,
                })?;
            let classname = tables
                .class_names
                .get(&label)
                .ok_or(CubDatasetError::MissingEntry {
                    table: "classes.txt",
                    id: label,
                })?;
            let zero_based = label
                .checked_sub(1)
                .ok_or(CubDatasetError::InvalidLabel { id, label })?;
            Ok(Record::new(impath.clone(), zero_based as usize, classname.clone()))
        })
        .collect()
}

pub fn build_partition<R: Rng + ?Sized>(
    tables: &AnnotationTables,
    rng: &mut R,
) -> DatasetResult<Partition> {
    info!(
        "splitting trainval into {:.0}% train and {:.0}% val",
        (1.0 - VAL_FRACTION) * 100.0,
        VAL_FRACTION * 100.0
    );
    let (train_ids, val_ids) = split_train_val(&tables.split_ids.train, rng)?;
    Ok(Partition {
        train: make_records(&train_ids, tables)?,
        val: make_records(&val_ids, tables)?,
        test: make_records(&tables.split_ids.test, tables)?,
    })
}
