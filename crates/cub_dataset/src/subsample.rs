//! Base/new class subsampling.

use crate::types::{Partition, Record, SubsampleMode};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Restrict every split to the base or new half of the train label set.
///
/// Labels are sorted; base keeps the first `ceil(n / 2)`, new keeps the rest.
/// Surviving labels are renumbered from zero in sorted order.
pub fn subsample_classes(partition: Partition, mode: SubsampleMode) -> Partition {
    if mode == SubsampleMode::All {
        return partition;
    }
    let labels: Vec<usize> = partition
        .train
        .iter()
        .map(|r| r.label)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let m = labels.len().div_ceil(2);
    let selected = match mode {
        SubsampleMode::Base => &labels[..m],
        _ => &labels[m..],
    };
    info!("subsampling {} classes ({} of {})", mode, selected.len(), labels.len());

    let relabeler: HashMap<usize, usize> = selected
        .iter()
        .enumerate()
        .map(|(new, &old)| (old, new))
        .collect();
    let relabel = |records: Vec<Record>| -> Vec<Record> {
        records
            .into_iter()
            .filter_map(|r| {
                relabeler.get(&r.label).map(|&label| Record { label, ..r })
            })
            .collect()
    };

    Partition {
        train: relabel(partition.train),
        val: relabel(partition.val),
        test: relabel(partition.test),
    }
}
