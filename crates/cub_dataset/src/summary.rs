//! Per-split record and class counts.

use crate::types::{PartitionSummary, Record, SplitSummary};
use std::collections::BTreeSet;

pub fn summarize_split(records: &[Record]) -> SplitSummary {
    let classes: BTreeSet<usize> = records.iter().map(|r| r.label).collect();
    SplitSummary {
        records: records.len(),
        classes: classes.len(),
    }
}

pub fn summarize(
    train: &[Record],
    val: &[Record],
    test: &[Record],
    num_classes: usize,
) -> PartitionSummary {
    PartitionSummary {
        train: summarize_split(train),
        val: summarize_split(val),
        test: summarize_split(test),
        num_classes,
    }
}
