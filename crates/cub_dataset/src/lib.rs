//! CUB-200-2011 dataset loading with reproducible splits and few-shot caching.
//!
//! This crate provides utilities for:
//! - Parsing the CUB annotation files into typed lookup tables
//! - Building and caching a seeded train/val/test split
//! - Few-shot subsampling cached per (shots, seed)
//! - Base/new class subsampling

// Module declarations
pub mod adapter;
pub mod annotations;
pub mod config;
pub mod fewshot;
pub mod split_store;
pub mod splits;
pub mod subsample;
pub mod summary;
pub mod types;

// Re-export public API
pub use adapter::{CubDataset, DATASET_DIR_NAME, IMAGE_DIR_NAME};
pub use annotations::{AnnotationTables, SplitIds};
pub use config::CubConfig;
pub use fewshot::{fewshot_cache_path, resolve_fewshot, FewShotSampler, PerClassSampler};
pub use split_store::{read_split, save_split, SPLIT_FILE_NAME};
pub use splits::{build_partition, split_train_val, validation_count, VAL_FRACTION};
pub use subsample::subsample_classes;
pub use summary::{summarize, summarize_split};
pub use types::*;
