//! End-to-end tests for `CubDataset` against a synthetic CUB_200_2011 tree.
//!
//! 1. Fresh split → split cache → cached reload
//! 2. Few-shot sampling → few-shot cache
//! 3. Class subsampling and failure modes

use cub_dataset::{
    fewshot_cache_path, CubConfig, CubDataset, CubDatasetError, FewShotSampler, PerClassSampler,
    Record, SubsampleMode, DATASET_DIR_NAME, SPLIT_FILE_NAME,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Synthetic layout: `classes * per_class` images, ids 1-based and grouped by class.
/// Every third image of a class is flagged test.
struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    classes: u32,
    per_class: u32,
}

impl Fixture {
    fn new(classes: u32, per_class: u32) -> anyhow::Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();
        let fixture = Self {
            _tmp: tmp,
            root,
            classes,
            per_class,
        };
        fixture.write_annotations()?;
        Ok(fixture)
    }

    fn dataset_dir(&self) -> PathBuf {
        self.root.join(DATASET_DIR_NAME)
    }

    fn image_dir(&self) -> PathBuf {
        self.dataset_dir().join("images")
    }

    fn class_of(&self, id: u32) -> u32 {
        (id - 1) / self.per_class + 1
    }

    fn is_train(&self, id: u32) -> bool {
        (id - 1) % self.per_class % 3 != 2
    }

    fn rel_path(&self, id: u32) -> String {
        let class = self.class_of(id);
        format!("{class:03}.Bird_{class}/Bird_{class}_{id:04}.jpg")
    }

    fn ids(&self) -> impl Iterator<Item = u32> {
        1..=self.classes * self.per_class
    }

    fn write_annotations(&self) -> anyhow::Result<()> {
        let dir = self.dataset_dir();
        fs::create_dir_all(self.image_dir())?;
        let mut split = String::new();
        let mut images = String::new();
        let mut labels = String::new();
        for id in self.ids() {
            split.push_str(&format!("{id} {}\n", u8::from(self.is_train(id))));
            images.push_str(&format!("{id} {}\n", self.rel_path(id)));
            labels.push_str(&format!("{id} {}\n", self.class_of(id)));
        }
        let classes: String = (1..=self.classes)
            .map(|c| format!("{c} {c:03}.Bird_{c}\n"))
            .collect();
        fs::write(dir.join("train_test_split.txt"), split)?;
        fs::write(dir.join("images.txt"), images)?;
        fs::write(dir.join("classes.txt"), classes)?;
        fs::write(dir.join("image_class_labels.txt"), labels)?;
        Ok(())
    }

    fn path_set(&self, train: bool) -> HashSet<PathBuf> {
        self.ids()
            .filter(|&id| self.is_train(id) == train)
            .map(|id| self.image_dir().join(self.rel_path(id)))
            .collect()
    }

    fn config(&self) -> CubConfig {
        CubConfig::new(&self.root)
    }
}

fn paths(records: &[Record]) -> HashSet<PathBuf> {
    records.iter().map(|r| r.impath.clone()).collect()
}

fn label_from_path(path: &Path) -> usize {
    let dir = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
    dir[..3].parse::<usize>().unwrap() - 1
}

struct CountingSampler {
    calls: Cell<usize>,
}

impl FewShotSampler for CountingSampler {
    fn sample<R: Rng + ?Sized>(
        &self,
        records: &[Record],
        num_shots: usize,
        rng: &mut R,
    ) -> Vec<Record> {
        self.calls.set(self.calls.get() + 1);
        PerClassSampler.sample(records, num_shots, rng)
    }
}

#[test]
fn fresh_split_partitions_train_flagged_pool() -> anyhow::Result<()> {
    let fx = Fixture::new(5, 12)?;
    let ds = CubDataset::load(&fx.config())?;

    let train = paths(ds.train());
    let val = paths(ds.val());
    assert!(train.is_disjoint(&val));
    let union: HashSet<_> = train.union(&val).cloned().collect();
    assert_eq!(union, fx.path_set(true));
    assert_eq!(paths(ds.test()), fx.path_set(false));

    // 5 classes * 8 train-flagged images = 40 → round(8.0) = 8 val.
    assert_eq!(ds.val().len(), 8);
    assert_eq!(ds.train().len(), 32);
    assert_eq!(ds.test().len(), 20);

    for r in ds.train().iter().chain(ds.val()).chain(ds.test()) {
        assert_eq!(r.label, label_from_path(&r.impath));
        assert_eq!(r.classname, format!("{:03}.Bird_{}", r.label + 1, r.label + 1));
    }

    assert!(ds.split_path().exists());
    assert!(ds.split_fewshot_dir().is_dir());
    assert_eq!(ds.num_classes(), 5);
    assert_eq!(ds.classnames()[0], "001.Bird_1");
    Ok(())
}

#[test]
fn test_split_keeps_file_order() -> anyhow::Result<()> {
    let fx = Fixture::new(3, 6)?;
    let ds = CubDataset::load(&fx.config())?;
    let expected: Vec<PathBuf> = fx
        .ids()
        .filter(|&id| !fx.is_train(id))
        .map(|id| fx.image_dir().join(fx.rel_path(id)))
        .collect();
    let actual: Vec<PathBuf> = ds.test().iter().map(|r| r.impath.clone()).collect();
    assert_eq!(actual, expected);
    Ok(())
}

#[test]
fn cached_split_is_reused_verbatim() -> anyhow::Result<()> {
    let fx = Fixture::new(4, 9)?;
    let first = CubDataset::load(&fx.config())?.into_partition();

    // A different seed would shuffle differently; the cache wins.
    let second = CubDataset::load(&fx.config().with_seed(77))?.into_partition();
    assert_eq!(first, second);

    // The cache is trusted even once the annotations are gone.
    fs::remove_file(fx.dataset_dir().join("images.txt"))?;
    let third = CubDataset::load(&fx.config())?.into_partition();
    assert_eq!(first, third);
    Ok(())
}

#[test]
fn same_seed_reproduces_split_without_cache() -> anyhow::Result<()> {
    let a = Fixture::new(4, 9)?;
    let b = Fixture::new(4, 9)?;
    let names = |records: &[Record]| -> Vec<PathBuf> {
        records
            .iter()
            .map(|r| PathBuf::from(r.impath.file_name().unwrap()))
            .collect()
    };
    let da = CubDataset::load(&a.config().with_seed(5))?;
    let db = CubDataset::load(&b.config().with_seed(5))?;
    assert_eq!(names(da.train()), names(db.train()));
    assert_eq!(names(da.val()), names(db.val()));
    Ok(())
}

#[test]
fn verify_cache_rebuilds_after_annotation_change() -> anyhow::Result<()> {
    let fx = Fixture::new(4, 9)?;
    let cfg = fx.config().with_verify_cache(true).with_num_shots(1);
    let first = CubDataset::load(&cfg)?;
    let fewshot = fewshot_cache_path(first.split_fewshot_dir(), 1, cfg.seed);
    assert!(fewshot.exists());
    assert!(fx
        .dataset_dir()
        .join(format!("{SPLIT_FILE_NAME}.sha256"))
        .exists());

    // Relabel one class name; the stored split still carries the old one.
    let classes = fx.dataset_dir().join("classes.txt");
    let renamed = fs::read_to_string(&classes)?.replace("001.Bird_1", "001.Renamed");
    fs::write(&classes, renamed)?;

    let trusting = CubDataset::load(&fx.config())?;
    assert!(trusting.test().iter().all(|r| r.classname != "001.Renamed"));

    let rebuilt = CubDataset::load(&fx.config().with_verify_cache(true))?;
    assert!(rebuilt.test().iter().any(|r| r.classname == "001.Renamed"));
    assert!(!fewshot.exists(), "few-shot sets from the old split are dropped");
    Ok(())
}

#[test]
fn verify_cache_rebuilds_split_without_fingerprint() -> anyhow::Result<()> {
    let fx = Fixture::new(4, 9)?;
    let sidecar = fx.dataset_dir().join(format!("{SPLIT_FILE_NAME}.sha256"));
    CubDataset::load(&fx.config())?;
    assert!(fx.dataset_dir().join(SPLIT_FILE_NAME).exists());
    assert!(!sidecar.exists());

    let classes = fx.dataset_dir().join("classes.txt");
    let renamed = fs::read_to_string(&classes)?.replace("001.Bird_1", "001.Renamed");
    fs::write(&classes, renamed)?;

    let rebuilt = CubDataset::load(&fx.config().with_verify_cache(true))?;
    assert!(rebuilt.test().iter().any(|r| r.classname == "001.Renamed"));
    assert!(sidecar.exists());

    let reread = CubDataset::load(&fx.config().with_verify_cache(true))?;
    assert_eq!(rebuilt.train(), reread.train());
    assert_eq!(rebuilt.test(), reread.test());
    Ok(())
}

#[test]
fn verify_cache_drops_fewshot_when_split_file_is_deleted() -> anyhow::Result<()> {
    let fx = Fixture::new(4, 9)?;
    let cfg = fx.config().with_verify_cache(true).with_num_shots(1);
    let sampler = CountingSampler {
        calls: Cell::new(0),
    };
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let first = CubDataset::load_with(&cfg, &mut rng, &sampler)?;
    assert_eq!(sampler.calls.get(), 2);
    assert!(fewshot_cache_path(first.split_fewshot_dir(), 1, cfg.seed).exists());

    // Swap the train/test flags of class 1, then drop the split by hand.
    let split: String = fx
        .ids()
        .map(|id| {
            let train = fx.is_train(id) != (fx.class_of(id) == 1);
            format!("{id} {}\n", u8::from(train))
        })
        .collect();
    fs::write(fx.dataset_dir().join("train_test_split.txt"), split)?;
    fs::remove_file(fx.dataset_dir().join(SPLIT_FILE_NAME))?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let second = CubDataset::load_with(&cfg, &mut rng, &sampler)?;
    assert_eq!(sampler.calls.get(), 4, "few-shot sets must be redrawn");
    let test = paths(second.test());
    let moved: Vec<_> = first
        .train()
        .iter()
        .chain(first.val())
        .filter(|r| r.label == 0)
        .collect();
    assert!(!moved.is_empty());
    assert!(moved.iter().all(|r| test.contains(&r.impath)));
    assert!(paths(second.train()).is_disjoint(&test));
    assert!(paths(second.val()).is_disjoint(&test));
    Ok(())
}

#[test]
fn fewshot_cache_is_written_then_reused() -> anyhow::Result<()> {
    let fx = Fixture::new(5, 12)?;
    let cfg = fx.config().with_num_shots(3).with_seed(2);
    let sampler = CountingSampler {
        calls: Cell::new(0),
    };

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let first = CubDataset::load_with(&cfg, &mut rng, &sampler)?;
    assert_eq!(sampler.calls.get(), 2);
    let cache = fx.dataset_dir().join("split_fewshot/shot_3-seed_2.bin");
    assert!(cache.exists());

    for label in 0..5 {
        let train = first.train().iter().filter(|r| r.label == label).count();
        let val = first.val().iter().filter(|r| r.label == label).count();
        assert!(train <= 3, "class {label} has {train} train shots");
        assert!(val <= 3, "class {label} has {val} val shots");
    }
    assert_eq!(paths(first.test()), fx.path_set(false));

    let mut rng = StdRng::seed_from_u64(1234);
    let second = CubDataset::load_with(&cfg, &mut rng, &sampler)?;
    assert_eq!(sampler.calls.get(), 2, "cache hit must not sample");
    assert_eq!(first.train(), second.train());
    assert_eq!(first.val(), second.val());
    assert_eq!(first.test(), second.test());
    Ok(())
}

#[test]
fn fewshot_val_is_capped_at_four_shots() -> anyhow::Result<()> {
    // 40 train-flagged images per class; at most 16 of the 80 go to val,
    // so every class keeps at least 24 train records to draw 16 from.
    let fx = Fixture::new(2, 60)?;
    let ds = CubDataset::load(&fx.config().with_num_shots(16))?;
    for label in 0..2 {
        assert_eq!(ds.train().iter().filter(|r| r.label == label).count(), 16);
        assert!(ds.val().iter().filter(|r| r.label == label).count() <= 4);
    }
    assert!(ds.val().len() <= 8);
    Ok(())
}

#[test]
fn zero_shots_keeps_full_splits_and_writes_no_fewshot_cache() -> anyhow::Result<()> {
    let fx = Fixture::new(3, 10)?;
    let ds = CubDataset::load(&fx.config())?;
    assert_eq!(ds.train().len() + ds.val().len(), fx.path_set(true).len());
    assert_eq!(fs::read_dir(ds.split_fewshot_dir())?.count(), 0);
    Ok(())
}

#[test]
fn base_and_new_subsampling_split_the_classes() -> anyhow::Result<()> {
    let fx = Fixture::new(5, 12)?;
    let base = CubDataset::load(&fx.config().with_subsample(SubsampleMode::Base))?;
    assert_eq!(base.num_classes(), 3);
    assert_eq!(base.classnames(), vec!["001.Bird_1", "002.Bird_2", "003.Bird_3"]);
    assert!(base.test().iter().all(|r| r.label < 3));

    let new = CubDataset::load(&fx.config().with_subsample(SubsampleMode::New))?;
    assert_eq!(new.num_classes(), 2);
    assert_eq!(new.classnames(), vec!["004.Bird_4", "005.Bird_5"]);
    assert_eq!(new.summary().test.classes, 2);
    Ok(())
}

#[test]
fn missing_directories_are_reported() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    match CubDataset::load(&CubConfig::new(tmp.path())) {
        Err(CubDatasetError::MissingDirectory { path }) => {
            assert!(path.ends_with(DATASET_DIR_NAME))
        }
        other => panic!("expected missing directory, got {other:?}"),
    }

    fs::create_dir_all(tmp.path().join(DATASET_DIR_NAME))?;
    match CubDataset::load(&CubConfig::new(tmp.path())) {
        Err(CubDatasetError::MissingDirectory { path }) => assert!(path.ends_with("images")),
        other => panic!("expected missing image directory, got {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_annotation_file_is_an_io_error() -> anyhow::Result<()> {
    let fx = Fixture::new(2, 6)?;
    fs::remove_file(fx.dataset_dir().join("image_class_labels.txt"))?;
    let err = CubDataset::load(&fx.config()).unwrap_err();
    assert!(matches!(err, CubDatasetError::Io { .. }), "{err}");
    assert!(!fx.dataset_dir().join(SPLIT_FILE_NAME).exists());
    Ok(())
}

#[test]
fn tiny_train_pool_fails_validation_split() -> anyhow::Result<()> {
    // One class, three images: ids 1 and 2 train-flagged → round(0.4) = 0.
    let fx = Fixture::new(1, 3)?;
    let err = CubDataset::load(&fx.config()).unwrap_err();
    assert!(matches!(err, CubDatasetError::EmptyValidation { pool: 2 }), "{err}");
    Ok(())
}
