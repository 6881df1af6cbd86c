use anyhow::Context;
use clap::{Parser, ValueEnum};
use cub_dataset::{CubConfig, CubDataset, SubsampleMode};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsampleArg {
    All,
    Base,
    New,
}

impl From<SubsampleArg> for SubsampleMode {
    fn from(arg: SubsampleArg) -> Self {
        match arg {
            SubsampleArg::All => SubsampleMode::All,
            SubsampleArg::Base => SubsampleMode::Base,
            SubsampleArg::New => SubsampleMode::New,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cub_split",
    about = "Build (or reuse) the CUB-200-2011 train/val/test split and print a summary"
)]
pub struct SplitArgs {
    /// TOML config; defaults to $CUB_DATASET_CONFIG, then ./cub-dataset.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory containing CUB_200_2011/ (overrides dataset.root).
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Shots per class; 0 keeps the full splits (overrides dataset.num_shots).
    #[arg(long)]
    pub num_shots: Option<usize>,
    /// Seed for the split shuffle and few-shot cache key (overrides seed).
    #[arg(long)]
    pub seed: Option<u64>,
    /// Class subsampling mode (overrides dataset.subsample_classes).
    #[arg(long, value_enum)]
    pub subsample: Option<SubsampleArg>,
    /// Rebuild the split cache when the annotation files have changed.
    #[arg(long, overrides_with = "no_verify_cache")]
    pub verify_cache: bool,
    /// Trust existing caches even if the config file enables verification.
    #[arg(long, overrides_with = "verify_cache")]
    pub no_verify_cache: bool,
    /// Write the JSON summary here instead of stdout.
    #[arg(long)]
    pub summary_out: Option<PathBuf>,
}

impl SplitArgs {
    /// Config file values with command-line overrides applied.
    pub fn resolve_config(&self) -> anyhow::Result<CubConfig> {
        let mut cfg = match &self.config {
            Some(path) => CubConfig::from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CubConfig::load().context("loading default config")?,
        };
        if let Some(root) = &self.root {
            cfg.root = root.clone();
        }
        if let Some(num_shots) = self.num_shots {
            cfg.num_shots = num_shots;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(subsample) = self.subsample {
            cfg.subsample = subsample.into();
        }
        if self.verify_cache {
            cfg.verify_cache = true;
        } else if self.no_verify_cache {
            cfg.verify_cache = false;
        }
        Ok(cfg)
    }
}

pub fn run_split(args: SplitArgs) -> anyhow::Result<()> {
    let cfg = args.resolve_config()?;
    info!(
        root = %cfg.root.display(),
        num_shots = cfg.num_shots,
        seed = cfg.seed,
        subsample = %cfg.subsample,
        "building cub split"
    );
    let dataset = CubDataset::load(&cfg)
        .with_context(|| format!("loading CUB-200-2011 under {}", cfg.root.display()))?;
    let summary = dataset.summary();
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.summary_out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("wrote summary to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
