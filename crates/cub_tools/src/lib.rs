//! Command-line tooling for building and inspecting CUB-200-2011 splits.

pub mod split;

pub use split::{run_split, SplitArgs};
