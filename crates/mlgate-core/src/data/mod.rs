//! Dataset loading and stratified partitioning.

pub mod loader;
pub mod split;

pub use loader::{load_csv, parse_csv, LoadedDataset};
pub use split::{stratified_subsample, stratified_train_test_split};
