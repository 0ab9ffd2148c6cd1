//! Seeded, stratified partitioning of a [`Dataset`].

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::domain::{Dataset, MlGateError, Result};

/// Row indices of each class, shuffled with a seeded RNG.
///
/// Negatives are shuffled first, then positives, from one RNG stream, so the
/// result depends only on the labels and `seed`.
pub(crate) fn shuffled_class_indices(ds: &Dataset, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let (mut negatives, mut positives) = ds.class_indices();
    negatives.shuffle(&mut rng);
    positives.shuffle(&mut rng);
    (negatives, positives)
}

fn take_count(n: usize, fraction: f64) -> usize {
    ((n as f64) * fraction).ceil() as usize
}

/// Stratified train/test split. Returns `(train, test)`.
///
/// Each class contributes `ceil(n_c * test_size)` rows to the test split,
/// clamped so both splits keep at least one row of every class that has two
/// or more rows.
pub fn stratified_train_test_split(
    ds: &Dataset,
    test_size: f64,
    seed: u64,
) -> Result<(Dataset, Dataset)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlGateError::InvalidConfig(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let (negatives, positives) = shuffled_class_indices(ds, seed);
    let mut train = Vec::with_capacity(ds.n_rows());
    let mut test = Vec::new();
    for class in [&negatives, &positives] {
        let n = class.len();
        let n_test = if n >= 2 {
            take_count(n, test_size).clamp(1, n - 1)
        } else {
            0
        };
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }

    if test.is_empty() {
        return Err(MlGateError::InvalidConfig(
            "dataset too small for a held-out split".to_string(),
        ));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((ds.subset(&train), ds.subset(&test)))
}

/// Keep `ceil(n_c * fraction)` rows of every class.
pub fn stratified_subsample(ds: &Dataset, fraction: f64, seed: u64) -> Result<Dataset> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(MlGateError::InvalidConfig(format!(
            "subsample fraction must be in (0, 1], got {fraction}"
        )));
    }
    let (negatives, positives) = shuffled_class_indices(ds, seed);
    let mut keep: Vec<usize> = negatives[..take_count(negatives.len(), fraction)]
        .iter()
        .chain(&positives[..take_count(positives.len(), fraction)])
        .copied()
        .collect();
    keep.sort_unstable();
    Ok(ds.subset(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_dataset;

    #[test]
    fn split_preserves_class_ratio() {
        let ds = synthetic_dataset(100, 0.37, 1);
        let (train, test) = stratified_train_test_split(&ds, 0.2, 42).unwrap();

        assert_eq!(train.n_rows() + test.n_rows(), 100);
        // 37 positives -> ceil(7.4) = 8 test; 63 negatives -> ceil(12.6) = 13 test
        assert_eq!(test.n_positive(), 8);
        assert_eq!(test.n_rows(), 21);
        assert_eq!(train.n_positive(), 29);
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let ds = synthetic_dataset(60, 0.4, 3);
        let a = stratified_train_test_split(&ds, 0.25, 7).unwrap();
        let b = stratified_train_test_split(&ds, 0.25, 7).unwrap();
        assert_eq!(a, b);
        let c = stratified_train_test_split(&ds, 0.25, 8).unwrap();
        assert_ne!(a.1, c.1);
    }

    #[test]
    fn invalid_test_size_rejected() {
        let ds = synthetic_dataset(20, 0.5, 1);
        assert!(stratified_train_test_split(&ds, 0.0, 1).is_err());
        assert!(stratified_train_test_split(&ds, 1.0, 1).is_err());
    }

    #[test]
    fn subsample_keeps_both_classes() {
        let ds = synthetic_dataset(100, 0.37, 5);
        let sub = stratified_subsample(&ds, 0.2, 42).unwrap();
        // ceil(63 * 0.2) = 13, ceil(37 * 0.2) = 8
        assert_eq!(sub.n_rows(), 21);
        assert_eq!(sub.n_positive(), 8);
    }
}
