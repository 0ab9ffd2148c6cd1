//! CART decision trees and bagged random forests.
//!
//! These are the comparison baselines for the logistic model. A tree splits
//! on the feature/threshold pair with the lowest weighted Gini impurity.
//! Thresholds sit halfway between adjacent distinct values and a row goes
//! left when `value <= threshold`. Leaves store the fraction of positive
//! training rows, which is the predicted probability.
//!
//! Trees need no feature scaling.

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Dataset, MlGateError, Result};
use crate::model::{Classifier, Estimator};

/// Child index of a leaf.
pub const NO_CHILD: u32 = u32::MAX;

/// Impurity decrease a split must beat.
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Growth limits for one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionTreeConfig {
    pub max_depth: usize,
    /// Nodes with fewer rows become leaves.
    pub min_samples_split: usize,
    /// Every leaf keeps at least this many rows.
    pub min_samples_leaf: usize,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
        }
    }
}

impl DecisionTreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(MlGateError::InvalidConfig("max_depth must be >= 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(MlGateError::InvalidConfig(format!(
                "min_samples_split must be >= 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(MlGateError::InvalidConfig(
                "min_samples_leaf must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Bagging parameters for [`RandomForest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_trees: usize,
    pub tree: DecisionTreeConfig,
    /// Fit each tree on a bootstrap resample of the rows.
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            tree: DecisionTreeConfig::default(),
            bootstrap: true,
            seed: 42,
        }
    }
}

impl RandomForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(MlGateError::InvalidConfig("n_trees must be >= 1".into()));
        }
        self.tree.validate()
    }
}

// ---------------------------------------------------------------------------
// Fitted models
// ---------------------------------------------------------------------------

/// One tree node. Split fields are ignored when `is_leaf` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: u32,
    pub threshold: f64,
    pub left: u32,
    pub right: u32,
    /// Fraction of positive training rows that reached this node.
    pub value: f64,
    pub samples: u32,
    pub is_leaf: bool,
}

impl TreeNode {
    fn leaf(value: f64, samples: usize) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: NO_CHILD,
            right: NO_CHILD,
            value,
            samples: samples as u32,
            is_leaf: true,
        }
    }
}

/// A fitted tree. Nodes are in depth-first order with the root at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeModel {
    pub n_features: usize,
    pub nodes: Vec<TreeNode>,
    /// Deepest level reached; the root is depth 0.
    pub depth: usize,
}

impl TreeModel {
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf).count()
    }

    fn leaf_for(&self, row: &[f64]) -> &TreeNode {
        let mut node = &self.nodes[0];
        while !node.is_leaf {
            let next = if row[node.feature as usize] <= node.threshold {
                node.left
            } else {
                node.right
            };
            node = &self.nodes[next as usize];
        }
        node
    }
}

impl Classifier for TreeModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba_row(&self, row: &[f64]) -> f64 {
        self.leaf_for(row).value
    }
}

/// A fitted forest; the probability is the mean over its trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub n_features: usize,
    pub trees: Vec<TreeModel>,
}

impl Classifier for ForestModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba_row(row)).sum();
        sum / self.trees.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

#[inline]
fn gini(positives: usize, n: usize) -> f64 {
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

struct Split {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity.
    impurity: f64,
}

struct Grower<'a> {
    ds: &'a Dataset,
    config: &'a DecisionTreeConfig,
    /// Features examined per split; fewer than all only with an RNG.
    features_per_split: usize,
    rng: Option<Xoshiro256PlusPlus>,
    nodes: Vec<TreeNode>,
    depth: usize,
}

impl<'a> Grower<'a> {
    fn new(
        ds: &'a Dataset,
        config: &'a DecisionTreeConfig,
        features_per_split: usize,
        rng: Option<Xoshiro256PlusPlus>,
    ) -> Self {
        Self {
            ds,
            config,
            features_per_split,
            rng,
            nodes: Vec::new(),
            depth: 0,
        }
    }

    /// Grow a tree over `rows` (indices may repeat).
    fn build(mut self, rows: Vec<usize>) -> TreeModel {
        self.grow(rows, 0);
        TreeModel {
            n_features: self.ds.n_features(),
            nodes: self.nodes,
            depth: self.depth,
        }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> u32 {
        let ds = self.ds;
        let id = self.nodes.len() as u32;
        let n = rows.len();
        let positives = rows
            .iter()
            .filter(|&&i| ds.labels()[i].is_positive())
            .count();
        self.nodes
            .push(TreeNode::leaf(positives as f64 / n as f64, n));
        self.depth = self.depth.max(depth);

        let pure = positives == 0 || positives == n;
        if pure || depth >= self.config.max_depth || n < self.config.min_samples_split {
            return id;
        }
        let Some(split) = self.best_split(&rows, positives) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| ds.row(i)[split.feature] <= split.threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        let node = &mut self.nodes[id as usize];
        node.feature = split.feature as u32;
        node.threshold = split.threshold;
        node.left = left;
        node.right = right;
        node.is_leaf = false;
        id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n = self.ds.n_features();
        let k = self.features_per_split;
        match self.rng.as_mut() {
            Some(rng) if k < n => {
                let mut picked = sample(rng, n, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n).collect(),
        }
    }

    /// Lowest-impurity split honouring `min_samples_leaf`. Ties keep the
    /// first candidate in feature order, then threshold order.
    fn best_split(&mut self, rows: &[usize], positives: usize) -> Option<Split> {
        let ds = self.ds;
        let labels = ds.labels();
        let n = rows.len();
        let min_leaf = self.config.min_samples_leaf;
        let parent = gini(positives, n);

        let mut order = rows.to_vec();
        let mut best: Option<Split> = None;
        for feature in self.candidate_features() {
            order.sort_by(|&a, &b| {
                ds.row(a)[feature]
                    .total_cmp(&ds.row(b)[feature])
                    .then(a.cmp(&b))
            });

            let mut left_pos = 0;
            for i in 0..n - 1 {
                if labels[order[i]].is_positive() {
                    left_pos += 1;
                }
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let lo = ds.row(order[i])[feature];
                let hi = ds.row(order[i + 1])[feature];
                if lo >= hi {
                    continue;
                }

                let impurity = (n_left as f64 * gini(left_pos, n_left)
                    + n_right as f64 * gini(positives - left_pos, n_right))
                    / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    // adjacent floats: keep `hi` on the right
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(Split {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best.filter(|b| parent - b.impurity > MIN_IMPURITY_DECREASE)
    }
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Single CART tree over every feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionTree {
    pub config: DecisionTreeConfig,
}

impl DecisionTree {
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self { config }
    }
}

impl Estimator for DecisionTree {
    type Model = TreeModel;

    fn fit(&self, ds: &Dataset) -> Result<TreeModel> {
        if ds.is_empty() {
            return Err(MlGateError::Training("cannot fit on an empty dataset".into()));
        }
        let tree = Grower::new(ds, &self.config, ds.n_features(), None)
            .build((0..ds.n_rows()).collect());
        debug!(
            depth = tree.depth,
            leaves = tree.n_leaves(),
            rows = ds.n_rows(),
            "decision tree grown"
        );
        Ok(tree)
    }
}

/// Bagged trees, each split drawing `floor(sqrt(n_features))` candidate
/// features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RandomForest {
    pub config: RandomForestConfig,
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self { config }
    }
}

impl Estimator for RandomForest {
    type Model = ForestModel;

    fn fit(&self, ds: &Dataset) -> Result<ForestModel> {
        if ds.is_empty() {
            return Err(MlGateError::Training("cannot fit on an empty dataset".into()));
        }
        let cfg = &self.config;
        if cfg.n_trees == 0 {
            return Err(MlGateError::Training("forest needs at least one tree".into()));
        }
        let n_rows = ds.n_rows();
        let features_per_split = ((ds.n_features() as f64).sqrt() as usize).max(1);

        // Per-tree seeds come from one stream, so the forest does not depend
        // on how rayon schedules the trees.
        let mut master = Xoshiro256PlusPlus::seed_from_u64(cfg.seed);
        let seeds: Vec<u64> = (0..cfg.n_trees).map(|_| master.gen()).collect();

        let trees: Vec<TreeModel> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                let rows: Vec<usize> = if cfg.bootstrap {
                    (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
                } else {
                    (0..n_rows).collect()
                };
                Grower::new(ds, &cfg.tree, features_per_split, Some(rng)).build(rows)
            })
            .collect();

        debug!(trees = trees.len(), rows = n_rows, "random forest grown");
        Ok(ForestModel {
            n_features: ds.n_features(),
            trees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Label;
    use crate::scoring;
    use crate::testing::synthetic_dataset;

    fn line(values: &[f64], positive_from: usize) -> Dataset {
        let rows = values.iter().map(|&v| vec![v]).collect();
        let labels = (0..values.len())
            .map(|i| {
                if i >= positive_from {
                    Label::Positive
                } else {
                    Label::Negative
                }
            })
            .collect();
        Dataset::from_rows(vec!["x".into()], rows, labels).unwrap()
    }

    fn loose() -> DecisionTreeConfig {
        DecisionTreeConfig {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    #[test]
    fn splits_halfway_between_classes() {
        let ds = line(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0], 3);
        let tree = DecisionTree::new(loose()).fit(&ds).unwrap();

        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].threshold, 6.5);
        assert_eq!(tree.depth, 1);
        assert_eq!(tree.predict_proba_row(&[6.5]), 0.0);
        assert_eq!(tree.predict_proba_row(&[6.6]), 1.0);
    }

    #[test]
    fn pure_node_is_a_single_leaf() {
        let ds = line(&[1.0, 2.0, 3.0], 0);
        let tree = DecisionTree::new(loose()).fit(&ds).unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.predict_proba_row(&[100.0]), 1.0);
    }

    #[test]
    fn respects_depth_and_leaf_limits() {
        let ds = synthetic_dataset(200, 0.4, 3);

        let stump = DecisionTree::new(DecisionTreeConfig {
            max_depth: 1,
            ..Default::default()
        })
        .fit(&ds)
        .unwrap();
        assert!(stump.depth <= 1);
        assert!(stump.nodes.len() <= 3);

        let tree = DecisionTree::default().fit(&ds).unwrap();
        assert!(tree.depth <= 10);
        for leaf in tree.nodes.iter().filter(|n| n.is_leaf) {
            assert!(leaf.samples >= 2, "leaf with {} rows", leaf.samples);
        }
    }

    #[test]
    fn constant_feature_never_splits() {
        let rows = (0..10).map(|_| vec![1.0]).collect();
        let labels = (0..10)
            .map(|i| if i % 2 == 0 { Label::Positive } else { Label::Negative })
            .collect();
        let ds = Dataset::from_rows(vec!["x".into()], rows, labels).unwrap();
        let tree = DecisionTree::default().fit(&ds).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_proba_row(&[1.0]), 0.5);
    }

    #[test]
    fn tree_fits_separable_data() {
        let ds = synthetic_dataset(200, 0.4, 11);
        let tree = DecisionTree::default().fit(&ds).unwrap();
        let m = scoring::score(ds.labels(), &tree.predict_proba(&ds));
        assert!(m.accuracy > 0.9, "accuracy {}", m.accuracy);
        assert_eq!(tree, DecisionTree::default().fit(&ds).unwrap());
    }

    #[test]
    fn forest_is_seeded() {
        let ds = synthetic_dataset(120, 0.4, 5);
        let cfg = RandomForestConfig {
            n_trees: 15,
            ..Default::default()
        };
        let a = RandomForest::new(cfg.clone()).fit(&ds).unwrap();
        let b = RandomForest::new(cfg.clone()).fit(&ds).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.trees.len(), 15);

        let other = RandomForest::new(RandomForestConfig { seed: 7, ..cfg })
            .fit(&ds)
            .unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn forest_probabilities_average_trees() {
        let ds = synthetic_dataset(150, 0.4, 8);
        let forest = RandomForest::new(RandomForestConfig {
            n_trees: 20,
            ..Default::default()
        })
        .fit(&ds)
        .unwrap();

        let probs = forest.predict_proba(&ds);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        let m = scoring::score(ds.labels(), &probs);
        assert!(m.accuracy > 0.9, "accuracy {}", m.accuracy);

        let row = ds.row(0);
        let mean = forest
            .trees
            .iter()
            .map(|t| t.predict_proba_row(row))
            .sum::<f64>()
            / 20.0;
        assert_eq!(forest.predict_proba_row(row), mean);
    }

    #[test]
    fn empty_dataset_is_training_error() {
        let ds = synthetic_dataset(10, 0.5, 1).subset(&[]);
        assert!(matches!(
            DecisionTree::default().fit(&ds),
            Err(MlGateError::Training(_))
        ));
        assert!(matches!(
            RandomForest::default().fit(&ds),
            Err(MlGateError::Training(_))
        ));
    }

    #[test]
    fn config_validation() {
        assert!(DecisionTreeConfig::default().validate().is_ok());
        assert!(RandomForestConfig::default().validate().is_ok());
        let bad = DecisionTreeConfig {
            min_samples_split: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let no_trees = RandomForestConfig {
            n_trees: 0,
            ..Default::default()
        };
        assert!(no_trees.validate().is_err());
    }
}
