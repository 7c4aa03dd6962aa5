//! Gradient boosted tree ensembles.
//!
//! Trees are stored as flat node arrays with node 0 as the root. Validation
//! guarantees that every child index is larger than its parent's, so
//! traversal always terminates.

pub mod shap;

use crate::error::{Result, TabulaError};
use crate::features::FeatureValue;
use crate::format::{NodeSpec, SplitDirection, SplitSpec, TreeEnsembleSpec, TreeMulticlassSpec, TreeSpec};
use ndarray::prelude::*;

#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Branch(BranchNode),
    Leaf(LeafNode),
}

#[derive(Debug, Clone)]
pub struct BranchNode {
    pub left_child_index: usize,
    pub right_child_index: usize,
    pub split: BranchSplit,
    pub examples_fraction: f32,
}

#[derive(Debug, Clone)]
pub enum BranchSplit {
    Continuous {
        feature_index: usize,
        split_value: f32,
        invalid_values_direction: SplitDirection,
    },
    Discrete {
        feature_index: usize,
        /// Indexed by enum option, slot 0 for invalid values.
        directions: Vec<SplitDirection>,
    },
}

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub value: f32,
    pub examples_fraction: f32,
}

impl Node {
    pub fn examples_fraction(&self) -> f32 {
        match self {
            Node::Branch(branch) => branch.examples_fraction,
            Node::Leaf(leaf) => leaf.examples_fraction,
        }
    }
}

impl BranchSplit {
    pub fn feature_index(&self) -> usize {
        match self {
            BranchSplit::Continuous { feature_index, .. }
            | BranchSplit::Discrete { feature_index, .. } => *feature_index,
        }
    }
}

impl BranchNode {
    /// Direction this example takes at the branch.
    pub fn direction(&self, example: ArrayView1<FeatureValue>) -> SplitDirection {
        match &self.split {
            BranchSplit::Continuous {
                feature_index,
                split_value,
                invalid_values_direction,
            } => match example[*feature_index] {
                FeatureValue::Number(value) if value.is_nan() => *invalid_values_direction,
                FeatureValue::Number(value) if value <= *split_value => SplitDirection::Left,
                FeatureValue::Number(_) => SplitDirection::Right,
                FeatureValue::Enum(_) => *invalid_values_direction,
            },
            BranchSplit::Discrete {
                feature_index,
                directions,
            } => {
                let bin = match example[*feature_index] {
                    FeatureValue::Enum(value) => value.map(|v| v.get()).unwrap_or(0),
                    FeatureValue::Number(_) => 0,
                };
                directions.get(bin).copied().unwrap_or(SplitDirection::Left)
            }
        }
    }

    /// The child the example follows and the one it does not.
    pub fn hot_cold_children(&self, example: ArrayView1<FeatureValue>) -> (usize, usize) {
        match self.direction(example) {
            SplitDirection::Left => (self.left_child_index, self.right_child_index),
            SplitDirection::Right => (self.right_child_index, self.left_child_index),
        }
    }
}

impl Tree {
    /// Validate a serialized tree.
    ///
    /// `enum_options[i]` holds the option count when feature `i` is an
    /// identity feature over an enum column, and `None` otherwise.
    pub fn from_spec(spec: TreeSpec, enum_options: &[Option<usize>]) -> Result<Tree> {
        if spec.nodes.is_empty() {
            return Err(TabulaError::invalid_model("tree has no nodes"));
        }
        let n_nodes = spec.nodes.len();
        let nodes = spec
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| convert_node(index, node, n_nodes, enum_options))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tree { nodes })
    }

    pub fn predict(&self, example: ArrayView1<FeatureValue>) -> f32 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(leaf) => return leaf.value,
                Node::Branch(branch) => {
                    index = match branch.direction(example) {
                        SplitDirection::Left => branch.left_child_index,
                        SplitDirection::Right => branch.right_child_index,
                    };
                }
            }
        }
    }
}

fn convert_node(
    index: usize,
    node: NodeSpec,
    n_nodes: usize,
    enum_options: &[Option<usize>],
) -> Result<Node> {
    match node {
        NodeSpec::Leaf {
            value,
            examples_fraction,
        } => {
            check_fraction(index, examples_fraction)?;
            Ok(Node::Leaf(LeafNode {
                value,
                examples_fraction,
            }))
        }
        NodeSpec::Branch {
            left_child_index,
            right_child_index,
            split,
            examples_fraction,
        } => {
            check_fraction(index, examples_fraction)?;
            let left_child_index = child_index(index, left_child_index, n_nodes)?;
            let right_child_index = child_index(index, right_child_index, n_nodes)?;
            let split = convert_split(index, split, enum_options)?;
            Ok(Node::Branch(BranchNode {
                left_child_index,
                right_child_index,
                split,
                examples_fraction,
            }))
        }
    }
}

fn check_fraction(index: usize, fraction: f32) -> Result<()> {
    if fraction.is_finite() && fraction >= 0.0 {
        Ok(())
    } else {
        Err(TabulaError::invalid_model(format!(
            "node {index} has invalid examples fraction {fraction}"
        )))
    }
}

fn child_index(parent: usize, child: u64, n_nodes: usize) -> Result<usize> {
    match usize::try_from(child) {
        Ok(child) if child > parent && child < n_nodes => Ok(child),
        _ => Err(TabulaError::invalid_model(format!(
            "node {parent} has invalid child index {child} (tree has {n_nodes} nodes)"
        ))),
    }
}

fn feature_index(node: usize, feature: u64, n_features: usize) -> Result<usize> {
    match usize::try_from(feature) {
        Ok(feature) if feature < n_features => Ok(feature),
        _ => Err(TabulaError::invalid_model(format!(
            "node {node} splits on feature {feature}, model has {n_features} features"
        ))),
    }
}

fn convert_split(node: usize, split: SplitSpec, enum_options: &[Option<usize>]) -> Result<BranchSplit> {
    match split {
        SplitSpec::Continuous {
            feature_index: feature,
            split_value,
            invalid_values_direction,
        } => {
            let feature_index = feature_index(node, feature, enum_options.len())?;
            if enum_options[feature_index].is_some() {
                return Err(TabulaError::invalid_model(format!(
                    "node {node} has a continuous split on enum feature {feature_index}"
                )));
            }
            if split_value.is_nan() {
                return Err(TabulaError::invalid_model(format!(
                    "node {node} has a NaN split value"
                )));
            }
            Ok(BranchSplit::Continuous {
                feature_index,
                split_value,
                invalid_values_direction,
            })
        }
        SplitSpec::Discrete {
            feature_index: feature,
            directions,
        } => {
            let feature_index = feature_index(node, feature, enum_options.len())?;
            match enum_options[feature_index] {
                Some(n_options) if directions.len() == n_options + 1 => Ok(BranchSplit::Discrete {
                    feature_index,
                    directions,
                }),
                Some(n_options) => Err(TabulaError::invalid_model(format!(
                    "node {node} has {} split directions, expected {}",
                    directions.len(),
                    n_options + 1
                ))),
                None => Err(TabulaError::invalid_model(format!(
                    "node {node} has a discrete split on non-enum feature {feature_index}"
                ))),
            }
        }
    }
}

/// Single-output ensemble used for regression and binary classification.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    pub bias: f32,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_spec(spec: TreeEnsembleSpec, enum_options: &[Option<usize>]) -> Result<Self> {
        if !spec.bias.is_finite() {
            return Err(TabulaError::invalid_model("tree ensemble bias is not finite"));
        }
        let trees = spec
            .trees
            .into_iter()
            .map(|tree| Tree::from_spec(tree, enum_options))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            bias: spec.bias,
            trees,
        })
    }

    /// Raw ensemble output for every row of `features`.
    pub fn predict(&self, features: ArrayView2<FeatureValue>) -> Array1<f32> {
        features
            .rows()
            .into_iter()
            .map(|example| {
                self.bias
                    + self
                        .trees
                        .iter()
                        .map(|tree| tree.predict(example))
                        .sum::<f32>()
            })
            .collect()
    }

    /// Per-feature contributions of one row followed by the baseline.
    pub fn contributions(&self, example: ArrayView1<FeatureValue>) -> Vec<f32> {
        let mut values = vec![0.0; example.len() + 1];
        shap::compute_shap(example, self.trees.iter(), self.bias, &mut values);
        values
    }
}

/// One ensemble output per class.
#[derive(Debug, Clone)]
pub struct TreeMulticlassEnsemble {
    pub biases: Array1<f32>,
    /// `n_rounds x n_classes`.
    pub trees: Array2<Tree>,
}

impl TreeMulticlassEnsemble {
    pub fn from_spec(spec: TreeMulticlassSpec, n_classes: usize, enum_options: &[Option<usize>]) -> Result<Self> {
        if spec.biases.len() != n_classes {
            return Err(TabulaError::invalid_model(format!(
                "multiclass tree model has {} biases for {n_classes} classes",
                spec.biases.len()
            )));
        }
        if spec.trees.is_empty() || spec.trees.len() % n_classes != 0 {
            return Err(TabulaError::invalid_model(format!(
                "multiclass tree model has {} trees, expected a non-zero multiple of {n_classes}",
                spec.trees.len()
            )));
        }
        let n_rounds = spec.trees.len() / n_classes;
        let trees = spec
            .trees
            .into_iter()
            .map(|tree| Tree::from_spec(tree, enum_options))
            .collect::<Result<Vec<_>>>()?;
        let trees = Array2::from_shape_vec((n_rounds, n_classes), trees)
            .map_err(|e| TabulaError::invalid_model(e.to_string()))?;
        Ok(Self {
            biases: Array1::from(spec.biases),
            trees,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.biases.len()
    }

    /// Raw per-class outputs, `n_rows x n_classes`.
    pub fn predict(&self, features: ArrayView2<FeatureValue>) -> Array2<f32> {
        let mut logits = Array2::zeros((features.nrows(), self.n_classes()));
        for (mut row, example) in logits.rows_mut().into_iter().zip(features.rows()) {
            row.assign(&self.biases);
            for round in self.trees.rows() {
                for (logit, tree) in row.iter_mut().zip(round.iter()) {
                    *logit += tree.predict(example);
                }
            }
        }
        logits
    }

    /// Contributions and baseline of one row for class `class_index`.
    pub fn contributions(&self, example: ArrayView1<FeatureValue>, class_index: usize) -> Vec<f32> {
        let mut values = vec![0.0; example.len() + 1];
        shap::compute_shap(
            example,
            self.trees.column(class_index).into_iter(),
            self.biases[class_index],
            &mut values,
        );
        values
    }
}
