//! Path-dependent TreeSHAP.
//!
//! Computes exact Shapley values of a tree ensemble's raw output for one
//! example, weighting unseen branches by the fraction of training examples
//! that reached them (Lundberg et al., "Consistent Individualized Feature
//! Attribution for Tree Ensembles").

use super::{Node, Tree};
use crate::features::FeatureValue;
use ndarray::ArrayView1;

/// Accumulate the contributions of `trees` for `example` into `values`.
///
/// `values` has one slot per feature plus a final slot that receives the
/// baseline: `bias` plus the expected output of every tree. After the call
/// the slots sum to the ensemble's raw output.
pub fn compute_shap<'a>(
    example: ArrayView1<FeatureValue>,
    trees: impl Iterator<Item = &'a Tree>,
    bias: f32,
    values: &mut [f32],
) {
    let n_features = example.len();
    let mut baseline = bias;
    for tree in trees {
        let phi = tree_shap(example, tree);
        for (value, contribution) in values.iter_mut().zip(phi) {
            *value += contribution;
        }
        baseline += expected_value(tree, 0);
    }
    values[n_features] += baseline;
}

#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    feature_index: Option<usize>,
    zero_fraction: f32,
    one_fraction: f32,
    weight: f32,
}

fn tree_shap(example: ArrayView1<FeatureValue>, tree: &Tree) -> Vec<f32> {
    let mut phi = vec![0.0; example.len()];
    let depth = max_depth(tree) + 2;
    // Each recursion level copies the path above itself, so the buffer holds
    // a triangle of paths.
    let mut path = vec![PathElement::default(); depth * (depth + 1) / 2];
    let mut walker = Walker {
        example,
        tree,
        phi: &mut phi,
    };
    walker.recurse(0, &mut path, 0, 1.0, 1.0, None);
    phi
}

struct Walker<'a, 'b, 'c> {
    example: ArrayView1<'c, FeatureValue>,
    tree: &'a Tree,
    phi: &'b mut [f32],
}

impl Walker<'_, '_, '_> {
    fn recurse(
        &mut self,
        node_index: usize,
        path: &mut [PathElement],
        depth: usize,
        zero_fraction: f32,
        one_fraction: f32,
        feature_index: Option<usize>,
    ) {
        extend(path, depth, zero_fraction, one_fraction, feature_index);
        let mut depth = depth;
        match &self.tree.nodes[node_index] {
            Node::Leaf(leaf) => {
                for i in 1..=depth {
                    let weight = unwound_sum(path, depth, i);
                    let element = path[i];
                    if let Some(feature) = element.feature_index {
                        self.phi[feature] +=
                            weight * (element.one_fraction - element.zero_fraction) * leaf.value;
                    }
                }
            }
            Node::Branch(branch) => {
                let (hot, cold) = branch.hot_cold_children(self.example);
                let hot_zero_fraction =
                    ratio(self.tree.nodes[hot].examples_fraction(), branch.examples_fraction);
                let cold_zero_fraction =
                    ratio(self.tree.nodes[cold].examples_fraction(), branch.examples_fraction);
                let split_feature = branch.split.feature_index();
                let mut incoming_zero_fraction = 1.0;
                let mut incoming_one_fraction = 1.0;
                // A feature seen earlier on the path is undone before recursing.
                if let Some(i) = (1..=depth).find(|&i| path[i].feature_index == Some(split_feature)) {
                    incoming_zero_fraction = path[i].zero_fraction;
                    incoming_one_fraction = path[i].one_fraction;
                    unwind(path, depth, i);
                    depth -= 1;
                }
                let (parent, child) = path.split_at_mut(depth + 1);
                child[..parent.len()].copy_from_slice(parent);
                self.recurse(
                    hot,
                    child,
                    depth + 1,
                    hot_zero_fraction * incoming_zero_fraction,
                    incoming_one_fraction,
                    Some(split_feature),
                );
                child[..parent.len()].copy_from_slice(parent);
                self.recurse(
                    cold,
                    child,
                    depth + 1,
                    cold_zero_fraction * incoming_zero_fraction,
                    0.0,
                    Some(split_feature),
                );
            }
        }
    }
}

fn ratio(child: f32, parent: f32) -> f32 {
    if parent > 0.0 {
        child / parent
    } else {
        0.0
    }
}

fn extend(
    path: &mut [PathElement],
    depth: usize,
    zero_fraction: f32,
    one_fraction: f32,
    feature_index: Option<usize>,
) {
    path[depth] = PathElement {
        feature_index,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    };
    let n = (depth + 1) as f32;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f32 / n;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f32 / n;
    }
}

fn unwind(path: &mut [PathElement], depth: usize, index: usize) {
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let n = (depth + 1) as f32;
    let mut next_one_portion = path[depth].weight;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let weight = path[i].weight;
            path[i].weight = next_one_portion * n / ((i + 1) as f32 * one_fraction);
            next_one_portion = weight - path[i].weight * zero_fraction * (depth - i) as f32 / n;
        } else {
            path[i].weight = path[i].weight * n / (zero_fraction * (depth - i) as f32);
        }
    }
    for i in index..depth {
        path[i].feature_index = path[i + 1].feature_index;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

fn unwound_sum(path: &[PathElement], depth: usize, index: usize) -> f32 {
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let portion = next_one_portion / ((i + 1) as f32 * one_fraction);
            total += portion;
            next_one_portion = path[i].weight - portion * zero_fraction * (depth - i) as f32;
        } else if zero_fraction != 0.0 {
            total += path[i].weight / (zero_fraction * (depth - i) as f32);
        }
    }
    total * (depth + 1) as f32
}

fn max_depth(tree: &Tree) -> usize {
    // Children always follow their parent, so one forward pass suffices.
    let mut depths = vec![0usize; tree.nodes.len()];
    let mut deepest = 0;
    for (index, node) in tree.nodes.iter().enumerate() {
        deepest = deepest.max(depths[index]);
        if let Node::Branch(branch) = node {
            depths[branch.left_child_index] = depths[index] + 1;
            depths[branch.right_child_index] = depths[index] + 1;
        }
    }
    deepest
}

/// Expected output of the subtree at `node_index` over the training data.
fn expected_value(tree: &Tree, node_index: usize) -> f32 {
    match &tree.nodes[node_index] {
        Node::Leaf(leaf) => leaf.value,
        Node::Branch(branch) => {
            let left = &tree.nodes[branch.left_child_index];
            let right = &tree.nodes[branch.right_child_index];
            ratio(left.examples_fraction(), branch.examples_fraction)
                * expected_value(tree, branch.left_child_index)
                + ratio(right.examples_fraction(), branch.examples_fraction)
                    * expected_value(tree, branch.right_child_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{NodeSpec, SplitDirection, SplitSpec, TreeSpec};
    use ndarray::array;

    fn branch(left: u64, right: u64, feature_index: u64, split_value: f32, fraction: f32) -> NodeSpec {
        NodeSpec::Branch {
            left_child_index: left,
            right_child_index: right,
            split: SplitSpec::Continuous {
                feature_index,
                split_value,
                invalid_values_direction: SplitDirection::Left,
            },
            examples_fraction: fraction,
        }
    }

    fn leaf(value: f32, examples_fraction: f32) -> NodeSpec {
        NodeSpec::Leaf {
            value,
            examples_fraction,
        }
    }

    fn two_level_tree() -> Tree {
        // x0 <= 0 ? (x1 <= 0 ? 1 : 3) : (x1 <= 0 ? 5 : 11)
        let spec = TreeSpec {
            nodes: vec![
                branch(1, 2, 0, 0.0, 1.0),
                branch(3, 4, 1, 0.0, 0.5),
                branch(5, 6, 1, 0.0, 0.5),
                leaf(1.0, 0.25),
                leaf(3.0, 0.25),
                leaf(5.0, 0.25),
                leaf(11.0, 0.25),
            ],
        };
        Tree::from_spec(spec, &[None, None]).unwrap()
    }

    #[test]
    fn test_expected_value() {
        assert_eq!(expected_value(&two_level_tree(), 0), 5.0);
        assert_eq!(max_depth(&two_level_tree()), 2);
    }

    #[test]
    fn test_contributions_sum_to_output() {
        let tree = two_level_tree();
        let example = array![FeatureValue::Number(1.0), FeatureValue::Number(1.0)];
        let mut values = vec![0.0; 3];
        compute_shap(example.view(), std::iter::once(&tree), 0.5, &mut values);
        let total: f32 = values.iter().sum();
        assert!((total - 11.5).abs() < 1e-5);
        assert!((values[2] - 5.5).abs() < 1e-6);
        // Exact Shapley values for this tree with independent features.
        assert!((values[0] - 3.5).abs() < 1e-5);
        assert!((values[1] - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = Tree::from_spec(
            TreeSpec {
                nodes: vec![leaf(2.0, 1.0)],
            },
            &[None],
        )
        .unwrap();
        let example = array![FeatureValue::Number(0.0)];
        let mut values = vec![0.0; 2];
        compute_shap(example.view(), std::iter::once(&tree), 1.0, &mut values);
        assert_eq!(values, vec![0.0, 3.0]);
    }

    #[test]
    fn test_repeated_feature_on_path() {
        // x0 <= 0 ? 0 : (x0 <= 1 ? 2 : 4)
        let spec = TreeSpec {
            nodes: vec![
                branch(1, 2, 0, 0.0, 1.0),
                leaf(0.0, 0.5),
                branch(3, 4, 0, 1.0, 0.5),
                leaf(2.0, 0.25),
                leaf(4.0, 0.25),
            ],
        };
        let tree = Tree::from_spec(spec, &[None, None]).unwrap();
        let example = array![FeatureValue::Number(2.0), FeatureValue::Number(0.0)];
        let mut values = vec![0.0; 3];
        compute_shap(example.view(), std::iter::once(&tree), 0.0, &mut values);
        assert!((values[2] - 1.5).abs() < 1e-6);
        assert!((values[0] - 2.5).abs() < 1e-5);
        assert_eq!(values[1], 0.0);
    }
}
