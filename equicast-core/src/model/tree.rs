//! Second-order regression tree used as the boosting base learner.
//!
//! Exact greedy split search over the sampled rows and columns:
//!   gain = ½ [G_L²/(H_L+λ) + G_R²/(H_R+λ) − G²/(H+λ)] − γ
//!   leaf weight = −G/(H+λ)
//! Rows with `x < threshold` go left.

use super::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        weight: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct FitContext<'a> {
    x: &'a FeatureMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: TreeParams,
    importance: &'a mut [f64],
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fit one tree on `rows` using columns `features`.
    ///
    /// `importance` accumulates split gain per column.
    pub fn fit(
        x: &FeatureMatrix,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        params: TreeParams,
        importance: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let mut ctx = FitContext {
            x,
            grad,
            hess,
            features,
            params,
            importance,
        };
        tree.grow(&mut ctx, rows, 0);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { weight } => return *weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn grow(&mut self, ctx: &mut FitContext<'_>, rows: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let g: f64 = rows.iter().map(|&r| ctx.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| ctx.hess[r]).sum();
        let lambda = ctx.params.lambda;
        self.nodes.push(Node::Leaf {
            weight: -g / (h + lambda),
        });

        if depth >= ctx.params.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(best) = Self::best_split(ctx, &rows, g, h) else {
            return idx;
        };

        ctx.importance[best.feature] += best.gain;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| ctx.x.get(r, best.feature) < best.threshold);

        let left = self.grow(ctx, left_rows, depth + 1);
        let right = self.grow(ctx, right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(ctx: &FitContext<'_>, rows: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let TreeParams {
            min_child_weight,
            lambda,
            gamma,
            ..
        } = ctx.params;
        let parent_score = g * g / (h + lambda);
        let mut best: Option<BestSplit> = None;
        let mut order = rows.to_vec();

        for &f in ctx.features {
            order.sort_by(|&a, &b| ctx.x.get(a, f).total_cmp(&ctx.x.get(b, f)));

            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..order.len() - 1 {
                let r = order[k];
                gl += ctx.grad[r];
                hl += ctx.hess[r];

                let v = ctx.x.get(r, f);
                let next = ctx.x.get(order[k + 1], f);
                if v == next {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < min_child_weight || hr < min_child_weight {
                    continue;
                }

                let gain =
                    0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score)
                        - gamma;
                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    // adjacent floats: the midpoint rounds onto `v`
                    let mid = v + (next - v) / 2.0;
                    best = Some(BestSplit {
                        feature: f,
                        threshold: if mid > v { mid } else { next },
                        gain,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(depth: usize) -> TreeParams {
        TreeParams {
            max_depth: depth,
            min_child_weight: 0.0,
            lambda: 0.0,
            gamma: 0.0,
        }
    }

    #[test]
    fn single_split_separates_gradients() {
        let x = FeatureMatrix::from_rows(1, &[[1.0], [2.0], [3.0], [4.0]]).unwrap();
        let grad = [1.0, 1.0, -1.0, -1.0];
        let hess = [1.0; 4];
        let mut imp = [0.0];
        let tree = RegressionTree::fit(&x, &grad, &hess, (0..4).collect(), &[0], params(1), &mut imp);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[1.5]), -1.0);
        assert_eq!(tree.predict(&[3.5]), 1.0);
        // threshold is the midpoint between 2 and 3
        assert_eq!(tree.predict(&[2.49]), -1.0);
        assert_eq!(tree.predict(&[2.5]), 1.0);
        assert!(imp[0] > 0.0);
    }

    #[test]
    fn adjacent_floats_split_into_two_finite_leaves() {
        let lo = 1.0_f64;
        let hi = f64::from_bits(lo.to_bits() + 1);
        let x = FeatureMatrix::from_rows(1, &[[lo], [lo], [hi], [hi]]).unwrap();
        let grad = [1.0, 1.0, -1.0, -1.0];
        let hess = [1.0; 4];
        let mut imp = [0.0];
        let tree = RegressionTree::fit(&x, &grad, &hess, (0..4).collect(), &[0], params(1), &mut imp);

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict(&[lo]), -1.0);
        assert_eq!(tree.predict(&[hi]), 1.0);
    }

    #[test]
    fn constant_feature_yields_leaf() {
        let x = FeatureMatrix::from_rows(1, &[[5.0], [5.0], [5.0]]).unwrap();
        let grad = [1.0, -1.0, 1.0];
        let hess = [1.0; 3];
        let mut imp = [0.0];
        let tree = RegressionTree::fit(&x, &grad, &hess, (0..3).collect(), &[0], params(3), &mut imp);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict(&[5.0]), -1.0 / 3.0);
    }

    #[test]
    fn depth_limit_respected() {
        let rows: Vec<[f64; 1]> = (0..32).map(|i| [i as f64]).collect();
        let x = FeatureMatrix::from_rows(1, &rows).unwrap();
        let grad: Vec<f64> = (0..32).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let hess = vec![1.0; 32];
        let mut imp = [0.0];
        let tree = RegressionTree::fit(&x, &grad, &hess, (0..32).collect(), &[0], params(2), &mut imp);
        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn unsampled_columns_never_split() {
        let x = FeatureMatrix::from_rows(2, &[[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [4.0, 1.0]]).unwrap();
        let grad = [1.0, 1.0, -1.0, -1.0];
        let hess = [1.0; 4];
        let mut imp = [0.0, 0.0];
        RegressionTree::fit(&x, &grad, &hess, (0..4).collect(), &[1], params(2), &mut imp);
        assert_eq!(imp[0], 0.0);
        assert!(imp[1] > 0.0);
    }
}
