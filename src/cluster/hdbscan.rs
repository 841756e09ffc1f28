// HDBSCAN over a dense matrix of points.
//
// Stages: core distances -> minimum spanning tree of the mutual reachability
// graph (Prim, O(N^2) time, O(N) memory) -> single-linkage hierarchy ->
// condensed tree -> excess-of-mass cluster selection -> flat labels.
//
// Node numbering follows the usual dendrogram convention: leaves are
// 0..n, merge i creates node n + i. In the condensed tree the root cluster
// is labelled n and new clusters count up from n + 1.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ndarray::{Array2, ArrayView1};

use super::Metric;

/// Smallest distance used when converting to lambda = 1 / distance, so
/// duplicate points get a large finite lambda instead of infinity.
const MIN_DISTANCE: f64 = 1e-12;

/// One edge of the minimum spanning tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MstEdge {
    pub a: usize,
    pub b: usize,
    pub distance: f64,
}

/// One merge in the single-linkage dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// One row of the condensed tree. `child` is either a point (< n, with
/// `child_size == 1`) or a cluster label (>= n).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CondensedEdge {
    pub parent: usize,
    pub child: usize,
    pub lambda: f64,
    pub child_size: usize,
}

/// Run the full algorithm. `None` in the result means noise; `Some(c)` is a
/// cluster id in 0..k. Callers validate shapes and parameters first.
pub fn hdbscan(
    data: &Array2<f64>,
    min_cluster_size: usize,
    min_samples: usize,
    metric: Metric,
) -> Vec<Option<u32>> {
    let n = data.nrows();
    if n < 2 {
        return vec![None; n];
    }

    let core = core_distances(data, min_samples, metric);
    let mst = prim_mst(data, &core, metric);
    let hierarchy = single_linkage(mst, n);
    let condensed = condense_tree(&hierarchy, n, min_cluster_size);
    let stability = compute_stability(&condensed);
    let selected = select_clusters(&condensed, &stability);
    label_points(&condensed, &selected, n)
}

/// Distance from each point to its `min_samples`-th nearest neighbour,
/// counting the point itself as the first.
pub fn core_distances(data: &Array2<f64>, min_samples: usize, metric: Metric) -> Vec<f64> {
    let n = data.nrows();
    let k = min_samples.clamp(1, n);
    let mut row = vec![0.0f64; n];

    (0..n)
        .map(|i| {
            let a = data.row(i);
            for (j, slot) in row.iter_mut().enumerate() {
                *slot = metric.distance(a, data.row(j));
            }
            row.select_nth_unstable_by(k - 1, f64::total_cmp);
            row[k - 1]
        })
        .collect()
}

fn mutual_reachability(
    data: &Array2<f64>,
    core: &[f64],
    metric: Metric,
    i: usize,
    j: usize,
) -> f64 {
    let d = metric.distance(data.row(i), data.row(j));
    d.max(core[i]).max(core[j])
}

/// Prim's algorithm on the implicit complete mutual-reachability graph.
/// Returns n - 1 edges in the order they were added.
pub fn prim_mst(data: &Array2<f64>, core: &[f64], metric: Metric) -> Vec<MstEdge> {
    let n = data.nrows();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut source = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    for _ in 1..n {
        in_tree[current] = true;

        let mut next = usize::MAX;
        let mut next_dist = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = mutual_reachability(data, core, metric, current, j);
            if d < best[j] {
                best[j] = d;
                source[j] = current;
            }
            if next == usize::MAX || best[j] < next_dist {
                next = j;
                next_dist = best[j];
            }
        }

        edges.push(MstEdge {
            a: source[next],
            b: next,
            distance: next_dist,
        });
        current = next;
    }

    edges
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    next_label: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        let mut size = vec![0; total];
        size[..n].fill(1);
        Self {
            parent: (0..total).collect(),
            size,
            next_label: n,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let up = self.parent[x];
            self.parent[x] = root;
            x = up;
        }
        root
    }

    /// Merge two roots under a fresh node label.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let label = self.next_label;
        self.parent[a] = label;
        self.parent[b] = label;
        self.size[label] = self.size[a] + self.size[b];
        self.next_label += 1;
        label
    }
}

/// Turn MST edges into a dendrogram by merging in ascending distance order.
pub fn single_linkage(mut mst: Vec<MstEdge>, n: usize) -> Vec<Merge> {
    mst.sort_by(|x, y| x.distance.total_cmp(&y.distance));

    let mut uf = UnionFind::new(n);
    mst.into_iter()
        .map(|edge| {
            let left = uf.find(edge.a);
            let right = uf.find(edge.b);
            let node = uf.union(left, right);
            Merge {
                left,
                right,
                distance: edge.distance,
                size: uf.size[node],
            }
        })
        .collect()
}

/// Breadth-first walk of the dendrogram below `root`, including `root`.
fn bfs_hierarchy(hierarchy: &[Merge], root: usize, n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        out.push(node);
        if node >= n {
            let merge = &hierarchy[node - n];
            queue.push_back(merge.left);
            queue.push_back(merge.right);
        }
    }
    out
}

fn node_size(hierarchy: &[Merge], node: usize, n: usize) -> usize {
    if node >= n {
        hierarchy[node - n].size
    } else {
        1
    }
}

/// Collapse the dendrogram: a split only creates new clusters when both
/// sides have at least `min_cluster_size` points; otherwise the small side's
/// points fall out of the parent cluster at that lambda.
pub fn condense_tree(hierarchy: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; root + 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; root + 1];
    let mut result = Vec::new();

    for node in bfs_hierarchy(hierarchy, root, n) {
        if ignore[node] || node < n {
            continue;
        }

        let merge = hierarchy[node - n];
        let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
        let left_size = node_size(hierarchy, merge.left, n);
        let right_size = node_size(hierarchy, merge.right, n);
        let parent = relabel[node];

        let fall_out = |side: usize, ignore: &mut Vec<bool>, result: &mut Vec<CondensedEdge>| {
            for sub in bfs_hierarchy(hierarchy, side, n) {
                if sub < n {
                    result.push(CondensedEdge {
                        parent,
                        child: sub,
                        lambda,
                        child_size: 1,
                    });
                }
                ignore[sub] = true;
            }
        };

        match (left_size >= min_cluster_size, right_size >= min_cluster_size) {
            (true, true) => {
                for (side, size) in [(merge.left, left_size), (merge.right, right_size)] {
                    relabel[side] = next_label;
                    next_label += 1;
                    result.push(CondensedEdge {
                        parent,
                        child: relabel[side],
                        lambda,
                        child_size: size,
                    });
                }
            }
            (false, false) => {
                fall_out(merge.left, &mut ignore, &mut result);
                fall_out(merge.right, &mut ignore, &mut result);
            }
            (true, false) => {
                relabel[merge.left] = parent;
                fall_out(merge.right, &mut ignore, &mut result);
            }
            (false, true) => {
                relabel[merge.right] = parent;
                fall_out(merge.left, &mut ignore, &mut result);
            }
        }
    }

    result
}

/// Stability of every cluster: the sum over its children of
/// (lambda at which the child left - lambda at which the cluster was born)
/// weighted by the child's size.
pub fn compute_stability(condensed: &[CondensedEdge]) -> BTreeMap<usize, f64> {
    let mut stability = BTreeMap::new();
    let Some(root) = condensed.iter().map(|e| e.parent).min() else {
        return stability;
    };

    let mut birth: BTreeMap<usize, f64> = BTreeMap::new();
    birth.insert(root, 0.0);
    for edge in condensed {
        stability.entry(edge.parent).or_insert(0.0);
        if edge.child_size > 1 {
            birth.insert(edge.child, edge.lambda);
            stability.entry(edge.child).or_insert(0.0);
        }
    }

    for edge in condensed {
        let born = birth.get(&edge.parent).copied().unwrap_or(0.0);
        if let Some(s) = stability.get_mut(&edge.parent) {
            *s += (edge.lambda - born) * edge.child_size as f64;
        }
    }

    stability
}

/// Excess-of-mass selection. Walks clusters from the leaves up; a cluster is
/// kept when it is at least as stable as its children combined. The root is
/// never selected.
pub fn select_clusters(condensed: &[CondensedEdge], stability: &BTreeMap<usize, f64>) -> BTreeSet<usize> {
    let Some(root) = stability.keys().next().copied() else {
        return BTreeSet::new();
    };

    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for edge in condensed.iter().filter(|e| e.child_size > 1) {
        children.entry(edge.parent).or_default().push(edge.child);
    }

    let mut stability = stability.clone();
    let mut selected: BTreeSet<usize> = stability.keys().copied().filter(|&c| c != root).collect();

    let nodes: Vec<usize> = selected.iter().rev().copied().collect();
    for node in nodes {
        let kids = children.get(&node).map(Vec::as_slice).unwrap_or(&[]);
        let subtree: f64 = kids.iter().map(|c| stability[c]).sum();
        if subtree > stability[&node] {
            selected.remove(&node);
            stability.insert(node, subtree);
        } else {
            let mut queue: VecDeque<usize> = kids.iter().copied().collect();
            while let Some(descendant) = queue.pop_front() {
                selected.remove(&descendant);
                if let Some(grandkids) = children.get(&descendant) {
                    queue.extend(grandkids.iter().copied());
                }
            }
        }
    }

    selected
}

/// Assign each point to the selected cluster it sits under, if any.
/// Selected clusters are numbered 0..k in ascending label order.
pub fn label_points(condensed: &[CondensedEdge], selected: &BTreeSet<usize>, n: usize) -> Vec<Option<u32>> {
    let mut parent_of: BTreeMap<usize, usize> = BTreeMap::new();
    for edge in condensed {
        parent_of.insert(edge.child, edge.parent);
    }

    let ids: BTreeMap<usize, u32> = selected
        .iter()
        .enumerate()
        .map(|(i, &c)| (c, i as u32))
        .collect();

    (0..n)
        .map(|point| {
            let mut node = parent_of.get(&point).copied();
            while let Some(cluster) = node {
                if let Some(&id) = ids.get(&cluster) {
                    return Some(id);
                }
                node = parent_of.get(&cluster).copied();
            }
            None
        })
        .collect()
}

pub(super) fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

pub(super) fn manhattan(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// 1 - cosine similarity. A zero vector is at distance 1 from everything.
pub(super) fn cosine(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let dot = a.dot(&b);
    let norms = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norms <= f64::MIN_POSITIVE {
        return 1.0;
    }
    (1.0 - dot / norms).max(0.0)
}
