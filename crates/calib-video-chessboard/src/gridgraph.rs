use crate::geom::{angle_diff_abs, axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use crate::response::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use std::f32::consts::{FRAC_PI_4, PI};

/// Neighbor slot in the corner's own lattice frame.
///
/// The two local grid axes are the light diagonal rotated by ±45°, so the
/// slots follow the board under in-plane rotation rather than image x/y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    PlusU,
    MinusU,
    PlusV,
    MinusV,
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

fn classify_direction(orientation: f32, edge_angle: f32) -> NeighborDirection {
    let u = orientation + FRAC_PI_4;
    let v = orientation - FRAC_PI_4;
    let candidates = [
        (NeighborDirection::PlusU, angle_diff_abs(u, edge_angle)),
        (NeighborDirection::MinusU, angle_diff_abs(u + PI, edge_angle)),
        (NeighborDirection::PlusV, angle_diff_abs(v, edge_angle)),
        (NeighborDirection::MinusV, angle_diff_abs(v + PI, edge_angle)),
    ];
    candidates
        .into_iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(d, _)| d)
        .unwrap_or(NeighborDirection::PlusU)
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // Adjacent inner corners have their light diagonals swapped.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // The edge runs along a grid axis, i.e. at ~45° to both diagonals.
    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - FRAC_PI_4).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - FRAC_PI_4).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    Some(NodeNeighbor {
        direction: classify_direction(corner.orientation, edge_angle),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor,
    })
}

/// Keep at most one neighbor per slot: the closest valid candidate.
///
/// Farther candidates in the same slot are corners further along the same
/// row, which also pass the orientation test.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = match candidate.direction {
            NeighborDirection::PlusU => &mut best[0],
            NeighborDirection::MinusU => &mut best[1],
            NeighborDirection::PlusV => &mut best[2],
            NeighborDirection::MinusV => &mut best[3],
        };
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// Undirected 4-connected graph over coarse corners.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }

        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let results = tree.nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1);
            let candidates = results
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params))
                .collect();
            neighbors.push(select_neighbors(candidates));
        }

        // Keep mutual links only.
        let linked = |from: usize, to: usize, lists: &[Vec<NodeNeighbor>]| {
            lists[from].iter().any(|n| n.index == to)
        };
        let mutual = (0..neighbors.len())
            .map(|i| {
                neighbors[i]
                    .iter()
                    .filter(|n| linked(n.index, i, &neighbors))
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors: mutual }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Node sets of the graph's connected components, each in breadth-first order.
pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut seen = vec![false; graph.len()];
    let mut components = Vec::new();

    for root in 0..graph.len() {
        if std::mem::replace(&mut seen[root], true) {
            continue;
        }
        let mut members = vec![root];
        let mut head = 0;
        while let Some(&node) = members.get(head) {
            head += 1;
            for link in &graph.neighbors[node] {
                if !std::mem::replace(&mut seen[link.index], true) {
                    members.push(link.index);
                }
            }
        }
        components.push(members);
    }

    components
}
