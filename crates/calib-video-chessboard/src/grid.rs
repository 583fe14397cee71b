//! Integer lattice labelling and canonical ordering of a corner graph.

use crate::gridgraph::GridGraph;
use crate::response::Corner;
use crate::result::DetectionMiss;
use calib_video_core::estimate_homography;
use nalgebra::{Point2, Vector2};
use std::collections::{HashMap, VecDeque};

/// Grid coordinates `(node, i, j)` for every node of a component, with
/// `i, j >= 0`.
#[derive(Clone, Debug)]
pub struct LabeledGrid {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<(usize, usize, usize)>,
}

struct NodeState {
    i: i32,
    j: i32,
    eu: Vector2<f32>,
    ev: Vector2<f32>,
}

fn seed_node(corners: &[Corner], graph: &GridGraph, component: &[usize]) -> Option<usize> {
    let n = component.len() as f32;
    let (sx, sy) = component.iter().fold((0.0, 0.0), |(sx, sy), &k| {
        (sx + corners[k].position.x, sy + corners[k].position.y)
    });
    let centroid = Point2::new(sx / n, sy / n);
    component
        .iter()
        .copied()
        .filter(|&k| graph.neighbors[k].len() >= 2)
        .min_by(|&a, &b| {
            let key = |k: usize| {
                (
                    std::cmp::Reverse(graph.neighbors[k].len()),
                    (corners[k].position - centroid).norm(),
                )
            };
            let (da, na) = key(a);
            let (db, nb) = key(b);
            da.cmp(&db).then(na.total_cmp(&nb))
        })
}

/// Initial lattice basis at the seed: one edge, then its most orthogonal partner.
fn seed_basis(corners: &[Corner], graph: &GridGraph, seed: usize) -> Option<(Vector2<f32>, Vector2<f32>)> {
    let edges: Vec<Vector2<f32>> = graph.neighbors[seed]
        .iter()
        .map(|n| corners[n.index].position - corners[seed].position)
        .collect();
    let eu = *edges.first()?;
    let ev = edges
        .iter()
        .skip(1)
        .copied()
        .min_by(|a, b| {
            let ca = (a.dot(&eu) / (a.norm() * eu.norm())).abs();
            let cb = (b.dot(&eu) / (b.norm() * eu.norm())).abs();
            ca.total_cmp(&cb)
        })?;
    let cos = (ev.dot(&eu) / (ev.norm() * eu.norm())).abs();
    (cos < 0.5).then_some((eu, ev))
}

/// Assign integer lattice coordinates by BFS, classifying each step against
/// a locally propagated basis so perspective foreshortening is tolerated.
pub fn label_component(
    corners: &[Corner],
    graph: &GridGraph,
    component: &[usize],
    min_alignment: f32,
) -> Result<LabeledGrid, DetectionMiss> {
    let seed = seed_node(corners, graph, component).ok_or(DetectionMiss::LabelConflict)?;
    let (eu, ev) = seed_basis(corners, graph, seed).ok_or(DetectionMiss::LabelConflict)?;

    let mut states: HashMap<usize, NodeState> = HashMap::new();
    let mut occupied: HashMap<(i32, i32), usize> = HashMap::new();
    let mut queue = VecDeque::new();

    states.insert(seed, NodeState { i: 0, j: 0, eu, ev });
    occupied.insert((0, 0), seed);
    queue.push_back(seed);

    while let Some(node) = queue.pop_front() {
        let (i, j, eu, ev) = {
            let s = &states[&node];
            (s.i, s.j, s.eu, s.ev)
        };

        for neighbor in &graph.neighbors[node] {
            let d = corners[neighbor.index].position - corners[node].position;
            let dn = d.norm();
            if dn <= f32::EPSILON {
                return Err(DetectionMiss::LabelConflict);
            }
            let cu = d.dot(&eu) / (dn * eu.norm());
            let cv = d.dot(&ev) / (dn * ev.norm());

            let (di, dj, new_eu, new_ev, alignment) = if cu.abs() >= cv.abs() {
                let s = cu.signum();
                (s as i32, 0, d * s, ev, cu.abs())
            } else {
                let s = cv.signum();
                (0, s as i32, eu, d * s, cv.abs())
            };
            if alignment < min_alignment {
                return Err(DetectionMiss::LabelConflict);
            }

            let target = (i + di, j + dj);
            if let Some(existing) = states.get(&neighbor.index) {
                if (existing.i, existing.j) != target {
                    return Err(DetectionMiss::LabelConflict);
                }
                continue;
            }
            if occupied.insert(target, neighbor.index).is_some() {
                return Err(DetectionMiss::LabelConflict);
            }
            states.insert(
                neighbor.index,
                NodeState {
                    i: target.0,
                    j: target.1,
                    eu: new_eu,
                    ev: new_ev,
                },
            );
            queue.push_back(neighbor.index);
        }
    }

    let min_i = states.values().map(|s| s.i).min().unwrap_or(0);
    let min_j = states.values().map(|s| s.j).min().unwrap_or(0);
    let max_i = states.values().map(|s| s.i).max().unwrap_or(0);
    let max_j = states.values().map(|s| s.j).max().unwrap_or(0);

    let mut labels: Vec<(usize, usize, usize)> = states
        .iter()
        .map(|(&k, s)| (k, (s.i - min_i) as usize, (s.j - min_j) as usize))
        .collect();
    labels.sort_unstable_by_key(|&(_, i, j)| (j, i));

    Ok(LabeledGrid {
        width: (max_i - min_i + 1) as usize,
        height: (max_j - min_j + 1) as usize,
        labels,
    })
}

fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Order a complete `cols x rows` grid canonically.
///
/// Of the eight lattice symmetries, keep those that map the grid onto
/// `cols` columns and `rows` rows with `cross(e_i, e_j) > 0` in image
/// coordinates, then pick the one whose first corner is closest to the
/// image origin. Returns corner indices in `r * cols + c` order.
pub fn canonical_order(
    grid: &LabeledGrid,
    corners: &[Corner],
    rows: usize,
    cols: usize,
) -> Result<Vec<usize>, DetectionMiss> {
    let (w, h) = (grid.width, grid.height);
    let fits = (w == cols && h == rows) || (w == rows && h == cols);
    if !fits || grid.labels.len() != rows * cols {
        return Err(DetectionMiss::WrongSize {
            width: w,
            height: h,
        });
    }

    let mut dense = vec![usize::MAX; w * h];
    for &(k, i, j) in &grid.labels {
        dense[j * w + i] = k;
    }
    if dense.contains(&usize::MAX) {
        return Err(DetectionMiss::WrongSize {
            width: w,
            height: h,
        });
    }

    let pos = |k: usize| {
        let p = corners[k].position;
        Vector2::new(f64::from(p.x), f64::from(p.y))
    };

    let mut best: Option<(f64, Vec<usize>)> = None;
    for transpose in [false, true] {
        let (tw, th) = if transpose { (h, w) } else { (w, h) };
        if tw != cols || th != rows {
            continue;
        }
        for flip_i in [false, true] {
            for flip_j in [false, true] {
                let order: Vec<usize> = (0..rows)
                    .flat_map(|r| (0..cols).map(move |c| (r, c)))
                    .map(|(r, c)| {
                        let c = if flip_i { cols - 1 - c } else { c };
                        let r = if flip_j { rows - 1 - r } else { r };
                        let (i, j) = if transpose { (r, c) } else { (c, r) };
                        dense[j * w + i]
                    })
                    .collect();

                let at = |r: usize, c: usize| pos(order[r * cols + c]);
                let e_i = (at(0, cols - 1) - at(0, 0)) + (at(rows - 1, cols - 1) - at(rows - 1, 0));
                let e_j = (at(rows - 1, 0) - at(0, 0)) + (at(rows - 1, cols - 1) - at(0, cols - 1));
                if cross(e_i, e_j) <= 0.0 {
                    continue;
                }
                let d0 = at(0, 0).norm_squared();
                if best.as_ref().is_none_or(|(bd, _)| d0 < *bd) {
                    best = Some((d0, order));
                }
            }
        }
    }

    best.map(|(_, order)| order).ok_or(DetectionMiss::LabelConflict)
}

/// Largest residual of a planar homography fit, and the median grid step.
pub fn planarity(points: &[Point2<f64>], rows: usize, cols: usize) -> Option<(f64, f64)> {
    let lattice: Vec<Point2<f64>> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| Point2::new(c as f64, r as f64)))
        .collect();
    let h = estimate_homography(&lattice, points)?;
    let residual = lattice
        .iter()
        .zip(points)
        .map(|(l, p)| (h.apply(*l) - p).norm())
        .fold(0.0, f64::max);

    let mut steps = Vec::with_capacity(2 * rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let p = points[r * cols + c];
            if c + 1 < cols {
                steps.push((points[r * cols + c + 1] - p).norm());
            }
            if r + 1 < rows {
                steps.push((points[(r + 1) * cols + c] - p).norm());
            }
        }
    }
    steps.sort_by(f64::total_cmp);
    let median = *steps.get(steps.len() / 2)?;
    Some((residual, median))
}
