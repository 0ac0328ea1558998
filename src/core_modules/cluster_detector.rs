// THEORY:
// The `cluster_detector` is the grouping stage used by the sensor's cluster mode.
// It implements DBSCAN, density-based clustering, over the tracked point
// positions: a point with at least `min_points` neighbours within `eps`
// (itself included) is a core point, and a cluster is everything reachable
// from a core point through a chain of core points.
//
// Key principles & algorithm steps:
// 1.  **Seeding**: points are visited in input order. An unvisited core point
//     seeds a new cluster. A non-core point is left alone for now; a later
//     cluster may still claim it as a border point.
// 2.  **Expansion**: the seed's neighbourhood is pushed onto a queue and grown
//     breadth-first. Core points found on the way add their own neighbourhoods.
//     A point joins at most one cluster.
// 3.  **Noise is dropped**: points no cluster reaches are not emitted, and a
//     cluster that ends up smaller than `min_points` (its border points were
//     already claimed) is discarded as well.
// 4.  **Stateless Utility**: like the hull builders, `find_clusters` keeps no
//     memory between calls.

use crate::core_modules::point::Point;

pub mod cluster_detector {
    use super::*;
    use std::collections::VecDeque;

    pub fn find_clusters(points: &[Point], eps: f64, min_points: usize) -> Vec<Vec<Point>> {
        let min_points = min_points.max(1);
        let eps_sq = eps * eps;

        let mut visited = vec![false; points.len()];
        let mut clustered = vec![false; points.len()];
        let mut clusters = Vec::new();

        for seed in 0..points.len() {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;

            // --- 1. Seeding ---
            let neighbours = region_query(points, seed, eps_sq);
            if neighbours.len() < min_points {
                continue;
            }

            // --- 2. Expansion ---
            let mut members = vec![seed];
            clustered[seed] = true;
            let mut queue: VecDeque<usize> = neighbours.into();

            while let Some(current) = queue.pop_front() {
                if !visited[current] {
                    visited[current] = true;
                    let reach = region_query(points, current, eps_sq);
                    if reach.len() >= min_points {
                        queue.extend(reach.into_iter().filter(|i| !visited[*i]));
                    }
                }
                if !clustered[current] {
                    clustered[current] = true;
                    members.push(current);
                }
            }

            // --- 3. Filtering ---
            if members.len() >= min_points {
                clusters.push(members.into_iter().map(|i| points[i]).collect());
            }
        }

        clusters
    }

    /// Indices of every point within `eps` of `points[index]`, itself included.
    fn region_query(points: &[Point], index: usize, eps_sq: f64) -> Vec<usize> {
        let origin = points[index];
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| origin.distance_squared(**p) <= eps_sq)
            .map(|(i, _)| i)
            .collect()
    }
}
