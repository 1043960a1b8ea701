//! Temporal clustering of media into bursts
//!
//! One-dimensional DBSCAN over capture times. A burst is a run of captures
//! whose neighbours sit within `epsilon` seconds of each other; files that
//! fall in no burst are noise and never replicated. The clusterer is a pure
//! function of its inputs, so identical libraries always produce identical
//! burst assignments.

use crate::models::{MediaDescriptor, MediaLibrary};
use std::collections::{HashMap, VecDeque};

/// The clustered slice of the library: burst count plus descriptors stamped
/// with their burst ids, in clusterer emission order. Noise is excluded.
pub struct BurstPlan {
    pub cluster_count: u64,
    pub descriptors: Vec<MediaDescriptor>,
}

impl BurstPlan {
    pub fn media_count(&self) -> usize {
        self.descriptors.len()
    }
}

/// Density-based clustering on a single axis.
///
/// Points are `(id, position)` pairs; the result maps each clustered id to
/// a dense cluster id assigned 0..K-1 in first-encounter order along the
/// sorted axis. Ids absent from the map are noise.
///
/// A point is a core point when at least `min_points` points (itself
/// included) lie within `epsilon` of it. Clusters grow by transitive
/// density-reachability over core points; border points join the cluster of
/// the first core that reaches them.
pub fn dbscan_1d(epsilon: f64, min_points: usize, points: &[(u64, f64)]) -> HashMap<u64, u64> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    // Stable on id for equal positions, so ties cannot reorder between runs.
    order.sort_by(|&a, &b| {
        points[a]
            .1
            .partial_cmp(&points[b].1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(points[a].0.cmp(&points[b].0))
    });
    let positions: Vec<f64> = order.iter().map(|&i| points[i].1).collect();

    let neighbourhood = |i: usize| -> (usize, usize) {
        let p = positions[i];
        let lo = positions.partition_point(|&x| x < p - epsilon);
        let hi = positions.partition_point(|&x| x <= p + epsilon);
        (lo, hi)
    };
    let is_core = |i: usize| -> bool {
        let (lo, hi) = neighbourhood(i);
        hi - lo >= min_points
    };

    let mut labels: Vec<Option<u64>> = vec![None; positions.len()];
    let mut next_cluster = 0u64;

    for seed in 0..positions.len() {
        if labels[seed].is_some() || !is_core(seed) {
            continue;
        }
        let cluster = next_cluster;
        next_cluster += 1;

        labels[seed] = Some(cluster);
        let mut frontier = VecDeque::from([seed]);
        while let Some(point) = frontier.pop_front() {
            // Border points belong to the cluster but do not expand it.
            if !is_core(point) {
                continue;
            }
            let (lo, hi) = neighbourhood(point);
            for reachable in lo..hi {
                if labels[reachable].is_none() {
                    labels[reachable] = Some(cluster);
                    frontier.push_back(reachable);
                }
            }
        }
    }

    let mut assignments = HashMap::new();
    for (sorted_pos, &original) in order.iter().enumerate() {
        if let Some(cluster) = labels[sorted_pos] {
            assignments.insert(points[original].0, cluster);
        }
    }
    assignments
}

/// Cluster the whole library along the capture-time axis and stamp burst
/// ids onto clones of the clustered descriptors.
pub fn cluster_media(library: &MediaLibrary, epsilon: f64, min_points: usize) -> BurstPlan {
    let points: Vec<(u64, f64)> = library
        .iter()
        .map(|d| (d.sequence_id(), d.capture_epoch() as f64))
        .collect();

    let assignments = dbscan_1d(epsilon, min_points, &points);
    let cluster_count = assignments.values().max().map(|&c| c + 1).unwrap_or(0);

    let mut descriptors: Vec<MediaDescriptor> = library
        .iter()
        .filter_map(|d| {
            assignments.get(&d.sequence_id()).map(|&burst| {
                let mut stamped = d.clone();
                stamped.set_burst_id(burst);
                stamped
            })
        })
        .collect();
    descriptors.sort_by_key(|d| (d.burst_id(), d.sequence_id()));

    tracing::debug!(
        media = library.len(),
        clustered = descriptors.len(),
        clusters = cluster_count,
        "clustered library by capture time"
    );

    BurstPlan {
        cluster_count,
        descriptors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(ts: &[f64]) -> Vec<(u64, f64)> {
        ts.iter().enumerate().map(|(i, &t)| (i as u64, t)).collect()
    }

    #[test]
    fn test_empty_input_is_no_clusters() {
        let assignments = dbscan_1d(9.0, 2, &[]);
        assert!(assignments.is_empty());
    }

    #[test]
    fn test_close_pair_clusters_and_outlier_is_noise() {
        // a=100s, b=103s cluster together; c=200s is noise.
        let assignments = dbscan_1d(9.0, 2, &points(&[100.0, 103.0, 200.0]));
        assert_eq!(assignments.get(&0), Some(&0));
        assert_eq!(assignments.get(&1), Some(&0));
        assert_eq!(assignments.get(&2), None);
    }

    #[test]
    fn test_chain_reachability_joins_one_cluster() {
        // Each neighbour within epsilon of the next; transitively one burst
        // even though the ends are 15s apart.
        let assignments = dbscan_1d(5.0, 2, &points(&[0.0, 5.0, 10.0, 15.0]));
        assert_eq!(assignments.len(), 4);
        assert!(assignments.values().all(|&c| c == 0));
    }

    #[test]
    fn test_gap_splits_clusters_in_time_order() {
        let assignments = dbscan_1d(5.0, 2, &points(&[0.0, 4.0, 100.0, 104.0]));
        assert_eq!(assignments.get(&0), Some(&0));
        assert_eq!(assignments.get(&1), Some(&0));
        assert_eq!(assignments.get(&2), Some(&1));
        assert_eq!(assignments.get(&3), Some(&1));
    }

    #[test]
    fn test_border_points_join_reaching_core() {
        // With min_points=3 only t=9 is core; the ends are borders and must
        // still land in its cluster.
        let assignments = dbscan_1d(9.0, 3, &points(&[0.0, 9.0, 18.0]));
        assert_eq!(assignments.len(), 3);
        assert!(assignments.values().all(|&c| c == 0));
    }

    #[test]
    fn test_singleton_below_min_points_is_noise() {
        let assignments = dbscan_1d(9.0, 2, &points(&[0.0, 100.0, 200.0]));
        assert!(assignments.is_empty());
    }

    #[test]
    fn test_deterministic_across_runs_and_input_order() {
        let forward = points(&[0.0, 3.0, 50.0, 52.0, 200.0]);
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = dbscan_1d(9.0, 2, &forward);
        let b = dbscan_1d(9.0, 2, &forward);
        let c = dbscan_1d(9.0, 2, &reversed);

        assert_eq!(a, b);
        assert_eq!(a, c);
    }
}
