//! Seeded k-means over standardized feature rows

use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Standardize each column to zero mean and unit variance in place
///
/// Constant columns become all zeros.
pub fn standardize(rows: &mut [Vec<f64>]) {
    let Some(width) = rows.first().map(Vec::len) else {
        return;
    };
    let n = rows.len() as f64;

    for col in 0..width {
        let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
        let variance = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        for row in rows.iter_mut() {
            row[col] = if std > 0.0 { (row[col] - mean) / std } else { 0.0 };
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(row, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = j;
        }
    }
    best
}

/// Cluster `rows` into `k` groups, returning each row's cluster index
///
/// Initial centroids are `k` distinct rows drawn from `rng`; iteration stops
/// when assignments settle or after `max_iterations`. Requires
/// `rows.len() >= k`.
pub fn kmeans(rows: &[Vec<f64>], k: usize, max_iterations: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = rows.len();
    if k == 0 || n < k {
        return vec![0; n];
    }
    let width = rows[0].len();

    let mut centroids: Vec<Vec<f64>> = sample(rng, n, k)
        .into_iter()
        .map(|i| rows[i].clone())
        .collect();
    let mut assignments: Vec<usize> = rows.iter().map(|r| nearest(r, &centroids)).collect();

    for _ in 0..max_iterations {
        let mut sums = vec![vec![0.0; width]; k];
        let mut counts = vec![0usize; k];
        for (row, &cluster) in rows.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (sum, value) in sums[cluster].iter_mut().zip(row) {
                *sum += value;
            }
        }
        for (j, centroid) in centroids.iter_mut().enumerate() {
            // Empty clusters keep their previous centroid
            if counts[j] > 0 {
                *centroid = sums[j].iter().map(|s| s / counts[j] as f64).collect();
            }
        }

        let next: Vec<usize> = rows.iter().map(|r| nearest(r, &centroids)).collect();
        if next == assignments {
            break;
        }
        assignments = next;
    }

    assignments
}
