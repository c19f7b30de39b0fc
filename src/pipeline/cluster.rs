//! Clustering primitives over embedding vectors.
//!
//! Density-based clustering (DBSCAN) with cosine distance. Cluster labels
//! depend only on the input order of the vectors, so results are
//! deterministic for identical inputs.

/// Cosine similarity between two vectors. Zero vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += *x as f64 * *y as f64;
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cosine distance: `1 - cosine_similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Element-wise mean of a set of equal-length vectors.
pub fn centroid(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; first.len()];
    for vector in vectors {
        for (acc, v) in sum.iter_mut().zip(vector.iter()) {
            *acc += v;
        }
    }
    let n = vectors.len() as f32;
    for acc in &mut sum {
        *acc /= n;
    }
    sum
}

/// DBSCAN over cosine distance.
///
/// Returns one label per input vector: `Some(cluster)` with clusters
/// numbered from 0 in discovery order, or `None` for noise (singletons).
/// `min_samples` counts the point itself, matching the usual convention.
pub fn dbscan(embeddings: &[Vec<f32>], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let n = embeddings.len();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0usize;

    for point in 0..n {
        if visited[point] {
            continue;
        }
        visited[point] = true;

        let neighbors = region_query(embeddings, point, eps);
        if neighbors.len() < min_samples {
            continue; // noise unless a later cluster claims it
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[point] = Some(cluster);

        // Breadth-first cluster expansion.
        let mut frontier = neighbors;
        let mut i = 0;
        while i < frontier.len() {
            let candidate = frontier[i];
            i += 1;

            if !visited[candidate] {
                visited[candidate] = true;
                let candidate_neighbors = region_query(embeddings, candidate, eps);
                if candidate_neighbors.len() >= min_samples {
                    for neighbor in candidate_neighbors {
                        if !frontier.contains(&neighbor) {
                            frontier.push(neighbor);
                        }
                    }
                }
            }
            if labels[candidate].is_none() {
                labels[candidate] = Some(cluster);
            }
        }
    }

    labels
}

fn region_query(embeddings: &[Vec<f32>], point: usize, eps: f64) -> Vec<usize> {
    (0..embeddings.len())
        .filter(|&other| cosine_distance(&embeddings[point], &embeddings[other]) <= eps)
        .collect()
}
