use chrono::{DateTime, Utc};

/// Cosine distance `d = 1 - cos(a, b)`, in `[0, 2]`: 0 for colinear
/// vectors, 1 for orthogonal ones, 2 for opposite ones.
///
/// A zero-norm vector carries no direction; it is treated as orthogonal to
/// everything (distance 1) instead of producing a NaN.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Maps a cosine distance in `[0, 2]` to a similarity score in `[0, 1]`,
/// monotonically decreasing with the distance
pub fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Ranks scored candidates: closest first, ties broken by the most recent
/// creation timestamp, truncated to `top_k`.
///
/// Shared by the chunk repositories so the in-memory and Postgres adapters
/// cannot drift on ordering semantics.
pub fn rank_candidates<T>(
    mut candidates: Vec<(T, f32)>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
    top_k: usize,
) -> Vec<(T, f32)> {
    candidates.sort_by(|(a, da), (b, db)| {
        da.partial_cmp(db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| created_at(b).cmp(&created_at(a)))
    });
    candidates.truncate(top_k);
    candidates
}
