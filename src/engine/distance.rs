//! Distance functions used by [`super::MemoryEngine`]. All math is in `f32`.

use crate::types::DistanceType;

pub fn l1(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

pub fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

pub fn angle(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).acos()
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Number of differing components.
pub fn hamming(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).filter(|(x, y)| x != y).count() as f32
}

pub fn hamming_bits(a: &[u8], b: &[u8]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum::<u32>() as f32
}

/// Weighted Jaccard distance, `1 - Σmin / Σmax`.
pub fn jaccard(a: &[f32], b: &[f32]) -> f32 {
    let mut min_sum = 0.0f32;
    let mut max_sum = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        min_sum += x.min(*y);
        max_sum += x.max(*y);
    }
    if max_sum == 0.0 {
        return 0.0;
    }
    1.0 - min_sum / max_sum
}

pub fn jaccard_bits(a: &[u8], b: &[u8]) -> f32 {
    let mut inter = 0u32;
    let mut union = 0u32;
    for (x, y) in a.iter().zip(b) {
        inter += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    if union == 0 {
        return 0.0;
    }
    1.0 - inter as f32 / union as f32
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

pub fn compute(kind: DistanceType, a: &[f32], b: &[f32]) -> f32 {
    match kind {
        DistanceType::L1 => l1(a, b),
        DistanceType::L2 => l2(a, b),
        DistanceType::Hamming => hamming(a, b),
        DistanceType::Angle | DistanceType::NormalizedAngle => angle(a, b),
        DistanceType::Cosine | DistanceType::NormalizedCosine => cosine(a, b),
        DistanceType::Jaccard => jaccard(a, b),
    }
}
