/// Scales `v` to unit length in place. A zero vector stays zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 1e-12 {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Adds `weight` to the bucket `hash` falls into, with the sign taken from
/// the hash's top bit so unrelated features cancel out on average.
pub fn accumulate(v: &mut [f32], hash: u64, weight: f32) {
    if v.is_empty() {
        return;
    }
    let idx = (hash % v.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    v[idx] += sign * weight;
}
