//! Weighted random selection.

use rand::Rng;

/// Picks one candidate with probability proportional to its weight.
///
/// Negative and NaN weights count as zero. When the total weight is not
/// positive the pick is uniform. Otherwise `r` is drawn from `[0, total)` and
/// the first candidate whose cumulative weight exceeds `r` wins; the last
/// candidate absorbs any floating-point remainder. Returns `None` only for an
/// empty slice.
pub fn pick<'a, T, R: Rng + ?Sized>(candidates: &'a [(T, f64)], rng: &mut R) -> Option<&'a T> {
    if candidates.is_empty() {
        return None;
    }

    let weight = |w: f64| if w.is_nan() || w < 0.0 { 0.0 } else { w };
    let total: f64 = candidates.iter().map(|(_, w)| weight(*w)).sum();

    if !total.is_finite() || total <= 0.0 {
        let idx = rng.random_range(0..candidates.len());
        return Some(&candidates[idx].0);
    }

    let r = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (item, w) in candidates {
        cumulative += weight(*w);
        if cumulative > r {
            return Some(item);
        }
    }
    candidates.last().map(|(item, _)| item)
}
