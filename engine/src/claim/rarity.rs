//! Weighted rarity sampling. Draws are independent; empty rarity buckets
//! are renormalized away rather than re-rolled.

use rand::Rng;

/// Samples a card level 1..=5 from `weights`, restricted to levels whose
/// bucket is non-empty per `available`. Returns `None` when no weighted
/// level has cards.
pub fn sample_level<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &[u32; 5],
    available: [bool; 5],
) -> Option<u8> {
    let total: u64 = weights
        .iter()
        .zip(available)
        .filter(|(_, a)| *a)
        .map(|(w, _)| *w as u64)
        .sum();
    if total == 0 {
        return None;
    }

    let mut roll = rng.gen_range(0..total);
    for (i, (w, a)) in weights.iter().zip(available).enumerate() {
        if !a {
            continue;
        }
        let w = *w as u64;
        if roll < w {
            return Some(i as u8 + 1);
        }
        roll -= w;
    }

    // Unreachable while total covers every available weight.
    None
}
