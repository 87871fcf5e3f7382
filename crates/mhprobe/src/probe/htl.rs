//! Hops-to-live handling.

use rand::Rng;

/// Clamp an incoming HTL to `[1, max]`.
///
/// Returns `None` for values below 1, which no well-behaved peer sends.
pub fn clamp(htl: u8, max: u8) -> Option<u8> {
    match htl {
        0 => None,
        htl => Some(htl.min(max)),
    }
}

/// Decrement `htl` by one, except at 1 where it only drops to 0 with
/// `probability`.
///
/// Randomness at the last hop protects the responding node: a fixed hop
/// count would let the requester infer path length from latency.
pub fn probabilistic_decrement<R: Rng + ?Sized>(htl: u8, probability: f32, rng: &mut R) -> u8 {
    match htl {
        0 => 0,
        1 if rng.gen::<f32>() < probability => 0,
        1 => 1,
        htl => htl - 1,
    }
}
