//! 3PL item response functions.
//!
//! p(θ) = g + (u − g) / (1 + exp(−a(θ − b)))
//!
//! All functions are total: extreme thetas saturate the logistic instead of
//! overflowing, and information is clamped to zero at the asymptotes.

use crate::model::{ItemParams, ObservedResponse};

#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let exp_x = x.exp();
        exp_x / (1.0 + exp_x)
    }
}

/// Probability of a correct response at `theta`.
///
/// Always lies in `[g, u]`.
#[inline]
pub fn probability(theta: f64, item: &ItemParams) -> f64 {
    let s = sigmoid(item.a * (theta - item.b));
    item.g + (item.u - item.g) * s
}

/// Fisher information of a single item at `theta`.
///
/// `I = (dp/dθ)² / (p(1 − p))` with `dp/dθ = a(u − g)·s(1 − s)` where `s` is
/// the logistic part of the curve. Returns 0 when `p` sits on an asymptote or
/// the curve is flat (`u == g`).
pub fn item_information(theta: f64, item: &ItemParams) -> f64 {
    let range = item.u - item.g;
    if range == 0.0 {
        return 0.0;
    }
    let s = sigmoid(item.a * (theta - item.b));
    let p = item.g + range * s;
    if p <= item.g || p >= item.u {
        return 0.0;
    }
    let pq = p * (1.0 - p);
    if pq <= 0.0 {
        return 0.0;
    }
    let dp = item.a * range * s * (1.0 - s);
    dp * dp / pq
}

/// Sum of item information over the administered items.
pub fn test_information(theta: f64, responses: &[ObservedResponse]) -> f64 {
    responses
        .iter()
        .map(|r| item_information(theta, &r.params))
        .sum()
}
